//! Turns desired policy state into v1 or v2 request bodies.

use super::model::{AccessGroupPolicyConfig, PolicyResources, ResourceAttribute, STRING_EQUALS};
use super::variant::PolicyVariant;
use crate::error::{ProviderError, Result};
use serde_json::{json, Map, Value};

pub const POLICY_TYPE: &str = "access";
pub const SUBJECT_KEY: &str = "access_group_id";
pub const ACCOUNT_ID_KEY: &str = "accountId";
pub const SERVICE_NAME_KEY: &str = "serviceName";
pub const SERVICE_TYPE_KEY: &str = "serviceType";
/// `serviceType` value scoping a policy to every IAM-enabled service
pub const SERVICE_TYPE_SERVICE: &str = "service";
/// `serviceType` value scoping a policy to account management services
pub const SERVICE_TYPE_PLATFORM: &str = "platform_service";
const STRING_EXISTS: &str = "stringExists";
const RULE_OPERATORS: &[&str] = &["and", "or"];

/// `resources` field name to API attribute key
pub const RESOURCE_KEYS: &[(&str, &str)] = &[
    ("service", SERVICE_NAME_KEY),
    ("resource_instance_id", "serviceInstance"),
    ("region", "region"),
    ("resource_type", "resourceType"),
    ("resource", "resource"),
    ("resource_group_id", "resourceGroupId"),
    ("service_type", SERVICE_TYPE_KEY),
    ("service_group_id", "service_group_id"),
];

pub(crate) fn resource_field<'a>(resources: &'a PolicyResources, field: &str) -> Option<&'a String> {
    match field {
        "service" => resources.service.as_ref(),
        "resource_instance_id" => resources.resource_instance_id.as_ref(),
        "region" => resources.region.as_ref(),
        "resource_type" => resources.resource_type.as_ref(),
        "resource" => resources.resource.as_ref(),
        "resource_group_id" => resources.resource_group_id.as_ref(),
        "service_type" => resources.service_type.as_ref(),
        "service_group_id" => resources.service_group_id.as_ref(),
        _ => None,
    }
}

/// Checks that need no remote call
pub fn validate(config: &AccessGroupPolicyConfig) -> Result<()> {
    if config.access_group_id.trim().is_empty() {
        return Err(ProviderError::validation("access_group_id is required"));
    }
    if config.roles.is_empty() {
        return Err(ProviderError::validation("roles must contain at least one role"));
    }

    let groups: Vec<&str> = [
        ("resources", config.has_resources()),
        ("resource_attributes", config.has_resource_attributes()),
        ("account_management", config.account_management),
    ]
    .iter()
    .filter(|(_, set)| *set)
    .map(|(name, _)| *name)
    .collect();
    if groups.len() > 1 {
        return Err(ProviderError::validation(format!(
            "conflicting attributes: {} cannot be set together",
            groups.join(" and ")
        )));
    }

    if let Some(op) = &config.rule_operator {
        if !config.has_rule_conditions() {
            return Err(ProviderError::validation(
                "rule_operator requires rule_conditions",
            ));
        }
        if !RULE_OPERATORS.contains(&op.as_str()) {
            return Err(ProviderError::validation(format!(
                "\"rule_operator\" must contain a value from {RULE_OPERATORS:?}, got {op:?}"
            )));
        }
    }

    for condition in config.rule_conditions.iter().flatten() {
        if condition.value.is_empty() {
            return Err(ProviderError::validation(format!(
                "rule condition {:?} has no value",
                condition.key
            )));
        }
    }

    Ok(())
}

/// Service whose roles the policy grants; `None` means platform roles
pub fn service_name(config: &AccessGroupPolicyConfig) -> Option<&str> {
    if config.account_management {
        return None;
    }
    if let Some(service) = config.resources.as_ref().and_then(|r| r.service.as_deref()) {
        return Some(service);
    }
    config
        .resource_attributes
        .iter()
        .flatten()
        .find(|a| a.name == SERVICE_NAME_KEY)
        .map(|a| a.value.as_str())
}

/// Resource attributes as sent, including the implicit account scope
pub fn scoped_attributes(config: &AccessGroupPolicyConfig, account_id: &str) -> Vec<ResourceAttribute> {
    let mut attributes = Vec::new();

    if let Some(resources) = &config.resources {
        for (field, key) in RESOURCE_KEYS {
            if let Some(value) = resource_field(resources, field).filter(|v| !v.is_empty()) {
                attributes.push(ResourceAttribute::new(key, value));
            }
        }
        for (name, value) in &resources.attributes {
            attributes.push(ResourceAttribute::new(name, value));
        }
    } else if config.has_resource_attributes() {
        attributes.extend(config.resource_attributes.iter().flatten().cloned());
    } else if config.account_management {
        attributes.push(ResourceAttribute::new(SERVICE_TYPE_KEY, SERVICE_TYPE_PLATFORM));
    } else {
        attributes.push(ResourceAttribute::new(SERVICE_TYPE_KEY, SERVICE_TYPE_SERVICE));
    }

    attributes.push(ResourceAttribute::new(ACCOUNT_ID_KEY, account_id));
    attributes
}

/// Request body for create or replace on the given surface
pub fn build_request(
    config: &AccessGroupPolicyConfig,
    account_id: &str,
    role_crns: &[String],
    variant: PolicyVariant,
) -> Result<Value> {
    validate(config)?;

    let attributes = scoped_attributes(config, account_id);
    let tags: Vec<&ResourceAttribute> = config.resource_tags.iter().flatten().collect();
    let roles: Vec<Value> = role_crns.iter().map(|crn| json!({ "role_id": crn })).collect();

    let mut body = match variant {
        PolicyVariant::Legacy => {
            let mut resource = json!({
                "attributes": attributes.iter().map(v1_attribute).collect::<Vec<_>>(),
            });
            if !tags.is_empty() {
                resource["tags"] = Value::Array(tags.iter().map(|t| v1_attribute(t)).collect());
            }
            json!({
                "type": POLICY_TYPE,
                "subjects": [{
                    "attributes": [{ "name": SUBJECT_KEY, "value": config.access_group_id }]
                }],
                "roles": roles,
                "resources": [resource],
            })
        }
        PolicyVariant::Current => {
            let mut resource = json!({
                "attributes": attributes.iter().map(v2_attribute).collect::<Vec<_>>(),
            });
            if !tags.is_empty() {
                resource["tags"] = Value::Array(tags.iter().map(|t| v2_tag(t)).collect());
            }
            let mut body = json!({
                "type": POLICY_TYPE,
                "control": { "grant": { "roles": roles } },
                "subject": {
                    "attributes": [{
                        "key": SUBJECT_KEY,
                        "operator": STRING_EQUALS,
                        "value": config.access_group_id,
                    }]
                },
                "resource": resource,
            });
            if let Some(pattern) = config.pattern.as_ref().filter(|p| !p.is_empty()) {
                body["pattern"] = json!(pattern);
            }
            if let Some(rule) = build_rule(config) {
                body["rule"] = rule;
            }
            body
        }
    };

    if let Some(description) = &config.description {
        body["description"] = json!(description);
    }

    Ok(body)
}

fn v1_attribute(attr: &ResourceAttribute) -> Value {
    let mut map = Map::new();
    map.insert("name".to_string(), json!(attr.name));
    map.insert("value".to_string(), json!(attr.value));
    if attr.operator != STRING_EQUALS {
        map.insert("operator".to_string(), json!(attr.operator));
    }
    Value::Object(map)
}

fn v2_attribute(attr: &ResourceAttribute) -> Value {
    let value = if attr.operator == STRING_EXISTS {
        json!(attr.value == "true")
    } else {
        json!(attr.value)
    };
    json!({ "key": attr.name, "operator": attr.operator, "value": value })
}

fn v2_tag(tag: &ResourceAttribute) -> Value {
    json!({ "key": tag.name, "value": tag.value, "operator": tag.operator })
}

/// A single condition is sent bare unless an operator was given
fn build_rule(config: &AccessGroupPolicyConfig) -> Option<Value> {
    let conditions: Vec<Value> = config
        .rule_conditions
        .iter()
        .flatten()
        .map(|c| {
            let value = match c.value.as_slice() {
                [single] => json!(single),
                many => json!(many),
            };
            json!({ "key": c.key, "operator": c.operator, "value": value })
        })
        .collect();

    match (conditions.len(), &config.rule_operator) {
        (0, _) => None,
        (1, None) => conditions.into_iter().next(),
        (_, operator) => Some(json!({
            "operator": operator.as_deref().unwrap_or("and"),
            "conditions": conditions,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::policy::model::RuleCondition;
    use std::collections::BTreeSet;

    fn base() -> AccessGroupPolicyConfig {
        AccessGroupPolicyConfig {
            access_group_id: "AccessGroupId-1".to_string(),
            roles: vec!["Viewer".to_string()],
            ..Default::default()
        }
    }

    fn crns() -> Vec<String> {
        vec!["crn:v1:bluemix:public:iam::::role:Viewer".to_string()]
    }

    #[test]
    fn test_conflicting_groups_rejected() {
        let config = AccessGroupPolicyConfig {
            resources: Some(PolicyResources {
                service: Some("kms".to_string()),
                ..Default::default()
            }),
            resource_attributes: Some(BTreeSet::from([ResourceAttribute::new("serviceName", "kms")])),
            ..base()
        };
        let err = validate(&config).unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
        assert!(err.to_string().contains("resources and resource_attributes"));

        let config = AccessGroupPolicyConfig {
            account_management: true,
            resources: Some(PolicyResources::default()),
            ..base()
        };
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rule_operator_requires_conditions() {
        let config = AccessGroupPolicyConfig {
            rule_operator: Some("and".to_string()),
            ..base()
        };
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_implicit_service_type_and_account() {
        let attrs = scoped_attributes(&base(), "acct-1");
        assert_eq!(
            attrs,
            vec![
                ResourceAttribute::new(SERVICE_TYPE_KEY, SERVICE_TYPE_SERVICE),
                ResourceAttribute::new(ACCOUNT_ID_KEY, "acct-1"),
            ]
        );

        let config = AccessGroupPolicyConfig {
            account_management: true,
            ..base()
        };
        assert_eq!(
            scoped_attributes(&config, "acct-1")[0],
            ResourceAttribute::new(SERVICE_TYPE_KEY, SERVICE_TYPE_PLATFORM)
        );
    }

    #[test]
    fn test_legacy_body_shape() {
        let config = AccessGroupPolicyConfig {
            resources: Some(PolicyResources {
                service: Some("cloud-object-storage".to_string()),
                region: Some("us-south".to_string()),
                ..Default::default()
            }),
            description: Some("cos readers".to_string()),
            ..base()
        };
        let body = build_request(&config, "acct-1", &crns(), PolicyVariant::Legacy).unwrap();

        assert_eq!(body["type"], "access");
        assert_eq!(body["subjects"][0]["attributes"][0]["value"], "AccessGroupId-1");
        assert_eq!(body["roles"][0]["role_id"], crns()[0]);
        let attrs = body["resources"][0]["attributes"].as_array().unwrap();
        assert_eq!(attrs[0], json!({"name": "serviceName", "value": "cloud-object-storage"}));
        assert_eq!(attrs[1], json!({"name": "region", "value": "us-south"}));
        assert_eq!(attrs[2], json!({"name": "accountId", "value": "acct-1"}));
        assert_eq!(body["description"], "cos readers");
        assert!(body.get("rule").is_none());
    }

    #[test]
    fn test_current_body_with_rule_and_pattern() {
        let config = AccessGroupPolicyConfig {
            rule_conditions: Some(BTreeSet::from([
                RuleCondition {
                    key: "{{environment.attributes.current_time}}".to_string(),
                    operator: "timeGreaterThanOrEquals".to_string(),
                    value: vec!["09:00:00+00:00".to_string()],
                },
                RuleCondition {
                    key: "{{environment.attributes.current_time}}".to_string(),
                    operator: "timeLessThanOrEquals".to_string(),
                    value: vec!["17:00:00+00:00".to_string()],
                },
            ])),
            rule_operator: Some("and".to_string()),
            pattern: Some("time-based-conditions:weekly:custom-hours".to_string()),
            ..base()
        };
        let body = build_request(&config, "acct-1", &crns(), PolicyVariant::Current).unwrap();

        assert_eq!(body["control"]["grant"]["roles"][0]["role_id"], crns()[0]);
        assert_eq!(body["subject"]["attributes"][0]["key"], "access_group_id");
        assert_eq!(body["pattern"], "time-based-conditions:weekly:custom-hours");
        assert_eq!(body["rule"]["operator"], "and");
        assert_eq!(body["rule"]["conditions"].as_array().unwrap().len(), 2);
        assert_eq!(body["rule"]["conditions"][0]["value"], "09:00:00+00:00");
    }

    #[test]
    fn test_single_condition_sent_bare() {
        let config = AccessGroupPolicyConfig {
            rule_conditions: Some(BTreeSet::from([RuleCondition {
                key: "{{environment.attributes.day_of_week}}".to_string(),
                operator: "dayOfWeekAnyOf".to_string(),
                value: vec!["1+00:00".to_string(), "2+00:00".to_string()],
            }])),
            ..base()
        };
        let rule = build_rule(&config).unwrap();
        assert_eq!(rule["operator"], "dayOfWeekAnyOf");
        assert_eq!(rule["value"], json!(["1+00:00", "2+00:00"]));
    }

    #[test]
    fn test_service_name_lookup() {
        assert_eq!(service_name(&base()), None);
        let config = AccessGroupPolicyConfig {
            resource_attributes: Some(BTreeSet::from([ResourceAttribute::new("serviceName", "kms")])),
            ..base()
        };
        assert_eq!(service_name(&config), Some("kms"));
    }
}
