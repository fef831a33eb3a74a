//! Maps a policy read from the v2 endpoint back into configuration shape.
//!
//! Optional groups are only filled in when the prior configuration had them,
//! so server-side defaults never show up as changes the user did not make.

use super::builder::{
    ACCOUNT_ID_KEY, RESOURCE_KEYS, SERVICE_NAME_KEY, SERVICE_TYPE_KEY, SERVICE_TYPE_PLATFORM,
    SERVICE_TYPE_SERVICE, SUBJECT_KEY,
};
use super::model::{
    AccessGroupPolicyConfig, PolicyResources, ResourceAttribute, RuleCondition, STRING_EQUALS,
};
use super::variant::PolicyVariant;
use crate::ibm::roles::RoleCatalog;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;

/// Policy as returned by `GET /v2/policies/{id}` (for both surfaces)
#[derive(Debug, Clone, Deserialize)]
pub struct RemotePolicy {
    pub id: String,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub subject: RemoteAttributes,
    #[serde(default)]
    pub resource: RemoteResource,
    #[serde(default)]
    pub control: Option<RemoteControl>,
    #[serde(default)]
    pub rule: Option<Value>,
    #[serde(default)]
    pub pattern: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteAttributes {
    #[serde(default)]
    pub attributes: Vec<RemoteAttribute>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteResource {
    #[serde(default)]
    pub attributes: Vec<RemoteAttribute>,
    #[serde(default)]
    pub tags: Vec<RemoteAttribute>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteAttribute {
    pub key: String,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteControl {
    pub grant: RemoteGrant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteGrant {
    #[serde(default)]
    pub roles: Vec<RemoteRole>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteRole {
    pub role_id: String,
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn value_to_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().map(value_to_string).collect(),
        other => vec![value_to_string(other)],
    }
}

impl RemoteAttribute {
    fn to_attribute(&self) -> ResourceAttribute {
        ResourceAttribute {
            name: self.key.clone(),
            value: value_to_string(&self.value),
            operator: self
                .operator
                .clone()
                .unwrap_or_else(|| STRING_EQUALS.to_string()),
        }
    }
}

impl RemotePolicy {
    /// A policy without an href was served by the v2 endpoint itself
    pub fn variant(&self) -> PolicyVariant {
        match &self.href {
            Some(href) => PolicyVariant::from_href(href),
            None => PolicyVariant::Current,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.state.as_deref() == Some("deleted")
    }

    pub fn subject_attribute(&self, key: &str) -> Option<String> {
        self.subject
            .attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| value_to_string(&a.value))
    }

    pub fn access_group_id(&self) -> Option<String> {
        self.subject_attribute(SUBJECT_KEY)
    }

    pub fn resource_attribute(&self, key: &str) -> Option<String> {
        self.resource
            .attributes
            .iter()
            .find(|a| a.key == key)
            .map(|a| value_to_string(&a.value))
    }

    /// Service whose roles apply; `None` for platform-wide policies
    pub fn service_name(&self) -> Option<String> {
        self.resource_attribute(SERVICE_NAME_KEY)
    }

    pub fn role_crns(&self) -> Vec<String> {
        self.control
            .as_ref()
            .map(|c| c.grant.roles.iter().map(|r| r.role_id.clone()).collect())
            .unwrap_or_default()
    }

    /// Attributes the user can see: everything but the account scope
    pub fn user_attributes(&self) -> Vec<ResourceAttribute> {
        self.resource
            .attributes
            .iter()
            .filter(|a| a.key != ACCOUNT_ID_KEY)
            .map(RemoteAttribute::to_attribute)
            .collect()
    }

    pub fn flat_resources(&self) -> PolicyResources {
        let mut resources = PolicyResources::default();
        for attr in self.user_attributes() {
            let field = RESOURCE_KEYS
                .iter()
                .find(|(_, key)| *key == attr.name)
                .map(|(field, _)| *field);
            let value = Some(attr.value.clone());
            match field {
                Some("service") => resources.service = value,
                Some("resource_instance_id") => resources.resource_instance_id = value,
                Some("region") => resources.region = value,
                Some("resource_type") => resources.resource_type = value,
                Some("resource") => resources.resource = value,
                Some("resource_group_id") => resources.resource_group_id = value,
                Some("service_type") => resources.service_type = value,
                Some("service_group_id") => resources.service_group_id = value,
                _ => {
                    resources.attributes.insert(attr.name, attr.value);
                }
            }
        }
        resources
    }

    pub fn tags(&self) -> BTreeSet<ResourceAttribute> {
        self.resource
            .tags
            .iter()
            .map(RemoteAttribute::to_attribute)
            .collect()
    }

    /// Rule operator (nested rules only) and conditions
    pub fn rule(&self) -> (Option<String>, BTreeSet<RuleCondition>) {
        let Some(rule) = &self.rule else {
            return (None, BTreeSet::new());
        };

        let parse = |c: &Value| -> Option<RuleCondition> {
            Some(RuleCondition {
                key: c.get("key")?.as_str()?.to_string(),
                operator: c.get("operator")?.as_str()?.to_string(),
                value: c.get("value").map(value_to_list).unwrap_or_default(),
            })
        };

        match rule.get("conditions").and_then(|c| c.as_array()) {
            Some(conditions) => (
                rule.get("operator").and_then(|o| o.as_str()).map(str::to_string),
                conditions.iter().filter_map(parse).collect(),
            ),
            None => (None, parse(rule).into_iter().collect()),
        }
    }

    /// Derived from the `serviceType` sentinel; `None` when neither value is present
    pub fn account_management(&self) -> Option<bool> {
        match self.resource_attribute(SERVICE_TYPE_KEY).as_deref() {
            Some(SERVICE_TYPE_SERVICE) => Some(false),
            Some(SERVICE_TYPE_PLATFORM) => Some(true),
            _ => None,
        }
    }
}

/// Role names in the prior order when the set is unchanged
fn ordered_roles(remote: Vec<String>, prior: &[String]) -> Vec<String> {
    let remote_set: BTreeSet<&String> = remote.iter().collect();
    let prior_set: BTreeSet<&String> = prior.iter().collect();
    if remote_set == prior_set {
        prior.to_vec()
    } else {
        remote
    }
}

/// Rebuild configuration from a remote policy.
///
/// `prior` decides which optional groups are reported and supplies the
/// local-only fields.
pub fn flatten(
    remote: &RemotePolicy,
    prior: &AccessGroupPolicyConfig,
    catalog: &RoleCatalog,
    transaction_id: Option<&str>,
) -> AccessGroupPolicyConfig {
    let roles = remote
        .role_crns()
        .iter()
        .map(|crn| catalog.name_for(crn))
        .collect();
    let (rule_operator, rule_conditions) = remote.rule();

    AccessGroupPolicyConfig {
        access_group_id: remote
            .access_group_id()
            .unwrap_or_else(|| prior.access_group_id.clone()),
        roles: ordered_roles(roles, &prior.roles),
        resources: prior.resources.as_ref().map(|_| remote.flat_resources()),
        resource_attributes: prior
            .has_resource_attributes()
            .then(|| remote.user_attributes().into_iter().collect()),
        account_management: if prior.has_resources() || prior.has_resource_attributes() {
            false
        } else {
            remote
                .account_management()
                .unwrap_or(prior.account_management)
        },
        tags: prior.tags.clone(),
        resource_tags: prior.has_resource_tags().then(|| remote.tags()),
        description: remote
            .description
            .clone()
            .filter(|d| !d.is_empty()),
        transaction_id: transaction_id
            .map(str::to_string)
            .or_else(|| prior.transaction_id.clone()),
        rule_conditions: prior.has_rule_conditions().then_some(rule_conditions),
        rule_operator: prior.rule_operator.as_ref().and(rule_operator),
        pattern: prior
            .has_pattern()
            .then(|| remote.pattern.clone())
            .flatten(),
    }
}

/// Configuration for a policy known only by ID: every group the remote
/// object carries is reported.
pub fn flatten_for_import(remote: &RemotePolicy, catalog: &RoleCatalog) -> AccessGroupPolicyConfig {
    let (rule_operator, rule_conditions) = remote.rule();
    let user_attributes = remote.user_attributes();
    let account_management = remote.account_management() == Some(true);

    // A bare `serviceType=service` scope is what an unscoped policy looks like.
    let unscoped = user_attributes.len() == 1
        && remote.account_management() == Some(false)
        && remote.service_name().is_none();
    let flat = user_attributes.iter().all(|a| a.operator == STRING_EQUALS);

    let (resources, resource_attributes) = if account_management || unscoped {
        (None, None)
    } else if flat {
        (Some(remote.flat_resources()), None)
    } else {
        (None, Some(user_attributes.into_iter().collect()))
    };

    let tags = remote.tags();
    let roles = remote
        .role_crns()
        .iter()
        .map(|crn| catalog.name_for(crn))
        .collect();

    AccessGroupPolicyConfig {
        access_group_id: remote.access_group_id().unwrap_or_default(),
        roles,
        resources,
        resource_attributes,
        account_management,
        tags: BTreeSet::new(),
        resource_tags: (!tags.is_empty()).then_some(tags),
        description: remote.description.clone().filter(|d| !d.is_empty()),
        transaction_id: None,
        rule_conditions: (!rule_conditions.is_empty()).then_some(rule_conditions),
        rule_operator,
        pattern: remote.pattern.clone(),
    }
}
