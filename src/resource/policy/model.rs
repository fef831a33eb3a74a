//! Desired and stored state of `ibm_iam_access_group_policy`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const STRING_EQUALS: &str = "stringEquals";

fn string_equals() -> String {
    STRING_EQUALS.to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccessGroupPolicyConfig {
    pub access_group_id: String,
    /// Role display names, e.g. `Viewer`, `Manager`
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<PolicyResources>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_attributes: Option<BTreeSet<ResourceAttribute>>,
    /// Grants access to all account management services
    #[serde(default)]
    pub account_management: bool,
    /// Local labels, never sent to the API
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    /// Access management tags the policy is scoped to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_tags: Option<BTreeSet<ResourceAttribute>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_conditions: Option<BTreeSet<RuleCondition>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_operator: Option<String>,
    /// Time-based condition pattern, e.g. `time-based-conditions:once`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// Flat resource scoping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyResources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_instance_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_group_id: Option<String>,
    /// Extra `name=value` attributes
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

/// `{name, value, operator}` triple used for resource attributes and tags
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceAttribute {
    pub name: String,
    pub value: String,
    #[serde(default = "string_equals")]
    pub operator: String,
}

impl ResourceAttribute {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
            operator: string_equals(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleCondition {
    pub key: String,
    pub operator: String,
    pub value: Vec<String>,
}

impl AccessGroupPolicyConfig {
    pub fn has_resources(&self) -> bool {
        self.resources.is_some()
    }

    pub fn has_resource_attributes(&self) -> bool {
        self.resource_attributes.as_ref().is_some_and(|s| !s.is_empty())
    }

    pub fn has_resource_tags(&self) -> bool {
        self.resource_tags.as_ref().is_some_and(|s| !s.is_empty())
    }

    pub fn has_rule_conditions(&self) -> bool {
        self.rule_conditions.as_ref().is_some_and(|s| !s.is_empty())
    }

    pub fn has_pattern(&self) -> bool {
        self.pattern.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Empty groups and strings read back as unset, so they are stored that way
    pub fn normalized(mut self) -> Self {
        fn non_empty<T: Ord>(set: Option<BTreeSet<T>>) -> Option<BTreeSet<T>> {
            set.filter(|s| !s.is_empty())
        }
        fn non_blank(text: Option<String>) -> Option<String> {
            text.filter(|t| !t.is_empty())
        }

        self.resource_attributes = non_empty(self.resource_attributes);
        self.resource_tags = non_empty(self.resource_tags);
        self.rule_conditions = non_empty(self.rule_conditions);
        self.description = non_blank(self.description);
        self.transaction_id = non_blank(self.transaction_id);
        self.pattern = non_blank(self.pattern);
        self
    }
}

/// What is kept between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessGroupPolicyState {
    /// `<access_group_id>/<policy_id>`
    pub id: String,
    pub config: AccessGroupPolicyConfig,
    /// ETag of the last read
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}
