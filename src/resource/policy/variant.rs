//! Legacy (v1) versus current (v2) policy surfaces.
//!
//! The surface chosen at create time is not stored anywhere; it is recovered
//! from the `href` of the object returned by the v2 read endpoint.

use super::model::AccessGroupPolicyConfig;
use crate::error::{ProviderError, Result};
use std::fmt;

const V2_PATH_MARKER: &str = "/v2/policies";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyVariant {
    /// `/v1/policies`: roles and flat resources only
    Legacy,
    /// `/v2/policies`: adds rule conditions and time patterns
    Current,
}

impl PolicyVariant {
    /// Variant a new policy is created with
    pub fn for_config(config: &AccessGroupPolicyConfig) -> Self {
        if config.has_rule_conditions() || config.has_pattern() {
            PolicyVariant::Current
        } else {
            PolicyVariant::Legacy
        }
    }

    /// Variant that owns an existing policy
    pub fn from_href(href: &str) -> Self {
        if href.contains(V2_PATH_MARKER) {
            PolicyVariant::Current
        } else {
            PolicyVariant::Legacy
        }
    }

    /// Rule conditions and patterns cannot be added to a legacy policy in place.
    pub fn check_update(self, desired: &AccessGroupPolicyConfig) -> Result<()> {
        if self == PolicyVariant::Legacy
            && (desired.has_rule_conditions()
                || desired.has_pattern()
                || desired.rule_operator.is_some())
        {
            return Err(ProviderError::ConfigurationConstraint(
                "Cannot use rule_conditions, rule_operator, or pattern when updating v1/policy. \
                 Delete existing v1/policy and create using rule_conditions and pattern."
                    .to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for PolicyVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyVariant::Legacy => write!(f, "v1"),
            PolicyVariant::Current => write!(f, "v2"),
        }
    }
}
