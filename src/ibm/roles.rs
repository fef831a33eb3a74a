//! IAM Roles
//!
//! Policies name roles by display name; the API wants role CRNs. The catalog
//! maps between the two for one service (or the platform roles).

use super::client::IbmClient;
use super::http::RequestOptions;
use crate::error::{ProviderError, Result};
use serde_json::Value;

/// Role information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub display_name: String,
    pub crn: String,
}

impl Role {
    fn from_value(value: &Value) -> Option<Self> {
        let crn = value.get("crn").and_then(|v| v.as_str())?;
        let display_name = value
            .get("display_name")
            .or_else(|| value.get("name"))
            .and_then(|v| v.as_str())?;
        Some(Self {
            display_name: display_name.to_string(),
            crn: crn.to_string(),
        })
    }
}

/// Roles available to a policy
#[derive(Debug, Clone, Default)]
pub struct RoleCatalog {
    roles: Vec<Role>,
}

impl RoleCatalog {
    pub fn new(roles: Vec<Role>) -> Self {
        Self { roles }
    }

    /// Build from a `/v2/roles` response
    pub fn from_listing(response: &Value) -> Self {
        let roles = ["system_roles", "service_roles", "custom_roles"]
            .iter()
            .filter_map(|group| response.get(*group).and_then(|v| v.as_array()))
            .flatten()
            .filter_map(Role::from_value)
            .collect();
        Self { roles }
    }

    /// Resolve display names to CRNs, preserving order
    pub fn crns_for(&self, names: &[String]) -> Result<Vec<String>> {
        names
            .iter()
            .map(|name| {
                self.roles
                    .iter()
                    .find(|r| r.display_name == *name)
                    .map(|r| r.crn.clone())
                    .ok_or_else(|| {
                        let known: Vec<&str> =
                            self.roles.iter().map(|r| r.display_name.as_str()).collect();
                        ProviderError::validation(format!(
                            "role {:?} is not valid here, expected one of [{}]",
                            name,
                            known.join(", ")
                        ))
                    })
            })
            .collect()
    }

    /// Display name for a CRN, falling back to the last CRN segment
    pub fn name_for(&self, crn: &str) -> String {
        self.roles
            .iter()
            .find(|r| r.crn == crn)
            .map(|r| r.display_name.clone())
            .unwrap_or_else(|| crn.rsplit(':').next().unwrap_or(crn).to_string())
    }
}

/// List roles usable for `service_name`, or the platform roles when `None`
pub async fn list_roles(client: &IbmClient, service_name: Option<&str>) -> Result<RoleCatalog> {
    let account_id = client.require_account_id()?;
    let url = client.roles_url();

    let mut query = vec![("account_id", account_id)];
    if let Some(service) = service_name {
        query.push(("service_name", service));
    }

    let response = client
        .get(
            &url,
            RequestOptions {
                query: &query,
                ..Default::default()
            },
        )
        .await?;

    let catalog = RoleCatalog::from_listing(&response.body);
    tracing::debug!(
        "Loaded {} roles for {}",
        catalog.roles.len(),
        service_name.unwrap_or("platform")
    );
    Ok(catalog)
}
