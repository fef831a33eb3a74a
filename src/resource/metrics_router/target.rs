//! `ibm_metrics_router_target`

use super::{created_id, fetch, fetch_optional, remove, TARGETS};
use crate::error::{ProviderError, Result};
use crate::ibm::client::IbmClient;
use crate::ibm::http::{ApiResponse, RequestOptions};
use crate::resource::reconciler::Reconciler;
use crate::resource::settle;
use crate::resource::validate::{crn_pattern, name_pattern, regexp_len};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    pub name: String,
    /// CRN of the monitoring instance metrics are delivered to
    pub destination_crn: String,
    /// Region the target is stored in; defaults to the endpoint's region
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetState {
    pub id: String,
    pub config: TargetConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RemoteTarget {
    pub id: String,
    pub name: String,
    pub destination_crn: String,
    #[serde(default)]
    pub crn: Option<String>,
    #[serde(default)]
    pub target_type: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn request_body(config: &TargetConfig) -> Value {
    let mut body = json!({
        "name": config.name,
        "destination_crn": config.destination_crn,
    });
    if let Some(region) = &config.region {
        body["region"] = json!(region);
    }
    body
}

/// Remote target as state; `region` is only tracked when it was configured
fn observe(remote: RemoteTarget, response: &ApiResponse, prior: &TargetConfig) -> TargetState {
    let region = match &prior.region {
        Some(configured) => Some(remote.region.unwrap_or_else(|| configured.clone())),
        None => None,
    };
    TargetState {
        id: remote.id,
        config: TargetConfig {
            name: remote.name,
            destination_crn: remote.destination_crn,
            region,
        },
        crn: remote.crn,
        target_type: remote.target_type,
        created_at: remote.created_at,
        updated_at: remote.updated_at,
        version: response.etag.clone(),
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsRouterTarget;

#[async_trait]
impl Reconciler for MetricsRouterTarget {
    type Config = TargetConfig;
    type State = TargetState;

    const TYPE_NAME: &'static str = "ibm_metrics_router_target";

    fn validate(&self, config: &Self::Config) -> Result<()> {
        regexp_len("name", &config.name, name_pattern(), 1, 1000)?;
        regexp_len("destination_crn", &config.destination_crn, crn_pattern(), 3, 1000)?;
        if let Some(region) = &config.region {
            regexp_len("region", region, name_pattern(), 3, 1000)?;
        }
        Ok(())
    }

    async fn create(&self, client: &IbmClient, config: &Self::Config) -> Result<Self::State> {
        self.validate(config)?;
        let body = request_body(config);
        let created = client
            .post(
                &client.metrics_router_url(TARGETS, None),
                RequestOptions {
                    body: Some(&body),
                    ..Default::default()
                },
            )
            .await?;
        let id = created_id(&created)?;
        tracing::info!("Created metrics router target {} ({})", config.name, id);

        let what = format!("metrics router target {id}");
        let (remote, response) = settle::wait_until_readable(&what, &client.settle, || {
            fetch::<RemoteTarget>(client, TARGETS, &id)
        })
        .await
        .map_err(|e| ProviderError::Settle {
            id: id.clone(),
            source: Box::new(e),
        })?;

        Ok(observe(remote, &response, config))
    }

    async fn read(&self, client: &IbmClient, prior: &Self::State) -> Result<Option<Self::State>> {
        let Some((remote, response)) =
            fetch_optional::<RemoteTarget>(client, TARGETS, &prior.id).await?
        else {
            tracing::info!("Metrics router target {} no longer exists", prior.id);
            return Ok(None);
        };
        Ok(Some(observe(remote, &response, &prior.config)))
    }

    async fn update(
        &self,
        client: &IbmClient,
        prior: &Self::State,
        config: &Self::Config,
    ) -> Result<Self::State> {
        self.validate(config)?;
        let body = request_body(config);
        let updated = client
            .patch(
                &client.metrics_router_url(TARGETS, Some(&prior.id)),
                RequestOptions {
                    body: Some(&body),
                    if_match: prior.version.as_deref(),
                    ..Default::default()
                },
            )
            .await?;
        tracing::info!("Updated metrics router target {}", prior.id);

        let remote: RemoteTarget = serde_json::from_value(updated.body.clone())?;
        Ok(observe(remote, &updated, config))
    }

    async fn delete(&self, client: &IbmClient, prior: &Self::State) -> Result<()> {
        remove(client, TARGETS, &prior.id).await?;
        tracing::info!("Deleted metrics router target {}", prior.id);
        Ok(())
    }

    async fn import(&self, client: &IbmClient, id: &str) -> Result<Self::State> {
        let (remote, response) = fetch::<RemoteTarget>(client, TARGETS, id).await?;
        let prior = TargetConfig {
            region: remote.region.clone(),
            ..Default::default()
        };
        Ok(observe(remote, &response, &prior))
    }

    fn placeholder(&self, id: &str, config: &Self::Config) -> Self::State {
        TargetState {
            id: id.to_string(),
            config: config.clone(),
            crn: None,
            target_type: None,
            created_at: None,
            updated_at: None,
            version: None,
        }
    }

    fn state_id<'a>(&self, state: &'a Self::State) -> &'a str {
        &state.id
    }

    fn state_config<'a>(&self, state: &'a Self::State) -> &'a Self::Config {
        &state.config
    }

    /// A target cannot move between regions
    fn requires_replace(&self, prior: &Self::Config, desired: &Self::Config) -> bool {
        prior.region != desired.region
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(region: Option<&str>) -> RemoteTarget {
        serde_json::from_value(json!({
            "id": "t-1",
            "name": "my-mr-target",
            "destination_crn": "crn:v1:bluemix:public:sysdig-monitor:us-south:a/1:2::",
            "crn": "crn:v1:bluemix:public:metrics-router:us-south:a/1::target:t-1",
            "target_type": "sysdig_monitor",
            "region": region,
            "created_at": "2023-04-01T12:00:00Z",
            "updated_at": "2023-04-01T12:00:00.5Z"
        }))
        .unwrap()
    }

    fn response() -> ApiResponse {
        ApiResponse {
            status: 200,
            etag: None,
            transaction_id: None,
            body: Value::Null,
        }
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let good = TargetConfig {
            name: "my-mr-target".to_string(),
            destination_crn: "crn:v1:bluemix:public:sysdig-monitor:us-south:a/1:2::".to_string(),
            region: Some("us-south".to_string()),
        };
        assert!(MetricsRouterTarget.validate(&good).is_ok());

        let bad_name = TargetConfig {
            name: "$$dummy name".to_string(),
            ..good.clone()
        };
        let err = MetricsRouterTarget.validate(&bad_name).unwrap_err();
        assert!(err.to_string().contains("should match regexp"));

        let bad_crn = TargetConfig {
            destination_crn: "$dummy destination CRN #*^()".to_string(),
            ..good.clone()
        };
        assert!(MetricsRouterTarget.validate(&bad_crn).is_err());

        let short_region = TargetConfig {
            region: Some("us".to_string()),
            ..good
        };
        assert!(MetricsRouterTarget.validate(&short_region).is_err());
    }

    #[test]
    fn test_region_tracked_only_when_configured() {
        let unconfigured = TargetConfig::default();
        let state = observe(remote(Some("us-south")), &response(), &unconfigured);
        assert_eq!(state.config.region, None);
        assert_eq!(state.target_type.as_deref(), Some("sysdig_monitor"));
        assert!(state.created_at.is_some());

        let configured = TargetConfig {
            region: Some("us-south".to_string()),
            ..Default::default()
        };
        let state = observe(remote(Some("us-east")), &response(), &configured);
        assert_eq!(state.config.region.as_deref(), Some("us-east"));
    }

    #[test]
    fn test_region_change_requires_replace() {
        let a = TargetConfig {
            region: Some("us-south".to_string()),
            ..Default::default()
        };
        let b = TargetConfig {
            region: Some("us-east".to_string()),
            ..Default::default()
        };
        assert!(MetricsRouterTarget.requires_replace(&a, &b));
        assert!(!MetricsRouterTarget.requires_replace(&a, &a));
    }

    #[test]
    fn test_request_body_omits_unset_region() {
        let body = request_body(&TargetConfig {
            name: "n".to_string(),
            destination_crn: "crn".to_string(),
            region: None,
        });
        assert!(body.get("region").is_none());
    }
}
