//! `ibm_metrics_router_route`
//!
//! A route sends metrics to targets. Rules are OR'ed; the inclusion filters
//! inside one rule are AND'ed. Order of rules, target IDs, filters and filter
//! values is preserved end to end.

use super::{created_id, fetch, fetch_optional, remove, ROUTES};
use crate::error::{ProviderError, Result};
use crate::ibm::client::IbmClient;
use crate::ibm::http::{ApiResponse, RequestOptions};
use crate::resource::reconciler::Reconciler;
use crate::resource::settle;
use crate::resource::validate::{allowed_value, name_pattern, non_empty, regexp_len};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const OPERANDS: &[&str] = &[
    "location",
    "service_name",
    "service_instance",
    "resource_type",
    "resource",
];
pub const OPERATORS: &[&str] = &["is", "in"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    pub name: String,
    pub rules: Vec<RouteRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteRule {
    pub target_ids: Vec<String>,
    #[serde(default)]
    pub inclusion_filters: Vec<InclusionFilter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InclusionFilter {
    pub operand: String,
    pub operator: String,
    pub value: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteState {
    pub id: String,
    pub config: RouteConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

// API shapes: targets are objects, filter values are `values`

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RemoteRoute {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub crn: Option<String>,
    #[serde(default)]
    pub rules: Vec<RemoteRule>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RemoteRule {
    #[serde(default)]
    pub targets: Vec<RemoteTargetRef>,
    #[serde(default)]
    pub inclusion_filters: Vec<RemoteFilter>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RemoteTargetRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RemoteFilter {
    pub operand: String,
    pub operator: String,
    #[serde(default)]
    pub values: Vec<String>,
}

fn request_body(config: &RouteConfig) -> Value {
    let rules: Vec<Value> = config
        .rules
        .iter()
        .map(|rule| {
            json!({
                "targets": rule
                    .target_ids
                    .iter()
                    .map(|id| json!({"id": id}))
                    .collect::<Vec<_>>(),
                "inclusion_filters": rule
                    .inclusion_filters
                    .iter()
                    .map(|f| json!({
                        "operand": f.operand,
                        "operator": f.operator,
                        "values": f.value,
                    }))
                    .collect::<Vec<_>>(),
            })
        })
        .collect();
    json!({ "name": config.name, "rules": rules })
}

fn observe(remote: RemoteRoute, response: &ApiResponse) -> RouteState {
    let rules = remote
        .rules
        .into_iter()
        .map(|rule| RouteRule {
            target_ids: rule.targets.into_iter().map(|t| t.id).collect(),
            inclusion_filters: rule
                .inclusion_filters
                .into_iter()
                .map(|f| InclusionFilter {
                    operand: f.operand,
                    operator: f.operator,
                    value: f.values,
                })
                .collect(),
        })
        .collect();
    RouteState {
        id: remote.id,
        config: RouteConfig {
            name: remote.name,
            rules,
        },
        crn: remote.crn,
        created_at: remote.created_at,
        updated_at: remote.updated_at,
        version: response.etag.clone(),
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsRouterRoute;

#[async_trait]
impl Reconciler for MetricsRouterRoute {
    type Config = RouteConfig;
    type State = RouteState;

    const TYPE_NAME: &'static str = "ibm_metrics_router_route";

    fn validate(&self, config: &Self::Config) -> Result<()> {
        regexp_len("name", &config.name, name_pattern(), 1, 1000)?;
        non_empty("rules", &config.rules)?;
        for (i, rule) in config.rules.iter().enumerate() {
            non_empty(&format!("rules.{i}.target_ids"), &rule.target_ids)?;
            for (j, filter) in rule.inclusion_filters.iter().enumerate() {
                let prefix = format!("rules.{i}.inclusion_filters.{j}");
                allowed_value(&format!("{prefix}.operand"), &filter.operand, OPERANDS)?;
                allowed_value(&format!("{prefix}.operator"), &filter.operator, OPERATORS)?;
                non_empty(&format!("{prefix}.value"), &filter.value)?;
            }
        }
        Ok(())
    }

    async fn create(&self, client: &IbmClient, config: &Self::Config) -> Result<Self::State> {
        self.validate(config)?;
        let body = request_body(config);
        let created = client
            .post(
                &client.metrics_router_url(ROUTES, None),
                RequestOptions {
                    body: Some(&body),
                    ..Default::default()
                },
            )
            .await?;
        let id = created_id(&created)?;
        tracing::info!("Created metrics router route {} ({})", config.name, id);

        let what = format!("metrics router route {id}");
        let (remote, response) = settle::wait_until_readable(&what, &client.settle, || {
            fetch::<RemoteRoute>(client, ROUTES, &id)
        })
        .await
        .map_err(|e| ProviderError::Settle {
            id: id.clone(),
            source: Box::new(e),
        })?;

        Ok(observe(remote, &response))
    }

    async fn read(&self, client: &IbmClient, prior: &Self::State) -> Result<Option<Self::State>> {
        let Some((remote, response)) =
            fetch_optional::<RemoteRoute>(client, ROUTES, &prior.id).await?
        else {
            tracing::info!("Metrics router route {} no longer exists", prior.id);
            return Ok(None);
        };
        Ok(Some(observe(remote, &response)))
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
                &client.metrics_router_url(ROUTES, Some(&prior.id)),
                RequestOptions {
                    body: Some(&body),
                    if_match: prior.version.as_deref(),
                    ..Default::default()
                },
            )
            .await?;
        tracing::info!("Updated metrics router route {}", prior.id);

        let remote: RemoteRoute = serde_json::from_value(updated.body.clone())?;
        Ok(observe(remote, &updated))
    }

    async fn delete(&self, client: &IbmClient, prior: &Self::State) -> Result<()> {
        remove(client, ROUTES, &prior.id).await?;
        tracing::info!("Deleted metrics router route {}", prior.id);
        Ok(())
    }

    async fn import(&self, client: &IbmClient, id: &str) -> Result<Self::State> {
        let (remote, response) = fetch::<RemoteRoute>(client, ROUTES, id).await?;
        Ok(observe(remote, &response))
    }

    fn placeholder(&self, id: &str, config: &Self::Config) -> Self::State {
        RouteState {
            id: id.to_string(),
            config: config.clone(),
            crn: None,
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
}
