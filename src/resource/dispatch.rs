//! Type-erased entry points
//!
//! The driver works on JSON values keyed by type name. This module maps a
//! type name to its reconciler or data-source reader and converts between
//! JSON and the typed config/state on the way in and out.

use super::metrics_router::{MetricsRouterRoute, MetricsRouterTarget};
use super::policy::AccessGroupPolicy;
use super::reconciler::Reconciler;
use super::scc;
use super::settle;
use crate::error::{ProviderError, Result};
use crate::ibm::client::IbmClient;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// What an apply has to do to bring one resource in line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    None,
    Update,
    Replace,
}

/// Run `$body` with `$r` bound to the reconciler for `$type_name`
macro_rules! with_reconciler {
    ($type_name:expr, $r:ident => $body:expr) => {{
        let type_name: &str = $type_name;
        if type_name == AccessGroupPolicy::TYPE_NAME {
            let $r = AccessGroupPolicy;
            $body
        } else if type_name == MetricsRouterTarget::TYPE_NAME {
            let $r = MetricsRouterTarget;
            $body
        } else if type_name == MetricsRouterRoute::TYPE_NAME {
            let $r = MetricsRouterRoute;
            $body
        } else {
            Err(ProviderError::validation(format!(
                "unknown resource type {:?}",
                type_name
            )))
        }
    }};
}

fn decode<T: DeserializeOwned>(type_name: &str, what: &str, value: &Value) -> Result<T> {
    serde_json::from_value(value.clone())
        .map_err(|e| ProviderError::validation(format!("invalid {type_name} {what}: {e}")))
}

fn encode<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn config_of<R: Reconciler>(r: &R, config: &Value) -> Result<R::Config> {
    let config = r.normalize(decode(R::TYPE_NAME, "config", config)?);
    r.validate(&config)?;
    Ok(config)
}

fn state_for<R: Reconciler>(_r: &R, state: &Value) -> Result<R::State> {
    decode(R::TYPE_NAME, "state", state)
}

pub fn is_resource_type(type_name: &str) -> bool {
    [
        AccessGroupPolicy::TYPE_NAME,
        MetricsRouterTarget::TYPE_NAME,
        MetricsRouterRoute::TYPE_NAME,
    ]
    .contains(&type_name)
}

/// Decode and validate a config without any remote call
pub fn validate(type_name: &str, config: &Value) -> Result<()> {
    with_reconciler!(type_name, r => config_of(&r, config).map(|_| ()))
}

pub async fn create(type_name: &str, client: &IbmClient, config: &Value) -> Result<Value> {
    with_reconciler!(type_name, r => {
        let config = config_of(&r, config)?;
        encode(&r.create(client, &config).await?)
    })
}

pub async fn read(type_name: &str, client: &IbmClient, state: &Value) -> Result<Option<Value>> {
    with_reconciler!(type_name, r => {
        let prior = state_for(&r, state)?;
        match r.read(client, &prior).await? {
            Some(state) => Ok(Some(encode(&state)?)),
            None => Ok(None),
        }
    })
}

/// Poll an unconfirmed create until it is readable.
///
/// An object that is still missing when the settle window closes is never
/// reported as gone: the error is [`ProviderError::Settle`] with its ID.
pub async fn confirm(type_name: &str, client: &IbmClient, state: &Value) -> Result<Value> {
    with_reconciler!(type_name, r => {
        let prior = state_for(&r, state)?;
        let id = r.state_id(&prior).to_string();
        let what = format!("{type_name} {id}");

        let (r, prior, label) = (&r, &prior, what.as_str());
        let found = settle::wait_until_readable(&what, &client.settle, || async move {
            r.read(client, prior)
                .await?
                .ok_or_else(|| ProviderError::not_found(label))
        })
        .await
        .map_err(|e| match e {
            ProviderError::Timeout { .. } => ProviderError::Settle {
                id,
                source: Box::new(e),
            },
            other => other,
        })?;
        encode(&found)
    })
}

pub async fn update(
    type_name: &str,
    client: &IbmClient,
    state: &Value,
    config: &Value,
) -> Result<Value> {
    with_reconciler!(type_name, r => {
        let prior = state_for(&r, state)?;
        let config = config_of(&r, config)?;
        encode(&r.update(client, &prior, &config).await?)
    })
}

pub async fn delete(type_name: &str, client: &IbmClient, state: &Value) -> Result<()> {
    with_reconciler!(type_name, r => {
        let prior = state_for(&r, state)?;
        r.delete(client, &prior).await
    })
}

pub async fn import(type_name: &str, client: &IbmClient, id: &str) -> Result<Value> {
    with_reconciler!(type_name, r => encode(&r.import(client, id).await?))
}

/// State holding only `id` and the desired config
pub fn placeholder(type_name: &str, id: &str, config: &Value) -> Result<Value> {
    with_reconciler!(type_name, r => {
        let config = config_of(&r, config)?;
        encode(&r.placeholder(id, &config))
    })
}

/// ID recorded in a stored state
pub fn state_id(type_name: &str, state: &Value) -> Result<String> {
    with_reconciler!(type_name, r => {
        let state = state_for(&r, state)?;
        Ok(r.state_id(&state).to_string())
    })
}

/// Compare a stored state with a desired config
pub fn plan_change(type_name: &str, state: &Value, config: &Value) -> Result<Change> {
    with_reconciler!(type_name, r => {
        let prior = state_for(&r, state)?;
        let desired = config_of(&r, config)?;
        let current = r.state_config(&prior);
        Ok(if r.requires_replace(current, &desired) {
            Change::Replace
        } else if r.needs_update(current, &desired) {
            Change::Update
        } else {
            Change::None
        })
    })
}

/// Read a data source; `args` is a JSON object of its arguments
pub async fn read_data_source(kind: &str, client: &IbmClient, args: &Value) -> Result<Value> {
    match kind {
        scc::REPORT => encode(&scc::read_report(client, required_arg(args, "report_id")?).await?),
        scc::LATEST_REPORTS => {
            let sort = args.get("sort").and_then(|v| v.as_str());
            encode(&scc::read_latest_reports(client, sort).await?)
        }
        scc::REPORT_EVALUATIONS => {
            let report_id = required_arg(args, "report_id")?;
            let mut rest = args.clone();
            if let Value::Object(map) = &mut rest {
                map.remove("report_id");
            }
            let filter: scc::EvaluationFilter = decode(kind, "arguments", &rest)?;
            encode(&scc::read_report_evaluations(client, report_id, &filter).await?)
        }
        scc::PROVIDER_TYPE => encode(
            &scc::read_provider_type(client, required_arg(args, "provider_type_id")?).await?,
        ),
        other => Err(ProviderError::validation(format!(
            "unknown data source {other:?}"
        ))),
    }
}

fn required_arg<'a>(args: &'a Value, name: &str) -> Result<&'a str> {
    args.get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ProviderError::validation(format!("argument {name} is required")))
}
