//! Metrics Routing v3: targets and routes
//!
//! Both objects live in flat collections (`/targets`, `/routes`) and are
//! addressed by their plain server-assigned ID.

pub mod route;
pub mod target;

pub use route::{InclusionFilter, MetricsRouterRoute, RouteConfig, RouteRule, RouteState};
pub use target::{MetricsRouterTarget, TargetConfig, TargetState};

use crate::error::{ProviderError, Result};
use crate::ibm::client::IbmClient;
use crate::ibm::http::{ApiResponse, RequestOptions};
use serde::de::DeserializeOwned;

pub(crate) const TARGETS: &str = "targets";
pub(crate) const ROUTES: &str = "routes";

/// GET one object and decode it
pub(crate) async fn fetch<T: DeserializeOwned>(
    client: &IbmClient,
    collection: &str,
    id: &str,
) -> Result<(T, ApiResponse)> {
    let response = client
        .get(&client.metrics_router_url(collection, Some(id)), RequestOptions::default())
        .await?;
    let object = serde_json::from_value(response.body.clone())?;
    Ok((object, response))
}

/// Like [`fetch`], mapping NotFound to `None`
pub(crate) async fn fetch_optional<T: DeserializeOwned>(
    client: &IbmClient,
    collection: &str,
    id: &str,
) -> Result<Option<(T, ApiResponse)>> {
    match fetch(client, collection, id).await {
        Ok(found) => Ok(Some(found)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// DELETE, treating an already missing object as deleted
pub(crate) async fn remove(client: &IbmClient, collection: &str, id: &str) -> Result<()> {
    match client
        .delete(&client.metrics_router_url(collection, Some(id)), RequestOptions::default())
        .await
    {
        Ok(_) => Ok(()),
        Err(e) if e.is_not_found() => {
            tracing::info!("{} {} already gone", collection, id);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// ID of a freshly created object
pub(crate) fn created_id(response: &ApiResponse) -> Result<String> {
    response
        .body
        .get("id")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| ProviderError::Api {
            status: response.status,
            message: "create response carried no id".to_string(),
            transaction_id: response.transaction_id.clone(),
        })
}
