//! IBM Cloud Client
//!
//! Main client for interacting with IBM Cloud APIs, combining authentication
//! and HTTP functionality.

use super::auth::IamCredentials;
use super::http::{ApiResponse, IbmHttpClient, RequestOptions};
use crate::config::Config;
use crate::error::{ProviderError, Result};
use reqwest::Method;
use std::time::Duration;

/// Poll settings applied after every create
#[derive(Debug, Clone, Copy)]
pub struct SettleSettings {
    pub timeout: Duration,
    pub interval: Duration,
    pub retry_transient: bool,
}

impl Default for SettleSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5 * 60),
            interval: Duration::from_secs(1),
            retry_transient: false,
        }
    }
}

/// Base URLs of the services used by the reconcilers
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub iam_policy: String,
    pub metrics_router: String,
    pub scc: String,
}

impl Endpoints {
    /// Every service behind the same base URL (mock servers)
    pub fn single(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_string();
        Self {
            iam_policy: base.clone(),
            metrics_router: base.clone(),
            scc: base,
        }
    }
}

/// Main IBM Cloud client
#[derive(Clone)]
pub struct IbmClient {
    pub credentials: IamCredentials,
    pub http: IbmHttpClient,
    pub account_id: Option<String>,
    pub region: String,
    pub scc_instance_id: Option<String>,
    pub endpoints: Endpoints,
    pub settle: SettleSettings,
}

impl IbmClient {
    /// Create a client from the resolved configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = IbmHttpClient::new()?;
        let api_key = config.effective_api_key().unwrap_or_default();
        let credentials =
            IamCredentials::from_api_key(&api_key, &config.effective_iam_endpoint(), http.inner().clone())?;
        let region = config.effective_region();

        Ok(Self {
            credentials,
            http,
            account_id: config.effective_account_id(),
            scc_instance_id: config.effective_scc_instance_id(),
            endpoints: Endpoints {
                iam_policy: config.effective_iam_policy_endpoint(),
                metrics_router: config.effective_metrics_router_endpoint(&region),
                scc: config.effective_scc_endpoint(&region),
            },
            region,
            settle: SettleSettings {
                timeout: config.settle_timeout(),
                interval: config.settle_interval(),
                retry_transient: config.retry_transient_while_settling,
            },
        })
    }

    /// Client with a fixed token and explicit endpoints
    pub fn with_token(token: &str, endpoints: Endpoints) -> Result<Self> {
        Ok(Self {
            credentials: IamCredentials::from_token(token),
            http: IbmHttpClient::new()?,
            account_id: None,
            region: crate::config::DEFAULT_REGION.to_string(),
            scc_instance_id: None,
            endpoints,
            settle: SettleSettings::default(),
        })
    }

    pub fn with_account(mut self, account_id: &str) -> Self {
        self.account_id = Some(account_id.to_string());
        self
    }

    pub fn with_scc_instance(mut self, instance_id: &str) -> Self {
        self.scc_instance_id = Some(instance_id.to_string());
        self
    }

    pub fn with_settle(mut self, settle: SettleSettings) -> Self {
        self.settle = settle;
        self
    }

    /// Account ID, required for policy scoping
    pub fn require_account_id(&self) -> Result<&str> {
        self.account_id.as_deref().ok_or_else(|| {
            ProviderError::validation("account ID is not configured. Set IBMCLOUD_ACCOUNT_ID")
        })
    }

    pub fn require_scc_instance_id(&self) -> Result<&str> {
        self.scc_instance_id.as_deref().ok_or_else(|| {
            ProviderError::validation(
                "Security and Compliance Center instance ID is not configured. Set IBMCLOUD_SCC_INSTANCE_ID",
            )
        })
    }

    pub async fn request(
        &self,
        method: Method,
        url: &str,
        opts: RequestOptions<'_>,
    ) -> Result<ApiResponse> {
        let token = self.credentials.get_token().await?;
        self.http.send(method, url, &token, opts).await
    }

    pub async fn get(&self, url: &str, opts: RequestOptions<'_>) -> Result<ApiResponse> {
        self.request(Method::GET, url, opts).await
    }

    pub async fn post(&self, url: &str, opts: RequestOptions<'_>) -> Result<ApiResponse> {
        self.request(Method::POST, url, opts).await
    }

    pub async fn put(&self, url: &str, opts: RequestOptions<'_>) -> Result<ApiResponse> {
        self.request(Method::PUT, url, opts).await
    }

    pub async fn patch(&self, url: &str, opts: RequestOptions<'_>) -> Result<ApiResponse> {
        self.request(Method::PATCH, url, opts).await
    }

    pub async fn delete(&self, url: &str, opts: RequestOptions<'_>) -> Result<ApiResponse> {
        self.request(Method::DELETE, url, opts).await
    }

    // =========================================================================
    // IAM Policy Management API helpers
    // =========================================================================

    /// Legacy policy collection or item (`/v1/policies[/id]`)
    pub fn v1_policy_url(&self, id: Option<&str>) -> String {
        item_url(&format!("{}/v1/policies", self.endpoints.iam_policy), id)
    }

    /// Current policy collection or item (`/v2/policies[/id]`)
    pub fn v2_policy_url(&self, id: Option<&str>) -> String {
        item_url(&format!("{}/v2/policies", self.endpoints.iam_policy), id)
    }

    pub fn roles_url(&self) -> String {
        format!("{}/v2/roles", self.endpoints.iam_policy)
    }

    // =========================================================================
    // Metrics Router API helpers
    // =========================================================================

    pub fn metrics_router_url(&self, collection: &str, id: Option<&str>) -> String {
        item_url(&format!("{}/{}", self.endpoints.metrics_router, collection), id)
    }

    // =========================================================================
    // Security and Compliance Center API helpers
    // =========================================================================

    /// Instance-scoped SCC URL
    pub fn scc_url(&self, path: &str) -> Result<String> {
        let instance = self.require_scc_instance_id()?;
        Ok(format!(
            "{}/instances/{}/v3/{}",
            self.endpoints.scc,
            urlencoding::encode(instance),
            path
        ))
    }
}

fn item_url(collection: &str, id: Option<&str>) -> String {
    match id {
        Some(id) => format!("{}/{}", collection, urlencoding::encode(id)),
        None => collection.to_string(),
    }
}
