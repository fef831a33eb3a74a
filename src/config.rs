//! Configuration Management
//!
//! Handles persistent configuration storage for tibm. Values resolve as
//! CLI flag > environment > config file > default.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_REGION: &str = "us-south";
pub const DEFAULT_IAM_ENDPOINT: &str = "https://iam.cloud.ibm.com";
const DEFAULT_SETTLE_TIMEOUT_SECS: u64 = 5 * 60;
const DEFAULT_SETTLE_INTERVAL_MS: u64 = 1000;

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api_key: Option<String>,
    /// Account that policies are scoped to
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub scc_instance_id: Option<String>,
    #[serde(default)]
    pub endpoints: EndpointOverrides,
    #[serde(default)]
    pub settle_timeout_secs: Option<u64>,
    #[serde(default)]
    pub settle_interval_ms: Option<u64>,
    #[serde(default)]
    pub retry_transient_while_settling: bool,
    #[serde(default)]
    pub state_path: Option<PathBuf>,
    /// Command line flags, never persisted
    #[serde(skip)]
    pub overrides: CliOverrides,
}

/// Values given on the command line; they beat environment and file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub region: Option<String>,
    pub account_id: Option<String>,
    pub state_path: Option<PathBuf>,
}

/// Endpoint overrides (private endpoints, test servers)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EndpointOverrides {
    #[serde(default)]
    pub iam: Option<String>,
    #[serde(default)]
    pub iam_policy: Option<String>,
    #[serde(default)]
    pub metrics_router: Option<String>,
    #[serde(default)]
    pub scc: Option<String>,
}

fn env_first(names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|n| std::env::var(n).ok())
        .filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("tibm").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        Ok(())
    }

    /// Keys accepted by [`Config::set`]
    pub const SETTABLE_KEYS: &'static [&'static str] = &[
        "account_id",
        "region",
        "scc_instance_id",
        "settle_timeout_secs",
        "settle_interval_ms",
        "retry_transient_while_settling",
        "state_path",
    ];

    /// Set one persisted value from its string form
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "account_id" => self.account_id = Some(value.to_string()),
            "region" => self.region = Some(value.to_string()),
            "scc_instance_id" => self.scc_instance_id = Some(value.to_string()),
            "settle_timeout_secs" => self.settle_timeout_secs = Some(value.parse()?),
            "settle_interval_ms" => self.settle_interval_ms = Some(value.parse()?),
            "retry_transient_while_settling" => self.retry_transient_while_settling = value.parse()?,
            "state_path" => self.state_path = Some(PathBuf::from(value)),
            other => anyhow::bail!(
                "unknown config key {other:?}, expected one of {:?}",
                Self::SETTABLE_KEYS
            ),
        }
        Ok(())
    }

    /// Get effective API key (env > config)
    pub fn effective_api_key(&self) -> Option<String> {
        env_first(&["IC_API_KEY", "IBMCLOUD_API_KEY"]).or_else(|| self.api_key.clone())
    }

    pub fn effective_account_id(&self) -> Option<String> {
        self.overrides
            .account_id
            .clone()
            .or_else(|| env_first(&["IBMCLOUD_ACCOUNT_ID"]))
            .or_else(|| self.account_id.clone())
    }

    pub fn effective_region(&self) -> String {
        self.overrides
            .region
            .clone()
            .or_else(|| env_first(&["IBMCLOUD_REGION", "IC_REGION"]))
            .or_else(|| self.region.clone())
            .unwrap_or_else(|| DEFAULT_REGION.to_string())
    }

    pub fn effective_scc_instance_id(&self) -> Option<String> {
        env_first(&["IBMCLOUD_SCC_INSTANCE_ID"]).or_else(|| self.scc_instance_id.clone())
    }

    pub fn effective_iam_endpoint(&self) -> String {
        env_first(&["IBMCLOUD_IAM_API_ENDPOINT"])
            .or_else(|| self.endpoints.iam.clone())
            .unwrap_or_else(|| DEFAULT_IAM_ENDPOINT.to_string())
    }

    pub fn effective_iam_policy_endpoint(&self) -> String {
        env_first(&["IBMCLOUD_IAM_POLICY_ENDPOINT"])
            .or_else(|| self.endpoints.iam_policy.clone())
            .unwrap_or_else(|| DEFAULT_IAM_ENDPOINT.to_string())
    }

    pub fn effective_metrics_router_endpoint(&self, region: &str) -> String {
        env_first(&["IBMCLOUD_METRICS_ROUTING_API_ENDPOINT"])
            .or_else(|| self.endpoints.metrics_router.clone())
            .unwrap_or_else(|| format!("https://{region}.metrics-router.cloud.ibm.com/api/v3"))
    }

    pub fn effective_scc_endpoint(&self, region: &str) -> String {
        env_first(&["IBMCLOUD_SCC_API_ENDPOINT"])
            .or_else(|| self.endpoints.scc.clone())
            .unwrap_or_else(|| format!("https://{region}.compliance.cloud.ibm.com"))
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_secs(self.settle_timeout_secs.unwrap_or(DEFAULT_SETTLE_TIMEOUT_SECS))
    }

    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval_ms.unwrap_or(DEFAULT_SETTLE_INTERVAL_MS))
    }

    /// Path of the local state file
    pub fn effective_state_path(&self) -> PathBuf {
        if let Some(path) = self.overrides.state_path.as_ref().or(self.state_path.as_ref()) {
            return path.clone();
        }
        if let Some(config_dir) = dirs::config_dir() {
            return config_dir.join("tibm").join("state.json");
        }
        PathBuf::from("tibm.state.json")
    }
}
