//! Security and Compliance Center data sources
//!
//! Read-only views over SCC v3 reports and provider types. Every lookup is
//! scoped to the configured SCC instance.

use super::pagination;
use crate::error::{ProviderError, Result};
use crate::ibm::client::IbmClient;
use crate::ibm::http::RequestOptions;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const REPORT: &str = "ibm_scc_report";
pub const LATEST_REPORTS: &str = "ibm_scc_latest_reports";
pub const REPORT_EVALUATIONS: &str = "ibm_scc_report_evaluations";
pub const PROVIDER_TYPE: &str = "ibm_scc_provider_type";

/// Sort orders accepted by the latest-reports listing
pub const LATEST_REPORTS_SORT: &[&str] = &["profile_name", "scope_id"];
/// Evaluation statuses accepted as a filter
pub const EVALUATION_STATUSES: &[&str] = &["failure", "pass", "error", "skipped"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportAccount {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub account_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportProfile {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportAttachment {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub scope: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub created_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scan_time: Option<DateTime<Utc>>,
    #[serde(default, rename = "type")]
    pub report_type: Option<String>,
    #[serde(default)]
    pub cos_object: Option<String>,
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub account: Option<ReportAccount>,
    #[serde(default)]
    pub profile: Option<ReportProfile>,
    #[serde(default)]
    pub attachment: Option<ReportAttachment>,
}

/// Pass/fail counters shared by the controls and evaluations summaries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplianceSummary {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub total_count: Option<i64>,
    #[serde(default)]
    pub pass_count: Option<i64>,
    #[serde(default)]
    pub failure_count: Option<i64>,
    #[serde(default)]
    pub error_count: Option<i64>,
    #[serde(default)]
    pub compliant_count: Option<i64>,
    #[serde(default)]
    pub not_compliant_count: Option<i64>,
    #[serde(default)]
    pub unable_to_perform_count: Option<i64>,
    #[serde(default)]
    pub user_evaluation_required_count: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplianceScore {
    #[serde(default)]
    pub passed: Option<i64>,
    #[serde(default)]
    pub total_count: Option<i64>,
    #[serde(default)]
    pub percent: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestReports {
    /// Time of the lookup; the listing has no identity of its own
    pub id: String,
    #[serde(default)]
    pub home_account_id: Option<String>,
    #[serde(default)]
    pub controls_summary: Option<ComplianceSummary>,
    #[serde(default)]
    pub evaluations_summary: Option<ComplianceSummary>,
    #[serde(default)]
    pub score: Option<ComplianceScore>,
    #[serde(default)]
    pub reports: Vec<Report>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationTarget {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub resource_crn: Option<String>,
    #[serde(default)]
    pub resource_name: Option<String>,
    #[serde(default)]
    pub service_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    #[serde(default)]
    pub assessment_id: Option<String>,
    #[serde(default)]
    pub assessment_type: Option<String>,
    #[serde(default)]
    pub assessment_method: Option<String>,
    #[serde(default)]
    pub assessment_description: Option<String>,
    #[serde(default)]
    pub parameter_count: Option<i64>,
    #[serde(default)]
    pub parameters: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    #[serde(default)]
    pub home_account_id: Option<String>,
    #[serde(default)]
    pub report_id: Option<String>,
    #[serde(default)]
    pub control_id: Option<String>,
    #[serde(default)]
    pub component_id: Option<String>,
    #[serde(default)]
    pub component_name: Option<String>,
    #[serde(default)]
    pub assessment: Option<Assessment>,
    #[serde(default)]
    pub evaluate_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub target: Option<EvaluationTarget>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub details: Option<Value>,
}

/// Optional narrowing of an evaluations listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvaluationFilter {
    #[serde(default)]
    pub assessment_id: Option<String>,
    #[serde(default)]
    pub component_id: Option<String>,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub target_name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl EvaluationFilter {
    fn query(&self) -> Vec<(&'static str, &str)> {
        [
            ("assessment_id", &self.assessment_id),
            ("component_id", &self.component_id),
            ("target_id", &self.target_id),
            ("target_name", &self.target_name),
            ("status", &self.status),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.as_deref().map(|v| (k, v)))
        .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEvaluations {
    /// Same as `report_id`
    pub id: String,
    pub report_id: String,
    #[serde(default)]
    pub home_account_id: Option<String>,
    pub evaluations: Vec<Evaluation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderTypeLabel {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub tip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderType {
    pub id: String,
    #[serde(default, rename = "type")]
    pub provider_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub s2s_enabled: Option<bool>,
    #[serde(default)]
    pub instance_limit: Option<i64>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub label: Option<ProviderTypeLabel>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn require_id<'a>(attr: &str, value: &'a str) -> Result<&'a str> {
    if value.trim().is_empty() {
        return Err(ProviderError::validation(format!("{attr} must be set")));
    }
    Ok(value)
}

/// `ibm_scc_report`
pub async fn read_report(client: &IbmClient, report_id: &str) -> Result<Report> {
    let report_id = require_id("report_id", report_id)?;
    let url = client.scc_url(&format!("reports/{}", urlencoding::encode(report_id)))?;
    let response = client.get(&url, RequestOptions::default()).await?;
    Ok(serde_json::from_value(response.body)?)
}

/// `ibm_scc_latest_reports`
pub async fn read_latest_reports(client: &IbmClient, sort: Option<&str>) -> Result<LatestReports> {
    let mut query = Vec::new();
    if let Some(sort) = sort {
        super::validate::allowed_value("sort", sort, LATEST_REPORTS_SORT)?;
        query.push(("sort", sort));
    }

    let url = client.scc_url("reports/latest")?;
    let response = client
        .get(
            &url,
            RequestOptions {
                query: &query,
                ..Default::default()
            },
        )
        .await?;

    let mut body = response.body;
    if let Value::Object(map) = &mut body {
        map.insert("id".to_string(), Value::String(Utc::now().to_rfc3339()));
    }
    Ok(serde_json::from_value(body)?)
}

/// `ibm_scc_report_evaluations`, following every page
pub async fn read_report_evaluations(
    client: &IbmClient,
    report_id: &str,
    filter: &EvaluationFilter,
) -> Result<ReportEvaluations> {
    let report_id = require_id("report_id", report_id)?;
    if let Some(status) = &filter.status {
        super::validate::allowed_value("status", status, EVALUATION_STATUSES)?;
    }

    let url = client.scc_url(&format!(
        "reports/{}/evaluations",
        urlencoding::encode(report_id)
    ))?;
    let query = filter.query();
    let (items, first_page) = pagination::fetch_all(client, &url, "evaluations", &query).await?;

    let evaluations = items
        .into_iter()
        .map(serde_json::from_value)
        .collect::<std::result::Result<Vec<Evaluation>, _>>()?;

    Ok(ReportEvaluations {
        id: report_id.to_string(),
        report_id: report_id.to_string(),
        home_account_id: first_page
            .get("home_account_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        evaluations,
    })
}

/// `ibm_scc_provider_type`
pub async fn read_provider_type(client: &IbmClient, provider_type_id: &str) -> Result<ProviderType> {
    let provider_type_id = require_id("provider_type_id", provider_type_id)?;
    let url = client.scc_url(&format!(
        "provider_types/{}",
        urlencoding::encode(provider_type_id)
    ))?;
    let response = client.get(&url, RequestOptions::default()).await?;
    Ok(serde_json::from_value(response.body)?)
}
