//! HTTP utilities for IBM Cloud REST API calls

use crate::error::{ProviderError, Result};
use reqwest::header::{HeaderMap, ETAG, IF_MATCH};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;

/// Correlation header forwarded on every call and echoed back by IBM services.
pub const TRANSACTION_ID_HEADER: &str = "Transaction-Id";

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| c.is_control(), "")
}

/// Per-request knobs
#[derive(Debug, Default, Clone)]
pub struct RequestOptions<'a> {
    pub body: Option<&'a Value>,
    /// Version token for optimistic concurrency
    pub if_match: Option<&'a str>,
    pub transaction_id: Option<&'a str>,
    pub query: &'a [(&'a str, &'a str)],
}

impl<'a> RequestOptions<'a> {
    pub fn with_transaction(transaction_id: Option<&'a str>) -> Self {
        Self {
            transaction_id,
            ..Default::default()
        }
    }
}

/// Successful response with the headers the reconcilers care about
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub etag: Option<String>,
    pub transaction_id: Option<String>,
    pub body: Value,
}

/// HTTP client wrapper for IBM Cloud API calls
#[derive(Clone)]
pub struct IbmHttpClient {
    client: Client,
}

impl IbmHttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("tibm/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    /// Access the underlying reqwest client (used for the IAM token exchange)
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Send a request and classify the outcome
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        token: &str,
        opts: RequestOptions<'_>,
    ) -> Result<ApiResponse> {
        tracing::debug!("{} {}", method, url);

        let mut request = self.client.request(method, url).bearer_auth(token);

        if !opts.query.is_empty() {
            request = request.query(opts.query);
        }
        if let Some(body) = opts.body {
            request = request.json(body);
        }
        if let Some(etag) = opts.if_match {
            request = request.header(IF_MATCH, etag);
        }
        if let Some(txn) = opts.transaction_id {
            request = request.header(TRANSACTION_ID_HEADER, txn);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                ProviderError::Transient {
                    status: None,
                    message: e.to_string(),
                }
            } else {
                ProviderError::Http(e)
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let text = response.text().await?;

        let etag = header_str(&headers, ETAG.as_str());
        let transaction_id = header_str(&headers, TRANSACTION_ID_HEADER);

        if !status.is_success() {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&text));
            return Err(classify_failure(status, &text, transaction_id));
        }

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text)?
        };

        Ok(ApiResponse {
            status: status.as_u16(),
            etag,
            transaction_id,
            body,
        })
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Pull the human readable message out of an IBM error body.
///
/// IBM services use a few shapes: `{"errors":[{"message":..}]}`,
/// `{"message":..}` and `{"errorMessage":..}`.
pub fn extract_error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return sanitize_for_log(body);
    };

    let from_errors = value
        .get("errors")
        .and_then(|e| e.as_array())
        .map(|errs| {
            errs.iter()
                .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
                .collect::<Vec<_>>()
                .join("; ")
        })
        .filter(|m| !m.is_empty());

    from_errors
        .or_else(|| {
            ["message", "errorMessage", "error_description"]
                .iter()
                .find_map(|k| value.get(*k).and_then(|m| m.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| sanitize_for_log(body))
}

fn classify_failure(status: StatusCode, body: &str, transaction_id: Option<String>) -> ProviderError {
    let message = extract_error_message(body);
    match status.as_u16() {
        404 => ProviderError::NotFound { what: message },
        409 | 412 => ProviderError::Conflict {
            status: status.as_u16(),
            message,
            transaction_id,
        },
        401 | 403 => ProviderError::Auth(format!("HTTP {}: {}", status.as_u16(), message)),
        429 | 500..=599 => ProviderError::Transient {
            status: Some(status.as_u16()),
            message,
        },
        code => ProviderError::Api {
            status: code,
            message,
            transaction_id,
        },
    }
}

/// Format an API error for terminal display
pub fn format_ibm_error(error: &ProviderError) -> String {
    match error {
        ProviderError::Auth(_) => {
            format!("{error}. Check IC_API_KEY and the IAM permissions of the key.")
        }
        ProviderError::Transient { .. } => {
            format!("{error}. IBM Cloud service temporarily unavailable, try again.")
        }
        other => other.to_string(),
    }
}

/// Terminal message for a failed command: the context chain, with the
/// innermost API error given its hint
pub fn format_command_error(err: &anyhow::Error) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        if let Some(api) = cause.downcast_ref::<ProviderError>() {
            if matches!(api, ProviderError::Auth(_) | ProviderError::Transient { .. }) {
                parts.push(format_ibm_error(api));
                break;
            }
        }
        parts.push(cause.to_string());
    }
    parts.join(": ")
}
