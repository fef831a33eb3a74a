//! Error types shared by every reconciler.

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Bad or conflicting input, detected before any remote call.
    #[error("invalid configuration: {0}")]
    Validation(String),

    #[error("{what} not found")]
    NotFound { what: String },

    /// Version token mismatch or a server-side conflict.
    #[error("conflict (HTTP {status}): {message}{}", fmt_txn(.transaction_id))]
    Conflict {
        status: u16,
        message: String,
        transaction_id: Option<String>,
    },

    #[error("transient failure{}: {message}", fmt_status(.status))]
    Transient {
        status: Option<u16>,
        message: String,
    },

    #[error("{0}")]
    ConfigurationConstraint(String),

    #[error("timed out after {}s waiting for {what} to become readable", .elapsed.as_secs())]
    Timeout { what: String, elapsed: Duration },

    /// The object was created but could not be read back. The ID is kept so
    /// a later refresh can pick it up.
    #[error("created {id} but it could not be read back: {source}")]
    Settle {
        id: String,
        #[source]
        source: Box<ProviderError>,
    },

    #[error("API request failed (HTTP {status}): {message}{}", fmt_txn(.transaction_id))]
    Api {
        status: u16,
        message: String,
        transaction_id: Option<String>,
    },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("invalid ID {id:?}: {reason}")]
    InvalidId { id: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to parse response JSON: {0}")]
    Json(#[from] serde_json::Error),
}

fn fmt_txn(transaction_id: &Option<String>) -> String {
    match transaction_id {
        Some(id) => format!(" [Transaction-Id: {id}]"),
        None => String::new(),
    }
}

fn fmt_status(status: &Option<u16>) -> String {
    match status {
        Some(s) => format!(" (HTTP {s})"),
        None => String::new(),
    }
}

impl ProviderError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ProviderError::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        ProviderError::NotFound { what: what.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound { .. })
    }

    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Transient { .. } => true,
            ProviderError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Whether the settle loop may issue another read after this error.
    pub fn is_retryable_while_settling(&self, retry_transient: bool) -> bool {
        self.is_not_found() || (retry_transient && self.is_transient())
    }

    /// ID minted by a create whose follow-up read failed.
    pub fn persisted_id(&self) -> Option<&str> {
        match self {
            ProviderError::Settle { id, .. } => Some(id),
            _ => None,
        }
    }
}
