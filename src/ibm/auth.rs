//! IBM Cloud IAM authentication
//!
//! Exchanges an API key for a bearer token and caches it until shortly
//! before it expires.

use crate::error::{ProviderError, Result};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Grant type for API key exchange
const APIKEY_GRANT_TYPE: &str = "urn:ibm:params:oauth:grant-type:apikey";

/// Token expiry buffer - refresh tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// TTL used when the token response does not say (IAM tokens live 60 minutes)
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Clone)]
enum TokenSource {
    ApiKey {
        api_key: String,
        token_url: String,
        http: reqwest::Client,
    },
    /// Pre-issued token, never refreshed
    Static(String),
}

/// IAM credentials holder with token caching
#[derive(Clone)]
pub struct IamCredentials {
    source: TokenSource,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl IamCredentials {
    /// Credentials backed by an API key, exchanged at `<iam_endpoint>/identity/token`
    pub fn from_api_key(api_key: &str, iam_endpoint: &str, http: reqwest::Client) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::Auth(
                "no API key configured. Set IC_API_KEY or IBMCLOUD_API_KEY".to_string(),
            ));
        }

        Ok(Self {
            source: TokenSource::ApiKey {
                api_key: api_key.to_string(),
                token_url: format!("{}/identity/token", iam_endpoint.trim_end_matches('/')),
                http,
            },
            token_cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Credentials that always hand out the given token
    pub fn from_token(token: &str) -> Self {
        Self {
            source: TokenSource::Static(token.to_string()),
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Get an access token for API calls
    pub async fn get_token(&self) -> Result<String> {
        let (api_key, token_url, http) = match &self.source {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::ApiKey {
                api_key,
                token_url,
                http,
            } => (api_key, token_url, http),
        };

        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached IAM token expired, fetching new token");
            }
        }

        let response = http
            .post(token_url.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[("grant_type", APIKEY_GRANT_TYPE), ("apikey", api_key.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!(
                "IAM token exchange failed (HTTP {}): {}",
                status.as_u16(),
                super::http::extract_error_message(&body)
            );
            // Throttling and outages say nothing about the key itself
            return Err(match status.as_u16() {
                429 | 500..=599 => ProviderError::Transient {
                    status: Some(status.as_u16()),
                    message,
                },
                _ => ProviderError::Auth(message),
            });
        }

        let token: TokenResponse = response.json().await?;
        let ttl = token
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_TTL);
        let expires_at = Instant::now() + ttl.saturating_sub(TOKEN_EXPIRY_BUFFER);

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token.access_token.clone(),
                expires_at,
            });
        }

        tracing::debug!(
            "New IAM token cached, expires in ~{} minutes",
            ttl.saturating_sub(TOKEN_EXPIRY_BUFFER).as_secs() / 60
        );

        Ok(token.access_token)
    }

    /// Force refresh the token
    pub async fn refresh_token(&self) -> Result<String> {
        {
            let mut cache = self.token_cache.write().await;
            *cache = None;
        }
        self.get_token().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token_is_returned_verbatim() {
        let creds = IamCredentials::from_token("abc");
        assert_eq!(creds.get_token().await.unwrap(), "abc");
        assert_eq!(creds.refresh_token().await.unwrap(), "abc");
    }

    #[test]
    fn test_empty_api_key_rejected() {
        let result = IamCredentials::from_api_key("  ", "https://iam.example", reqwest::Client::new());
        assert!(matches!(result, Err(ProviderError::Auth(_))));
    }
}
