//! IBM Cloud API interaction module
//!
//! This module provides the core functionality for interacting with IBM Cloud
//! APIs: IAM authentication, the HTTP client and the role catalog.
//!
//! # Module Structure
//!
//! - [`auth`] - API key to bearer token exchange with caching
//! - [`client`] - Main client holding credentials, endpoints and settle settings
//! - [`http`] - HTTP utilities with status classification
//! - [`roles`] - Role display name to CRN mapping
//!
//! # Example
//!
//! ```ignore
//! use tibm::ibm::client::IbmClient;
//!
//! async fn example(config: &tibm::config::Config) -> tibm::error::Result<()> {
//!     let client = IbmClient::from_config(config)?;
//!     let target = client.get(&client.metrics_router_url("targets", Some("abc")), Default::default()).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
pub mod roles;
