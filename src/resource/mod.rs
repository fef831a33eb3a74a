//! Resource abstraction layer
//!
//! Each resource type implements [`Reconciler`], mapping a declarative config
//! onto IBM Cloud API calls and the responses back onto stored state.
//!
//! # Architecture
//!
//! - [`policy`] - IAM access group policies (v1 and v2 surfaces)
//! - [`metrics_router`] - Metrics Routing targets and routes
//! - [`scc`] - Security and Compliance Center data sources
//! - [`settle`] - read-after-write polling shared by every create
//! - [`dispatch`] - JSON-in/JSON-out entry points keyed by type name
//! - [`registry`] - catalog of known types, loaded from embedded JSON
//!
//! # Example
//!
//! ```ignore
//! use tibm::resource::{dispatch, Reconciler};
//! use tibm::resource::metrics_router::{MetricsRouterTarget, TargetConfig};
//!
//! async fn make_target(client: &IbmClient) -> tibm::error::Result<()> {
//!     let config = TargetConfig {
//!         name: "my-target".into(),
//!         destination_crn: "crn:v1:...".into(),
//!         region: None,
//!     };
//!     let state = MetricsRouterTarget.create(client, &config).await?;
//!     println!("created {}", state.id);
//!     Ok(())
//! }
//! ```

pub mod dispatch;
pub mod id;
pub mod metrics_router;
pub mod pagination;
pub mod policy;
pub mod reconciler;
pub mod registry;
pub mod scc;
pub mod settle;
pub mod validate;

pub use dispatch::Change;
pub use id::LocalId;
pub use reconciler::Reconciler;
pub use registry::{get_type, type_names, TypeDef, TypeKind};
