//! tibm - declarative reconciler for IBM Cloud IAM access group policies,
//! Metrics Routing targets and routes, and Security and Compliance Center
//! reports.

pub mod apply;
pub mod config;
pub mod error;
pub mod ibm;
pub mod manifest;
pub mod resource;
pub mod state;
