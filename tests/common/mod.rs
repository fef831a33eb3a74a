//! Helpers shared by the wiremock integration tests

#![allow(dead_code)]

use serde_json::{json, Value};
use std::time::Duration;
use tibm::ibm::client::{Endpoints, IbmClient, SettleSettings};
use wiremock::MockServer;

pub const ACCOUNT_ID: &str = "acc-1";
pub const ACCESS_GROUP_ID: &str = "AccessGroupId-1";
pub const VIEWER_CRN: &str = "crn:v1:bluemix:public:iam::::role:Viewer";
pub const EDITOR_CRN: &str = "crn:v1:bluemix:public:iam::::role:Editor";
pub const READER_CRN: &str = "crn:v1:bluemix:public:iam::::serviceRole:Reader";

/// Client pointed at the mock server with a short settle window
pub fn client(server: &MockServer) -> IbmClient {
    IbmClient::with_token("test-token", Endpoints::single(&server.uri()))
        .expect("client")
        .with_account(ACCOUNT_ID)
        .with_scc_instance("scc-inst")
        .with_settle(SettleSettings {
            timeout: Duration::from_millis(150),
            interval: Duration::from_millis(10),
            retry_transient: false,
        })
}

/// `/v2/roles` listing with platform and service roles
pub fn roles_listing() -> Value {
    json!({
        "system_roles": [
            {"display_name": "Viewer", "crn": VIEWER_CRN},
            {"display_name": "Editor", "crn": EDITOR_CRN}
        ],
        "service_roles": [
            {"display_name": "Reader", "crn": READER_CRN}
        ]
    })
}
