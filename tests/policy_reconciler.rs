//! Access group policy reconciler against a mocked IAM Policy Management API

mod common;

use common::{client, roles_listing, ACCESS_GROUP_ID, ACCOUNT_ID, READER_CRN, VIEWER_CRN};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use tibm::error::ProviderError;
use tibm::resource::policy::model::{AccessGroupPolicyConfig, AccessGroupPolicyState};
use tibm::resource::policy::{AccessGroupPolicy, PolicyResources, RuleCondition};
use tibm::resource::Reconciler;
use wiremock::matchers::{body_partial_json, header, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_roles(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v2/roles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(roles_listing()))
        .mount(server)
        .await;
}

fn subject() -> Value {
    json!({"attributes": [
        {"key": "access_group_id", "operator": "stringEquals", "value": ACCESS_GROUP_ID}
    ]})
}

fn account_attr() -> Value {
    json!({"key": "accountId", "operator": "stringEquals", "value": ACCOUNT_ID})
}

fn time_conditions() -> BTreeSet<RuleCondition> {
    BTreeSet::from([
        RuleCondition {
            key: "{{environment.attributes.day_of_week}}".to_string(),
            operator: "dayOfWeekAnyOf".to_string(),
            value: vec!["1+00:00".to_string(), "2+00:00".to_string()],
        },
        RuleCondition {
            key: "{{environment.attributes.current_time}}".to_string(),
            operator: "timeGreaterThanOrEquals".to_string(),
            value: vec!["09:00:00+00:00".to_string()],
        },
    ])
}

fn v2_config() -> AccessGroupPolicyConfig {
    AccessGroupPolicyConfig {
        access_group_id: ACCESS_GROUP_ID.to_string(),
        roles: vec!["Reader".to_string()],
        resources: Some(PolicyResources {
            service: Some("kms".to_string()),
            ..Default::default()
        }),
        rule_conditions: Some(time_conditions()),
        rule_operator: Some("and".to_string()),
        pattern: Some("time-based-conditions:weekly:custom-hours".to_string()),
        ..Default::default()
    }
}

fn v2_remote(id: &str) -> Value {
    json!({
        "id": id,
        "href": format!("https://iam.cloud.ibm.com/v2/policies/{id}"),
        "type": "access",
        "state": "active",
        "subject": subject(),
        "resource": {"attributes": [
            {"key": "serviceName", "operator": "stringEquals", "value": "kms"},
            account_attr()
        ]},
        "control": {"grant": {"roles": [{"role_id": READER_CRN}]}},
        "rule": {"operator": "and", "conditions": [
            {"key": "{{environment.attributes.day_of_week}}", "operator": "dayOfWeekAnyOf", "value": ["1+00:00", "2+00:00"]},
            {"key": "{{environment.attributes.current_time}}", "operator": "timeGreaterThanOrEquals", "value": "09:00:00+00:00"}
        ]},
        "pattern": "time-based-conditions:weekly:custom-hours"
    })
}

fn v1_config() -> AccessGroupPolicyConfig {
    AccessGroupPolicyConfig {
        access_group_id: ACCESS_GROUP_ID.to_string(),
        roles: vec!["Viewer".to_string()],
        ..Default::default()
    }
}

/// A legacy policy as served by the v2 read endpoint
fn v1_remote(id: &str) -> Value {
    json!({
        "id": id,
        "href": format!("https://iam.cloud.ibm.com/v1/policies/{id}"),
        "type": "access",
        "state": "active",
        "subject": subject(),
        "resource": {"attributes": [
            {"key": "serviceType", "operator": "stringEquals", "value": "service"},
            account_attr()
        ]},
        "control": {"grant": {"roles": [{"role_id": VIEWER_CRN}]}}
    })
}

fn v1_state(id: &str) -> AccessGroupPolicyState {
    AccessGroupPolicyState {
        id: format!("{ACCESS_GROUP_ID}/{id}"),
        config: v1_config(),
        version: Some("1-aaa".to_string()),
    }
}

mod create_tests {
    use super::*;

    /// Rule conditions select the v2 surface; the read-back settles through 404s
    #[tokio::test]
    async fn test_v2_create_settles_through_not_found() {
        let server = MockServer::start().await;
        mount_roles(&server).await;

        Mock::given(method("POST"))
            .and(path("/v2/policies"))
            .and(body_partial_json(json!({
                "type": "access",
                "control": {"grant": {"roles": [{"role_id": READER_CRN}]}},
                "pattern": "time-based-conditions:weekly:custom-hours",
                "rule": {"operator": "and"}
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "p-1"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/policies"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v2/policies/p-1"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "errors": [{"message": "Policy was not found."}]
            })))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/policies/p-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "1-v2")
                    .set_body_json(v2_remote("p-1")),
            )
            .mount(&server)
            .await;

        let state = AccessGroupPolicy
            .create(&client(&server), &v2_config())
            .await
            .expect("create should settle");

        assert_eq!(state.id, format!("{ACCESS_GROUP_ID}/p-1"));
        assert_eq!(state.version.as_deref(), Some("1-v2"));
        assert_eq!(state.config, v2_config());
    }

    /// Without conditions or pattern the legacy surface is used
    #[tokio::test]
    async fn test_legacy_create() {
        let server = MockServer::start().await;
        mount_roles(&server).await;

        Mock::given(method("POST"))
            .and(path("/v1/policies"))
            .and(body_partial_json(json!({
                "type": "access",
                "roles": [{"role_id": VIEWER_CRN}]
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "p-2"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/policies/p-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(v1_remote("p-2")))
            .mount(&server)
            .await;

        let state = AccessGroupPolicy
            .create(&client(&server), &v1_config())
            .await
            .unwrap();

        assert_eq!(state.id, format!("{ACCESS_GROUP_ID}/p-2"));
        assert_eq!(state.config, v1_config());
    }

    /// The Transaction-Id is forwarded and read back into state
    #[tokio::test]
    async fn test_transaction_id_forwarded() {
        let server = MockServer::start().await;
        mount_roles(&server).await;

        Mock::given(method("POST"))
            .and(path("/v1/policies"))
            .and(header("Transaction-Id", "txn-42"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "p-3"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/policies/p-3"))
            .and(header("Transaction-Id", "txn-42"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Transaction-Id", "txn-42")
                    .set_body_json(v1_remote("p-3")),
            )
            .mount(&server)
            .await;

        let config = AccessGroupPolicyConfig {
            transaction_id: Some("txn-42".to_string()),
            ..v1_config()
        };
        let state = AccessGroupPolicy.create(&client(&server), &config).await.unwrap();
        assert_eq!(state.config.transaction_id.as_deref(), Some("txn-42"));
    }

    /// Conflicting groups fail before any request is made
    #[tokio::test]
    async fn test_conflicting_groups_make_no_requests() {
        let server = MockServer::start().await;

        let config = AccessGroupPolicyConfig {
            account_management: true,
            resources: Some(PolicyResources {
                service: Some("kms".to_string()),
                ..Default::default()
            }),
            ..v1_config()
        };
        let err = AccessGroupPolicy
            .create(&client(&server), &config)
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Validation(_)));
        let received = server.received_requests().await.unwrap_or_default();
        assert!(received.is_empty(), "unexpected requests: {}", received.len());
    }

    /// Unknown role names are rejected before the create call
    #[tokio::test]
    async fn test_unknown_role_rejected() {
        let server = MockServer::start().await;
        mount_roles(&server).await;
        Mock::given(method("POST"))
            .and(path_regex(r"^/v[12]/policies$"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let config = AccessGroupPolicyConfig {
            roles: vec!["Owner".to_string()],
            ..v1_config()
        };
        let err = AccessGroupPolicy
            .create(&client(&server), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }

    /// A policy that never becomes readable keeps its ID in the error
    #[tokio::test]
    async fn test_settle_timeout_keeps_id() {
        let server = MockServer::start().await;
        mount_roles(&server).await;

        Mock::given(method("POST"))
            .and(path("/v1/policies"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "p-9"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/policies/p-9"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = AccessGroupPolicy
            .create(&client(&server), &v1_config())
            .await
            .unwrap_err();

        assert_eq!(err.persisted_id(), Some("AccessGroupId-1/p-9"));
        match err {
            ProviderError::Settle { source, .. } => {
                assert!(matches!(*source, ProviderError::Timeout { .. }))
            }
            other => panic!("expected settle error, got {other:?}"),
        }
    }

    /// A server error during the settle read is not retried
    #[tokio::test]
    async fn test_server_error_while_settling_is_fatal() {
        let server = MockServer::start().await;
        mount_roles(&server).await;

        Mock::given(method("POST"))
            .and(path("/v1/policies"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "p-5"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/policies/p-5"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;

        let err = AccessGroupPolicy
            .create(&client(&server), &v1_config())
            .await
            .unwrap_err();

        match err {
            ProviderError::Settle { id, source } => {
                assert_eq!(id, "AccessGroupId-1/p-5");
                assert!(source.is_transient());
            }
            other => panic!("expected settle error, got {other:?}"),
        }
    }
}

mod read_tests {
    use super::*;

    #[tokio::test]
    async fn test_read_not_found_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/policies/p-2"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = AccessGroupPolicy
            .read(&client(&server), &v1_state("p-2"))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_read_deleted_state_is_none() {
        let server = MockServer::start().await;
        let mut remote = v1_remote("p-2");
        remote["state"] = json!("deleted");
        Mock::given(method("GET"))
            .and(path("/v2/policies/p-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(remote))
            .mount(&server)
            .await;

        let result = AccessGroupPolicy
            .read(&client(&server), &v1_state("p-2"))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_read_rejects_foreign_access_group() {
        let server = MockServer::start().await;
        mount_roles(&server).await;
        let mut remote = v1_remote("p-2");
        remote["subject"]["attributes"][0]["value"] = json!("AccessGroupId-other");
        Mock::given(method("GET"))
            .and(path("/v2/policies/p-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(remote))
            .mount(&server)
            .await;

        let err = AccessGroupPolicy
            .read(&client(&server), &v1_state("p-2"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidId { .. }));
    }

    /// Roles edited remotely show up as drift
    #[tokio::test]
    async fn test_read_reports_drift() {
        let server = MockServer::start().await;
        mount_roles(&server).await;
        let mut remote = v1_remote("p-2");
        remote["control"]["grant"]["roles"] = json!([{"role_id": common::EDITOR_CRN}]);
        Mock::given(method("GET"))
            .and(path("/v2/policies/p-2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "2-bbb")
                    .set_body_json(remote),
            )
            .mount(&server)
            .await;

        let prior = v1_state("p-2");
        let state = AccessGroupPolicy
            .read(&client(&server), &prior)
            .await
            .unwrap()
            .expect("policy exists");

        assert_eq!(state.config.roles, vec!["Editor".to_string()]);
        assert_eq!(state.version.as_deref(), Some("2-bbb"));
        assert!(AccessGroupPolicy.needs_update(&state.config, &v1_config()));
    }

    #[tokio::test]
    async fn test_import_rebuilds_flat_resources() {
        let server = MockServer::start().await;
        mount_roles(&server).await;
        let mut remote = v1_remote("p-7");
        remote["resource"]["attributes"] = json!([
            {"key": "serviceName", "operator": "stringEquals", "value": "kms"},
            {"key": "region", "operator": "stringEquals", "value": "us-south"},
            account_attr()
        ]);
        Mock::given(method("GET"))
            .and(path("/v2/policies/p-7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(remote))
            .mount(&server)
            .await;

        let state = AccessGroupPolicy
            .import(&client(&server), "AccessGroupId-1/p-7")
            .await
            .unwrap();

        let resources = state.config.resources.expect("flat resources");
        assert_eq!(resources.service.as_deref(), Some("kms"));
        assert_eq!(resources.region.as_deref(), Some("us-south"));
        assert_eq!(state.config.access_group_id, ACCESS_GROUP_ID);
        assert!(!state.config.account_management);
    }

    #[tokio::test]
    async fn test_import_rejects_malformed_id() {
        let server = MockServer::start().await;
        let err = AccessGroupPolicy
            .import(&client(&server), "no-slash")
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidId { .. }));
    }
}

mod update_tests {
    use super::*;

    /// Adding rule conditions to a legacy policy is refused without a PUT
    #[tokio::test]
    async fn test_legacy_update_with_conditions_is_refused() {
        let server = MockServer::start().await;
        mount_roles(&server).await;
        Mock::given(method("GET"))
            .and(path("/v2/policies/p-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(v1_remote("p-2")))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path_regex(r"^/v[12]/policies/p-2$"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let desired = AccessGroupPolicyConfig {
            rule_conditions: Some(time_conditions()),
            rule_operator: Some("and".to_string()),
            ..v1_config()
        };
        let err = AccessGroupPolicy
            .update(&client(&server), &v1_state("p-2"), &desired)
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::ConfigurationConstraint(_)));
        assert!(err.to_string().contains("Delete existing v1/policy"));
    }

    /// Legacy policies are replaced through the v1 surface with the stored ETag
    #[tokio::test]
    async fn test_legacy_update_uses_v1_and_if_match() {
        let server = MockServer::start().await;
        mount_roles(&server).await;
        Mock::given(method("GET"))
            .and(path("/v2/policies/p-2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "1-aaa")
                    .set_body_json(v1_remote("p-2")),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v1/policies/p-2"))
            .and(header("If-Match", "1-aaa"))
            .and(body_partial_json(json!({
                "roles": [{"role_id": common::EDITOR_CRN}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "p-2"})))
            .expect(1)
            .mount(&server)
            .await;
        let mut updated = v1_remote("p-2");
        updated["control"]["grant"]["roles"] = json!([{"role_id": common::EDITOR_CRN}]);
        Mock::given(method("GET"))
            .and(path("/v2/policies/p-2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "2-ccc")
                    .set_body_json(updated),
            )
            .mount(&server)
            .await;

        let desired = AccessGroupPolicyConfig {
            roles: vec!["Editor".to_string()],
            ..v1_config()
        };
        let state = AccessGroupPolicy
            .update(&client(&server), &v1_state("p-2"), &desired)
            .await
            .unwrap();

        assert_eq!(state.config, desired);
        assert_eq!(state.version.as_deref(), Some("2-ccc"));
    }

    /// A stale version token surfaces as a conflict
    #[tokio::test]
    async fn test_stale_etag_is_conflict() {
        let server = MockServer::start().await;
        mount_roles(&server).await;
        Mock::given(method("GET"))
            .and(path("/v2/policies/p-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "2-fresh")
                    .set_body_json(v2_remote("p-1")),
            )
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v2/policies/p-1"))
            .and(header("If-Match", "1-stale"))
            .respond_with(ResponseTemplate::new(412).set_body_json(json!({
                "errors": [{"code": "policy_conflict_error", "message": "Failed to update policy due to an ETag mismatch."}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let prior = AccessGroupPolicyState {
            id: format!("{ACCESS_GROUP_ID}/p-1"),
            config: v2_config(),
            version: Some("1-stale".to_string()),
        };
        let desired = AccessGroupPolicyConfig {
            description: Some("changed".to_string()),
            ..v2_config()
        };
        let err = AccessGroupPolicy
            .update(&client(&server), &prior, &desired)
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Conflict { status: 412, .. }));
    }
}

mod delete_tests {
    use super::*;

    #[tokio::test]
    async fn test_delete_absent_policy_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/policies/p-2"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        AccessGroupPolicy
            .delete(&client(&server), &v1_state("p-2"))
            .await
            .expect("absent policy counts as deleted");
    }

    #[tokio::test]
    async fn test_delete_routes_to_owning_surface() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/policies/p-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(v1_remote("p-2")))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/v1/policies/p-2"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        AccessGroupPolicy
            .delete(&client(&server), &v1_state("p-2"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_racing_removal_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/policies/p-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(v2_remote("p-1")))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/v2/policies/p-1"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let state = AccessGroupPolicyState {
            id: format!("{ACCESS_GROUP_ID}/p-1"),
            config: v2_config(),
            version: None,
        };
        AccessGroupPolicy
            .delete(&client(&server), &state)
            .await
            .unwrap();
    }
}
