//! `ibm_iam_access_group_policy`
//!
//! Policies are created on the v1 surface unless they use rule conditions or
//! a time pattern, in which case the v2 surface is used. Reads always go
//! through the v2 endpoint, which serves both kinds and reports the owning
//! surface in `href`.

pub mod builder;
pub mod flatten;
pub mod model;
pub mod variant;

use crate::error::{ProviderError, Result};
use crate::ibm::client::IbmClient;
use crate::ibm::http::{ApiResponse, RequestOptions};
use crate::ibm::roles::{list_roles, RoleCatalog};
use crate::resource::id::LocalId;
use crate::resource::reconciler::Reconciler;
use crate::resource::settle;
use async_trait::async_trait;
use flatten::RemotePolicy;
use model::{AccessGroupPolicyConfig, AccessGroupPolicyState};
use variant::PolicyVariant;

pub use model::{PolicyResources, ResourceAttribute, RuleCondition};

#[derive(Debug, Default, Clone, Copy)]
pub struct AccessGroupPolicy;

fn check_subject(remote: &RemotePolicy, id: &LocalId) -> Result<()> {
    let subject = remote.access_group_id().unwrap_or_default();
    if subject != id.parent {
        return Err(ProviderError::InvalidId {
            id: id.to_string(),
            reason: format!(
                "policy {} does not belong to access group {}, found {:?}",
                id.object, id.parent, subject
            ),
        });
    }
    Ok(())
}

fn surface_url(client: &IbmClient, variant: PolicyVariant, policy_id: Option<&str>) -> String {
    match variant {
        PolicyVariant::Legacy => client.v1_policy_url(policy_id),
        PolicyVariant::Current => client.v2_policy_url(policy_id),
    }
}

impl AccessGroupPolicy {
    async fn fetch(
        &self,
        client: &IbmClient,
        policy_id: &str,
        transaction_id: Option<&str>,
    ) -> Result<(RemotePolicy, ApiResponse)> {
        let response = client
            .get(
                &client.v2_policy_url(Some(policy_id)),
                RequestOptions::with_transaction(transaction_id),
            )
            .await?;
        let remote: RemotePolicy = serde_json::from_value(response.body.clone())?;
        Ok((remote, response))
    }

    async fn catalog_for(&self, client: &IbmClient, remote: &RemotePolicy) -> Result<RoleCatalog> {
        list_roles(client, remote.service_name().as_deref()).await
    }

    fn observed(
        &self,
        id: &LocalId,
        remote: &RemotePolicy,
        response: &ApiResponse,
        prior: &AccessGroupPolicyConfig,
        catalog: &RoleCatalog,
    ) -> AccessGroupPolicyState {
        AccessGroupPolicyState {
            id: id.to_string(),
            config: flatten::flatten(remote, prior, catalog, response.transaction_id.as_deref()),
            version: response.etag.clone(),
        }
    }
}

#[async_trait]
impl Reconciler for AccessGroupPolicy {
    type Config = AccessGroupPolicyConfig;
    type State = AccessGroupPolicyState;

    const TYPE_NAME: &'static str = "ibm_iam_access_group_policy";

    fn normalize(&self, config: Self::Config) -> Self::Config {
        config.normalized()
    }

    fn validate(&self, config: &Self::Config) -> Result<()> {
        builder::validate(config)
    }

    async fn create(&self, client: &IbmClient, config: &Self::Config) -> Result<Self::State> {
        builder::validate(config)?;
        let account_id = client.require_account_id()?;
        let variant = PolicyVariant::for_config(config);
        let txn = config.transaction_id.as_deref();

        let catalog = list_roles(client, builder::service_name(config)).await?;
        let role_crns = catalog.crns_for(&config.roles)?;
        let body = builder::build_request(config, account_id, &role_crns, variant)?;

        let created = client
            .post(
                &surface_url(client, variant, None),
                RequestOptions {
                    body: Some(&body),
                    transaction_id: txn,
                    ..Default::default()
                },
            )
            .await?;

        let policy_id = created
            .body
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ProviderError::Api {
                status: created.status,
                message: "create response carried no policy id".to_string(),
                transaction_id: created.transaction_id.clone(),
            })?;
        let id = LocalId::new(&config.access_group_id, policy_id);
        tracing::info!("Created {} access group policy {}", variant, id);

        let what = format!("access group policy {id}");
        let (remote, response) = settle::wait_until_readable(&what, &client.settle, || {
            self.fetch(client, &id.object, txn)
        })
        .await
        .map_err(|e| ProviderError::Settle {
            id: id.to_string(),
            source: Box::new(e),
        })?;

        Ok(self.observed(&id, &remote, &response, config, &catalog))
    }

    async fn read(&self, client: &IbmClient, prior: &Self::State) -> Result<Option<Self::State>> {
        let id = LocalId::parse(&prior.id)?;
        let txn = prior.config.transaction_id.as_deref();

        let (remote, response) = match self.fetch(client, &id.object, txn).await {
            Ok(found) => found,
            Err(e) if e.is_not_found() => {
                tracing::info!("Access group policy {} no longer exists", id);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if remote.is_deleted() {
            tracing::info!("Access group policy {} is in deleted state", id);
            return Ok(None);
        }
        check_subject(&remote, &id)?;

        let catalog = self.catalog_for(client, &remote).await?;
        Ok(Some(self.observed(&id, &remote, &response, &prior.config, &catalog)))
    }

    async fn update(
        &self,
        client: &IbmClient,
        prior: &Self::State,
        config: &Self::Config,
    ) -> Result<Self::State> {
        builder::validate(config)?;
        let id = LocalId::parse(&prior.id)?;
        let account_id = client.require_account_id()?;
        let txn = config.transaction_id.as_deref();

        let (existing, current) = self.fetch(client, &id.object, txn).await?;
        let variant = existing.variant();
        variant.check_update(config)?;

        let catalog = list_roles(client, builder::service_name(config)).await?;
        let role_crns = catalog.crns_for(&config.roles)?;
        let body = builder::build_request(config, account_id, &role_crns, variant)?;

        // The token from the last refresh, so concurrent edits are detected.
        let if_match = prior.version.as_deref().or(current.etag.as_deref());

        client
            .put(
                &surface_url(client, variant, Some(&id.object)),
                RequestOptions {
                    body: Some(&body),
                    if_match,
                    transaction_id: txn,
                    ..Default::default()
                },
            )
            .await?;
        tracing::info!("Replaced {} access group policy {}", variant, id);

        let (remote, response) = self.fetch(client, &id.object, txn).await?;
        Ok(self.observed(&id, &remote, &response, config, &catalog))
    }

    async fn delete(&self, client: &IbmClient, prior: &Self::State) -> Result<()> {
        let id = LocalId::parse(&prior.id)?;
        let txn = prior.config.transaction_id.as_deref();

        let existing = match self.fetch(client, &id.object, txn).await {
            Ok((remote, _)) => remote,
            Err(e) if e.is_not_found() => {
                tracing::info!("Access group policy {} already gone", id);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let url = surface_url(client, existing.variant(), Some(&id.object));
        match client.delete(&url, RequestOptions::with_transaction(txn)).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        tracing::info!("Deleted {} access group policy {}", existing.variant(), id);
        Ok(())
    }

    async fn import(&self, client: &IbmClient, id: &str) -> Result<Self::State> {
        let id = LocalId::parse(id)?;
        let (remote, response) = self.fetch(client, &id.object, None).await?;
        check_subject(&remote, &id)?;

        let catalog = self.catalog_for(client, &remote).await?;
        Ok(AccessGroupPolicyState {
            id: id.to_string(),
            config: flatten::flatten_for_import(&remote, &catalog),
            version: response.etag,
        })
    }

    fn placeholder(&self, id: &str, config: &Self::Config) -> Self::State {
        AccessGroupPolicyState {
            id: id.to_string(),
            config: config.clone(),
            version: None,
        }
    }

    fn state_id<'a>(&self, state: &'a Self::State) -> &'a str {
        &state.id
    }

    fn state_config<'a>(&self, state: &'a Self::State) -> &'a Self::Config {
        &state.config
    }

    /// `transaction_id` is reported by the server, so it only counts when set
    fn needs_update(&self, prior: &Self::Config, desired: &Self::Config) -> bool {
        if desired.transaction_id.is_none() {
            let mut prior = prior.clone();
            prior.transaction_id = None;
            return prior != *desired;
        }
        prior != desired
    }

    fn requires_replace(&self, prior: &Self::Config, desired: &Self::Config) -> bool {
        prior.access_group_id != desired.access_group_id
    }
}
