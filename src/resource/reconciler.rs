//! The CRUD contract every resource type implements.

use crate::error::Result;
use crate::ibm::client::IbmClient;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

#[async_trait]
pub trait Reconciler: Send + Sync {
    /// User-declared attributes
    type Config: Serialize + DeserializeOwned + Clone + PartialEq + Debug + Send + Sync;
    /// Config plus ID and computed attributes, as stored between runs
    type State: Serialize + DeserializeOwned + Clone + Debug + Send + Sync;

    const TYPE_NAME: &'static str;

    /// Canonical form of a decoded config, so it compares equal to what a
    /// read reports back
    fn normalize(&self, config: Self::Config) -> Self::Config {
        config
    }

    /// Local checks, run before any remote call
    fn validate(&self, config: &Self::Config) -> Result<()>;

    /// Create, wait until readable, and return the observed state.
    ///
    /// When the object is created but never becomes readable the error is
    /// [`crate::error::ProviderError::Settle`] carrying the new ID.
    async fn create(&self, client: &IbmClient, config: &Self::Config) -> Result<Self::State>;

    /// Refresh; `Ok(None)` when the object no longer exists
    async fn read(&self, client: &IbmClient, prior: &Self::State) -> Result<Option<Self::State>>;

    async fn update(
        &self,
        client: &IbmClient,
        prior: &Self::State,
        config: &Self::Config,
    ) -> Result<Self::State>;

    /// Deleting an object that is already gone succeeds
    async fn delete(&self, client: &IbmClient, prior: &Self::State) -> Result<()>;

    /// Rebuild state from an ID alone
    async fn import(&self, client: &IbmClient, id: &str) -> Result<Self::State>;

    /// State holding only an ID and the desired config
    fn placeholder(&self, id: &str, config: &Self::Config) -> Self::State;

    fn state_id<'a>(&self, state: &'a Self::State) -> &'a str;

    fn state_config<'a>(&self, state: &'a Self::State) -> &'a Self::Config;

    fn needs_update(&self, prior: &Self::Config, desired: &Self::Config) -> bool {
        prior != desired
    }

    /// Changes that cannot be applied in place
    fn requires_replace(&self, _prior: &Self::Config, _desired: &Self::Config) -> bool {
        false
    }
}
