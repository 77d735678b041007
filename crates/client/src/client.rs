//! Client facade and builder
//!
//! Wires the configuration store, token manager, executor, retry queue, and
//! replay worker together behind one handle, with verb-named convenience
//! methods over the raw request API.

use std::collections::BTreeMap;
use std::sync::Arc;

use scorelink_domain::constants::DEFAULT_TOKEN_RETRY_BUDGET;
use scorelink_domain::{ApiRequest, ClientError, HttpVerb, Result};
use tokio::sync::watch;

use crate::api::{ApiResponse, Delivery, RequestExecutor};
use crate::auth::TokenManager;
use crate::config::{ClientCredentials, ConfigStore};
use crate::queue::{ReplayWorker, ReplayWorkerConfig, RetryQueue};
use crate::storage::KeyValueStorage;
use crate::transport::HttpTransport;

/// Entry point to the SDK.
///
/// Construct one per installation via [`ScorelinkClient::builder`], then
/// call [`start`](Self::start) to replay any requests left over from a
/// previous run and begin watching for connectivity recovery.
pub struct ScorelinkClient {
    config: Arc<ConfigStore>,
    tokens: Arc<TokenManager>,
    executor: Arc<RequestExecutor>,
    worker: tokio::sync::Mutex<ReplayWorker>,
    // Keeps the default always-online signal alive when the host app does
    // not inject its own connectivity source.
    _connectivity_sender: Option<watch::Sender<bool>>,
}

impl ScorelinkClient {
    /// Start building a client.
    #[must_use]
    pub fn builder() -> ScorelinkClientBuilder {
        ScorelinkClientBuilder::default()
    }

    /// Start the replay worker: one startup replay (when connectivity is
    /// up) plus a replay on every reported connectivity recovery.
    ///
    /// # Errors
    /// Returns an error if the worker is already running.
    pub async fn start(&self) -> Result<()> {
        self.worker.lock().await.start().await
    }

    /// Stop the replay worker. A client that was never started shuts down
    /// quietly.
    ///
    /// # Errors
    /// Propagates a panicked or wedged worker task.
    pub async fn shutdown(&self) -> Result<()> {
        let mut worker = self.worker.lock().await;
        if worker.is_running() {
            worker.stop().await
        } else {
            Ok(())
        }
    }

    /// GET a resource.
    pub async fn get(
        &self,
        resource: &str,
        params: BTreeMap<String, String>,
    ) -> Result<ApiResponse> {
        self.request_authenticated(&ApiRequest::new(HttpVerb::Get.as_str(), resource, params))
            .await
    }

    /// POST to a resource.
    pub async fn post(
        &self,
        resource: &str,
        params: BTreeMap<String, String>,
    ) -> Result<ApiResponse> {
        self.request_authenticated(&ApiRequest::new(HttpVerb::Post.as_str(), resource, params))
            .await
    }

    /// PUT to a resource.
    pub async fn put(
        &self,
        resource: &str,
        params: BTreeMap<String, String>,
    ) -> Result<ApiResponse> {
        self.request_authenticated(&ApiRequest::new(HttpVerb::Put.as_str(), resource, params))
            .await
    }

    /// DELETE a resource.
    pub async fn delete(
        &self,
        resource: &str,
        params: BTreeMap<String, String>,
    ) -> Result<ApiResponse> {
        self.request_authenticated(&ApiRequest::new(HttpVerb::Delete.as_str(), resource, params))
            .await
    }

    /// POST with eventual-delivery semantics: the request survives restarts
    /// and is replayed until delivered.
    pub async fn post_eventually(
        &self,
        resource: &str,
        params: BTreeMap<String, String>,
    ) -> Result<Delivery> {
        self.request_eventually(ApiRequest::new(HttpVerb::Post.as_str(), resource, params)).await
    }

    /// Run a fully described request through the authenticated path.
    pub async fn request_authenticated(&self, request: &ApiRequest) -> Result<ApiResponse> {
        self.executor.request_authenticated(request).await
    }

    /// Enqueue a fully described request for eventual delivery.
    pub async fn request_eventually(&self, request: ApiRequest) -> Result<Delivery> {
        Arc::clone(&self.executor).request_eventually(request).await
    }

    /// Kick off a background anonymous-token fetch when no token is stored.
    /// Returns whether a fetch task was spawned.
    pub fn fetch_access_token_if_needed(&self) -> bool {
        self.tokens.spawn_fetch_if_needed()
    }

    /// Replay the durable queue right now, e.g. from a manual retry button.
    pub async fn replay_all(&self) {
        self.executor.replay_all().await;
    }

    /// Number of requests still awaiting delivery.
    pub async fn pending_requests(&self) -> usize {
        self.executor.queue().len().await
    }

    /// The shared configuration store.
    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }
}

/// Builder for [`ScorelinkClient`].
#[derive(Default)]
pub struct ScorelinkClientBuilder {
    credentials: Option<ClientCredentials>,
    transport: Option<Arc<dyn HttpTransport>>,
    storage: Option<Arc<dyn KeyValueStorage>>,
    connectivity: Option<watch::Receiver<bool>>,
    token_retry_budget: Option<u32>,
    replay: ReplayWorkerConfig,
}

impl ScorelinkClientBuilder {
    /// Set the client credentials (required).
    #[must_use]
    pub fn credentials(mut self, credentials: ClientCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set the HTTP transport collaborator (required).
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the durable key-value storage (required).
    #[must_use]
    pub fn storage(mut self, storage: Arc<dyn KeyValueStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Connectivity signal from the host application; `true` = reachable.
    /// Without one the client assumes it is always online.
    #[must_use]
    pub fn connectivity(mut self, connectivity: watch::Receiver<bool>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// Extra attempts for the anonymous-token fetch (default 3).
    #[must_use]
    pub fn token_retry_budget(mut self, budget: u32) -> Self {
        self.token_retry_budget = Some(budget);
        self
    }

    /// Replay worker tuning.
    #[must_use]
    pub fn replay_config(mut self, config: ReplayWorkerConfig) -> Self {
        self.replay = config;
        self
    }

    /// Build the client, loading persisted state from storage.
    ///
    /// # Errors
    /// Returns [`ClientError::Config`] when a required collaborator is
    /// missing or the credentials are invalid, [`ClientError::Storage`]
    /// when persisted state cannot be read.
    pub fn build(self) -> Result<ScorelinkClient> {
        let credentials = self
            .credentials
            .ok_or_else(|| ClientError::Config("client credentials not set".into()))?;
        let transport =
            self.transport.ok_or_else(|| ClientError::Config("transport not set".into()))?;
        let storage = self.storage.ok_or_else(|| ClientError::Config("storage not set".into()))?;

        let config = Arc::new(ConfigStore::new(credentials, Arc::clone(&storage))?);
        let tokens = Arc::new(TokenManager::new(
            Arc::clone(&config),
            Arc::clone(&transport),
            self.token_retry_budget.unwrap_or(DEFAULT_TOKEN_RETRY_BUDGET),
        ));
        let queue = Arc::new(RetryQueue::load(storage)?);
        let executor = Arc::new(RequestExecutor::new(
            Arc::clone(&config),
            Arc::clone(&tokens),
            transport,
            queue,
        ));

        let (connectivity, connectivity_sender) = match self.connectivity {
            Some(receiver) => (receiver, None),
            None => {
                let (sender, receiver) = watch::channel(true);
                (receiver, Some(sender))
            }
        };

        let worker = ReplayWorker::new(Arc::clone(&executor), connectivity, self.replay);

        Ok(ScorelinkClient {
            config,
            tokens,
            executor,
            worker: tokio::sync::Mutex::new(worker),
            _connectivity_sender: connectivity_sender,
        })
    }
}
