//! # Scorelink Client
//!
//! Mobile client SDK for the Scorelink REST API: authenticated request
//! execution with single-flight anonymous-token acquisition, plus a durable
//! retry queue that survives process restarts and replays undelivered
//! requests when connectivity comes back.
//!
//! The SDK owns no sockets. The HTTP transport and the key-value storage
//! are injected collaborators, which keeps every component testable and the
//! crate free of platform assumptions.
//!
//! ```no_run
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//!
//! use scorelink_client::{ClientCredentials, HttpTransport, MemoryStorage, ScorelinkClient};
//!
//! # async fn example(transport: Arc<dyn HttpTransport>) -> scorelink_client::Result<()> {
//! let client = ScorelinkClient::builder()
//!     .credentials(ClientCredentials::sandbox("client-id", "client-secret"))
//!     .transport(transport)
//!     .storage(Arc::new(MemoryStorage::new()))
//!     .build()?;
//!
//! // Replays anything left over from the previous run.
//! client.start().await?;
//!
//! let me = client.get("/players/me", BTreeMap::new()).await?;
//! println!("player: {}", me.body);
//!
//! // Survives restarts; delivered once connectivity allows.
//! let mut params = BTreeMap::new();
//! params.insert("score".to_string(), "1450".to_string());
//! client.post_eventually("/scores/level-3", params).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod client;
pub mod config;
pub mod queue;
pub mod storage;
pub mod transport;

// Re-export commonly used items
pub use api::{ApiResponse, Delivery, RequestExecutor};
pub use auth::{FetchOutcome, TokenManager};
pub use client::{ScorelinkClient, ScorelinkClientBuilder};
pub use config::{ClientCredentials, ConfigStore};
pub use queue::{ReplayWorker, ReplayWorkerConfig, RetryQueue};
pub use scorelink_domain::{
    ApiRequest, ClientError, ErrorEnvelope, HttpVerb, QueuedRequest, Result, TokenGrant,
};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, StorageError};
pub use transport::{HttpTransport, TransportError, TransportRequest, TransportResponse};
