//! HTTP transport port
//!
//! The SDK never talks to the network directly; it hands fully described
//! calls to an injected [`HttpTransport`]. The transport owns connections,
//! TLS, and its own timeout configuration — a timeout surfaces here as an
//! ordinary [`TransportError`] and is treated like any other network
//! failure for queueing purposes.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use scorelink_domain::{ClientError, HttpVerb};
use serde_json::Value;
use thiserror::Error;

/// One fully described HTTP call.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: HttpVerb,
    /// Absolute URL (API root + resource path).
    pub url: String,
    pub params: BTreeMap<String, String>,
    /// Access token to attach, if the call is authenticated.
    pub access_token: Option<String>,
}

/// Status code and decoded JSON body of a completed call.
///
/// A response existing at all means the server answered; envelope-level
/// errors are the executor's business, not the transport's.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Value,
}

impl TransportResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    #[must_use]
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

/// Failures below the HTTP layer.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        ClientError::Network(err.to_string())
    }
}

/// Asynchronous HTTP transport collaborator.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Dispatch one call and return the server's answer.
    async fn send(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError>;
}
