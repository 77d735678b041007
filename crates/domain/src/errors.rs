//! Error types used throughout the SDK

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Scorelink operations
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "detail")]
pub enum ClientError {
    /// Invalid client credentials or builder input. Fatal; never retried.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The anonymous-token fetch could not produce a token, either because
    /// the retry budget ran out or because another fetch is already in
    /// flight and this caller must retry its own call later.
    #[error("Token acquisition failed: {0}")]
    TokenAcquisition(String),

    /// HTTP method outside GET/POST/PUT/DELETE. Raised before any network
    /// call is issued.
    #[error("Invalid HTTP verb: {0}")]
    InvalidVerb(String),

    /// Transport-level failure (connection refused, timeout, 5xx). For
    /// queued requests this is absorbed by the retry queue rather than
    /// surfaced as terminal.
    #[error("Network error: {0}")]
    Network(String),

    /// Non-auth application error envelope, surfaced verbatim.
    #[error("API error {code}: {message}")]
    Application { code: i64, message: String },

    /// The server rejected the access token twice in a row for one call.
    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    /// Durable key-value storage failure.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Scorelink operations
pub type Result<T> = std::result::Result<T, ClientError>;
