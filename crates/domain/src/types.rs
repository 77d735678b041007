//! Common data types used throughout the SDK

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::ClientError;

/// HTTP methods accepted by the Scorelink REST API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpVerb {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpVerb {
    /// Canonical upper-case method name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpVerb {
    type Err = ClientError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            _ => Err(ClientError::InvalidVerb(raw.to_string())),
        }
    }
}

/// A serializable description of one REST API call.
///
/// The completion handler is deliberately not part of this type: handlers
/// cannot survive a process restart, so they live in an in-process registry
/// keyed by `request_id` while the request itself can be persisted and
/// replayed by content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiRequest {
    /// Resource path relative to the API root, e.g. `/scores`.
    pub resource: String,

    /// HTTP method name. Kept as text so a persisted request written by a
    /// different SDK version can still be loaded and rejected individually
    /// instead of poisoning the whole queue snapshot.
    pub method: String,

    /// Request parameters. Keys are unique; ordering carries no meaning.
    pub params: BTreeMap<String, String>,

    /// Unique id assigned at creation; the queue and completion key.
    pub request_id: String,
}

impl ApiRequest {
    /// Create a request with a fresh unique id.
    #[must_use]
    pub fn new(
        method: impl Into<String>,
        resource: impl Into<String>,
        params: BTreeMap<String, String>,
    ) -> Self {
        Self {
            resource: resource.into(),
            method: method.into(),
            params,
            request_id: Uuid::new_v4().to_string(),
        }
    }

    /// Validate and return the HTTP verb.
    ///
    /// # Errors
    /// Returns [`ClientError::InvalidVerb`] for methods outside
    /// GET/POST/PUT/DELETE.
    pub fn verb(&self) -> Result<HttpVerb, ClientError> {
        self.method.parse()
    }
}

/// A retry-queue entry: a request plus its delivery bookkeeping.
///
/// Entries are ordered by enqueue time and every mutation is persisted
/// immediately as part of the queue snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedRequest {
    pub request: ApiRequest,
    pub enqueued_at: DateTime<Utc>,
    pub attempts: u32,
}

impl QueuedRequest {
    /// Wrap a request for queueing, stamped with the current time.
    #[must_use]
    pub fn new(request: ApiRequest) -> Self {
        Self { request, enqueued_at: Utc::now(), attempts: 0 }
    }
}

/// Parsed contents of a successful token-endpoint response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    /// The anonymous access token.
    pub token: String,
    /// Session id issued alongside the token, if any.
    pub sid: Option<String>,
    /// Id of the (ghost) player the token was issued for, if any.
    pub player_id: Option<String>,
}

impl TokenGrant {
    /// Extract a grant from a token-endpoint envelope.
    ///
    /// Returns `None` when the access token field is missing, which callers
    /// treat as a malformed grant.
    #[must_use]
    pub fn from_body(body: &Value) -> Option<Self> {
        let token = body.get("accessToken")?.get("token")?.as_str()?.to_string();
        let sid = body.get("sid").and_then(Value::as_str).map(str::to_string);
        let player_id = body
            .get("me")
            .and_then(|me| me.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string);

        Some(Self { token, sid, player_id })
    }
}
