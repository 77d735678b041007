//! Caller-facing API response

use scorelink_domain::ErrorEnvelope;
use serde_json::Value;

use crate::transport::TransportResponse;

/// A decoded answer from the API.
///
/// Holding the raw JSON body keeps the SDK agnostic of individual resource
/// schemas; callers deserialize the payload they expect.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    /// The application error carried in the envelope, if any.
    #[must_use]
    pub fn application_error(&self) -> Option<ErrorEnvelope> {
        ErrorEnvelope::from_body(&self.body)
    }
}

impl From<TransportResponse> for ApiResponse {
    fn from(response: TransportResponse) -> Self {
        Self { status: response.status, body: response.body }
    }
}
