//! Response-envelope inspection
//!
//! Every Scorelink response body is a JSON envelope. Application errors
//! travel as `{"error": {"code": <int>, "message": <string>}}`;
//! authentication failures occupy the reserved code range
//! [`AUTH_ERROR_CODE_START`, `AUTH_ERROR_CODE_END`).
//!
//! [`AUTH_ERROR_CODE_START`]: crate::constants::AUTH_ERROR_CODE_START
//! [`AUTH_ERROR_CODE_END`]: crate::constants::AUTH_ERROR_CODE_END

use serde_json::Value;

use crate::constants::{AUTH_ERROR_CODE_END, AUTH_ERROR_CODE_START};

/// An application error extracted from a response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEnvelope {
    pub code: i64,
    pub message: String,
}

impl ErrorEnvelope {
    /// Extract the error object from a response body, if present.
    ///
    /// A body without an `error` object (or with a non-numeric code) is a
    /// successful payload as far as the envelope contract is concerned.
    #[must_use]
    pub fn from_body(body: &Value) -> Option<Self> {
        let error = body.get("error")?;
        let code = error.get("code")?.as_i64()?;
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Some(Self { code, message })
    }

    /// Whether this error code falls in the authentication-failure range.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        (AUTH_ERROR_CODE_START..AUTH_ERROR_CODE_END).contains(&self.code)
    }
}
