//! Wire-contract constants for the Scorelink REST API

/// Production API root.
pub const PRODUCTION_BASE_URL: &str = "https://api.scorelink.io/v1";

/// Sandbox API root used during development.
pub const SANDBOX_BASE_URL: &str = "https://sandbox.api.scorelink.io/v1";

/// Resource used to obtain an anonymous (device-level) access token.
pub const ANONYMOUS_TOKEN_RESOURCE: &str = "/oauth/anonymousAccessToken";

/// First code of the reserved authentication-failure range.
pub const AUTH_ERROR_CODE_START: i64 = 11_000;

/// One past the last code of the authentication-failure range.
pub const AUTH_ERROR_CODE_END: i64 = 11_100;

/// The presented access token is invalid or has been revoked.
pub const ERROR_INVALID_ACCESS_TOKEN: i64 = 11_003;

/// The presented access token has expired.
pub const ERROR_EXPIRED_ACCESS_TOKEN: i64 = 11_004;

/// Default number of extra attempts when fetching an anonymous token.
pub const DEFAULT_TOKEN_RETRY_BUDGET: u32 = 3;
