//! Token manager with single-flight anonymous fetches
//!
//! Acquires anonymous (device-level) access tokens from the token endpoint
//! and stores them in the configuration store. At most one fetch is in
//! flight at any time, enforced by a plain boolean guard rather than a
//! wait-list: a caller that finds a fetch already running gets
//! [`FetchOutcome::FetchInProgress`] and no token, and is expected to retry
//! its own call later.
//!
//! State machine: `Idle → Fetching → Idle(success) | Idle(failure)`. The
//! guard is cleared by an RAII drop on every completion path, so the
//! manager cannot wedge in the fetching state.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use scorelink_domain::constants::ANONYMOUS_TOKEN_RESOURCE;
use scorelink_domain::{ClientError, HttpVerb, Result, TokenGrant};
use tracing::{debug, info, instrument, warn};

use crate::config::ConfigStore;
use crate::transport::{HttpTransport, TransportRequest};

/// What a call to [`TokenManager::fetch_anonymous_access_token_if_needed`]
/// actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A usable token was already stored; nothing was issued.
    TokenPresent,
    /// This call issued the fetch and a token is now stored.
    Fetched,
    /// Another fetch is in flight. This caller received no token and must
    /// retry its own call later; it is not queued for the in-flight result.
    FetchInProgress,
}

/// Errors from a single token-endpoint attempt, split by retryability.
enum TokenFetchError {
    /// Transport failure or 5xx: worth another attempt.
    Retryable(String),
    /// Credential rejection or malformed grant: retrying cannot help.
    Fatal(ClientError),
}

/// Acquires and stores anonymous access tokens.
pub struct TokenManager {
    config: Arc<ConfigStore>,
    transport: Arc<dyn HttpTransport>,
    retry_budget: u32,
    fetching: Arc<AtomicBool>,
}

/// Clears the single-flight guard on drop, covering every exit path of the
/// fetch including cancellation.
struct FetchGuard(Arc<AtomicBool>);

impl Drop for FetchGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl TokenManager {
    /// Create a manager with the given extra-attempt budget.
    pub fn new(
        config: Arc<ConfigStore>,
        transport: Arc<dyn HttpTransport>,
        retry_budget: u32,
    ) -> Self {
        Self { config, transport, retry_budget, fetching: Arc::new(AtomicBool::new(false)) }
    }

    /// Whether a fetch is currently in flight.
    pub fn fetch_in_flight(&self) -> bool {
        self.fetching.load(Ordering::Acquire)
    }

    /// Issue an anonymous-token fetch unless a usable token is stored.
    ///
    /// Returns what happened; see [`FetchOutcome`]. Only the caller that
    /// wins the guard performs network work.
    ///
    /// # Errors
    /// Propagates the fetch error when this caller issued the fetch and it
    /// failed terminally.
    #[instrument(skip(self))]
    pub async fn fetch_anonymous_access_token_if_needed(&self) -> Result<FetchOutcome> {
        if self.config.access_token().is_some() {
            return Ok(FetchOutcome::TokenPresent);
        }

        if self
            .fetching
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("token fetch already in flight; caller must retry later");
            return Ok(FetchOutcome::FetchInProgress);
        }

        let _guard = FetchGuard(Arc::clone(&self.fetching));
        self.fetch_anonymous_access_token(self.retry_budget).await?;
        Ok(FetchOutcome::Fetched)
    }

    /// Callback-less variant: run the fetch as a background task.
    ///
    /// Returns whether a fetch task was actually spawned. The check here is
    /// advisory; the spawned task re-enters through the single-flight guard.
    pub fn spawn_fetch_if_needed(self: &Arc<Self>) -> bool {
        if self.config.access_token().is_some() || self.fetch_in_flight() {
            return false;
        }

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = manager.fetch_anonymous_access_token_if_needed().await {
                warn!(error = %err, "background token fetch failed");
            }
        });
        true
    }

    /// Fetch an anonymous token, retrying transient failures.
    ///
    /// Network failures and 5xx answers consume the retry budget; a 4xx
    /// answer is a credential rejection and fails immediately as a
    /// configuration error. On success the token is stored (anonymous=true)
    /// together with the granted session and player ids.
    ///
    /// # Errors
    /// [`ClientError::TokenAcquisition`] once the budget is exhausted,
    /// [`ClientError::Config`] on credential rejection.
    #[instrument(skip(self))]
    pub async fn fetch_anonymous_access_token(
        &self,
        mut retries_remaining: u32,
    ) -> Result<TokenGrant> {
        loop {
            match self.request_token().await {
                Ok(grant) => {
                    self.config.set_access_token(Some(&grant.token), true)?;
                    if let Some(sid) = &grant.sid {
                        self.config.set_sid(sid)?;
                    }
                    if let Some(player_id) = &grant.player_id {
                        self.config.set_player_id(player_id)?;
                    }
                    info!("anonymous access token acquired");
                    return Ok(grant);
                }
                Err(TokenFetchError::Retryable(reason)) if retries_remaining > 0 => {
                    debug!(retries_remaining, %reason, "token fetch failed; retrying");
                    retries_remaining -= 1;
                }
                Err(TokenFetchError::Retryable(reason)) => {
                    return Err(ClientError::TokenAcquisition(format!(
                        "retry budget exhausted: {reason}"
                    )));
                }
                Err(TokenFetchError::Fatal(err)) => return Err(err),
            }
        }
    }

    /// One attempt against the token endpoint.
    async fn request_token(&self) -> std::result::Result<TokenGrant, TokenFetchError> {
        let mut params = BTreeMap::new();
        params.insert("clientId".to_string(), self.config.client_id().to_string());
        params.insert("clientSecret".to_string(), self.config.client_secret().to_string());

        let request = TransportRequest {
            method: HttpVerb::Post,
            url: format!("{}{}", self.config.base_url(), ANONYMOUS_TOKEN_RESOURCE),
            params,
            access_token: None,
        };

        let response = self
            .transport
            .send(&request)
            .await
            .map_err(|err| TokenFetchError::Retryable(err.to_string()))?;

        if response.is_server_error() {
            return Err(TokenFetchError::Retryable(format!(
                "token endpoint returned {}",
                response.status
            )));
        }
        if !response.is_success() {
            return Err(TokenFetchError::Fatal(ClientError::Config(format!(
                "client credentials rejected by the token endpoint (status {})",
                response.status
            ))));
        }

        TokenGrant::from_body(&response.body).ok_or_else(|| {
            TokenFetchError::Fatal(ClientError::TokenAcquisition(
                "token endpoint returned a malformed grant".into(),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use async_trait::async_trait;
    use scorelink_domain::constants::DEFAULT_TOKEN_RETRY_BUDGET;
    use serde_json::json;
    use tokio::sync::Notify;

    use super::*;
    use crate::config::ClientCredentials;
    use crate::storage::{KeyValueStorage, MemoryStorage};
    use crate::transport::{TransportError, TransportResponse};

    /// Transport that pops scripted results, optionally blocking on a gate
    /// before answering.
    struct ScriptedTransport {
        calls: AtomicUsize,
        responses: parking_lot::Mutex<Vec<std::result::Result<TransportResponse, TransportError>>>,
        gate: Option<Arc<Notify>>,
    }

    impl ScriptedTransport {
        fn new(
            responses: Vec<std::result::Result<TransportResponse, TransportError>>,
        ) -> Self {
            Self { calls: AtomicUsize::new(0), responses: parking_lot::Mutex::new(responses), gate: None }
        }

        fn gated(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn send(
            &self,
            _request: &TransportRequest,
        ) -> std::result::Result<TransportResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let mut responses = self.responses.lock();
            if responses.is_empty() {
                Ok(grant_response())
            } else {
                responses.remove(0)
            }
        }
    }

    fn grant_response() -> TransportResponse {
        TransportResponse {
            status: 200,
            body: json!({
                "accessToken": { "token": "anon-tok" },
                "sid": "sid-9",
                "me": { "id": "ghost-7" }
            }),
        }
    }

    fn build_manager(transport: Arc<ScriptedTransport>, retry_budget: u32) -> TokenManager {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let config =
            Arc::new(ConfigStore::new(ClientCredentials::sandbox("id", "secret"), storage).unwrap());
        TokenManager::new(config, transport, retry_budget)
    }

    #[tokio::test]
    async fn stored_token_short_circuits_the_fetch() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let manager = build_manager(Arc::clone(&transport), DEFAULT_TOKEN_RETRY_BUDGET);
        manager.config.set_access_token(Some("existing"), true).unwrap();

        let outcome = manager.fetch_anonymous_access_token_if_needed().await.unwrap();
        assert_eq!(outcome, FetchOutcome::TokenPresent);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn successful_fetch_stores_the_full_grant() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(grant_response())]));
        let manager = build_manager(Arc::clone(&transport), 0);

        let outcome = manager.fetch_anonymous_access_token_if_needed().await.unwrap();
        assert_eq!(outcome, FetchOutcome::Fetched);
        assert_eq!(manager.config.access_token_pair(), Some(("anon-tok".to_string(), true)));
        assert_eq!(manager.config.sid().as_deref(), Some("sid-9"));
        assert_eq!(manager.config.player_id().as_deref(), Some("ghost-7"));
    }

    #[tokio::test]
    async fn concurrent_callers_issue_exactly_one_fetch() {
        let gate = Arc::new(Notify::new());
        let transport =
            Arc::new(ScriptedTransport::new(vec![Ok(grant_response())]).gated(Arc::clone(&gate)));
        let manager = Arc::new(build_manager(Arc::clone(&transport), 0));

        let winner = {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.fetch_anonymous_access_token_if_needed().await })
        };

        // Give the winner time to reach the (gated) transport call.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(manager.fetch_in_flight());

        let loser = manager.fetch_anonymous_access_token_if_needed().await.unwrap();
        assert_eq!(loser, FetchOutcome::FetchInProgress);

        gate.notify_one();
        assert_eq!(winner.await.unwrap().unwrap(), FetchOutcome::Fetched);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn background_fetch_variant_reports_whether_it_spawned() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(grant_response())]));
        let manager = Arc::new(build_manager(Arc::clone(&transport), 0));

        assert!(manager.spawn_fetch_if_needed());

        // Poll until the background task stores the token.
        for _ in 0..100 {
            if manager.config.access_token().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(manager.config.access_token().as_deref(), Some("anon-tok"));

        assert!(!manager.spawn_fetch_if_needed(), "token present; nothing to spawn");
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn transient_failures_consume_the_retry_budget() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(TransportError::Connection("refused".into())),
            Ok(TransportResponse { status: 503, body: json!({}) }),
            Ok(grant_response()),
        ]));
        let manager = build_manager(Arc::clone(&transport), 2);

        let grant = manager.fetch_anonymous_access_token(2).await.unwrap();
        assert_eq!(grant.token, "anon-tok");
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn exhausted_budget_surfaces_token_acquisition() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(TransportError::Connection("refused".into())),
            Err(TransportError::Connection("refused".into())),
        ]));
        let manager = build_manager(Arc::clone(&transport), 1);

        let err = manager.fetch_anonymous_access_token(1).await.unwrap_err();
        assert!(matches!(err, ClientError::TokenAcquisition(_)));
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn credential_rejection_is_fatal_and_not_retried() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(TransportResponse {
            status: 401,
            body: json!({}),
        })]));
        let manager = build_manager(Arc::clone(&transport), 5);

        let err = manager.fetch_anonymous_access_token(5).await.unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn guard_clears_after_a_failed_fetch() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(TransportError::Connection("refused".into())),
            Ok(grant_response()),
        ]));
        let manager = build_manager(Arc::clone(&transport), 0);

        assert!(manager.fetch_anonymous_access_token_if_needed().await.is_err());
        assert!(!manager.fetch_in_flight());

        // The manager is back in Idle and can fetch again.
        let outcome = manager.fetch_anonymous_access_token_if_needed().await.unwrap();
        assert_eq!(outcome, FetchOutcome::Fetched);
    }
}
