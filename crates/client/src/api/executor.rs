//! Authenticated request executor
//!
//! Runs one API call end-to-end: verb validation, token gating through the
//! token manager, dispatch over the injected transport, envelope decoding,
//! and the bounded re-authentication loop. Also owns the eventual-delivery
//! path: requests enqueued into the durable retry queue and replayed at
//! startup or on connectivity recovery.
//!
//! Completion for eventual requests travels over a oneshot channel held in
//! an in-process registry. The channel reference cannot be persisted, so a
//! request replayed after a process restart completes silently from the
//! original caller's perspective — eventual delivery guarantees the side
//! effect, not the notification.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use scorelink_domain::{ApiRequest, ClientError, HttpVerb, QueuedRequest, Result};
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};

use crate::auth::{FetchOutcome, TokenManager};
use crate::config::ConfigStore;
use crate::queue::RetryQueue;
use crate::transport::{HttpTransport, TransportRequest};

use super::response::ApiResponse;

/// Handle to an eventually-delivered request.
///
/// `completed` resolves once the request has been delivered (successfully
/// or with a terminal error) *within this process lifetime*. If the process
/// restarts while the request is still queued, the replay completes without
/// a handler and this channel is simply gone — by design, not by accident.
#[derive(Debug)]
pub struct Delivery {
    request_id: String,
    receiver: oneshot::Receiver<Result<ApiResponse>>,
}

impl Delivery {
    /// Id of the queued request, usable with [`RetryQueue::dequeue`].
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Await the outcome. Returns `None` when the client was torn down
    /// before the request completed in this process.
    pub async fn completed(self) -> Option<Result<ApiResponse>> {
        self.receiver.await.ok()
    }
}

/// Orchestrates token manager, transport, and retry queue for one call.
pub struct RequestExecutor {
    config: Arc<ConfigStore>,
    tokens: Arc<TokenManager>,
    transport: Arc<dyn HttpTransport>,
    queue: Arc<RetryQueue>,
    completions: Mutex<HashMap<String, oneshot::Sender<Result<ApiResponse>>>>,
    replay_lock: tokio::sync::Mutex<()>,
}

impl RequestExecutor {
    pub fn new(
        config: Arc<ConfigStore>,
        tokens: Arc<TokenManager>,
        transport: Arc<dyn HttpTransport>,
        queue: Arc<RetryQueue>,
    ) -> Self {
        Self {
            config,
            tokens,
            transport,
            queue,
            completions: Mutex::new(HashMap::new()),
            replay_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// The durable retry queue backing `request_eventually`.
    pub fn queue(&self) -> &Arc<RetryQueue> {
        &self.queue
    }

    /// Run one authenticated request to completion.
    ///
    /// Verb validation happens synchronously before any network call. A
    /// missing token triggers a single-flight anonymous fetch; an
    /// auth-failure envelope clears the stored token and the call is
    /// retried exactly once with a fresh token.
    ///
    /// # Errors
    /// See [`ClientError`] for the full taxonomy; every error is reported
    /// at most once per call.
    #[instrument(skip(self, request), fields(request_id = %request.request_id, resource = %request.resource))]
    pub async fn request_authenticated(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let verb = request.verb()?;
        self.execute_with_auth(verb, request).await
    }

    /// Enqueue a request for eventual delivery, then attempt it now.
    ///
    /// The request is persisted before the first attempt, so a crash at any
    /// later point cannot lose it. Success or a terminal (non-connectivity)
    /// failure dequeues the entry and completes the returned [`Delivery`];
    /// a network-layer failure leaves the entry queued and the delivery
    /// pending until a later replay succeeds.
    ///
    /// # Errors
    /// Fails synchronously on an invalid verb (nothing is enqueued) or when
    /// the queue snapshot cannot be persisted.
    #[instrument(skip(self, request), fields(request_id = %request.request_id, resource = %request.resource))]
    pub async fn request_eventually(self: Arc<Self>, request: ApiRequest) -> Result<Delivery> {
        request.verb()?;

        let request_id = request.request_id.clone();
        let (sender, receiver) = oneshot::channel();
        self.completions.lock().insert(request_id.clone(), sender);

        if let Err(err) = self.queue.enqueue(QueuedRequest::new(request.clone())).await {
            self.completions.lock().remove(&request_id);
            return Err(err);
        }

        let executor = Arc::clone(&self);
        tokio::spawn(async move {
            executor.attempt_queued(request).await;
        });

        Ok(Delivery { request_id, receiver })
    }

    /// Replay every queued request, oldest first.
    ///
    /// Invoked at process start and on connectivity recovery. A successful
    /// entry is dequeued before the next attempt begins, bounding the
    /// duplicate-delivery window to the entry in flight at crash time. A
    /// failing entry keeps its position and replay moves on to the next
    /// entry. Concurrent replays are serialized.
    #[instrument(skip(self))]
    pub async fn replay_all(&self) {
        let _serialized = self.replay_lock.lock().await;

        let entries = self.queue.oldest_first().await;
        if entries.is_empty() {
            debug!("retry queue empty; nothing to replay");
            return;
        }

        info!(count = entries.len(), "replaying queued requests");
        for entry in entries {
            let request = entry.request;
            self.attempt_queued(request).await;
        }
    }

    /// One delivery attempt for a queued request.
    async fn attempt_queued(&self, request: ApiRequest) {
        let request_id = request.request_id.clone();

        let verb = match request.verb() {
            Ok(verb) => verb,
            Err(err) => {
                // A snapshot written by a different SDK version can carry a
                // verb this version does not support; drop just that entry.
                warn!(request_id = %request_id, method = %request.method,
                    "dropping queued request with unsupported verb");
                self.finish_queued(&request_id, Err(err)).await;
                return;
            }
        };

        if let Err(err) = self.queue.record_attempt(&request_id).await {
            warn!(request_id = %request_id, error = %err, "failed to persist attempt count");
        }

        match self.execute_with_auth(verb, &request).await {
            Ok(response) => {
                debug!(request_id = %request_id, "queued request delivered");
                self.finish_queued(&request_id, Ok(response)).await;
            }
            Err(err) if is_connectivity_error(&err) => {
                debug!(request_id = %request_id, error = %err,
                    "queued request hit a connectivity failure; staying queued");
            }
            Err(err) => {
                self.finish_queued(&request_id, Err(err)).await;
            }
        }
    }

    /// Dequeue an entry and complete its delivery channel, if one is still
    /// registered in this process.
    async fn finish_queued(&self, request_id: &str, outcome: Result<ApiResponse>) {
        if let Err(err) = self.queue.dequeue(request_id).await {
            warn!(request_id = %request_id, error = %err, "failed to dequeue delivered request");
        }
        if let Some(sender) = self.completions.lock().remove(request_id) {
            // The receiver may have been dropped by an uninterested caller.
            let _ = sender.send(outcome);
        }
    }

    /// The shared authenticated execution path.
    async fn execute_with_auth(&self, verb: HttpVerb, request: &ApiRequest) -> Result<ApiResponse> {
        let mut reauth_remaining = 1u8;

        loop {
            if self.config.access_token().is_none() {
                match self.tokens.fetch_anonymous_access_token_if_needed().await? {
                    FetchOutcome::FetchInProgress => {
                        return Err(ClientError::TokenAcquisition(
                            "an access-token fetch is already in flight; retry later".into(),
                        ));
                    }
                    FetchOutcome::TokenPresent | FetchOutcome::Fetched => {}
                }
            }

            let transport_request = TransportRequest {
                method: verb,
                url: format!("{}{}", self.config.base_url(), request.resource),
                params: request.params.clone(),
                access_token: self.config.access_token(),
            };

            let response: ApiResponse =
                self.transport.send(&transport_request).await.map_err(ClientError::from)?.into();

            if let Some(envelope) = response.application_error() {
                if envelope.is_auth_failure() {
                    if reauth_remaining > 0 {
                        reauth_remaining -= 1;
                        warn!(code = envelope.code,
                            "access token rejected; refreshing and retrying once");
                        self.config.clear_access_token()?;
                        continue;
                    }
                    return Err(ClientError::AuthRejected(envelope.message));
                }
                return Err(ClientError::Application {
                    code: envelope.code,
                    message: envelope.message,
                });
            }

            if response.status >= 500 {
                // Server failure without an envelope: a transport-class
                // outcome for queueing purposes.
                return Err(ClientError::Network(format!(
                    "server returned {} for {}",
                    response.status, request.resource
                )));
            }

            debug!(status = response.status, "request completed");
            return Ok(response);
        }
    }
}

/// Connectivity-rooted failures keep a queued request queued; everything
/// else is terminal for it.
fn is_connectivity_error(err: &ClientError) -> bool {
    matches!(err, ClientError::Network(_) | ClientError::TokenAcquisition(_))
}
