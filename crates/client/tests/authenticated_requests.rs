//! End-to-end tests for the authenticated request path: token acquisition,
//! token reuse across restarts, and the bounded re-authentication loop.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use scorelink_client::{
    ApiRequest, ClientCredentials, ClientError, HttpTransport, KeyValueStorage, MemoryStorage,
    ScorelinkClient, TransportError, TransportRequest, TransportResponse,
};
use serde_json::json;

const BASE_URL: &str = "https://api.test/v1";
const TOKEN_RESOURCE: &str = "/oauth/anonymousAccessToken";

/// Transport double recording every call together with the token that was
/// attached to it. Tokens listed in `rejected` get an auth-failure envelope.
#[derive(Default)]
struct RecordingTransport {
    log: Mutex<Vec<(String, Option<String>)>>,
    rejected: Mutex<Vec<String>>,
    grants: AtomicUsize,
}

impl RecordingTransport {
    fn reject_token(&self, token: &str) {
        self.rejected.lock().push(token.to_string());
    }

    fn resource_calls(&self) -> Vec<(String, Option<String>)> {
        self.log
            .lock()
            .iter()
            .filter(|(resource, _)| resource != TOKEN_RESOURCE)
            .cloned()
            .collect()
    }

    fn token_calls(&self) -> usize {
        self.log.lock().iter().filter(|(resource, _)| resource == TOKEN_RESOURCE).count()
    }
}

#[async_trait]
impl HttpTransport for RecordingTransport {
    async fn send(
        &self,
        request: &TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        let resource =
            request.url.strip_prefix(BASE_URL).unwrap_or(request.url.as_str()).to_string();
        self.log.lock().push((resource.clone(), request.access_token.clone()));

        if resource == TOKEN_RESOURCE {
            let serial = self.grants.fetch_add(1, Ordering::SeqCst) + 1;
            return Ok(TransportResponse {
                status: 200,
                body: json!({
                    "accessToken": { "token": format!("granted-{serial}") },
                    "sid": "sid-1",
                    "me": { "id": "player-1" }
                }),
            });
        }

        let rejected = request
            .access_token
            .as_ref()
            .map(|token| self.rejected.lock().contains(token))
            .unwrap_or(false);
        if rejected {
            return Ok(TransportResponse {
                status: 401,
                body: json!({ "error": { "code": 11_003, "message": "invalid access token" } }),
            });
        }

        Ok(TransportResponse { status: 200, body: json!({ "status": "ok" }) })
    }
}

fn build_client(
    transport: Arc<RecordingTransport>,
    storage: Arc<dyn KeyValueStorage>,
) -> ScorelinkClient {
    ScorelinkClient::builder()
        .credentials(ClientCredentials::sandbox("client-id", "client-secret").with_base_url(BASE_URL))
        .transport(transport)
        .storage(storage)
        .build()
        .unwrap()
}

#[tokio::test]
async fn first_call_acquires_a_token_and_attaches_it() {
    let transport = Arc::new(RecordingTransport::default());
    let client = build_client(Arc::clone(&transport), Arc::new(MemoryStorage::new()));

    let response = client.get("/players/me", BTreeMap::new()).await.unwrap();
    assert_eq!(response.status, 200);

    assert_eq!(transport.token_calls(), 1);
    let calls = transport.resource_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "/players/me");
    assert_eq!(calls[0].1.as_deref(), Some("granted-1"));

    // The grant also carried identity.
    assert_eq!(client.config().sid().as_deref(), Some("sid-1"));
    assert_eq!(client.config().player_id().as_deref(), Some("player-1"));
}

#[tokio::test]
async fn persisted_token_is_reused_after_a_restart() {
    let transport = Arc::new(RecordingTransport::default());
    let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());

    let client = build_client(Arc::clone(&transport), Arc::clone(&storage));
    client.get("/players/me", BTreeMap::new()).await.unwrap();
    drop(client);

    // Same storage, fresh client: no new token fetch needed.
    let revived = build_client(Arc::clone(&transport), storage);
    revived.get("/games/42", BTreeMap::new()).await.unwrap();

    assert_eq!(transport.token_calls(), 1);
    let calls = transport.resource_calls();
    assert_eq!(calls[1].1.as_deref(), Some("granted-1"));
}

#[tokio::test]
async fn rejected_token_is_refreshed_transparently() {
    let transport = Arc::new(RecordingTransport::default());
    let client = build_client(Arc::clone(&transport), Arc::new(MemoryStorage::new()));

    client.config().set_access_token(Some("stale"), false).unwrap();
    transport.reject_token("stale");

    let response = client.get("/scores", BTreeMap::new()).await.unwrap();
    assert_eq!(response.status, 200);

    let calls = transport.resource_calls();
    assert_eq!(calls.len(), 2, "one rejected call plus one retried call");
    assert_eq!(calls[0].1.as_deref(), Some("stale"));
    assert_eq!(calls[1].1.as_deref(), Some("granted-1"));

    // The pair was replaced atomically with the anonymous grant.
    assert_eq!(client.config().access_token_pair(), Some(("granted-1".to_string(), true)));
}

#[tokio::test]
async fn twice_rejected_call_surfaces_an_auth_error() {
    let transport = Arc::new(RecordingTransport::default());
    let client = build_client(Arc::clone(&transport), Arc::new(MemoryStorage::new()));

    client.config().set_access_token(Some("stale"), false).unwrap();
    transport.reject_token("stale");
    transport.reject_token("granted-1");

    let err = client.get("/scores", BTreeMap::new()).await.unwrap_err();
    assert!(matches!(err, ClientError::AuthRejected(_)));
    assert_eq!(transport.resource_calls().len(), 2, "the retry loop is bounded to one refresh");
}

#[tokio::test]
async fn invalid_verb_never_reaches_the_transport() {
    let transport = Arc::new(RecordingTransport::default());
    let client = build_client(Arc::clone(&transport), Arc::new(MemoryStorage::new()));

    let request = ApiRequest::new("PATCH", "/scores", BTreeMap::new());
    let err = client.request_authenticated(&request).await.unwrap_err();

    assert!(matches!(err, ClientError::InvalidVerb(raw) if raw == "PATCH"));
    assert!(transport.log.lock().is_empty());
    assert_eq!(client.pending_requests().await, 0);
}
