//! Process-wide configuration store
//!
//! Holds the client credentials plus the mutable installation state: the
//! access-token pair, session id, player id, and device token. The store is
//! explicitly constructed and injected into dependents rather than looked up
//! ambiently, which keeps every component independently testable.
//!
//! Every mutation is written through to the storage port before the lock is
//! released, so a cold start recovers the last known token, session, and
//! player identity without re-authenticating unless the server later rejects
//! the token.

use std::sync::Arc;

use parking_lot::RwLock;
use scorelink_domain::constants::{PRODUCTION_BASE_URL, SANDBOX_BASE_URL};
use scorelink_domain::{ClientError, Result};
use tracing::debug;

use crate::storage::KeyValueStorage;

const KEY_ACCESS_TOKEN: &str = "scorelink.access_token";
const KEY_TOKEN_IS_ANONYMOUS: &str = "scorelink.access_token_is_anonymous";
const KEY_SID: &str = "scorelink.sid";
const KEY_PLAYER_ID: &str = "scorelink.player_id";
const KEY_DEVICE_TOKEN: &str = "scorelink.device_token";

/// Immutable credentials identifying this client installation.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub base_url: String,
    pub sandbox: bool,
}

impl ClientCredentials {
    /// Credentials against the production API.
    #[must_use]
    pub fn production(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            base_url: PRODUCTION_BASE_URL.to_string(),
            sandbox: false,
        }
    }

    /// Credentials against the sandbox API.
    #[must_use]
    pub fn sandbox(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            base_url: SANDBOX_BASE_URL.to_string(),
            sandbox: true,
        }
    }

    /// Override the API root, e.g. to point at a test double.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Debug, Default)]
struct InstallationState {
    access_token: Option<String>,
    access_token_is_anonymous: bool,
    sid: Option<String>,
    player_id: Option<String>,
    device_token: Option<String>,
}

/// Shared configuration state, persisted across restarts.
pub struct ConfigStore {
    credentials: ClientCredentials,
    state: RwLock<InstallationState>,
    storage: Arc<dyn KeyValueStorage>,
}

impl ConfigStore {
    /// Build the store, loading previously persisted installation state.
    ///
    /// # Errors
    /// Returns [`ClientError::Config`] for empty credentials and
    /// [`ClientError::Storage`] when the backing store cannot be read.
    pub fn new(
        credentials: ClientCredentials,
        storage: Arc<dyn KeyValueStorage>,
    ) -> Result<Self> {
        if credentials.client_id.is_empty() || credentials.client_secret.is_empty() {
            return Err(ClientError::Config("client id and secret must not be empty".into()));
        }

        let state = InstallationState {
            access_token: storage.get(KEY_ACCESS_TOKEN).map_err(ClientError::from)?,
            access_token_is_anonymous: storage
                .get(KEY_TOKEN_IS_ANONYMOUS)
                .map_err(ClientError::from)?
                .map(|raw| raw == "true")
                .unwrap_or(true),
            sid: storage.get(KEY_SID).map_err(ClientError::from)?,
            player_id: storage.get(KEY_PLAYER_ID).map_err(ClientError::from)?,
            device_token: storage.get(KEY_DEVICE_TOKEN).map_err(ClientError::from)?,
        };

        if state.access_token.is_some() {
            debug!("restored persisted access token");
        }

        Ok(Self { credentials, state: RwLock::new(state), storage })
    }

    pub fn client_id(&self) -> &str {
        &self.credentials.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.credentials.client_secret
    }

    pub fn base_url(&self) -> &str {
        &self.credentials.base_url
    }

    pub fn uses_sandbox(&self) -> bool {
        self.credentials.sandbox
    }

    /// Current access token, if one is stored.
    pub fn access_token(&self) -> Option<String> {
        self.state.read().access_token.clone()
    }

    /// The token pair as one atomic snapshot: readers observe either the
    /// previous pair or the new one, never a token with a stale flag.
    pub fn access_token_pair(&self) -> Option<(String, bool)> {
        let state = self.state.read();
        state.access_token.clone().map(|token| (token, state.access_token_is_anonymous))
    }

    /// Sole mutator of the token pair.
    ///
    /// Both fields are updated and persisted while the write lock is held,
    /// which is what makes [`access_token_pair`](Self::access_token_pair)
    /// atomic with respect to this call.
    pub fn set_access_token(&self, token: Option<&str>, anonymous: bool) -> Result<()> {
        let mut state = self.state.write();
        state.access_token = token.map(str::to_string);
        state.access_token_is_anonymous = anonymous;

        match token {
            Some(token) => self.storage.set(KEY_ACCESS_TOKEN, token)?,
            None => self.storage.remove(KEY_ACCESS_TOKEN)?,
        }
        self.storage
            .set(KEY_TOKEN_IS_ANONYMOUS, if anonymous { "true" } else { "false" })?;
        Ok(())
    }

    /// Drop the stored token pair, e.g. after the server rejected it.
    pub fn clear_access_token(&self) -> Result<()> {
        debug!("clearing stored access token");
        self.set_access_token(None, true)
    }

    pub fn sid(&self) -> Option<String> {
        self.state.read().sid.clone()
    }

    pub fn set_sid(&self, sid: &str) -> Result<()> {
        let mut state = self.state.write();
        state.sid = Some(sid.to_string());
        self.storage.set(KEY_SID, sid)?;
        Ok(())
    }

    pub fn player_id(&self) -> Option<String> {
        self.state.read().player_id.clone()
    }

    pub fn set_player_id(&self, player_id: &str) -> Result<()> {
        let mut state = self.state.write();
        state.player_id = Some(player_id.to_string());
        self.storage.set(KEY_PLAYER_ID, player_id)?;
        Ok(())
    }

    pub fn device_token(&self) -> Option<String> {
        self.state.read().device_token.clone()
    }

    /// Store the push-notification device token for this installation.
    pub fn set_device_token(&self, device_token: &str) -> Result<()> {
        let mut state = self.state.write();
        state.device_token = Some(device_token.to_string());
        self.storage.set(KEY_DEVICE_TOKEN, device_token)?;
        Ok(())
    }
}
