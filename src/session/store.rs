use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::kv::{
    ChangeOrigin, KvResult, KvStore, StorageChange, EMAIL_KEY, FIRST_NAME_KEY, LAST_NAME_KEY,
    SESSION_KEYS, TOKEN_KEY,
};

/// Keyring account under which the token is mirrored
const KEYRING_ACCOUNT: &str = "authToken";

/// Identity fields stored next to the token
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

/// Bearer token plus the identity it was issued for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub identity: Identity,
}

/// Observable session state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// Active credential, `None` when logged out
    pub credential: Option<Credential>,
    /// True until the slot store has been read once
    pub loading: bool,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        self.credential.is_some()
    }
}

/// Owns the authentication credential for one client instance.
///
/// Several stores may share one [`KvStore`] (and several processes one slot
/// file). A login or logout made through any of them is observed by all
/// others through the store's change channel; the last write wins.
pub struct SessionStore {
    id: Uuid,
    kv: KvStore,
    state: Arc<watch::Sender<SessionState>>,
    listener: JoinHandle<()>,
    keyring_service: Option<String>,
}

impl SessionStore {
    /// Open a session over `kv`. Must be called inside a tokio runtime.
    pub fn open(kv: KvStore) -> Self {
        Self::build(kv, None)
    }

    /// Open a session that also mirrors the token into the OS keyring.
    ///
    /// The slot file stays authoritative; the keyring is only consulted when
    /// the slot file holds no token at startup.
    pub fn open_with_keyring(kv: KvStore, service: &str) -> Self {
        Self::build(kv, Some(service.to_string()))
    }

    fn build(kv: KvStore, keyring_service: Option<String>) -> Self {
        let id = Uuid::new_v4();
        let (tx, _) = watch::channel(SessionState {
            credential: None,
            loading: true,
        });
        let state = Arc::new(tx);

        // Subscribe before the initial read so no change slips between them
        let changes = kv.subscribe();
        let listener = tokio::spawn(listen_for_changes(
            id,
            kv.clone(),
            Arc::clone(&state),
            changes,
        ));

        let mut credential = read_credential(&kv);
        if credential.is_none() {
            if let Some(service) = &keyring_service {
                credential = read_keyring_token(service).map(|token| Credential {
                    token,
                    identity: read_identity(&kv),
                });
            }
        }

        log::debug!(
            "session {}: initial read, authenticated={}",
            id,
            credential.is_some()
        );

        state.send_modify(|s| {
            s.credential = credential;
            s.loading = false;
        });

        Self {
            id,
            kv,
            state,
            listener,
            keyring_service,
        }
    }

    /// Persist the credential and mark this session authenticated
    pub fn login(&self, token: &str, identity: Identity) -> KvResult<()> {
        self.kv.apply(
            self.id,
            &[
                (TOKEN_KEY, Some(token)),
                (FIRST_NAME_KEY, Some(identity.first_name.as_str())),
                (LAST_NAME_KEY, Some(identity.last_name.as_str())),
                (EMAIL_KEY, Some(identity.email.as_str())),
            ],
        )?;

        if let Some(service) = &self.keyring_service {
            if let Ok(entry) = keyring::Entry::new(service, KEYRING_ACCOUNT) {
                let _ = entry.set_password(token);
            }
        }

        log::info!("session {}: logged in as {}", self.id, identity.email);

        self.state.send_modify(|s| {
            s.credential = Some(Credential {
                token: token.to_string(),
                identity,
            });
        });

        Ok(())
    }

    /// Clear the persisted credential. Safe to call when already logged out.
    pub fn logout(&self) -> KvResult<()> {
        self.kv.clear_keys(self.id, &SESSION_KEYS)?;

        if let Some(service) = &self.keyring_service {
            if let Ok(entry) = keyring::Entry::new(service, KEYRING_ACCOUNT) {
                let _ = entry.delete_credential();
            }
        }

        let was_authenticated = self.state.send_if_modified(|s| s.credential.take().is_some());
        if was_authenticated {
            log::info!("session {}: logged out", self.id);
        }

        Ok(())
    }

    /// Active credential, if any
    pub fn current_credential(&self) -> Option<Credential> {
        self.state.borrow().credential.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    /// Identity of the logged-in user
    pub fn identity(&self) -> Option<Identity> {
        self.state
            .borrow()
            .credential
            .as_ref()
            .map(|c| c.identity.clone())
    }

    /// True while the initial read of the slot store is pending
    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    /// Snapshot of the current state
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Receive every subsequent state change
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// The underlying slot store
    pub fn kv(&self) -> &KvStore {
        &self.kv
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// Re-read the slots whenever another writer touched them
async fn listen_for_changes(
    id: Uuid,
    kv: KvStore,
    state: Arc<watch::Sender<SessionState>>,
    mut changes: broadcast::Receiver<StorageChange>,
) {
    loop {
        match changes.recv().await {
            Ok(change) => {
                if change.origin == ChangeOrigin::Local(id) {
                    continue;
                }
                if !SESSION_KEYS.iter().any(|key| change.touches(key)) {
                    continue;
                }
                sync_from_storage(id, &kv, &state);
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                log::warn!("session {}: missed {} storage events, re-reading", id, skipped);
                sync_from_storage(id, &kv, &state);
            }
            Err(broadcast::error::RecvError::Closed) => {
                log::debug!("session {}: storage channel closed", id);
                return;
            }
        }
    }
}

fn sync_from_storage(id: Uuid, kv: &KvStore, state: &watch::Sender<SessionState>) {
    let credential = read_credential(kv);
    let changed = state.send_if_modified(|s| {
        if s.credential == credential {
            return false;
        }
        s.credential = credential.clone();
        true
    });
    if changed {
        log::info!(
            "session {}: storage changed elsewhere, authenticated={}",
            id,
            credential.is_some()
        );
    }
}

fn read_credential(kv: &KvStore) -> Option<Credential> {
    let token = kv.get(TOKEN_KEY).filter(|t| !t.is_empty())?;
    Some(Credential {
        token,
        identity: read_identity(kv),
    })
}

fn read_identity(kv: &KvStore) -> Identity {
    Identity {
        first_name: kv.get(FIRST_NAME_KEY).unwrap_or_default(),
        last_name: kv.get(LAST_NAME_KEY).unwrap_or_default(),
        email: kv.get(EMAIL_KEY).unwrap_or_default(),
    }
}

fn read_keyring_token(service: &str) -> Option<String> {
    let entry = keyring::Entry::new(service, KEYRING_ACCOUNT).ok()?;
    entry.get_password().ok().filter(|t| !t.is_empty())
}
