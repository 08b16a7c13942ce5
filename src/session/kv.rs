//! Durable key/value slots shared by every session using a data directory.
//!
//! The slot file plays the role a browser profile's local storage plays for
//! tabs: every [`KvStore`] handle opened on the same file sees the same
//! values, and every mutation is announced on a broadcast channel so other
//! sessions can re-read their slots.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Slot holding the bearer token
pub const TOKEN_KEY: &str = "authToken";
/// Slot holding the user's first name
pub const FIRST_NAME_KEY: &str = "firstName";
/// Slot holding the user's last name
pub const LAST_NAME_KEY: &str = "lastName";
/// Slot holding the user's email
pub const EMAIL_KEY: &str = "email";

/// Every slot owned by the session layer
pub const SESSION_KEYS: [&str; 4] = [TOKEN_KEY, FIRST_NAME_KEY, LAST_NAME_KEY, EMAIL_KEY];

/// Buffered change events per subscriber before it starts lagging
const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Error, Debug)]
pub enum KvError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Slot store lock poisoned")]
    Poisoned,
}

impl From<KvError> for String {
    fn from(err: KvError) -> Self {
        err.to_string()
    }
}

pub type KvResult<T> = Result<T, KvError>;

/// Who produced a storage change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// A writer in this process, identified by its writer id
    Local(Uuid),
    /// Another process rewrote the slot file
    External,
}

/// Notification published after the slots changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    /// The slot that changed, `None` when the whole file was replaced
    pub key: Option<String>,
    pub origin: ChangeOrigin,
}

impl StorageChange {
    /// Whether this change may have touched `key`
    pub fn touches(&self, key: &str) -> bool {
        self.key.as_deref().map_or(true, |k| k == key)
    }
}

/// On-disk layout of the slot file
#[derive(Debug, Default, Serialize, Deserialize)]
struct SlotFile {
    #[serde(default)]
    slots: BTreeMap<String, String>,
}

struct KvInner {
    path: PathBuf,
    slots: RwLock<BTreeMap<String, String>>,
    changes: broadcast::Sender<StorageChange>,
}

/// Handle to a file-backed slot store. Cloning shares the same slots and
/// change channel.
#[derive(Clone)]
pub struct KvStore {
    inner: Arc<KvInner>,
}

impl KvStore {
    /// Open the slot file at `path`, creating its directory if needed.
    /// A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> KvResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let slots = read_slot_file(&path)?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        log::debug!("kv: opened {} with {} slots", path.display(), slots.len());

        Ok(Self {
            inner: Arc::new(KvInner {
                path,
                slots: RwLock::new(slots),
                changes,
            }),
        })
    }

    /// Path of the backing slot file
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Read a slot
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner
            .slots
            .read()
            .ok()
            .and_then(|slots| slots.get(key).cloned())
    }

    /// Write a single slot and announce it
    pub fn set(&self, origin: Uuid, key: &str, value: &str) -> KvResult<()> {
        self.apply(origin, &[(key, Some(value))])
    }

    /// Remove a single slot and announce it
    pub fn remove(&self, origin: Uuid, key: &str) -> KvResult<()> {
        self.apply(origin, &[(key, None)])
    }

    /// Remove several slots in one file write
    pub fn clear_keys(&self, origin: Uuid, keys: &[&str]) -> KvResult<()> {
        let removals: Vec<(&str, Option<&str>)> = keys.iter().map(|k| (*k, None)).collect();
        self.apply(origin, &removals)
    }

    /// Apply several slot updates in one file write. `None` removes the slot.
    ///
    /// One change event is published per slot whose value actually changed.
    pub fn apply(&self, origin: Uuid, updates: &[(&str, Option<&str>)]) -> KvResult<()> {
        let changed = {
            let mut slots = self.inner.slots.write().map_err(|_| KvError::Poisoned)?;
            let mut next = slots.clone();
            let mut changed = Vec::new();

            for (key, value) in updates {
                let previous = match value {
                    Some(value) => next.insert((*key).to_string(), (*value).to_string()),
                    None => next.remove(*key),
                };
                if previous.as_deref() != *value {
                    changed.push((*key).to_string());
                }
            }

            if changed.is_empty() {
                return Ok(());
            }

            // Memory only follows a successful write
            write_slot_file(&self.inner.path, &next)?;
            *slots = next;
            changed
        };

        for key in changed {
            self.publish(StorageChange {
                key: Some(key),
                origin: ChangeOrigin::Local(origin),
            });
        }

        Ok(())
    }

    /// Re-read the slot file from disk. Returns `true` and announces an
    /// external change when the contents differ from what this handle held.
    pub fn reload(&self) -> KvResult<bool> {
        let fresh = read_slot_file(&self.inner.path)?;

        {
            let mut slots = self.inner.slots.write().map_err(|_| KvError::Poisoned)?;
            if *slots == fresh {
                return Ok(false);
            }
            *slots = fresh;
        }

        log::debug!("kv: {} changed on disk", self.inner.path.display());
        self.publish(StorageChange {
            key: None,
            origin: ChangeOrigin::External,
        });

        Ok(true)
    }

    /// Subscribe to change notifications. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.inner.changes.subscribe()
    }

    fn publish(&self, change: StorageChange) {
        // No receivers is fine: nobody is listening yet
        let _ = self.inner.changes.send(change);
    }
}

fn read_slot_file(path: &Path) -> KvResult<BTreeMap<String, String>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }

    let data = fs::read_to_string(path)?;
    if data.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    let file: SlotFile = serde_json::from_str(&data)?;
    Ok(file.slots)
}

/// Write through a temp file and rename so readers in other processes never
/// see a half-written file
fn write_slot_file(path: &Path, slots: &BTreeMap<String, String>) -> KvResult<()> {
    let file = SlotFile {
        slots: slots.clone(),
    };
    let data = serde_json::to_string_pretty(&file)?;

    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, data)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600));
    }
    fs::rename(&tmp_path, path)?;

    Ok(())
}
