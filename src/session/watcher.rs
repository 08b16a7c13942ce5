//! Watches the slot file for writes made by other processes.
//!
//! In-process writers already announce their changes on the store's
//! broadcast channel. This watcher covers the remaining case: another
//! process sharing the data directory logs in or out. It polls the slot
//! file and, when the contents differ from what this process holds,
//! reloads the store, which publishes an external change event.

use std::ffi::OsString;
use std::time::Duration;

use notify::{Config, Event, EventKind, PollWatcher, RecursiveMode, Watcher};

use super::kv::KvStore;

/// How often the poll watcher checks the slot file.
const POLL_INTERVAL: Duration = Duration::from_millis(750);

/// Keeps the poll watcher alive. Dropping it stops watching.
pub struct StorageWatcher {
    _watcher: PollWatcher,
}

impl StorageWatcher {
    /// Start watching the store's backing file at the default interval
    pub fn start(store: KvStore) -> notify::Result<Self> {
        Self::start_with_interval(store, POLL_INTERVAL)
    }

    /// Start watching with a custom poll interval
    pub fn start_with_interval(store: KvStore, interval: Duration) -> notify::Result<Self> {
        let slot_path = store.path().to_path_buf();
        let file_name: OsString = slot_path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        let watch_dir = slot_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| std::path::PathBuf::from("."));

        let handler_store = store.clone();
        let handler = move |result: notify::Result<Event>| match result {
            Ok(event) => {
                if !is_relevant(&event.kind) {
                    return;
                }
                let touches_slots = event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == Some(file_name.as_os_str()));
                if !touches_slots {
                    return;
                }
                match handler_store.reload() {
                    Ok(true) => log::info!(
                        "watcher: {} changed by another process",
                        handler_store.path().display()
                    ),
                    Ok(false) => {}
                    Err(e) => log::warn!(
                        "watcher: failed to reload {}: {}",
                        handler_store.path().display(),
                        e
                    ),
                }
            }
            Err(e) => log::warn!("watcher: watch error: {}", e),
        };

        let mut watcher = PollWatcher::new(handler, Config::default().with_poll_interval(interval))?;
        watcher.watch(&watch_dir, RecursiveMode::NonRecursive)?;

        log::info!(
            "watcher: watching {} every {:?}",
            slot_path.display(),
            interval
        );

        Ok(Self { _watcher: watcher })
    }
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::kv::{ChangeOrigin, TOKEN_KEY};
    use tempfile::TempDir;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_foreign_process_write_is_published() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("session.json");

        // Two handles on the same file stand in for two processes
        let ours = KvStore::open(&path).unwrap();
        let theirs = KvStore::open(&path).unwrap();

        let mut rx = ours.subscribe();
        let _watcher =
            StorageWatcher::start_with_interval(ours.clone(), Duration::from_millis(50)).unwrap();

        theirs.set(Uuid::new_v4(), TOKEN_KEY, "remote-login").unwrap();

        let change = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no change observed")
            .unwrap();
        assert_eq!(change.origin, ChangeOrigin::External);
        assert_eq!(ours.get(TOKEN_KEY).as_deref(), Some("remote-login"));
    }
}
