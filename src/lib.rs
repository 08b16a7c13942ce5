use std::sync::Arc;

use thiserror::Error;

pub mod catalog;
pub mod config;
pub mod format;
pub mod remote;
pub mod session;
pub mod transfer;

#[cfg(test)]
mod test_support;

use catalog::CatalogStore;
use config::{ClientConfig, ConfigError};
use remote::{DocumentStoreClient, RemoteError};
use session::{KvError, KvStore, SessionStore, StorageWatcher};
use transfer::Downloader;

/// Keyring service name used when the token mirror is enabled
pub const KEYRING_SERVICE: &str = "moneymate";

#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Storage(#[from] KvError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("Failed to watch session storage: {0}")]
    Watch(#[from] notify::Error),
}

/// Everything a front end needs, wired from one [`ClientConfig`]
pub struct ClientContext {
    pub config: ClientConfig,
    pub client: DocumentStoreClient,
    pub session: Arc<SessionStore>,
    pub catalog: CatalogStore,
    pub downloader: Downloader,
}

impl ClientContext {
    /// Open the session and build the stores. Must be called inside a
    /// tokio runtime.
    pub fn open(config: ClientConfig) -> Result<Self, ContextError> {
        let client = DocumentStoreClient::new(&config.api_base_url)?;

        let kv = KvStore::open(config.session_file()?)?;
        let session = if config.use_keyring {
            SessionStore::open_with_keyring(kv, KEYRING_SERVICE)
        } else {
            SessionStore::open(kv)
        };
        let session = Arc::new(session);

        let catalog = CatalogStore::new(client.clone(), Arc::clone(&session))
            .with_logout_delay(config.logout_delay());
        let downloader = Downloader::new(client.clone(), config.download_dir()?);

        Ok(Self {
            config,
            client,
            session,
            catalog,
            downloader,
        })
    }

    /// Follow logins and logouts made by other processes sharing the data
    /// directory. Keep the returned watcher alive for as long as needed.
    pub fn watch_storage(&self) -> Result<StorageWatcher, ContextError> {
        Ok(StorageWatcher::start(self.session.kv().clone())?)
    }
}
