//! Client configuration

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding the store URL
pub const API_URL_ENV: &str = "MONEYMATE_API_URL";

const APP_DIR: &str = "moneymate";
const CONFIG_FILE: &str = "config.toml";
const SESSION_FILE: &str = "session.json";
const DEFAULT_API_URL: &str = "http://localhost:8080/api/v1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to write config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Could not determine the {0} directory")]
    DirNotFound(&'static str),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the document store, e.g. `http://localhost:8080/api/v1`
    pub api_base_url: String,
    /// Where the session slot file lives. Defaults to the platform data dir.
    pub data_dir: Option<PathBuf>,
    /// Where downloads are saved. Defaults to the platform download dir.
    pub download_dir: Option<PathBuf>,
    /// Delay before a forced logout after the store rejected the token
    pub logout_delay_ms: u64,
    /// Mirror the token into the OS keyring
    pub use_keyring: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            data_dir: None,
            download_dir: None,
            logout_delay_ms: 1000,
            use_keyring: false,
        }
    }
}

impl ClientConfig {
    /// Load from `path`, or from the default location when `None`.
    /// A missing file yields the defaults. The environment override is
    /// applied last.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };

        let config = if path.exists() {
            let content = fs::read_to_string(&path)?;
            let config: Self = toml::from_str(&content)?;
            log::debug!("config: loaded {}", path.display());
            config
        } else {
            Self::default()
        };

        Ok(config.with_api_url_override(std::env::var(API_URL_ENV).ok()))
    }

    /// `<config dir>/moneymate/config.toml`
    pub fn default_path() -> ConfigResult<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join(APP_DIR).join(CONFIG_FILE))
            .ok_or(ConfigError::DirNotFound("config"))
    }

    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn with_api_url_override(mut self, url: Option<String>) -> Self {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        self
    }

    pub fn data_dir(&self) -> ConfigResult<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_local_dir()
                .map(|p| p.join(APP_DIR))
                .ok_or(ConfigError::DirNotFound("data")),
        }
    }

    /// The session slot file shared by every client using this data dir
    pub fn session_file(&self) -> ConfigResult<PathBuf> {
        Ok(self.data_dir()?.join(SESSION_FILE))
    }

    pub fn download_dir(&self) -> ConfigResult<PathBuf> {
        match &self.download_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::download_dir()
                .or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
                .ok_or(ConfigError::DirNotFound("download")),
        }
    }

    pub fn logout_delay(&self) -> Duration {
        Duration::from_millis(self.logout_delay_ms)
    }
}
