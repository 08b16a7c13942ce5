use std::fmt;
use std::path::{Path, PathBuf};

use regex::Regex;
use reqwest::Url;
use serde::Serialize;

use super::progress::{TransferPhase, TransferTracker};
use super::{TransferError, TransferResult};
use crate::catalog::Document;
use crate::remote::{DocumentStoreClient, FetchedFile, RemoteError};
use crate::session::Credential;

/// One way of getting a file out of the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStrategy {
    /// GET with the bearer token
    AuthenticatedFetch,
    /// Unauthenticated GET of the file URL
    DirectLink,
    /// Unauthenticated GET with `download=1` appended
    ForcedDownload,
}

impl DownloadStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AuthenticatedFetch => "authenticated fetch",
            Self::DirectLink => "direct link",
            Self::ForcedDownload => "forced download",
        }
    }
}

impl fmt::Display for DownloadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Strategies tried in order until one succeeds
pub const DEFAULT_STRATEGIES: [DownloadStrategy; 3] = [
    DownloadStrategy::AuthenticatedFetch,
    DownloadStrategy::DirectLink,
    DownloadStrategy::ForcedDownload,
];

/// A file written to the download directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedFile {
    pub path: PathBuf,
    pub strategy: DownloadStrategy,
    pub size: u64,
}

/// Saves document files into a target directory
pub struct Downloader {
    client: DocumentStoreClient,
    target_dir: PathBuf,
    strategies: Vec<DownloadStrategy>,
}

impl Downloader {
    pub fn new(client: DocumentStoreClient, target_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            target_dir: target_dir.into(),
            strategies: DEFAULT_STRATEGIES.to_vec(),
        }
    }

    /// Replace the strategy list
    pub fn with_strategies(mut self, strategies: Vec<DownloadStrategy>) -> Self {
        self.strategies = strategies;
        self
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    /// Download `document`, degrading through the strategy list.
    ///
    /// The first strategy whose body is fetched and saved wins. Failures
    /// before that, local save errors included, are only logged; the caller
    /// hears about them once, when every strategy has failed.
    pub async fn download(
        &self,
        document: &Document,
        credential: Option<&Credential>,
        tracker: &TransferTracker,
    ) -> TransferResult<SavedFile> {
        tracker.begin(TransferPhase::Downloading);

        let mut attempts = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            match self.attempt(*strategy, document, credential).await {
                Ok(fetched) => {
                    tracker.set_progress(50);
                    let file_name = file_name_for(document, fetched.content_disposition.as_deref());
                    match self.save(&file_name, &fetched.bytes).await {
                        Ok(path) => {
                            tracker.succeed();
                            log::info!(
                                "download: saved '{}' to {} via {}",
                                document.title,
                                path.display(),
                                strategy
                            );
                            return Ok(SavedFile {
                                path,
                                strategy: *strategy,
                                size: fetched.bytes.len() as u64,
                            });
                        }
                        Err(e) => {
                            log::warn!(
                                "download: saving '{}' from {} failed: {}",
                                document.title,
                                strategy,
                                e
                            );
                            attempts.push(format!("{}: save failed: {}", strategy, e));
                        }
                    }
                }
                Err(e) => {
                    log::warn!("download: {} failed for '{}': {}", strategy, document.title, e);
                    attempts.push(format!("{}: {}", strategy, e));
                }
            }
        }

        let err = TransferError::TransferFailure {
            title: document.title.clone(),
            attempts,
        };
        log::error!("download: {}", err);
        tracker.fail(err.to_string());
        Err(err)
    }

    async fn attempt(
        &self,
        strategy: DownloadStrategy,
        document: &Document,
        credential: Option<&Credential>,
    ) -> Result<FetchedFile, RemoteError> {
        match strategy {
            DownloadStrategy::AuthenticatedFetch => {
                let Some(credential) = credential else {
                    return Err(RemoteError::Unauthorized(401));
                };
                self.client
                    .fetch_file(&document.file_url, Some(&credential.token))
                    .await
            }
            DownloadStrategy::DirectLink => self.client.fetch_file(&document.file_url, None).await,
            DownloadStrategy::ForcedDownload => {
                let url = forced_download_url(&document.file_url)?;
                self.client.fetch_file(&url, None).await
            }
        }
    }

    /// Write through a `.part` file so a failed write never leaves a
    /// truncated file under the final name
    async fn save(&self, file_name: &str, bytes: &[u8]) -> TransferResult<PathBuf> {
        tokio::fs::create_dir_all(&self.target_dir).await?;

        let path = self.target_dir.join(file_name);
        let partial = self.target_dir.join(format!("{}.part", file_name));

        tokio::fs::write(&partial, bytes).await?;
        if let Err(e) = tokio::fs::rename(&partial, &path).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }

        Ok(path)
    }
}

/// `url` with the forced-download marker appended
pub fn forced_download_url(url: &str) -> Result<String, RemoteError> {
    let mut url = Url::parse(url).map_err(|e| RemoteError::InvalidUrl(format!("{}: {}", url, e)))?;
    url.query_pairs_mut().append_pair("download", "1");
    Ok(url.to_string())
}

/// Extract the file name from a content-disposition header value
pub fn filename_from_content_disposition(header: &str) -> Option<String> {
    let quoted = Regex::new(r#"filename="(.+?)""#).ok()?;
    if let Some(caps) = quoted.captures(header) {
        return caps.get(1).map(|m| m.as_str().to_string());
    }

    let bare = Regex::new(r"filename=([^;\s]+)").ok()?;
    bare.captures(header)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// File name to save under: the server's choice, else `<title>.pdf`
fn file_name_for(document: &Document, content_disposition: Option<&str>) -> String {
    let name = content_disposition
        .and_then(filename_from_content_disposition)
        .map(|n| sanitize_file_name(&n))
        .filter(|n| !n.is_empty());

    name.unwrap_or_else(|| {
        let title = sanitize_file_name(&document.title);
        if title.is_empty() {
            format!("document-{}.pdf", document.id)
        } else {
            format!("{}.pdf", title)
        }
    })
}

/// Strip path separators and other characters that cannot appear in a
/// file name
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    cleaned.trim().trim_start_matches('.').trim().to_string()
}
