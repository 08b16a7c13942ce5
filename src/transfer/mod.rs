//! File transfers between the client and the document store
//!
//! This module provides:
//! - Upload driving with a cosmetic progress estimate
//! - Download through an ordered list of fallback strategies
//! - An observable job state shared with the caller

pub mod download;
pub mod progress;
pub mod upload;

use thiserror::Error;

pub use download::{
    filename_from_content_disposition, forced_download_url, sanitize_file_name, DownloadStrategy,
    Downloader, SavedFile, DEFAULT_STRATEGIES,
};
pub use progress::{
    ProgressEstimator, TransferJob, TransferPhase, TransferTracker, PROGRESS_CAP, PROGRESS_STEP,
    PROGRESS_TICK,
};
pub use upload::run_upload;

#[derive(Debug, Error)]
pub enum TransferError {
    /// Every download strategy failed
    #[error("Could not download '{title}' ({})", attempts.join("; "))]
    TransferFailure { title: String, attempts: Vec<String> },

    #[error("Failed to save file: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TransferError> for String {
    fn from(err: TransferError) -> Self {
        err.to_string()
    }
}

pub type TransferResult<T> = Result<T, TransferError>;
