//! Catalog error types

use thiserror::Error;

use crate::remote::RemoteError;
use crate::session::KvError;

/// Errors surfaced by catalog operations
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No credential was available when the call was made
    #[error("Authentication token is missing. Please log in.")]
    AuthRequired,

    /// The document store rejected the credential (401/403)
    #[error("Not authorized or session expired. Please log in again.")]
    Unauthorized,

    /// A required field is missing; nothing was sent
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    /// Network failure or non-auth HTTP error. The caller may retry.
    #[error("Failed to reach the document store: {0}")]
    TransientFetch(String),

    #[error("Session storage error: {0}")]
    Storage(#[from] KvError),
}

impl CatalogError {
    /// Whether this error ends the session
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthRequired | Self::Unauthorized)
    }
}

impl From<RemoteError> for CatalogError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Unauthorized(_) => Self::Unauthorized,
            RemoteError::NotFound(resource) => Self::NotFound(resource),
            other => Self::TransientFetch(other.to_string()),
        }
    }
}

impl From<CatalogError> for String {
    fn from(err: CatalogError) -> Self {
        err.to_string()
    }
}

/// Result type alias for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;
