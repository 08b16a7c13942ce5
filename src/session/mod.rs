//! Session management
//!
//! This module provides:
//! - A file-backed slot store shared by every client instance on a machine
//! - A poll watcher that picks up writes made by other processes
//! - The session store owning the authentication credential
//! - Login and registration flows against the document store

pub mod auth;
pub mod kv;
pub mod store;
pub mod watcher;

pub use auth::{AuthError, AuthResult, RegisterRequest, MIN_PASSWORD_LEN};
pub use kv::{
    ChangeOrigin, KvError, KvResult, KvStore, StorageChange, EMAIL_KEY, FIRST_NAME_KEY,
    LAST_NAME_KEY, SESSION_KEYS, TOKEN_KEY,
};
pub use store::{Credential, Identity, SessionState, SessionStore};
pub use watcher::StorageWatcher;
