//! Document catalog
//!
//! This module provides:
//! - Document models and form validation
//! - The catalog store mirroring the remote document list
//! - The filter reducer and derived view

pub mod errors;
pub mod filter;
pub mod models;
pub mod store;

pub use errors::{CatalogError, CatalogResult};
pub use filter::{
    derive_view, reduce, DocumentTypeFilter, FilterAction, InstitutionFilter, PredicateSet,
    TOP_BANKS,
};
pub use models::{
    is_predefined_document_type, Document, DocumentFields, InstitutionType, UploadFile,
    ValidatedFields, ALL_DOCUMENT_TYPES, MAX_UPLOAD_BYTES, OTHER_DOCUMENT_TYPE,
    PREDEFINED_DOCUMENT_TYPES,
};
pub use store::{CatalogSnapshot, CatalogStore, RefreshSignal, DEFAULT_LOGOUT_DELAY};
