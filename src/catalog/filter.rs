//! Catalog filtering.
//!
//! The visible list is derived from the catalog snapshot and a
//! [`PredicateSet`] in four ordered stages: institution type, top banks,
//! document type, then free-text search. Predicates only change through
//! [`reduce`], which keeps the cross-predicate rules in one place.

use serde::{Deserialize, Serialize};

use super::models::{
    is_predefined_document_type, Document, InstitutionType, ALL_DOCUMENT_TYPES,
    OTHER_DOCUMENT_TYPE,
};

/// Institutions shown by the "top banks" shortcut
pub const TOP_BANKS: [&str; 5] = [
    "Ziraat Bankası",
    "İş Bankası",
    "Garanti BBVA",
    "Akbank",
    "Yapı Kredi",
];

/// Institution type predicate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum InstitutionFilter {
    #[default]
    All,
    Only(InstitutionType),
}

impl InstitutionFilter {
    fn matches(&self, document: &Document) -> bool {
        match self {
            Self::All => true,
            Self::Only(kind) => document.institution_type == *kind,
        }
    }
}

/// Document type predicate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum DocumentTypeFilter {
    #[default]
    All,
    /// Any type outside the predefined list. A type stored literally as
    /// the "other" label is not custom.
    Other,
    Exact(String),
}

impl DocumentTypeFilter {
    /// Parse a filter label as shown in the type selector
    pub fn from_label(label: &str) -> Self {
        match label {
            ALL_DOCUMENT_TYPES | "" => Self::All,
            OTHER_DOCUMENT_TYPE => Self::Other,
            other => Self::Exact(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::All => ALL_DOCUMENT_TYPES,
            Self::Other => OTHER_DOCUMENT_TYPE,
            Self::Exact(t) => t,
        }
    }

    fn matches(&self, document: &Document) -> bool {
        match self {
            Self::All => true,
            Self::Other => {
                !is_predefined_document_type(&document.document_type)
                    && document.document_type != OTHER_DOCUMENT_TYPE
            }
            Self::Exact(t) => document.document_type == *t,
        }
    }
}

/// The active filter predicates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredicateSet {
    pub institution_type: InstitutionFilter,
    pub top_banks_only: bool,
    pub document_type: DocumentTypeFilter,
    pub search_term: String,
}

impl PredicateSet {
    /// Whether any predicate narrows the list
    pub fn is_active(&self) -> bool {
        *self != Self::default()
    }
}

/// User intents that change the predicates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterAction {
    /// Pick an institution type; turns the top-banks shortcut off
    SetInstitutionType(InstitutionFilter),
    /// Show only the top banks; forces the type to bank
    ShowTopBanks,
    /// Pick a document type. Any concrete type clears the institution
    /// predicates; "all" leaves them as they are.
    SetDocumentType(DocumentTypeFilter),
    SetSearchTerm(String),
    Reset,
}

/// Apply one action to the predicates
pub fn reduce(predicates: &PredicateSet, action: FilterAction) -> PredicateSet {
    let mut next = predicates.clone();
    match action {
        FilterAction::SetInstitutionType(filter) => {
            next.institution_type = filter;
            next.top_banks_only = false;
        }
        FilterAction::ShowTopBanks => {
            next.top_banks_only = true;
            next.institution_type = InstitutionFilter::Only(InstitutionType::Bank);
        }
        FilterAction::SetDocumentType(filter) => {
            if filter != DocumentTypeFilter::All {
                next.institution_type = InstitutionFilter::All;
                next.top_banks_only = false;
            }
            next.document_type = filter;
        }
        FilterAction::SetSearchTerm(term) => {
            next.search_term = term;
        }
        FilterAction::Reset => {
            next = PredicateSet::default();
        }
    }
    next
}

/// Derive the visible list. Order of `documents` is preserved.
pub fn derive_view<'a>(documents: &'a [Document], predicates: &PredicateSet) -> Vec<&'a Document> {
    let needle = predicates.search_term.to_lowercase();

    documents
        .iter()
        .filter(|d| predicates.institution_type.matches(d))
        .filter(|d| !predicates.top_banks_only || TOP_BANKS.contains(&d.institution_name.as_str()))
        .filter(|d| predicates.document_type.matches(d))
        .filter(|d| needle.is_empty() || matches_search(d, &needle))
        .collect()
}

fn matches_search(document: &Document, needle: &str) -> bool {
    let description = document.description.as_deref().unwrap_or_default();
    [
        document.institution_name.as_str(),
        document.title.as_str(),
        description,
        document.document_type.as_str(),
    ]
    .iter()
    .any(|field| field.to_lowercase().contains(needle))
}
