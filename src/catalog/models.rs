use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use super::errors::{CatalogError, CatalogResult};

/// Document type filter sentinel meaning "every type"
pub const ALL_DOCUMENT_TYPES: &str = "Tümü";

/// Document type sentinel meaning "a custom type outside the predefined list"
pub const OTHER_DOCUMENT_TYPE: &str = "Diğer";

/// Document types offered by default. Anything else is a custom type.
pub const PREDEFINED_DOCUMENT_TYPES: [&str; 5] = [
    "KVKK",
    "Hizmet Sözleşmesi",
    "Tarife",
    "Kullanım Şartları",
    "Bilgilendirme Formu",
];

/// Largest file the document store accepts
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Whether `document_type` is one of the predefined types
pub fn is_predefined_document_type(document_type: &str) -> bool {
    PREDEFINED_DOCUMENT_TYPES.contains(&document_type)
}

/// Kind of institution that issued a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstitutionType {
    Bank,
    ElectronicMoney,
}

impl InstitutionType {
    /// Wire value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bank => "bank",
            Self::ElectronicMoney => "electronic_money",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Bank => "Banka",
            Self::ElectronicMoney => "Elektronik Para",
        }
    }
}

impl Default for InstitutionType {
    fn default() -> Self {
        Self::Bank
    }
}

impl fmt::Display for InstitutionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstitutionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bank" => Ok(Self::Bank),
            "electronic_money" | "electronic-money" => Ok(Self::ElectronicMoney),
            other => Err(format!("unknown institution type: {}", other)),
        }
    }
}

/// A document as held by the remote store. The server assigns ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub institution_name: String,
    pub institution_type: InstitutionType,
    pub document_type: String,
    pub title: String,
    #[serde(
        default,
        alias = "documentDescription",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<String>,
    /// Last update timestamp as sent by the server
    #[serde(default, alias = "updateAt")]
    pub updated_at: String,
    pub file_url: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub file_size: String,
}

impl Document {
    /// Whether this document carries a custom (non-predefined) type
    pub fn has_custom_type(&self) -> bool {
        !is_predefined_document_type(&self.document_type)
    }
}

/// The server issues numeric ids while older endpoints send strings;
/// both are held as strings.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Integer(i64),
        Float(f64),
        Null,
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Integer(n) => n.to_string(),
        Raw::Float(n) => n.to_string(),
        Raw::Null => String::new(),
    })
}

/// Form input for creating or editing a document.
///
/// Mirrors the add/edit form: a selected institution or a new custom one,
/// and a predefined document type or [`OTHER_DOCUMENT_TYPE`] with a custom
/// type alongside.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentFields {
    pub institution_name: String,
    /// Set when the user chose to enter a new institution
    pub custom_institution_name: Option<String>,
    pub institution_type: InstitutionType,
    pub document_type: String,
    /// Used when `document_type` is [`OTHER_DOCUMENT_TYPE`]
    pub custom_document_type: String,
    pub title: String,
    pub description: String,
}

/// Fields after resolving custom entries and passing validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedFields {
    pub institution_name: String,
    pub institution_type: InstitutionType,
    pub document_type: String,
    pub title: String,
    pub description: String,
}

impl DocumentFields {
    /// Pre-fill an edit form from an existing document. A custom type is
    /// shown as "other" with the type in the custom slot.
    pub fn from_document(document: &Document) -> Self {
        let (document_type, custom_document_type) = if document.has_custom_type() {
            (OTHER_DOCUMENT_TYPE.to_string(), document.document_type.clone())
        } else {
            (document.document_type.clone(), String::new())
        };

        Self {
            institution_name: document.institution_name.clone(),
            custom_institution_name: None,
            institution_type: document.institution_type,
            document_type,
            custom_document_type,
            title: document.title.clone(),
            description: document.description.clone().unwrap_or_default(),
        }
    }

    /// The institution name that will be submitted
    pub fn resolved_institution_name(&self) -> &str {
        self.custom_institution_name
            .as_deref()
            .unwrap_or(&self.institution_name)
    }

    /// The document type that will be submitted
    pub fn resolved_document_type(&self) -> &str {
        if self.document_type == OTHER_DOCUMENT_TYPE {
            &self.custom_document_type
        } else {
            &self.document_type
        }
    }

    /// Check the required fields. Runs before any network call.
    pub fn validate(&self) -> CatalogResult<ValidatedFields> {
        let institution_name = self.resolved_institution_name().trim();
        let document_type = self.resolved_document_type().trim();
        let title = self.title.trim();

        let mut missing = Vec::new();
        if institution_name.is_empty() {
            missing.push("institution name");
        }
        if title.is_empty() {
            missing.push("title");
        }
        if document_type.is_empty() || document_type == ALL_DOCUMENT_TYPES {
            missing.push("document type");
        }
        if !missing.is_empty() {
            return Err(CatalogError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        }

        Ok(ValidatedFields {
            institution_name: institution_name.to_string(),
            institution_type: self.institution_type,
            document_type: document_type.to_string(),
            title: title.to_string(),
            description: self.description.trim().to_string(),
        })
    }
}

/// A file selected for upload, held in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Read a file from disk
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "document".to_string());
        Ok(Self { file_name, bytes })
    }

    /// Reject empty and oversized files before they reach the network
    pub fn validate(&self) -> CatalogResult<()> {
        if self.bytes.is_empty() {
            return Err(CatalogError::Validation(format!(
                "file '{}' is empty",
                self.file_name
            )));
        }
        if self.bytes.len() > MAX_UPLOAD_BYTES {
            return Err(CatalogError::Validation(format!(
                "file '{}' is larger than 10 MB",
                self.file_name
            )));
        }
        Ok(())
    }
}
