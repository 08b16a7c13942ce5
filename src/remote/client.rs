use std::time::Duration;

use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{Document, UploadFile, ValidatedFields};

/// Placeholder sent for the institution URL the store requires on upload
const DEFAULT_INSTITUTION_URL: &str = "google.com";

/// HTTP client for the remote document store
#[derive(Clone)]
pub struct DocumentStoreClient {
    client: Client,
    base_url: String,
}

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unauthorized (HTTP {0})")]
    Unauthorized(u16),
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Unexpected response body: {0}")]
    Decode(String),
}

/// Body of `POST /auth/login`
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<LoginData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginData {
    #[serde(default)]
    pub token: Option<String>,
}

/// Body of `POST /auth/register`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

/// Generic `{success, message}` reply
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// A file body fetched from the store
#[derive(Debug, Clone)]
pub struct FetchedFile {
    pub bytes: Vec<u8>,
    pub content_disposition: Option<String>,
    pub content_type: Option<String>,
}

/// List endpoints answer with `{data}`, `{documents}` or a bare array
#[derive(Deserialize)]
#[serde(untagged)]
enum ListEnvelope {
    Data { data: Vec<Document> },
    Documents { documents: Vec<Document> },
    Bare(Vec<Document>),
}

impl ListEnvelope {
    fn into_documents(self) -> Vec<Document> {
        match self {
            Self::Data { data } => data,
            Self::Documents { documents } => documents,
            Self::Bare(documents) => documents,
        }
    }
}

/// Single-document endpoints answer bare or wrapped
#[derive(Deserialize)]
#[serde(untagged)]
enum SingleEnvelope {
    Data { data: Document },
    Wrapped { document: Document },
    Bare(Document),
}

impl SingleEnvelope {
    fn into_document(self) -> Document {
        match self {
            Self::Data { data } => data,
            Self::Wrapped { document } => document,
            Self::Bare(document) => document,
        }
    }
}

impl DocumentStoreClient {
    /// Create a client for the store rooted at `base_url`
    pub fn new(base_url: &str) -> Result<Self, RemoteError> {
        // Normalize URL - ensure no trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(RemoteError::InvalidUrl(
                "URL must start with http:// or https://".to_string(),
            ));
        }

        // Only the connect phase is bounded; a hung transfer stays pending
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn documents_url(&self) -> String {
        format!("{}/documents/", self.base_url)
    }

    fn document_url(&self, id: &str) -> String {
        format!("{}/documents/{}", self.base_url, urlencoding::encode(id))
    }

    /// GET /documents/ - the full catalog
    pub async fn list_documents(&self, token: &str) -> Result<Vec<Document>, RemoteError> {
        let response = self
            .client
            .get(self.documents_url())
            .bearer_auth(token)
            .send()
            .await?;

        let response = check_status(response, "documents").await?;
        let envelope: ListEnvelope = decode(response).await?;
        Ok(envelope.into_documents())
    }

    /// GET /documents/:id
    pub async fn get_document(&self, token: &str, id: &str) -> Result<Document, RemoteError> {
        let response = self
            .client
            .get(self.document_url(id))
            .bearer_auth(token)
            .send()
            .await?;

        let response = check_status(response, id).await?;
        let envelope: SingleEnvelope = decode(response).await?;
        Ok(envelope.into_document())
    }

    /// POST /documents/ (multipart). Returns the created record when the
    /// store echoes it back.
    pub async fn create_document(
        &self,
        token: &str,
        fields: &ValidatedFields,
        file: &UploadFile,
    ) -> Result<Option<Document>, RemoteError> {
        let form = metadata_form(fields)
            .part("file", file_part(file)?)
            .text("institutionUrl", DEFAULT_INSTITUTION_URL);

        let response = self
            .client
            .post(self.documents_url())
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;

        let response = check_status(response, "documents").await?;
        Ok(decode_optional(response).await)
    }

    /// PUT /documents/:id (multipart). Without a file the stored file is kept.
    pub async fn update_document(
        &self,
        token: &str,
        id: &str,
        fields: &ValidatedFields,
        file: Option<&UploadFile>,
    ) -> Result<Option<Document>, RemoteError> {
        let mut form = metadata_form(fields);
        if let Some(file) = file {
            form = form.part("file", file_part(file)?);
        }

        let response = self
            .client
            .put(self.document_url(id))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;

        let response = check_status(response, id).await?;
        Ok(decode_optional(response).await)
    }

    /// DELETE /documents/:id
    pub async fn delete_document(&self, token: &str, id: &str) -> Result<(), RemoteError> {
        let response = self
            .client
            .delete(self.document_url(id))
            .bearer_auth(token)
            .send()
            .await?;

        check_status(response, id).await?;
        Ok(())
    }

    /// POST /auth/login
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, RemoteError> {
        let response = self
            .client
            .post(format!("{}/auth/login", self.base_url))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        let response = check_status(response, "auth/login").await?;
        decode(response).await
    }

    /// POST /auth/register
    pub async fn register(&self, payload: &RegisterPayload) -> Result<StatusResponse, RemoteError> {
        let response = self
            .client
            .post(format!("{}/auth/register", self.base_url))
            .json(payload)
            .send()
            .await?;

        let response = check_status(response, "auth/register").await?;
        Ok(decode::<StatusResponse>(response)
            .await
            .unwrap_or(StatusResponse {
                success: true,
                message: None,
            }))
    }

    /// GET an arbitrary file URL, optionally with the bearer token
    pub async fn fetch_file(&self, url: &str, token: Option<&str>) -> Result<FetchedFile, RemoteError> {
        let url = Url::parse(url).map_err(|e| RemoteError::InvalidUrl(format!("{}: {}", url, e)))?;

        let mut request: RequestBuilder = self.client.get(url.clone());
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let response = check_status(response, url.as_str()).await?;

        let header = |name: reqwest::header::HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        };
        let content_disposition = header(reqwest::header::CONTENT_DISPOSITION);
        let content_type = header(reqwest::header::CONTENT_TYPE);

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            bytes.extend_from_slice(&chunk?);
        }

        log::debug!("remote: fetched {} bytes from {}", bytes.len(), url);

        Ok(FetchedFile {
            bytes,
            content_disposition,
            content_type,
        })
    }
}

fn metadata_form(fields: &ValidatedFields) -> Form {
    Form::new()
        .text("institutionName", fields.institution_name.clone())
        .text("institutionType", fields.institution_type.as_str())
        .text("documentType", fields.document_type.clone())
        .text("title", fields.title.clone())
        .text("documentDescription", fields.description.clone())
}

fn file_part(file: &UploadFile) -> Result<Part, RemoteError> {
    let mime = mime_for(&file.file_name);
    Part::bytes(file.bytes.clone())
        .file_name(file.file_name.clone())
        .mime_str(mime)
        .map_err(RemoteError::Http)
}

/// Content type for the accepted upload extensions
fn mime_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}

/// Map auth failures, missing resources and other non-2xx statuses
async fn check_status(response: Response, resource: &str) -> Result<Response, RemoteError> {
    match response.status() {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(RemoteError::Unauthorized(response.status().as_u16()))
        }
        StatusCode::NOT_FOUND => Err(RemoteError::NotFound(resource.to_string())),
        status if !status.is_success() => Err(RemoteError::Server {
            status: status.as_u16(),
            message: error_message(&response.text().await.unwrap_or_default()),
        }),
        _ => Ok(response),
    }
}

/// Prefer the `message` field of a JSON error body
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(|m| m.to_string()))
        .unwrap_or_else(|| body.trim().to_string())
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| RemoteError::Decode(e.to_string()))
}

async fn decode_optional(response: Response) -> Option<Document> {
    match decode::<SingleEnvelope>(response).await {
        Ok(envelope) => Some(envelope.into_document()),
        Err(e) => {
            log::debug!("remote: response carried no document: {}", e);
            None
        }
    }
}
