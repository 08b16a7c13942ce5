//! In-process stand-in for the document store, used by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::catalog::{Document, InstitutionType};

pub const VALID_TOKEN: &str = "valid-token";
pub const USER_EMAIL: &str = "ayse@example.com";
pub const USER_PASSWORD: &str = "secret123";

/// How the list endpoint wraps its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListStyle {
    Data,
    Documents,
    Bare,
}

#[derive(Default)]
pub struct MockState {
    pub documents: Mutex<Vec<Document>>,
    pub files: Mutex<HashMap<String, Vec<u8>>>,
    pub last_form: Mutex<HashMap<String, String>>,
    pub hits: Mutex<HashMap<String, usize>>,
    pub fail_list_with: Mutex<Option<StatusCode>>,
    pub list_style: Mutex<Option<ListStyle>>,
    base_url: Mutex<String>,
    next_id: AtomicU64,
}

impl MockState {
    fn hit(&self, route: &str) {
        let mut hits = self.hits.lock().unwrap();
        *hits.entry(route.to_string()).or_insert(0) += 1;
    }

    pub fn hits(&self, route: &str) -> usize {
        self.hits.lock().unwrap().get(route).copied().unwrap_or(0)
    }
}

/// Running mock server. Dropping it shuts the server down.
pub struct MockServer {
    pub base_url: String,
    pub state: Arc<MockState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockServer {
    pub async fn start() -> Self {
        let state = Arc::new(MockState {
            next_id: AtomicU64::new(100),
            ..Default::default()
        });

        let app = Router::new()
            .route("/documents/", get(list_documents).post(create_document))
            .route(
                "/documents/{id}",
                get(get_document).put(update_document).delete(delete_document),
            )
            .route("/auth/login", post(login))
            .route("/auth/register", post(register))
            .route("/files/private/{name}", get(private_file))
            .route("/files/public/{name}", get(public_file))
            .route("/files/forced/{name}", get(forced_file))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let base_url = format!("http://127.0.0.1:{}", port);
        *state.base_url.lock().unwrap() = base_url.clone();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            base_url,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Seed a document and return it
    pub fn insert(&self, institution: &str, kind: InstitutionType, doc_type: &str, title: &str) -> Document {
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let document = Document {
            id: id.clone(),
            institution_name: institution.to_string(),
            institution_type: kind,
            document_type: doc_type.to_string(),
            title: title.to_string(),
            description: None,
            updated_at: "2025-03-01T09:00:00".to_string(),
            file_url: self.url(&format!("/files/private/{}.pdf", id)),
            file_size: "3".to_string(),
        };
        self.state.documents.lock().unwrap().push(document.clone());
        document
    }

    pub fn put_file(&self, name: &str, bytes: &[u8]) {
        self.state
            .files
            .lock()
            .unwrap()
            .insert(name.to_string(), bytes.to_vec());
    }

    pub fn fail_list_with(&self, status: Option<StatusCode>) {
        *self.state.fail_list_with.lock().unwrap() = status;
    }

    pub fn set_list_style(&self, style: ListStyle) {
        *self.state.list_style.lock().unwrap() = Some(style);
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", VALID_TOKEN))
        .unwrap_or(false)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"success": false, "message": "Unauthorized"})),
    )
        .into_response()
}

async fn list_documents(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.hit("list");
    if !authorized(&headers) {
        return unauthorized();
    }
    if let Some(status) = *state.fail_list_with.lock().unwrap() {
        return (status, "list failed").into_response();
    }

    let documents = state.documents.lock().unwrap().clone();
    let style = state.list_style.lock().unwrap().unwrap_or(ListStyle::Data);
    let body = match style {
        ListStyle::Data => json!({"success": true, "data": documents}),
        ListStyle::Documents => json!({"documents": documents, "totalCount": documents.len()}),
        ListStyle::Bare => json!(documents),
    };
    Json(body).into_response()
}

async fn get_document(
    State(state): State<Arc<MockState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.hit("get");
    if !authorized(&headers) {
        return unauthorized();
    }
    let documents = state.documents.lock().unwrap();
    match documents.iter().find(|d| d.id == id) {
        Some(doc) => Json(json!(doc)).into_response(),
        None => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

async fn read_form(multipart: &mut Multipart) -> (HashMap<String, String>, Option<(String, Vec<u8>)>) {
    let mut fields = HashMap::new();
    let mut file = None;
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let file_name = field.file_name().unwrap_or("upload").to_string();
            let bytes = field.bytes().await.unwrap().to_vec();
            file = Some((file_name, bytes));
        } else {
            fields.insert(name, field.text().await.unwrap());
        }
    }
    (fields, file)
}

fn document_from_form(id: String, form: &HashMap<String, String>, base: Option<&Document>) -> Document {
    let field = |key: &str| form.get(key).cloned().unwrap_or_default();
    Document {
        id,
        institution_name: field("institutionName"),
        institution_type: field("institutionType").parse().unwrap_or_default(),
        document_type: field("documentType"),
        title: field("title"),
        description: form.get("documentDescription").cloned(),
        updated_at: "2025-03-02T12:00:00".to_string(),
        file_url: base.map(|d| d.file_url.clone()).unwrap_or_default(),
        file_size: base.map(|d| d.file_size.clone()).unwrap_or_default(),
    }
}

async fn create_document(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    state.hit("create");
    if !authorized(&headers) {
        return unauthorized();
    }
    let (form, file) = read_form(&mut multipart).await;
    let Some((file_name, bytes)) = file else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"success": false, "message": "Dosya gerekli"})),
        )
            .into_response();
    };

    let id = state.next_id.fetch_add(1, Ordering::SeqCst).to_string();
    let mut document = document_from_form(id, &form, None);
    document.file_url = format!("{}/files/private/{}", state.base_url.lock().unwrap(), file_name);
    document.file_size = bytes.len().to_string();

    state.files.lock().unwrap().insert(file_name, bytes);
    state.documents.lock().unwrap().push(document.clone());
    *state.last_form.lock().unwrap() = form;

    (
        StatusCode::CREATED,
        Json(json!({"success": true, "message": "Belge yüklendi", "data": document})),
    )
        .into_response()
}

async fn update_document(
    State(state): State<Arc<MockState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    state.hit("update");
    if !authorized(&headers) {
        return unauthorized();
    }
    let (form, file) = read_form(&mut multipart).await;
    let mut documents = state.documents.lock().unwrap();
    let Some(slot) = documents.iter_mut().find(|d| d.id == id) else {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    };

    let mut updated = document_from_form(id, &form, Some(&*slot));
    if let Some((_, bytes)) = file {
        updated.file_size = bytes.len().to_string();
    }
    *slot = updated.clone();
    *state.last_form.lock().unwrap() = form;

    Json(json!({"document": updated})).into_response()
}

async fn delete_document(
    State(state): State<Arc<MockState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.hit("delete");
    if !authorized(&headers) {
        return unauthorized();
    }
    let mut documents = state.documents.lock().unwrap();
    let before = documents.len();
    documents.retain(|d| d.id != id);
    if documents.len() == before {
        return (StatusCode::NOT_FOUND, "not found").into_response();
    }
    Json(json!({"success": true})).into_response()
}

async fn login(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.hit("login");
    let email = body["email"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();
    if email == USER_EMAIL && password == USER_PASSWORD {
        Json(json!({"success": true, "data": {"token": VALID_TOKEN}})).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"success": false, "message": "Geçersiz e-posta veya şifre"})),
        )
            .into_response()
    }
}

async fn register(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.hit("register");
    if body["email"].as_str() == Some(USER_EMAIL) {
        return (
            StatusCode::CONFLICT,
            Json(json!({"success": false, "message": "Bu e-posta zaten kayıtlı"})),
        )
            .into_response();
    }
    Json(json!({"success": true, "message": "Kayıt başarılı"})).into_response()
}

fn file_response(state: &MockState, name: &str) -> Response {
    let files = state.files.lock().unwrap();
    match files.get(name) {
        Some(bytes) => (
            [
                (header::CONTENT_TYPE, "application/pdf".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", name),
                ),
            ],
            Body::from(bytes.clone()),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "no such file").into_response(),
    }
}

async fn private_file(
    State(state): State<Arc<MockState>>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    state.hit("private_file");
    if !authorized(&headers) {
        return unauthorized();
    }
    file_response(&state, &name)
}

async fn public_file(State(state): State<Arc<MockState>>, Path(name): Path<String>) -> Response {
    state.hit("public_file");
    let files = state.files.lock().unwrap();
    match files.get(&name) {
        // No content-disposition, the client must name the file itself
        Some(bytes) => Body::from(bytes.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, "no such file").into_response(),
    }
}

async fn forced_file(
    State(state): State<Arc<MockState>>,
    Path(name): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.hit("forced_file");
    if query.get("download").map(|v| v.as_str()) != Some("1") {
        return (StatusCode::FORBIDDEN, "inline viewing disabled").into_response();
    }
    file_response(&state, &name)
}
