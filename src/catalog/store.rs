use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use super::errors::{CatalogError, CatalogResult};
use super::models::{Document, DocumentFields, UploadFile};
use crate::remote::{DocumentStoreClient, RemoteError};
use crate::session::SessionStore;
use crate::transfer::{run_upload, TransferTracker};

/// Pause between an auth failure and the forced logout, so the error can
/// be shown first
pub const DEFAULT_LOGOUT_DELAY: Duration = Duration::from_millis(1000);

/// Published catalog state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogSnapshot {
    /// Server order, unique by id
    pub documents: Vec<Document>,
    /// Distinct institution names, sorted
    pub institution_names: Vec<String>,
}

/// "The catalog should be reloaded" flag.
///
/// Set after a mutation, consumed by whichever view reloads next. Lives only
/// as long as the process.
#[derive(Debug, Default)]
pub struct RefreshSignal {
    pending: AtomicBool,
}

impl RefreshSignal {
    pub fn mark(&self) {
        self.pending.store(true, Ordering::SeqCst);
    }

    /// Clear the flag, returning whether it was set
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::SeqCst)
    }

    pub fn is_marked(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }
}

/// Client-side mirror of the remote document list.
///
/// The server is the only authority: state changes only after the store
/// acknowledged a request, and every mutation is followed by a full reload
/// rather than a local splice.
pub struct CatalogStore {
    client: DocumentStoreClient,
    session: Arc<SessionStore>,
    snapshot: watch::Sender<CatalogSnapshot>,
    logout_delay: Duration,
    refresh_signal: Arc<RefreshSignal>,
}

impl CatalogStore {
    pub fn new(client: DocumentStoreClient, session: Arc<SessionStore>) -> Self {
        let (snapshot, _) = watch::channel(CatalogSnapshot::default());
        Self {
            client,
            session,
            snapshot,
            logout_delay: DEFAULT_LOGOUT_DELAY,
            refresh_signal: Arc::new(RefreshSignal::default()),
        }
    }

    pub fn with_logout_delay(mut self, delay: Duration) -> Self {
        self.logout_delay = delay;
        self
    }

    /// Reload the whole catalog, replacing the previous one
    pub async fn refresh(&self) -> CatalogResult<Vec<Document>> {
        let token = self.require_token()?;

        let documents = self
            .client
            .list_documents(&token)
            .await
            .map_err(|e| self.escalate(e))?;

        let documents = unique_by_id(documents);
        let institution_names = institution_index(&documents);

        log::info!(
            "catalog: loaded {} documents from {} institutions",
            documents.len(),
            institution_names.len()
        );

        self.snapshot.send_replace(CatalogSnapshot {
            documents: documents.clone(),
            institution_names,
        });
        self.refresh_signal.take();

        Ok(documents)
    }

    /// Reload only if a mutation asked for it
    pub async fn refresh_if_signalled(&self) -> CatalogResult<bool> {
        if !self.refresh_signal.take() {
            return Ok(false);
        }
        self.refresh().await?;
        Ok(true)
    }

    /// Fetch one document straight from the store
    pub async fn get(&self, id: &str) -> CatalogResult<Document> {
        let token = self.require_token()?;
        self.client
            .get_document(&token, id)
            .await
            .map_err(|e| self.escalate(e))
    }

    /// Upload a new document. Returns the created record when the store
    /// echoed it back.
    pub async fn create(
        &self,
        fields: &DocumentFields,
        file: &UploadFile,
    ) -> CatalogResult<Option<Document>> {
        self.create_with_progress(fields, file, &TransferTracker::new())
            .await
    }

    /// [`create`](Self::create), publishing upload progress on `tracker`
    pub async fn create_with_progress(
        &self,
        fields: &DocumentFields,
        file: &UploadFile,
        tracker: &TransferTracker,
    ) -> CatalogResult<Option<Document>> {
        let fields = fields.validate()?;
        file.validate()?;
        let token = self.require_token()?;

        let created = run_upload(tracker, self.client.create_document(&token, &fields, file))
            .await
            .map_err(|e| self.escalate(e))?;

        log::info!(
            "catalog: created '{}' for {}",
            fields.title,
            fields.institution_name
        );

        self.refresh_signal.mark();
        self.refresh_after_mutation().await;

        Ok(created)
    }

    /// Edit a document. Without `file` the stored file is kept.
    pub async fn update(
        &self,
        id: &str,
        fields: &DocumentFields,
        file: Option<&UploadFile>,
    ) -> CatalogResult<Document> {
        self.update_with_progress(id, fields, file, &TransferTracker::new())
            .await
    }

    /// [`update`](Self::update), publishing upload progress on `tracker`
    pub async fn update_with_progress(
        &self,
        id: &str,
        fields: &DocumentFields,
        file: Option<&UploadFile>,
        tracker: &TransferTracker,
    ) -> CatalogResult<Document> {
        let fields = fields.validate()?;
        if let Some(file) = file {
            file.validate()?;
        }
        let token = self.require_token()?;

        let echoed = run_upload(
            tracker,
            self.client.update_document(&token, id, &fields, file),
        )
        .await
        .map_err(|e| self.escalate(e))?;

        log::info!("catalog: updated document {}", id);

        self.refresh_signal.mark();
        self.refresh_after_mutation().await;

        if let Some(document) = echoed {
            return Ok(document);
        }
        match self.find(id) {
            Some(document) => Ok(document),
            None => self.get(id).await,
        }
    }

    /// Delete a document. The catalog is not touched until the next refresh.
    pub async fn delete(&self, id: &str) -> CatalogResult<()> {
        let token = self.require_token()?;
        self.client
            .delete_document(&token, id)
            .await
            .map_err(|e| self.escalate(e))?;

        log::info!("catalog: deleted document {}", id);
        self.refresh_signal.mark();
        Ok(())
    }

    /// Current documents, in server order
    pub fn documents(&self) -> Vec<Document> {
        self.snapshot.borrow().documents.clone()
    }

    /// Look a document up in the current snapshot
    pub fn find(&self, id: &str) -> Option<Document> {
        self.snapshot
            .borrow()
            .documents
            .iter()
            .find(|d| d.id == id)
            .cloned()
    }

    pub fn institution_names(&self) -> Vec<String> {
        self.snapshot.borrow().institution_names.clone()
    }

    /// Institution names with `current` guaranteed present, for an edit
    /// form whose document may not be in a stale snapshot
    pub fn institution_names_with(&self, current: &str) -> Vec<String> {
        let mut names = self.institution_names();
        if !current.is_empty() && !names.iter().any(|n| n == current) {
            names.push(current.to_string());
            names.sort();
        }
        names
    }

    pub fn snapshot(&self) -> CatalogSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CatalogSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn refresh_signal(&self) -> &RefreshSignal {
        &self.refresh_signal
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// The active token. A missing token is treated as a logged-out session.
    fn require_token(&self) -> CatalogResult<String> {
        match self.session.current_credential() {
            Some(credential) => Ok(credential.token),
            None => {
                log::warn!("catalog: no credential, logging out");
                self.session.logout()?;
                Err(CatalogError::AuthRequired)
            }
        }
    }

    /// Convert a remote failure, scheduling a logout for auth failures
    fn escalate(&self, err: RemoteError) -> CatalogError {
        let err = CatalogError::from(err);
        if let CatalogError::Unauthorized = err {
            self.schedule_logout();
        } else {
            log::warn!("catalog: {}", err);
        }
        err
    }

    fn schedule_logout(&self) {
        let session = Arc::clone(&self.session);
        let delay = self.logout_delay;
        log::warn!("catalog: credential rejected, logging out in {:?}", delay);

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = session.logout() {
                log::error!("catalog: forced logout failed: {}", e);
            }
        });
    }

    async fn refresh_after_mutation(&self) {
        if let Err(e) = self.refresh().await {
            log::warn!("catalog: reload after mutation failed: {}", e);
        }
    }
}

/// Keep the first occurrence of each id
fn unique_by_id(documents: Vec<Document>) -> Vec<Document> {
    let mut seen = HashSet::new();
    documents
        .into_iter()
        .filter(|d| seen.insert(d.id.clone()))
        .collect()
}

fn institution_index(documents: &[Document]) -> Vec<String> {
    documents
        .iter()
        .map(|d| d.institution_name.clone())
        .filter(|n| !n.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InstitutionType, OTHER_DOCUMENT_TYPE};
    use crate::session::{Identity, KvStore};
    use crate::test_support::{ListStyle, MockServer, VALID_TOKEN};
    use axum::http::StatusCode;
    use tempfile::TempDir;

    struct Fixture {
        server: MockServer,
        session: Arc<SessionStore>,
        catalog: CatalogStore,
        _temp: TempDir,
    }

    async fn fixture(token: Option<&str>) -> Fixture {
        let server = MockServer::start().await;
        let temp = TempDir::new().unwrap();
        let kv = KvStore::open(temp.path().join("session.json")).unwrap();
        let session = Arc::new(SessionStore::open(kv));
        if let Some(token) = token {
            session.login(token, Identity::default()).unwrap();
        }
        let client = DocumentStoreClient::new(&server.base_url).unwrap();
        let catalog = CatalogStore::new(client, Arc::clone(&session))
            .with_logout_delay(Duration::from_millis(50));
        Fixture {
            server,
            session,
            catalog,
            _temp: temp,
        }
    }

    fn fields(institution: &str, title: &str) -> DocumentFields {
        DocumentFields {
            institution_name: institution.to_string(),
            institution_type: InstitutionType::Bank,
            document_type: "Tarife".to_string(),
            title: title.to_string(),
            description: "Yıllık ücretler".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_refresh_replaces_catalog_and_index() {
        let f = fixture(Some(VALID_TOKEN)).await;
        f.server.insert("Yapı Kredi", InstitutionType::Bank, "KVKK", "A");
        f.server.insert("Akbank", InstitutionType::Bank, "Tarife", "B");
        f.server.insert("Akbank", InstitutionType::Bank, "KVKK", "C");

        for style in [ListStyle::Data, ListStyle::Documents, ListStyle::Bare] {
            f.server.set_list_style(style);
            let docs = f.catalog.refresh().await.unwrap();
            assert_eq!(docs.len(), 3);
        }

        assert_eq!(f.catalog.institution_names(), ["Akbank", "Yapı Kredi"]);
        assert_eq!(
            f.catalog.institution_names_with("Papara"),
            ["Akbank", "Papara", "Yapı Kredi"]
        );
        assert_eq!(f.catalog.institution_names_with("Akbank").len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_without_credential_logs_out() {
        let f = fixture(None).await;

        let err = f.catalog.refresh().await.unwrap_err();

        assert!(matches!(err, CatalogError::AuthRequired));
        assert!(!f.session.is_authenticated());
        assert_eq!(f.server.state.hits("list"), 0);
    }

    #[tokio::test]
    async fn test_rejected_credential_logs_out_after_delay() {
        let f = fixture(Some("expired-token")).await;

        let err = f.catalog.refresh().await.unwrap_err();
        assert!(matches!(err, CatalogError::Unauthorized));
        assert!(err.is_auth_failure());

        // The error is visible before the logout lands
        assert!(f.session.is_authenticated());

        let mut rx = f.session.subscribe_state();
        tokio::time::timeout(Duration::from_secs(2), async {
            while rx.borrow_and_update().is_authenticated() {
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("session was not logged out");
    }

    #[tokio::test]
    async fn test_rejected_mutation_logs_out_after_delay() {
        let f = fixture(Some("expired-token")).await;
        let doc = f.server.insert("Akbank", InstitutionType::Bank, "KVKK", "Kalan");

        let err = f.catalog.delete(&doc.id).await.unwrap_err();
        assert!(matches!(err, CatalogError::Unauthorized));
        assert!(!f.catalog.refresh_signal().is_marked());

        let err = f
            .catalog
            .update(&doc.id, &DocumentFields::from_document(&doc), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Unauthorized));

        assert!(f.session.is_authenticated());
        assert_eq!(f.server.state.hits("delete"), 1);
        assert_eq!(f.server.state.documents.lock().unwrap().len(), 1);

        let mut rx = f.session.subscribe_state();
        tokio::time::timeout(Duration::from_secs(2), async {
            while rx.borrow_and_update().is_authenticated() {
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("session was not logged out");
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let f = fixture(Some(VALID_TOKEN)).await;
        f.server.fail_list_with(Some(StatusCode::BAD_GATEWAY));

        let err = f.catalog.refresh().await.unwrap_err();
        assert!(matches!(err, CatalogError::TransientFetch(_)));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(f.session.is_authenticated());

        // Manual retry succeeds once the store recovers
        f.server.fail_list_with(None);
        assert!(f.catalog.refresh().await.is_ok());
    }

    #[tokio::test]
    async fn test_create_validation_never_reaches_network() {
        let f = fixture(Some(VALID_TOKEN)).await;
        let file = UploadFile::new("tarife.pdf", b"%PDF".to_vec());

        let err = f.catalog.create(&fields("", "Tarife"), &file).await.unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));

        let empty = UploadFile::new("bos.pdf", Vec::new());
        let err = f
            .catalog
            .create(&fields("Akbank", "Tarife"), &empty)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));

        assert_eq!(f.server.state.hits("create"), 0);
    }

    #[tokio::test]
    async fn test_create_sends_multipart_and_reloads() {
        let f = fixture(Some(VALID_TOKEN)).await;
        let tracker = TransferTracker::new();
        let mut input = fields("Akbank", "Ücret Tarifesi");
        input.document_type = OTHER_DOCUMENT_TYPE.to_string();
        input.custom_document_type = "Faaliyet Raporu".to_string();

        let created = f
            .catalog
            .create_with_progress(&input, &UploadFile::new("tarife.pdf", b"%PDF".to_vec()), &tracker)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(created.document_type, "Faaliyet Raporu");
        assert_eq!(tracker.current().progress, 100);

        let form = f.server.state.last_form.lock().unwrap().clone();
        assert_eq!(form.get("institutionUrl").map(String::as_str), Some("google.com"));
        assert_eq!(form.get("institutionType").map(String::as_str), Some("bank"));
        assert_eq!(
            form.get("documentDescription").map(String::as_str),
            Some("Yıllık ücretler")
        );

        // The reload already picked the new document up
        assert_eq!(f.server.state.hits("list"), 1);
        assert_eq!(f.catalog.documents().len(), 1);
        assert_eq!(f.catalog.institution_names(), ["Akbank"]);
        assert!(!f.catalog.refresh_signal().is_marked());
    }

    #[tokio::test]
    async fn test_update_without_file_keeps_stored_file() {
        let f = fixture(Some(VALID_TOKEN)).await;
        let doc = f.server.insert("Akbank", InstitutionType::Bank, "KVKK", "Eski");

        let mut input = DocumentFields::from_document(&doc);
        input.title = "Yeni".to_string();
        let updated = f.catalog.update(&doc.id, &input, None).await.unwrap();

        assert_eq!(updated.title, "Yeni");
        assert_eq!(updated.file_url, doc.file_url);
        let form = f.server.state.last_form.lock().unwrap().clone();
        assert!(!form.contains_key("institutionUrl"));
        assert_eq!(f.catalog.find(&doc.id).unwrap().title, "Yeni");
    }

    #[tokio::test]
    async fn test_deleted_document_is_gone_after_refresh() {
        let f = fixture(Some(VALID_TOKEN)).await;
        let keep = f.server.insert("Akbank", InstitutionType::Bank, "KVKK", "Kalan");
        let gone = f.server.insert("Papara", InstitutionType::ElectronicMoney, "KVKK", "Silinen");
        f.catalog.refresh().await.unwrap();

        f.catalog.delete(&gone.id).await.unwrap();

        // No local splice before the reload
        assert_eq!(f.catalog.documents().len(), 2);
        assert!(f.catalog.refresh_signal().is_marked());

        assert!(f.catalog.refresh_if_signalled().await.unwrap());
        let ids: Vec<String> = f.catalog.documents().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![keep.id]);
        assert_eq!(f.catalog.institution_names(), ["Akbank"]);
        assert!(!f.catalog.refresh_if_signalled().await.unwrap());
    }

    #[tokio::test]
    async fn test_get_missing_document() {
        let f = fixture(Some(VALID_TOKEN)).await;
        let doc = f.server.insert("Akbank", InstitutionType::Bank, "KVKK", "Var");

        assert_eq!(f.catalog.get(&doc.id).await.unwrap().title, "Var");
        assert!(matches!(
            f.catalog.get("9999").await,
            Err(CatalogError::NotFound(_))
        ));
        assert!(matches!(
            f.catalog.delete("9999").await,
            Err(CatalogError::NotFound(_))
        ));
    }

    #[test]
    fn test_unique_by_id_keeps_first() {
        let doc = |id: &str, title: &str| Document {
            id: id.to_string(),
            institution_name: "Akbank".to_string(),
            institution_type: InstitutionType::Bank,
            document_type: "KVKK".to_string(),
            title: title.to_string(),
            description: None,
            updated_at: String::new(),
            file_url: String::new(),
            file_size: String::new(),
        };

        let docs = unique_by_id(vec![doc("1", "a"), doc("2", "b"), doc("1", "c")]);
        let titles: Vec<&str> = docs.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, ["a", "b"]);
    }
}
