use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::task::JoinHandle;

use moneymate_lib::catalog::{
    derive_view, is_predefined_document_type, reduce, CatalogError, Document, DocumentFields,
    DocumentTypeFilter, FilterAction, InstitutionFilter, InstitutionType, PredicateSet,
    UploadFile, ALL_DOCUMENT_TYPES, OTHER_DOCUMENT_TYPE,
};
use moneymate_lib::transfer::{Downloader, TransferTracker};

use crate::app::App;
use crate::render::terminal::{self, paint, Color};

pub struct ListFilters {
    pub institution_type: Option<InstitutionType>,
    pub top_banks: bool,
    pub doc_type: Option<String>,
    pub search: Option<String>,
}

impl ListFilters {
    /// Fold the flags into predicates. The document type goes first so it
    /// does not clear institution flags given alongside it.
    fn predicates(self) -> PredicateSet {
        let mut actions = Vec::new();
        if let Some(doc_type) = self.doc_type {
            actions.push(FilterAction::SetDocumentType(DocumentTypeFilter::from_label(
                &doc_type,
            )));
        }
        if let Some(kind) = self.institution_type {
            actions.push(FilterAction::SetInstitutionType(InstitutionFilter::Only(kind)));
        }
        if self.top_banks {
            actions.push(FilterAction::ShowTopBanks);
        }
        if let Some(term) = self.search {
            actions.push(FilterAction::SetSearchTerm(term));
        }

        actions
            .into_iter()
            .fold(PredicateSet::default(), |p, action| reduce(&p, action))
    }
}

/// Field overrides shared by `add` and `edit`
pub struct DocumentEdit {
    pub institution: Option<String>,
    pub institution_type: Option<InstitutionType>,
    pub doc_type: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl DocumentEdit {
    fn apply(self, fields: &mut DocumentFields) {
        if let Some(institution) = self.institution {
            fields.institution_name = institution;
            fields.custom_institution_name = None;
        }
        if let Some(kind) = self.institution_type {
            fields.institution_type = kind;
        }
        if let Some(doc_type) = self.doc_type {
            if is_predefined_document_type(&doc_type) || doc_type == ALL_DOCUMENT_TYPES {
                fields.document_type = doc_type;
                fields.custom_document_type.clear();
            } else {
                fields.document_type = OTHER_DOCUMENT_TYPE.to_string();
                fields.custom_document_type = doc_type;
            }
        }
        if let Some(title) = self.title {
            fields.title = title;
        }
        if let Some(description) = self.description {
            fields.description = description;
        }
    }
}

pub async fn list(app: &App, filters: ListFilters) -> Result<()> {
    let documents = checked(app, app.ctx.catalog.refresh().await)?;
    let predicates = filters.predicates();
    let view = derive_view(&documents, &predicates);

    if app.is_json() {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    if view.is_empty() {
        println!("(no documents)");
    }
    for doc in &view {
        println!("{}", terminal::document_line(doc, app.use_color));
    }
    if predicates.is_active() {
        println!(
            "{}",
            paint(
                &format!("\n{} of {} documents", view.len(), documents.len()),
                Color::DIM,
                app.use_color
            )
        );
    }
    Ok(())
}

pub async fn institutions(app: &App) -> Result<()> {
    checked(app, app.ctx.catalog.refresh().await)?;
    let names = app.ctx.catalog.institution_names();

    if app.is_json() {
        println!("{}", serde_json::to_string_pretty(&names)?);
    } else {
        for name in names {
            println!("{}", name);
        }
    }
    Ok(())
}

pub async fn show(app: &App, id: &str) -> Result<()> {
    let doc = checked(app, app.ctx.catalog.get(id).await)?;
    print_document(app, &doc)
}

pub async fn add(app: &App, file: &Path, edit: DocumentEdit) -> Result<()> {
    let upload = UploadFile::from_path(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let mut fields = DocumentFields::default();
    edit.apply(&mut fields);

    let tracker = TransferTracker::new();
    let progress = show_progress(app, &tracker, "Uploading");
    let result = app
        .ctx
        .catalog
        .create_with_progress(&fields, &upload, &tracker)
        .await;
    finish_progress(tracker, progress).await;

    match checked(app, result)? {
        Some(doc) => print_document(app, &doc),
        None => {
            if !app.is_json() {
                println!("Uploaded '{}'", fields.title);
            }
            Ok(())
        }
    }
}

pub async fn edit(app: &App, id: &str, file: Option<&Path>, edit: DocumentEdit) -> Result<()> {
    let current = checked(app, app.ctx.catalog.get(id).await)?;
    let mut fields = DocumentFields::from_document(&current);
    edit.apply(&mut fields);

    let upload = match file {
        Some(path) => Some(
            UploadFile::from_path(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?,
        ),
        None => None,
    };

    let tracker = TransferTracker::new();
    let progress = show_progress(app, &tracker, "Uploading");
    let result = app
        .ctx
        .catalog
        .update_with_progress(id, &fields, upload.as_ref(), &tracker)
        .await;
    finish_progress(tracker, progress).await;

    let doc = checked(app, result)?;
    print_document(app, &doc)
}

pub async fn delete(app: &App, id: &str) -> Result<()> {
    checked(app, app.ctx.catalog.delete(id).await)?;
    checked(app, app.ctx.catalog.refresh_if_signalled().await)?;

    if app.is_json() {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted document {}", id);
    }
    Ok(())
}

pub async fn download(app: &App, id: &str, out: Option<PathBuf>) -> Result<()> {
    let doc = checked(app, app.ctx.catalog.get(id).await)?;
    let credential = app.ctx.session.current_credential();

    let custom;
    let downloader = match out {
        Some(dir) => {
            custom = Downloader::new(app.ctx.client.clone(), dir);
            &custom
        }
        None => &app.ctx.downloader,
    };

    let tracker = TransferTracker::new();
    let saved = downloader
        .download(&doc, credential.as_ref(), &tracker)
        .await
        .context("Download failed")?;

    if app.is_json() {
        println!("{}", serde_json::to_string_pretty(&saved)?);
    } else {
        println!(
            "Saved {} ({} bytes, {})",
            paint(&saved.path.display().to_string(), Color::GREEN, app.use_color),
            saved.size,
            saved.strategy
        );
    }
    Ok(())
}

fn print_document(app: &App, doc: &Document) -> Result<()> {
    if app.is_json() {
        println!("{}", serde_json::to_string_pretty(doc)?);
    } else {
        println!("{}", terminal::document_detail(doc, app.use_color));
    }
    Ok(())
}

/// Auth failures end the session right away; the process would exit
/// before a delayed logout could run.
fn checked<T>(app: &App, result: Result<T, CatalogError>) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) => {
            if e.is_auth_failure() {
                app.ctx.session.logout().context("Failed to clear session")?;
                eprintln!(
                    "{}",
                    paint("Session ended, please log in again.", Color::RED, app.use_color)
                );
            }
            Err(e.into())
        }
    }
}

fn show_progress(app: &App, tracker: &TransferTracker, label: &'static str) -> Option<JoinHandle<()>> {
    if app.is_json() || !std::io::stderr().is_terminal() {
        return None;
    }

    let mut rx = tracker.subscribe();
    Some(tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let job = rx.borrow_and_update().clone();
            eprint!("\r{} {:>3}%", label, job.progress);
            if !job.is_in_flight() {
                eprintln!();
                break;
            }
        }
    }))
}

async fn finish_progress(tracker: TransferTracker, progress: Option<JoinHandle<()>>) {
    // Dropping the tracker closes the channel so the printer always exits
    drop(tracker);
    if let Some(handle) = progress {
        let _ = handle.await;
    }
}
