//! Document pipeline orchestrator.
//!
//! Drives each document through two tracks, persisting every transition:
//!
//! - extraction: `pending → processing → completed | error`
//! - summary:    `none → processing → completed | error`, only once
//!   extraction completed with non-blank text.
//!
//! Entering `processing` is a compare-and-set in the store, so concurrent
//! requests on one document reach the external service at most once. The
//! service call and the terminal status write run in a spawned task: a
//! dropped request still settles the document.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;
use uuid::Uuid;

use super::types::{Summarizer, TextExtractor};
use super::ServiceError;
use crate::db::{DatabaseError, RecordStore};
use crate::error::{CoreError, CoreResult};
use crate::models::enums::{ExtractionStatus, SummaryStatus};
use crate::models::{
    normalize_tags, stored_now, Document, DocumentMetadata, DocumentPatch, MetadataUpdate,
    MAX_NAME_CHARS,
};
use crate::storage::FileStore;

pub const NO_TEXT_EXTRACTED: &str = "no text extracted";
pub const EMPTY_SUMMARY: &str = "empty summary returned";

pub struct DocumentPipeline {
    store: Arc<dyn RecordStore>,
    files: Arc<FileStore>,
    extractor: Arc<dyn TextExtractor>,
    summarizer: Arc<dyn Summarizer>,
    stage_timeout: Duration,
}

impl DocumentPipeline {
    pub fn new(
        store: Arc<dyn RecordStore>,
        files: Arc<FileStore>,
        extractor: Arc<dyn TextExtractor>,
        summarizer: Arc<dyn Summarizer>,
        stage_timeout: Duration,
    ) -> Self {
        Self {
            store,
            files,
            extractor,
            summarizer,
            stage_timeout,
        }
    }

    /// Persist a new document for an already stored file.
    ///
    /// Non-blank `precomputed_text` marks extraction completed immediately.
    pub fn create_document(
        &self,
        owner_id: Uuid,
        metadata: DocumentMetadata,
        file_ref: String,
        precomputed_text: Option<String>,
    ) -> CoreResult<Document> {
        let name = validate_name(&metadata.name)?;
        let text = precomputed_text.filter(|t| !t.trim().is_empty());
        let extraction_status = if text.is_some() {
            ExtractionStatus::Completed
        } else {
            ExtractionStatus::Pending
        };

        let doc = Document {
            id: Uuid::new_v4(),
            owner_id,
            name,
            category: metadata.category.trim().to_string(),
            tags: normalize_tags(&metadata.tags),
            file_ref,
            uploaded_at: stored_now(),
            extracted_text: text,
            extraction_status,
            extraction_error: None,
            summary: None,
            summary_status: SummaryStatus::None,
            summary_error: None,
        };
        self.store.insert_document(&doc)?;

        tracing::info!(
            document_id = %doc.id,
            extraction_status = %doc.extraction_status,
            "Document created"
        );
        Ok(doc)
    }

    /// Fetch a document the caller owns.
    pub fn get_document(&self, owner_id: Uuid, id: Uuid) -> CoreResult<Document> {
        match self.store.get_document(&id)? {
            Some(doc) if doc.owner_id == owner_id => Ok(doc),
            _ => Err(CoreError::not_found("Document")),
        }
    }

    /// Newest upload first.
    pub fn list_documents(&self, owner_id: Uuid) -> CoreResult<Vec<Document>> {
        Ok(self.store.list_documents_by_owner(&owner_id)?)
    }

    pub fn update_metadata(
        &self,
        owner_id: Uuid,
        id: Uuid,
        update: MetadataUpdate,
    ) -> CoreResult<Document> {
        self.get_document(owner_id, id)?;

        let patch = DocumentPatch {
            name: update.name.as_deref().map(validate_name).transpose()?,
            category: update.category.map(|c| c.trim().to_string()),
            tags: update.tags.map(|t| normalize_tags(&t)),
            ..DocumentPatch::default()
        };
        if patch.is_empty() {
            return self.get_document(owner_id, id);
        }
        Ok(self.store.update_document(&id, &patch)?)
    }

    /// Delete the record, its share links and appointment references, then
    /// the stored file. A file that cannot be removed is only logged.
    pub async fn delete_document(&self, owner_id: Uuid, id: Uuid) -> CoreResult<()> {
        self.get_document(owner_id, id)?;
        let Some(doc) = self.store.delete_document(&id)? else {
            return Err(CoreError::not_found("Document"));
        };

        if let Err(e) = self.files.delete(&doc.file_ref).await {
            tracing::warn!(document_id = %id, error = %e, "Failed to remove stored file");
        }
        tracing::info!(document_id = %id, "Document deleted");
        Ok(())
    }

    /// Run extraction and return the settled document.
    pub async fn request_extraction(&self, owner_id: Uuid, id: Uuid) -> CoreResult<Document> {
        let doc = self.get_document(owner_id, id)?;
        if doc.extraction_status == ExtractionStatus::Processing {
            return Err(CoreError::InvalidState("extraction already in progress".into()));
        }
        if !self.store.claim_extraction(&id)? {
            return Err(CoreError::InvalidState(
                "document is already being processed".into(),
            ));
        }

        let task = tokio::spawn(
            run_extraction(
                self.store.clone(),
                self.extractor.clone(),
                self.stage_timeout,
                id,
                doc.file_ref,
            )
            .instrument(tracing::info_span!("extract_document", document_id = %id)),
        );

        self.settle(id, task, |msg| DocumentPatch::extraction_failed(msg)).await
    }

    /// Run summarization and return the settled document.
    pub async fn request_summarization(&self, owner_id: Uuid, id: Uuid) -> CoreResult<Document> {
        let doc = self.get_document(owner_id, id)?;
        check_summary_allowed(&doc)?;
        if !self.store.claim_summary(&id)? {
            // Lost a race: report whichever rule now blocks the claim.
            let current = self.get_document(owner_id, id)?;
            check_summary_allowed(&current)?;
            return Err(CoreError::InvalidState(
                "document is already being processed".into(),
            ));
        }

        let task = tokio::spawn(
            run_summary(
                self.store.clone(),
                self.summarizer.clone(),
                self.stage_timeout,
                id,
                doc.extracted_text.unwrap_or_default(),
            )
            .instrument(tracing::info_span!("summarize_document", document_id = %id)),
        );

        self.settle(id, task, |msg| DocumentPatch::summary_failed(msg)).await
    }

    /// Await a stage task. A panicked task still leaves the document in `error`.
    async fn settle(
        &self,
        id: Uuid,
        task: tokio::task::JoinHandle<Result<Document, DatabaseError>>,
        on_panic: fn(String) -> DocumentPatch,
    ) -> CoreResult<Document> {
        match task.await {
            Ok(result) => Ok(result?),
            Err(join_err) => {
                tracing::error!(document_id = %id, error = %join_err, "Pipeline stage task failed");
                self.store
                    .update_document(&id, &on_panic("internal failure".to_string()))?;
                Err(CoreError::Internal(join_err.to_string()))
            }
        }
    }
}

async fn run_extraction(
    store: Arc<dyn RecordStore>,
    extractor: Arc<dyn TextExtractor>,
    timeout: Duration,
    id: Uuid,
    file_ref: String,
) -> Result<Document, DatabaseError> {
    let start = std::time::Instant::now();
    let patch = match with_timeout(timeout, extractor.extract(&file_ref)).await {
        Ok(text) if !text.trim().is_empty() => {
            tracing::info!(
                document_id = %id,
                text_len = text.len(),
                elapsed_ms = %start.elapsed().as_millis(),
                "Extraction completed"
            );
            DocumentPatch::extraction_succeeded(text)
        }
        Ok(_) => {
            tracing::warn!(document_id = %id, "Extraction returned no text");
            DocumentPatch::extraction_failed(NO_TEXT_EXTRACTED)
        }
        Err(e) => {
            tracing::warn!(document_id = %id, error = %e, "Extraction failed");
            DocumentPatch::extraction_failed(e.to_string())
        }
    };
    store.update_document(&id, &patch)
}

async fn run_summary(
    store: Arc<dyn RecordStore>,
    summarizer: Arc<dyn Summarizer>,
    timeout: Duration,
    id: Uuid,
    text: String,
) -> Result<Document, DatabaseError> {
    let start = std::time::Instant::now();
    let patch = match with_timeout(timeout, summarizer.summarize(&text)).await {
        Ok(summary) if !summary.trim().is_empty() => {
            tracing::info!(
                document_id = %id,
                summary_len = summary.len(),
                elapsed_ms = %start.elapsed().as_millis(),
                "Summary completed"
            );
            DocumentPatch::summary_succeeded(summary)
        }
        Ok(_) => {
            tracing::warn!(document_id = %id, "Summarizer returned empty output");
            DocumentPatch::summary_failed(EMPTY_SUMMARY)
        }
        Err(e) => {
            tracing::warn!(document_id = %id, error = %e, "Summarization failed");
            DocumentPatch::summary_failed(e.to_string())
        }
    };
    store.update_document(&id, &patch)
}

fn validate_name(raw: &str) -> CoreResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(CoreError::Validation("name must not be blank".into()));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(CoreError::Validation(format!(
            "name must be at most {MAX_NAME_CHARS} characters"
        )));
    }
    Ok(name.to_string())
}

fn check_summary_allowed(doc: &Document) -> CoreResult<()> {
    if doc.extraction_status != ExtractionStatus::Completed || doc.usable_text().is_none() {
        return Err(CoreError::Precondition(
            "extraction must complete with text before summarizing".into(),
        ));
    }
    if doc.summary_status == SummaryStatus::Processing {
        return Err(CoreError::InvalidState("summary already in progress".into()));
    }
    Ok(())
}

async fn with_timeout<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, ServiceError>>,
) -> Result<T, ServiceError> {
    tokio::time::timeout(limit, fut)
        .await
        .unwrap_or(Err(ServiceError::Timeout(limit)))
}
