//! Document endpoints: upload, search, metadata, file bytes, and the two
//! processing triggers.
//!
//! `POST /api/documents` receives a base64 data URL, stores the bytes,
//! and records a `pending` document (or `completed`, when the client
//! already supplies `extracted_text`).

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::extract::{ApiJson, ApiPath, ApiQuery};
use crate::api::types::{ApiContext, UserContext};
use crate::error::CoreError;
use crate::models::{Document, DocumentFilter, DocumentMetadata, MetadataUpdate};
use crate::search::search_documents;
use crate::storage::{content_type_for, decode_data_url, detect_extension};

#[derive(Debug, Default, Deserialize)]
pub struct DocumentQuery {
    pub q: Option<String>,
    pub category: Option<String>,
    /// Comma-separated; every tag must be present.
    pub tags: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl From<DocumentQuery> for DocumentFilter {
    fn from(q: DocumentQuery) -> Self {
        DocumentFilter {
            query: q.q,
            category: q
                .category
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty()),
            tags: q
                .tags
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            start_date: q.start_date,
            end_date: q.end_date,
        }
    }
}

#[derive(Deserialize)]
pub struct UploadRequest {
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Base64 data URL (e.g., `data:image/jpeg;base64,/9j/...`)
    pub data: String,
    pub extracted_text: Option<String>,
}

/// `GET /api/documents`: the caller's documents, newest first, filtered.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    ApiQuery(query): ApiQuery<DocumentQuery>,
) -> Result<Json<Vec<Document>>, ApiError> {
    let filter = DocumentFilter::from(query);
    let docs = search_documents(ctx.core.store.as_ref(), user.user_id, &filter)?;
    Ok(Json(docs))
}

/// `POST /api/documents`
pub async fn upload(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    ApiJson(payload): ApiJson<UploadRequest>,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    let decoded = decode_data_url(&payload.data).map_err(CoreError::from)?;
    let extension = detect_extension(&decoded.bytes, decoded.media_type.as_deref());
    let file_ref = ctx
        .core
        .files
        .save(&decoded.bytes, extension)
        .await
        .map_err(CoreError::from)?;

    let metadata = DocumentMetadata {
        name: payload.name,
        category: payload.category,
        tags: payload.tags,
    };
    match ctx
        .core
        .pipeline
        .create_document(user.user_id, metadata, file_ref.clone(), payload.extracted_text)
    {
        Ok(doc) => Ok((StatusCode::CREATED, Json(doc))),
        Err(err) => {
            // The record was never written; drop the orphaned bytes.
            if let Err(e) = ctx.core.files.delete(&file_ref).await {
                tracing::warn!(file_ref = %file_ref, error = %e, "Failed to remove rejected upload");
            }
            Err(err.into())
        }
    }
}

/// `GET /api/documents/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Document>, ApiError> {
    Ok(Json(ctx.core.pipeline.get_document(user.user_id, id)?))
}

/// `PATCH /api/documents/:id`: name, category and tags.
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(update): ApiJson<MetadataUpdate>,
) -> Result<Json<Document>, ApiError> {
    Ok(Json(ctx.core.pipeline.update_metadata(user.user_id, id, update)?))
}

/// `DELETE /api/documents/:id`
pub async fn remove(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    ctx.core.pipeline.delete_document(user.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/documents/:id/file`: the stored bytes.
pub async fn file(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Response, ApiError> {
    let doc = ctx.core.pipeline.get_document(user.user_id, id)?;
    let bytes = ctx
        .core
        .files
        .read(&doc.file_ref)
        .await
        .map_err(CoreError::from)?;
    Ok((
        [(header::CONTENT_TYPE, content_type_for(&doc.file_ref))],
        bytes,
    )
        .into_response())
}

/// `POST /api/documents/:id/extract`: runs extraction to a terminal state.
pub async fn extract(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Document>, ApiError> {
    Ok(Json(ctx.core.pipeline.request_extraction(user.user_id, id).await?))
}

/// `POST /api/documents/:id/summarize`
pub async fn summarize(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Document>, ApiError> {
    Ok(Json(
        ctx.core
            .pipeline
            .request_summarization(user.user_id, id)
            .await?,
    ))
}
