//! Share link endpoints.
//!
//! `GET /api/shared/:token` is the only document read that needs no
//! session; it exposes a reduced view of the document.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::extract::{ApiJson, ApiPath};
use crate::api::types::{ApiContext, UserContext};
use crate::models::{Document, ShareLink};
use crate::sharing::ShareLinkOptions;

/// What a link holder sees. Owner id, storage path and failure details
/// stay private.
#[derive(Debug, Serialize)]
pub struct SharedDocument {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub tags: Vec<String>,
    pub uploaded_at: DateTime<Utc>,
    pub extracted_text: Option<String>,
    pub summary: Option<String>,
}

impl From<Document> for SharedDocument {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            name: doc.name,
            category: doc.category,
            tags: doc.tags,
            uploaded_at: doc.uploaded_at,
            extracted_text: doc.extracted_text,
            summary: doc.summary,
        }
    }
}

/// `GET /api/documents/:id/shares`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    ApiPath(document_id): ApiPath<Uuid>,
) -> Result<Json<Vec<ShareLink>>, ApiError> {
    Ok(Json(
        ctx.core.shares.list_for_document(user.user_id, document_id)?,
    ))
}

/// `POST /api/documents/:id/shares`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    ApiPath(document_id): ApiPath<Uuid>,
    ApiJson(options): ApiJson<ShareLinkOptions>,
) -> Result<(StatusCode, Json<ShareLink>), ApiError> {
    let link = ctx.core.shares.create(user.user_id, document_id, options)?;
    Ok((StatusCode::CREATED, Json(link)))
}

/// `DELETE /api/shares/:id`
pub async fn revoke(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
    ApiPath(link_id): ApiPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    ctx.core.shares.revoke(user.user_id, link_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /api/shared/:token`: counts one access.
pub async fn resolve(
    State(ctx): State<ApiContext>,
    ApiPath(token): ApiPath<String>,
) -> Result<Json<SharedDocument>, ApiError> {
    let doc = ctx.core.shares.resolve(&token)?;
    Ok(Json(SharedDocument::from(doc)))
}
