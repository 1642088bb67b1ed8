//! Health check endpoint.

use axum::Json;
use serde::Serialize;

use crate::config::{APP_NAME, APP_VERSION};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub app: &'static str,
    pub version: &'static str,
}

/// `GET /api/health`: liveness check, no authentication.
pub async fn check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        app: APP_NAME,
        version: APP_VERSION,
    })
}
