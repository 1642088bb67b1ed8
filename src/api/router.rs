//! API router.
//!
//! Returns a composable `Router` with every endpoint under `/api/`.
//! Protected routes sit behind bearer authentication; health, account
//! creation, login and share-link resolution do not.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

use crate::api::endpoints::{appointments, auth, documents, health, shares};
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

/// JSON and base64 framing on top of the raw upload limit.
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build the API router.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost layer).
/// Endpoint handlers use `State<ApiContext>` (provided via `with_state`).
pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

fn build_router(ctx: ApiContext) -> Router {
    let body_limit = request_body_limit(ctx.core.config.max_upload_bytes);

    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let protected = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/documents", get(documents::list).post(documents::upload))
        .route(
            "/documents/:id",
            get(documents::detail)
                .patch(documents::update)
                .delete(documents::remove),
        )
        .route("/documents/:id/file", get(documents::file))
        .route("/documents/:id/extract", post(documents::extract))
        .route("/documents/:id/summarize", post(documents::summarize))
        .route(
            "/documents/:id/shares",
            get(shares::list).post(shares::create),
        )
        .route("/shares/:id", delete(shares::revoke))
        .route(
            "/appointments",
            get(appointments::list).post(appointments::create),
        )
        .route(
            "/appointments/:id",
            get(appointments::detail)
                .patch(appointments::update)
                .delete(appointments::remove),
        )
        .route(
            "/appointments/:id/documents/:document_id",
            put(appointments::attach_document).delete(appointments::detach_document),
        )
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::auth::require_auth))
        // Extension must be outermost so middleware can extract ApiContext
        .layer(axum::Extension(ctx.clone()));

    let unprotected = Router::new()
        .route("/health", get(health::check))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/shared/:token", get(shares::resolve))
        .with_state(ctx);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", protected.merge(unprotected))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(cors)
}

/// Base64 inflates by 4/3.
fn request_body_limit(max_upload_bytes: usize) -> usize {
    max_upload_bytes
        .saturating_mul(4)
        .div_ceil(3)
        .saturating_add(BODY_OVERHEAD_BYTES)
}
