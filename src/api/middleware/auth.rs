//! Bearer token authentication middleware.
//!
//! Extracts `Authorization: Bearer <token>`, resolves it to a user through
//! the session registry, and injects `UserContext` into request extensions.

use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, UserContext};
use crate::error::CoreError;

/// Require a valid session token.
///
/// Accesses `ApiContext` from request extensions (injected by Extension layer).
pub async fn require_auth(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_auth_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_auth_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let token = bearer_token(&req).ok_or(ApiError::Unauthorized)?;

    let user = match ctx.core.accounts.authenticate(&token) {
        Ok(user) => user,
        Err(CoreError::Unauthorized) => {
            tracing::debug!("Rejected bearer token");
            return Err(ApiError::Unauthorized);
        }
        Err(e) => return Err(e.into()),
    };

    req.extensions_mut().insert(UserContext {
        user_id: user.id,
        username: user.username,
        token,
    });

    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert("Cache-Control", HeaderValue::from_static("no-store"));
    Ok(response)
}

fn bearer_token<B>(req: &Request<B>) -> Option<String> {
    req.headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
}
