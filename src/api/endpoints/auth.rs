//! Account endpoints: register, login, logout.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::api::error::ApiError;
use crate::api::extract::ApiJson;
use crate::api::types::{ApiContext, UserContext};
use crate::auth::LoginOutcome;
use crate::models::UserProfile;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: Zeroizing<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: Zeroizing<String>,
    pub totp_code: Option<String>,
}

/// `POST /api/auth/register`
pub async fn register(
    State(ctx): State<ApiContext>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<UserProfile>), ApiError> {
    let profile = ctx.core.accounts.register(&req.username, &req.password).await?;
    Ok((StatusCode::CREATED, Json(profile)))
}

/// `POST /api/auth/login`: issues a bearer token.
pub async fn login(
    State(ctx): State<ApiContext>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<LoginOutcome>, ApiError> {
    let outcome = ctx
        .core
        .accounts
        .login(&req.username, &req.password, req.totp_code.as_deref())
        .await?;
    Ok(Json(outcome))
}

/// `POST /api/auth/logout`: revokes the presented token.
pub async fn logout(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<UserContext>,
) -> Result<StatusCode, ApiError> {
    ctx.core.accounts.logout(&user.token)?;
    tracing::debug!(user_id = %user.user_id, username = %user.username, "Logged out");
    Ok(StatusCode::NO_CONTENT)
}
