//! Shared types for the HTTP layer.

use std::sync::Arc;

use uuid::Uuid;

use crate::core_state::CoreState;

/// Shared context for all API routes and middleware.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core }
    }
}

/// Authenticated caller, injected into request extensions by the auth
/// middleware after successful token validation.
#[derive(Debug, Clone)]
pub struct UserContext {
    pub user_id: Uuid,
    pub username: String,
    /// The presented bearer token, kept so logout can revoke it.
    pub token: String,
}
