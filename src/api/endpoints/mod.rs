//! API endpoint handlers, one module per resource.

pub mod appointments;
pub mod auth;
pub mod documents;
pub mod health;
pub mod shares;
