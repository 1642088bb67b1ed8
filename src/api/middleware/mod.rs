//! API middleware. Only bearer authentication sits in front of the
//! protected routes.

pub mod auth;
