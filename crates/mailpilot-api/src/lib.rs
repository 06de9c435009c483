//! Mailpilot API - REST surface over the mail orchestration engine

pub mod auth;
pub mod handlers;
pub mod routes;

pub use auth::{AppState, AuthContext};
pub use routes::create_router;
