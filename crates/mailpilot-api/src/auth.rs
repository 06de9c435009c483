//! Authentication module
//!
//! Requests carry a bearer session token issued at Google sign-in. The
//! token is hashed and resolved against the session store; handlers read
//! the resulting context from request extensions.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use mailpilot_common::types::UserId;
use mailpilot_core::MailEngine;
use mailpilot_storage::repository::{CredentialRepository, MessageRepository, SessionRepository};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{error, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<MailEngine>,
    pub sessions: Arc<dyn SessionRepository>,
    pub credentials: Arc<dyn CredentialRepository>,
    pub messages: Arc<dyn MessageRepository>,
    /// Configured public base URL for tracking pixels; when unset the
    /// compose handler derives an origin from the request
    pub tracking_public_url: Option<String>,
}

/// Authenticated context extracted from the session token
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: UserId,
    pub email: String,
    /// Short-lived Google access token from sign-in, if the session still
    /// holds one
    pub access_token: Option<String>,
}

/// Extract a bearer token from the request
pub fn extract_bearer_token(req: &Request) -> Option<&str> {
    let auth = req.headers().get("authorization")?.to_str().ok()?;
    auth.strip_prefix("Bearer ")
}

/// Hash a session token for storage lookup
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = extract_bearer_token(&request).ok_or_else(|| {
        warn!(path = %request.uri().path(), "missing bearer token");
        StatusCode::UNAUTHORIZED
    })?;

    let session = state
        .sessions
        .resolve(&hash_token(token))
        .await
        .map_err(|e| {
            error!(error = %e, "session lookup failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    request.extensions_mut().insert(AuthContext {
        user_id: session.user_id,
        email: session.email,
        access_token: session.access_token,
    });

    Ok(next.run(request).await)
}
