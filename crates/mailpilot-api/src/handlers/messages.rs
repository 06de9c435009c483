//! Message handlers: compose-and-send plus CRUD reads

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    Extension, Json,
};
use chrono::{DateTime, Utc};
use mailpilot_core::delivery::SendCredentials;
use mailpilot_core::ComposeRequest;
use mailpilot_storage::models::OutboundMessage;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{AppState, AuthContext};
use crate::handlers::{error_response, ErrorResponse};

/// Request body for composing a message
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub to: String,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub subject: String,
    pub content: String,
    /// Future instant defers the send to the sweep
    pub scheduled_at: Option<DateTime<Utc>>,
}

/// Query parameters for listing messages
#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Compose and send (or defer) a message
///
/// POST /api/v1/messages
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<OutboundMessage>), (StatusCode, Json<ErrorResponse>)> {
    let refresh_token = state
        .credentials
        .mail_credentials(auth.user_id)
        .await
        .map_err(error_response)?
        .map(|c| c.refresh_token);

    let credentials = SendCredentials {
        access_token: auth.access_token.clone(),
        refresh_token,
    };

    // Configured public URL wins over the request-derived origin
    let tracking_base = state
        .tracking_public_url
        .clone()
        .or_else(|| request_origin(&headers));

    let draft = ComposeRequest {
        from: auth.email.clone(),
        to: body.to,
        cc: body.cc,
        bcc: body.bcc,
        subject: body.subject,
        content: body.content,
        scheduled_at: body.scheduled_at,
    };

    let message = state
        .engine
        .compose_and_send(auth.user_id, draft, credentials, tracking_base.as_deref())
        .await
        .map_err(error_response)?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// List the caller's messages
///
/// GET /api/v1/messages
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<Vec<OutboundMessage>>, (StatusCode, Json<ErrorResponse>)> {
    let messages = state
        .messages
        .list_by_user(auth.user_id, query.limit, query.offset)
        .await
        .map_err(error_response)?;

    Ok(Json(messages))
}

/// Fetch one message
///
/// GET /api/v1/messages/:id
pub async fn get_message(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<OutboundMessage>, (StatusCode, Json<ErrorResponse>)> {
    let message = state
        .messages
        .get(id)
        .await
        .map_err(error_response)?
        .filter(|m| m.user_id == auth.user_id)
        .ok_or_else(|| {
            error_response(mailpilot_common::Error::NotFound(format!("Message {}", id)))
        })?;

    Ok(Json(message))
}

/// Derive a request origin from Host and X-Forwarded-Proto headers
pub fn request_origin(headers: &HeaderMap) -> Option<String> {
    let host = headers.get(header::HOST)?.to_str().ok()?;
    let proto = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    Some(format!("{}://{}", proto, host))
}
