//! Recurring mail handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use mailpilot_storage::models::{CreateRecurringMail, RecurringMail, UpdateRecurringMail};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{AppState, AuthContext};
use crate::handlers::{error_response, ErrorResponse};

/// Request body for creating a recurring mail
#[derive(Debug, Deserialize)]
pub struct CreateRecurringRequest {
    pub name: String,
    /// Defaults to the signed-in account's address
    pub from: Option<String>,
    pub recipients: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    pub subject: String,
    pub content: String,
    /// Weekdays 0-6, Sunday = 0
    pub days_of_week: Vec<u32>,
    /// "HH:MM", 24h
    pub send_time: String,
    /// IANA timezone name
    pub timezone: String,
}

/// Request body for toggling a recurring mail
#[derive(Debug, Deserialize)]
pub struct ToggleRecurringRequest {
    pub active: bool,
}

/// Create a recurring mail
///
/// POST /api/v1/recurring
pub async fn create_recurring(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<CreateRecurringRequest>,
) -> Result<(StatusCode, Json<RecurringMail>), (StatusCode, Json<ErrorResponse>)> {
    let input = CreateRecurringMail {
        user_id: auth.user_id,
        name: body.name,
        from_address: body.from.unwrap_or_else(|| auth.email.clone()),
        recipients: body.recipients,
        cc: body.cc,
        bcc: body.bcc,
        subject: body.subject,
        html_body: body.content,
        days_of_week: body.days_of_week,
        send_time: body.send_time,
        timezone: body.timezone,
    };

    let mail = state
        .engine
        .create_recurring_mail(input)
        .await
        .map_err(error_response)?;

    Ok((StatusCode::CREATED, Json(mail)))
}

/// List the caller's recurring mails
///
/// GET /api/v1/recurring
pub async fn list_recurring(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<RecurringMail>>, (StatusCode, Json<ErrorResponse>)> {
    let mails = state
        .engine
        .list_recurring_mails(auth.user_id)
        .await
        .map_err(error_response)?;

    Ok(Json(mails))
}

/// Fetch one recurring mail
///
/// GET /api/v1/recurring/:id
pub async fn get_recurring(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<RecurringMail>, (StatusCode, Json<ErrorResponse>)> {
    let mail = state
        .engine
        .get_recurring_mail(auth.user_id, id)
        .await
        .map_err(error_response)?;

    Ok(Json(mail))
}

/// Edit a recurring mail; the next run is recomputed from now
///
/// PUT /api/v1/recurring/:id
pub async fn update_recurring(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(changes): Json<UpdateRecurringMail>,
) -> Result<Json<RecurringMail>, (StatusCode, Json<ErrorResponse>)> {
    let mail = state
        .engine
        .update_recurring_mail(auth.user_id, id, changes)
        .await
        .map_err(error_response)?;

    Ok(Json(mail))
}

/// Activate or deactivate a recurring mail
///
/// POST /api/v1/recurring/:id/toggle
pub async fn toggle_recurring(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(body): Json<ToggleRecurringRequest>,
) -> Result<Json<RecurringMail>, (StatusCode, Json<ErrorResponse>)> {
    let mail = state
        .engine
        .toggle_recurring_mail(auth.user_id, id, body.active)
        .await
        .map_err(error_response)?;

    Ok(Json(mail))
}

/// Run a recurring mail immediately, regardless of its schedule
///
/// POST /api/v1/recurring/:id/run
pub async fn run_recurring_now(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<RecurringMail>, (StatusCode, Json<ErrorResponse>)> {
    let mail = state
        .engine
        .run_recurring_now(auth.user_id, id)
        .await
        .map_err(error_response)?;

    Ok(Json(mail))
}

/// Delete a recurring mail
///
/// DELETE /api/v1/recurring/:id
pub async fn delete_recurring(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    state
        .engine
        .delete_recurring_mail(auth.user_id, id)
        .await
        .map_err(error_response)?;

    Ok(StatusCode::NO_CONTENT)
}
