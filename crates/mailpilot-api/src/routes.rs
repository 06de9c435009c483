//! API routes

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::{auth_middleware, AppState};
use crate::handlers::{health, messages, recurring, tracking};

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    // Health and tracking are public: the pixel endpoint is fetched by mail
    // clients with no session
    let health_routes = Router::new()
        .route("/", get(health::health))
        .with_state(state.clone());

    let tracking_routes = Router::new()
        .route("/open", get(tracking::track_open))
        .with_state(state.clone());

    let message_routes = Router::new()
        .route("/", post(messages::send_message))
        .route("/", get(messages::list_messages))
        .route("/:id", get(messages::get_message));

    let recurring_routes = Router::new()
        .route("/", post(recurring::create_recurring))
        .route("/", get(recurring::list_recurring))
        .route("/:id", get(recurring::get_recurring))
        .route("/:id", put(recurring::update_recurring))
        .route("/:id", delete(recurring::delete_recurring))
        .route("/:id/toggle", post(recurring::toggle_recurring))
        .route("/:id/run", post(recurring::run_recurring_now));

    let api_v1 = Router::new()
        .nest("/messages", message_routes)
        .nest("/recurring", recurring_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    Router::new()
        .nest("/health", health_routes)
        .nest("/track", tracking_routes)
        .nest("/api/v1", api_v1)
        .layer(TraceLayer::new_for_http())
}
