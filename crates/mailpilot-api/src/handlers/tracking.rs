//! Open-tracking pixel endpoint
//!
//! Public and unauthenticated. The response is always the same 1x1
//! transparent GIF with no-store caching, whatever happens to the tracking
//! update - a broken id must not change what the mail client sees.

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AppState;

/// 1x1 transparent GIF
const PIXEL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

#[derive(Debug, Deserialize)]
pub struct TrackOpenQuery {
    pub mid: Option<String>,
}

/// GET /track/open?mid=<message id>
pub async fn track_open(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TrackOpenQuery>,
) -> impl IntoResponse {
    if let Some(id) = query.mid.as_deref().and_then(|m| Uuid::parse_str(m).ok()) {
        state.engine.track_open(id).await;
    }

    (
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, "no-store, max-age=0"),
        ],
        PIXEL_GIF,
    )
}
