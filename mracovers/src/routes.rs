//! Axum routes serving stored covers.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::get,
};

use crate::cache::CoverStore;

/// Router exposing `GET /covers/{key}`.
pub fn cover_routes(store: Arc<CoverStore>) -> Router {
    Router::new()
        .route("/covers/{key}", get(serve_cover))
        .with_state(store)
}

async fn serve_cover(
    State(store): State<Arc<CoverStore>>,
    Path(key): Path<String>,
) -> impl IntoResponse {
    let Some((path, mime)) = store.get(&key) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, mime)], bytes).into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}
