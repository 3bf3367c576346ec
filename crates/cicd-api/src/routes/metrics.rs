//! Metrics exposition endpoint.

use axum::Router;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tracing::debug;

use crate::AppState;
use crate::error::ApiError;

pub fn router(path: &str) -> Router<AppState> {
    debug!(path = %path, "Registering metrics handler");
    let path = match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };
    Router::new().route(path, get(metrics))
}

async fn metrics(State(state): State<AppState>) -> Result<Response, ApiError> {
    let body = state
        .metrics
        .render()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(([(CONTENT_TYPE, state.metrics.content_type())], body).into_response())
}
