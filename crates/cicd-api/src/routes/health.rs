//! Health check endpoint.

use axum::Json;
use axum::Router;
use axum::routing::get;
use cicd_config::HEALTH_ENDPOINT;
use serde_json::{Value, json};

pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route(HEALTH_ENDPOINT, get(health))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
