//! HTTP routes.

pub mod build;
pub mod health;
pub mod metrics;

use crate::AppState;
use axum::Router;

/// Build the service router: the build endpoint mounted at `build_endpoint`,
/// plus the metrics endpoint when `metrics_endpoint` is set.
pub fn router(state: AppState, build_endpoint: &str, metrics_endpoint: Option<&str>) -> Router {
    let mut router = Router::new()
        .merge(build::router(build_endpoint))
        .merge(health::router());

    if let Some(path) = metrics_endpoint {
        router = router.merge(metrics::router(path));
    }

    router.with_state(state)
}
