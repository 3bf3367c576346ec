//! Application state.

use crate::Metrics;
use crate::services::pipeline::BuildPipeline;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<BuildPipeline>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(pipeline: BuildPipeline, metrics: Arc<Metrics>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            metrics,
        }
    }
}
