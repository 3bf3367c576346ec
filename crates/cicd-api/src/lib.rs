//! HTTP build server for the IoT CI/CD orchestrator.
//!
//! Provides the build endpoint, metrics and health endpoints, and the
//! service host that owns the listener.

pub mod error;
pub mod metrics;
pub mod routes;
pub mod server;
pub mod services;
pub mod state;

pub use metrics::Metrics;
pub use server::{HostError, ServiceHost};
pub use services::pipeline::BuildPipeline;
pub use state::AppState;
