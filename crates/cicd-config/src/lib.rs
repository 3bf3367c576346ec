//! Configuration for the IoT CI/CD build orchestrator.
//!
//! This crate handles:
//! - The immutable service configuration
//! - KDL configuration files
//! - Delimited build argument lists

pub mod error;
pub mod service;

pub use error::{ConfigError, ConfigResult};
pub use service::{
    HEALTH_ENDPOINT, ServiceConfig, TlsKeyPair, parse_service_config, split_args,
};
