//! Core domain types for the IoT CI/CD build orchestrator.
//!
//! This crate contains:
//! - Build identifiers and requests
//! - Repository checkouts and the fetcher trait
//! - Build outcomes and the pipeline error taxonomy
//! - The streaming output sink shared by clone and build stages

pub mod error;
pub mod id;
pub mod outcome;
pub mod repository;
pub mod request;
pub mod sink;

pub use error::{PipelineError, Result};
pub use id::BuildId;
pub use outcome::BuildOutcome;
pub use repository::{Fetcher, RepositoryCheckout};
pub use request::BuildRequest;
pub use sink::OutputSink;
