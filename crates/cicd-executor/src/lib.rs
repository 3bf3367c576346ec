//! Build execution backends for the IoT CI/CD orchestrator.
//!
//! Provides:
//! - A git fetcher that clones into ephemeral workspaces
//! - The publisher that exposes a checkout at a well-known path
//! - The build runner that streams script output

pub mod git;
mod process;
pub mod script;
pub mod workspace;

pub use git::GitFetcher;
pub use script::BuildRunner;
pub use workspace::{PublishLease, WorkspacePublisher};
