//! Error types for the build pipeline.

use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

use crate::BuildOutcome;

/// A failure in one stage of a build request.
///
/// Every variant is request-scoped: it ends the current pipeline and is
/// reported to the caller verbatim, but never affects the service itself.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("error creating workspace directory: {0}")]
    WorkspaceAllocationFailed(#[source] std::io::Error),

    #[error("error cloning repository {url}: {message}")]
    CloneFailed { url: String, message: String },

    #[error("error checking out commit {revision}: {message}")]
    CheckoutFailed { revision: String, message: String },

    #[error("error determining branch name: {0}")]
    BranchResolutionFailed(String),

    #[error("error creating symlink {}: {source}", path.display())]
    PublishFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error executing command {}: {source}", script.display())]
    ExecutionSpawnFailed {
        script: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error executing command {}: {status}", script.display())]
    ExecutionNonZeroExit { script: PathBuf, status: ExitStatus },
}

impl PipelineError {
    /// The outcome class this failure is accounted under.
    pub fn outcome(&self) -> BuildOutcome {
        match self {
            PipelineError::WorkspaceAllocationFailed(_)
            | PipelineError::CloneFailed { .. }
            | PipelineError::CheckoutFailed { .. }
            | PipelineError::BranchResolutionFailed(_) => BuildOutcome::RepositoryError,
            PipelineError::PublishFailed { .. } => BuildOutcome::PublishError,
            PipelineError::ExecutionSpawnFailed { .. }
            | PipelineError::ExecutionNonZeroExit { .. } => BuildOutcome::ExecutionError,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_outcome_mapping() {
        let clone = PipelineError::CloneFailed {
            url: "https://example.invalid/repo".to_string(),
            message: "fatal: unable to access".to_string(),
        };
        assert_eq!(clone.outcome(), BuildOutcome::RepositoryError);

        let publish = PipelineError::PublishFailed {
            path: PathBuf::from("/tmp/iot-cicd"),
            source: io::Error::from(io::ErrorKind::AlreadyExists),
        };
        assert_eq!(publish.outcome(), BuildOutcome::PublishError);

        let spawn = PipelineError::ExecutionSpawnFailed {
            script: PathBuf::from("/tmp/iot-cicd/Device/build.sh"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert_eq!(spawn.outcome(), BuildOutcome::ExecutionError);
    }

    #[test]
    fn test_spawn_failure_message_keeps_os_cause() {
        let err = PipelineError::ExecutionSpawnFailed {
            script: PathBuf::from("/tmp/iot-cicd/build.sh"),
            source: io::Error::from_raw_os_error(2),
        };
        let message = err.to_string();
        assert!(message.starts_with("error executing command /tmp/iot-cicd/build.sh: "));
        assert!(message.contains("No such file or directory"));
    }
}
