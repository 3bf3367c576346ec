//! Build outcomes.

/// The result class of one build request.
///
/// Drives both the HTTP status returned to the caller and the metric that
/// gets incremented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildOutcome {
    Success,
    RepositoryError,
    PublishError,
    ExecutionError,
}

impl BuildOutcome {
    /// HTTP status code for this outcome: 200, or 424 Failed Dependency.
    pub fn status_code(&self) -> u16 {
        if self.is_success() { 200 } else { 424 }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BuildOutcome::Success)
    }

    /// Stable label used in metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildOutcome::Success => "success",
            BuildOutcome::RepositoryError => "repository_error",
            BuildOutcome::PublishError => "publish_error",
            BuildOutcome::ExecutionError => "execution_error",
        }
    }
}

impl std::fmt::Display for BuildOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<T> From<&crate::Result<T>> for BuildOutcome {
    fn from(result: &crate::Result<T>) -> Self {
        match result {
            Ok(_) => BuildOutcome::Success,
            Err(err) => err.outcome(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(BuildOutcome::Success.status_code(), 200);
        assert_eq!(BuildOutcome::RepositoryError.status_code(), 424);
        assert_eq!(BuildOutcome::PublishError.status_code(), 424);
        assert_eq!(BuildOutcome::ExecutionError.status_code(), 424);
    }

    #[test]
    fn test_from_result() {
        let ok: crate::Result<()> = Ok(());
        assert_eq!(BuildOutcome::from(&ok), BuildOutcome::Success);

        let err: crate::Result<()> =
            Err(crate::PipelineError::BranchResolutionFailed("boom".to_string()));
        assert_eq!(BuildOutcome::from(&err), BuildOutcome::RepositoryError);
    }
}
