//! Build requests.

/// Path segment that, when received as the revision, means "no revision".
const MOUNT_SEGMENT: &str = "build";

/// A request to build one revision of the configured repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildRequest {
    revision: String,
}

impl BuildRequest {
    /// Build a request from the path segment captured after the build mount
    /// point. An empty segment, or the bare mount segment itself, selects the
    /// default branch.
    pub fn new(revision: impl Into<String>) -> Self {
        let revision = revision.into();
        let revision = revision.trim_matches('/');
        let revision = if revision == MOUNT_SEGMENT {
            ""
        } else {
            revision
        };
        Self {
            revision: revision.to_string(),
        }
    }

    /// Request for the default branch.
    pub fn default_branch() -> Self {
        Self::default()
    }

    /// The commit identifier to check out; empty for the default branch.
    pub fn revision(&self) -> &str {
        &self.revision
    }

    pub fn wants_default_branch(&self) -> bool {
        self.revision.is_empty()
    }
}

/// Whether `revision` looks like a (possibly abbreviated) commit identifier.
pub fn is_commit_id(revision: &str) -> bool {
    (4..=64).contains(&revision.len()) && revision.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_from_segment() {
        let req = BuildRequest::new("111ba9ac487bb5696975fc45c8618277b8acdf13");
        assert_eq!(req.revision(), "111ba9ac487bb5696975fc45c8618277b8acdf13");
        assert!(!req.wants_default_branch());
    }

    #[test]
    fn test_empty_and_mount_segment_mean_default_branch() {
        assert!(BuildRequest::new("").wants_default_branch());
        assert!(BuildRequest::new("/").wants_default_branch());
        assert!(BuildRequest::new("build").wants_default_branch());
        assert!(BuildRequest::new("build/").wants_default_branch());
        assert_eq!(BuildRequest::default_branch(), BuildRequest::new(""));
    }

    #[test]
    fn test_is_commit_id() {
        assert!(is_commit_id("4c5916825d3e8d63d6cc866e74ce22a5b3ee384a"));
        assert!(is_commit_id("4c59168"));
        assert!(!is_commit_id("abc"));
        assert!(!is_commit_id("--upload-pack=evil"));
        assert!(!is_commit_id("master"));
    }
}
