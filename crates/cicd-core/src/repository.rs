//! Repository checkouts and the fetcher seam.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::{OutputSink, Result};

/// One ephemeral, exclusive clone on local storage.
///
/// The clone directory lives until [`RepositoryCheckout::release`] is called,
/// or until the checkout is dropped, whichever comes first. Releasing twice is
/// a no-op.
#[derive(Debug)]
pub struct RepositoryCheckout {
    source_url: String,
    local_path: PathBuf,
    requested_revision: String,
    resolved_branch: String,
    dir: Option<TempDir>,
}

impl RepositoryCheckout {
    /// Take ownership of a freshly allocated workspace directory.
    pub fn new(source_url: impl Into<String>, revision: impl Into<String>, dir: TempDir) -> Self {
        Self {
            source_url: source_url.into(),
            local_path: dir.path().to_path_buf(),
            requested_revision: revision.into(),
            resolved_branch: String::new(),
            dir: Some(dir),
        }
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn requested_revision(&self) -> &str {
        &self.requested_revision
    }

    /// Name of the remote branch pointing at the checked-out commit, or empty
    /// when the commit is not the tip of any known branch.
    pub fn resolved_branch(&self) -> &str {
        &self.resolved_branch
    }

    pub fn set_resolved_branch(&mut self, branch: impl Into<String>) {
        self.resolved_branch = branch.into();
    }

    pub fn is_released(&self) -> bool {
        self.dir.is_none()
    }

    /// Remove the clone from storage. Failures are logged, never returned.
    pub fn release(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        debug!(path = %self.local_path.display(), "Removing checkout");
        if let Err(e) = dir.close() {
            warn!(path = %self.local_path.display(), error = %e, "Failed to remove checkout");
        }
    }
}

impl Drop for RepositoryCheckout {
    fn drop(&mut self) {
        self.release();
    }
}

/// Prepares a checkout of a source repository for one build.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Clone `source_url`, check out `revision` (the default branch when
    /// empty), and resolve the branch the revision belongs to. Clone progress
    /// is streamed into `sink`.
    ///
    /// On failure any partially created workspace has already been removed.
    async fn prepare(
        &self,
        source_url: &str,
        revision: &str,
        sink: &mut OutputSink,
    ) -> Result<RepositoryCheckout>;
}
