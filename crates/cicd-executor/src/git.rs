//! Git fetcher: clones the source repository into an ephemeral workspace.

use async_trait::async_trait;
use cicd_core::request::is_commit_id;
use cicd_core::{Fetcher, OutputSink, PipelineError, RepositoryCheckout, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

const REMOTE_BRANCH_PREFIX: &str = "refs/remotes/origin/";
const WORKSPACE_PREFIX: &str = "iot-cicd";

/// Fetches repositories with the `git` command line client.
#[derive(Debug, Clone)]
pub struct GitFetcher {
    git: PathBuf,
    /// Parent directory for temporary checkouts
    scratch_dir: Option<PathBuf>,
}

impl Default for GitFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl GitFetcher {
    pub fn new() -> Self {
        Self {
            git: PathBuf::from("git"),
            scratch_dir: None,
        }
    }

    /// Allocate checkouts below `dir` instead of the system temp dir.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.git);
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd
    }

    fn allocate(&self) -> std::io::Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);
        match &self.scratch_dir {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
    }

    /// Clone into the checkout's directory, streaming progress into `sink`.
    async fn clone_into(&self, checkout: &RepositoryCheckout, sink: &mut OutputSink) -> Result<()> {
        let url = checkout.source_url();
        info!(url = %url, path = %checkout.local_path().display(), "Cloning repository");

        let mut cmd = self.command();
        cmd.arg("clone")
            .arg("--progress")
            .arg("--")
            .arg(url)
            .arg(checkout.local_path());

        let exit = crate::process::stream_command(&mut cmd, sink)
            .await
            .map_err(|e| PipelineError::CloneFailed {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        if !exit.status.success() {
            warn!(url = %url, status = %exit.status, "Git clone failed");
            return Err(PipelineError::CloneFailed {
                url: url.to_string(),
                message: exit.describe(),
            });
        }

        info!(path = %checkout.local_path().display(), "Repository cloned successfully");
        Ok(())
    }

    /// Check out the requested revision. An empty revision leaves the clone
    /// on its default branch.
    async fn checkout_revision(&self, checkout: &RepositoryCheckout) -> Result<()> {
        let revision = checkout.requested_revision();
        if revision.is_empty() {
            return Ok(());
        }

        let failed = |message: String| PipelineError::CheckoutFailed {
            revision: revision.to_string(),
            message,
        };

        if !is_commit_id(revision) {
            return Err(failed("not a commit identifier".to_string()));
        }

        debug!(revision = %revision, "Checking out commit");
        let output = self
            .command()
            .args(["checkout", "--quiet", "--detach", revision])
            .current_dir(checkout.local_path())
            .output()
            .await
            .map_err(|e| failed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(failed(stderr.trim().to_string()));
        }

        Ok(())
    }

    /// Name of a remote branch whose tip is the checked-out commit; empty
    /// when no branch points at it.
    pub async fn resolve_branch(&self, repo: &Path) -> Result<String> {
        let output = self
            .command()
            .args([
                "for-each-ref",
                "--points-at",
                "HEAD",
                "--format=%(refname)",
                REMOTE_BRANCH_PREFIX,
            ])
            .current_dir(repo)
            .output()
            .await
            .map_err(|e| PipelineError::BranchResolutionFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::BranchResolutionFailed(
                stderr.trim().to_string(),
            ));
        }

        let refs = String::from_utf8_lossy(&output.stdout);
        Ok(branch_from_refs(&refs).unwrap_or_default().to_string())
    }
}

/// Pick the first remote branch out of a list of reference names, skipping
/// the symbolic `HEAD`.
fn branch_from_refs(refs: &str) -> Option<&str> {
    refs.lines()
        .filter_map(|name| name.trim().strip_prefix(REMOTE_BRANCH_PREFIX))
        .find(|branch| !branch.is_empty() && *branch != "HEAD")
}

#[async_trait]
impl Fetcher for GitFetcher {
    async fn prepare(
        &self,
        source_url: &str,
        revision: &str,
        sink: &mut OutputSink,
    ) -> Result<RepositoryCheckout> {
        let dir = self
            .allocate()
            .map_err(PipelineError::WorkspaceAllocationFailed)?;
        let mut checkout = RepositoryCheckout::new(source_url, revision, dir);

        self.clone_into(&checkout, sink).await?;
        self.checkout_revision(&checkout).await?;

        let branch = self.resolve_branch(checkout.local_path()).await?;
        info!(
            revision = %checkout.requested_revision(),
            branch = %branch,
            "Repository prepared"
        );
        checkout.set_resolved_branch(branch);

        Ok(checkout)
    }
}
