//! Build pipeline: fetch, publish, execute, clean up.

use cicd_config::ServiceConfig;
use cicd_core::{BuildRequest, Fetcher, OutputSink, RepositoryCheckout, Result};
use cicd_executor::{BuildRunner, GitFetcher, PublishLease, WorkspacePublisher};
use std::sync::Arc;
use tracing::{debug, info};

/// Stage of one build request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Received,
    Fetching,
    Publishing,
    Executing,
    Finalized,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStage::Received => write!(f, "received"),
            PipelineStage::Fetching => write!(f, "fetching"),
            PipelineStage::Publishing => write!(f, "publishing"),
            PipelineStage::Executing => write!(f, "executing"),
            PipelineStage::Finalized => write!(f, "finalized"),
        }
    }
}

/// Drives one build request through its stages, strictly in order.
pub struct BuildPipeline {
    repository_url: String,
    fetcher: Arc<dyn Fetcher>,
    publisher: Arc<WorkspacePublisher>,
    runner: BuildRunner,
}

impl BuildPipeline {
    pub fn new(
        repository_url: impl Into<String>,
        fetcher: Arc<dyn Fetcher>,
        publisher: Arc<WorkspacePublisher>,
        runner: BuildRunner,
    ) -> Self {
        Self {
            repository_url: repository_url.into(),
            fetcher,
            publisher,
            runner,
        }
    }

    /// Pipeline backed by git and the configured script.
    pub fn from_config(config: &ServiceConfig) -> Self {
        let mut fetcher = GitFetcher::new();
        if let Some(dir) = &config.scratch_dir {
            fetcher = fetcher.with_scratch_dir(dir);
        }
        let runner = BuildRunner::new(
            &config.build_script,
            config.build_args.clone(),
            config.master_args.clone(),
        );

        Self::new(
            &config.repository_url,
            Arc::new(fetcher),
            Arc::new(WorkspacePublisher::new(&config.publish_path)),
            runner,
        )
    }

    pub fn publisher(&self) -> &WorkspacePublisher {
        &self.publisher
    }

    /// Run the whole pipeline for `request`, streaming clone progress and
    /// build output into `sink`.
    ///
    /// Clone progress is held in the sink until the build script writes its
    /// first byte; a build that fails before then leaves the transcript held.
    /// The checkout is released and the published link removed before this
    /// returns, whichever stage failed.
    pub async fn execute(&self, request: &BuildRequest, sink: &mut OutputSink) -> Result<()> {
        let mut stage = PipelineStage::Received;
        sink.hold();

        advance(&mut stage, PipelineStage::Fetching);
        // On failure the fetcher has already released its workspace, and no
        // link was published by this request.
        let mut checkout = self
            .fetcher
            .prepare(&self.repository_url, request.revision(), sink)
            .await?;

        advance(&mut stage, PipelineStage::Publishing);
        let lease = self.publisher.lease().await;
        let result = self.publish_and_run(&lease, &checkout, &mut stage, sink).await;

        checkout.release();
        lease.unpublish().await;
        advance(&mut stage, PipelineStage::Finalized);

        result
    }

    async fn publish_and_run(
        &self,
        lease: &PublishLease<'_>,
        checkout: &RepositoryCheckout,
        stage: &mut PipelineStage,
        sink: &mut OutputSink,
    ) -> Result<()> {
        lease.publish(checkout.local_path()).await?;

        advance(stage, PipelineStage::Executing);
        info!(
            branch = %checkout.resolved_branch(),
            workspace = %lease.path().display(),
            "Starting build"
        );
        sink.release_on_output();
        self.runner
            .run(lease.path(), checkout.resolved_branch(), sink)
            .await
    }
}

fn advance(stage: &mut PipelineStage, next: PipelineStage) {
    debug!(from = %stage, to = %next, "Pipeline stage");
    *stage = next;
}
