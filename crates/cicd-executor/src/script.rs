//! Build script execution with streamed output.

use cicd_core::{OutputSink, PipelineError, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{info, warn};

const MASTER_BRANCH: &str = "master";

/// Runs the configured build script against a published workspace.
#[derive(Debug, Clone)]
pub struct BuildRunner {
    /// Script path, relative to the workspace root
    script: PathBuf,
    default_args: Vec<String>,
    master_args: Vec<String>,
}

impl BuildRunner {
    pub fn new(
        script: impl Into<PathBuf>,
        default_args: Vec<String>,
        master_args: Vec<String>,
    ) -> Self {
        Self {
            script: script.into(),
            default_args,
            master_args,
        }
    }

    /// Arguments for a build of `branch`: the master list on master, the
    /// default list everywhere else.
    pub fn args_for(&self, branch: &str) -> &[String] {
        if branch == MASTER_BRANCH {
            &self.master_args
        } else {
            &self.default_args
        }
    }

    /// Run the build script inside `workspace` for a checkout of `branch`.
    pub async fn run(&self, workspace: &Path, branch: &str, sink: &mut OutputSink) -> Result<()> {
        let script = workspace.join(&self.script);
        run_script(&script, self.args_for(branch), workspace, sink).await
    }
}

/// Execute `script` with `args`, forwarding its combined output into `sink`
/// as it is produced.
pub async fn run_script(
    script: &Path,
    args: &[String],
    working_dir: &Path,
    sink: &mut OutputSink,
) -> Result<()> {
    info!(script = %script.display(), args = ?args, "Running build script");

    let mut cmd = Command::new(script);
    cmd.args(args).current_dir(working_dir);

    let exit = crate::process::stream_command(&mut cmd, sink)
        .await
        .map_err(|source| PipelineError::ExecutionSpawnFailed {
            script: script.to_path_buf(),
            source,
        })?;

    if !exit.status.success() {
        warn!(script = %script.display(), status = %exit.status, "Build script failed");
        return Err(PipelineError::ExecutionNonZeroExit {
            script: script.to_path_buf(),
            status: exit.status,
        });
    }

    info!(script = %script.display(), "Build script finished");
    Ok(())
}
