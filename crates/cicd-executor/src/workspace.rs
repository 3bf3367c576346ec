//! Publishing of a checkout at one well-known path.
//!
//! Downstream tooling (for example a container bind mount) is configured once
//! against a fixed path. The publisher points that path, a symlink, at the
//! checkout of the build currently running.

use cicd_core::{PipelineError, Result};
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Owns the well-known published path and serialises access to it.
#[derive(Debug)]
pub struct WorkspacePublisher {
    link: PathBuf,
    lock: Mutex<()>,
}

impl WorkspacePublisher {
    pub fn new(link: impl Into<PathBuf>) -> Self {
        Self {
            link: link.into(),
            lock: Mutex::new(()),
        }
    }

    /// The well-known path downstream tooling reads from.
    pub fn path(&self) -> &Path {
        &self.link
    }

    /// Wait for exclusive use of the published path.
    ///
    /// The lease must be held from publishing until the build finished and
    /// the link was removed again.
    pub async fn lease(&self) -> PublishLease<'_> {
        let guard = self.lock.lock().await;
        debug!(path = %self.link.display(), "Acquired publish lease");
        PublishLease {
            publisher: self,
            _guard: guard,
            unpublished: false,
        }
    }

    /// Remove the published path if present. Best effort: failures are
    /// logged, and a missing path is not an error.
    pub async fn unpublish(&self) {
        match tokio::fs::remove_file(&self.link).await {
            Ok(()) => debug!(path = %self.link.display(), "Removed published workspace"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %self.link.display(), error = %e, "Failed to remove published workspace")
            }
        }
    }
}

/// Exclusive right to publish into the well-known path.
#[derive(Debug)]
pub struct PublishLease<'a> {
    publisher: &'a WorkspacePublisher,
    _guard: MutexGuard<'a, ()>,
    unpublished: bool,
}

impl PublishLease<'_> {
    pub fn path(&self) -> &Path {
        self.publisher.path()
    }

    /// Point the well-known path at `target`.
    ///
    /// Fails if anything already exists at the path.
    pub async fn publish(&self, target: &Path) -> Result<()> {
        let link = self.publisher.path();
        tokio::fs::symlink(target, link)
            .await
            .map_err(|source| PipelineError::PublishFailed {
                path: link.to_path_buf(),
                source,
            })?;
        info!(path = %link.display(), target = %target.display(), "Published workspace");
        Ok(())
    }

    /// Remove the published path and give up the lease.
    pub async fn unpublish(mut self) {
        self.publisher.unpublish().await;
        self.unpublished = true;
    }
}

impl Drop for PublishLease<'_> {
    fn drop(&mut self) {
        if self.unpublished {
            return;
        }
        let link = self.publisher.path();
        if let Err(e) = std::fs::remove_file(link) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %link.display(), error = %e, "Failed to remove published workspace");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_publish_and_unpublish() {
        let root = tempfile::tempdir().unwrap();
        let checkout = tempfile::tempdir().unwrap();
        std::fs::write(checkout.path().join("build.sh"), "#!/bin/sh\n").unwrap();
        let publisher = WorkspacePublisher::new(root.path().join("iot-cicd"));

        let lease = publisher.lease().await;
        lease.publish(checkout.path()).await.unwrap();
        assert!(publisher.path().join("build.sh").exists());
        assert_eq!(
            std::fs::read_link(publisher.path()).unwrap(),
            checkout.path()
        );

        lease.unpublish().await;
        assert!(std::fs::symlink_metadata(publisher.path()).is_err());
    }

    #[tokio::test]
    async fn test_unpublish_twice_is_harmless() {
        let root = tempfile::tempdir().unwrap();
        let publisher = WorkspacePublisher::new(root.path().join("iot-cicd"));

        publisher.unpublish().await;
        publisher.unpublish().await;
        assert!(std::fs::symlink_metadata(publisher.path()).is_err());
    }

    #[tokio::test]
    async fn test_publish_fails_when_path_taken() {
        let root = tempfile::tempdir().unwrap();
        let checkout = tempfile::tempdir().unwrap();
        let link = root.path().join("iot-cicd");
        std::fs::write(&link, "stale").unwrap();
        let publisher = WorkspacePublisher::new(&link);

        let lease = publisher.lease().await;
        let err = lease.publish(checkout.path()).await.unwrap_err();
        assert!(matches!(err, PipelineError::PublishFailed { .. }));

        // The failed request still cleans up, so the next one can publish.
        lease.unpublish().await;
        let lease = publisher.lease().await;
        lease.publish(checkout.path()).await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_lease_removes_link() {
        let root = tempfile::tempdir().unwrap();
        let checkout = tempfile::tempdir().unwrap();
        let publisher = WorkspacePublisher::new(root.path().join("iot-cicd"));

        {
            let lease = publisher.lease().await;
            lease.publish(checkout.path()).await.unwrap();
        }
        assert!(std::fs::symlink_metadata(publisher.path()).is_err());
    }

    #[tokio::test]
    async fn test_lease_is_exclusive() {
        let root = tempfile::tempdir().unwrap();
        let publisher = Arc::new(WorkspacePublisher::new(root.path().join("iot-cicd")));

        let lease = publisher.lease().await;
        let contender = {
            let publisher = publisher.clone();
            tokio::spawn(async move {
                let _lease = publisher.lease().await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        lease.unpublish().await;
        tokio::time::timeout(Duration::from_secs(5), contender)
            .await
            .unwrap()
            .unwrap();
    }
}
