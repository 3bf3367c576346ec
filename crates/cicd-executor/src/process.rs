//! Streaming of child process output.

use bytes::Bytes;
use cicd_core::OutputSink;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

const READ_BUF_SIZE: usize = 8 * 1024;
const TAIL_LIMIT: usize = 4 * 1024;

/// How a streamed child process ended.
#[derive(Debug)]
pub(crate) struct StreamedExit {
    pub status: ExitStatus,
    tail: Vec<u8>,
}

impl StreamedExit {
    /// Last non-empty line of combined output, used as a failure cause.
    pub fn last_line(&self) -> String {
        let text = String::from_utf8_lossy(&self.tail);
        text.split(['\n', '\r'])
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .unwrap_or_default()
            .to_string()
    }

    /// Failure cause built from the exit status and the last output line.
    pub fn describe(&self) -> String {
        let line = self.last_line();
        if line.is_empty() {
            self.status.to_string()
        } else {
            format!("{}: {}", self.status, line)
        }
    }
}

/// Spawn `cmd` and forward everything it writes to stdout or stderr into
/// `sink`, chunk by chunk in arrival order, until it exits.
///
/// Returns the spawn error if the process cannot be started.
pub(crate) async fn stream_command(
    cmd: &mut Command,
    sink: &mut OutputSink,
) -> std::io::Result<StreamedExit> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    let mut out_buf = vec![0u8; READ_BUF_SIZE];
    let mut err_buf = vec![0u8; READ_BUF_SIZE];
    let mut tail = Vec::new();

    while stdout.is_some() || stderr.is_some() {
        tokio::select! {
            chunk = read_chunk(&mut stdout, &mut out_buf), if stdout.is_some() => match chunk {
                Some(chunk) => forward(chunk, sink, &mut tail).await,
                None => stdout = None,
            },
            chunk = read_chunk(&mut stderr, &mut err_buf), if stderr.is_some() => match chunk {
                Some(chunk) => forward(chunk, sink, &mut tail).await,
                None => stderr = None,
            },
        }
    }

    let status = child.wait().await?;
    Ok(StreamedExit { status, tail })
}

/// Read one chunk; `None` at end of stream or on a read error.
async fn read_chunk<R>(reader: &mut Option<R>, buf: &mut [u8]) -> Option<Bytes>
where
    R: AsyncRead + Unpin,
{
    let reader = reader.as_mut()?;
    match reader.read(buf).await {
        Ok(0) | Err(_) => None,
        Ok(n) => Some(Bytes::copy_from_slice(&buf[..n])),
    }
}

async fn forward(chunk: Bytes, sink: &mut OutputSink, tail: &mut Vec<u8>) {
    tail.extend_from_slice(&chunk);
    if tail.len() > TAIL_LIMIT {
        let excess = tail.len() - TAIL_LIMIT;
        tail.drain(..excess);
    }
    sink.write(chunk).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(mut rx: tokio::sync::mpsc::Receiver<Bytes>) -> String {
        let mut out = Vec::new();
        while let Some(chunk) = rx.recv().await {
            out.extend_from_slice(&chunk);
        }
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn test_streams_both_outputs() {
        let (mut sink, rx) = OutputSink::channel(16);
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo out; sleep 0.1; echo err >&2; sleep 0.1; echo done"]);

        let exit = stream_command(&mut cmd, &mut sink).await.unwrap();
        drop(sink);

        assert!(exit.status.success());
        assert_eq!(collect(rx).await, "out\nerr\ndone\n");
        assert_eq!(exit.last_line(), "done");
    }

    #[tokio::test]
    async fn test_failure_description() {
        let (mut sink, _rx) = OutputSink::channel(16);
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo 'fatal: repository not found' >&2; exit 128"]);

        let exit = stream_command(&mut cmd, &mut sink).await.unwrap();
        assert!(!exit.status.success());
        let cause = exit.describe();
        assert!(cause.contains("128"));
        assert!(cause.ends_with("fatal: repository not found"));
    }

    #[tokio::test]
    async fn test_spawn_error() {
        let (mut sink, _rx) = OutputSink::channel(1);
        let mut cmd = Command::new("/nonexistent/definitely-not-a-command");
        let err = stream_command(&mut cmd, &mut sink).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
