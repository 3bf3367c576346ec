//! Streaming output sink.
//!
//! Clone progress and build output are appended, in sequence, to one
//! transcript that is streamed to the HTTP caller. Each `write` hands one
//! chunk to the response body, which sends it as its own frame.
//!
//! A sink can hold its output back: held chunks are buffered until the
//! build itself produces output, so a failure before that point can still be
//! answered with a failure status and the buffered transcript.

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Streaming,
    Holding,
    /// Holding until the next write, which flushes the buffer first.
    ReleaseOnWrite,
}

/// Append-only transcript sink with a write-then-flush contract.
///
/// Writing takes `&mut self`, so two producers can never write to the same
/// sink concurrently.
#[derive(Debug)]
pub struct OutputSink {
    tx: mpsc::Sender<Bytes>,
    mode: Mode,
    held: BytesMut,
    written: usize,
    detached: bool,
}

impl OutputSink {
    /// Create a streaming sink and the receiving end that feeds the response
    /// body.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                mode: Mode::Streaming,
                held: BytesMut::new(),
                written: 0,
                detached: false,
            },
            rx,
        )
    }

    /// Buffer further writes instead of handing them to the transport.
    ///
    /// Has no effect once output has started streaming.
    pub fn hold(&mut self) {
        if self.mode == Mode::Streaming && self.has_output() {
            return;
        }
        self.mode = Mode::Holding;
    }

    /// Keep holding, but let the next write flush the buffer and switch the
    /// sink to streaming.
    pub fn release_on_output(&mut self) {
        if self.mode == Mode::Holding {
            self.mode = Mode::ReleaseOnWrite;
        }
    }

    /// Whether output is still being held back.
    pub fn is_holding(&self) -> bool {
        self.mode != Mode::Streaming
    }

    /// Take the held transcript, or `None` if output already streamed.
    ///
    /// The sink streams from here on.
    pub fn take_held(&mut self) -> Option<Bytes> {
        if !self.is_holding() {
            return None;
        }
        self.mode = Mode::Streaming;
        Some(self.held.split().freeze())
    }

    /// Append a chunk to the transcript.
    ///
    /// Once the receiver is gone (the caller disconnected) output is counted
    /// but discarded; producers keep running to completion.
    pub async fn write(&mut self, chunk: impl Into<Bytes>) {
        let chunk = chunk.into();
        if chunk.is_empty() {
            return;
        }
        self.written += chunk.len();
        match self.mode {
            Mode::Holding => {
                self.held.extend_from_slice(&chunk);
                return;
            }
            Mode::ReleaseOnWrite => {
                self.mode = Mode::Streaming;
                if !self.held.is_empty() {
                    let held = self.held.split().freeze();
                    self.send(held).await;
                }
            }
            Mode::Streaming => {}
        }
        self.send(chunk).await;
    }

    async fn send(&mut self, chunk: Bytes) {
        if self.detached {
            return;
        }
        if self.tx.send(chunk).await.is_err() {
            debug!("Output receiver dropped, discarding further output");
            self.detached = true;
        }
    }

    /// Whether any bytes have been written to the transcript.
    pub fn has_output(&self) -> bool {
        self.written > 0
    }

    /// Total number of bytes written so far.
    pub fn bytes_written(&self) -> usize {
        self.written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_chunks_arrive_in_order() {
        let (mut sink, mut rx) = OutputSink::channel(8);
        sink.write("Cloning into '/tmp/x'...\n").await;
        sink.write(Bytes::from_static(b"hello world")).await;
        drop(sink);

        assert_eq!(rx.recv().await.unwrap(), "Cloning into '/tmp/x'...\n");
        assert_eq!(rx.recv().await.unwrap(), "hello world");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_chunks_are_skipped() {
        let (mut sink, mut rx) = OutputSink::channel(8);
        sink.write(Vec::new()).await;
        assert!(!sink.has_output());
        drop(sink);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_write_after_disconnect_does_not_fail() {
        let (mut sink, rx) = OutputSink::channel(1);
        drop(rx);
        sink.write("first").await;
        sink.write("second").await;
        assert!(sink.has_output());
        assert_eq!(sink.bytes_written(), 11);
    }

    #[tokio::test]
    async fn test_held_output_is_flushed_by_next_write() {
        let (mut sink, mut rx) = OutputSink::channel(8);
        sink.hold();
        sink.write("Cloning into '/tmp/x'...\n").await;
        sink.write("done.\n").await;
        assert!(rx.try_recv().is_err());

        sink.release_on_output();
        assert!(sink.is_holding());
        sink.write("compiling\n").await;
        assert!(!sink.is_holding());
        assert_eq!(sink.take_held(), None);
        drop(sink);

        assert_eq!(rx.recv().await.unwrap(), "Cloning into '/tmp/x'...\ndone.\n");
        assert_eq!(rx.recv().await.unwrap(), "compiling\n");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_take_held_without_output() {
        let (mut sink, mut rx) = OutputSink::channel(8);
        sink.hold();
        sink.write("Cloning into '/tmp/x'...\n").await;
        sink.release_on_output();

        assert_eq!(sink.take_held().unwrap(), "Cloning into '/tmp/x'...\n");
        assert!(!sink.is_holding());
        drop(sink);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_hold_after_streaming_is_ignored() {
        let (mut sink, mut rx) = OutputSink::channel(8);
        sink.write("first").await;
        sink.hold();
        sink.write("second").await;

        assert_eq!(sink.take_held(), None);
        assert_eq!(rx.recv().await.unwrap(), "first");
        assert_eq!(rx.recv().await.unwrap(), "second");
    }
}
