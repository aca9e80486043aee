//! Line-oriented wrappers over the tool's standard streams.
//!
//! [`LineChannel`] frames stdout (reads) and stdin (writes) with
//! [`LineCodec`]. [`ErrorStream`] owns a background task that forwards
//! every stderr line into an unbounded channel so the driver can either
//! wait for the next diagnostic line or drain whatever is already there
//! without blocking on a tool that does not flush stderr.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, warn};

use crate::protocol::codec::LineCodec;
use crate::Result;

/// How long [`ErrorStream::finish`] waits for stderr to reach EOF.
const STDERR_SETTLE: Duration = Duration::from_millis(250);

/// Request/response channel over the tool's stdout and stdin.
#[derive(Debug)]
pub struct LineChannel<R, W> {
    reader: FramedRead<R, LineCodec>,
    writer: FramedWrite<W, LineCodec>,
}

impl<R, W> LineChannel<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Wrap a reader (tool stdout) and a writer (tool stdin).
    #[must_use]
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: FramedRead::new(reader, LineCodec::new()),
            writer: FramedWrite::new(writer, LineCodec::new()),
        }
    }

    /// Write `text` followed by `\r\n` and flush immediately.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`](crate::AppError::Io) if the write or flush fails.
    pub async fn write_line(&mut self, text: &str) -> Result<()> {
        self.writer.send(text).await
    }

    /// Buffer `text` followed by `\r\n` without flushing.
    ///
    /// Used when several lines form one logical message; call
    /// [`flush`](Self::flush) afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`](crate::AppError::Io) if the buffer cannot be written.
    pub async fn queue_line(&mut self, text: &str) -> Result<()> {
        self.writer.feed(text).await
    }

    /// Flush buffered lines to the tool.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`](crate::AppError::Io) if the flush fails.
    pub async fn flush(&mut self) -> Result<()> {
        SinkExt::<&str>::flush(&mut self.writer).await
    }

    /// Read the next line, terminator stripped.
    ///
    /// Returns `Ok(None)` once the tool has closed its stdout.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`](crate::AppError::Io) on read failure or an
    /// over-long line.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        self.reader.next().await.transpose()
    }

    /// Flush pending lines and drop both halves.
    ///
    /// Dropping the write half is what closes the tool's stdin; a pipe
    /// shutdown alone does not release the descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`](crate::AppError::Io) if the final flush fails.
    pub async fn close(mut self) -> Result<()> {
        SinkExt::<&str>::close(&mut self.writer).await
    }
}

/// Captured stderr of the tool.
#[derive(Debug)]
pub struct ErrorStream {
    lines: mpsc::UnboundedReceiver<String>,
    task: JoinHandle<()>,
}

impl ErrorStream {
    /// Start forwarding lines from `stderr` in a background task.
    #[must_use]
    pub fn spawn<E>(stderr: E) -> Self
    where
        E: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, lines) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            let mut framed = FramedRead::new(stderr, LineCodec::new());
            while let Some(item) = framed.next().await {
                match item {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "stderr capture: read failed, stopping");
                        break;
                    }
                }
            }
            debug!("stderr capture: stream closed");
        });
        Self { lines, task }
    }

    /// Wait for the next stderr line.
    ///
    /// Returns `None` once stderr is closed and every line has been consumed.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// Take every line that has already arrived, without waiting.
    pub fn drain(&mut self) -> Vec<String> {
        let mut pending = Vec::new();
        while let Ok(line) = self.lines.try_recv() {
            pending.push(line);
        }
        pending
    }

    /// Stop capturing and return whatever was still pending.
    ///
    /// Gives the tool a short window to close stderr on its own, then
    /// aborts the capture task.
    pub async fn finish(mut self) -> Vec<String> {
        if tokio::time::timeout(STDERR_SETTLE, &mut self.task)
            .await
            .is_err()
        {
            self.task.abort();
        }
        self.drain()
    }
}

impl Drop for ErrorStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}
