//! Per-batch annotation session.
//!
//! ```text
//! Init ─► Handshaking ─► Ready ─► Requesting ─► AwaitingCount ─► ReadingRecords ─┐
//!              │            ▲                        │                 │          │
//!              │            └──── file skipped ◄─────┤                 │          │
//!              │            └────────────────────────┴─────────────────┼──────────┘
//!              ▼                                     ▼                 ▼
//!           Aborted ◄────────────────────────────────┴─────────────────┘
//! Ready ─► Done (after the last file)
//! ```
//!
//! The session borrows the tool's channel and error stream for one batch.
//! Files are requested strictly one at a time; nothing is pipelined.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, error, info, warn, Instrument, Span};

use crate::config::HandshakeConfig;
use crate::models::annotation::{AnnotationRecord, FileAnnotationRequest};
use crate::models::credentials::Credentials;
use crate::protocol::assembler::{self, AnnotationSink};
use crate::protocol::channel::{ErrorStream, LineChannel};
use crate::protocol::classify::{check_echo, classify_count, sentinel_failure, CountResponse};
use crate::protocol::grammar::parse_record;
use crate::protocol::handshake;
use crate::protocol::variant::ProtocolVariant;
use crate::{AppError, Disposition, Result};

/// Position of the session in the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, nothing exchanged yet.
    Init,
    /// Opening exchange in progress.
    Handshaking,
    /// Waiting for the next file to request.
    Ready,
    /// Path written, echo pending.
    Requesting,
    /// Echo verified, count or sentinel pending.
    AwaitingCount,
    /// Reading the declared records.
    ReadingRecords,
    /// Every file was requested.
    Done,
    /// The batch was abandoned.
    Aborted,
}

/// A file the tool could not annotate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    /// Requested path.
    pub path: String,
    /// Failure description.
    pub reason: String,
}

/// What happened to a batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Paths delivered to the sink, in order.
    pub delivered: Vec<String>,
    /// Paths for which the tool returned zero records.
    pub unannotated: Vec<String>,
    /// Files skipped after a file-level failure.
    pub skipped: Vec<SkippedFile>,
    /// Failure that ended the batch early, if any.
    pub failure: Option<AppError>,
}

impl BatchOutcome {
    /// Whether every requested file was handled without a batch failure.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// Result of one file exchange.
#[derive(Debug)]
pub enum FileOutcome {
    /// Records in source-line order, before normalization.
    Annotated(Vec<AnnotationRecord>),
    /// The tool returned no records and explained why.
    Unannotated {
        /// Explanation printed by the tool.
        reason: String,
    },
}

/// Protocol driver for one batch.
#[derive(Debug)]
pub struct AnnotationSession<'a, R, W> {
    channel: &'a mut LineChannel<R, W>,
    errors: &'a mut ErrorStream,
    variant: &'a ProtocolVariant,
    span: Span,
    state: SessionState,
}

impl<'a, R, W> AnnotationSession<'a, R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Create a session over an already started tool.
    ///
    /// All logging of the session happens inside `span`.
    #[must_use]
    pub fn new(
        channel: &'a mut LineChannel<R, W>,
        errors: &'a mut ErrorStream,
        variant: &'a ProtocolVariant,
        span: Span,
    ) -> Self {
        Self {
            channel,
            errors,
            variant,
            span,
            state: SessionState::Init,
        }
    }

    /// Current protocol position.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Handshake, then annotate `files` in order, delivering each
    /// completed file to `sink`.
    ///
    /// Never fails outright: a batch-ending failure is returned in
    /// [`BatchOutcome::failure`] so the caller can tear the tool down
    /// before deciding how to report it.
    pub async fn run(
        &mut self,
        credentials: &Credentials,
        probe: &HandshakeConfig,
        files: &[FileAnnotationRequest],
        sink: &mut dyn AnnotationSink,
    ) -> BatchOutcome {
        let span = self.span.clone();
        async move {
            let mut outcome = BatchOutcome::default();

            if let Err(err) = self.handshake(credentials, probe).await {
                error!(error = %err, "handshake failed, no file will be annotated");
                outcome.failure = Some(err);
                return outcome;
            }

            for request in files {
                match self.annotate_file(request).await {
                    Ok(FileOutcome::Annotated(lines)) => {
                        assembler::deliver(sink, request, lines);
                        outcome.delivered.push(request.path.clone());
                    }
                    Ok(FileOutcome::Unannotated { reason }) => {
                        info!(
                            path = request.path.as_str(),
                            reason = reason.as_str(),
                            "no annotation returned"
                        );
                        outcome.unannotated.push(request.path.clone());
                    }
                    Err(err) if err.disposition() == Disposition::SkipFile => {
                        error!(path = request.path.as_str(), error = %err, "skipping file");
                        self.state = SessionState::Ready;
                        outcome.skipped.push(SkippedFile {
                            path: request.path.clone(),
                            reason: err.to_string(),
                        });
                    }
                    Err(err) => {
                        error!(
                            path = request.path.as_str(),
                            error = %err,
                            "aborting annotation of the remaining files"
                        );
                        self.state = SessionState::Aborted;
                        outcome.failure = Some(err);
                        self.log_pending_errors();
                        return outcome;
                    }
                }
                self.log_pending_errors();
            }

            self.state = SessionState::Done;
            info!(
                delivered = outcome.delivered.len(),
                unannotated = outcome.unannotated.len(),
                skipped = outcome.skipped.len(),
                "annotation batch finished"
            );
            outcome
        }
        .instrument(span)
        .await
    }

    /// Perform the opening exchange.
    ///
    /// # Errors
    ///
    /// See [`handshake::perform`]. On failure the session is `Aborted`.
    pub async fn handshake(
        &mut self,
        credentials: &Credentials,
        probe: &HandshakeConfig,
    ) -> Result<()> {
        self.state = SessionState::Handshaking;
        let result = handshake::perform(
            &mut *self.channel,
            &mut *self.errors,
            credentials,
            self.variant,
            probe,
        )
        .await;
        self.state = if result.is_ok() {
            SessionState::Ready
        } else {
            SessionState::Aborted
        };
        result
    }

    /// Request one file and read the tool's answer.
    ///
    /// # Errors
    ///
    /// - `AppError::ProtocolDesync`: wrong echo or unrecognised count line.
    /// - `AppError::FileAnnotationFailed`: file-level sentinel.
    /// - `AppError::ProjectAnnotationFailed`: project-level sentinel, or
    ///   the tool closed stdout.
    /// - `AppError::MalformedRecord` / `AppError::NotVersionControlled`:
    ///   a record line was rejected.
    /// - `AppError::Io`: stream failure.
    pub async fn annotate_file(&mut self, request: &FileAnnotationRequest) -> Result<FileOutcome> {
        let wire_path = request.wire_path(self.variant.strip_leading_separator);

        self.state = SessionState::Requesting;
        debug!(path = wire_path, "requesting annotation");
        self.channel.write_line(wire_path).await?;
        let echoed = self.channel.read_line().await?;
        check_echo(wire_path, echoed.as_deref())?;

        self.state = SessionState::AwaitingCount;
        let count_line = self.channel.read_line().await?;
        let count = match classify_count(count_line.as_deref(), self.variant) {
            CountResponse::Records(count) => count,
            CountResponse::NothingToAnnotate { note } => {
                let explanation = self.channel.read_line().await?;
                let reason = [note, explanation]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" ");
                self.state = SessionState::Ready;
                return Ok(FileOutcome::Unannotated { reason });
            }
            response @ (CountResponse::FileFailed | CountResponse::ProjectFailed) => {
                let reason = self.errors.next_line().await;
                return Err(sentinel_failure(&response, &request.path, reason));
            }
            CountResponse::EndOfStream => {
                return Err(AppError::ProjectAnnotationFailed(format!(
                    "annotate tool closed its output while annotating {}",
                    request.path
                )));
            }
            CountResponse::Unrecognized(line) => {
                return Err(AppError::ProtocolDesync {
                    expected: format!("record count for {}", request.path),
                    actual: line,
                });
            }
        };

        self.state = SessionState::ReadingRecords;
        let mut lines = Vec::with_capacity(count);
        for index in 1..=count {
            let Some(line) = self.channel.read_line().await? else {
                return Err(AppError::ProjectAnnotationFailed(format!(
                    "annotate tool closed its output after {} of {count} records of {}",
                    index - 1,
                    request.path
                )));
            };
            let record = parse_record(&line, self.variant)
                .map_err(|rejection| rejection.at(&request.path, index, &line))?;
            lines.push(record);
        }

        self.state = SessionState::Ready;
        Ok(FileOutcome::Annotated(lines))
    }

    /// Log whatever the tool has written to stderr so far.
    fn log_pending_errors(&mut self) {
        for line in self.errors.drain() {
            if !line.trim().is_empty() {
                warn!(stderr = line.as_str(), "annotate tool diagnostic");
            }
        }
    }
}
