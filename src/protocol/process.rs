//! Lifecycle of the annotate tool process.
//!
//! [`TfvcBlameCommand::annotate`] owns one child process per batch:
//! - The tool is started with all three standard streams piped and
//!   `kill_on_drop(true)`, so even an unwinding caller cannot leak it.
//! - After a clean batch the tool's stdin is closed and the driver waits
//!   for it to exit, for as long as it takes unless the batch is cancelled.
//!   A nonzero exit status fails the batch even when every file was
//!   annotated.
//! - After a failure or cancellation the tool is asked to terminate
//!   (`SIGTERM` on unix), then killed if it outlives
//!   `shutdown_grace_seconds`.
//! - In every case the stderr lines still pending at teardown are logged.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::{AnnotateConfig, FailurePolicy};
use crate::models::annotation::FileAnnotationRequest;
use crate::protocol::assembler::AnnotationSink;
use crate::protocol::channel::{ErrorStream, LineChannel};
use crate::protocol::session::{AnnotationSession, BatchOutcome};
use crate::{AppError, Result};

/// A started annotate tool and its framed streams.
#[derive(Debug)]
pub struct ToolProcess {
    executable: String,
    child: Child,
    channel: LineChannel<ChildStdout, ChildStdin>,
    errors: ErrorStream,
}

/// Start the annotate tool described by `config`.
///
/// # Errors
///
/// Returns `AppError::Io` if the process cannot be started or one of its
/// standard streams cannot be captured.
pub fn spawn_tool(config: &AnnotateConfig) -> Result<ToolProcess> {
    let executable = config.executable.display().to_string();

    let mut cmd = Command::new(&config.executable);
    cmd.args(&config.executable_args);
    if let Some(dir) = &config.working_dir {
        cmd.current_dir(dir);
    }
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(executable = executable.as_str(), "executing the annotate command");
    let mut child = cmd
        .spawn()
        .map_err(|err| {
            AppError::Io(format!("failed to start annotate tool {executable}: {err}"))
        })?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Io("failed to capture annotate tool stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Io("failed to capture annotate tool stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Io("failed to capture annotate tool stderr".into()))?;

    info!(
        executable = executable.as_str(),
        pid = child.id().unwrap_or(0),
        "annotate tool started"
    );

    Ok(ToolProcess {
        executable,
        child,
        channel: LineChannel::new(stdout, stdin),
        errors: ErrorStream::spawn(stderr),
    })
}

impl ToolProcess {
    /// Close the tool's stdin and wait for it to exit on its own.
    ///
    /// The wait is unbounded; only `cancel` cuts it short, in which case the
    /// tool is stopped as in [`ToolProcess::terminate`].
    ///
    /// # Errors
    ///
    /// - `AppError::Cancelled`: `cancel` fired before the tool exited.
    /// - `AppError::Io`: waiting on the process failed.
    pub async fn shutdown(
        self,
        cancel: &CancellationToken,
        grace: Duration,
    ) -> Result<ExitStatus> {
        let Self {
            executable,
            mut child,
            channel,
            errors,
        } = self;

        if let Err(err) = channel.close().await {
            warn!(
                executable = executable.as_str(),
                error = %err,
                "failed to flush annotate tool stdin"
            );
        }

        let waited = tokio::select! {
            biased;

            () = cancel.cancelled() => None,

            status = child.wait() => Some(status),
        };

        let Some(status) = waited else {
            warn!(
                executable = executable.as_str(),
                "annotation batch cancelled while the annotate tool was exiting"
            );
            stop_child(&executable, &mut child, grace).await;
            log_stderr(errors.finish().await);
            return Err(AppError::Cancelled("annotation batch cancelled".into()));
        };

        log_stderr(errors.finish().await);
        status.map_err(|err| AppError::Io(format!("failed to wait for annotate tool: {err}")))
    }

    /// Ask the tool to stop, then kill it if it outlives `grace`.
    pub async fn terminate(self, grace: Duration) {
        let Self {
            executable,
            mut child,
            channel,
            errors,
        } = self;
        drop(channel);

        stop_child(&executable, &mut child, grace).await;
        log_stderr(errors.finish().await);
    }
}

/// Blame command backed by the external annotate tool.
#[derive(Debug, Clone)]
pub struct TfvcBlameCommand {
    config: AnnotateConfig,
}

impl TfvcBlameCommand {
    /// Create a command from a loaded configuration.
    #[must_use]
    pub fn new(config: AnnotateConfig) -> Self {
        Self { config }
    }

    /// Configuration the command runs with.
    #[must_use]
    pub fn config(&self) -> &AnnotateConfig {
        &self.config
    }

    /// Path of the annotate tool.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.config.executable
    }

    /// Annotate `files` in order with a fresh tool process.
    ///
    /// Completed files are delivered to `sink` one by one. A file-level
    /// failure skips that file; any other failure stops the batch, and
    /// results already delivered stay delivered.
    ///
    /// # Errors
    ///
    /// - `AppError::Cancelled`: `cancel` fired; always surfaced.
    /// - Any batch-ending failure (handshake, desync, malformed record,
    ///   project-level failure, I/O, nonzero exit) when the failure policy
    ///   is [`FailurePolicy::Surface`]. With [`FailurePolicy::LogOnly`] the
    ///   failure is logged and left in [`BatchOutcome::failure`].
    pub async fn annotate(
        &self,
        files: &[FileAnnotationRequest],
        sink: &mut dyn AnnotationSink,
        cancel: &CancellationToken,
    ) -> Result<BatchOutcome> {
        let span = info_span!(
            "annotate_batch",
            executable = %self.config.executable.display(),
            files = files.len()
        );
        self.run_batch(files, sink, cancel)
            .instrument(span)
            .await
    }

    async fn run_batch(
        &self,
        files: &[FileAnnotationRequest],
        sink: &mut dyn AnnotationSink,
        cancel: &CancellationToken,
    ) -> Result<BatchOutcome> {
        let variant = self.config.variant();
        let grace = self.config.shutdown_grace();
        let mut tool = spawn_tool(&self.config)?;

        let finished = {
            let mut session = AnnotationSession::new(
                &mut tool.channel,
                &mut tool.errors,
                &variant,
                tracing::Span::current(),
            );
            tokio::select! {
                biased;

                () = cancel.cancelled() => None,

                outcome = session.run(
                    &self.config.credentials,
                    &self.config.handshake,
                    files,
                    sink,
                ) => Some(outcome),
            }
        };

        let Some(mut outcome) = finished else {
            warn!("annotation batch cancelled, terminating the annotate tool");
            tool.terminate(grace).await;
            return Err(AppError::Cancelled("annotation batch cancelled".into()));
        };

        if outcome.failure.is_some() {
            tool.terminate(grace).await;
        } else {
            let executable = tool.executable.clone();
            match tool.shutdown(cancel, grace).await {
                Ok(status) if status.success() => {
                    debug!(?status, "annotate tool exited cleanly");
                }
                Ok(status) => {
                    outcome.failure = Some(AppError::NonZeroExit {
                        executable,
                        code: status.code(),
                    });
                }
                Err(err @ AppError::Cancelled(_)) => return Err(err),
                Err(err) => outcome.failure = Some(err),
            }
        }

        self.apply_policy(outcome)
    }

    fn apply_policy(&self, mut outcome: BatchOutcome) -> Result<BatchOutcome> {
        let Some(err) = outcome.failure.take() else {
            return Ok(outcome);
        };
        match self.config.failure_policy {
            FailurePolicy::Surface => Err(err),
            FailurePolicy::LogOnly => {
                error!(error = %err, "annotation batch failed, continuing without blame data");
                outcome.failure = Some(err);
                Ok(outcome)
            }
        }
    }
}

/// Request termination, then kill the tool if it outlives `grace`.
async fn stop_child(executable: &str, child: &mut Child, grace: Duration) {
    request_termination(child);
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => debug!(?status, "annotate tool terminated"),
        Ok(Err(err)) => warn!(%err, "error waiting for annotate tool"),
        Err(_) => {
            warn!(executable, "annotate tool ignored termination request, forcing kill");
            if let Err(err) = child.kill().await {
                warn!(executable, %err, "failed to force-kill annotate tool");
            }
        }
    }
}

/// Log stderr lines captured during teardown.
fn log_stderr(lines: Vec<String>) {
    for line in lines {
        if !line.trim().is_empty() {
            error!(stderr = line.as_str(), "annotate tool error output");
        }
    }
}

/// Send the tool a polite termination request.
#[cfg(unix)]
fn request_termination(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id().and_then(|id| i32::try_from(id).ok()) else {
        // Already reaped, or a pid that does not fit; fall back to kill.
        if let Err(err) = child.start_kill() {
            debug!(%err, "annotate tool already gone");
        }
        return;
    };
    if let Err(err) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        warn!(pid, %err, "failed to send SIGTERM, killing annotate tool");
        if let Err(err) = child.start_kill() {
            debug!(%err, "annotate tool already gone");
        }
    }
}

/// Send the tool a polite termination request.
#[cfg(not(unix))]
fn request_termination(child: &mut Child) {
    if let Err(err) = child.start_kill() {
        debug!(%err, "annotate tool already gone");
    }
}
