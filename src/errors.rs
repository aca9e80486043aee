//! Error types shared across the driver.

use std::fmt::{Display, Formatter};

/// Shared driver result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// What the batch loop does after a failure on one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Log the failure and continue with the next file.
    SkipFile,
    /// Stop requesting files; nothing further is delivered to the sink.
    AbortBatch,
}

/// Driver error enumeration covering every failure mode of an annotate batch.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// The tool never emitted its readiness line.
    HandshakeTimeout(String),
    /// The echoed path differs from the path that was requested.
    ProtocolDesync {
        /// Path written to the tool.
        expected: String,
        /// Line the tool sent back instead.
        actual: String,
    },
    /// A record line did not match the record grammar.
    MalformedRecord {
        /// File whose record failed to parse.
        path: String,
        /// 1-based index of the record within the file.
        index: usize,
        /// Raw line received from the tool.
        line: String,
    },
    /// The tool reported a line with no committed revision.
    NotVersionControlled {
        /// File the line belongs to.
        path: String,
        /// 1-based index of the record within the file.
        index: usize,
        /// Raw line received from the tool.
        line: String,
    },
    /// The tool could not annotate one file; the batch may continue.
    FileAnnotationFailed {
        /// File that was skipped.
        path: String,
        /// Reason read from the tool's error stream.
        reason: String,
    },
    /// The tool cannot annotate anything further for this project.
    ProjectAnnotationFailed(String),
    /// Read or write failure on the tool's standard streams.
    Io(String),
    /// The tool exited with a nonzero status.
    NonZeroExit {
        /// Executable that was run.
        executable: String,
        /// Exit code, `None` when the process was ended by a signal.
        code: Option<i32>,
    },
    /// The batch was cancelled from outside.
    Cancelled(String),
}

impl AppError {
    /// Whether the batch survives this failure.
    ///
    /// Only a file-level failure is recovered locally; every other kind
    /// ends the batch.
    #[must_use]
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::FileAnnotationFailed { .. } => Disposition::SkipFile,
            _ => Disposition::AbortBatch,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::HandshakeTimeout(msg) => write!(f, "handshake timeout: {msg}"),
            Self::ProtocolDesync { expected, actual } => write!(
                f,
                "protocol desync: expected the file paths to match: {expected} and {actual}"
            ),
            Self::MalformedRecord { path, index, line } => write!(
                f,
                "malformed record: invalid output from the annotate tool: \"{line}\" on file: \
                 {path} at line {index}"
            ),
            Self::NotVersionControlled { path, index, line } => write!(
                f,
                "not version controlled: no blame info for {path} at line {index}, is the file \
                 committed? [{line}]"
            ),
            Self::FileAnnotationFailed { path, reason } => {
                write!(f, "file annotation failed: {path}: {reason}")
            }
            Self::ProjectAnnotationFailed(msg) => write!(f, "project annotation failed: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::NonZeroExit { executable, code } => match code {
                Some(code) => write!(
                    f,
                    "non-zero exit: the annotate command {executable} failed with exit code {code}"
                ),
                None => write!(
                    f,
                    "non-zero exit: the annotate command {executable} was terminated by a signal"
                ),
            },
            Self::Cancelled(msg) => write!(f, "cancelled: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
