//! Classification of control lines read from the annotate tool.
//!
//! Every function here is pure: it looks at one line (or the absence of
//! one, meaning the tool closed stdout) and decides what the session does
//! next. Reading the error stream and logging stay with the caller.

use crate::protocol::grammar::parse_count;
use crate::protocol::variant::ProtocolVariant;
use crate::{AppError, Result};

/// Rendered in errors when the tool closed stdout instead of answering.
pub const END_OF_STREAM: &str = "<end of stream>";

/// Meaning of the line that follows the echoed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountResponse {
    /// `N` record lines follow.
    Records(usize),
    /// Zero records; one explanatory line follows.
    NothingToAnnotate {
        /// Text after the `0`, if the tool put any on the same line.
        note: Option<String>,
    },
    /// File-level sentinel; the reason is on the error stream.
    FileFailed,
    /// Project-level sentinel; the reason is on the error stream.
    ProjectFailed,
    /// The tool closed stdout.
    EndOfStream,
    /// Neither a count nor a sentinel.
    Unrecognized(String),
}

/// Meaning of the last handshake line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyResponse {
    /// The tool accepted the credentials; carries the line for logging.
    Ready(String),
    /// Project-level sentinel; the reason is on the error stream.
    ProjectFailed,
    /// The tool closed stdout.
    EndOfStream,
}

/// Classify the line read where a record count is expected.
#[must_use]
pub fn classify_count(line: Option<&str>, variant: &ProtocolVariant) -> CountResponse {
    let Some(line) = line else {
        return CountResponse::EndOfStream;
    };

    if variant.is_file_failure(line) {
        return CountResponse::FileFailed;
    }
    if variant.is_project_failure(line) {
        return CountResponse::ProjectFailed;
    }

    match parse_count(line) {
        Some(declared) if declared.count == 0 => CountResponse::NothingToAnnotate {
            note: declared.note,
        },
        Some(declared) => CountResponse::Records(declared.count),
        None => CountResponse::Unrecognized(line.to_owned()),
    }
}

/// Classify the line that ends the handshake.
#[must_use]
pub fn classify_ready(line: Option<&str>, variant: &ProtocolVariant) -> ReadyResponse {
    match line {
        None => ReadyResponse::EndOfStream,
        Some(line) if variant.is_project_failure(line) => ReadyResponse::ProjectFailed,
        Some(line) => ReadyResponse::Ready(line.to_owned()),
    }
}

/// Verify the tool echoed exactly the path that was requested.
///
/// # Errors
///
/// Returns [`AppError::ProtocolDesync`] when the echo differs or the tool
/// closed stdout instead of echoing.
pub fn check_echo(requested: &str, echoed: Option<&str>) -> Result<()> {
    match echoed {
        Some(echoed) if echoed == requested => Ok(()),
        other => Err(AppError::ProtocolDesync {
            expected: requested.to_owned(),
            actual: other.unwrap_or(END_OF_STREAM).to_owned(),
        }),
    }
}

/// Build the failure for a sentinel, given the reason read from stderr.
#[must_use]
pub fn sentinel_failure(response: &CountResponse, path: &str, reason: Option<String>) -> AppError {
    let reason = reason.unwrap_or_else(|| "no reason given on the error stream".to_owned());
    match response {
        CountResponse::FileFailed => AppError::FileAnnotationFailed {
            path: path.to_owned(),
            reason,
        },
        _ => AppError::ProjectAnnotationFailed(format!("while annotating {path}: {reason}")),
    }
}
