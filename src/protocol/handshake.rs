//! Opening exchange with the annotate tool.
//!
//! Before any path is requested the driver:
//!
//! 1. **`await_readiness`**: reads until the tool prints its first
//!    non-empty line, pausing after each empty one, for at most
//!    `probe_attempts` reads.
//! 2. **`send_credentials`**: writes username, password and (current
//!    protocol) personal access token, then flushes once.
//! 3. Reads one acknowledgement line.
//! 4. Writes the collection URI (current protocol only).
//! 5. Reads the ready line, which may instead be the project-level
//!    failure sentinel.
//!
//! The legacy protocol has no collection step; its acknowledgement line is
//! the ready line.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::config::HandshakeConfig;
use crate::models::credentials::Credentials;
use crate::protocol::channel::{ErrorStream, LineChannel};
use crate::protocol::classify::{classify_ready, ReadyResponse};
use crate::protocol::variant::ProtocolVariant;
use crate::{AppError, Result};

/// Wait for the tool's first non-empty line.
///
/// # Errors
///
/// - `AppError::HandshakeTimeout`: only empty lines within
///   `probe.probe_attempts` reads, or the tool closed stdout first.
/// - `AppError::Io`: read failure.
pub async fn await_readiness<R, W>(
    channel: &mut LineChannel<R, W>,
    probe: &HandshakeConfig,
) -> Result<String>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    for attempt in 1..=probe.probe_attempts {
        match channel.read_line().await? {
            Some(line) if !line.trim().is_empty() => {
                debug!(attempt, ready_line = line.trim(), "handshake: tool is ready");
                return Ok(line);
            }
            Some(_) => tokio::time::sleep(probe.probe_interval()).await,
            None => {
                return Err(AppError::HandshakeTimeout(
                    "annotate tool exited before its readiness line".into(),
                ));
            }
        }
    }

    Err(AppError::HandshakeTimeout(format!(
        "no readiness line after {} attempts",
        probe.probe_attempts
    )))
}

/// Write the credential lines and flush them together.
///
/// # Errors
///
/// Returns `AppError::Io` if writing to the tool fails.
pub async fn send_credentials<R, W>(
    channel: &mut LineChannel<R, W>,
    credentials: &Credentials,
    variant: &ProtocolVariant,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    channel.queue_line(&credentials.username).await?;
    channel.queue_line(&credentials.password).await?;
    if variant.sends_access_token {
        channel
            .queue_line(&credentials.personal_access_token)
            .await?;
    }
    channel.flush().await?;

    debug!(
        username = credentials.username.as_str(),
        anonymous = credentials.username.is_empty() && credentials.personal_access_token.is_empty(),
        "handshake: credentials sent"
    );
    Ok(())
}

/// Run the complete handshake.
///
/// # Errors
///
/// - `AppError::HandshakeTimeout`: see [`await_readiness`].
/// - `AppError::ProjectAnnotationFailed`: the tool answered with the
///   project-level sentinel or closed stdout; the sentinel's reason is read
///   from the error stream.
/// - `AppError::Io`: stream failure.
pub async fn perform<R, W>(
    channel: &mut LineChannel<R, W>,
    errors: &mut ErrorStream,
    credentials: &Credentials,
    variant: &ProtocolVariant,
    probe: &HandshakeConfig,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    await_readiness(channel, probe).await?;
    send_credentials(channel, credentials, variant).await?;

    let mut last = channel.read_line().await?;
    if variant.sends_collection_uri {
        if let Some(ack) = &last {
            debug!(ack = ack.as_str(), "handshake: credentials acknowledged");
        }
        if credentials.collection_uri.is_empty() {
            warn!("handshake: sending an empty collection URI");
        }
        channel.write_line(&credentials.collection_uri).await?;
        last = channel.read_line().await?;
    }

    match classify_ready(last.as_deref(), variant) {
        ReadyResponse::Ready(line) => {
            info!(ready_line = line.as_str(), "handshake: complete");
            Ok(())
        }
        ReadyResponse::ProjectFailed => {
            let reason = errors
                .next_line()
                .await
                .unwrap_or_else(|| "no reason given on the error stream".to_owned());
            Err(AppError::ProjectAnnotationFailed(format!(
                "during handshake: {reason}"
            )))
        }
        ReadyResponse::EndOfStream => Err(AppError::ProjectAnnotationFailed(
            "annotate tool closed its output during the handshake".into(),
        )),
    }
}
