#![forbid(unsafe_code)]

//! `tfvc-annotate`: per-line blame for files in a TFVC workspace.
//!
//! Starts the configured annotate tool, annotates the files given on the
//! command line and prints one JSON object per annotated file to stdout.
//! Logs go to stderr.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use tfvc_annotate::config::AnnotateConfig;
use tfvc_annotate::models::annotation::{FileAnnotationRequest, FileAnnotationResult};
use tfvc_annotate::protocol::assembler::AnnotationSink;
use tfvc_annotate::protocol::variant::ProtocolKind;
use tfvc_annotate::provider::{BlameCommand, TfvcProvider};
use tfvc_annotate::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "tfvc-annotate", about = "Per-line blame through the TFVC annotate tool", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Speak the legacy protocol regardless of the configuration file.
    #[arg(long)]
    legacy: bool,

    /// Files to annotate, relative to the configured working directory.
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

/// Writes each result as one JSON line on stdout.
struct JsonLinesSink {
    out: std::io::Stdout,
}

impl AnnotationSink for JsonLinesSink {
    fn blame_result(&mut self, result: FileAnnotationResult) {
        let mut out = self.out.lock();
        let written = serde_json::to_writer(&mut out, &result)
            .map_err(|err| err.to_string())
            .and_then(|()| writeln!(out).map_err(|err| err.to_string()));
        if let Err(err) = written {
            error!(path = result.path.as_str(), error = err.as_str(), "failed to write annotation");
        }
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = AnnotateConfig::load_from_path(&args.config)?;
    if args.legacy {
        config.protocol = ProtocolKind::Legacy;
    }
    config.load_credentials().await?;
    info!(
        executable = %config.executable.display(),
        protocol = ?config.protocol,
        protocol_overridden = !config.protocol_overrides.is_empty(),
        "configuration loaded"
    );

    // ── Build requests ──────────────────────────────────
    let base_dir = match &config.working_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()
            .map_err(|err| AppError::Config(format!("cannot resolve current dir: {err}")))?,
    };
    let provider = TfvcProvider::new(config);
    if !provider.supports(&base_dir) {
        warn!(
            base_dir = %base_dir.display(),
            "no TFVC workspace marker found, the annotate tool may reject every file"
        );
    }
    let mut requests = Vec::with_capacity(args.files.len());
    for file in &args.files {
        requests.push(build_request(&base_dir, file).await?);
    }

    // ── Annotate ────────────────────────────────────────
    let ct = CancellationToken::new();
    let signal_ct = ct.clone();
    let signal_handle = tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received, cancelling annotation");
        signal_ct.cancel();
    });

    let command = provider.blame_command();
    let mut sink = JsonLinesSink {
        out: std::io::stdout(),
    };
    let result = command.blame(&requests, &mut sink, &ct).await;
    signal_handle.abort();

    let outcome = result?;
    info!(
        delivered = outcome.delivered.len(),
        unannotated = outcome.unannotated.len(),
        skipped = outcome.skipped.len(),
        "tfvc-annotate finished"
    );
    Ok(())
}

/// Describe `file` for the tool, counting its lines on disk.
async fn build_request(base_dir: &Path, file: &Path) -> Result<FileAnnotationRequest> {
    let on_disk = base_dir.join(file);
    let content = tokio::fs::read(&on_disk)
        .await
        .map_err(|err| AppError::Io(format!("cannot read {}: {err}", on_disk.display())))?;
    let line_count = content.iter().filter(|&&byte| byte == b'\n').count() + 1;

    let relative = file.strip_prefix(base_dir).unwrap_or(file);
    Ok(FileAnnotationRequest::new(
        relative.to_string_lossy(),
        line_count,
    ))
}

/// Resolves on ctrl-c (or `SIGTERM` on unix).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    () = ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

/// Resolves on ctrl-c. A handler that cannot be installed is logged and
/// never resolves, so it cannot cancel the batch.
async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "ctrl-c signal handler failed");
        std::future::pending::<()>().await;
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
