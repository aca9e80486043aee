//! SCM provider surface.
//!
//! The [`BlameCommand`] trait decouples whatever hosts the driver from the
//! annotate tool itself. [`TfvcProvider`] is what a host registers; it
//! detects TFVC workspaces and hands out the command that annotates them.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use crate::config::AnnotateConfig;
use crate::models::annotation::FileAnnotationRequest;
use crate::protocol::assembler::AnnotationSink;
use crate::protocol::process::TfvcBlameCommand;
use crate::protocol::session::BatchOutcome;
use crate::Result;

/// Directory TFVC creates at the root of a local workspace.
pub const WORKSPACE_MARKER: &str = "$tf";

/// Produces per-line authorship for a batch of files.
pub trait BlameCommand: Send + Sync {
    /// Annotate `files` in order, delivering each completed file to `sink`.
    ///
    /// # Errors
    ///
    /// Returns the failure that ended the batch, or
    /// [`AppError::Cancelled`](crate::AppError::Cancelled) when `cancel`
    /// fired first.
    fn blame<'a>(
        &'a self,
        files: &'a [FileAnnotationRequest],
        sink: &'a mut dyn AnnotationSink,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<BatchOutcome>> + Send + 'a>>;
}

impl BlameCommand for TfvcBlameCommand {
    fn blame<'a>(
        &'a self,
        files: &'a [FileAnnotationRequest],
        sink: &'a mut dyn AnnotationSink,
        cancel: &'a CancellationToken,
    ) -> Pin<Box<dyn Future<Output = Result<BatchOutcome>> + Send + 'a>> {
        Box::pin(self.annotate(files, sink, cancel))
    }
}

/// TFVC provider.
#[derive(Debug, Clone)]
pub struct TfvcProvider {
    config: AnnotateConfig,
}

impl TfvcProvider {
    /// Identifier the provider is registered under.
    pub const KEY: &'static str = "tfvc";

    /// Create a provider whose blame commands use `config`.
    #[must_use]
    pub fn new(config: AnnotateConfig) -> Self {
        Self { config }
    }

    /// Identifier the provider is registered under.
    #[must_use]
    pub fn key(&self) -> &'static str {
        Self::KEY
    }

    /// Whether `base_dir` is the root of a TFVC local workspace.
    #[must_use]
    pub fn supports(&self, base_dir: &Path) -> bool {
        base_dir.join(WORKSPACE_MARKER).exists()
    }

    /// Blame command for this provider's configuration.
    #[must_use]
    pub fn blame_command(&self) -> TfvcBlameCommand {
        TfvcBlameCommand::new(self.config.clone())
    }
}
