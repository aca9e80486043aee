//! Driver configuration parsing, validation, and credential loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::models::credentials::Credentials;
use crate::protocol::variant::{ProtocolKind, ProtocolOverrides, ProtocolVariant};
use crate::{AppError, Result};

/// Keychain service holding the annotate secrets.
pub const KEYRING_SERVICE: &str = "tfvc-annotate";

/// What the driver does with a batch-aborting failure.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Return the failure to the caller.
    #[default]
    Surface,
    /// Log the failure and return the partial outcome as a success.
    LogOnly,
}

/// Readiness probe of the handshake.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HandshakeConfig {
    /// Reads allowed before the first non-empty line must have arrived.
    #[serde(default = "default_probe_attempts")]
    pub probe_attempts: u32,
    /// Pause after each empty line.
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
}

impl HandshakeConfig {
    /// Pause after each empty readiness line.
    #[must_use]
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            probe_attempts: default_probe_attempts(),
            probe_interval_ms: default_probe_interval_ms(),
        }
    }
}

fn default_probe_attempts() -> u32 {
    10
}

fn default_probe_interval_ms() -> u64 {
    100
}

fn default_shutdown_grace_seconds() -> u64 {
    5
}

/// Driver configuration parsed from `annotate.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AnnotateConfig {
    /// Annotate tool binary.
    pub executable: PathBuf,
    /// Arguments passed to the tool.
    #[serde(default)]
    pub executable_args: Vec<String>,
    /// Directory the tool runs in; requested paths are relative to it.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Protocol generation spoken by the tool.
    #[serde(default)]
    pub protocol: ProtocolKind,
    /// Field-level adjustments to the selected generation.
    #[serde(default)]
    pub protocol_overrides: ProtocolOverrides,
    /// Handling of batch-aborting failures.
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Time the tool gets to stop after a failed or cancelled batch.
    #[serde(default = "default_shutdown_grace_seconds")]
    pub shutdown_grace_seconds: u64,
    /// Readiness probe settings.
    #[serde(default)]
    pub handshake: HandshakeConfig,
    /// Non-secret credential fields; secrets are loaded at runtime.
    #[serde(default)]
    pub credentials: Credentials,
}

impl AnnotateConfig {
    /// Build a configuration for `executable` with every other setting
    /// at its default.
    #[must_use]
    pub fn for_executable(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            executable_args: Vec::new(),
            working_dir: None,
            protocol: ProtocolKind::default(),
            protocol_overrides: ProtocolOverrides::default(),
            failure_policy: FailurePolicy::default(),
            shutdown_grace_seconds: default_shutdown_grace_seconds(),
            handshake: HandshakeConfig::default(),
            credentials: Credentials::default(),
        }
    }

    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load secrets and environment overrides into `credentials`.
    ///
    /// `password` and `personal_access_token` come from the OS keychain
    /// (service [`KEYRING_SERVICE`]) with `TFVC_PASSWORD` / `TFVC_PAT` as
    /// fallback. `TFVC_USERNAME` and `TFVC_COLLECTION_URI` override the file
    /// values when set. Missing values stay empty, which the tool treats as
    /// the ambient identity.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the keychain lookup task panics.
    pub async fn load_credentials(&mut self) -> Result<()> {
        if let Ok(username) = env::var("TFVC_USERNAME") {
            self.credentials.username = username;
        }
        if let Ok(collection_uri) = env::var("TFVC_COLLECTION_URI") {
            self.credentials.collection_uri = collection_uri;
        }
        self.credentials.password = load_secret("password", "TFVC_PASSWORD").await?;
        self.credentials.personal_access_token =
            load_secret("personal_access_token", "TFVC_PAT").await?;

        if self.credentials.collection_uri.is_empty() && self.variant().sends_collection_uri {
            warn!("no collection URI configured; the annotate tool will use its own default");
        }
        debug!(credentials = ?self.credentials, "credentials loaded");
        Ok(())
    }

    /// Full description of the configured protocol generation, with
    /// `protocol_overrides` applied.
    #[must_use]
    pub fn variant(&self) -> ProtocolVariant {
        self.protocol_overrides.apply(self.protocol.variant())
    }

    /// Time a failed or cancelled tool gets to exit before it is killed.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    fn validate(&mut self) -> Result<()> {
        if self.executable.as_os_str().is_empty() {
            return Err(AppError::Config("executable must not be empty".into()));
        }

        if self.handshake.probe_attempts == 0 {
            return Err(AppError::Config(
                "handshake.probe_attempts must be greater than zero".into(),
            ));
        }

        if let Some(dir) = &self.working_dir {
            let canonical = dir
                .canonicalize()
                .map_err(|err| AppError::Config(format!("working_dir invalid: {err}")))?;
            self.working_dir = Some(canonical);
        }

        Ok(())
    }
}

/// Load a single secret from OS keychain with env-var fallback.
async fn load_secret(keyring_key: &str, env_key: &str) -> Result<String> {
    let key = keyring_key.to_owned();

    // keyring is synchronous I/O.
    let keychain_result = tokio::task::spawn_blocking(move || {
        keyring::Entry::new(KEYRING_SERVICE, &key).and_then(|entry| entry.get_password())
    })
    .await
    .map_err(|err| AppError::Config(format!("keychain task panicked: {err}")))?;

    match keychain_result {
        Ok(value) if !value.is_empty() => return Ok(value),
        Ok(_) => {
            debug!(key = keyring_key, "keychain entry is empty, trying env var");
        }
        Err(keyring::Error::NoEntry) => {
            debug!(key = keyring_key, "no keychain entry, trying env var");
        }
        Err(err) => {
            warn!(
                key = keyring_key,
                ?err,
                "keychain lookup failed, trying env var"
            );
        }
    }

    Ok(env::var(env_key).unwrap_or_default())
}
