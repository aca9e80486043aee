use std::io::Write;
use std::time::Duration;

use tfvc_annotate::config::{AnnotateConfig, FailurePolicy, HandshakeConfig};
use tfvc_annotate::protocol::variant::{
    FieldSeparator, ProtocolKind, ProtocolOverrides, ProtocolVariant, PROJECT_FAILURE_SENTINEL,
};
use tfvc_annotate::AppError;

fn full_toml(working_dir: &str) -> String {
    format!(
        r#"
executable = "/opt/tfvc/SonarTfsAnnotate"
executable_args = ["--quiet"]
working_dir = '{working_dir}'
protocol = "legacy"
failure_policy = "log_only"
shutdown_grace_seconds = 2

[handshake]
probe_attempts = 3
probe_interval_ms = 25

[credentials]
username = "DOMAIN\\builder"
collection_uri = "https://dev.azure.com/org"
"#
    )
}

/// Every documented key is read from the file.
#[test]
fn full_config_parses() {
    let temp = tempfile::tempdir().expect("tempdir");
    let toml = full_toml(temp.path().to_str().expect("utf8 path"));

    let config = AnnotateConfig::from_toml_str(&toml).expect("config parses");

    assert_eq!(
        config.executable.to_str(),
        Some("/opt/tfvc/SonarTfsAnnotate")
    );
    assert_eq!(config.executable_args, vec!["--quiet".to_owned()]);
    assert_eq!(
        config.working_dir,
        Some(temp.path().canonicalize().expect("canonical temp"))
    );
    assert_eq!(config.protocol, ProtocolKind::Legacy);
    assert_eq!(config.failure_policy, FailurePolicy::LogOnly);
    assert_eq!(config.shutdown_grace(), Duration::from_secs(2));
    assert_eq!(config.handshake.probe_attempts, 3);
    assert_eq!(config.handshake.probe_interval(), Duration::from_millis(25));
    assert_eq!(config.credentials.username, "DOMAIN\\builder");
    assert_eq!(config.credentials.collection_uri, "https://dev.azure.com/org");
    assert_eq!(config.variant(), ProtocolVariant::legacy());
}

/// Only `executable` is required; the rest falls back to defaults.
#[test]
fn minimal_config_uses_defaults() {
    let config =
        AnnotateConfig::from_toml_str(r#"executable = "SonarTfsAnnotate.exe""#).expect("parses");

    assert_eq!(config.protocol, ProtocolKind::Current);
    assert_eq!(config.failure_policy, FailurePolicy::Surface);
    assert_eq!(config.shutdown_grace(), Duration::from_secs(5));
    assert_eq!(config.handshake, HandshakeConfig::default());
    assert_eq!(config.handshake.probe_attempts, 10);
    assert!(config.credentials.username.is_empty());
    assert_eq!(config.variant().separator, FieldSeparator::Tab);
    assert_eq!(
        config,
        AnnotateConfig::for_executable("SonarTfsAnnotate.exe")
    );
}

/// The collection generation sends no access token but keeps the
/// collection step and the tab grammar.
#[test]
fn collection_protocol_is_selectable() {
    let config = AnnotateConfig::from_toml_str(
        r#"
executable = "SonarTfsAnnotate.exe"
protocol = "collection"
"#,
    )
    .expect("parses");

    assert_eq!(config.protocol, ProtocolKind::Collection);
    let variant = config.variant();
    assert_eq!(variant, ProtocolVariant::collection());
    assert!(!variant.sends_access_token);
    assert!(variant.sends_collection_uri);
    assert_eq!(variant.separator, FieldSeparator::Tab);
    assert_eq!(variant.file_failure_sentinel, None);
}

/// `[protocol_overrides]` adjusts single fields of the named generation;
/// an empty sentinel disables it.
#[test]
fn protocol_overrides_adjust_named_generation() {
    let config = AnnotateConfig::from_toml_str(
        r#"
executable = "tool"

[protocol_overrides]
sends_access_token = false
strip_leading_separator = false
file_failure_sentinel = ""
"#,
    )
    .expect("parses");

    assert!(!config.protocol_overrides.is_empty());
    let variant = config.variant();
    assert!(!variant.sends_access_token);
    assert!(variant.sends_collection_uri);
    assert!(!variant.strip_leading_separator);
    assert_eq!(variant.file_failure_sentinel, None);
    assert_eq!(
        variant.project_failure_sentinel.as_deref(),
        Some(PROJECT_FAILURE_SENTINEL)
    );
    assert_eq!(variant.separator, FieldSeparator::Tab);

    let untouched = ProtocolOverrides::default().apply(ProtocolVariant::legacy());
    assert_eq!(untouched, ProtocolVariant::legacy());

    let unknown = AnnotateConfig::from_toml_str(
        r#"
executable = "tool"

[protocol_overrides]
sends_pat = true
"#,
    )
    .expect_err("unknown override key");
    assert!(matches!(unknown, AppError::Config(_)));
}

/// Secrets in the file are ignored; they only come from the keychain or env.
#[test]
fn secrets_are_not_read_from_file() {
    let config = AnnotateConfig::from_toml_str(
        r#"
executable = "tool"

[credentials]
username = "alice"
password = "in-the-file"
personal_access_token = "also-in-the-file"
"#,
    )
    .expect("parses");

    assert_eq!(config.credentials.username, "alice");
    assert!(config.credentials.password.is_empty());
    assert!(config.credentials.personal_access_token.is_empty());
}

/// Validation rejects an empty executable and a zero readiness attempt budget.
#[test]
fn invalid_values_are_rejected() {
    let empty = AnnotateConfig::from_toml_str(r#"executable = """#).expect_err("empty exe");
    assert!(matches!(empty, AppError::Config(ref msg) if msg.contains("executable")));

    let zero = AnnotateConfig::from_toml_str(
        r#"
executable = "tool"

[handshake]
probe_attempts = 0
"#,
    )
    .expect_err("zero attempts");
    assert!(matches!(zero, AppError::Config(ref msg) if msg.contains("probe_attempts")));
}

/// Unknown enum values and missing working directories are config errors.
#[test]
fn bad_protocol_and_missing_dir_are_config_errors() {
    let protocol = AnnotateConfig::from_toml_str(
        r#"
executable = "tool"
protocol = "ancient"
"#,
    )
    .expect_err("unknown protocol");
    assert!(matches!(protocol, AppError::Config(_)));

    let dir = AnnotateConfig::from_toml_str(
        r#"
executable = "tool"
working_dir = "/definitely/not/a/real/dir"
"#,
    )
    .expect_err("missing dir");
    assert!(matches!(dir, AppError::Config(ref msg) if msg.contains("working_dir")));
}

/// Configuration can be loaded from a file on disk.
#[test]
fn load_from_path_reads_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, r#"executable = "tool""#).expect("write config");

    let config = AnnotateConfig::load_from_path(file.path()).expect("loads");
    assert_eq!(config.executable.to_str(), Some("tool"));

    let missing = AnnotateConfig::load_from_path("/no/such/annotate.toml")
        .expect_err("missing file");
    assert!(matches!(missing, AppError::Config(ref msg) if msg.contains("failed to read config")));
}
