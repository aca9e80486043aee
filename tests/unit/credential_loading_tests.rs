//! Unit tests for runtime credential loading.
//!
//! The test environment has no keychain entry for the `tfvc-annotate`
//! service, so secrets resolve from environment variables.
//!
//! NOTE: These tests mutate process-global env vars and must run serially.

use tfvc_annotate::config::AnnotateConfig;

const VARS: [&str; 4] = [
    "TFVC_USERNAME",
    "TFVC_PASSWORD",
    "TFVC_PAT",
    "TFVC_COLLECTION_URI",
];

#[allow(unsafe_code)]
fn clear_env() {
    for var in VARS {
        unsafe {
            std::env::remove_var(var);
        }
    }
}

fn config_with_file_credentials() -> AnnotateConfig {
    AnnotateConfig::from_toml_str(
        r#"
executable = "tool"

[credentials]
username = "from-file"
collection_uri = "https://file.example/tfs"
"#,
    )
    .expect("config parses")
}

/// Env vars supply secrets and override the file's non-secret fields.
#[tokio::test]
#[serial_test::serial]
#[allow(unsafe_code)]
async fn env_vars_supply_and_override_credentials() {
    clear_env();
    unsafe {
        std::env::set_var("TFVC_USERNAME", "DOMAIN\\env-user");
        std::env::set_var("TFVC_PASSWORD", "env-password");
        std::env::set_var("TFVC_PAT", "env-pat");
        std::env::set_var("TFVC_COLLECTION_URI", "https://env.example/tfs");
    }

    let mut config = config_with_file_credentials();
    config.load_credentials().await.expect("credentials load");

    assert_eq!(config.credentials.username, "DOMAIN\\env-user");
    assert_eq!(config.credentials.password, "env-password");
    assert_eq!(config.credentials.personal_access_token, "env-pat");
    assert_eq!(config.credentials.collection_uri, "https://env.example/tfs");

    clear_env();
}

/// Without env vars the file values stay and secrets default to empty,
/// which the tool reads as the ambient identity.
#[tokio::test]
#[serial_test::serial]
async fn missing_secrets_default_to_empty() {
    clear_env();

    let mut config = config_with_file_credentials();
    config.load_credentials().await.expect("credentials load");

    assert_eq!(config.credentials.username, "from-file");
    assert_eq!(config.credentials.collection_uri, "https://file.example/tfs");
    assert!(config.credentials.password.is_empty());
    assert!(config.credentials.personal_access_token.is_empty());
}

/// Loaded secrets never show up in debug output.
#[tokio::test]
#[serial_test::serial]
#[allow(unsafe_code)]
async fn loaded_secrets_are_masked_in_debug() {
    clear_env();
    unsafe {
        std::env::set_var("TFVC_PASSWORD", "correct-horse-battery-staple");
    }

    let mut config = config_with_file_credentials();
    config.load_credentials().await.expect("credentials load");

    let rendered = format!("{config:?}");
    assert!(!rendered.contains("correct-horse-battery-staple"));
    assert!(rendered.contains("co***le"));

    clear_env();
}
