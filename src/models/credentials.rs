//! Handshake credentials.

use std::fmt::{Debug, Formatter};

use serde::Deserialize;

/// The four strings sent during the handshake.
///
/// Every field defaults to the empty string, which the tool reads as
/// "use the ambient (anonymous or integrated) identity".
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct Credentials {
    /// Account name.
    pub username: String,
    /// Password for `username`; loaded at runtime, never from the file.
    #[serde(skip)]
    pub password: String,
    /// Personal access token; loaded at runtime, never from the file.
    #[serde(skip)]
    pub personal_access_token: String,
    /// URI of the collection the tool connects to.
    pub collection_uri: String,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &mask(&self.password))
            .field("personal_access_token", &mask(&self.personal_access_token))
            .field("collection_uri", &self.collection_uri)
            .finish()
    }
}

/// Hide the middle of a secret for logging.
///
/// A tenth of the characters is kept at each end; short secrets are fully
/// replaced. Empty input stays empty so anonymous sessions are visible.
#[must_use]
pub fn mask(secret: &str) -> String {
    if secret.is_empty() {
        return String::new();
    }
    let chars: Vec<char> = secret.chars().collect();
    let plain = chars.len() / 10;
    let prefix: String = chars[..plain].iter().collect();
    let suffix: String = chars[chars.len() - plain..].iter().collect();
    format!("{prefix}***{suffix}")
}
