//! Protocol generations spoken by different builds of the annotate tool.
//!
//! All generations share one state machine; they differ only in the data
//! captured here. [`ProtocolVariant::current`] is the tab-separated,
//! epoch-millisecond protocol with sentinels and a personal access token.
//! [`ProtocolVariant::collection`] is the same record grammar without the
//! token line or sentinels, as spoken by tool builds that added the
//! collection step first. [`ProtocolVariant::legacy`] is the older
//! whitespace-separated protocol with `MM/dd/yyyy` dates and no sentinel
//! vocabulary.
//!
//! A named generation can be adjusted field by field with
//! [`ProtocolOverrides`].

use serde::Deserialize;

/// Sentinel the current tool prints in place of a count when one file
/// cannot be annotated.
pub const FILE_FAILURE_SENTINEL: &str = "AnnotationFailedOnFile";

/// Sentinel the current tool prints when nothing in the project can be
/// annotated.
pub const PROJECT_FAILURE_SENTINEL: &str = "AnnotationFailedOnProject";

/// How the three fields of a record line are separated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSeparator {
    /// Exactly the `\t` byte; fields may contain spaces.
    Tab,
    /// Any run of spaces or tabs; fields cannot contain whitespace.
    Whitespace,
}

impl FieldSeparator {
    /// Whether `c` separates fields.
    #[must_use]
    pub fn matches(self, c: char) -> bool {
        match self {
            Self::Tab => c == '\t',
            Self::Whitespace => c == ' ' || c == '\t',
        }
    }

    /// Separator written by the record encoder.
    #[must_use]
    pub fn canonical(self) -> char {
        match self {
            Self::Tab => '\t',
            Self::Whitespace => ' ',
        }
    }
}

/// Encoding of the third record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampFormat {
    /// Base-10 milliseconds since the Unix epoch.
    EpochMillis,
    /// `MM/dd/yyyy` calendar date, midnight UTC.
    CalendarDate,
}

/// Named protocol generation, as selected in configuration.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolKind {
    /// Tab-separated records, epoch timestamps, sentinels.
    #[default]
    Current,
    /// Tab-separated records and a collection step, but no access token
    /// and no sentinels.
    Collection,
    /// Whitespace-separated records, calendar dates, no sentinels.
    Legacy,
}

impl ProtocolKind {
    /// Expand the name into its full variant description.
    #[must_use]
    pub fn variant(self) -> ProtocolVariant {
        match self {
            Self::Current => ProtocolVariant::current(),
            Self::Collection => ProtocolVariant::collection(),
            Self::Legacy => ProtocolVariant::legacy(),
        }
    }
}

/// Everything that differs between protocol generations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolVariant {
    /// Record field separator.
    pub separator: FieldSeparator,
    /// Record timestamp encoding.
    pub timestamp: TimestampFormat,
    /// Whether a personal access token line follows the password.
    pub sends_access_token: bool,
    /// Whether the handshake has a collection URI step.
    pub sends_collection_uri: bool,
    /// Replaces the count when a single file cannot be annotated.
    pub file_failure_sentinel: Option<String>,
    /// Replaces the count (or the ready line) when the project cannot be
    /// annotated at all.
    pub project_failure_sentinel: Option<String>,
    /// Whether leading `/` or `\` is removed from requested paths.
    pub strip_leading_separator: bool,
}

impl ProtocolVariant {
    /// Tab-separated protocol with sentinels and personal access token.
    #[must_use]
    pub fn current() -> Self {
        Self {
            separator: FieldSeparator::Tab,
            timestamp: TimestampFormat::EpochMillis,
            sends_access_token: true,
            sends_collection_uri: true,
            file_failure_sentinel: Some(FILE_FAILURE_SENTINEL.to_owned()),
            project_failure_sentinel: Some(PROJECT_FAILURE_SENTINEL.to_owned()),
            strip_leading_separator: true,
        }
    }

    /// Username, password and collection URI; tab-separated records with
    /// epoch timestamps. A file the tool cannot annotate gets a zero count.
    #[must_use]
    pub fn collection() -> Self {
        Self {
            separator: FieldSeparator::Tab,
            timestamp: TimestampFormat::EpochMillis,
            sends_access_token: false,
            sends_collection_uri: true,
            file_failure_sentinel: None,
            project_failure_sentinel: None,
            strip_leading_separator: false,
        }
    }

    /// Whitespace-separated protocol with calendar dates.
    #[must_use]
    pub fn legacy() -> Self {
        Self {
            separator: FieldSeparator::Whitespace,
            timestamp: TimestampFormat::CalendarDate,
            sends_access_token: false,
            sends_collection_uri: false,
            file_failure_sentinel: None,
            project_failure_sentinel: None,
            strip_leading_separator: false,
        }
    }

    /// Whether `line` is this variant's file-level failure sentinel.
    #[must_use]
    pub fn is_file_failure(&self, line: &str) -> bool {
        self.file_failure_sentinel
            .as_deref()
            .is_some_and(|s| s == line.trim())
    }

    /// Whether `line` is this variant's project-level failure sentinel.
    #[must_use]
    pub fn is_project_failure(&self, line: &str) -> bool {
        self.project_failure_sentinel
            .as_deref()
            .is_some_and(|s| s == line.trim())
    }
}

impl Default for ProtocolVariant {
    fn default() -> Self {
        Self::current()
    }
}

/// Per-field adjustments applied on top of a named generation.
///
/// Unset fields keep the generation's value.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct ProtocolOverrides {
    /// Send (or omit) the personal access token line.
    #[serde(default)]
    pub sends_access_token: Option<bool>,
    /// Include (or skip) the collection URI step.
    #[serde(default)]
    pub sends_collection_uri: Option<bool>,
    /// Strip (or keep) the leading separator of requested paths.
    #[serde(default)]
    pub strip_leading_separator: Option<bool>,
    /// Replacement file-level sentinel; an empty string disables it.
    #[serde(default)]
    pub file_failure_sentinel: Option<String>,
    /// Replacement project-level sentinel; an empty string disables it.
    #[serde(default)]
    pub project_failure_sentinel: Option<String>,
}

impl ProtocolOverrides {
    /// Whether no field is overridden.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the set fields to `variant`.
    #[must_use]
    pub fn apply(&self, mut variant: ProtocolVariant) -> ProtocolVariant {
        if let Some(flag) = self.sends_access_token {
            variant.sends_access_token = flag;
        }
        if let Some(flag) = self.sends_collection_uri {
            variant.sends_collection_uri = flag;
        }
        if let Some(flag) = self.strip_leading_separator {
            variant.strip_leading_separator = flag;
        }
        if let Some(sentinel) = &self.file_failure_sentinel {
            variant.file_failure_sentinel = non_empty(sentinel);
        }
        if let Some(sentinel) = &self.project_failure_sentinel {
            variant.project_failure_sentinel = non_empty(sentinel);
        }
        variant
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}
