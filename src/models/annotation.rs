//! Annotation request and result types exchanged with the batch driver.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Authorship of one source line as reported by the annotate tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AnnotationRecord {
    /// Changeset identifier that last touched the line.
    pub revision: String,
    /// Owner of that changeset (email or account name).
    pub author: String,
    /// Creation time of the changeset; `None` when the tool's date
    /// could not be parsed.
    pub timestamp: Option<DateTime<Utc>>,
}

impl AnnotationRecord {
    /// Create a record from its three fields.
    #[must_use]
    pub fn new(
        revision: impl Into<String>,
        author: impl Into<String>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            revision: revision.into(),
            author: author.into(),
            timestamp,
        }
    }
}

/// One file to annotate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAnnotationRequest {
    /// Path of the file relative to the project base directory.
    pub path: String,
    /// Number of lines the file actually has.
    pub line_count: usize,
}

impl FileAnnotationRequest {
    /// Create a request for `path` with its true line count.
    #[must_use]
    pub fn new(path: impl Into<String>, line_count: usize) -> Self {
        Self {
            path: path.into(),
            line_count,
        }
    }

    /// Path as written on the wire.
    ///
    /// With `strip_leading_separator` any leading `/` or `\` is removed;
    /// the tool echoes this exact string back.
    #[must_use]
    pub fn wire_path(&self, strip_leading_separator: bool) -> &str {
        if strip_leading_separator {
            self.path.trim_start_matches(['/', '\\'])
        } else {
            &self.path
        }
    }
}

/// Completed annotation of one file, one record per source line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct FileAnnotationResult {
    /// Path of the annotated file, as it was requested.
    pub path: String,
    /// Records in source-line order.
    pub lines: Vec<AnnotationRecord>,
}
