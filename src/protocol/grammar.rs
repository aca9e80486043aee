//! Response grammar of the annotate tool.
//!
//! ```text
//! record    = revision SEP author SEP timestamp [SEP ignored]
//! count     = digits [WS note]
//! timestamp = digits                       ; epoch milliseconds
//!           | month "/" day "/" year       ; legacy calendar date
//! ```
//!
//! `SEP` is a single tab in the current protocol and any run of spaces or
//! tabs in the legacy one. Each field is trimmed; an empty revision or
//! author is a grammar violation. Anything after the third field (some tool
//! builds append the source text) is ignored.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::warn;

use crate::models::annotation::AnnotationRecord;
use crate::protocol::variant::{FieldSeparator, ProtocolVariant, TimestampFormat};
use crate::AppError;

/// Date layout of the legacy protocol.
pub const CALENDAR_DATE_FORMAT: &str = "%m/%d/%Y";

/// Line prefixes the tool uses for lines that have no committed revision
/// (`local` changes and `unknown` state, sometimes truncated).
const UNVERSIONED_PREFIXES: &[&str] = &["local", "unknow"];

/// Written in place of a timestamp the encoder does not know.
const MISSING_TIMESTAMP: &str = "-";

/// Why a record line was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordError {
    /// The line does not contain three non-empty fields.
    Malformed,
    /// The line reports a local or unknown revision.
    NotVersionControlled,
}

impl RecordError {
    /// Attach the file and 1-based record index to the rejection.
    #[must_use]
    pub fn at(self, path: &str, index: usize, line: &str) -> AppError {
        let (path, line) = (path.to_owned(), line.to_owned());
        match self {
            Self::Malformed => AppError::MalformedRecord { path, index, line },
            Self::NotVersionControlled => AppError::NotVersionControlled { path, index, line },
        }
    }
}

/// Count line announcing how many records follow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredCount {
    /// Number of record lines that follow.
    pub count: usize,
    /// Trailing explanation, e.g. `0 - is a binary one: foo.dll`.
    pub note: Option<String>,
}

/// Parse one record line.
///
/// # Errors
///
/// - [`RecordError::NotVersionControlled`]: the line starts with `local`
///   or `unknow`.
/// - [`RecordError::Malformed`]: fewer than three non-empty fields.
pub fn parse_record(
    line: &str,
    variant: &ProtocolVariant,
) -> std::result::Result<AnnotationRecord, RecordError> {
    let body = line.trim();
    if UNVERSIONED_PREFIXES.iter().any(|p| body.starts_with(p)) {
        return Err(RecordError::NotVersionControlled);
    }

    let [revision, author, timestamp] =
        split_fields(body, variant.separator).ok_or(RecordError::Malformed)?;

    Ok(AnnotationRecord {
        revision: revision.to_owned(),
        author: author.to_owned(),
        timestamp: parse_timestamp(timestamp, variant.timestamp),
    })
}

/// Parse a count line.
///
/// Returns `None` when the line does not start with a non-negative
/// integer.
#[must_use]
pub fn parse_count(line: &str) -> Option<DeclaredCount> {
    let body = line.trim();
    let digits_end = body
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(body.len());
    if digits_end == 0 {
        return None;
    }

    let (digits, rest) = body.split_at(digits_end);
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }

    let count = digits.parse().ok()?;
    let note = rest.trim();
    Some(DeclaredCount {
        count,
        note: (!note.is_empty()).then(|| note.to_owned()),
    })
}

/// Render `record` as a record line in `variant`'s grammar.
#[must_use]
pub fn encode_record(record: &AnnotationRecord, variant: &ProtocolVariant) -> String {
    let sep = variant.separator.canonical();
    let timestamp = match (record.timestamp, variant.timestamp) {
        (None, _) => MISSING_TIMESTAMP.to_owned(),
        (Some(ts), TimestampFormat::EpochMillis) => ts.timestamp_millis().to_string(),
        (Some(ts), TimestampFormat::CalendarDate) => {
            ts.format(CALENDAR_DATE_FORMAT).to_string()
        }
    };
    format!("{}{sep}{}{sep}{timestamp}", record.revision, record.author)
}

/// Split a trimmed line into its first three fields.
fn split_fields(body: &str, separator: FieldSeparator) -> Option<[&str; 3]> {
    let mut fields: Box<dyn Iterator<Item = &str> + '_> = match separator {
        FieldSeparator::Tab => Box::new(body.split('\t').map(str::trim)),
        FieldSeparator::Whitespace => Box::new(
            body.split(move |c: char| separator.matches(c))
                .filter(|field| !field.is_empty()),
        ),
    };

    let mut next = || fields.next().filter(|field| !field.is_empty());
    Some([next()?, next()?, next()?])
}

/// Decode a timestamp field; unreadable values become `None`.
fn parse_timestamp(raw: &str, format: TimestampFormat) -> Option<DateTime<Utc>> {
    let parsed = match format {
        TimestampFormat::EpochMillis => raw
            .parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis),
        TimestampFormat::CalendarDate => NaiveDate::parse_from_str(raw, CALENDAR_DATE_FORMAT)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc()),
    };

    if parsed.is_none() {
        warn!(raw, ?format, "skipping unparseable record timestamp");
    }
    parsed
}
