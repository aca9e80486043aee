//! Completion of per-file results and hand-off to the output sink.

use tracing::debug;

use crate::models::annotation::{AnnotationRecord, FileAnnotationRequest, FileAnnotationResult};

/// Receiver of completed annotations.
///
/// Called at most once per file, in request order, as soon as the file is
/// complete. A result handed to the sink is final: a later batch failure
/// stops further deliveries but never retracts earlier ones.
pub trait AnnotationSink: Send {
    /// Accept the annotation of one file.
    fn blame_result(&mut self, result: FileAnnotationResult);
}

impl AnnotationSink for Vec<FileAnnotationResult> {
    fn blame_result(&mut self, result: FileAnnotationResult) {
        self.push(result);
    }
}

/// Repeat the last record when the tool skipped the file's final line.
///
/// The tool reports nothing for a trailing empty line, so a file whose
/// records fall exactly one short of its line count gets the last known
/// authorship repeated once. Returns whether a record was added. Applying
/// it to a result that already has the right count changes nothing.
pub fn fill_trailing_line(lines: &mut Vec<AnnotationRecord>, line_count: usize) -> bool {
    if lines.len() + 1 != line_count {
        return false;
    }
    let Some(last) = lines.last().cloned() else {
        return false;
    };
    lines.push(last);
    true
}

/// Normalize `lines` for `request` and deliver the result to `sink`.
pub fn deliver(
    sink: &mut dyn AnnotationSink,
    request: &FileAnnotationRequest,
    mut lines: Vec<AnnotationRecord>,
) {
    if fill_trailing_line(&mut lines, request.line_count) {
        debug!(
            path = request.path.as_str(),
            "annotation repeated onto trailing empty line"
        );
    }
    sink.blame_result(FileAnnotationResult {
        path: request.path.clone(),
        lines,
    });
}
