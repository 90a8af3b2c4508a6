//! Line-range edits.
//!
//! Stated 1-based inclusive line numbers are mapped directly onto the
//! document's current lines. There is no alignment against drift: stale
//! numbers replace whatever lines now sit there. Implausible numbers are
//! logged and clamped to the document end.

use tracing::warn;

use crate::models::{EditKind, ParsedEdit, TextRange};

/// Where a range edit lands in a document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RangePlan {
    pub range: TextRange,
    pub replacement: String,
    /// Stated numbers had to be adjusted.
    pub clamped: bool,
    /// 1-based inclusive lines actually replaced (start > end means insertion).
    pub start_line: usize,
    pub end_line: usize,
}

/// Byte offset where each line starts, plus the document length at the end.
fn line_starts(document: &str) -> Vec<usize> {
    let mut starts = vec![0];
    for (idx, byte) in document.bytes().enumerate() {
        if byte == b'\n' && idx + 1 < document.len() {
            starts.push(idx + 1);
        }
    }
    starts
}

fn line_count(document: &str) -> usize {
    if document.is_empty() {
        0
    } else {
        line_starts(document).len()
    }
}

/// Plan replacing lines `start..=end` with `content`.
pub fn plan_range_edit(document: &str, start_line: usize, end_line: Option<usize>, content: &str) -> RangePlan {
    let total = line_count(document);
    let mut clamped = false;
    let mut start = start_line;
    let mut end = end_line.unwrap_or(start_line);

    if start == 0 {
        warn!("Line numbers are 1-based; treating start line 0 as 1");
        start = 1;
        clamped = true;
    }
    if end < start {
        warn!("End line {end} precedes start line {start}; replacing only line {start}");
        end = start;
        clamped = true;
    }
    if start > total {
        warn!("Start line {start} is beyond the document end ({total} lines); appending");
        start = total + 1;
        end = total;
        clamped = true;
    } else if end > total {
        warn!("End line {end} is beyond the document end ({total} lines); clamping");
        end = total;
        clamped = true;
    }

    let starts = line_starts(document);
    let byte_start = if start > total {
        document.len()
    } else {
        starts[start - 1]
    };
    let byte_end = if end >= total || start > total {
        document.len()
    } else {
        starts[end]
    };

    let replaced = &document[byte_start..byte_end];
    let mut replacement = String::new();
    if start > total && !document.is_empty() && !document.ends_with('\n') {
        replacement.push('\n');
    }
    replacement.push_str(content);
    let needs_newline = replaced.ends_with('\n') || byte_end < document.len() || start > total;
    if needs_newline && !content.is_empty() && !content.ends_with('\n') {
        replacement.push('\n');
    }

    RangePlan {
        range: TextRange::new(byte_start, byte_end),
        replacement,
        clamped,
        start_line: start,
        end_line: end,
    }
}

/// Apply a range splice to a document.
pub fn splice(document: &str, range: TextRange, replacement: &str) -> String {
    let mut next = String::with_capacity(document.len() + replacement.len());
    next.push_str(&document[..range.start]);
    next.push_str(replacement);
    next.push_str(&document[range.end..]);
    next
}

/// Apply a range or whole-file edit to a document. Returns the new text and
/// whether the edit could be applied.
pub fn apply_range_edit(document: &str, edit: &ParsedEdit) -> (String, bool) {
    match (edit.kind, edit.start_line) {
        (EditKind::ReplaceRange, Some(start)) => {
            let plan = plan_range_edit(document, start, edit.end_line, &edit.content);
            (splice(document, plan.range, &plan.replacement), true)
        }
        (EditKind::ReplaceWholeFile, _) => (whole_file_text(document, &edit.content), true),
        _ => {
            warn!("Range edit without a start line cannot be applied");
            (document.to_string(), false)
        }
    }
}

/// Whole-document replacement keeping the original trailing-newline habit.
pub fn whole_file_text(document: &str, content: &str) -> String {
    let mut text = content.to_string();
    if document.ends_with('\n') && !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text
}
