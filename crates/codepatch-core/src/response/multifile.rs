//! Multi-file reply parsing.
//!
//! Patterns are tried from strictest to loosest; a looser one only runs when
//! every stricter one found nothing.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

use crate::models::{ChangeType, MultiFileChange};
use crate::response::blocks::{extract_code_blocks, normalize_language, strip_line_number_prefixes};

static HEADER_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?ms)^[#*> \t-]*\**(?:File|Path)\**:\**[ \t]*`?([^\s`*]+)`?\**[ \t]*",
        r"(?:\(([^)\n]*)\))?",
        r"[^\n]*\n(?:[ \t]*\n)*[ \t]*```[ \t]*([\w+#.-]*)[^\n]*\n(.*?)^[ \t]*```[ \t]*$",
    ))
    .unwrap()
});

/// The inside of a `(lines X-Y)` note. Dashes, en/em dashes and `to` all
/// separate the two numbers.
static LINE_NOTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^lines?[ \t]*:?[ \t]*(\d+)(?:[ \t]*(?:-|\x{2013}|\x{2014}|to)[ \t]*(\d+))?$").unwrap()
});

static CHANGE_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(delete|deleted|new|create|created)$").unwrap());

static LABELED_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?ms)^[#*> \t-]*[`*]*([\w./-]+\.[A-Za-z][\w]{0,5})[`*]*:?[ \t]*\n",
        r"(?:[ \t]*\n)*[ \t]*```[ \t]*([\w+#.-]*)[^\n]*\n(.*?)^[ \t]*```[ \t]*$",
    ))
    .unwrap()
});

const DELETE_MARKERS: &[&str] = &["DELETE", "// DELETE", "# DELETE", "-- DELETE"];

/// Result of multi-file parsing.
#[derive(Clone, Debug, PartialEq)]
pub struct MultiFileParse {
    pub changes: Vec<MultiFileChange>,
    /// Share of extracted blocks with content, scaled by 0.8.
    pub confidence: f64,
    /// Name of the pattern that produced the changes.
    pub pattern: &'static str,
}

/// One way of pulling per-file changes out of a reply.
pub trait ChangePattern: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract(&self, text: &str) -> Vec<MultiFileChange>;
}

fn trim_block(raw: &str) -> String {
    let stripped = strip_line_number_prefixes(raw);
    stripped.trim_end().trim_start_matches(['\n', '\r']).to_string()
}

fn is_delete_marker(content: &str) -> bool {
    DELETE_MARKERS.contains(&content.trim())
}

fn parse_line(caps: &Captures, idx: usize) -> Option<usize> {
    caps.get(idx).and_then(|m| m.as_str().parse().ok())
}

/// What a parenthesised header note says.
#[derive(Clone, Debug, PartialEq, Eq)]
enum HeaderNote {
    Lines(usize, usize),
    Marker(String),
    /// Mentions lines but is not a range we can trust.
    BadLines(String),
    Other,
}

fn read_note(note: &str) -> HeaderNote {
    let note = note.trim();
    if let Some(caps) = LINE_NOTE_RE.captures(note) {
        if let Some(start) = parse_line(&caps, 1) {
            let end = parse_line(&caps, 2).unwrap_or(start);
            return HeaderNote::Lines(start, end);
        }
    }
    if CHANGE_MARKER_RE.is_match(note) {
        return HeaderNote::Marker(note.to_lowercase());
    }
    if note.to_lowercase().starts_with("line") {
        return HeaderNote::BadLines(note.to_string());
    }
    HeaderNote::Other
}

/// `File: <path> (lines X-Y)` or `Path: <path>` followed by a fenced block.
pub struct HeaderPattern;

impl ChangePattern for HeaderPattern {
    fn name(&self) -> &'static str {
        "file_header"
    }

    fn extract(&self, text: &str) -> Vec<MultiFileChange> {
        HEADER_BLOCK_RE
            .captures_iter(text)
            .filter_map(|caps| {
                let path = caps.get(1)?.as_str().trim_end_matches(':').to_string();
                let content = trim_block(caps.get(4).map(|m| m.as_str()).unwrap_or_default());
                let note = caps
                    .get(2)
                    .map(|m| read_note(m.as_str()))
                    .unwrap_or(HeaderNote::Other);
                let (start_line, end_line) = match note {
                    HeaderNote::Lines(start, end) => (Some(start), Some(end)),
                    _ => (None, None),
                };
                let change_type = match &note {
                    HeaderNote::Marker(m) if m.starts_with("delete") => ChangeType::Delete,
                    HeaderNote::Marker(_) => ChangeType::Create,
                    _ if is_delete_marker(&content) => ChangeType::Delete,
                    _ => ChangeType::Modify,
                };
                let unparsed_range = match note {
                    HeaderNote::BadLines(raw) => {
                        debug!("Unreadable line range '({raw})' for {path}");
                        Some(raw)
                    }
                    _ => None,
                };
                Some(MultiFileChange {
                    file_path: path,
                    content,
                    change_type,
                    start_line,
                    end_line,
                    language: caps.get(3).and_then(|m| normalize_language(m.as_str())),
                    unparsed_range,
                })
            })
            .collect()
    }
}

/// A bare path line (`src/a.ts`, `` `src/a.ts`: ``) followed by a fenced block.
pub struct LabeledPattern;

impl ChangePattern for LabeledPattern {
    fn name(&self) -> &'static str {
        "labeled_block"
    }

    fn extract(&self, text: &str) -> Vec<MultiFileChange> {
        LABELED_BLOCK_RE
            .captures_iter(text)
            .filter_map(|caps| {
                let path = caps.get(1)?.as_str().to_string();
                let content = trim_block(caps.get(3).map(|m| m.as_str()).unwrap_or_default());
                let change_type = if is_delete_marker(&content) {
                    ChangeType::Delete
                } else {
                    ChangeType::Modify
                };
                Some(MultiFileChange {
                    file_path: path,
                    content,
                    change_type,
                    start_line: None,
                    end_line: None,
                    language: caps.get(2).and_then(|m| normalize_language(m.as_str())),
                    unparsed_range: None,
                })
            })
            .collect()
    }
}

/// Every fenced block, named `modified_file_N`.
pub struct AnonymousPattern;

impl ChangePattern for AnonymousPattern {
    fn name(&self) -> &'static str {
        "anonymous_blocks"
    }

    fn extract(&self, text: &str) -> Vec<MultiFileChange> {
        extract_code_blocks(text)
            .into_iter()
            .enumerate()
            .map(|(idx, block)| MultiFileChange {
                file_path: format!("modified_file_{}", idx + 1),
                content: block.content.trim_end().to_string(),
                change_type: ChangeType::Modify,
                start_line: None,
                end_line: None,
                language: block.language,
                unparsed_range: None,
            })
            .collect()
    }
}

fn default_patterns() -> Vec<Box<dyn ChangePattern>> {
    vec![
        Box::new(HeaderPattern),
        Box::new(LabeledPattern),
        Box::new(AnonymousPattern),
    ]
}

fn confidence_for(changes: &[MultiFileChange]) -> f64 {
    if changes.is_empty() {
        return 0.0;
    }
    let non_empty = changes
        .iter()
        .filter(|c| c.change_type == ChangeType::Delete || !c.content.trim().is_empty())
        .count();
    non_empty as f64 / changes.len() as f64 * 0.8
}

/// Per-file changes from a multi-file reply.
pub fn parse_multi_file_response(text: &str) -> MultiFileParse {
    for pattern in default_patterns() {
        let changes = pattern.extract(text);
        if changes.is_empty() {
            continue;
        }
        debug!("Multi-file pattern '{}' matched {} changes", pattern.name(), changes.len());
        return MultiFileParse {
            confidence: confidence_for(&changes),
            changes,
            pattern: pattern.name(),
        };
    }
    MultiFileParse {
        changes: Vec::new(),
        confidence: 0.0,
        pattern: "none",
    }
}

/// Turn modifications of paths the workspace does not have into creations.
pub fn mark_missing_as_create(changes: &mut [MultiFileChange], exists: impl Fn(&str) -> bool) {
    for change in changes.iter_mut() {
        if change.change_type == ChangeType::Modify && !exists(&change.file_path) {
            change.change_type = ChangeType::Create;
        }
    }
}
