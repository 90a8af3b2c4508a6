//! Shared typed models used across indexing, resolution, parsing, and patching.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Milliseconds since the Unix epoch, saturating to zero on clock skew.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// 1. FileRecord
// ---------------------------------------------------------------------------

/// Shallow metadata for one indexed source file.
///
/// Records are replaced wholesale on re-index, never merged.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub relative_path: String,
    pub functions: Vec<String>,
    pub classes: Vec<String>,
    pub exports: Vec<String>,
    pub imports: Vec<String>,
    pub line_count: usize,
    pub language: String,
    pub last_modified_ms: u64,
    pub summary: String,
    pub content_hash: String,
    pub size_bytes: u64,
}

impl FileRecord {
    /// Basename with extension; the index lookup key.
    pub fn file_name(&self) -> String {
        file_name_of(&self.relative_path)
    }

    /// Basename without its last extension (`main.ts` -> `main`).
    pub fn base_name(&self) -> String {
        base_name_of(&self.relative_path)
    }

    pub fn symbol_count(&self) -> usize {
        self.functions.len() + self.classes.len() + self.exports.len()
    }
}

pub fn file_name_of(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

pub fn base_name_of(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string())
}

// ---------------------------------------------------------------------------
// 2. Index statistics
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct IndexStats {
    pub file_count: usize,
    pub function_count: usize,
    pub class_count: usize,
    pub export_count: usize,
    pub files_seen: usize,
    pub skipped_too_large: usize,
    pub skipped_over_limit: usize,
    pub skipped_errors: usize,
    pub last_build_ms: Option<u64>,
    pub build_duration_ms: u64,
    pub in_progress: bool,
    pub generation: u64,
}

// ---------------------------------------------------------------------------
// 3. FileMatch
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Class,
    Function,
    Export,
    Fuzzy,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Exact => "exact",
            MatchType::Class => "class",
            MatchType::Function => "function",
            MatchType::Export => "export",
            MatchType::Fuzzy => "fuzzy",
        }
    }
}

/// A scored candidate file. Scores rank within one resolution only.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FileMatch {
    pub file: FileRecord,
    pub score: f64,
    pub match_type: MatchType,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// 4. ComposedContext
// ---------------------------------------------------------------------------

/// One editable file as it was shown to the model.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IncludedFile {
    pub relative_path: String,
    /// SHA-256 of the full file content at compose time.
    pub content_hash: String,
    pub line_count: usize,
    pub shown_lines: usize,
    pub truncated: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ComposedContext {
    pub system_prompt: String,
    pub user_prompt: String,
    pub files_used: Vec<FileMatch>,
    pub included_files: Vec<IncludedFile>,
    pub load_errors: Vec<String>,
    pub estimated_tokens: usize,
    pub redaction_hits: usize,
}

impl ComposedContext {
    pub fn included(&self, relative_path: &str) -> Option<&IncludedFile> {
        let wanted = relative_path.trim_start_matches("./");
        self.included_files.iter().find(|f| {
            f.relative_path == wanted || file_name_of(&f.relative_path) == file_name_of(wanted)
        })
    }
}

// ---------------------------------------------------------------------------
// 5. ParsedEdit / ParsedOutput
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EditKind {
    ReplaceRange,
    ReplaceWholeFile,
    FunctionUpdate,
}

impl EditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditKind::ReplaceRange => "replace_range",
            EditKind::ReplaceWholeFile => "replace_whole_file",
            EditKind::FunctionUpdate => "function_update",
        }
    }
}

/// One model-proposed change, not yet resolved against a file.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ParsedEdit {
    /// File name or function name as stated by the model.
    pub target: Option<String>,
    pub kind: EditKind,
    /// 1-based inclusive.
    pub start_line: Option<usize>,
    /// 1-based inclusive.
    pub end_line: Option<usize>,
    pub content: String,
    pub confidence: f64,
    pub language: Option<String>,
    pub label: Option<String>,
}

impl ParsedEdit {
    pub fn whole_file(content: impl Into<String>, confidence: f64) -> Self {
        Self {
            target: None,
            kind: EditKind::ReplaceWholeFile,
            start_line: None,
            end_line: None,
            content: content.into(),
            confidence,
            language: None,
            label: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    CodeOnly,
    CodeWithExplanation,
    ExplanationOnly,
    Multifile,
}

/// Advisory classification used to pick an apply strategy.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PatchType {
    Inline,
    Refactor,
    Generation,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Create,
    Modify,
    Delete,
}

/// One per-file operation extracted from a multi-file reply.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MultiFileChange {
    pub file_path: String,
    pub content: String,
    pub change_type: ChangeType,
    pub start_line: Option<usize>,
    pub end_line: Option<usize>,
    pub language: Option<String>,
    /// Header line note that names lines but could not be read as a range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unparsed_range: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct OutputMetadata {
    pub has_code_blocks: bool,
    pub has_comments: bool,
    pub has_imports: bool,
    pub block_count: usize,
}

/// Aggregate interpretation of one model reply.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ParsedOutput {
    pub response_type: ResponseType,
    pub patch_type: PatchType,
    /// Primary code payload, fences stripped. Empty when nothing was extracted.
    pub code: String,
    pub primary: Option<ParsedEdit>,
    pub alternatives: Vec<ParsedEdit>,
    pub changes: Vec<MultiFileChange>,
    pub explanation: Option<String>,
    pub language: Option<String>,
    pub confidence: f64,
    pub metadata: OutputMetadata,
}

// ---------------------------------------------------------------------------
// 6. Text ranges
// ---------------------------------------------------------------------------

/// Half-open byte range `[start, end)` into a document.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn whole(text: &str) -> Self {
        Self {
            start: 0,
            end: text.len(),
        }
    }

    pub fn is_whole(&self, text: &str) -> bool {
        self.start == 0 && self.end == text.len()
    }
}

// ---------------------------------------------------------------------------
// 7. Patch history
// ---------------------------------------------------------------------------

/// Append-only audit record of one apply attempt.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PatchHistoryEntry {
    pub timestamp_ms: u64,
    pub file_path: String,
    pub instruction: String,
    pub before: String,
    pub after: String,
    pub success: bool,
    pub confidence: f64,
    pub edit_kind: EditKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(rel: &str) -> FileRecord {
        FileRecord {
            path: PathBuf::from("/w").join(rel),
            relative_path: rel.to_string(),
            functions: vec!["a".into()],
            classes: vec![],
            exports: vec!["b".into()],
            imports: vec![],
            line_count: 3,
            language: "typescript".into(),
            last_modified_ms: 0,
            summary: String::new(),
            content_hash: String::new(),
            size_bytes: 0,
        }
    }

    #[test]
    fn test_base_and_file_name() {
        let r = record("src/app/main.test.ts");
        assert_eq!(r.file_name(), "main.test.ts");
        assert_eq!(r.base_name(), "main.test");
        assert_eq!(r.symbol_count(), 2);
    }

    #[test]
    fn test_match_type_serializes_lowercase() {
        let json = serde_json::to_string(&MatchType::Exact).unwrap();
        assert_eq!(json, "\"exact\"");
        assert_eq!(MatchType::Fuzzy.as_str(), "fuzzy");
    }

    #[test]
    fn test_composed_context_lookup_by_basename() {
        let ctx = ComposedContext {
            included_files: vec![IncludedFile {
                relative_path: "src/x.ts".into(),
                content_hash: "h".into(),
                line_count: 1,
                shown_lines: 1,
                truncated: false,
            }],
            ..Default::default()
        };
        assert!(ctx.included("x.ts").is_some());
        assert!(ctx.included("./src/x.ts").is_some());
        assert!(ctx.included("y.ts").is_none());
    }
}
