//! Option structs for each pipeline stage plus environment toggles.
//!
//! Every struct deserializes with `#[serde(default)]`, so a host can hand over
//! a partial JSON document and get the documented defaults for the rest.

use serde::{Deserialize, Serialize};

use crate::errors::CodepatchResult;

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(val) => {
            let v = val.trim().to_lowercase();
            if default {
                !matches!(v.as_str(), "0" | "false" | "no" | "off")
            } else {
                matches!(v.as_str(), "1" | "true" | "yes" | "on")
            }
        }
        Err(_) => default,
    }
}

/// Whether the built-in sensitive-file exclude list applies (default on).
pub fn exclude_sensitive_enabled() -> bool {
    env_flag("CODEPATCH_EXCLUDE_SENSITIVE", true)
}

/// Whether fuzzy resolution passes may run at all (default on).
pub fn fuzzy_matching_enabled() -> bool {
    env_flag("CODEPATCH_FUZZY", true)
}

// ---------------------------------------------------------------------------
// Index
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexOptions {
    /// Glob patterns a relative path must match (any). Empty means all files.
    pub include_patterns: Vec<String>,
    /// Glob patterns that exclude a relative path. A trailing `/` excludes a directory.
    pub exclude_patterns: Vec<String>,
    pub max_files: usize,
    pub max_file_size_bytes: u64,
    pub workers: usize,
    pub exclude_sensitive: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            max_files: 1000,
            max_file_size_bytes: 1024 * 1024,
            workers: 4,
            exclude_sensitive: exclude_sensitive_enabled(),
        }
    }
}

// ---------------------------------------------------------------------------
// Resolve
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResolveOptions {
    pub max_results: usize,
    pub min_score: f64,
    pub enable_fuzzy_matching: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            max_results: 5,
            min_score: 0.1,
            enable_fuzzy_matching: fuzzy_matching_enabled(),
        }
    }
}

// ---------------------------------------------------------------------------
// Compose
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeOptions {
    pub max_files_to_include: usize,
    pub max_content_lines: usize,
    /// Advisory only: exceeding it is logged, never enforced.
    pub max_tokens: usize,
    pub include_related_summaries: bool,
    pub redact_secrets: bool,
    pub line_number_width: usize,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            max_files_to_include: 3,
            max_content_lines: 500,
            max_tokens: 8000,
            include_related_summaries: true,
            redact_secrets: true,
            line_number_width: 4,
        }
    }
}

// ---------------------------------------------------------------------------
// Parse
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseContext {
    pub expected_language: Option<String>,
    pub expect_multi_file: bool,
    pub instruction: String,
}

// ---------------------------------------------------------------------------
// Apply
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyOptions {
    pub require_confirmation: bool,
    /// Refuse range edits when the file changed since the prompt was composed.
    pub verify_line_content: bool,
    pub history_capacity: usize,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            require_confirmation: true,
            verify_line_content: false,
            history_capacity: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

/// Full configuration document accepted by hosts (`--config` in the CLI).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CodepatchConfig {
    pub index: IndexOptions,
    pub resolve: ResolveOptions,
    pub compose: ComposeOptions,
    pub apply: ApplyOptions,
}

impl CodepatchConfig {
    pub fn from_json(text: &str) -> CodepatchResult<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
