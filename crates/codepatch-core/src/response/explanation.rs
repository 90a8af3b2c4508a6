//! Prose extraction and advisory patch-type inference.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::PatchType;
use crate::response::classify::looks_like_code;

static FENCED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?ms)^[ \t]*```[^\n]*\n.*?^[ \t]*```[ \t]*$").unwrap());

static HEADER_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[#*>\s-]*\**(?:File|Path)\**:.*$").unwrap());

static BLANK_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n[ \t]*\n").unwrap());

static BOILERPLATE_RE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)^(?:sure|certainly|of course|absolutely|okay|ok)\b[!,.]*\s*").unwrap(),
        Regex::new(r"(?i)^here(?:'s| is| are)\b[^:\n]*:\s*").unwrap(),
        Regex::new(r"(?i)^(?:i've|i have) (?:updated|modified|changed|made)[^:\n]*:\s*").unwrap(),
        Regex::new(r"(?i)^the (?:updated|modified|following|new) code[^:\n]*:\s*").unwrap(),
    ]
});

const MIN_PARAGRAPH_CHARS: usize = 10;

const REFACTOR_KEYWORDS: &[&str] = &[
    "refactor", "restructur", "reorganiz", "extract", "rename", "simplif", "clean up",
    "cleanup", "split", "decouple", "consolidat",
];

const GENERATION_KEYWORDS: &[&str] = &[
    "create", "generate", "scaffold", "implement", "write a", "write an", "add a new",
    "new file", "new function", "new class", "boilerplate",
];

fn strip_boilerplate(paragraph: &str) -> String {
    let mut text = paragraph.trim().to_string();
    loop {
        let before = text.len();
        for re in BOILERPLATE_RE.iter() {
            text = re.replace(&text, "").trim().to_string();
        }
        if text.len() == before {
            return text;
        }
    }
}

/// Prose left after removing fenced blocks, file headers and lead-in phrases.
/// Paragraphs of ten characters or fewer, or that look like code, are dropped.
pub fn extract_explanation(text: &str) -> Option<String> {
    let without_code = FENCED_RE.replace_all(text, "\n\n");
    let without_headers = HEADER_LINE_RE.replace_all(&without_code, "");
    let paragraphs: Vec<String> = BLANK_SPLIT_RE
        .split(&without_headers)
        .map(strip_boilerplate)
        .filter(|p| p.chars().count() > MIN_PARAGRAPH_CHARS && !looks_like_code(p))
        .collect();
    if paragraphs.is_empty() {
        None
    } else {
        Some(paragraphs.join("\n\n"))
    }
}

/// Refactor wording in the explanation wins over generation wording in the
/// instruction; anything else is an inline edit.
pub fn infer_patch_type(explanation: Option<&str>, instruction: &str) -> PatchType {
    let explanation = explanation.unwrap_or_default().to_lowercase();
    if REFACTOR_KEYWORDS.iter().any(|k| explanation.contains(k)) {
        return PatchType::Refactor;
    }
    let instruction = instruction.to_lowercase();
    if GENERATION_KEYWORDS.iter().any(|k| instruction.contains(k)) {
        return PatchType::Generation;
    }
    PatchType::Inline
}
