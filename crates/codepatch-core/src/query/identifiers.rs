//! Candidate identifier extraction from free-form instructions.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::query::guards::MAX_IDENTIFIERS;

static PASCAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][a-z0-9]+(?:[A-Z][a-z0-9]*)*\b").unwrap());

static CAMEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-z][a-z0-9]*(?:[A-Z][a-z0-9]*)+\b").unwrap());

static SNAKE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z][A-Za-z0-9]*(?:_[A-Za-z0-9]+)+\b").unwrap());

static FILENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:[\w-]+/)*[\w-]+(?:\.[\w-]+)*\.[A-Za-z][A-Za-z0-9]{0,4}\b").unwrap()
});

const STOP_WORDS: &[&str] = &[
    "the", "and", "but", "for", "with", "from", "into", "onto", "this", "that", "these",
    "those", "then", "than", "there", "their", "when", "where", "what", "which", "while",
    "should", "would", "could", "can", "will", "please", "make", "add", "adds", "update",
    "updates", "change", "modify", "fix", "create", "remove", "delete", "rename", "refactor",
    "implement", "write", "use", "using", "new", "all", "any", "some", "each", "every",
    "function", "functions", "method", "methods", "class", "classes", "file", "files",
    "code", "line", "lines", "comment", "comments", "doc", "docs", "documentation", "also",
    "just", "only", "so", "it", "its", "you", "your", "are", "was", "were", "has", "have",
    "not", "get", "set", "out", "about", "inside", "within", "instead", "like", "need",
    "needs", "want", "let", "our", "more", "less", "better",
];

/// Stop-word check, case-insensitive.
pub fn is_stop_word(word: &str) -> bool {
    let lowered = word.to_lowercase();
    STOP_WORDS.contains(&lowered.as_str())
}

fn trim_word(word: &str) -> &str {
    word.trim_matches(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
}

/// Candidate identifiers in priority order: PascalCase, camelCase,
/// snake_case, file names, then plain words longer than two characters that
/// are not stop words. Duplicates are dropped, first occurrence kept.
pub fn extract_identifiers(instruction: &str) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut identifiers: Vec<String> = Vec::new();
    let mut push = |candidate: &str, identifiers: &mut Vec<String>| {
        if candidate.is_empty() || identifiers.len() >= MAX_IDENTIFIERS {
            return;
        }
        if seen.insert(candidate.to_string()) {
            identifiers.push(candidate.to_string());
        }
    };

    for re in [&*PASCAL_RE, &*CAMEL_RE, &*SNAKE_RE] {
        for m in re.find_iter(instruction) {
            if !is_stop_word(m.as_str()) {
                push(m.as_str(), &mut identifiers);
            }
        }
    }
    for m in FILENAME_RE.find_iter(instruction) {
        push(m.as_str(), &mut identifiers);
    }
    for raw in instruction.split_whitespace() {
        let word = trim_word(raw);
        if word.chars().count() > 2 && !is_stop_word(word) {
            push(word, &mut identifiers);
        }
    }
    identifiers
}

/// Whether an identifier names a file (has an extension-like suffix).
pub fn looks_like_filename(identifier: &str) -> bool {
    FILENAME_RE
        .find(identifier)
        .is_some_and(|m| m.start() == 0 && m.end() == identifier.len())
}

/// `src/app/Main.ts` -> `main`; plain identifiers are only lowercased.
pub fn identifier_stem(identifier: &str) -> String {
    if looks_like_filename(identifier) {
        crate::models::base_name_of(identifier).to_lowercase()
    } else {
        identifier.to_lowercase()
    }
}
