//! Fenced code block extraction and per-block scoring.

use std::sync::LazyLock;

use regex::Regex;

use crate::indexer::filesystem::{detect_language, TEXT_LANGUAGE};
use crate::patch::validate::is_balanced;

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?ms)^[ \t]*```[ \t]*([\w+#.-]*)[^\n]*\n(.*?)^[ \t]*```[ \t]*$").unwrap()
});

static FENCE_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*```[\w+#.-]*[ \t]*$").unwrap());

static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:option|alternative|approach|solution|version)\s*#?\s*\d+").unwrap()
});

static ECHOED_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\d+: ?").unwrap());

static IMPORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:import\s|from\s+\S+\s+import\s|use\s+[\w:]+|#include\s|require\(|using\s+[\w.]+;|package\s)").unwrap()
});

static DOC_COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)/\*\*.*?\*/").unwrap());

static DOC_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*\*\s*([A-Za-z_$][\w$]*)\s+-\s+\S").unwrap());

const BASE_CONFIDENCE: f64 = 0.6;

/// One fenced block of a model reply.
#[derive(Clone, Debug, PartialEq)]
pub struct CodeBlock {
    pub language: Option<String>,
    /// `Option N` style label from the line before the fence.
    pub label: Option<String>,
    /// The non-empty line immediately before the fence.
    pub header: Option<String>,
    pub content: String,
    /// Byte span of the whole fenced block in the reply.
    pub start: usize,
    pub end: usize,
}

/// Map a fence tag (`ts`, `py`, `TypeScript`) to an index language name.
pub fn normalize_language(tag: &str) -> Option<String> {
    let tag = tag.trim().to_lowercase();
    if tag.is_empty() {
        return None;
    }
    let by_extension = detect_language(&format!("x.{tag}"));
    if by_extension != TEXT_LANGUAGE {
        return Some(by_extension);
    }
    let named = match tag.as_str() {
        "c++" => "cpp",
        "c#" => "csharp",
        "golang" => "go",
        other => other,
    };
    Some(named.to_string())
}

/// Strip echoed `N: ` prefixes when every non-empty line carries one.
pub fn strip_line_number_prefixes(content: &str) -> String {
    let non_empty: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    if non_empty.is_empty() || !non_empty.iter().all(|l| ECHOED_NUMBER_RE.is_match(l)) {
        return content.to_string();
    }
    content
        .lines()
        .map(|l| ECHOED_NUMBER_RE.replace(l, "").into_owned())
        .collect::<Vec<_>>()
        .join("\n")
}

fn last_non_empty_line(text: &str) -> Option<String> {
    text.lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

/// All closed fenced blocks in order of appearance.
pub fn extract_code_blocks(text: &str) -> Vec<CodeBlock> {
    let mut blocks = Vec::new();
    let mut previous_end = 0usize;
    for caps in FENCE_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let raw = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        let content = strip_line_number_prefixes(raw.trim_end_matches(['\n', '\r']));
        let header = last_non_empty_line(&text[previous_end..whole.start()]);
        let label = header
            .as_deref()
            .and_then(|h| LABEL_RE.find(h))
            .map(|m| m.as_str().to_string());
        blocks.push(CodeBlock {
            language: caps.get(1).and_then(|m| normalize_language(m.as_str())),
            label,
            header,
            content,
            start: whole.start(),
            end: whole.end(),
        });
        previous_end = whole.end();
    }
    blocks
}

/// Drop fence marker lines and surrounding blank lines. Text without any
/// fence marker is returned unchanged.
pub fn clean_code(text: &str) -> String {
    if !text.contains("```") {
        return text.to_string();
    }
    let kept: Vec<&str> = text
        .lines()
        .filter(|line| !FENCE_LINE_RE.is_match(line))
        .collect();
    let joined = kept.join("\n");
    joined.trim_matches(['\n', '\r']).trim_end().to_string()
}

pub fn has_imports(code: &str) -> bool {
    IMPORT_RE.is_match(code)
}

pub fn has_comments(code: &str) -> bool {
    code.lines().any(|line| {
        let t = line.trim_start();
        t.starts_with("//") || t.starts_with("/*") || t.starts_with("* ") || t.starts_with("# ")
    })
}

/// The block does not stop mid-statement for its language.
pub fn looks_complete(code: &str, language: Option<&str>) -> bool {
    let Some(last) = code.lines().rev().map(str::trim_end).find(|l| !l.trim().is_empty()) else {
        return false;
    };
    if last.ends_with(',') || last.ends_with('(') || last.ends_with('=') || last.ends_with('\\') {
        return false;
    }
    if language == Some("python") && last.ends_with(':') {
        return false;
    }
    true
}

/// Heuristic block confidence in `[0, 1]`.
pub fn block_confidence(block: &CodeBlock) -> f64 {
    if block.content.trim().is_empty() {
        return 0.0;
    }
    let mut score = BASE_CONFIDENCE;
    score += if is_balanced(&block.content) { 0.2 } else { -0.3 };
    if looks_complete(&block.content, block.language.as_deref()) {
        score += 0.1;
    }
    if block.language.is_some() {
        score += 0.05;
    }
    score.clamp(0.0, 1.0)
}

/// A `/** ... */` documentation update: the function it names and the
/// comment text. `None` when the block has no doc comment or no
/// `* name - description` line.
pub fn doc_comment_update(content: &str) -> Option<(String, String)> {
    let comment = DOC_COMMENT_RE.find(content)?;
    let name = DOC_NAME_RE.captures(comment.as_str())?.get(1)?.as_str().to_string();
    Some((name, comment.as_str().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_blocks_with_labels() {
        let reply = "Intro text.\n\nOption 1:\n```ts\nconst a = 1;\n```\n\nAlternative 2\n```python\nx = 1\n```\n";
        let blocks = extract_code_blocks(reply);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].language.as_deref(), Some("typescript"));
        assert_eq!(blocks[0].label.as_deref(), Some("Option 1"));
        assert_eq!(blocks[0].content, "const a = 1;");
        assert_eq!(blocks[1].language.as_deref(), Some("python"));
        assert_eq!(blocks[1].label.as_deref(), Some("Alternative 2"));
    }

    #[test]
    fn test_unclosed_fence_is_not_a_block() {
        assert!(extract_code_blocks("```js\nconst a = 1;\n").is_empty());
    }

    #[test]
    fn test_echoed_line_numbers_stripped() {
        let reply = "```ts\n   3: const a = 1;\n   4: const b = 2;\n```";
        let blocks = extract_code_blocks(reply);
        assert_eq!(blocks[0].content, "const a = 1;\nconst b = 2;");
        assert_eq!(strip_line_number_prefixes("a: 1\nb"), "a: 1\nb");
    }

    #[test]
    fn test_clean_code_idempotent() {
        let clean = "fn main() {\n    println!(\"hi\");\n}";
        assert_eq!(clean_code(clean), clean);
        let fenced = "```rust\nfn main() {}\n```";
        let once = clean_code(fenced);
        assert_eq!(once, "fn main() {}");
        assert_eq!(clean_code(&once), once);
    }

    #[test]
    fn test_block_confidence_prefers_balanced_complete() {
        let good = CodeBlock {
            language: Some("typescript".into()),
            label: None,
            header: None,
            content: "function f() {\n  return 1;\n}".into(),
            start: 0,
            end: 0,
        };
        let broken = CodeBlock {
            content: "function f() {\n  call(a,".into(),
            ..good.clone()
        };
        assert!(block_confidence(&good) > block_confidence(&broken));
        assert!(block_confidence(&good) <= 1.0);
    }

    #[test]
    fn test_doc_comment_update() {
        let content = "/**\n * calculateTotal - Sums the line items.\n * @param items cart items\n */";
        let (name, comment) = doc_comment_update(content).unwrap();
        assert_eq!(name, "calculateTotal");
        assert!(comment.starts_with("/**") && comment.ends_with("*/"));
        assert!(doc_comment_update("/** plain comment */").is_none());
        assert!(doc_comment_update("const x = 1;").is_none());
    }

    #[test]
    fn test_normalize_language() {
        assert_eq!(normalize_language("ts").as_deref(), Some("typescript"));
        assert_eq!(normalize_language("Python").as_deref(), Some("python"));
        assert_eq!(normalize_language("c++").as_deref(), Some("cpp"));
        assert_eq!(normalize_language("").as_deref(), None);
    }
}
