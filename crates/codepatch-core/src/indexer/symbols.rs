//! Shallow symbol extraction from source code.
//!
//! Extraction is table-driven: each language maps to ordered regex passes for
//! imports, exports, classes, and functions. Adding a language is a new table
//! entry, not new control flow. The passes are deliberately shallow; a
//! declaration split across lines or hidden behind a macro is simply missed.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::indexer::filesystem::TEXT_LANGUAGE;

// ---------------------------------------------------------------------------
// Extracted types
// ---------------------------------------------------------------------------

/// Deduplicated symbol names for one file, in first-seen order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExtractedSymbols {
    pub functions: Vec<String>,
    pub classes: Vec<String>,
    pub exports: Vec<String>,
    pub imports: Vec<String>,
}

/// How a capture group is turned into names.
#[derive(Clone, Copy)]
enum Capture {
    /// Group 1 is a single identifier or module path.
    Name,
    /// Group 1 is a comma/newline separated list (`export { a, b as c }`).
    List,
}

struct Pass {
    regex: Regex,
    capture: Capture,
}

/// Ordered pattern passes for one language.
pub struct LanguagePatterns {
    pub language: &'static str,
    imports: Vec<Pass>,
    exports: Vec<Pass>,
    classes: Vec<Pass>,
    functions: Vec<Pass>,
}

/// Words a loose function pattern may capture that are never function names.
const NON_FUNCTION_WORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "function", "else", "do", "try",
    "new", "typeof", "sizeof", "delete", "await", "yield", "with", "using", "lock", "foreach",
    "elif", "match", "constructor",
];

// ---------------------------------------------------------------------------
// Pattern table
// ---------------------------------------------------------------------------

fn name(pattern: &str) -> Pass {
    Pass {
        regex: Regex::new(pattern).unwrap(),
        capture: Capture::Name,
    }
}

fn list(pattern: &str) -> Pass {
    Pass {
        regex: Regex::new(pattern).unwrap(),
        capture: Capture::List,
    }
}

fn script_patterns(language: &'static str) -> LanguagePatterns {
    LanguagePatterns {
        language,
        imports: vec![
            name(r#"(?m)^\s*import\s+(?:type\s+)?(?:[\w*{}\s,$]+\s+from\s+)?['"]([^'"]+)['"]"#),
            name(r#"require\(\s*['"]([^'"]+)['"]\s*\)"#),
        ],
        exports: vec![
            name(r"(?m)^\s*export\s+(?:default\s+)?(?:declare\s+)?(?:async\s+)?(?:abstract\s+)?(?:function\*?|class|const|let|var|interface|type|enum)\s+([A-Za-z_$][\w$]*)"),
            list(r"(?m)^\s*export\s*(?:type\s+)?\{([^}]*)\}"),
        ],
        classes: vec![
            name(r"(?m)^\s*(?:export\s+)?(?:default\s+)?(?:declare\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][\w$]*)"),
            name(r"(?m)^\s*(?:export\s+)?interface\s+([A-Za-z_$][\w$]*)"),
        ],
        functions: vec![
            name(r"(?m)^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)\s*[<(]"),
            name(r"(?m)^\s*(?:export\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*(?::[^=]+)?=\s*(?:async\s+)?(?:function\b|\([^)]*\)\s*(?::[^=]+)?=>|[A-Za-z_$][\w$]*\s*=>)"),
            name(r"(?m)^[ \t]+(?:(?:public|private|protected|static|async|readonly|override|get|set)\s+)*([A-Za-z_$][\w$]*)\s*\([^)]*\)\s*(?::\s*[^{;]+)?\{"),
        ],
    }
}

static PATTERN_TABLE: LazyLock<Vec<LanguagePatterns>> = LazyLock::new(|| {
    vec![
        script_patterns("typescript"),
        script_patterns("javascript"),
        LanguagePatterns {
            language: "python",
            imports: vec![
                name(r"(?m)^\s*import\s+([\w.]+)"),
                name(r"(?m)^\s*from\s+([\w.]+)\s+import\b"),
            ],
            exports: vec![
                list(r"(?m)^__all__\s*=\s*[\[(]([^\])]*)[\])]"),
                name(r"(?m)^(?:async\s+)?def\s+([A-Za-z]\w*)"),
                name(r"(?m)^class\s+([A-Za-z]\w*)"),
            ],
            classes: vec![name(r"(?m)^\s*class\s+(\w+)")],
            functions: vec![name(r"(?m)^\s*(?:async\s+)?def\s+(\w+)")],
        },
        LanguagePatterns {
            language: "rust",
            imports: vec![
                name(r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?use\s+([\w:]+)"),
                name(r"(?m)^\s*extern\s+crate\s+(\w+)"),
            ],
            exports: vec![name(
                r"(?m)^\s*pub\s+(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?(?:fn|struct|enum|trait|const|static|type|mod)\s+(\w+)",
            )],
            classes: vec![name(
                r"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?(?:struct|enum|trait|union)\s+(\w+)",
            )],
            functions: vec![name(
                r#"(?m)^\s*(?:pub(?:\([^)]*\))?\s+)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?(?:extern\s+"[^"]*"\s+)?fn\s+(\w+)"#,
            )],
        },
        LanguagePatterns {
            language: "go",
            imports: vec![
                name(r#"(?m)^\s*import\s+(?:\w+\s+)?"([^"]+)""#),
                list(r"(?ms)^import\s*\((.*?)\)"),
            ],
            exports: vec![
                name(r"(?m)^\s*func\s+(?:\([^)]*\)\s*)?([A-Z]\w*)\s*\("),
                name(r"(?m)^\s*type\s+([A-Z]\w*)"),
            ],
            classes: vec![name(r"(?m)^\s*type\s+(\w+)\s+(?:struct|interface)\b")],
            functions: vec![name(r"(?m)^\s*func\s+(?:\([^)]*\)\s*)?(\w+)\s*\(")],
        },
        LanguagePatterns {
            language: "java",
            imports: vec![name(r"(?m)^\s*import\s+(?:static\s+)?([\w.*]+)\s*;")],
            exports: vec![name(
                r"(?m)^\s*public\s+(?:(?:abstract|final|static|sealed)\s+)*(?:class|interface|enum|record)\s+(\w+)",
            )],
            classes: vec![name(
                r"(?m)^\s*(?:(?:public|private|protected|abstract|final|static|sealed)\s+)*(?:class|interface|enum|record)\s+(\w+)",
            )],
            functions: vec![name(
                r"(?m)^\s*(?:(?:public|private|protected|static|final|abstract|synchronized|native|default)\s+)+[\w<>\[\],.?]+(?:\s*<[^>]*>)?\s+(\w+)\s*\(",
            )],
        },
        LanguagePatterns {
            language: "kotlin",
            imports: vec![name(r"(?m)^\s*import\s+([\w.*]+)")],
            exports: vec![],
            classes: vec![name(
                r"(?m)^\s*(?:(?:public|private|internal|open|abstract|data|sealed|enum|inner)\s+)*(?:class|interface|object)\s+(\w+)",
            )],
            functions: vec![name(
                r"(?m)^\s*(?:(?:public|private|internal|protected|override|suspend|inline|open|operator)\s+)*fun\s+(?:<[^>]+>\s*)?(?:[\w.]+\.)?(\w+)\s*\(",
            )],
        },
        LanguagePatterns {
            language: "csharp",
            imports: vec![name(r"(?m)^\s*using\s+(?:static\s+)?([\w.]+)\s*;")],
            exports: vec![name(
                r"(?m)^\s*public\s+(?:(?:abstract|sealed|static|partial)\s+)*(?:class|interface|struct|enum|record)\s+(\w+)",
            )],
            classes: vec![name(
                r"(?m)^\s*(?:(?:public|private|protected|internal|abstract|sealed|static|partial)\s+)*(?:class|interface|struct|enum|record)\s+(\w+)",
            )],
            functions: vec![name(
                r"(?m)^\s*(?:(?:public|private|protected|internal|static|virtual|override|async|abstract|sealed)\s+)+[\w<>\[\],.?]+\s+(\w+)\s*\(",
            )],
        },
        LanguagePatterns {
            language: "cpp",
            imports: vec![name(r#"(?m)^\s*#\s*include\s*[<"]([^>"]+)[>"]"#)],
            exports: vec![],
            classes: vec![name(r"(?m)^\s*(?:class|struct)\s+(\w+)\s*(?:final\s*)?(?::[^{;]*)?\{")],
            functions: vec![name(
                r"(?m)^(?:[\w:<>,*&]+\s+)+[*&]?(?:\w+::)?(\w+)\s*\([^;{}]*\)\s*(?:const\s*)?(?:noexcept\s*)?(?:\{|$)",
            )],
        },
        LanguagePatterns {
            language: "c",
            imports: vec![name(r#"(?m)^\s*#\s*include\s*[<"]([^>"]+)[>"]"#)],
            exports: vec![],
            classes: vec![name(r"(?m)^\s*(?:typedef\s+)?struct\s+(\w+)\s*\{")],
            functions: vec![name(
                r"(?m)^(?:[\w*]+\s+)+\**(\w+)\s*\([^;{}]*\)\s*(?:\{|$)",
            )],
        },
        LanguagePatterns {
            language: "php",
            imports: vec![name(
                r#"(?m)^\s*(?:use|require_once|require|include_once|include)\s*\(?\s*['"]?([\w\\/.]+)"#,
            )],
            exports: vec![],
            classes: vec![name(
                r"(?m)^\s*(?:(?:abstract|final)\s+)?(?:class|interface|trait)\s+(\w+)",
            )],
            functions: vec![name(
                r"(?m)^\s*(?:(?:public|private|protected|static|abstract|final)\s+)*function\s+&?(\w+)\s*\(",
            )],
        },
        LanguagePatterns {
            language: "ruby",
            imports: vec![name(r#"(?m)^\s*require(?:_relative)?\s+['"]([^'"]+)['"]"#)],
            exports: vec![],
            classes: vec![name(r"(?m)^\s*(?:class|module)\s+([A-Z]\w*)")],
            functions: vec![name(r"(?m)^\s*def\s+(?:self\.)?(\w+[?!]?)")],
        },
        LanguagePatterns {
            language: "swift",
            imports: vec![name(r"(?m)^\s*import\s+(\w+)")],
            exports: vec![name(
                r"(?m)^\s*(?:public|open)\s+(?:(?:final|static)\s+)*(?:class|struct|protocol|enum|func|actor)\s+(\w+)",
            )],
            classes: vec![name(
                r"(?m)^\s*(?:(?:public|private|internal|open|final|fileprivate)\s+)*(?:class|struct|protocol|enum|actor)\s+(\w+)",
            )],
            functions: vec![name(
                r"(?m)^\s*(?:(?:public|private|internal|open|static|override|final|mutating|fileprivate|class)\s+)*func\s+(\w+)",
            )],
        },
    ]
});

/// Pattern entry for a language tag, if the table knows it.
pub fn patterns_for(language: &str) -> Option<&'static LanguagePatterns> {
    PATTERN_TABLE.iter().find(|p| p.language == language)
}

/// Languages with symbol extraction support.
pub fn supported_languages() -> Vec<&'static str> {
    PATTERN_TABLE.iter().map(|p| p.language).collect()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn is_identifier_like(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '$' | '.' | '/' | ':' | '-' | '@' | '*' | '\\' | '?' | '!'))
}

/// Split a list capture into names: `a, b as c` -> `a`, `c`; `f "fmt"` -> `fmt`.
fn names_from_list(raw: &str) -> Vec<String> {
    raw.split([',', '\n'])
        .filter_map(|chunk| {
            let mut item = chunk.trim();
            if item.is_empty() || item.starts_with("//") {
                return None;
            }
            if let Some(pos) = item.rfind(" as ") {
                item = item[pos + 4..].trim();
            }
            let item = item.split_whitespace().last().unwrap_or("");
            let item = item.trim_matches(|c| c == '"' || c == '\'' || c == '`');
            if is_identifier_like(item) {
                Some(item.to_string())
            } else {
                None
            }
        })
        .collect()
}

fn run_passes(passes: &[Pass], source: &str, skip_keywords: bool) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut names: Vec<String> = Vec::new();
    for pass in passes {
        for caps in pass.regex.captures_iter(source) {
            let Some(group) = caps.get(1) else {
                continue;
            };
            let found = match pass.capture {
                Capture::Name => vec![group.as_str().trim().to_string()],
                Capture::List => names_from_list(group.as_str()),
            };
            for candidate in found {
                if candidate.is_empty() {
                    continue;
                }
                if skip_keywords && NON_FUNCTION_WORDS.contains(&candidate.as_str()) {
                    continue;
                }
                if seen.insert(candidate.clone()) {
                    names.push(candidate);
                }
            }
        }
    }
    names
}

// ---------------------------------------------------------------------------
// Public entry points
// ---------------------------------------------------------------------------

/// Run every pass for `language` over `source`. Unknown languages (including
/// plain text) yield no symbols.
pub fn extract_symbols(source: &str, language: &str) -> ExtractedSymbols {
    let Some(patterns) = patterns_for(language) else {
        return ExtractedSymbols::default();
    };
    ExtractedSymbols {
        functions: run_passes(&patterns.functions, source, true),
        classes: run_passes(&patterns.classes, source, false),
        exports: run_passes(&patterns.exports, source, false),
        imports: run_passes(&patterns.imports, source, false),
    }
}

fn plural(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("1 {singular}")
    } else {
        format!("{count} {plural}")
    }
}

/// One-line summary built from symbol counts only.
pub fn summarize(language: &str, symbols: &ExtractedSymbols, line_count: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    if !symbols.classes.is_empty() {
        parts.push(plural(symbols.classes.len(), "class", "classes"));
    }
    if !symbols.functions.is_empty() {
        parts.push(plural(symbols.functions.len(), "function", "functions"));
    }
    if !symbols.exports.is_empty() {
        parts.push(plural(symbols.exports.len(), "export", "exports"));
    }
    if !symbols.imports.is_empty() {
        parts.push(plural(symbols.imports.len(), "import", "imports"));
    }
    let lines = plural(line_count, "line", "lines");
    if parts.is_empty() || language == TEXT_LANGUAGE {
        format!("{language} file ({lines})")
    } else {
        format!("{language} file with {} ({lines})", parts.join(", "))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
