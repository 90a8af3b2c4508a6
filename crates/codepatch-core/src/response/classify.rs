//! Response classification: multifile, code without fences, or prose.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::ResponseType;
use crate::response::blocks::CodeBlock;

static FILE_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[#*>\s-]*\**(?:File|Path)\**:\**\s*\S+[^\n]*\n(?:[ \t]*\n)*[ \t]*```").unwrap()
});

const CODE_KEYWORDS: &[&str] = &[
    "function ", "def ", "class ", "import ", "export ", "const ", "let ", "var ", "fn ",
    "pub ", "return ", "if (", "if ", "for (", "for ", "while ", "#include", "package ",
    "public ", "private ", "protected ", "static ", "async ", "await ", "struct ", "enum ",
    "interface ", "type ", "func ", "use ", "from ", "namespace ", "using ",
];

/// A `File:`/`Path:` header directly followed by a fenced block.
pub fn has_file_headers(text: &str) -> bool {
    FILE_HEADER_RE.is_match(text)
}

fn is_code_line(line: &str) -> bool {
    let t = line.trim();
    if t.starts_with("//") || t.starts_with("/*") || t.starts_with("*/") || t.starts_with("#!") {
        return true;
    }
    if t.ends_with('{') || t.ends_with('}') || t.ends_with(';') || t == ")" || t == "];" {
        return true;
    }
    if CODE_KEYWORDS.iter().any(|k| t.starts_with(k)) && (t.contains('(') || t.contains('=') || t.contains(':') || t.contains('{')) {
        return true;
    }
    // Call or assignment shapes: `foo(bar)`, `x = y`, `a.b(c)`.
    let has_call = t.contains('(') && t.ends_with(')') && !t.contains(". ");
    let has_assignment = t.contains(" = ") && !t.ends_with('.') && t.split_whitespace().count() <= 8;
    has_call || has_assignment
}

/// Syntactic heuristics over non-empty lines: brace and paren punctuation,
/// keyword-led lines, comment-led lines. Half the lines must qualify.
pub fn looks_like_code(text: &str) -> bool {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return false;
    }
    let code_lines = lines.iter().filter(|l| is_code_line(l)).count();
    code_lines * 2 >= lines.len()
}

/// First matching class wins. Fenced non-multifile replies are refined into
/// code-only or code-with-explanation by the parser.
pub fn classify_response(text: &str, blocks: &[CodeBlock]) -> ResponseType {
    if has_file_headers(text) || blocks.len() > 2 {
        return ResponseType::Multifile;
    }
    if blocks.is_empty() {
        return if looks_like_code(text) {
            ResponseType::CodeOnly
        } else {
            ResponseType::ExplanationOnly
        };
    }
    ResponseType::CodeOnly
}
