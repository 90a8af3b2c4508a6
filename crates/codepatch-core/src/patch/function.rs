//! Function location and documentation updates.

use regex::Regex;
use tracing::{debug, warn};

use crate::models::{ParsedEdit, TextRange};

/// Textual extent of a located function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionLocation {
    /// 0-based line of the declaration.
    pub decl_line: usize,
    /// Byte offset of the declaration line start.
    pub start: usize,
    /// Byte offset just past the function's last line (including its newline).
    pub end: usize,
}

fn declaration_patterns(name: &str) -> Vec<Regex> {
    let name = regex::escape(name);
    let shapes = [
        // function foo(, def foo(, fn foo(, func foo(
        format!(
            r"(?m)^[ \t]*(?:export[ \t]+)?(?:default[ \t]+)?(?:async[ \t]+)?(?:function\*?|def|fn|func|fun|sub)[ \t]+{name}\b"
        ),
        // const foo = (...) =>, foo = function(
        format!(
            r"(?m)^[ \t]*(?:export[ \t]+)?(?:(?:const|let|var)[ \t]+)?{name}[ \t]*(?::[^=\n]+)?=[ \t]*(?:async[ \t]+)?(?:function\b|\(|[A-Za-z_$][\w$]*[ \t]*=>)"
        ),
        // public static int foo(, pub fn foo(, private async foo(
        format!(
            r"(?m)^[ \t]*(?:(?:public|private|protected|internal|static|final|abstract|override|virtual|async|export|pub(?:\([^)]*\))?)[ \t]+)+(?:[\w<>\[\],.?]+[ \t]+)*?{name}[ \t]*(?:<[^>\n]*>)?[ \t]*\("
        ),
    ];
    shapes
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
}

fn line_start_offsets(code: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(code.match_indices('\n').map(|(i, _)| i + 1))
        .filter(|&i| i <= code.len())
        .collect()
}

fn line_end_after(code: &str, offset: usize) -> usize {
    code[offset..]
        .find('\n')
        .map(|i| offset + i + 1)
        .unwrap_or(code.len())
}

/// End of a brace-delimited body starting the scan at `from`.
fn brace_body_end(code: &str, from: usize) -> Option<usize> {
    let bytes = code.as_bytes();
    let mut depth = 0usize;
    let mut opened = false;
    let mut quote: Option<u8> = None;
    let mut i = from;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 1;
            } else if b == q || (b == b'\n' && q != b'`') {
                quote = None;
            }
        } else {
            match b {
                b'"' | b'`' => quote = Some(b),
                b';' if !opened => return Some(line_end_after(code, i)),
                b'{' => {
                    depth += 1;
                    opened = true;
                }
                b'}' if opened => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(line_end_after(code, i));
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// End of an indentation-delimited body (`def f():` style).
fn indented_body_end(code: &str, decl_line: usize) -> usize {
    let lines: Vec<&str> = code.split_inclusive('\n').collect();
    let base = indent_of(lines[decl_line]);
    let mut last = decl_line;
    for (idx, line) in lines.iter().enumerate().skip(decl_line + 1) {
        if line.trim().is_empty() {
            continue;
        }
        if indent_of(line) <= base {
            break;
        }
        last = idx;
    }
    lines[..=last].iter().map(|l| l.len()).sum()
}

/// Locate `name`'s declaration by trying the keyword-led, assignment-style
/// and modifier-led shapes in order, then find its textual end.
pub fn find_function_in_code(code: &str, name: &str) -> Option<FunctionLocation> {
    let found = declaration_patterns(name)
        .iter()
        .find_map(|re| re.find(code).map(|m| m.start()))?;
    let starts = line_start_offsets(code);
    let decl_line = starts.iter().rposition(|&s| s <= found)?;
    let start = starts[decl_line];

    let header_end = line_end_after(code, start);
    let header = code[start..header_end].trim_end();
    let end = if header.ends_with(':') {
        indented_body_end(code, decl_line)
    } else {
        brace_body_end(code, start).unwrap_or(header_end)
    };
    Some(FunctionLocation {
        decl_line,
        start,
        end,
    })
}

fn is_decorator(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with('@') || t.starts_with("#[")
}

/// Re-indent a doc comment to sit above a declaration indented by `indent`.
fn indent_comment(comment: &str, indent: &str) -> String {
    comment
        .lines()
        .map(|line| {
            let t = line.trim();
            if t.starts_with("/**") {
                format!("{indent}{t}")
            } else {
                format!("{indent} {t}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replace or insert the doc comment above the named function. The returned
/// range spans from the insertion point to the function end; the text is the
/// new comment followed by the original function. Falls back to a
/// whole-document range when the function cannot be found.
pub fn apply_function_update(document: &str, edit: &ParsedEdit) -> (TextRange, String) {
    let Some(name) = edit.target.as_deref() else {
        warn!("Function update without a function name; replacing the whole file");
        return (TextRange::whole(document), edit.content.clone());
    };
    let Some(location) = find_function_in_code(document, name) else {
        warn!("Function '{name}' not found; replacing the whole file");
        return (TextRange::whole(document), edit.content.clone());
    };

    let lines: Vec<&str> = document.split_inclusive('\n').collect();
    let offset_of = |line: usize| -> usize { lines[..line].iter().map(|l| l.len()).sum() };

    // Attributes and decorators travel with the function.
    let mut body_line = location.decl_line;
    while body_line > 0 && is_decorator(lines[body_line - 1]) {
        body_line -= 1;
    }

    let mut cursor = body_line;
    while cursor > 0 && lines[cursor - 1].trim().is_empty() {
        cursor -= 1;
    }
    let mut insert_line = body_line;
    if cursor > 0 && lines[cursor - 1].trim_end().ends_with("*/") {
        let mut open = cursor - 1;
        while open > 0 && !lines[open].trim_start().starts_with("/*") {
            open -= 1;
        }
        if lines[open].trim_start().starts_with("/*") {
            debug!("Replacing existing doc comment above '{name}'");
            insert_line = open;
        }
    }

    let decl = lines[location.decl_line];
    let indent = &decl[..indent_of(decl)];
    let comment = indent_comment(edit.content.trim(), indent);
    let body_start = offset_of(body_line);
    let mut replacement = comment;
    replacement.push('\n');
    replacement.push_str(&document[body_start..location.end]);

    (TextRange::new(offset_of(insert_line), location.end), replacement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EditKind;
    use crate::patch::range::splice;

    fn doc_edit(name: &str, comment: &str) -> ParsedEdit {
        ParsedEdit {
            target: Some(name.into()),
            kind: EditKind::FunctionUpdate,
            start_line: None,
            end_line: None,
            content: comment.into(),
            confidence: 0.8,
            language: None,
            label: None,
        }
    }

    const TS: &str = "import x from 'x';\n\nexport function total(items) {\n  if (items) {\n    return 1;\n  }\n  return 0;\n}\n\nconst other = 1;\n";

    #[test]
    fn test_find_keyword_function() {
        let loc = find_function_in_code(TS, "total").unwrap();
        assert_eq!(loc.decl_line, 2);
        assert!(TS[loc.start..loc.end].starts_with("export function total"));
        assert!(TS[loc.start..loc.end].ends_with("  return 0;\n}\n"));
    }

    #[test]
    fn test_find_assignment_and_modifier_shapes() {
        let arrow = "const add = (a, b) => {\n  return a + b;\n};\n";
        let loc = find_function_in_code(arrow, "add").unwrap();
        assert_eq!(&arrow[loc.start..loc.end], arrow);

        let java = "class A {\n    public static int count(int n) {\n        return n;\n    }\n}\n";
        let loc = find_function_in_code(java, "count").unwrap();
        assert_eq!(loc.decl_line, 1);
        assert!(java[loc.start..loc.end].ends_with("    }\n"));

        let rust = "pub fn go() -> u8 {\n    1\n}\n";
        assert_eq!(find_function_in_code(rust, "go").unwrap().end, rust.len());
    }

    #[test]
    fn test_find_python_function() {
        let py = "def first():\n    return 1\n\n\ndef second():\n    return 2\n";
        let loc = find_function_in_code(py, "first").unwrap();
        assert_eq!(&py[loc.start..loc.end], "def first():\n    return 1\n");
    }

    #[test]
    fn test_name_is_matched_whole() {
        assert!(find_function_in_code("function totals() {}\n", "total").is_none());
    }

    #[test]
    fn test_insert_doc_comment() {
        let edit = doc_edit("total", "/**\n * total - Counts items.\n */");
        let (range, text) = apply_function_update(TS, &edit);
        assert!(!range.is_whole(TS));
        let out = splice(TS, range, &text);
        assert!(out.contains("\n/**\n * total - Counts items.\n */\nexport function total(items) {"));
        assert!(out.starts_with("import x from 'x';\n\n"));
        assert!(out.ends_with("const other = 1;\n"));
    }

    #[test]
    fn test_replace_existing_doc_comment() {
        let src = "class S {\n  /**\n   * run - Old text.\n   */\n  run() {\n    go();\n  }\n  private helper(): void {\n  }\n}\n";
        let edit = doc_edit("helper", "/**\n * helper - New text.\n */");
        let (range, text) = apply_function_update(src, &edit);
        let out = splice(src, range, &text);
        assert!(out.contains("  /**\n   * helper - New text.\n   */\n  private helper(): void {"));
        // The unrelated comment above run() is untouched.
        assert!(out.contains("   * run - Old text."));

        let src = "/**\n * f - old\n */\n\nfunction f() {}\n";
        let (range, text) = apply_function_update(src, &doc_edit("f", "/**\n * f - new\n */"));
        assert_eq!(splice(src, range, &text), "/**\n * f - new\n */\nfunction f() {}\n");
    }

    #[test]
    fn test_missing_function_falls_back_to_whole_document() {
        let edit = doc_edit("nowhere", "/**\n * nowhere - x\n */");
        let (range, text) = apply_function_update(TS, &edit);
        assert!(range.is_whole(TS));
        assert_eq!(text, edit.content);
    }
}
