//! Bracket-balance validation, the only syntax check applied to model code.
//!
//! String literals and comments are skipped so brackets inside them do not
//! count. Single quotes are only treated as a literal when they close within
//! a few characters (char literals), which keeps Rust lifetimes and English
//! apostrophes in comments from swallowing the rest of the text.

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Code,
    LineComment,
    BlockComment,
    Str(char),
}

fn closing_for(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

/// `Ok(())` when every `(`, `[` and `{` is closed in order.
pub fn check_brackets(code: &str) -> Result<(), String> {
    let chars: Vec<char> = code.chars().collect();
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut mode = Mode::Code;
    let mut line = 1usize;
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        if c == '\n' {
            line += 1;
        }
        match mode {
            Mode::LineComment => {
                if c == '\n' {
                    mode = Mode::Code;
                }
            }
            Mode::BlockComment => {
                if c == '*' && next == Some('/') {
                    mode = Mode::Code;
                    i += 1;
                }
            }
            Mode::Str(quote) => {
                if c == '\\' {
                    i += 1;
                } else if c == quote {
                    mode = Mode::Code;
                } else if c == '\n' && quote != '`' {
                    // Unterminated single-line literal; resync on the next line.
                    mode = Mode::Code;
                }
            }
            Mode::Code => match c {
                '/' if next == Some('/') => mode = Mode::LineComment,
                '/' if next == Some('*') => {
                    mode = Mode::BlockComment;
                    i += 1;
                }
                '#' if next != Some('[') && next != Some('!') && next != Some('{') => {
                    mode = Mode::LineComment
                }
                '"' | '`' => mode = Mode::Str(c),
                '\'' => {
                    let closes_soon = chars[i + 1..]
                        .iter()
                        .take(4)
                        .position(|&ch| ch == '\'')
                        .is_some_and(|p| p == 1 || (p == 2 && chars.get(i + 1) == Some(&'\\')));
                    if closes_soon {
                        mode = Mode::Str('\'');
                    }
                }
                '(' | '[' | '{' => stack.push((c, line)),
                ')' | ']' | '}' => match stack.pop() {
                    Some((open, _)) if closing_for(open) == c => {}
                    Some((open, open_line)) => {
                        return Err(format!(
                            "mismatched '{c}' on line {line} (expected '{}' for '{open}' from line {open_line})",
                            closing_for(open)
                        ));
                    }
                    None => return Err(format!("unexpected '{c}' on line {line}")),
                },
                _ => {}
            },
        }
        i += 1;
    }

    match stack.last() {
        Some((open, open_line)) => Err(format!("unclosed '{open}' from line {open_line}")),
        None => Ok(()),
    }
}

pub fn is_balanced(code: &str) -> bool {
    check_brackets(code).is_ok()
}
