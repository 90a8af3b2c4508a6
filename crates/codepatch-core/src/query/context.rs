//! Prompt composition for the language model.
//!
//! Selected files are read fresh through the host, redacted, truncated and
//! shown with padded 1-based line numbers. The model is told to echo those
//! numbers back in `File: <path> (lines X-Y)` headers; the parser and the
//! patch applier both depend on that contract.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::{debug, warn};

use crate::config::ComposeOptions;
use crate::host::WorkspaceHost;
use crate::indexer::filesystem::{content_hash, TEXT_LANGUAGE};
use crate::models::{ComposedContext, FileMatch, IncludedFile};
use crate::query::guards::{clamp_int, clamp_limit, MAX_CONTENT_LINES, MAX_FILES_TO_INCLUDE, MIN_CONTENT_LINES};
use crate::query::tokenizer::estimate_tokens;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Every redaction replacement starts with this marker.
pub const REDACTION_MARKER: &str = "[REDACTED";

static REDACTION_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(r"sk-[A-Za-z0-9]{20,}").unwrap(),
            "[REDACTED_OPENAI_KEY]",
        ),
        (
            Regex::new(r"AKIA[0-9A-Z]{16}").unwrap(),
            "[REDACTED_AWS_ACCESS_KEY]",
        ),
        (
            Regex::new(r#"(?i)(api[_-]?key|token|secret|password)\s*[:=]\s*['"][^'"\n]+['"]"#).unwrap(),
            r#"$1="[REDACTED]""#,
        ),
        (
            Regex::new(r"(?s)-----BEGIN (?:RSA |EC |DSA |OPENSSH )?PRIVATE KEY-----.*?-----END (?:RSA |EC |DSA |OPENSSH )?PRIVATE KEY-----").unwrap(),
            "[REDACTED_PRIVATE_KEY]",
        ),
    ]
});

const SYSTEM_PROMPT: &str = "\
You are a precise code editing assistant. You receive source files whose every \
line is prefixed with its line number, followed by a task.

Rules for line numbers:
1. Line numbers are NOT part of the code. Never copy the `N: ` prefixes into your answer.
2. Use ONLY the line numbers shown. Never guess, estimate or invent a line number.
3. For every change, write a header in exactly this form, then one fenced code block:
   File: <relative path as shown> (lines X-Y)
   where X and Y are the first and last shown line numbers you are replacing.
4. The fenced block must contain the complete replacement for lines X through Y, nothing more.
5. To change several files, repeat the `File: <path> (lines X-Y)` header and block per file.
6. Tag every fenced block with its language.
7. To update only a function's documentation, reply with a `/** ... */` block whose first \
line is `* functionName - description`.";

const RELATED_RULE: &str = "\
Files listed under \"Related files\" are READ-ONLY reference context. They are \
not editable: never propose changes to them.";

// ---------------------------------------------------------------------------
// Redaction
// ---------------------------------------------------------------------------

/// Replace secrets with markers. Multi-line matches keep their newlines so the
/// line numbering of the surrounding text is unchanged.
pub fn redact_sensitive_text(text: &str) -> (String, usize) {
    let mut redacted = text.to_string();
    let mut hits = 0usize;
    for (pattern, replacement) in REDACTION_PATTERNS.iter() {
        let count = pattern.find_iter(&redacted).count();
        if count == 0 {
            continue;
        }
        hits += count;
        redacted = pattern
            .replace_all(&redacted, |caps: &Captures| {
                let mut out = String::new();
                caps.expand(replacement, &mut out);
                let newlines = caps[0].matches('\n').count();
                out.push_str(&"\n".repeat(newlines));
                out
            })
            .into_owned();
    }
    (redacted, hits)
}

/// Whether text still carries a redaction marker.
pub fn contains_redaction_marker(text: &str) -> bool {
    text.contains(REDACTION_MARKER)
}

// ---------------------------------------------------------------------------
// Line numbering
// ---------------------------------------------------------------------------

pub struct NumberedContent {
    pub text: String,
    pub total_lines: usize,
    pub shown_lines: usize,
    pub truncated: bool,
}

/// Prefix each line with its padded 1-based number; keep at most `max_lines`
/// and note how many were omitted.
pub fn number_lines(content: &str, max_lines: usize, width: usize) -> NumberedContent {
    let lines: Vec<&str> = content.lines().collect();
    let total_lines = lines.len();
    let shown_lines = total_lines.min(max_lines);
    let mut text = String::new();
    for (idx, line) in lines.iter().take(shown_lines).enumerate() {
        text.push_str(&format!("{:>width$}: {line}\n", idx + 1));
    }
    let truncated = total_lines > shown_lines;
    if truncated {
        text.push_str(&format!("... ({} more lines omitted)\n", total_lines - shown_lines));
    }
    NumberedContent {
        text,
        total_lines,
        shown_lines,
        truncated,
    }
}

// ---------------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------------

fn related_summary(m: &FileMatch) -> String {
    format!(
        "- {} ({}): {} functions, {} classes, {} exports, {} lines",
        m.file.relative_path,
        m.file.language,
        m.file.functions.len(),
        m.file.classes.len(),
        m.file.exports.len(),
        m.file.line_count
    )
}

/// Build the system and user prompts from ranked matches. Matches are not
/// re-ranked; the first `max_files_to_include` are shown in full.
pub fn compose_prompt_context(
    host: &dyn WorkspaceHost,
    instruction: &str,
    matches: &[FileMatch],
    options: &ComposeOptions,
) -> ComposedContext {
    let max_files = clamp_limit(options.max_files_to_include, MAX_FILES_TO_INCLUDE);
    let max_lines = clamp_int(options.max_content_lines, MIN_CONTENT_LINES, MAX_CONTENT_LINES);
    let width = options.line_number_width.max(1);

    let mut context = ComposedContext::default();
    let mut sections: Vec<String> = Vec::new();

    for m in matches.iter().take(max_files) {
        let content = match host.read_file(&m.file.path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Could not load {} for context: {e}", m.file.relative_path);
                context
                    .load_errors
                    .push(format!("{}: {e}", m.file.relative_path));
                continue;
            }
        };

        let hash = content_hash(&content);
        let shown = if options.redact_secrets {
            let (redacted, hits) = redact_sensitive_text(&content);
            if hits > 0 {
                debug!("Redacted {hits} secrets in {}", m.file.relative_path);
            }
            context.redaction_hits += hits;
            redacted
        } else {
            content
        };

        let numbered = number_lines(&shown, max_lines, width);
        let fence_lang = if m.file.language == TEXT_LANGUAGE {
            ""
        } else {
            m.file.language.as_str()
        };
        sections.push(format!(
            "File: {} (lines 1-{})\n```{fence_lang}\n{}```",
            m.file.relative_path, numbered.shown_lines, numbered.text
        ));
        context.included_files.push(IncludedFile {
            relative_path: m.file.relative_path.clone(),
            content_hash: hash,
            line_count: numbered.total_lines,
            shown_lines: numbered.shown_lines,
            truncated: numbered.truncated,
        });
        context.files_used.push(m.clone());
    }

    let related: Vec<String> = if options.include_related_summaries {
        matches.iter().skip(max_files).map(related_summary).collect()
    } else {
        Vec::new()
    };

    let mut system_prompt = SYSTEM_PROMPT.to_string();
    if !related.is_empty() {
        system_prompt.push_str("\n\n");
        system_prompt.push_str(RELATED_RULE);
    }

    let mut user_prompt = String::new();
    if sections.is_empty() {
        user_prompt.push_str("No editable files could be loaded.\n\n");
    } else {
        user_prompt.push_str("Editable files (line numbers are shown for reference only):\n\n");
        user_prompt.push_str(&sections.join("\n\n"));
        user_prompt.push_str("\n\n");
    }
    if !related.is_empty() {
        user_prompt.push_str("Related files (read-only, not editable):\n");
        user_prompt.push_str(&related.join("\n"));
        user_prompt.push_str("\n\n");
    }
    user_prompt.push_str(&format!("Task: {}\n\n", instruction.trim()));
    user_prompt.push_str(
        "Answer with `File: <path> (lines X-Y)` headers using only the line numbers shown above. \
         Do not guess line numbers.",
    );

    context.estimated_tokens = estimate_tokens(&system_prompt) + estimate_tokens(&user_prompt);
    if context.estimated_tokens > options.max_tokens {
        warn!(
            "Composed context is ~{} tokens, above the advisory budget of {}",
            context.estimated_tokens, options.max_tokens
        );
    }
    context.system_prompt = system_prompt;
    context.user_prompt = user_prompt;
    context
}

/// Holds compose options for the pipeline.
pub struct ContextComposer {
    pub options: ComposeOptions,
}

impl ContextComposer {
    pub fn new(options: ComposeOptions) -> Self {
        Self { options }
    }

    pub fn compose(
        &self,
        host: &dyn WorkspaceHost,
        instruction: &str,
        matches: &[FileMatch],
    ) -> ComposedContext {
        compose_prompt_context(host, instruction, matches, &self.options)
    }
}
