//! Model reply interpretation.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::config::ParseContext;
use crate::models::{
    ChangeType, EditKind, MultiFileChange, OutputMetadata, ParsedEdit, ParsedOutput, ResponseType,
};
use crate::query::guards::MAX_ALTERNATIVES;
use crate::response::blocks::{
    block_confidence, clean_code, doc_comment_update, extract_code_blocks, has_comments,
    has_imports, CodeBlock,
};
use crate::response::classify::classify_response;
use crate::response::explanation::{extract_explanation, infer_patch_type};
use crate::response::multifile::parse_multi_file_response;

static LINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\blines?\s+(\d+)(?:\s*(?:-|\x{2013}|\x{2014}|to)\s*(\d+))?").unwrap());

/// Confidence cap for replies without any fenced block.
const UNFENCED_CONFIDENCE_CAP: f64 = 0.6;
const EXPLANATION_ONLY_CONFIDENCE: f64 = 0.2;

fn function_update(name: String, comment: String, confidence: f64, language: Option<String>) -> ParsedEdit {
    ParsedEdit {
        target: Some(name),
        kind: EditKind::FunctionUpdate,
        start_line: None,
        end_line: None,
        content: comment,
        confidence,
        language,
        label: None,
    }
}

fn edit_from_block(block: &CodeBlock) -> ParsedEdit {
    let confidence = block_confidence(block);
    if let Some((name, comment)) = doc_comment_update(&block.content) {
        return ParsedEdit {
            label: block.label.clone(),
            ..function_update(name, comment, confidence, block.language.clone())
        };
    }
    let lines = block
        .header
        .as_deref()
        .and_then(|h| LINES_RE.captures(h))
        .and_then(|caps| {
            let start: usize = caps.get(1)?.as_str().parse().ok()?;
            let end = caps.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(start);
            Some((start, end))
        });
    ParsedEdit {
        target: None,
        kind: if lines.is_some() {
            EditKind::ReplaceRange
        } else {
            EditKind::ReplaceWholeFile
        },
        start_line: lines.map(|(s, _)| s),
        end_line: lines.map(|(_, e)| e),
        content: block.content.clone(),
        confidence,
        language: block.language.clone(),
        label: block.label.clone(),
    }
}

/// Edit for one multi-file change.
pub fn edit_from_change(change: &MultiFileChange, confidence: f64) -> ParsedEdit {
    if change.change_type != ChangeType::Delete {
        if let Some((name, comment)) = doc_comment_update(&change.content) {
            return function_update(name, comment, confidence, change.language.clone());
        }
    }
    let kind = if change.start_line.is_some() {
        EditKind::ReplaceRange
    } else {
        EditKind::ReplaceWholeFile
    };
    ParsedEdit {
        target: Some(change.file_path.clone()),
        kind,
        start_line: change.start_line,
        end_line: change.end_line,
        content: change.content.clone(),
        confidence,
        language: change.language.clone(),
        label: None,
    }
}

/// Ranking for primary selection: confidence, then requested language, then
/// longer content, then imports, then an explicit label.
fn compare_candidates(a: &ParsedEdit, b: &ParsedEdit, expected_language: Option<&str>) -> Ordering {
    let lang_match = |e: &ParsedEdit| {
        expected_language.is_some_and(|want| e.language.as_deref() == Some(want))
    };
    b.confidence
        .partial_cmp(&a.confidence)
        .unwrap_or(Ordering::Equal)
        .then_with(|| lang_match(b).cmp(&lang_match(a)))
        .then_with(|| b.content.len().cmp(&a.content.len()))
        .then_with(|| has_imports(&b.content).cmp(&has_imports(&a.content)))
        .then_with(|| b.label.is_some().cmp(&a.label.is_some()))
}

/// Interpret one raw model reply.
pub fn parse_response(raw: &str, context: &ParseContext) -> ParsedOutput {
    let blocks = extract_code_blocks(raw);
    let response_type = classify_response(raw, &blocks);
    let explanation = extract_explanation(raw);
    let patch_type = infer_patch_type(explanation.as_deref(), &context.instruction);
    let mut metadata = OutputMetadata {
        has_code_blocks: !blocks.is_empty(),
        has_comments: false,
        has_imports: false,
        block_count: blocks.len(),
    };
    debug!("Classified reply as {response_type:?} with {} blocks", blocks.len());
    if context.expect_multi_file && response_type != ResponseType::Multifile && blocks.len() > 1 {
        debug!("Several files were shown but the reply names none; treating its blocks as alternatives");
    }

    match response_type {
        ResponseType::Multifile => {
            let parsed = parse_multi_file_response(raw);
            metadata.has_comments = parsed.changes.iter().any(|c| has_comments(&c.content));
            metadata.has_imports = parsed.changes.iter().any(|c| has_imports(&c.content));
            let primary = parsed
                .changes
                .first()
                .map(|c| edit_from_change(c, parsed.confidence));
            ParsedOutput {
                response_type,
                patch_type,
                code: primary.as_ref().map(|e| e.content.clone()).unwrap_or_default(),
                language: primary
                    .as_ref()
                    .and_then(|e| e.language.clone())
                    .or_else(|| context.expected_language.clone()),
                primary,
                alternatives: Vec::new(),
                changes: parsed.changes,
                explanation,
                confidence: parsed.confidence,
                metadata,
            }
        }
        ResponseType::ExplanationOnly => ParsedOutput {
            response_type,
            patch_type,
            code: String::new(),
            primary: None,
            alternatives: Vec::new(),
            changes: Vec::new(),
            explanation,
            language: context.expected_language.clone(),
            confidence: EXPLANATION_ONLY_CONFIDENCE,
            metadata,
        },
        _ if blocks.is_empty() => {
            // Unfenced code: the whole reply is the payload.
            let code = clean_code(raw.trim());
            let synthetic = CodeBlock {
                language: context.expected_language.clone(),
                label: None,
                header: None,
                content: code.clone(),
                start: 0,
                end: raw.len(),
            };
            let confidence = block_confidence(&synthetic).min(UNFENCED_CONFIDENCE_CAP);
            metadata.has_comments = has_comments(&code);
            metadata.has_imports = has_imports(&code);
            let mut primary = edit_from_block(&synthetic);
            primary.confidence = confidence;
            ParsedOutput {
                response_type: ResponseType::CodeOnly,
                patch_type,
                code,
                primary: Some(primary),
                alternatives: Vec::new(),
                changes: Vec::new(),
                explanation: None,
                language: context.expected_language.clone(),
                confidence,
                metadata,
            }
        }
        _ => {
            let mut candidates: Vec<ParsedEdit> = blocks.iter().map(edit_from_block).collect();
            let expected = context.expected_language.as_deref();
            candidates.sort_by(|a, b| compare_candidates(a, b, expected));
            let mut ranked = candidates.into_iter();
            let primary = ranked.next();
            let alternatives: Vec<ParsedEdit> = ranked.take(MAX_ALTERNATIVES).collect();
            metadata.has_comments = blocks.iter().any(|b| has_comments(&b.content));
            metadata.has_imports = blocks.iter().any(|b| has_imports(&b.content));
            ParsedOutput {
                response_type: if explanation.is_some() {
                    ResponseType::CodeWithExplanation
                } else {
                    ResponseType::CodeOnly
                },
                patch_type,
                code: primary.as_ref().map(|e| e.content.clone()).unwrap_or_default(),
                language: primary
                    .as_ref()
                    .and_then(|e| e.language.clone())
                    .or_else(|| context.expected_language.clone()),
                confidence: primary.as_ref().map(|e| e.confidence).unwrap_or(0.0),
                primary,
                alternatives,
                changes: Vec::new(),
                explanation,
                metadata,
            }
        }
    }
}

/// Stateless parser handle for the pipeline.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResponseParser;

impl ResponseParser {
    pub fn parse(&self, raw: &str, context: &ParseContext) -> ParsedOutput {
        parse_response(raw, context)
    }

    /// Whether a parsed reply carries anything applicable.
    pub fn has_payload(output: &ParsedOutput) -> bool {
        match output.response_type {
            ResponseType::Multifile => !output.changes.is_empty(),
            ResponseType::ExplanationOnly => false,
            _ => output
                .primary
                .as_ref()
                .is_some_and(|p| !p.content.trim().is_empty()),
        }
    }
}
