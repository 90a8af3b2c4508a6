//! Turning a parsed edit into a concrete splice, with pre-apply checks.

use serde::{Deserialize, Serialize};

use crate::indexer::filesystem::content_hash;
use crate::models::{ComposedContext, EditKind, ParsedEdit, TextRange};
use crate::patch::function::apply_function_update;
use crate::patch::range::{plan_range_edit, splice, whole_file_text};
use crate::patch::validate::check_brackets;
use crate::query::context::contains_redaction_marker;

/// Line counts for a confirmation prompt.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatchPreview {
    pub added: usize,
    pub removed: usize,
}

impl PatchPreview {
    pub fn between(old: &str, new: &str) -> Self {
        Self {
            added: new.lines().count(),
            removed: old.lines().count(),
        }
    }

    pub fn describe(&self) -> String {
        format!("+{} -{} lines", self.added, self.removed)
    }
}

/// A splice ready to hand to the host.
#[derive(Clone, Debug, PartialEq)]
pub struct EditPlan {
    pub range: TextRange,
    pub replacement: String,
    pub after: String,
    pub kind: EditKind,
    pub preview: PatchPreview,
}

/// Content checks every edit must pass before anything is touched.
pub fn validate_content(edit: &ParsedEdit) -> Result<(), String> {
    if contains_redaction_marker(&edit.content) {
        return Err("proposed code contains a redaction placeholder; refusing to write it".to_string());
    }
    if edit.kind == EditKind::FunctionUpdate {
        return Ok(());
    }
    check_brackets(&edit.content).map_err(|e| format!("syntax validation failed: {e}"))
}

/// Refuse when the file changed since it was shown to the model.
pub fn verify_against_context(context: &ComposedContext, relative: &str, current: &str) -> Result<(), String> {
    match context.included(relative) {
        Some(included) if included.content_hash != content_hash(current) => Err(format!(
            "{relative} changed since the prompt was composed; line numbers may be stale"
        )),
        Some(_) => Ok(()),
        None => Err(format!("{relative} was not shown to the model; cannot verify line numbers")),
    }
}

/// Compute where and what to splice for an edit against the current text.
pub fn plan_edit(document: &str, edit: &ParsedEdit) -> Result<EditPlan, String> {
    let (range, replacement) = match (edit.kind, edit.start_line) {
        (EditKind::ReplaceRange, Some(start)) => {
            let plan = plan_range_edit(document, start, edit.end_line, &edit.content);
            (plan.range, plan.replacement)
        }
        (EditKind::ReplaceRange, None) => {
            return Err("range edit is missing its line numbers".to_string());
        }
        (EditKind::ReplaceWholeFile, _) => (TextRange::whole(document), whole_file_text(document, &edit.content)),
        (EditKind::FunctionUpdate, _) => apply_function_update(document, edit),
    };
    let preview = PatchPreview::between(&document[range.start..range.end], &replacement);
    Ok(EditPlan {
        after: splice(document, range, &replacement),
        range,
        replacement,
        kind: edit.kind,
        preview,
    })
}
