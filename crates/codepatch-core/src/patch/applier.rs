//! Patch application through the workspace host.
//!
//! User-facing failures (validation, declined confirmation, unreadable
//! target) come back as an unsuccessful [`ApplyOutcome`]; nothing is written
//! in those cases. Every attempt that reaches the host is recorded in the
//! history.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ApplyOptions;
use crate::host::WorkspaceHost;
use crate::models::{now_millis, ComposedContext, EditKind, ParsedEdit, PatchHistoryEntry};
use crate::patch::batch::{batch_preview, commit_batch, prepare_batch, BatchItem};
use crate::patch::history::PatchHistory;
use crate::patch::plan::{plan_edit, validate_content, verify_against_context};

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ApplyOutcome {
    pub success: bool,
    pub message: String,
    pub affected_files: Vec<String>,
    pub success_count: usize,
    pub total: usize,
    /// Per-file failure messages of a partially applied batch.
    pub failures: Vec<String>,
}

impl ApplyOutcome {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ..Self::default()
        }
    }
}

/// The file an edit is aimed at.
#[derive(Clone, Debug)]
pub struct EditTarget {
    pub path: PathBuf,
    pub relative: String,
}

pub struct PatchApplier {
    options: ApplyOptions,
    history: PatchHistory,
}

impl PatchApplier {
    pub fn new(options: ApplyOptions) -> Self {
        Self {
            history: PatchHistory::new(options.history_capacity),
            options,
        }
    }

    pub fn history(&self) -> &PatchHistory {
        &self.history
    }

    pub fn options(&self) -> &ApplyOptions {
        &self.options
    }

    fn confirm(&self, host: &dyn WorkspaceHost, message: &str) -> bool {
        !self.options.require_confirmation || host.confirm(message)
    }

    /// Apply one edit to one file.
    pub fn apply_edit(
        &self,
        host: &dyn WorkspaceHost,
        target: &EditTarget,
        edit: &ParsedEdit,
        instruction: &str,
        context: Option<&ComposedContext>,
    ) -> ApplyOutcome {
        if let Err(e) = validate_content(edit) {
            return ApplyOutcome::failure(format!("Edit rejected for {}: {e}", target.relative));
        }
        let before = match host.read_file(&target.path) {
            Ok(text) => text,
            Err(e) => return ApplyOutcome::failure(format!("Could not read {}: {e}", target.relative)),
        };
        if self.options.verify_line_content && edit.kind == EditKind::ReplaceRange {
            if let Some(context) = context {
                if let Err(e) = verify_against_context(context, &target.relative, &before) {
                    return ApplyOutcome::failure(format!("Edit rejected: {e}"));
                }
            }
        }
        let plan = match plan_edit(&before, edit) {
            Ok(plan) => plan,
            Err(e) => return ApplyOutcome::failure(format!("Edit rejected for {}: {e}", target.relative)),
        };
        if plan.range.is_whole(&before) && edit.kind == EditKind::FunctionUpdate {
            warn!("Function update for {} fell back to whole-file replacement", target.relative);
        }

        let prompt = format!(
            "Apply {} to {}? ({})",
            edit.kind.as_str(),
            target.relative,
            plan.preview.describe()
        );
        if !self.confirm(host, &prompt) {
            return ApplyOutcome::failure("Edit cancelled by user");
        }

        let written = host.replace_range(&target.path, plan.range, &plan.replacement);
        let success = written.is_ok();
        self.history.record(PatchHistoryEntry {
            timestamp_ms: now_millis(),
            file_path: target.relative.clone(),
            instruction: instruction.to_string(),
            before,
            after: plan.after,
            success,
            confidence: edit.confidence,
            edit_kind: edit.kind,
        });
        match written {
            Ok(()) => {
                info!("Applied {} to {}", edit.kind.as_str(), target.relative);
                ApplyOutcome {
                    success: true,
                    message: format!("Applied {} to {} ({})", edit.kind.as_str(), target.relative, plan.preview.describe()),
                    affected_files: vec![target.relative.clone()],
                    success_count: 1,
                    total: 1,
                    failures: Vec::new(),
                }
            }
            Err(e) => ApplyOutcome::failure(format!("Failed to write {}: {e}", target.relative)),
        }
    }

    /// Apply a multi-file batch. Partial success is success; the counts say
    /// how much landed.
    pub fn apply_changes(
        &self,
        host: &dyn WorkspaceHost,
        items: Vec<BatchItem>,
        confidence: f64,
        instruction: &str,
        context: Option<&ComposedContext>,
    ) -> ApplyOutcome {
        if items.is_empty() {
            return ApplyOutcome::failure("No file changes to apply");
        }
        let verify = if self.options.verify_line_content { context } else { None };
        let prepared = prepare_batch(host, items, confidence, verify);
        if prepared.iter().all(|p| p.op.is_err()) {
            let reasons: Vec<String> = prepared.iter().map(|p| p.summary()).collect();
            return ApplyOutcome {
                total: prepared.len(),
                failures: reasons.clone(),
                ..ApplyOutcome::failure(format!("No file change passed validation: {}", reasons.join("; ")))
            };
        }

        let lines: Vec<String> = prepared.iter().map(|p| format!("  {}", p.summary())).collect();
        let prompt = format!(
            "Apply {} file changes ({})?\n{}",
            prepared.len(),
            batch_preview(&prepared).describe(),
            lines.join("\n")
        );
        if !self.confirm(host, &prompt) {
            return ApplyOutcome::failure("Edit cancelled by user");
        }

        let result = commit_batch(host, prepared);
        let mut affected = Vec::new();
        let mut failures = Vec::new();
        for item in &result.items {
            if item.success {
                if !affected.contains(&item.file_path) {
                    affected.push(item.file_path.clone());
                }
            } else {
                failures.push(format!("{}: {}", item.file_path, item.message));
            }
            if item.merged {
                continue;
            }
            if item.success || !item.before.is_empty() || !item.after.is_empty() {
                self.history.record(PatchHistoryEntry {
                    timestamp_ms: now_millis(),
                    file_path: item.file_path.clone(),
                    instruction: instruction.to_string(),
                    before: item.before.clone(),
                    after: item.after.clone(),
                    success: item.success,
                    confidence,
                    edit_kind: item.edit_kind,
                });
            }
        }

        ApplyOutcome {
            success: result.success_count > 0,
            message: format!("Applied {}/{} file changes", result.success_count, result.total),
            affected_files: affected,
            success_count: result.success_count,
            total: result.total,
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::FsWorkspace;
    use crate::indexer::filesystem::content_hash;
    use crate::models::{ChangeType, IncludedFile, MultiFileChange};
    use tempfile::TempDir;

    fn range_edit(start: usize, end: usize, content: &str) -> ParsedEdit {
        ParsedEdit {
            target: Some("a.ts".into()),
            kind: EditKind::ReplaceRange,
            start_line: Some(start),
            end_line: Some(end),
            content: content.into(),
            confidence: 0.8,
            language: None,
            label: None,
        }
    }

    fn setup(body: &str) -> (TempDir, EditTarget) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.ts"), body).unwrap();
        let target = EditTarget {
            path: dir.path().join("a.ts"),
            relative: "a.ts".into(),
        };
        (dir, target)
    }

    #[test]
    fn test_apply_range_edit_records_history() {
        let (dir, target) = setup("one\ntwo\nthree\n");
        let host = FsWorkspace::new(dir.path());
        let applier = PatchApplier::new(ApplyOptions::default());
        let outcome = applier.apply_edit(&host, &target, &range_edit(2, 2, "TWO"), "shout two", None);
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.affected_files, vec!["a.ts"]);
        assert_eq!(std::fs::read_to_string(&target.path).unwrap(), "one\nTWO\nthree\n");
        let entry = applier.history().last().unwrap();
        assert!(entry.success);
        assert_eq!(entry.before, "one\ntwo\nthree\n");
        assert_eq!(entry.after, "one\nTWO\nthree\n");
        assert_eq!(entry.instruction, "shout two");
    }

    #[test]
    fn test_unbalanced_code_is_rejected_without_mutation() {
        let (dir, target) = setup("one\n");
        let host = FsWorkspace::new(dir.path());
        let applier = PatchApplier::new(ApplyOptions::default());
        let outcome = applier.apply_edit(&host, &target, &range_edit(1, 1, "if (x) {"), "x", None);
        assert!(!outcome.success);
        assert!(outcome.message.contains("syntax validation failed"));
        assert!(outcome.affected_files.is_empty());
        assert_eq!(std::fs::read_to_string(&target.path).unwrap(), "one\n");
        assert!(applier.history().is_empty());
    }

    #[test]
    fn test_declined_confirmation() {
        let (dir, target) = setup("one\n");
        let host = FsWorkspace::new(dir.path()).with_confirmer(|_| false);
        let applier = PatchApplier::new(ApplyOptions::default());
        let outcome = applier.apply_edit(&host, &target, &range_edit(1, 1, "ONE"), "x", None);
        assert!(!outcome.success);
        assert_eq!(outcome.message, "Edit cancelled by user");
        assert_eq!(std::fs::read_to_string(&target.path).unwrap(), "one\n");

        let unattended = PatchApplier::new(ApplyOptions {
            require_confirmation: false,
            ..ApplyOptions::default()
        });
        assert!(unattended.apply_edit(&host, &target, &range_edit(1, 1, "ONE"), "x", None).success);
    }

    #[test]
    fn test_redaction_marker_refused() {
        let (dir, target) = setup("key = 1\n");
        let host = FsWorkspace::new(dir.path());
        let applier = PatchApplier::new(ApplyOptions::default());
        let outcome = applier.apply_edit(
            &host,
            &target,
            &range_edit(1, 1, "api_key=\"[REDACTED]\""),
            "x",
            None,
        );
        assert!(!outcome.success);
        assert!(outcome.message.contains("redaction"));
    }

    #[test]
    fn test_verify_line_content_detects_drift() {
        let (dir, target) = setup("one\ntwo\n");
        let context = ComposedContext {
            included_files: vec![IncludedFile {
                relative_path: "a.ts".into(),
                content_hash: content_hash("one\ntwo\n"),
                line_count: 2,
                shown_lines: 2,
                truncated: false,
            }],
            ..ComposedContext::default()
        };
        std::fs::write(&target.path, "zero\none\ntwo\n").unwrap();
        let host = FsWorkspace::new(dir.path());

        let strict = PatchApplier::new(ApplyOptions {
            verify_line_content: true,
            ..ApplyOptions::default()
        });
        let outcome = strict.apply_edit(&host, &target, &range_edit(2, 2, "TWO"), "x", Some(&context));
        assert!(!outcome.success);
        assert!(outcome.message.contains("changed since the prompt was composed"));

        // Off by default: stale numbers land on whatever line is there now.
        let lenient = PatchApplier::new(ApplyOptions::default());
        let outcome = lenient.apply_edit(&host, &target, &range_edit(2, 2, "TWO"), "x", Some(&context));
        assert!(outcome.success);
        assert_eq!(std::fs::read_to_string(&target.path).unwrap(), "zero\nTWO\ntwo\n");
    }

    #[test]
    fn test_function_update_fallback_replaces_whole_file() {
        let (dir, target) = setup("const a = 1;\n");
        let host = FsWorkspace::new(dir.path());
        let applier = PatchApplier::new(ApplyOptions::default());
        let edit = ParsedEdit {
            target: Some("missing".into()),
            kind: EditKind::FunctionUpdate,
            start_line: None,
            end_line: None,
            content: "/**\n * missing - gone\n */".into(),
            confidence: 0.5,
            language: None,
            label: None,
        };
        let outcome = applier.apply_edit(&host, &target, &edit, "doc", None);
        assert!(outcome.success);
        assert_eq!(
            std::fs::read_to_string(&target.path).unwrap(),
            "/**\n * missing - gone\n */"
        );
    }

    #[test]
    fn test_apply_changes_partial() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.ts"), "a\n").unwrap();
        let host = FsWorkspace::new(dir.path());
        let applier = PatchApplier::new(ApplyOptions::default());
        let change = |rel: &str, content: &str, change_type| BatchItem {
            path: dir.path().join(rel),
            relative: rel.to_string(),
            change: MultiFileChange {
                file_path: rel.to_string(),
                content: content.to_string(),
                change_type,
                start_line: None,
                end_line: None,
                language: None,
                unparsed_range: None,
            },
        };
        let outcome = applier.apply_changes(
            &host,
            vec![
                change("a.ts", "const a = 2;", ChangeType::Modify),
                change("b.ts", "const b = (;", ChangeType::Create),
            ],
            0.8,
            "two files",
            None,
        );
        assert!(outcome.success);
        assert_eq!(outcome.success_count, 1);
        assert_eq!(outcome.total, 2);
        assert_eq!(outcome.message, "Applied 1/2 file changes");
        assert_eq!(outcome.affected_files, vec!["a.ts"]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(applier.history().len(), 1);

        let none = applier.apply_changes(&host, vec![change("c.ts", "(", ChangeType::Create)], 0.8, "x", None);
        assert!(!none.success);
        assert_eq!(none.total, 1);
    }

    #[test]
    fn test_two_hunks_report_the_file_once() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.ts"), "one\ntwo\nthree\nfour\n").unwrap();
        let host = FsWorkspace::new(dir.path());
        let applier = PatchApplier::new(ApplyOptions::default());
        let hunk = |line: usize, content: &str| BatchItem {
            path: dir.path().join("a.ts"),
            relative: "a.ts".to_string(),
            change: MultiFileChange {
                file_path: "a.ts".to_string(),
                content: content.to_string(),
                change_type: ChangeType::Modify,
                start_line: Some(line),
                end_line: Some(line),
                language: None,
                unparsed_range: None,
            },
        };
        let outcome = applier.apply_changes(&host, vec![hunk(1, "ONE\nONE_B"), hunk(3, "THREE")], 0.8, "two hunks", None);
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.success_count, 2);
        assert_eq!(outcome.affected_files, vec!["a.ts"]);
        assert_eq!(applier.history().len(), 1);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.ts")).unwrap(),
            "ONE\nONE_B\ntwo\nTHREE\nfour\n"
        );
    }
}
