//! Best-effort multi-file batches.
//!
//! All operations are validated in parallel before anything is written, then
//! committed one by one. Each operation succeeds or fails on its own and
//! nothing is rolled back.

use std::collections::HashMap;
use std::path::PathBuf;

use indexmap::IndexMap;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::host::WorkspaceHost;
use crate::models::{ChangeType, ComposedContext, EditKind, MultiFileChange, TextRange};
use crate::patch::plan::{plan_edit, validate_content, verify_against_context, EditPlan, PatchPreview};
use crate::patch::range::splice;
use crate::response::parser::edit_from_change;

/// One per-file operation.
#[derive(Clone, Debug)]
pub struct BatchItem {
    pub path: PathBuf,
    pub relative: String,
    pub change: MultiFileChange,
}

/// What a prepared operation will do.
#[derive(Clone, Debug)]
pub enum PreparedOp {
    Create { content: String },
    Delete { before: String },
    Modify { before: String, plan: EditPlan },
    /// Folded into an earlier change to the same file; lands with it.
    Merged { kind: EditKind },
}

#[derive(Clone, Debug)]
pub struct PreparedItem {
    pub item: BatchItem,
    pub op: Result<PreparedOp, String>,
}

impl PreparedItem {
    pub fn summary(&self) -> String {
        match &self.op {
            Ok(PreparedOp::Create { content }) => {
                format!("create {} (+{} lines)", self.item.relative, content.lines().count())
            }
            Ok(PreparedOp::Delete { .. }) => format!("delete {}", self.item.relative),
            Ok(PreparedOp::Modify { plan, .. }) => {
                format!("modify {} ({})", self.item.relative, plan.preview.describe())
            }
            Ok(PreparedOp::Merged { .. }) => {
                format!("modify {} (merged with an earlier change)", self.item.relative)
            }
            Err(e) => format!("skip {}: {e}", self.item.relative),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BatchItemResult {
    pub file_path: String,
    pub change_type: ChangeType,
    pub edit_kind: EditKind,
    pub success: bool,
    pub message: String,
    pub before: String,
    pub after: String,
    /// Landed as part of an earlier change to the same file.
    pub merged: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchResult {
    pub items: Vec<BatchItemResult>,
    pub success_count: usize,
    pub total: usize,
}

fn prepare(
    host: &dyn WorkspaceHost,
    item: &BatchItem,
    confidence: f64,
    verify: Option<&ComposedContext>,
) -> Result<PreparedOp, String> {
    match item.change.change_type {
        ChangeType::Delete => {
            if !host.file_exists(&item.path) {
                return Err("file does not exist".to_string());
            }
            let before = host.read_file(&item.path).unwrap_or_default();
            Ok(PreparedOp::Delete { before })
        }
        ChangeType::Create => {
            let edit = edit_from_change(&item.change, confidence);
            validate_content(&edit)?;
            if host.file_exists(&item.path) {
                return Err("file already exists".to_string());
            }
            let mut content = item.change.content.clone();
            if !content.is_empty() && !content.ends_with('\n') {
                content.push('\n');
            }
            Ok(PreparedOp::Create { content })
        }
        ChangeType::Modify => {
            if let Some(note) = &item.change.unparsed_range {
                return Err(format!(
                    "could not read the line range '({note})'; refusing to replace the whole file"
                ));
            }
            let edit = edit_from_change(&item.change, confidence);
            validate_content(&edit)?;
            let before = host
                .read_file(&item.path)
                .map_err(|e| format!("could not read file: {e}"))?;
            if let (Some(context), EditKind::ReplaceRange) = (verify, edit.kind) {
                verify_against_context(context, &item.relative, &before)?;
            }
            let plan = plan_edit(&before, &edit)?;
            Ok(PreparedOp::Modify { before, plan })
        }
    }
}

fn overlaps(a: TextRange, b: TextRange) -> bool {
    (a.start < b.end && b.start < a.end) || a.start == b.start
}

/// Fold accepted changes that target one file into a single splice against
/// the text they were all planned on. Overlapping or non-modify siblings are
/// rejected.
fn merge_same_file(prepared: &mut [PreparedItem]) {
    let mut groups: IndexMap<PathBuf, Vec<usize>> = IndexMap::new();
    for (i, p) in prepared.iter().enumerate() {
        if p.op.is_ok() {
            groups.entry(p.item.path.clone()).or_default().push(i);
        }
    }

    for (_, members) in groups.into_iter().filter(|(_, m)| m.len() > 1) {
        let lead = members[0];
        let mut accepted = vec![lead];
        for &i in &members[1..] {
            let fits = match (&prepared[lead].op, &prepared[i].op) {
                (Ok(PreparedOp::Modify { before, .. }), Ok(PreparedOp::Modify { before: other, plan })) => {
                    other == before
                        && accepted.iter().all(|&j| match &prepared[j].op {
                            Ok(PreparedOp::Modify { plan: taken, .. }) => !overlaps(taken.range, plan.range),
                            _ => false,
                        })
                }
                _ => false,
            };
            if fits {
                accepted.push(i);
            } else {
                debug!("Batch item {} conflicts with an earlier change", prepared[i].item.relative);
                prepared[i].op = Err(format!("conflicts with an earlier change to {}", prepared[i].item.relative));
            }
        }
        if accepted.len() < 2 {
            continue;
        }

        let mut hunks: Vec<(TextRange, String, PatchPreview)> = accepted
            .iter()
            .filter_map(|&i| match &prepared[i].op {
                Ok(PreparedOp::Modify { plan, .. }) => Some((plan.range, plan.replacement.clone(), plan.preview)),
                _ => None,
            })
            .collect();
        hunks.sort_by(|a, b| b.0.start.cmp(&a.0.start));

        let Ok(PreparedOp::Modify { before, plan }) = &prepared[lead].op else {
            continue;
        };
        let (before, kind) = (before.clone(), plan.kind);
        let mut after = before.clone();
        for (range, replacement, _) in &hunks {
            after = splice(&after, *range, replacement);
        }
        let preview = hunks.iter().fold(PatchPreview::default(), |acc, (_, _, p)| PatchPreview {
            added: acc.added + p.added,
            removed: acc.removed + p.removed,
        });
        debug!("Merged {} changes to {}", hunks.len(), prepared[lead].item.relative);

        prepared[lead].op = Ok(PreparedOp::Modify {
            plan: EditPlan {
                range: TextRange::whole(&before),
                replacement: after.clone(),
                after,
                kind,
                preview,
            },
            before,
        });
        for &i in &accepted[1..] {
            let kind = match &prepared[i].op {
                Ok(PreparedOp::Modify { plan, .. }) => plan.kind,
                _ => EditKind::ReplaceRange,
            };
            prepared[i].op = Ok(PreparedOp::Merged { kind });
        }
    }
}

/// Validate every operation concurrently. Nothing is written.
pub fn prepare_batch(
    host: &dyn WorkspaceHost,
    items: Vec<BatchItem>,
    confidence: f64,
    verify: Option<&ComposedContext>,
) -> Vec<PreparedItem> {
    let mut prepared: Vec<PreparedItem> = items
        .into_par_iter()
        .map(|item| {
            let op = prepare(host, &item, confidence, verify);
            if let Err(e) = &op {
                debug!("Batch item {} rejected: {e}", item.relative);
            }
            PreparedItem { item, op }
        })
        .collect();
    merge_same_file(&mut prepared);
    prepared
}

/// Apply prepared operations in order; rejected ones are reported as failures.
pub fn commit_batch(host: &dyn WorkspaceHost, prepared: Vec<PreparedItem>) -> BatchResult {
    let total = prepared.len();
    let mut items = Vec::with_capacity(total);
    let mut landed: HashMap<PathBuf, Result<(), String>> = HashMap::new();

    for PreparedItem { item, op } in prepared {
        let change_type = item.change.change_type;
        let result = match op {
            Err(message) => BatchItemResult {
                file_path: item.relative,
                change_type,
                edit_kind: EditKind::ReplaceWholeFile,
                success: false,
                message,
                before: String::new(),
                after: String::new(),
                merged: false,
            },
            Ok(PreparedOp::Create { content }) => {
                let outcome = host.create_file(&item.path, &content);
                BatchItemResult {
                    success: outcome.is_ok(),
                    message: outcome.err().map(|e| e.to_string()).unwrap_or_else(|| "created".to_string()),
                    file_path: item.relative,
                    change_type,
                    edit_kind: EditKind::ReplaceWholeFile,
                    before: String::new(),
                    after: content,
                    merged: false,
                }
            }
            Ok(PreparedOp::Delete { before }) => {
                let outcome = host.delete_file(&item.path);
                BatchItemResult {
                    success: outcome.is_ok(),
                    message: outcome.err().map(|e| e.to_string()).unwrap_or_else(|| "deleted".to_string()),
                    file_path: item.relative,
                    change_type,
                    edit_kind: EditKind::ReplaceWholeFile,
                    before,
                    after: String::new(),
                    merged: false,
                }
            }
            Ok(PreparedOp::Modify { before, plan }) => {
                let outcome = host.replace_range(&item.path, plan.range, &plan.replacement);
                landed.insert(item.path.clone(), outcome.as_ref().map(|_| ()).map_err(|e| e.to_string()));
                BatchItemResult {
                    success: outcome.is_ok(),
                    message: outcome
                        .err()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| format!("modified ({})", plan.preview.describe())),
                    file_path: item.relative,
                    change_type,
                    edit_kind: plan.kind,
                    before,
                    after: plan.after,
                    merged: false,
                }
            }
            Ok(PreparedOp::Merged { kind }) => {
                let outcome = landed
                    .get(&item.path)
                    .cloned()
                    .unwrap_or_else(|| Err("earlier change to this file was not applied".to_string()));
                BatchItemResult {
                    success: outcome.is_ok(),
                    message: outcome
                        .err()
                        .unwrap_or_else(|| "modified (merged with an earlier change)".to_string()),
                    file_path: item.relative,
                    change_type,
                    edit_kind: kind,
                    before: String::new(),
                    after: String::new(),
                    merged: true,
                }
            }
        };
        if !result.success {
            warn!("Batch item {} failed: {}", result.file_path, result.message);
        }
        items.push(result);
    }

    let success_count = items.iter().filter(|r| r.success).count();
    if success_count < total {
        warn!("Batch applied {success_count}/{total} file changes");
    }
    BatchResult {
        items,
        success_count,
        total,
    }
}

/// Combined preview across prepared operations.
pub fn batch_preview(prepared: &[PreparedItem]) -> PatchPreview {
    prepared.iter().fold(PatchPreview::default(), |acc, p| match &p.op {
        Ok(PreparedOp::Create { content }) => PatchPreview {
            added: acc.added + content.lines().count(),
            ..acc
        },
        Ok(PreparedOp::Delete { before }) => PatchPreview {
            removed: acc.removed + before.lines().count(),
            ..acc
        },
        Ok(PreparedOp::Modify { plan, .. }) => PatchPreview {
            added: acc.added + plan.preview.added,
            removed: acc.removed + plan.preview.removed,
        },
        Ok(PreparedOp::Merged { .. }) | Err(_) => acc,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::FsWorkspace;
    use tempfile::TempDir;

    fn item(root: &std::path::Path, rel: &str, change_type: ChangeType, content: &str) -> BatchItem {
        BatchItem {
            path: root.join(rel),
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
        }
    }

    #[test]
    fn test_partial_failure_is_reported_not_rolled_back() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("keep.ts"), "old\n").unwrap();
        std::fs::write(dir.path().join("gone.ts"), "bye\n").unwrap();
        let host = FsWorkspace::new(dir.path());
        let items = vec![
            item(dir.path(), "keep.ts", ChangeType::Modify, "const a = 1;"),
            item(dir.path(), "bad.ts", ChangeType::Create, "function broken() {"),
            item(dir.path(), "new/fresh.ts", ChangeType::Create, "export {}"),
            item(dir.path(), "gone.ts", ChangeType::Delete, ""),
        ];
        let prepared = prepare_batch(&host, items, 0.8, None);
        assert_eq!(prepared.len(), 4);
        assert!(prepared[1].op.is_err());
        assert!(prepared[1].summary().starts_with("skip bad.ts"));

        let result = commit_batch(&host, prepared);
        assert_eq!(result.total, 4);
        assert_eq!(result.success_count, 3);
        assert!(!result.items[1].success);
        assert_eq!(std::fs::read_to_string(dir.path().join("keep.ts")).unwrap(), "const a = 1;\n");
        assert_eq!(std::fs::read_to_string(dir.path().join("new/fresh.ts")).unwrap(), "export {}\n");
        assert!(!dir.path().join("gone.ts").exists());
        assert!(!dir.path().join("bad.ts").exists());
    }

    #[test]
    fn test_range_change_and_preview() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("x.ts"), "a\nb\nc\nd\n").unwrap();
        let host = FsWorkspace::new(dir.path());
        let mut change = item(dir.path(), "x.ts", ChangeType::Modify, "B\nC");
        change.change.start_line = Some(2);
        change.change.end_line = Some(3);
        let prepared = prepare_batch(&host, vec![change], 0.8, None);
        assert_eq!(batch_preview(&prepared), PatchPreview { added: 2, removed: 2 });
        let result = commit_batch(&host, prepared);
        assert_eq!(result.success_count, 1);
        assert_eq!(result.items[0].edit_kind, EditKind::ReplaceRange);
        assert_eq!(std::fs::read_to_string(dir.path().join("x.ts")).unwrap(), "a\nB\nC\nd\n");
    }

    fn ranged(root: &std::path::Path, rel: &str, start: usize, end: usize, content: &str) -> BatchItem {
        let mut it = item(root, rel, ChangeType::Modify, content);
        it.change.start_line = Some(start);
        it.change.end_line = Some(end);
        it
    }

    fn ten_lines() -> String {
        (1..=10).map(|i| format!("const v{i} = {i};\n")).collect()
    }

    #[test]
    fn test_two_hunks_in_one_file_land_at_their_own_lines() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("m.ts"), ten_lines()).unwrap();
        let host = FsWorkspace::new(dir.path());
        let items = vec![
            ranged(dir.path(), "m.ts", 2, 2, "const v2 = 20;\nconst v2b = 21;\nconst v2c = 22;"),
            ranged(dir.path(), "m.ts", 8, 8, "const v8 = 80;"),
        ];
        let prepared = prepare_batch(&host, items, 0.8, None);
        assert!(matches!(prepared[1].op, Ok(PreparedOp::Merged { .. })));
        assert_eq!(batch_preview(&prepared), PatchPreview { added: 4, removed: 2 });

        let result = commit_batch(&host, prepared);
        assert_eq!(result.success_count, 2);
        assert!(result.items[1].merged);

        let mut expected: Vec<String> = (1..=10).map(|i| format!("const v{i} = {i};")).collect();
        expected[7] = "const v8 = 80;".to_string();
        expected.splice(1..2, ["const v2 = 20;", "const v2b = 21;", "const v2c = 22;"].map(String::from));
        let written = std::fs::read_to_string(dir.path().join("m.ts")).unwrap();
        assert_eq!(written, format!("{}\n", expected.join("\n")));
    }

    #[test]
    fn test_overlapping_hunks_are_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("m.ts"), ten_lines()).unwrap();
        let host = FsWorkspace::new(dir.path());
        let items = vec![
            ranged(dir.path(), "m.ts", 3, 5, "const v3 = 30;"),
            ranged(dir.path(), "m.ts", 5, 6, "const v5 = 50;"),
        ];
        let prepared = prepare_batch(&host, items, 0.8, None);
        assert!(matches!(prepared[0].op, Ok(PreparedOp::Modify { .. })));
        let err = prepared[1].op.clone().unwrap_err();
        assert!(err.contains("conflicts with an earlier change"), "{err}");

        let result = commit_batch(&host, prepared);
        assert_eq!(result.success_count, 1);
        let written = std::fs::read_to_string(dir.path().join("m.ts")).unwrap();
        assert!(written.starts_with("const v1 = 1;\nconst v2 = 2;\nconst v3 = 30;\nconst v6 = 6;\n"));
    }

    #[test]
    fn test_unreadable_range_never_replaces_the_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("m.ts"), ten_lines()).unwrap();
        let host = FsWorkspace::new(dir.path());
        let mut change = item(dir.path(), "m.ts", ChangeType::Modify, "const v3 = 30;");
        change.change.unparsed_range = Some("lines 3, 4".to_string());
        let prepared = prepare_batch(&host, vec![change], 0.8, None);
        let err = prepared[0].op.clone().unwrap_err();
        assert!(err.contains("could not read the line range"), "{err}");

        let result = commit_batch(&host, prepared);
        assert_eq!(result.success_count, 0);
        assert_eq!(std::fs::read_to_string(dir.path().join("m.ts")).unwrap(), ten_lines());
    }

    #[test]
    fn test_missing_delete_target_fails() {
        let dir = TempDir::new().unwrap();
        let host = FsWorkspace::new(dir.path());
        let prepared = prepare_batch(&host, vec![item(dir.path(), "nope.ts", ChangeType::Delete, "")], 0.8, None);
        let result = commit_batch(&host, prepared);
        assert_eq!(result.success_count, 0);
        assert_eq!(result.items[0].message, "file does not exist");
    }
}
