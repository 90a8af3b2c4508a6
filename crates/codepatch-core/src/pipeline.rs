//! End-to-end instruction-to-edit orchestration.
//!
//! One `EditPipeline` per workspace session owns the index, the resolution
//! cache and the patch history. Stages run strictly in sequence; every
//! user-facing failure ends the run with an unsuccessful [`PipelineOutcome`]
//! and no file touched.

use std::path::{Component, Path};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{CodepatchConfig, ParseContext};
use crate::host::{LanguageModel, WorkspaceHost};
use crate::indexer::filesystem::TEXT_LANGUAGE;
use crate::indexer::pipeline::{IndexSnapshot, ProjectIndex};
use crate::models::{
    ComposedContext, EditKind, FileMatch, FileRecord, IndexStats, MultiFileChange, ParsedEdit, ParsedOutput,
    ResponseType,
};
use crate::patch::applier::{ApplyOutcome, EditTarget, PatchApplier};
use crate::patch::batch::BatchItem;
use crate::patch::history::PatchHistory;
use crate::query::context::ContextComposer;
use crate::query::resolver::FileResolver;
use crate::response::multifile::mark_missing_as_create;
use crate::response::parser::ResponseParser;

const SYNTHETIC_PREFIX: &str = "modified_file_";

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Resolve,
    Compose,
    Model,
    Parse,
    Apply,
    Done,
}

/// Result of one pipeline run; `stage` is where it stopped.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PipelineOutcome {
    pub success: bool,
    pub stage: PipelineStage,
    pub message: String,
    pub matches: Vec<FileMatch>,
    pub context: Option<ComposedContext>,
    pub parsed: Option<ParsedOutput>,
    pub apply: Option<ApplyOutcome>,
}

impl PipelineOutcome {
    fn stopped(stage: PipelineStage, message: impl Into<String>) -> Self {
        Self {
            success: false,
            stage,
            message: message.into(),
            matches: Vec::new(),
            context: None,
            parsed: None,
            apply: None,
        }
    }
}

fn synthetic_index(change: &MultiFileChange) -> Option<usize> {
    change
        .file_path
        .strip_prefix(SYNTHETIC_PREFIX)
        .and_then(|n| n.parse::<usize>().ok())
}

/// A tagged language must match the file, and a file with known symbols must
/// have at least one of them named in the block.
fn plausibly_for(change: &MultiFileChange, record: &FileRecord) -> bool {
    if change
        .language
        .as_deref()
        .is_some_and(|lang| record.language != TEXT_LANGUAGE && lang != record.language)
    {
        return false;
    }
    let mut symbols = record
        .functions
        .iter()
        .chain(&record.classes)
        .chain(&record.exports)
        .peekable();
    symbols.peek().is_none() || symbols.any(|name| change.content.contains(name.as_str()))
}

/// Workspace-relative path that stays inside the root.
fn safe_relative(path: &str) -> Option<String> {
    let trimmed = path.trim().trim_start_matches("./").replace('\\', "/");
    let candidate = Path::new(&trimmed);
    if trimmed.is_empty() || candidate.is_absolute() {
        return None;
    }
    if candidate
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_) | Component::RootDir))
    {
        return None;
    }
    Some(trimmed)
}

pub struct EditPipeline {
    host: Box<dyn WorkspaceHost>,
    config: CodepatchConfig,
    index: ProjectIndex,
    resolver: FileResolver,
    composer: ContextComposer,
    parser: ResponseParser,
    applier: PatchApplier,
}

impl EditPipeline {
    pub fn new(host: Box<dyn WorkspaceHost>, config: CodepatchConfig) -> Self {
        Self {
            composer: ContextComposer::new(config.compose.clone()),
            applier: PatchApplier::new(config.apply.clone()),
            host,
            config,
            index: ProjectIndex::new(),
            resolver: FileResolver::new(),
            parser: ResponseParser,
        }
    }

    pub fn host(&self) -> &dyn WorkspaceHost {
        self.host.as_ref()
    }

    pub fn config(&self) -> &CodepatchConfig {
        &self.config
    }

    pub fn index(&self) -> &ProjectIndex {
        &self.index
    }

    pub fn history(&self) -> &PatchHistory {
        self.applier.history()
    }

    pub fn stats(&self) -> IndexStats {
        self.index.stats()
    }

    /// Force a full rebuild.
    pub fn build_index(&self) -> Arc<IndexSnapshot> {
        self.index.build(self.host(), &self.config.index)
    }

    pub fn resolve(&self, instruction: &str) -> Vec<FileMatch> {
        let snapshot = self.index.ensure_built(self.host(), &self.config.index);
        self.resolver.resolve(&snapshot, instruction, &self.config.resolve)
    }

    pub fn compose(&self, instruction: &str, matches: &[FileMatch]) -> ComposedContext {
        self.composer.compose(self.host(), instruction, matches)
    }

    pub fn parse_context(&self, instruction: &str, context: &ComposedContext) -> ParseContext {
        ParseContext {
            expected_language: context
                .files_used
                .first()
                .map(|m| m.file.language.clone())
                .filter(|lang| lang != TEXT_LANGUAGE),
            expect_multi_file: context.files_used.len() > 1,
            instruction: instruction.to_string(),
        }
    }

    /// Resolve, compose, ask the model, parse and apply.
    pub fn run(&self, instruction: &str, model: &dyn LanguageModel) -> PipelineOutcome {
        let matches = self.resolve(instruction);
        if matches.is_empty() {
            return PipelineOutcome::stopped(
                PipelineStage::Resolve,
                "No relevant files found for this instruction",
            );
        }
        let context = self.compose(instruction, &matches);
        if context.files_used.is_empty() {
            return PipelineOutcome {
                matches,
                context: Some(context),
                ..PipelineOutcome::stopped(PipelineStage::Compose, "None of the matched files could be loaded")
            };
        }

        let reply = match model.complete(&context.system_prompt, &context.user_prompt) {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Model request failed: {e}");
                return PipelineOutcome {
                    matches,
                    context: Some(context),
                    ..PipelineOutcome::stopped(PipelineStage::Model, format!("Model request failed: {e}"))
                };
            }
        };
        self.apply_reply(instruction, matches, context, &reply)
    }

    /// Parse and apply a model reply for an already composed context.
    pub fn apply_reply(
        &self,
        instruction: &str,
        matches: Vec<FileMatch>,
        context: ComposedContext,
        reply: &str,
    ) -> PipelineOutcome {
        let parsed = self.parser.parse(reply, &self.parse_context(instruction, &context));
        debug!(
            "Parsed reply: {:?}, confidence {:.2}",
            parsed.response_type, parsed.confidence
        );
        if !ResponseParser::has_payload(&parsed) {
            return PipelineOutcome {
                matches,
                context: Some(context),
                parsed: Some(parsed),
                ..PipelineOutcome::stopped(PipelineStage::Parse, "The model returned no extractable code")
            };
        }

        let apply = if parsed.response_type == ResponseType::Multifile {
            self.apply_multi_file(instruction, &parsed, &context)
        } else {
            match parsed.primary.as_ref() {
                Some(edit) => self.apply_single(instruction, edit, &context),
                None => ApplyOutcome::failure("The model returned no extractable code"),
            }
        };

        if apply.success {
            self.refresh_affected(&apply.affected_files);
            info!("{}", apply.message);
        }
        PipelineOutcome {
            success: apply.success,
            stage: if apply.success {
                PipelineStage::Done
            } else {
                PipelineStage::Apply
            },
            message: apply.message.clone(),
            matches,
            context: Some(context),
            parsed: Some(parsed),
            apply: Some(apply),
        }
    }

    fn target_from_match(m: &FileMatch) -> EditTarget {
        EditTarget {
            path: m.file.path.clone(),
            relative: m.file.relative_path.clone(),
        }
    }

    /// Which shown file a single edit is aimed at.
    fn single_target(&self, edit: &ParsedEdit, context: &ComposedContext) -> Option<EditTarget> {
        let used = &context.files_used;
        if let Some(name) = edit.target.as_deref() {
            if edit.kind == EditKind::FunctionUpdate {
                if let Some(m) = used.iter().find(|m| m.file.functions.iter().any(|f| f == name)) {
                    return Some(Self::target_from_match(m));
                }
            } else if let Some(m) = context
                .included(name)
                .and_then(|inc| used.iter().find(|m| m.file.relative_path == inc.relative_path))
            {
                return Some(Self::target_from_match(m));
            }
        }
        used.first().map(Self::target_from_match)
    }

    fn apply_single(&self, instruction: &str, edit: &ParsedEdit, context: &ComposedContext) -> ApplyOutcome {
        let Some(target) = self.single_target(edit, context) else {
            return ApplyOutcome::failure("No target file for the proposed edit");
        };
        self.applier
            .apply_edit(self.host(), &target, edit, instruction, Some(context))
    }

    fn apply_multi_file(&self, instruction: &str, parsed: &ParsedOutput, context: &ComposedContext) -> ApplyOutcome {
        if self.host.root().is_none() {
            return ApplyOutcome::failure("No workspace folder is open");
        }
        let snapshot = self.index.snapshot();
        let mut changes = Vec::with_capacity(parsed.changes.len());
        let mut rejected = Vec::new();
        let anonymous = parsed.changes.iter().filter(|c| synthetic_index(c).is_some()).count();

        for change in &parsed.changes {
            let mut change = change.clone();
            // Anonymous blocks map onto the shown files in order, one each.
            if let Some(n) = synthetic_index(&change) {
                let shown = context.files_used.get(n.saturating_sub(1));
                match shown {
                    Some(m) if anonymous == context.files_used.len() && plausibly_for(&change, &m.file) => {
                        change.file_path = m.file.relative_path.clone();
                    }
                    _ => {
                        debug!("Unlabeled block {n} of {anonymous} left unmapped");
                        rejected.push(format!(
                            "{}: cannot tell which shown file this unlabeled block belongs to",
                            change.file_path
                        ));
                        continue;
                    }
                }
            }
            let Some(relative) = safe_relative(&change.file_path) else {
                rejected.push(format!("{}: path escapes the workspace", change.file_path));
                continue;
            };
            // A bare file name refers to the indexed file of that name.
            change.file_path = snapshot
                .find_by_path(&relative)
                .filter(|record| record.relative_path == relative || !relative.contains('/'))
                .map(|record| record.relative_path.clone())
                .unwrap_or(relative);
            changes.push(change);
        }

        mark_missing_as_create(&mut changes, |relative| {
            self.host
                .absolute(relative)
                .is_some_and(|path| self.host.file_exists(&path))
        });
        let items: Vec<BatchItem> = changes
            .into_iter()
            .filter_map(|change| {
                let path = self.host.absolute(&change.file_path)?;
                Some(BatchItem {
                    path,
                    relative: change.file_path.clone(),
                    change,
                })
            })
            .collect();

        if items.is_empty() {
            let mut outcome = ApplyOutcome::failure(format!(
                "No applicable file changes: {}",
                rejected.join("; ")
            ));
            outcome.total = rejected.len();
            outcome.failures = rejected;
            return outcome;
        }

        let mut outcome = self
            .applier
            .apply_changes(self.host(), items, parsed.confidence, instruction, Some(context));
        if !rejected.is_empty() {
            outcome.total += rejected.len();
            outcome.message = format!("Applied {}/{} file changes", outcome.success_count, outcome.total);
            outcome.failures.extend(rejected);
        }
        outcome
    }

    fn refresh_affected(&self, files: &[String]) {
        for relative in files {
            let Some(path) = self.host.absolute(relative) else { continue };
            if self.host.file_exists(&path) {
                if let Err(e) = self.index.refresh_file(self.host(), &path) {
                    warn!("Could not refresh {relative} after apply: {e}");
                }
            } else {
                self.index.remove_file(relative);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{CodepatchError, CodepatchResult};
    use crate::host::FsWorkspace;
    use tempfile::TempDir;

    struct Fixed(&'static str);

    impl LanguageModel for Fixed {
        fn complete(&self, _system: &str, _user: &str) -> CodepatchResult<String> {
            Ok(self.0.to_string())
        }
    }

    struct Offline;

    impl LanguageModel for Offline {
        fn complete(&self, _system: &str, _user: &str) -> CodepatchResult<String> {
            Err(CodepatchError::Model("timed out".into()))
        }
    }

    fn workspace() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("main.ts"), "const a = 1;\nconst b = 2;\n").unwrap();
        dir
    }

    fn unattended() -> CodepatchConfig {
        let mut config = CodepatchConfig::default();
        config.apply.require_confirmation = false;
        config
    }

    #[test]
    fn test_safe_relative() {
        assert_eq!(safe_relative("./src/a.ts").as_deref(), Some("src/a.ts"));
        assert!(safe_relative("../etc/passwd").is_none());
        assert!(safe_relative("/etc/passwd").is_none());
        assert!(safe_relative("").is_none());
    }

    #[test]
    fn test_no_match_stops_at_resolve() {
        let dir = workspace();
        let pipeline = EditPipeline::new(Box::new(FsWorkspace::new(dir.path())), unattended());
        let outcome = pipeline.run("fix it", &Fixed("unused"));
        assert!(!outcome.success);
        assert_eq!(outcome.stage, PipelineStage::Resolve);
    }

    #[test]
    fn test_model_failure_touches_nothing() {
        let dir = workspace();
        let pipeline = EditPipeline::new(Box::new(FsWorkspace::new(dir.path())), unattended());
        let outcome = pipeline.run("update main.ts", &Offline);
        assert!(!outcome.success);
        assert_eq!(outcome.stage, PipelineStage::Model);
        assert!(outcome.message.contains("timed out"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("main.ts")).unwrap(),
            "const a = 1;\nconst b = 2;\n"
        );
    }

    #[test]
    fn test_prose_reply_stops_at_parse() {
        let dir = workspace();
        let pipeline = EditPipeline::new(Box::new(FsWorkspace::new(dir.path())), unattended());
        let outcome = pipeline.run("update main.ts", &Fixed("Nothing needs to change in this file."));
        assert!(!outcome.success);
        assert_eq!(outcome.stage, PipelineStage::Parse);
    }

    #[test]
    fn test_range_reply_applies_and_refreshes_index() {
        let dir = workspace();
        let pipeline = EditPipeline::new(Box::new(FsWorkspace::new(dir.path())), unattended());
        let generation_before = pipeline.index().snapshot().generation;
        let reply = "File: main.ts (lines 2-2)\n```ts\nexport function b() { return 2; }\n```\n";
        let outcome = pipeline.run("update main.ts", &Fixed(reply));
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.stage, PipelineStage::Done);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("main.ts")).unwrap(),
            "const a = 1;\nexport function b() { return 2; }\n"
        );
        let snapshot = pipeline.index().snapshot();
        assert!(snapshot.generation > generation_before);
        assert!(snapshot.get("main.ts").unwrap().functions.contains(&"b".to_string()));
        assert_eq!(pipeline.history().len(), 1);
    }

    #[test]
    fn test_extra_unlabeled_blocks_are_not_spread_over_shown_files() {
        let dir = workspace();
        let pipeline = EditPipeline::new(Box::new(FsWorkspace::new(dir.path())), unattended());
        let reply = "```ts\nconst a = 5;\n```\n```ts\nconst b = 6;\n```\n```ts\nconst c = 7;\n```\n";
        let outcome = pipeline.run("update main.ts", &Fixed(reply));
        assert!(!outcome.success);
        assert!(outcome.message.contains("cannot tell which shown file"), "{}", outcome.message);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("main.ts")).unwrap(),
            "const a = 1;\nconst b = 2;\n"
        );
    }

    #[test]
    fn test_unlabeled_block_must_name_a_symbol_of_its_file() {
        let mut record = FileRecord {
            path: "src/a.ts".into(),
            relative_path: "src/a.ts".into(),
            functions: vec!["render".into()],
            classes: Vec::new(),
            exports: Vec::new(),
            imports: Vec::new(),
            line_count: 3,
            language: "typescript".into(),
            last_modified_ms: 0,
            summary: String::new(),
            content_hash: String::new(),
            size_bytes: 0,
        };
        let change = |content: &str, language: Option<&str>| MultiFileChange {
            file_path: "modified_file_1".into(),
            content: content.into(),
            change_type: crate::models::ChangeType::Modify,
            start_line: None,
            end_line: None,
            language: language.map(str::to_string),
            unparsed_range: None,
        };
        assert!(plausibly_for(&change("function render() {}", Some("typescript")), &record));
        assert!(!plausibly_for(&change("function paint() {}", Some("typescript")), &record));
        assert!(!plausibly_for(&change("def render(): pass", Some("python")), &record));
        record.functions.clear();
        assert!(plausibly_for(&change("const x = 1;", None), &record));
    }

    #[test]
    fn test_cleared_index_resolves_against_fresh_symbols() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("alpha.ts"), "export class Widget {}\n").unwrap();
        std::fs::write(dir.path().join("beta.ts"), "export const size = 1;\n").unwrap();
        let pipeline = EditPipeline::new(Box::new(FsWorkspace::new(dir.path())), unattended());

        let first = pipeline.resolve("fix Widget");
        assert_eq!(first[0].file.relative_path, "alpha.ts");

        std::fs::write(dir.path().join("alpha.ts"), "export const size = 2;\n").unwrap();
        std::fs::write(dir.path().join("beta.ts"), "export class Widget {}\n").unwrap();
        pipeline.index().clear();

        let second = pipeline.resolve("fix Widget");
        assert_eq!(second[0].file.relative_path, "beta.ts");
    }

    #[test]
    fn test_escaping_path_is_rejected() {
        let dir = workspace();
        let pipeline = EditPipeline::new(Box::new(FsWorkspace::new(dir.path())), unattended());
        let reply = "File: ../outside.ts\n```ts\nconst x = 1;\n```\n";
        let outcome = pipeline.run("update main.ts", &Fixed(reply));
        assert!(!outcome.success);
        assert!(outcome.message.contains("escapes the workspace"));
        assert!(!dir.path().parent().unwrap().join("outside.ts").exists());
    }
}
