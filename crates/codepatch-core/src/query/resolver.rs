//! Instruction-to-file resolution.
//!
//! Resolution runs ordered stages of match strategies. The first stage (file
//! names) short-circuits: if it produces anything, only its single best match
//! is returned and the symbol and fuzzy stages never run.

use std::collections::HashMap;

use tracing::debug;

use crate::config::ResolveOptions;
use crate::indexer::pipeline::IndexSnapshot;
use crate::models::{FileMatch, FileRecord, MatchType};
use crate::query::cache::{CacheMode, ResolutionCache};
use crate::query::guards::{clamp_limit, truncate_instruction, MAX_RESOLVE_RESULTS};
use crate::query::identifiers::{extract_identifiers, identifier_stem};
use crate::query::scoring::{
    file_name_score, fuzzy_score, symbol_score, FUZZY_FLOOR, PATH_FUZZY_SCALE,
    SUMMARY_FUZZY_SCALE,
};

/// One way of scoring an identifier against a file.
pub trait MatchStrategy: Send + Sync {
    fn match_type(&self) -> MatchType;

    /// Score and diagnostic reason, or `None` when the strategy does not apply.
    fn score(&self, identifier: &str, file: &FileRecord, options: &ResolveOptions) -> Option<(f64, String)>;
}

/// File base name equality or containment.
pub struct FileNameStrategy;

impl MatchStrategy for FileNameStrategy {
    fn match_type(&self) -> MatchType {
        MatchType::Exact
    }

    fn score(&self, identifier: &str, file: &FileRecord, _options: &ResolveOptions) -> Option<(f64, String)> {
        let base = file.base_name();
        let stem = identifier_stem(identifier);
        file_name_score(&stem, &base).map(|score| {
            let how = if score >= 1.0 { "equals" } else { "is contained in" };
            (score, format!("'{identifier}' {how} file name '{base}'"))
        })
    }
}

#[derive(Clone, Copy)]
pub enum SymbolKind {
    Class,
    Function,
    Export,
}

/// Declared-symbol matching; equality outranks containment.
pub struct SymbolStrategy {
    kind: SymbolKind,
    equal: f64,
    contained: f64,
}

impl SymbolStrategy {
    pub fn classes() -> Self {
        Self {
            kind: SymbolKind::Class,
            equal: 0.9,
            contained: 0.7,
        }
    }

    pub fn functions() -> Self {
        Self {
            kind: SymbolKind::Function,
            equal: 0.85,
            contained: 0.65,
        }
    }

    pub fn exports() -> Self {
        Self {
            kind: SymbolKind::Export,
            equal: 0.8,
            contained: 0.6,
        }
    }

    fn symbols<'a>(&self, file: &'a FileRecord) -> &'a [String] {
        match self.kind {
            SymbolKind::Class => &file.classes,
            SymbolKind::Function => &file.functions,
            SymbolKind::Export => &file.exports,
        }
    }

    fn label(&self) -> &'static str {
        match self.kind {
            SymbolKind::Class => "class",
            SymbolKind::Function => "function",
            SymbolKind::Export => "export",
        }
    }
}

impl MatchStrategy for SymbolStrategy {
    fn match_type(&self) -> MatchType {
        match self.kind {
            SymbolKind::Class => MatchType::Class,
            SymbolKind::Function => MatchType::Function,
            SymbolKind::Export => MatchType::Export,
        }
    }

    fn score(&self, identifier: &str, file: &FileRecord, _options: &ResolveOptions) -> Option<(f64, String)> {
        let mut best: Option<(f64, &str)> = None;
        for symbol in self.symbols(file) {
            if let Some(score) = symbol_score(identifier, symbol, self.equal, self.contained) {
                if best.is_none_or(|(s, _)| score > s) {
                    best = Some((score, symbol));
                }
            }
        }
        best.map(|(score, symbol)| {
            (
                score,
                format!("{} '{symbol}' matches '{identifier}'", self.label()),
            )
        })
    }
}

#[derive(Clone, Copy)]
pub enum FuzzyTarget {
    Path,
    Summary,
}

/// Substring/subsequence similarity against the path or summary, kept only
/// above [`FUZZY_FLOOR`] and scaled below symbol matches.
pub struct FuzzyStrategy {
    target: FuzzyTarget,
}

impl FuzzyStrategy {
    pub fn path() -> Self {
        Self {
            target: FuzzyTarget::Path,
        }
    }

    pub fn summary() -> Self {
        Self {
            target: FuzzyTarget::Summary,
        }
    }
}

impl MatchStrategy for FuzzyStrategy {
    fn match_type(&self) -> MatchType {
        MatchType::Fuzzy
    }

    fn score(&self, identifier: &str, file: &FileRecord, options: &ResolveOptions) -> Option<(f64, String)> {
        if !options.enable_fuzzy_matching {
            return None;
        }
        let (haystack, scale, label) = match self.target {
            FuzzyTarget::Path => (file.relative_path.as_str(), PATH_FUZZY_SCALE, "path"),
            FuzzyTarget::Summary => (file.summary.as_str(), SUMMARY_FUZZY_SCALE, "summary"),
        };
        let raw = fuzzy_score(identifier, haystack);
        if raw <= FUZZY_FLOOR {
            return None;
        }
        Some((
            raw * scale,
            format!("fuzzy {label} match for '{identifier}' ({raw:.2})"),
        ))
    }
}

/// A group of strategies run together.
pub struct Stage {
    pub name: &'static str,
    pub strategies: Vec<Box<dyn MatchStrategy>>,
    /// Return only the single best hit of this stage when it finds anything.
    pub short_circuit: bool,
}

/// Resolves instructions against an index snapshot.
pub struct FileResolver {
    stages: Vec<Stage>,
    cache: ResolutionCache,
}

impl Default for FileResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl FileResolver {
    pub fn new() -> Self {
        Self::with_stages(vec![
            Stage {
                name: "file_name",
                strategies: vec![Box::new(FileNameStrategy)],
                short_circuit: true,
            },
            Stage {
                name: "symbol_and_fuzzy",
                strategies: vec![
                    Box::new(SymbolStrategy::classes()),
                    Box::new(SymbolStrategy::functions()),
                    Box::new(SymbolStrategy::exports()),
                    Box::new(FuzzyStrategy::path()),
                    Box::new(FuzzyStrategy::summary()),
                ],
                short_circuit: false,
            },
        ])
    }

    pub fn with_stages(stages: Vec<Stage>) -> Self {
        Self {
            stages,
            cache: ResolutionCache::default(),
        }
    }

    /// Ranked matches for an instruction, using the resolution cache.
    pub fn resolve(
        &self,
        snapshot: &IndexSnapshot,
        instruction: &str,
        options: &ResolveOptions,
    ) -> Vec<FileMatch> {
        let instruction = truncate_instruction(instruction);
        let key = ResolutionCache::cache_key(snapshot.generation, &instruction, options);
        let (matches, mode) = self
            .cache
            .get_or_compute(&key, || self.resolve_uncached(snapshot, &instruction, options));
        if mode == CacheMode::Hit {
            debug!("Resolution cache hit for '{instruction}'");
        }
        matches
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Ranked matches without consulting the cache.
    pub fn resolve_uncached(
        &self,
        snapshot: &IndexSnapshot,
        instruction: &str,
        options: &ResolveOptions,
    ) -> Vec<FileMatch> {
        let identifiers = extract_identifiers(instruction);
        if identifiers.is_empty() {
            debug!("No identifiers in instruction; nothing to resolve");
            return Vec::new();
        }
        debug!("Resolving with identifiers {identifiers:?}");

        for stage in &self.stages {
            let hits = run_stage(stage, snapshot, &identifiers, options);
            if hits.is_empty() {
                continue;
            }
            if stage.short_circuit {
                let best = hits
                    .into_iter()
                    .reduce(|best, next| if next.score > best.score { next } else { best });
                debug!("Stage '{}' short-circuited resolution", stage.name);
                return best.into_iter().collect();
            }
            return finalize(hits, options);
        }
        Vec::new()
    }
}

fn run_stage(
    stage: &Stage,
    snapshot: &IndexSnapshot,
    identifiers: &[String],
    options: &ResolveOptions,
) -> Vec<FileMatch> {
    let mut hits = Vec::new();
    for strategy in &stage.strategies {
        for file in snapshot.files() {
            for identifier in identifiers {
                if let Some((score, reason)) = strategy.score(identifier, file, options) {
                    hits.push(FileMatch {
                        file: file.clone(),
                        score,
                        match_type: strategy.match_type(),
                        reason,
                    });
                }
            }
        }
    }
    hits
}

/// Dedupe by path keeping the best score, filter, stable sort, truncate.
fn finalize(hits: Vec<FileMatch>, options: &ResolveOptions) -> Vec<FileMatch> {
    let mut order: Vec<String> = Vec::new();
    let mut best: HashMap<String, FileMatch> = HashMap::new();
    for hit in hits {
        let key = hit.file.relative_path.clone();
        match best.get(&key) {
            Some(existing) if existing.score >= hit.score => {}
            Some(_) => {
                best.insert(key, hit);
            }
            None => {
                order.push(key.clone());
                best.insert(key, hit);
            }
        }
    }

    let mut ranked: Vec<FileMatch> = order
        .into_iter()
        .filter_map(|key| best.remove(&key))
        .filter(|m| m.score >= options.min_score)
        .collect();
    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(clamp_limit(options.max_results, MAX_RESOLVE_RESULTS));
    ranked
}
