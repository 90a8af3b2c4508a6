//! Project index service with Rayon-based parallel extraction.
//!
//! The index is an immutable [`IndexSnapshot`] behind an `Arc`. Builds produce
//! a fresh snapshot and swap it in whole, so readers always see either the old
//! or the new map, never a half-written one. At most one build runs at a time;
//! a second caller gets the current snapshot back immediately.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use parking_lot::RwLock;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::IndexOptions;
use crate::errors::{CodepatchError, CodepatchResult};
use crate::host::WorkspaceHost;
use crate::indexer::filesystem::{content_hash, detect_language, relative_path};
use crate::indexer::symbols::{extract_symbols, summarize};
use crate::models::{file_name_of, now_millis, FileRecord, IndexStats};

/// One immutable view of the project.
#[derive(Clone, Debug, Default)]
pub struct IndexSnapshot {
    /// Basename (with extension) -> record. Later files with the same basename win.
    pub records: IndexMap<String, FileRecord>,
    pub generation: u64,
    pub stats: IndexStats,
}

impl IndexSnapshot {
    pub fn get(&self, key: &str) -> Option<&FileRecord> {
        self.records.get(key)
    }

    /// Records in enumeration order.
    pub fn files(&self) -> impl Iterator<Item = &FileRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look a record up by relative path, falling back to its basename key.
    pub fn find_by_path(&self, path: &str) -> Option<&FileRecord> {
        let wanted = path.trim_start_matches("./").replace('\\', "/");
        self.records
            .values()
            .find(|r| r.relative_path == wanted)
            .or_else(|| self.records.get(&file_name_of(&wanted)))
    }

    fn recount(&mut self) {
        self.stats.file_count = self.records.len();
        self.stats.function_count = self.records.values().map(|r| r.functions.len()).sum();
        self.stats.class_count = self.records.values().map(|r| r.classes.len()).sum();
        self.stats.export_count = self.records.values().map(|r| r.exports.len()).sum();
        self.stats.generation = self.generation;
    }
}

struct BuildGuard<'a>(&'a AtomicBool);

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Process-wide (per workspace session) project index.
pub struct ProjectIndex {
    snapshot: RwLock<Arc<IndexSnapshot>>,
    building: AtomicBool,
    /// Last generation handed out; survives `clear`.
    generation: AtomicU64,
}

impl Default for ProjectIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a record for one file. Errors are per-file and never abort a build.
pub fn build_record(host: &dyn WorkspaceHost, root: &Path, path: &Path) -> CodepatchResult<FileRecord> {
    let source = host.read_file(path)?;
    let rel = relative_path(root, path);
    let language = detect_language(&rel);
    let symbols = extract_symbols(&source, &language);
    let line_count = source.lines().count();
    let summary = summarize(&language, &symbols, line_count);
    let last_modified_ms = host.modified_ms(path).unwrap_or(0);

    Ok(FileRecord {
        path: path.to_path_buf(),
        relative_path: rel,
        functions: symbols.functions,
        classes: symbols.classes,
        exports: symbols.exports,
        imports: symbols.imports,
        line_count,
        language,
        last_modified_ms,
        summary,
        content_hash: content_hash(&source),
        size_bytes: source.len() as u64,
    })
}

fn parallel_extract(
    host: &dyn WorkspaceHost,
    root: &Path,
    files: &[PathBuf],
    workers: usize,
) -> Vec<CodepatchResult<FileRecord>> {
    if files.is_empty() {
        return vec![];
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build();

    match pool {
        Ok(pool) => pool.install(|| {
            files
                .par_iter()
                .map(|path| build_record(host, root, path))
                .collect()
        }),
        Err(_) => files
            .iter()
            .map(|path| build_record(host, root, path))
            .collect(),
    }
}

impl ProjectIndex {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(IndexSnapshot::default())),
            building: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    /// Current snapshot; cheap to call while a build runs.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.snapshot.read().clone()
    }

    pub fn is_building(&self) -> bool {
        self.building.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> IndexStats {
        let mut stats = self.snapshot().stats.clone();
        stats.in_progress = self.is_building();
        stats
    }

    fn swap(&self, next: IndexSnapshot) -> Arc<IndexSnapshot> {
        let next = Arc::new(next);
        *self.snapshot.write() = next.clone();
        next
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Build the index if it has never been built.
    pub fn ensure_built(&self, host: &dyn WorkspaceHost, options: &IndexOptions) -> Arc<IndexSnapshot> {
        let current = self.snapshot();
        if current.generation > 0 {
            return current;
        }
        self.build(host, options)
    }

    /// Full scan. Returns the previous snapshot untouched when a build is
    /// already in flight, and an empty index when no workspace is open.
    pub fn build(&self, host: &dyn WorkspaceHost, options: &IndexOptions) -> Arc<IndexSnapshot> {
        if self
            .building
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Index build already in progress; returning previous snapshot");
            return self.snapshot();
        }
        let _guard = BuildGuard(&self.building);
        let started = Instant::now();
        let generation = self.next_generation();

        let Some(root) = host.root() else {
            warn!("No workspace folder open; index is empty");
            let mut empty = IndexSnapshot {
                generation,
                ..IndexSnapshot::default()
            };
            empty.recount();
            return self.swap(empty);
        };

        let scan = match host.find_files(options) {
            Ok(scan) => scan,
            Err(e) => {
                warn!("Failed to enumerate workspace files: {e}");
                let mut empty = IndexSnapshot {
                    generation,
                    ..IndexSnapshot::default()
                };
                empty.recount();
                return self.swap(empty);
            }
        };

        let results = parallel_extract(host, &root, &scan.files, options.workers);

        let mut next = IndexSnapshot {
            generation,
            ..IndexSnapshot::default()
        };
        for (path, result) in scan.files.iter().zip(results) {
            match result {
                Ok(record) => {
                    let key = record.file_name();
                    if let Some(previous) = next.records.get(&key) {
                        debug!(
                            "Basename collision on {key}: {} replaces {}",
                            record.relative_path, previous.relative_path
                        );
                    }
                    next.records.insert(key, record);
                }
                Err(e) => {
                    debug!("Skipping {}: {e}", path.display());
                    next.stats.skipped_errors += 1;
                }
            }
        }

        next.stats.files_seen = scan.files_seen;
        next.stats.skipped_too_large = scan.skipped_too_large;
        next.stats.skipped_over_limit = scan.skipped_over_limit;
        next.stats.last_build_ms = Some(now_millis());
        next.stats.build_duration_ms = started.elapsed().as_millis() as u64;
        next.recount();

        info!(
            "Indexed {} files ({} skipped) in {} ms",
            next.stats.file_count,
            next.stats.skipped_errors + next.stats.skipped_too_large + next.stats.skipped_over_limit,
            next.stats.build_duration_ms
        );
        self.swap(next)
    }

    /// Re-index a single file, replacing its record wholesale.
    pub fn refresh_file(&self, host: &dyn WorkspaceHost, path: &Path) -> CodepatchResult<FileRecord> {
        let root = host
            .root()
            .ok_or_else(|| CodepatchError::Index("no workspace folder is open".to_string()))?;
        let record = build_record(host, &root, path)?;
        let mut next = (*self.snapshot()).clone();
        next.generation = self.next_generation();
        next.records.insert(record.file_name(), record.clone());
        next.recount();
        self.swap(next);
        Ok(record)
    }

    /// Drop the record whose relative path matches.
    pub fn remove_file(&self, relative: &str) -> bool {
        let mut next = (*self.snapshot()).clone();
        let key = next
            .records
            .iter()
            .find(|(_, r)| r.relative_path == relative)
            .map(|(k, _)| k.clone());
        let Some(key) = key else {
            return false;
        };
        next.records.shift_remove(&key);
        next.generation = self.next_generation();
        next.recount();
        self.swap(next);
        true
    }

    /// Discard everything; the next `ensure_built` rebuilds under a
    /// generation never used before.
    pub fn clear(&self) {
        self.swap(IndexSnapshot::default());
    }
}
