//! Filesystem scanning helpers for indexing passes.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::IndexOptions;
use crate::errors::CodepatchResult;

/// Closed extension table. Anything else indexes as [`TEXT_LANGUAGE`].
const LANGUAGE_BY_EXTENSION: &[(&str, &str)] = &[
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("mts", "typescript"),
    ("cts", "typescript"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("mjs", "javascript"),
    ("cjs", "javascript"),
    ("py", "python"),
    ("pyi", "python"),
    ("rs", "rust"),
    ("go", "go"),
    ("java", "java"),
    ("kt", "kotlin"),
    ("kts", "kotlin"),
    ("cs", "csharp"),
    ("cpp", "cpp"),
    ("cc", "cpp"),
    ("cxx", "cpp"),
    ("hpp", "cpp"),
    ("hh", "cpp"),
    ("c", "c"),
    ("h", "c"),
    ("php", "php"),
    ("rb", "ruby"),
    ("swift", "swift"),
];

pub const TEXT_LANGUAGE: &str = "text";

const DEFAULT_SENSITIVE_EXCLUDE_PATTERNS: &[&str] = &[
    ".env",
    ".env.*",
    "*.pem",
    "*.key",
    "*.p12",
    "*secret*",
    "*secrets*",
    "*credential*",
    "id_rsa",
    "id_dsa",
];

const IMPLICIT_IGNORED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "dist",
    "build",
    "out",
    ".vscode-test",
];

const CUSTOM_IGNORE_FILENAME: &str = ".codepatchignore";

/// Outcome of one enumeration pass.
#[derive(Clone, Debug, Default)]
pub struct WorkspaceScan {
    pub files: Vec<PathBuf>,
    pub files_seen: usize,
    pub skipped_too_large: usize,
    pub skipped_over_limit: usize,
}

/// Compiled include/exclude rules for one pass.
pub struct PathFilter {
    include: Option<GlobSet>,
    exclude: GlobSet,
    exclude_dirs: GlobSet,
}

fn normalize_pattern(raw: &str) -> Option<(String, bool)> {
    let stripped = raw.trim();
    if stripped.is_empty() || stripped.starts_with('#') {
        return None;
    }
    let directory_only = stripped.ends_with('/');
    let mut pattern = stripped.trim_end_matches('/').to_string();
    if let Some(rest) = pattern.strip_prefix("./") {
        pattern = rest.to_string();
    }
    if pattern.is_empty() {
        return None;
    }
    Some((pattern, directory_only))
}

impl PathFilter {
    pub fn new(options: &IndexOptions) -> CodepatchResult<Self> {
        let mut include = GlobSetBuilder::new();
        let mut include_count = 0usize;
        for raw in &options.include_patterns {
            if let Some((pattern, _)) = normalize_pattern(raw) {
                include.add(Glob::new(&pattern)?);
                include_count += 1;
            }
        }

        let mut exclude = GlobSetBuilder::new();
        let mut exclude_dirs = GlobSetBuilder::new();
        for raw in &options.exclude_patterns {
            if let Some((pattern, directory_only)) = normalize_pattern(raw) {
                exclude_dirs.add(Glob::new(&pattern)?);
                if !directory_only {
                    exclude.add(Glob::new(&pattern)?);
                }
            }
        }
        if options.exclude_sensitive {
            for pattern in DEFAULT_SENSITIVE_EXCLUDE_PATTERNS {
                exclude.add(Glob::new(pattern)?);
            }
        }

        Ok(Self {
            include: if include_count > 0 {
                Some(include.build()?)
            } else {
                None
            },
            exclude: exclude.build()?,
            exclude_dirs: exclude_dirs.build()?,
        })
    }

    fn matches(set: &GlobSet, rel_path: &str) -> bool {
        let name = Path::new(rel_path)
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_default();
        set.is_match(rel_path) || set.is_match(&name)
    }

    pub fn accepts_dir(&self, rel_path: &str) -> bool {
        let name = Path::new(rel_path)
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_default();
        if IMPLICIT_IGNORED_DIRS.contains(&name.as_str()) {
            return false;
        }
        !Self::matches(&self.exclude_dirs, rel_path)
    }

    pub fn accepts_file(&self, rel_path: &str) -> bool {
        if Self::matches(&self.exclude, rel_path) {
            return false;
        }
        match &self.include {
            Some(include) => Self::matches(include, rel_path),
            None => true,
        }
    }
}

/// Forward-slash path of `path` relative to `root`.
pub fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Enumerate indexable files under `root`, gitignore-aware and in a stable
/// (file-name sorted) order. Files over the size cap or past the count cap
/// are skipped and counted, never fatal.
pub fn iter_workspace_files(root: &Path, options: &IndexOptions) -> CodepatchResult<WorkspaceScan> {
    let filter = std::sync::Arc::new(PathFilter::new(options)?);
    let mut scan = WorkspaceScan::default();

    let walk_root = root.to_path_buf();
    let dir_filter = filter.clone();
    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(true)
        .git_ignore(true)
        .git_exclude(true)
        .git_global(false)
        .require_git(false)
        .add_custom_ignore_filename(CUSTOM_IGNORE_FILENAME)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir || entry.depth() == 0 {
                return true;
            }
            dir_filter.accepts_dir(&relative_path(&walk_root, entry.path()))
        });

    for result in builder.build() {
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Failed to read workspace entry: {e}");
                continue;
            }
        };
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        let rel = relative_path(root, entry.path());
        if !filter.accepts_file(&rel) {
            continue;
        }
        scan.files_seen += 1;

        if let Ok(meta) = entry.metadata() {
            if meta.len() > options.max_file_size_bytes {
                debug!(
                    "Skipping large file {rel} ({} bytes > {})",
                    meta.len(),
                    options.max_file_size_bytes
                );
                scan.skipped_too_large += 1;
                continue;
            }
        }
        if scan.files.len() >= options.max_files {
            scan.skipped_over_limit += 1;
            continue;
        }
        scan.files.push(entry.into_path());
    }

    if scan.skipped_over_limit > 0 {
        warn!(
            "File limit {} reached; skipped {} files",
            options.max_files, scan.skipped_over_limit
        );
    }
    Ok(scan)
}

/// Language tag for a path from the closed extension table.
pub fn detect_language(path: &str) -> String {
    let ext = match Path::new(path).extension() {
        Some(e) => e.to_string_lossy().to_lowercase(),
        None => return TEXT_LANGUAGE.to_string(),
    };
    LANGUAGE_BY_EXTENSION
        .iter()
        .find(|(e, _)| *e == ext.as_str())
        .map(|(_, lang)| lang.to_string())
        .unwrap_or_else(|| TEXT_LANGUAGE.to_string())
}

/// Hex SHA-256 of a text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    fn rels(root: &Path, scan: &WorkspaceScan) -> Vec<String> {
        scan.files.iter().map(|p| relative_path(root, p)).collect()
    }

    #[test]
    fn test_detect_language_table() {
        assert_eq!(detect_language("src/main.ts"), "typescript");
        assert_eq!(detect_language("lib/App.JAVA"), "java");
        assert_eq!(detect_language("README.md"), "text");
        assert_eq!(detect_language("Makefile"), "text");
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("").len(), 64);
    }

    #[test]
    fn test_implicit_and_sensitive_excludes() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/main.ts", "x");
        write(dir.path(), "node_modules/lib/index.js", "x");
        write(dir.path(), "keys/server.pem", "x");
        write(dir.path(), "config/db_secret.json", "x");
        let scan = iter_workspace_files(dir.path(), &IndexOptions {
            exclude_sensitive: true,
            ..IndexOptions::default()
        })
        .unwrap();
        assert_eq!(rels(dir.path(), &scan), vec!["src/main.ts"]);
    }

    #[test]
    fn test_include_and_exclude_patterns() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "src/a.ts", "x");
        write(dir.path(), "src/b.py", "x");
        write(dir.path(), "generated/c.ts", "x");
        let options = IndexOptions {
            include_patterns: vec!["**/*.ts".into()],
            exclude_patterns: vec!["generated/".into()],
            ..IndexOptions::default()
        };
        let scan = iter_workspace_files(dir.path(), &options).unwrap();
        assert_eq!(rels(dir.path(), &scan), vec!["src/a.ts"]);
    }

    #[test]
    fn test_size_and_count_caps_skip_not_fail() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.ts", "1");
        write(dir.path(), "b.ts", "2");
        write(dir.path(), "c.ts", "3");
        write(dir.path(), "big.ts", &"x".repeat(64));
        let options = IndexOptions {
            max_files: 2,
            max_file_size_bytes: 16,
            ..IndexOptions::default()
        };
        let scan = iter_workspace_files(dir.path(), &options).unwrap();
        assert_eq!(rels(dir.path(), &scan), vec!["a.ts", "b.ts"]);
        assert_eq!(scan.skipped_too_large, 1);
        assert_eq!(scan.skipped_over_limit, 1);
        assert_eq!(scan.files_seen, 4);
    }

    #[test]
    fn test_custom_ignore_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), ".codepatchignore", "fixtures/\n");
        write(dir.path(), "fixtures/data.ts", "x");
        write(dir.path(), "lib.ts", "x");
        let scan = iter_workspace_files(dir.path(), &IndexOptions::default()).unwrap();
        assert_eq!(rels(dir.path(), &scan), vec!["lib.ts"]);
    }
}
