//! Collaborator seams: the editor host and the language model.
//!
//! The pipeline never touches the filesystem or the network directly; it goes
//! through these traits so an editor integration can supply live document
//! state. `FsWorkspace` is the plain local-disk host used by the CLI and tests.

use std::path::{Path, PathBuf};

use crate::config::IndexOptions;
use crate::errors::{CodepatchError, CodepatchResult};
use crate::indexer::filesystem::{iter_workspace_files, WorkspaceScan};
use crate::models::TextRange;

/// Capabilities the core consumes from the editor host.
pub trait WorkspaceHost: Send + Sync {
    /// Workspace root, or `None` when no folder is open.
    fn root(&self) -> Option<PathBuf>;

    /// Enumerate candidate files under the root honoring include/exclude patterns.
    fn find_files(&self, options: &IndexOptions) -> CodepatchResult<WorkspaceScan>;

    /// Current text of a file (the open document if the host has one).
    fn read_file(&self, path: &Path) -> CodepatchResult<String>;

    fn write_file(&self, path: &Path, text: &str) -> CodepatchResult<()>;

    fn file_exists(&self, path: &Path) -> bool;

    /// Last modification time in Unix milliseconds, when the host tracks one.
    fn modified_ms(&self, _path: &Path) -> Option<u64> {
        None
    }

    fn create_file(&self, path: &Path, text: &str) -> CodepatchResult<()>;

    fn delete_file(&self, path: &Path) -> CodepatchResult<()>;

    /// Yes/no confirmation before a mutation.
    fn confirm(&self, message: &str) -> bool;

    /// Replace a byte range of a document and persist it.
    fn replace_range(&self, path: &Path, range: TextRange, replacement: &str) -> CodepatchResult<()> {
        let current = self.read_file(path)?;
        if range.start > range.end
            || range.end > current.len()
            || !current.is_char_boundary(range.start)
            || !current.is_char_boundary(range.end)
        {
            return Err(CodepatchError::Patch(format!(
                "range {}..{} out of bounds for {} ({} bytes)",
                range.start,
                range.end,
                path.display(),
                current.len()
            )));
        }
        let mut next = String::with_capacity(current.len() + replacement.len());
        next.push_str(&current[..range.start]);
        next.push_str(replacement);
        next.push_str(&current[range.end..]);
        self.write_file(path, &next)
    }

    /// Resolve a workspace-relative path against the root.
    fn absolute(&self, relative: &str) -> Option<PathBuf> {
        let candidate = Path::new(relative);
        if candidate.is_absolute() {
            return Some(candidate.to_path_buf());
        }
        self.root()
            .map(|root| root.join(relative.trim_start_matches("./")))
    }
}

/// The language-model collaborator: two prompts in, one reply out.
pub trait LanguageModel {
    fn complete(&self, system_prompt: &str, user_prompt: &str) -> CodepatchResult<String>;
}

type Confirmer = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Local-disk workspace host.
pub struct FsWorkspace {
    root: Option<PathBuf>,
    confirmer: Confirmer,
}

impl FsWorkspace {
    /// Host rooted at `root`; confirmations are auto-accepted.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: Some(root.as_ref().to_path_buf()),
            confirmer: Box::new(|_| true),
        }
    }

    /// Host with no open folder.
    pub fn without_root() -> Self {
        Self {
            root: None,
            confirmer: Box::new(|_| true),
        }
    }

    pub fn with_confirmer(mut self, confirmer: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        self.confirmer = Box::new(confirmer);
        self
    }
}

impl WorkspaceHost for FsWorkspace {
    fn root(&self) -> Option<PathBuf> {
        self.root.clone()
    }

    fn find_files(&self, options: &IndexOptions) -> CodepatchResult<WorkspaceScan> {
        match &self.root {
            Some(root) => iter_workspace_files(root, options),
            None => Err(CodepatchError::Host("no workspace folder is open".to_string())),
        }
    }

    fn read_file(&self, path: &Path) -> CodepatchResult<String> {
        Ok(std::fs::read_to_string(path)?)
    }

    fn write_file(&self, path: &Path, text: &str) -> CodepatchResult<()> {
        Ok(std::fs::write(path, text)?)
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn modified_ms(&self, path: &Path) -> Option<u64> {
        std::fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
    }

    fn create_file(&self, path: &Path, text: &str) -> CodepatchResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(std::fs::write(path, text)?)
    }

    fn delete_file(&self, path: &Path) -> CodepatchResult<()> {
        Ok(std::fs::remove_file(path)?)
    }

    fn confirm(&self, message: &str) -> bool {
        (self.confirmer)(message)
    }
}
