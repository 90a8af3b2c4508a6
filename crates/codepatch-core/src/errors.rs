//! Error types for the codepatch core library.

/// Top-level error enum for the codepatch core library.
///
/// User-facing pipeline failures (nothing resolved, no code in the reply,
/// rejected validation, declined confirmation) are reported through
/// structured outcomes instead; this enum carries faults the caller must see.
#[derive(Debug, thiserror::Error)]
pub enum CodepatchError {
    #[error("Index error: {0}")]
    Index(String),

    #[error("Resolve error: {0}")]
    Resolve(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Patch error: {0}")]
    Patch(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Host error: {0}")]
    Host(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Glob error: {0}")]
    Glob(#[from] globset::Error),
}

impl CodepatchError {
    /// Short category tag, used in log lines and CLI output.
    pub fn category(&self) -> &'static str {
        match self {
            CodepatchError::Index(_) => "index",
            CodepatchError::Resolve(_) => "resolve",
            CodepatchError::Parse(_) => "parse",
            CodepatchError::Patch(_) => "patch",
            CodepatchError::Validation(_) => "validation",
            CodepatchError::Host(_) | CodepatchError::Io(_) => "host",
            CodepatchError::Model(_) => "model",
            CodepatchError::Json(_) => "json",
            CodepatchError::Glob(_) => "config",
        }
    }
}

pub type CodepatchResult<T> = Result<T, CodepatchError>;
