//! Codepatch core library: turns a natural-language edit instruction into
//! validated edits on workspace files.
//!
//! The crate is organised as the pipeline runs: `indexer` builds a lightweight
//! per-file symbol index, `query` picks the relevant files and composes the
//! model prompt, `response` interprets the model's reply, and `patch` applies
//! the resulting edits. `pipeline::EditPipeline` wires them together behind
//! the [`host::WorkspaceHost`] and [`host::LanguageModel`] seams.

pub mod config;
pub mod errors;
pub mod host;
pub mod indexer;
pub mod models;
pub mod patch;
pub mod pipeline;
pub mod query;
pub mod response;

pub use config::CodepatchConfig;
pub use errors::{CodepatchError, CodepatchResult};
pub use host::{FsWorkspace, LanguageModel, WorkspaceHost};
pub use indexer::pipeline::ProjectIndex;
pub use patch::applier::{ApplyOutcome, PatchApplier};
pub use pipeline::{EditPipeline, PipelineOutcome, PipelineStage};
pub use query::context::ContextComposer;
pub use query::resolver::FileResolver;
pub use response::parser::ResponseParser;
