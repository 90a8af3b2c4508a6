pub mod cache;
pub mod context;
pub mod guards;
pub mod identifiers;
pub mod resolver;
pub mod scoring;
pub mod tokenizer;
