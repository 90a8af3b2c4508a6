pub mod filesystem;
pub mod pipeline;
pub mod symbols;
