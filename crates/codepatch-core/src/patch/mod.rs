pub mod applier;
pub mod batch;
pub mod function;
pub mod history;
pub mod plan;
pub mod range;
pub mod validate;
