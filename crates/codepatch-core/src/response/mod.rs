pub mod blocks;
pub mod classify;
pub mod explanation;
pub mod multifile;
pub mod parser;
