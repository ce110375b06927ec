//! Discovery, per-language extraction, and the analysis pipeline that ties
//! them to storage.

pub mod extractors;
pub mod filesystem;
pub mod imports;
pub mod parser;
pub mod pipeline;
pub mod registry;
