//! Syntactic extraction — tree-sitter definitions, imports, and call sites

pub mod extractor;
pub mod language;
pub mod parser_pool;
pub mod postprocess;
pub mod schema;

#[cfg(test)]
mod tests;

pub use extractor::{
    CallSite, DefKind, Definition, ExtractError, ExtractionTier, Extractor, FileExtraction, Import,
};
pub use language::Lang;
pub use parser_pool::{ParseRequest, ParserPool};
