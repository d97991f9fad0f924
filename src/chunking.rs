//! Structural chunking: per-language parsers, quality capture, fallback.

pub mod fallback;
pub mod languages;
pub mod parser;
pub mod quality;
pub mod registry;

pub use parser::{ChunkParser, DocStyle, LanguageSpec, TreeSitterParser};
pub use registry::ParserRegistry;
