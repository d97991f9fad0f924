//! Ruby parser: methods, classes and modules.

use crate::chunking::parser::{ChunkParser, DocStyle, LanguageSpec, TreeSitterParser};
use crate::config::ChunkingConfig;
use crate::domain::types::{CodeChunk, Language};

pub struct RubyParser {
    inner: TreeSitterParser,
}

impl RubyParser {
    pub fn new(config: ChunkingConfig) -> Self {
        let spec = LanguageSpec {
            language: Language::Ruby,
            grammar: tree_sitter_ruby::LANGUAGE.into(),
            function_kinds: &["method", "singleton_method"],
            class_kinds: &["class", "module"],
            name_field: "name",
            params_field: "parameters",
            doc_style: DocStyle::LeadingComment,
            comment_prefixes: &["#"],
            detect_arrow_functions: false,
            fallback_patterns: &[r"^\s*def ", r"^class ", r"^module "],
        };
        Self {
            inner: TreeSitterParser::new(spec, config),
        }
    }
}

impl ChunkParser for RubyParser {
    fn language(&self) -> Language {
        Language::Ruby
    }

    fn parse(&self, path: &str, text: &str) -> Vec<CodeChunk> {
        self.inner.parse(path, text)
    }
}
