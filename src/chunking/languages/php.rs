//! PHP parser: functions, methods, classes, interfaces and traits.

use crate::chunking::parser::{ChunkParser, DocStyle, LanguageSpec, TreeSitterParser};
use crate::config::ChunkingConfig;
use crate::domain::types::{CodeChunk, Language};

pub struct PhpParser {
    inner: TreeSitterParser,
}

impl PhpParser {
    pub fn new(config: ChunkingConfig) -> Self {
        let spec = LanguageSpec {
            language: Language::Php,
            grammar: tree_sitter_php::LANGUAGE_PHP.into(),
            function_kinds: &["function_definition", "method_declaration"],
            class_kinds: &[
                "class_declaration",
                "interface_declaration",
                "trait_declaration",
            ],
            name_field: "name",
            params_field: "parameters",
            doc_style: DocStyle::LeadingComment,
            comment_prefixes: &["//", "#", "/*", "*"],
            detect_arrow_functions: false,
            fallback_patterns: &[r"^\s*function ", r"^class ", r"^interface ", r"^trait "],
        };
        Self {
            inner: TreeSitterParser::new(spec, config),
        }
    }
}

impl ChunkParser for PhpParser {
    fn language(&self) -> Language {
        Language::Php
    }

    fn parse(&self, path: &str, text: &str) -> Vec<CodeChunk> {
        self.inner.parse(path, text)
    }
}
