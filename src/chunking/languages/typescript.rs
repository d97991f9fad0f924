//! TypeScript parser; uses the TSX grammar so both dialects chunk.

use crate::chunking::parser::{ChunkParser, DocStyle, LanguageSpec, TreeSitterParser};
use crate::config::ChunkingConfig;
use crate::domain::types::{CodeChunk, Language};

pub struct TypeScriptParser {
    inner: TreeSitterParser,
}

impl TypeScriptParser {
    pub fn new(config: ChunkingConfig) -> Self {
        let spec = LanguageSpec {
            language: Language::TypeScript,
            grammar: tree_sitter_typescript::LANGUAGE_TSX.into(),
            function_kinds: &[
                "function_declaration",
                "generator_function_declaration",
                "method_definition",
            ],
            class_kinds: &["class_declaration", "interface_declaration"],
            name_field: "name",
            params_field: "parameters",
            doc_style: DocStyle::LeadingComment,
            comment_prefixes: &["//", "/*", "*"],
            detect_arrow_functions: true,
            fallback_patterns: &[
                r"^function ",
                r"^class ",
                r"^interface ",
                r"^(export )?const \w+ = ",
            ],
        };
        Self {
            inner: TreeSitterParser::new(spec, config),
        }
    }
}

impl ChunkParser for TypeScriptParser {
    fn language(&self) -> Language {
        Language::TypeScript
    }

    fn parse(&self, path: &str, text: &str) -> Vec<CodeChunk> {
        self.inner.parse(path, text)
    }
}
