//! Parser registry: selects a parser by language and applies the rules that
//! hold for every parser (empty files, hierarchy touch-ups).

use std::collections::HashMap;
use std::sync::Arc;

use crate::chunking::languages::{
    DartParser, HtmlParser, JavaScriptParser, MarkdownParser, PhpParser, PlainTextParser,
    PythonParser, RubyParser, TypeScriptParser,
};
use crate::chunking::parser::ChunkParser;
use crate::config::ChunkingConfig;
use crate::domain::types::{ChunkKind, CodeChunk, Language};

pub struct ParserRegistry {
    parsers: HashMap<Language, Arc<dyn ChunkParser>>,
    fallback: Arc<dyn ChunkParser>,
}

impl ParserRegistry {
    pub fn new(config: &ChunkingConfig) -> Self {
        let mut parsers: HashMap<Language, Arc<dyn ChunkParser>> = HashMap::new();
        let c = config.clone();
        parsers.insert(Language::Python, Arc::new(PythonParser::new(c.clone())));
        parsers.insert(
            Language::JavaScript,
            Arc::new(JavaScriptParser::new(c.clone())),
        );
        parsers.insert(
            Language::TypeScript,
            Arc::new(TypeScriptParser::new(c.clone())),
        );
        parsers.insert(Language::Dart, Arc::new(DartParser::new(c.clone())));
        parsers.insert(Language::Php, Arc::new(PhpParser::new(c.clone())));
        parsers.insert(Language::Ruby, Arc::new(RubyParser::new(c.clone())));
        parsers.insert(Language::Html, Arc::new(HtmlParser::new(c.clone())));
        parsers.insert(Language::Markdown, Arc::new(MarkdownParser::new(c.clone())));
        parsers.insert(Language::PlainText, Arc::new(PlainTextParser::new(c.clone())));
        Self {
            parsers,
            fallback: Arc::new(PlainTextParser::new(c)),
        }
    }

    pub fn supported_languages(&self) -> Vec<Language> {
        let mut languages: Vec<Language> = self.parsers.keys().copied().collect();
        languages.sort();
        languages
    }

    /// Parse a file into chunks.
    ///
    /// Unknown languages chunk as plain text. An empty file yields exactly one
    /// file-level chunk with empty content.
    pub fn parse(&self, path: &str, text: &str, language: Language) -> Vec<CodeChunk> {
        if text.trim().is_empty() {
            let mut root = CodeChunk::new(
                path,
                1,
                1,
                ChunkKind::File,
                crate::chunking::parser::file_stem(path),
                language,
                "",
            );
            root.breadcrumb = path.to_string();
            return vec![root];
        }
        let parser = self.parsers.get(&language).unwrap_or(&self.fallback);
        parser.parse(path, text)
    }
}
