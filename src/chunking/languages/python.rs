//! Python parser: function, class and method extraction with docstrings.

use crate::chunking::parser::{ChunkParser, DocStyle, LanguageSpec, TreeSitterParser};
use crate::config::ChunkingConfig;
use crate::domain::types::{CodeChunk, Language};

pub struct PythonParser {
    inner: TreeSitterParser,
}

impl PythonParser {
    pub fn new(config: ChunkingConfig) -> Self {
        let spec = LanguageSpec {
            language: Language::Python,
            grammar: tree_sitter_python::LANGUAGE.into(),
            function_kinds: &["function_definition"],
            class_kinds: &["class_definition"],
            name_field: "name",
            params_field: "parameters",
            doc_style: DocStyle::BodyString,
            comment_prefixes: &["#"],
            detect_arrow_functions: false,
            fallback_patterns: &[r"^def ", r"^async def ", r"^class "],
        };
        Self {
            inner: TreeSitterParser::new(spec, config),
        }
    }
}

impl ChunkParser for PythonParser {
    fn language(&self) -> Language {
        Language::Python
    }

    fn parse(&self, path: &str, text: &str) -> Vec<CodeChunk> {
        self.inner.parse(path, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{ChunkKind, ParseQuality};

    fn parse(src: &str) -> Vec<CodeChunk> {
        PythonParser::new(ChunkingConfig::default()).parse("m.py", src)
    }

    #[test]
    fn extracts_functions_and_classes() {
        let src = r#"def top(a, b):
    """Add things."""
    return a + b


class User:
    """A user."""

    def save(self):
        return True

    def load(self, key):
        return key
"#;
        let chunks = parse(src);
        let func = chunks.iter().find(|c| c.name == "top").unwrap();
        assert_eq!(func.kind, ChunkKind::Function);
        assert_eq!(func.docstring.as_deref(), Some("Add things."));
        assert_eq!(func.parameters, vec!["a", "b"]);
        assert_eq!(func.start_line, 1);

        let class = chunks.iter().find(|c| c.kind == ChunkKind::Class).unwrap();
        assert_eq!(class.name, "User");
        assert_eq!(class.quality.method_count, 2);
        // Skeleton, not the full body.
        assert!(class.content.contains("class User"));
        assert!(class.content.contains("def save(self):"));
        assert!(!class.content.contains("return True"));

        let methods: Vec<_> = chunks.iter().filter(|c| c.kind == ChunkKind::Method).collect();
        assert_eq!(methods.len(), 2);
        for m in &methods {
            assert_eq!(m.parent_id.as_deref(), Some(class.id.as_str()));
        }
        assert_eq!(class.child_ids.len(), 2);
    }

    #[test]
    fn decorated_definitions_are_found() {
        let src = "@wraps(f)\ndef wrapped():\n    return 1\n";
        let chunks = parse(src);
        assert!(chunks.iter().any(|c| c.name == "wrapped"));
    }

    #[test]
    fn plain_script_gets_file_root() {
        let chunks = parse("x = 1\ny = x + 1\n");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::File);
        assert_eq!(chunks[0].parse_quality, ParseQuality::Full);
    }

    #[test]
    fn leading_comment_is_captured() {
        let src = "# does the thing\n# carefully\ndef f():\n    pass\n";
        let chunks = parse(src);
        let func = chunks.iter().find(|c| c.name == "f").unwrap();
        assert_eq!(
            func.leading_comment.as_deref(),
            Some("# does the thing\n# carefully")
        );
    }
}
