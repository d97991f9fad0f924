//! JavaScript parser, including arrow functions bound to declarators.

use crate::chunking::parser::{ChunkParser, DocStyle, LanguageSpec, TreeSitterParser};
use crate::config::ChunkingConfig;
use crate::domain::types::{CodeChunk, Language};

pub struct JavaScriptParser {
    inner: TreeSitterParser,
}

impl JavaScriptParser {
    pub fn new(config: ChunkingConfig) -> Self {
        let spec = LanguageSpec {
            language: Language::JavaScript,
            grammar: tree_sitter_javascript::LANGUAGE.into(),
            function_kinds: &[
                "function_declaration",
                "generator_function_declaration",
                "method_definition",
            ],
            class_kinds: &["class_declaration"],
            name_field: "name",
            params_field: "parameters",
            doc_style: DocStyle::LeadingComment,
            comment_prefixes: &["//", "/*", "*"],
            detect_arrow_functions: true,
            fallback_patterns: &[r"^function ", r"^class ", r"^(export )?const \w+ = "],
        };
        Self {
            inner: TreeSitterParser::new(spec, config),
        }
    }
}

impl ChunkParser for JavaScriptParser {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    fn parse(&self, path: &str, text: &str) -> Vec<CodeChunk> {
        self.inner.parse(path, text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ChunkKind;

    fn parse(src: &str) -> Vec<CodeChunk> {
        JavaScriptParser::new(ChunkingConfig::default()).parse("app.js", src)
    }

    #[test]
    fn functions_classes_and_methods() {
        let src = r#"// entry point
function main(argv) {
  return argv.length;
}

class Server {
  start(port) {
    return port;
  }
}
"#;
        let chunks = parse(src);
        let main = chunks.iter().find(|c| c.name == "main").unwrap();
        assert_eq!(main.kind, ChunkKind::Function);
        assert_eq!(main.leading_comment.as_deref(), Some("// entry point"));
        assert_eq!(main.parameters, vec!["argv"]);

        let class = chunks.iter().find(|c| c.kind == ChunkKind::Class).unwrap();
        assert_eq!(class.name, "Server");
        let method = chunks.iter().find(|c| c.kind == ChunkKind::Method).unwrap();
        assert_eq!(method.name, "start");
        assert_eq!(method.parent_id.as_deref(), Some(class.id.as_str()));
    }

    #[test]
    fn arrow_functions_are_chunked() {
        let src = "const handler = (req, res) => {\n  res.end();\n};\n";
        let chunks = parse(src);
        let handler = chunks.iter().find(|c| c.name == "handler").unwrap();
        assert_eq!(handler.kind, ChunkKind::Function);
    }
}
