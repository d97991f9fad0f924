//! Language parser trait and the shared tree-sitter walker.
//!
//! Each structured language declares a [`LanguageSpec`] (grammar + node kinds
//! + fallback patterns) and gets chunk extraction, docstring capture, quality
//! estimation and hierarchy building from the shared walker. Parsers are
//! re-entrant: a fresh `tree_sitter::Parser` is created per call and no state
//! survives between calls.

use tree_sitter::Node;

use crate::chunking::fallback::{invalid_root_chunk, FallbackChunker};
use crate::chunking::quality;
use crate::config::ChunkingConfig;
use crate::domain::types::{ChunkKind, CodeChunk, Language, ParseQuality};

/// The capability set every parser provides.
pub trait ChunkParser: Send + Sync {
    fn language(&self) -> Language;

    /// Parse a file into chunks. Never fails: syntactically invalid input
    /// degrades to a single raw-text root chunk.
    fn parse(&self, path: &str, text: &str) -> Vec<CodeChunk>;
}

/// How documentation is attached to declarations in a language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocStyle {
    /// First string expression in the body (Python).
    BodyString,
    /// Contiguous comment lines directly above the declaration.
    LeadingComment,
}

/// Static description of a tree-sitter language for the shared walker.
pub struct LanguageSpec {
    pub language: Language,
    pub grammar: tree_sitter::Language,
    /// Node kinds emitted as functions (methods when nested in a class).
    pub function_kinds: &'static [&'static str],
    /// Node kinds emitted as classes.
    pub class_kinds: &'static [&'static str],
    pub name_field: &'static str,
    pub params_field: &'static str,
    pub doc_style: DocStyle,
    pub comment_prefixes: &'static [&'static str],
    /// Capture arrow/function expressions bound in variable declarators.
    pub detect_arrow_functions: bool,
    /// Line-start patterns for the regex fallback chunker.
    pub fallback_patterns: &'static [&'static str],
}

/// Shared tree-sitter based parser, configured per language.
pub struct TreeSitterParser {
    spec: LanguageSpec,
    config: ChunkingConfig,
}

impl TreeSitterParser {
    pub fn new(spec: LanguageSpec, config: ChunkingConfig) -> Self {
        Self { spec, config }
    }

    fn parse_tree(&self, text: &str) -> Option<tree_sitter::Tree> {
        let mut parser = tree_sitter::Parser::new();
        parser.set_language(&self.spec.grammar).ok()?;
        parser.parse(text, None)
    }

    fn walk(&self, node: Node<'_>, path: &str, text: &str, lines: &[&str], out: &mut Vec<CodeChunk>) {
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        for child in children {
            let kind = child.kind();
            if self.spec.class_kinds.contains(&kind) {
                self.emit_class(child, path, text, lines, out);
            } else if self.spec.function_kinds.contains(&kind) {
                self.emit_callable(child, path, text, lines, ChunkKind::Function, None, out);
            } else if self.spec.detect_arrow_functions && kind == "variable_declarator" {
                if let Some(value) = child.child_by_field_name("value") {
                    if matches!(value.kind(), "arrow_function" | "function_expression") {
                        self.emit_callable(
                            child,
                            path,
                            text,
                            lines,
                            ChunkKind::Function,
                            None,
                            out,
                        );
                        continue;
                    }
                }
                self.walk(child, path, text, lines, out);
            } else {
                // Generic container (decorated definitions, export statements,
                // top-level blocks): keep descending.
                self.walk(child, path, text, lines, out);
            }
        }
    }

    fn emit_class(
        &self,
        node: Node<'_>,
        path: &str,
        text: &str,
        lines: &[&str],
        out: &mut Vec<CodeChunk>,
    ) {
        let name = self.node_name(node, text);
        let start_line = node.start_position().row as u32 + 1;
        let end_line = node.end_position().row as u32 + 1;
        let class_id = CodeChunk::derive_id(path, start_line, end_line, ChunkKind::Class);

        // Collect methods first so the class skeleton can list their
        // signatures and the class metrics know the method count.
        let mut methods = Vec::new();
        self.collect_methods(node, path, text, lines, &class_id, &name, &mut methods);

        let docstring = self.docstring(node, text, lines);
        let skeleton = self.class_skeleton(node, lines, docstring.as_deref(), &methods);

        let mut chunk = CodeChunk::new(
            path,
            start_line,
            end_line,
            ChunkKind::Class,
            name.clone(),
            self.spec.language,
            self.cap(skeleton),
        );
        chunk.docstring = docstring;
        chunk.leading_comment = self.leading_comment(start_line, lines);
        chunk.breadcrumb = format!("{path} > Class: {name}");
        chunk.child_ids = methods.iter().map(|m| m.id.clone()).collect();
        // Quality over the full class body, not the skeleton.
        let body = node_text(node, text);
        chunk.quality = quality::estimate(
            &body,
            self.spec.language,
            ChunkKind::Class,
            0,
            methods.len() as u32,
        );
        out.push(chunk);
        out.extend(methods);
    }

    fn collect_methods(
        &self,
        node: Node<'_>,
        path: &str,
        text: &str,
        lines: &[&str],
        class_id: &str,
        class_name: &str,
        out: &mut Vec<CodeChunk>,
    ) {
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
        for child in children {
            if self.spec.function_kinds.contains(&child.kind()) {
                self.emit_callable(
                    child,
                    path,
                    text,
                    lines,
                    ChunkKind::Method,
                    Some((class_id, class_name)),
                    out,
                );
            } else if !self.spec.class_kinds.contains(&child.kind()) {
                // Bodies and wrapper nodes between the class and its methods.
                self.collect_methods(child, path, text, lines, class_id, class_name, out);
            }
        }
    }

    fn emit_callable(
        &self,
        node: Node<'_>,
        path: &str,
        text: &str,
        lines: &[&str],
        kind: ChunkKind,
        parent: Option<(&str, &str)>,
        out: &mut Vec<CodeChunk>,
    ) {
        let name = self.node_name(node, text);
        let start_line = node.start_position().row as u32 + 1;
        let end_line = node.end_position().row as u32 + 1;
        let parameters = self.parameters(node, text);

        let mut chunk = CodeChunk::new(
            path,
            start_line,
            end_line,
            kind,
            name.clone(),
            self.spec.language,
            self.cap(node_text(node, text)),
        );
        chunk.docstring = self.docstring(node, text, lines);
        chunk.leading_comment = self.leading_comment(start_line, lines);
        chunk.parameters = parameters;
        chunk.breadcrumb = match parent {
            Some((_, class_name)) => format!("{path} > Class: {class_name} > {name}"),
            None => format!("{path} > {name}"),
        };
        chunk.parent_id = parent.map(|(id, _)| id.to_string());
        let param_count = chunk.parameters.len() as u32;
        chunk.quality =
            quality::estimate(&chunk.content, self.spec.language, kind, param_count, 0);
        out.push(chunk);
    }

    fn node_name(&self, node: Node<'_>, text: &str) -> String {
        node.child_by_field_name(self.spec.name_field)
            .map(|n| node_text(n, text))
            .unwrap_or_default()
    }

    fn parameters(&self, node: Node<'_>, text: &str) -> Vec<String> {
        let Some(params) = node.child_by_field_name(self.spec.params_field) else {
            return Vec::new();
        };
        let raw = node_text(params, text);
        let inner = raw
            .trim()
            .trim_start_matches('(')
            .trim_end_matches(')')
            .trim();
        if inner.is_empty() {
            return Vec::new();
        }
        split_top_level(inner)
            .into_iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect()
    }

    fn docstring(&self, node: Node<'_>, text: &str, lines: &[&str]) -> Option<String> {
        match self.spec.doc_style {
            DocStyle::BodyString => {
                let body = node.child_by_field_name("body")?;
                let mut cursor = body.walk();
                let first = body.named_children(&mut cursor).next()?;
                if first.kind() != "expression_statement" {
                    return None;
                }
                let mut inner = first.walk();
                let string_node = first
                    .named_children(&mut inner)
                    .find(|n| n.kind() == "string")?;
                Some(strip_string_quotes(&node_text(string_node, text)))
            }
            DocStyle::LeadingComment => {
                self.leading_comment(node.start_position().row as u32 + 1, lines)
            }
        }
    }

    /// Contiguous comment lines immediately above `start_line` (1-based).
    fn leading_comment(&self, start_line: u32, lines: &[&str]) -> Option<String> {
        let mut collected = Vec::new();
        let mut idx = start_line as usize;
        while idx >= 2 {
            let line = lines[idx - 2].trim();
            let is_comment = self
                .spec
                .comment_prefixes
                .iter()
                .any(|p| line.starts_with(p));
            if !is_comment {
                break;
            }
            collected.push(line.to_string());
            idx -= 1;
        }
        if collected.is_empty() {
            return None;
        }
        collected.reverse();
        Some(collected.join("\n"))
    }

    /// Signature + docstring + method signatures: the class summary indexed
    /// in place of the full body.
    fn class_skeleton(
        &self,
        node: Node<'_>,
        lines: &[&str],
        docstring: Option<&str>,
        methods: &[CodeChunk],
    ) -> String {
        let header_line = node.start_position().row;
        let mut skeleton = String::new();
        if let Some(header) = lines.get(header_line) {
            skeleton.push_str(header.trim_end());
            skeleton.push('\n');
        }
        if let Some(doc) = docstring {
            for line in doc.lines() {
                skeleton.push_str("    ");
                skeleton.push_str(line);
                skeleton.push('\n');
            }
        }
        for method in methods {
            if let Some(signature) = method.content.lines().next() {
                skeleton.push_str("    ");
                skeleton.push_str(signature.trim());
                skeleton.push('\n');
            }
        }
        skeleton
    }

    fn cap(&self, content: String) -> String {
        truncate_at_boundary(content, self.config.max_chunk_size)
    }
}

impl ChunkParser for TreeSitterParser {
    fn language(&self) -> Language {
        self.spec.language
    }

    fn parse(&self, path: &str, text: &str) -> Vec<CodeChunk> {
        let lines: Vec<&str> = text.lines().collect();

        let mut parse_failed = false;
        if let Some(tree) = self.parse_tree(text) {
            let root = tree.root_node();
            let mut chunks = Vec::new();
            self.walk(root, path, text, &lines, &mut chunks);
            if !chunks.is_empty() {
                return chunks;
            }
            if !root.has_error() {
                // Valid file with no structural declarations: a single
                // file-level root chunk.
                return vec![file_root_chunk(
                    path,
                    text,
                    self.spec.language,
                    self.config.max_chunk_size,
                )];
            }
            parse_failed = true;
        }

        if parse_failed {
            tracing::debug!(path, "structural parse failed, trying pattern fallback");
        }
        let fallback = FallbackChunker::new(
            self.spec.language,
            self.spec.fallback_patterns,
            self.config.max_chunk_size,
        );
        let chunks = fallback.chunk(path, text);
        if !chunks.is_empty() {
            return chunks;
        }
        vec![invalid_root_chunk(path, text, self.spec.language)]
    }
}

/// Root chunk covering the whole file; kind `file`, no parent.
pub fn file_root_chunk(
    path: &str,
    text: &str,
    language: Language,
    max_chunk_size: usize,
) -> CodeChunk {
    let end_line = text.lines().count().max(1) as u32;
    let mut chunk = CodeChunk::new(
        path,
        1,
        end_line,
        ChunkKind::File,
        file_stem(path),
        language,
        truncate_at_boundary(text.to_string(), max_chunk_size),
    );
    chunk.parse_quality = ParseQuality::Full;
    chunk.breadcrumb = path.to_string();
    chunk
}

pub(crate) fn file_stem(path: &str) -> String {
    std::path::Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub(crate) fn node_text(node: Node<'_>, text: &str) -> String {
    text.get(node.byte_range()).unwrap_or_default().to_string()
}

/// Split on commas that are not nested in brackets, for parameter lists.
fn split_top_level(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, ch) in input.char_indices() {
        match ch {
            '(' | '[' | '{' | '<' => depth += 1,
            ')' | ']' | '}' | '>' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

fn strip_string_quotes(raw: &str) -> String {
    let trimmed = raw.trim();
    for quote in ["\"\"\"", "'''", "\"", "'"] {
        if trimmed.len() >= quote.len() * 2
            && trimmed.starts_with(quote)
            && trimmed.ends_with(quote)
        {
            return trimmed[quote.len()..trimmed.len() - quote.len()]
                .trim()
                .to_string();
        }
    }
    trimmed.to_string()
}

pub(crate) fn truncate_at_boundary(mut content: String, max_bytes: usize) -> String {
    if content.len() <= max_bytes {
        return content;
    }
    let mut cut = max_bytes;
    while cut > 0 && !content.is_char_boundary(cut) {
        cut -= 1;
    }
    content.truncate(cut);
    content
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_top_level_respects_nesting() {
        assert_eq!(split_top_level("a, b"), vec!["a", " b"]);
        assert_eq!(
            split_top_level("a: Dict[str, int], b"),
            vec!["a: Dict[str, int]", " b"]
        );
    }

    #[test]
    fn string_quotes_are_stripped() {
        assert_eq!(strip_string_quotes("\"\"\"doc\"\"\""), "doc");
        assert_eq!(strip_string_quotes("'single'"), "single");
        assert_eq!(strip_string_quotes("bare"), "bare");
    }

    #[test]
    fn truncation_lands_on_char_boundary() {
        let text = "héllo wörld".repeat(10);
        let capped = truncate_at_boundary(text, 7);
        assert!(capped.len() <= 7);
        assert!(capped.is_char_boundary(capped.len()));
    }
}
