//! Dart parser.
//!
//! No maintained tree-sitter grammar crate exists for Dart, so this parser
//! does pattern-based structural chunking with brace matching: classes at
//! depth zero, methods at depth one, top-level functions at depth zero.

use regex::Regex;
use std::sync::OnceLock;

use crate::chunking::parser::{file_root_chunk, truncate_at_boundary, ChunkParser};
use crate::chunking::quality;
use crate::config::ChunkingConfig;
use crate::domain::types::{ChunkKind, CodeChunk, Language};

fn class_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:abstract\s+)?(?:base\s+|final\s+|sealed\s+|interface\s+)?class\s+([A-Za-z_]\w*)")
            .unwrap()
    })
}

fn func_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s*(?:static\s+)?(?:[A-Za-z_][\w<>,\[\]?\s]*\s+)?([A-Za-z_]\w*)\s*\(([^)]*)\)\s*(?:async\s*\*?|sync\s*\*?)?\s*(?:\{|=>)",
        )
        .unwrap()
    })
}

const NOT_FUNCTION_NAMES: &[&str] = &["if", "for", "while", "switch", "catch", "return", "super"];

pub struct DartParser {
    config: ChunkingConfig,
}

impl DartParser {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    fn doc_comment(lines: &[&str], decl_idx: usize) -> Option<String> {
        let mut collected = Vec::new();
        let mut idx = decl_idx;
        while idx > 0 {
            let line = lines[idx - 1].trim();
            if line.starts_with("///") || line.starts_with("//") {
                collected.push(line.to_string());
                idx -= 1;
            } else {
                break;
            }
        }
        if collected.is_empty() {
            return None;
        }
        collected.reverse();
        Some(collected.join("\n"))
    }

    fn emit(
        &self,
        path: &str,
        lines: &[&str],
        start: usize,
        end: usize,
        kind: ChunkKind,
        name: &str,
        params: &str,
        parent: Option<(&str, &str)>,
        out: &mut Vec<CodeChunk>,
    ) -> String {
        let content = lines[start..=end].join("\n");
        let mut chunk = CodeChunk::new(
            path,
            start as u32 + 1,
            end as u32 + 1,
            kind,
            name,
            Language::Dart,
            truncate_at_boundary(content.clone(), self.config.max_chunk_size),
        );
        chunk.docstring = Self::doc_comment(lines, start);
        chunk.parameters = params
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        chunk.breadcrumb = match parent {
            Some((_, class_name)) => format!("{path} > Class: {class_name} > {name}"),
            None => format!("{path} > {name}"),
        };
        chunk.parent_id = parent.map(|(id, _)| id.to_string());
        let param_count = chunk.parameters.len() as u32;
        chunk.quality = quality::estimate(&content, Language::Dart, kind, param_count, 0);
        let id = chunk.id.clone();
        out.push(chunk);
        id
    }
}

impl ChunkParser for DartParser {
    fn language(&self) -> Language {
        Language::Dart
    }

    fn parse(&self, path: &str, text: &str) -> Vec<CodeChunk> {
        let lines: Vec<&str> = text.lines().collect();
        let depths = line_depths(&lines);
        let mut chunks = Vec::new();
        let mut i = 0;

        while i < lines.len() {
            let depth = depths[i].0;
            if depth == 0 {
                if let Some(cap) = class_re().captures(lines[i]) {
                    let class_name = cap.get(1).map(|m| m.as_str()).unwrap_or_default();
                    let end = block_end(&lines, i);
                    let class_id =
                        CodeChunk::derive_id(path, i as u32 + 1, end as u32 + 1, ChunkKind::Class);

                    // Methods live at depth one inside the class block.
                    let mut methods = Vec::new();
                    let mut j = i + 1;
                    while j < end {
                        if depths[j].0 == 1 {
                            if let Some(mcap) = func_re().captures(lines[j]) {
                                let mname = mcap.get(1).map(|m| m.as_str()).unwrap_or_default();
                                if !NOT_FUNCTION_NAMES.contains(&mname) {
                                    let mend = block_end(&lines, j).min(end);
                                    let params =
                                        mcap.get(2).map(|m| m.as_str()).unwrap_or_default();
                                    self.emit(
                                        path,
                                        &lines,
                                        j,
                                        mend,
                                        ChunkKind::Method,
                                        mname,
                                        params,
                                        Some((&class_id, class_name)),
                                        &mut methods,
                                    );
                                    j = mend + 1;
                                    continue;
                                }
                            }
                        }
                        j += 1;
                    }

                    let mut skeleton = String::new();
                    skeleton.push_str(lines[i].trim_end());
                    skeleton.push('\n');
                    for m in &methods {
                        if let Some(sig) = m.content.lines().next() {
                            skeleton.push_str("  ");
                            skeleton.push_str(sig.trim());
                            skeleton.push('\n');
                        }
                    }
                    let mut class_chunk = CodeChunk::new(
                        path,
                        i as u32 + 1,
                        end as u32 + 1,
                        ChunkKind::Class,
                        class_name,
                        Language::Dart,
                        skeleton,
                    );
                    class_chunk.docstring = Self::doc_comment(&lines, i);
                    class_chunk.breadcrumb = format!("{path} > Class: {class_name}");
                    class_chunk.child_ids = methods.iter().map(|m| m.id.clone()).collect();
                    class_chunk.quality = quality::estimate(
                        &lines[i..=end].join("\n"),
                        Language::Dart,
                        ChunkKind::Class,
                        0,
                        methods.len() as u32,
                    );
                    chunks.push(class_chunk);
                    chunks.extend(methods);
                    i = end + 1;
                    continue;
                }
                if let Some(cap) = func_re().captures(lines[i]) {
                    let name = cap.get(1).map(|m| m.as_str()).unwrap_or_default();
                    if !NOT_FUNCTION_NAMES.contains(&name) {
                        let end = block_end(&lines, i);
                        let params = cap.get(2).map(|m| m.as_str()).unwrap_or_default();
                        self.emit(
                            path,
                            &lines,
                            i,
                            end,
                            ChunkKind::Function,
                            name,
                            params,
                            None,
                            &mut chunks,
                        );
                        i = end + 1;
                        continue;
                    }
                }
            }
            i += 1;
        }

        if chunks.is_empty() {
            return vec![file_root_chunk(
                path,
                text,
                Language::Dart,
                self.config.max_chunk_size,
            )];
        }
        chunks
    }
}

/// `(depth_before, depth_after)` per line, from brace counting.
fn line_depths(lines: &[&str]) -> Vec<(i32, i32)> {
    let mut depths = Vec::with_capacity(lines.len());
    let mut depth = 0i32;
    for line in lines {
        let before = depth;
        for ch in line.chars() {
            match ch {
                '{' => depth += 1,
                '}' => depth -= 1,
                _ => {}
            }
        }
        depths.push((before, depth));
    }
    depths
}

/// Last line of the block starting at `start`: where the brace opened on the
/// declaration line closes. Expression bodies (`=>`) end at the semicolon.
fn block_end(lines: &[&str], start: usize) -> usize {
    if lines[start].contains("=>") && !lines[start].contains('{') {
        for (j, line) in lines.iter().enumerate().skip(start) {
            if line.contains(';') {
                return j;
            }
        }
        return lines.len() - 1;
    }
    let mut depth = 0i32;
    let mut opened = false;
    for (j, line) in lines.iter().enumerate().skip(start) {
        for ch in line.chars() {
            match ch {
                '{' => {
                    depth += 1;
                    opened = true;
                }
                '}' => depth -= 1,
                _ => {}
            }
        }
        if opened && depth <= 0 {
            return j;
        }
    }
    lines.len() - 1
}
