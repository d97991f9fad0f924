//! Markdown parser: one chunk per heading section.
//!
//! Sections below the minimum character threshold are merged into the
//! preceding section so search is not flooded with heading stubs.

use regex::Regex;
use std::sync::OnceLock;

use crate::chunking::parser::{file_root_chunk, truncate_at_boundary, ChunkParser};
use crate::config::ChunkingConfig;
use crate::domain::types::{ChunkKind, CodeChunk, Language};

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*$").unwrap())
}

pub struct MarkdownParser {
    config: ChunkingConfig,
}

impl MarkdownParser {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }
}

struct Section {
    title: String,
    start: usize,
    end: usize,
    chars: usize,
}

impl ChunkParser for MarkdownParser {
    fn language(&self) -> Language {
        Language::Markdown
    }

    fn parse(&self, path: &str, text: &str) -> Vec<CodeChunk> {
        let lines: Vec<&str> = text.lines().collect();

        let mut boundaries = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            if let Some(cap) = heading_re().captures(line) {
                boundaries.push((i, cap[2].to_string()));
            }
        }
        if boundaries.is_empty() {
            return vec![file_root_chunk(
                path,
                text,
                Language::Markdown,
                self.config.max_chunk_size,
            )];
        }

        let mut sections: Vec<Section> = Vec::new();
        // Preamble before the first heading becomes its own section.
        if boundaries[0].0 > 0 {
            let chars: usize = lines[..boundaries[0].0].iter().map(|l| l.len()).sum();
            if chars > 0 {
                sections.push(Section {
                    title: crate::chunking::parser::file_stem(path),
                    start: 0,
                    end: boundaries[0].0 - 1,
                    chars,
                });
            }
        }
        for (n, (start, title)) in boundaries.iter().enumerate() {
            let end = boundaries
                .get(n + 1)
                .map(|(next, _)| next - 1)
                .unwrap_or(lines.len().saturating_sub(1));
            let chars = lines[*start..=end].iter().map(|l| l.len()).sum();
            sections.push(Section {
                title: title.clone(),
                start: *start,
                end,
                chars,
            });
        }

        // Merge undersized sections into their predecessor.
        let min_chars = self.config.min_section_chars;
        let mut merged: Vec<Section> = Vec::new();
        for section in sections {
            match merged.last_mut() {
                Some(prev) if section.chars < min_chars => {
                    prev.end = section.end;
                    prev.chars += section.chars;
                }
                _ => merged.push(section),
            }
        }

        merged
            .into_iter()
            .map(|s| {
                let content = lines[s.start..=s.end].join("\n");
                let mut chunk = CodeChunk::new(
                    path,
                    s.start as u32 + 1,
                    s.end as u32 + 1,
                    ChunkKind::Section,
                    s.title,
                    Language::Markdown,
                    truncate_at_boundary(content, self.config.max_chunk_size),
                );
                chunk.breadcrumb = format!("{path} > {}", chunk.name);
                chunk
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Vec<CodeChunk> {
        MarkdownParser::new(ChunkingConfig::default()).parse("README.md", src)
    }

    #[test]
    fn one_chunk_per_heading_section() {
        let intro = "This paragraph is long enough to stand on its own as a section body because it easily exceeds the merge threshold for small sections.";
        let src = format!("# Install\n\n{intro}\n\n# Usage\n\n{intro}\n");
        let chunks = parse(&src);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].name, "Install");
        assert_eq!(chunks[1].name, "Usage");
        assert!(chunks.iter().all(|c| c.kind == ChunkKind::Section));
    }

    #[test]
    fn tiny_sections_merge_into_neighbour() {
        let body = "x".repeat(200);
        let src = format!("# Big\n\n{body}\n\n# Stub\n\nok\n");
        let chunks = parse(&src);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].name, "Big");
        assert!(chunks[0].content.contains("# Stub"));
    }

    #[test]
    fn headingless_file_is_one_root_chunk() {
        let chunks = parse("just some prose\nwith two lines\n");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::File);
    }
}
