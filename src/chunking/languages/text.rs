//! Plain-text parser: overlapping line windows.

use crate::chunking::parser::{file_root_chunk, truncate_at_boundary, ChunkParser};
use crate::config::ChunkingConfig;
use crate::domain::types::{ChunkKind, CodeChunk, Language};

pub struct PlainTextParser {
    config: ChunkingConfig,
}

impl PlainTextParser {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }
}

impl ChunkParser for PlainTextParser {
    fn language(&self) -> Language {
        Language::PlainText
    }

    fn parse(&self, path: &str, text: &str) -> Vec<CodeChunk> {
        let lines: Vec<&str> = text.lines().collect();
        let window = self.config.chunk_size.max(1);
        let overlap = self.config.chunk_overlap.min(window.saturating_sub(1));
        let stride = window - overlap;

        if lines.len() <= window {
            return vec![file_root_chunk(
                path,
                text,
                Language::PlainText,
                self.config.max_chunk_size,
            )];
        }

        let mut chunks = Vec::new();
        let mut start = 0usize;
        while start < lines.len() {
            let end = (start + window).min(lines.len());
            let content = lines[start..end].join("\n");
            if !content.trim().is_empty() {
                let mut chunk = CodeChunk::new(
                    path,
                    start as u32 + 1,
                    end as u32,
                    ChunkKind::Paragraph,
                    "",
                    Language::PlainText,
                    truncate_at_boundary(content, self.config.max_chunk_size),
                );
                chunk.breadcrumb = path.to_string();
                chunks.push(chunk);
            }
            if end == lines.len() {
                break;
            }
            start += stride;
        }

        if chunks.is_empty() {
            return vec![file_root_chunk(
                path,
                text,
                Language::PlainText,
                self.config.max_chunk_size,
            )];
        }
        chunks
    }
}
