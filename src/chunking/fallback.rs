//! Pattern-based fallback chunking.
//!
//! When a structural parser rejects a file, the fallback splits on top-level
//! declaration patterns so the file still participates in search. Chunks
//! carry `parse_quality = fallback` to degrade their ranking signal.

use regex::Regex;

use crate::chunking::parser::{file_stem, truncate_at_boundary};
use crate::chunking::quality;
use crate::domain::types::{ChunkKind, CodeChunk, Language, ParseQuality};

pub struct FallbackChunker {
    language: Language,
    patterns: Vec<Regex>,
    max_chunk_size: usize,
}

impl FallbackChunker {
    pub fn new(language: Language, patterns: &[&str], max_chunk_size: usize) -> Self {
        let patterns = patterns
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();
        Self {
            language,
            patterns,
            max_chunk_size,
        }
    }

    /// Split on declaration-start lines; each chunk runs to the line before
    /// the next declaration.
    pub fn chunk(&self, path: &str, text: &str) -> Vec<CodeChunk> {
        let lines: Vec<&str> = text.lines().collect();
        let mut starts = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            if self.patterns.iter().any(|p| p.is_match(line)) {
                starts.push(i);
            }
        }
        if starts.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        for (n, &start) in starts.iter().enumerate() {
            let end = starts.get(n + 1).copied().unwrap_or(lines.len());
            let content = lines[start..end].join("\n");
            let trimmed = content.trim();
            if trimmed.is_empty() {
                continue;
            }
            let start_line = start as u32 + 1;
            let end_line = end as u32;
            let mut chunk = CodeChunk::new(
                path,
                start_line,
                end_line,
                ChunkKind::Block,
                declaration_name(lines[start]),
                self.language,
                truncate_at_boundary(content.clone(), self.max_chunk_size),
            );
            chunk.parse_quality = ParseQuality::Fallback;
            chunk.breadcrumb = path.to_string();
            chunk.quality =
                quality::estimate(&content, self.language, ChunkKind::Block, 0, 0);
            chunks.push(chunk);
        }
        chunks
    }
}

/// First identifier after the declaration keyword, best effort.
fn declaration_name(line: &str) -> String {
    let mut words = line
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty());
    // Skip the keyword itself (def/class/function/...).
    words.next();
    words.next().unwrap_or_default().to_string()
}

/// Single raw-text root chunk for syntactically invalid files.
///
/// Invalid files still participate in search with degraded signal.
pub fn invalid_root_chunk(path: &str, text: &str, language: Language) -> CodeChunk {
    let end_line = text.lines().count().max(1) as u32;
    let mut chunk = CodeChunk::new(
        path,
        1,
        end_line,
        ChunkKind::File,
        file_stem(path),
        language,
        text.to_string(),
    );
    chunk.parse_quality = ParseQuality::Invalid;
    chunk.breadcrumb = path.to_string();
    chunk
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_declaration_patterns() {
        let chunker = FallbackChunker::new(Language::Python, &[r"^def ", r"^class "], 16_384);
        let src = "def a():\n    return 1\n\ndef b():\n    return 2\n";
        let chunks = chunker.chunk("m.py", src);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].name, "a");
        assert_eq!(chunks[1].name, "b");
        assert!(chunks
            .iter()
            .all(|c| c.parse_quality == ParseQuality::Fallback));
        assert!(chunks.iter().all(|c| c.kind == ChunkKind::Block));
    }

    #[test]
    fn no_matches_yields_no_chunks() {
        let chunker = FallbackChunker::new(Language::Python, &[r"^def "], 16_384);
        assert!(chunker.chunk("m.py", "x = 1\ny = 2\n").is_empty());
    }

    #[test]
    fn invalid_root_keeps_raw_text() {
        let chunk = invalid_root_chunk("broken.py", "def broken(:\n", Language::Python);
        assert_eq!(chunk.kind, ChunkKind::File);
        assert_eq!(chunk.parse_quality, ParseQuality::Invalid);
        assert_eq!(chunk.content, "def broken(:\n");
        assert_eq!(chunk.start_line, 1);
    }
}
