//! HTML parser: sections split at `<h1>`-`<h6>` headings.

use regex::Regex;
use std::sync::OnceLock;

use crate::chunking::parser::{file_root_chunk, truncate_at_boundary, ChunkParser};
use crate::config::ChunkingConfig;
use crate::domain::types::{ChunkKind, CodeChunk, Language};

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<h[1-6][^>]*>(.*?)</h[1-6]>").unwrap())
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").unwrap())
}

pub struct HtmlParser {
    config: ChunkingConfig,
}

impl HtmlParser {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }
}

impl ChunkParser for HtmlParser {
    fn language(&self) -> Language {
        Language::Html
    }

    fn parse(&self, path: &str, text: &str) -> Vec<CodeChunk> {
        let lines: Vec<&str> = text.lines().collect();

        let mut boundaries = Vec::new();
        for (i, line) in lines.iter().enumerate() {
            if let Some(cap) = heading_re().captures(line) {
                let title = tag_re().replace_all(&cap[1], "").trim().to_string();
                boundaries.push((i, title));
            }
        }
        if boundaries.is_empty() {
            return vec![file_root_chunk(
                path,
                text,
                Language::Html,
                self.config.max_chunk_size,
            )];
        }

        let mut chunks = Vec::new();
        for (n, (start, title)) in boundaries.iter().enumerate() {
            let end = boundaries
                .get(n + 1)
                .map(|(next, _)| next - 1)
                .unwrap_or(lines.len().saturating_sub(1));
            let content = lines[*start..=end].join("\n");
            if content.trim().is_empty() {
                continue;
            }
            let mut chunk = CodeChunk::new(
                path,
                *start as u32 + 1,
                end as u32 + 1,
                ChunkKind::Section,
                title.clone(),
                Language::Html,
                truncate_at_boundary(content, self.config.max_chunk_size),
            );
            chunk.breadcrumb = format!("{path} > {title}");
            chunks.push(chunk);
        }
        if chunks.is_empty() {
            return vec![file_root_chunk(
                path,
                text,
                Language::Html,
                self.config.max_chunk_size,
            )];
        }
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_split_at_headings() {
        let src = "<html><body>\n<h1>Guide</h1>\n<p>intro</p>\n<h2><em>Details</em></h2>\n<p>more</p>\n</body></html>\n";
        let chunks = HtmlParser::new(ChunkingConfig::default()).parse("doc.html", src);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].name, "Guide");
        assert_eq!(chunks[1].name, "Details");
    }

    #[test]
    fn headingless_html_is_root_chunk() {
        let chunks =
            HtmlParser::new(ChunkingConfig::default()).parse("x.html", "<p>no headings</p>\n");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::File);
    }
}
