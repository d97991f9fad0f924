//! Path filter: decides which files enter the indexing pipeline.
//!
//! Uses the `ignore` crate (same traversal ripgrep uses) for git-aware
//! walking, with our own dotfile policy layered on top so the CI
//! dot-directory whitelist is honoured even when dotfiles are skipped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;

use crate::config::ProjectConfig;
use crate::constants;
use crate::domain::error::{Error, Result};
use crate::domain::types::Language;

/// Directories never worth descending into, regardless of configuration.
const VENDOR_DIRS: &[&str] = &[
    "node_modules",
    "__pycache__",
    "venv",
    "env",
    "site-packages",
    "dist",
    "build",
    "target",
];

/// Outcome of decoding raw file bytes into chunkable text.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedText {
    /// Clean UTF-8.
    Utf8(String),
    /// Latin-1 fallback; the decode was lossy and is flagged as such.
    Lossy(String),
    /// Not text; the file is skipped with reason "binary".
    Binary,
}

impl DecodedText {
    pub fn into_text(self) -> Option<(String, bool)> {
        match self {
            DecodedText::Utf8(text) => Some((text, false)),
            DecodedText::Lossy(text) => Some((text, true)),
            DecodedText::Binary => None,
        }
    }
}

/// Decode file bytes, falling back to latin-1 for pure text kinds only.
pub fn decode_text(bytes: &[u8], language: Language) -> DecodedText {
    let sniff = &bytes[..bytes.len().min(constants::SNIFF_BYTES)];
    if sniff.contains(&0) {
        return DecodedText::Binary;
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => DecodedText::Utf8(text.to_string()),
        Err(_) if language.is_text() => {
            // Latin-1 maps every byte to a code point, so this cannot fail.
            let text: String = bytes.iter().map(|&b| b as char).collect();
            DecodedText::Lossy(text)
        }
        Err(_) => DecodedText::Binary,
    }
}

/// Lazy file discovery with extension, size, glob and dotfile filtering.
pub struct PathFilter {
    config: Arc<ProjectConfig>,
    file_globs: GlobSet,
    dir_globs: GlobSet,
}

impl PathFilter {
    pub fn new(config: Arc<ProjectConfig>) -> Result<Self> {
        let mut file_builder = GlobSetBuilder::new();
        let mut dir_builder = GlobSetBuilder::new();
        for pattern in &config.exclude_patterns {
            if let Some(dir_pattern) = pattern.strip_suffix('/') {
                dir_builder.add(compile_glob(dir_pattern)?);
            } else {
                file_builder.add(compile_glob(pattern)?);
            }
        }
        Ok(Self {
            config,
            file_globs: file_builder
                .build()
                .map_err(|e| Error::config(format!("invalid exclude pattern: {e}")))?,
            dir_globs: dir_builder
                .build()
                .map_err(|e| Error::config(format!("invalid exclude pattern: {e}")))?,
        })
    }

    /// Walk the project root and produce the sorted set of candidate paths.
    ///
    /// Unreadable directories are reported and skipped; the walk continues.
    pub fn discover(&self) -> Vec<PathBuf> {
        let root = &self.config.project_root;
        let walker = WalkBuilder::new(root)
            .git_ignore(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .git_global(false)
            .hidden(false)
            .follow_links(false)
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(error = %e, "error walking directory, skipping");
                    continue;
                }
            };
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            let path = entry.path();
            if path == root.as_path() {
                continue;
            }
            if !is_file {
                continue;
            }
            if self.admits(path) {
                files.push(path.to_path_buf());
            }
        }
        files.sort();
        files
    }

    /// Full admission check for a single file path.
    pub fn admits(&self, path: &Path) -> bool {
        let rel = match path.strip_prefix(&self.config.project_root) {
            Ok(rel) => rel,
            Err(_) => return false,
        };

        let components: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        for (i, part) in components.iter().enumerate() {
            let is_dir_component = i + 1 < components.len();

            if part == constants::STATE_DIR_NAME {
                return false;
            }
            if is_dir_component && VENDOR_DIRS.contains(&part.as_str()) {
                return false;
            }
            if part.starts_with('.') && self.config.skip_dotfiles {
                let whitelisted =
                    is_dir_component && constants::WHITELISTED_DOT_DIRS.contains(&part.as_str());
                if !whitelisted {
                    tracing::debug!(path = %path.display(), part = %part, "skipped by dotfile policy");
                    return false;
                }
            }
            if is_dir_component && self.dir_globs.is_match(part.as_str()) {
                return false;
            }
            if self.file_globs.is_match(part.as_str()) {
                tracing::debug!(path = %path.display(), "skipped by exclude pattern");
                return false;
            }
        }
        if self.file_globs.is_match(rel) {
            return false;
        }

        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => ext.to_lowercase(),
            None => return false,
        };
        if !self.config.file_extensions.contains(&ext) {
            return false;
        }

        match std::fs::metadata(path) {
            Ok(meta) => {
                if meta.len() > self.config.max_file_size_bytes {
                    tracing::warn!(
                        path = %path.display(),
                        size = meta.len(),
                        limit = self.config.max_file_size_bytes,
                        "skipping oversized file"
                    );
                    return false;
                }
            }
            Err(_) => return false,
        }

        if self.looks_binary_or_minified(path, &ext) {
            return false;
        }

        true
    }

    /// Project-relative path with forward slashes, used as the canonical
    /// chunk/file key everywhere downstream.
    pub fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.config.project_root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    /// Sniff the head of the file for NUL bytes and minified one-liners.
    fn looks_binary_or_minified(&self, path: &Path, ext: &str) -> bool {
        let sample = match read_head(path, constants::SNIFF_BYTES) {
            Ok(sample) => sample,
            Err(_) => return true,
        };
        if sample.contains(&0) {
            tracing::debug!(path = %path.display(), "skipping binary file with allowed extension");
            return true;
        }
        // Minified bundles defeat structural chunking and drown search.
        if matches!(ext, "js" | "jsx" | "ts" | "tsx" | "html") {
            let text = String::from_utf8_lossy(&sample);
            if text.lines().take(10).any(|line| line.len() > 1000) {
                tracing::debug!(path = %path.display(), "skipping likely minified file");
                return true;
            }
        }
        false
    }
}

fn compile_glob(pattern: &str) -> Result<Glob> {
    Glob::new(pattern).map_err(|e| Error::config(format!("invalid exclude pattern {pattern:?}: {e}")))
}

fn read_head(path: &Path, limit: usize) -> std::io::Result<Vec<u8>> {
    use std::io::Read;
    let mut file = std::fs::File::open(path)?;
    let mut buf = vec![0u8; limit];
    let mut filled = 0;
    loop {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
        if filled == buf.len() {
            break;
        }
    }
    buf.truncate(filled);
    Ok(buf)
}
