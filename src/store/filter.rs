//! Metadata filter: boolean predicate over chunk metadata fields, applied at
//! the store level before ranking.

use globset::{Glob, GlobMatcher};
use regex::Regex;

use crate::domain::error::{Error, Result};
use crate::domain::types::{ChunkKind, CodeChunk, Grade, Language};

/// Filter over chunk metadata. Empty filter admits everything.
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    languages: Vec<Language>,
    kinds: Vec<ChunkKind>,
    path_prefix: Option<String>,
    path_glob: Option<GlobMatcher>,
    path_regex: Option<Regex>,
    max_grade: Option<Grade>,
    max_smells: Option<usize>,
    complexity: Option<(u32, u32)>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `language ∈ S`; calling repeatedly widens the set.
    pub fn with_language(mut self, language: Language) -> Self {
        self.languages.push(language);
        self
    }

    /// `kind ∈ S`; calling repeatedly widens the set.
    pub fn with_kind(mut self, kind: ChunkKind) -> Self {
        self.kinds.push(kind);
        self
    }

    pub fn with_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = Some(prefix.into());
        self
    }

    pub fn with_path_glob(mut self, pattern: &str) -> Result<Self> {
        let glob = Glob::new(pattern)
            .map_err(|e| Error::invalid_argument(format!("invalid path glob {pattern:?}: {e}")))?;
        self.path_glob = Some(glob.compile_matcher());
        Ok(self)
    }

    pub fn with_path_regex(mut self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| Error::invalid_argument(format!("invalid path regex {pattern:?}: {e}")))?;
        self.path_regex = Some(regex);
        Ok(self)
    }

    /// `quality.grade ≤ G` (A is best; `≤ B` admits A and B).
    pub fn with_max_grade(mut self, grade: Grade) -> Self {
        self.max_grade = Some(grade);
        self
    }

    pub fn with_max_smells(mut self, count: usize) -> Self {
        self.max_smells = Some(count);
        self
    }

    /// `cyclomatic ∈ [lo, hi]`, inclusive.
    pub fn with_complexity_range(mut self, lo: u32, hi: u32) -> Self {
        self.complexity = Some((lo, hi));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
            && self.kinds.is_empty()
            && self.path_prefix.is_none()
            && self.path_glob.is_none()
            && self.path_regex.is_none()
            && self.max_grade.is_none()
            && self.max_smells.is_none()
            && self.complexity.is_none()
    }

    pub fn matches(&self, chunk: &CodeChunk) -> bool {
        if !self.languages.is_empty() && !self.languages.contains(&chunk.language) {
            return false;
        }
        if !self.kinds.is_empty() && !self.kinds.contains(&chunk.kind) {
            return false;
        }
        if let Some(prefix) = &self.path_prefix {
            if !chunk.file_path.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if let Some(glob) = &self.path_glob {
            if !glob.is_match(&chunk.file_path) {
                return false;
            }
        }
        if let Some(regex) = &self.path_regex {
            if !regex.is_match(&chunk.file_path) {
                return false;
            }
        }
        if let Some(max) = self.max_grade {
            if chunk.quality.grade > max {
                return false;
            }
        }
        if let Some(max) = self.max_smells {
            if chunk.quality.smell_count() > max {
                return false;
            }
        }
        if let Some((lo, hi)) = self.complexity {
            if chunk.quality.cyclomatic < lo || chunk.quality.cyclomatic > hi {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(language: Language, kind: ChunkKind, path: &str, grade: Grade) -> CodeChunk {
        let mut chunk = CodeChunk::new(path, 1, 5, kind, "x", language, "body");
        chunk.quality.grade = grade;
        chunk
    }

    #[test]
    fn empty_filter_admits_everything() {
        let filter = MetadataFilter::new();
        assert!(filter.is_empty());
        assert!(filter.matches(&chunk(Language::Python, ChunkKind::Function, "a.py", Grade::F)));
    }

    #[test]
    fn language_and_kind_sets() {
        let filter = MetadataFilter::new()
            .with_language(Language::Python)
            .with_kind(ChunkKind::Function)
            .with_kind(ChunkKind::Method);
        assert!(filter.matches(&chunk(Language::Python, ChunkKind::Method, "a.py", Grade::A)));
        assert!(!filter.matches(&chunk(Language::Ruby, ChunkKind::Method, "a.rb", Grade::A)));
        assert!(!filter.matches(&chunk(Language::Python, ChunkKind::Block, "a.py", Grade::A)));
    }

    #[test]
    fn grade_ceiling_excludes_worse_grades() {
        let filter = MetadataFilter::new().with_max_grade(Grade::B);
        assert!(filter.matches(&chunk(Language::Python, ChunkKind::Function, "a.py", Grade::A)));
        assert!(filter.matches(&chunk(Language::Python, ChunkKind::Function, "a.py", Grade::B)));
        assert!(!filter.matches(&chunk(Language::Python, ChunkKind::Function, "a.py", Grade::C)));
    }

    #[test]
    fn path_predicates() {
        let filter = MetadataFilter::new()
            .with_path_prefix("src/")
            .with_path_glob("src/**/*.py")
            .unwrap();
        assert!(filter.matches(&chunk(Language::Python, ChunkKind::Function, "src/app/m.py", Grade::A)));
        assert!(!filter.matches(&chunk(Language::Python, ChunkKind::Function, "lib/m.py", Grade::A)));
    }

    #[test]
    fn complexity_range_is_inclusive() {
        let mut c = chunk(Language::Python, ChunkKind::Function, "a.py", Grade::A);
        c.quality.cyclomatic = 5;
        let filter = MetadataFilter::new().with_complexity_range(5, 10);
        assert!(filter.matches(&c));
        c.quality.cyclomatic = 11;
        assert!(!filter.matches(&c));
    }
}
