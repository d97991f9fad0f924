//! Core domain model for the code-intelligence engine.
//!
//! These types flow through the whole pipeline: the path filter yields files,
//! parsers produce [`CodeChunk`]s, the embedder turns chunk text into
//! [`Embedding`]s, the vector store persists them, and the search engine hands
//! back [`SearchResult`]s. Everything is plain data; ownership of the stores
//! lives in [`crate::project::ProjectIndex`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hashing;

/// Supported source languages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Dart,
    Php,
    Ruby,
    Html,
    Markdown,
    PlainText,
    Unknown,
}

impl Language {
    /// Infer the language from a file extension (without the leading dot).
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "py" | "pyi" => Language::Python,
            "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
            "ts" | "tsx" | "mts" => Language::TypeScript,
            "dart" => Language::Dart,
            "php" => Language::Php,
            "rb" | "rake" => Language::Ruby,
            "html" | "htm" => Language::Html,
            "md" | "markdown" => Language::Markdown,
            "txt" | "text" | "rst" => Language::PlainText,
            _ => Language::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Dart => "dart",
            Language::Php => "php",
            Language::Ruby => "ruby",
            Language::Html => "html",
            Language::Markdown => "markdown",
            Language::PlainText => "text",
            Language::Unknown => "unknown",
        }
    }

    /// Text-like languages chunk by section rather than by declaration.
    pub fn is_text(&self) -> bool {
        matches!(
            self,
            Language::Markdown | Language::PlainText | Language::Html
        )
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Language {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "python" => Language::Python,
            "javascript" => Language::JavaScript,
            "typescript" => Language::TypeScript,
            "dart" => Language::Dart,
            "php" => Language::Php,
            "ruby" => Language::Ruby,
            "html" => Language::Html,
            "markdown" => Language::Markdown,
            "text" | "plaintext" => Language::PlainText,
            _ => Language::Unknown,
        })
    }
}

/// Structural role of a chunk inside its source artifact.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    File,
    Class,
    Function,
    Method,
    Block,
    Section,
    Paragraph,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::File => "file",
            ChunkKind::Class => "class",
            ChunkKind::Function => "function",
            ChunkKind::Method => "method",
            ChunkKind::Block => "block",
            ChunkKind::Section => "section",
            ChunkKind::Paragraph => "paragraph",
        }
    }

    /// Symbol-like chunks carry a meaningful `name`.
    pub fn is_symbolic(&self) -> bool {
        matches!(
            self,
            ChunkKind::Class | ChunkKind::Function | ChunkKind::Method
        )
    }
}

impl std::fmt::Display for ChunkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the chunk was obtained from its source file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParseQuality {
    /// Structural parser succeeded.
    #[default]
    Full,
    /// Regex-based fallback chunker produced the chunk.
    Fallback,
    /// The file was syntactically invalid; raw text root chunk.
    Invalid,
}

/// Quality grade, A (best) through F.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
pub enum Grade {
    #[default]
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    /// Derive a grade from accumulated demerit points.
    pub fn from_demerits(demerits: u32) -> Self {
        match demerits {
            0 => Grade::A,
            1..=2 => Grade::B,
            3..=4 => Grade::C,
            5..=7 => Grade::D,
            _ => Grade::F,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Grade {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "A" | "a" => Ok(Grade::A),
            "B" | "b" => Ok(Grade::B),
            "C" | "c" => Ok(Grade::C),
            "D" | "d" => Ok(Grade::D),
            "F" | "f" => Ok(Grade::F),
            _ => Err(()),
        }
    }
}

/// Code smell taxonomy used to rank search results.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SmellKind {
    LongMethod,
    GodClass,
    DeepNesting,
    HighComplexity,
    LongParameterList,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Demerit weight used when deriving the grade.
    pub fn demerits(&self) -> u32 {
        match self {
            Severity::Info => 1,
            Severity::Warning => 2,
            Severity::Error => 3,
        }
    }
}

/// A single detected smell with its severity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Smell {
    pub kind: SmellKind,
    pub severity: Severity,
}

/// Structured quality metrics captured while parsing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct QualityMetrics {
    pub cyclomatic: u32,
    pub cognitive: u32,
    pub nesting_depth: u32,
    pub parameter_count: u32,
    pub loc: u32,
    /// Method count; only meaningful for class chunks.
    pub method_count: u32,
    pub smells: Vec<Smell>,
    pub grade: Grade,
}

impl QualityMetrics {
    pub fn smell_count(&self) -> usize {
        self.smells.len()
    }
}

/// A contiguous region of a source artifact with semantic meaning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeChunk {
    /// Stable identifier derived from (path, start, end, kind).
    pub id: String,
    /// Project-relative path.
    pub file_path: String,
    /// 1-based inclusive line range.
    pub start_line: u32,
    pub end_line: u32,
    pub kind: ChunkKind,
    /// Symbolic name when applicable; empty for blocks and sections.
    pub name: String,
    pub language: Language,
    /// Exact source text of the chunk.
    pub content: String,
    /// 128-bit digest of the UTF-8 content; deduplication key.
    pub content_hash: String,
    pub docstring: Option<String>,
    pub leading_comment: Option<String>,
    /// Id of the enclosing chunk; None for file-level roots.
    pub parent_id: Option<String>,
    #[serde(default)]
    pub child_ids: Vec<String>,
    /// Human-readable structural path, e.g. `src/user.py > Class: User`.
    #[serde(default)]
    pub breadcrumb: String,
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde(default)]
    pub parse_quality: ParseQuality,
    #[serde(default)]
    pub quality: QualityMetrics,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CodeChunk {
    /// Create a chunk; the id and content hash are derived, not supplied.
    pub fn new(
        file_path: impl Into<String>,
        start_line: u32,
        end_line: u32,
        kind: ChunkKind,
        name: impl Into<String>,
        language: Language,
        content: impl Into<String>,
    ) -> Self {
        let file_path = file_path.into();
        let content = content.into();
        let now = Utc::now();
        Self {
            id: Self::derive_id(&file_path, start_line, end_line, kind),
            file_path,
            start_line,
            end_line,
            kind,
            name: name.into(),
            language,
            content_hash: hashing::content_hash(&content),
            content,
            docstring: None,
            leading_comment: None,
            parent_id: None,
            child_ids: Vec::new(),
            breadcrumb: String::new(),
            parameters: Vec::new(),
            parse_quality: ParseQuality::Full,
            quality: QualityMetrics::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Stable id derivation: `(file path, start, end, kind)`.
    pub fn derive_id(file_path: &str, start_line: u32, end_line: u32, kind: ChunkKind) -> String {
        hashing::id_hash(&format!("{file_path}:{start_line}:{end_line}:{kind}"))
    }

    pub fn line_count(&self) -> u32 {
        self.end_line.saturating_sub(self.start_line) + 1
    }
}

/// Fixed-dimension vector produced by a named embedding model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub model: String,
    pub dimensions: usize,
}

/// Similarity function used by the vector store.
///
/// Fixed at initialisation; changing it requires a full reindex.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMode {
    /// Dot product over L2-normalised vectors.
    Dot,
    /// Cosine similarity.
    #[default]
    Cosine,
}

/// Bookkeeping record kept by the Metadata Manager for each indexed file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    pub path: String,
    pub size: u64,
    /// Seconds since the Unix epoch, from filesystem metadata.
    pub mtime: i64,
    /// 256-bit digest of the raw file bytes; the change-detection gatekeeper.
    pub file_hash: String,
    pub chunk_ids: Vec<String>,
    pub language: Language,
    /// Set when the file was not valid UTF-8 and decoded via latin-1.
    #[serde(default)]
    pub lossy_decode: bool,
    pub indexed_at: DateTime<Utc>,
}

/// Directed, typed edge between two chunks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relationship {
    pub source_id: String,
    pub target_id: String,
    pub kind: RelationKind,
    pub weight: f32,
}

/// Relationship taxonomy.
///
/// Only the canonical direction is persisted; the inverse kinds exist for
/// query ergonomics and normalise via [`RelationKind::canonical`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Calls,
    CalledBy,
    Imports,
    ImportedBy,
    Contains,
    ContainedBy,
    SemanticallySimilar,
}

impl RelationKind {
    /// Canonical storage direction: `(kind, reversed)`.
    pub fn canonical(&self) -> (RelationKind, bool) {
        match self {
            RelationKind::Calls => (RelationKind::Calls, false),
            RelationKind::CalledBy => (RelationKind::Calls, true),
            RelationKind::Imports => (RelationKind::Imports, false),
            RelationKind::ImportedBy => (RelationKind::Imports, true),
            RelationKind::Contains => (RelationKind::Contains, false),
            RelationKind::ContainedBy => (RelationKind::Contains, true),
            RelationKind::SemanticallySimilar => (RelationKind::SemanticallySimilar, false),
        }
    }
}

/// A chunk scored against a query vector by the store.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub id: String,
    pub score: f32,
    pub chunk: CodeChunk,
}

/// Record handed to the vector store for persistence.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub chunk: CodeChunk,
}

/// Aggregate store statistics.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StoreStats {
    pub total_vectors: u64,
    pub dimensions: usize,
    pub storage_bytes: u64,
    pub provider: String,
}

/// Final, re-ranked search hit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub chunk: CodeChunk,
    /// Raw store similarity before re-ranking.
    pub vector_similarity: f32,
    /// Weighted score the result ordering is based on.
    pub final_score: f32,
    /// 1-based position in the result list.
    pub rank: usize,
    /// Names of neighbouring chunks in the same file, when enrichment is on.
    #[serde(default)]
    pub neighbours: Vec<String>,
}

/// Per-file outcome of an indexing operation.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Indexed {
        added: usize,
        updated: usize,
        deleted: usize,
    },
    Skipped {
        reason: SkipReason,
    },
    Failed {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// File hash matched the stored record; nothing to do.
    Unchanged,
    /// Path filter rejected the file (size, binary, extension).
    Filtered,
}

/// Kind of filesystem change reported by an external watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

/// Summary of a full `index_project` run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexReport {
    pub files_found: usize,
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub files_removed: usize,
    pub files_failed: usize,
    pub chunks_added: usize,
    pub chunks_updated: usize,
    pub chunks_deleted: usize,
    pub duration_ms: u64,
    /// Per-file failure messages, path first.
    pub failures: Vec<(String, String)>,
}

impl IndexReport {
    /// The run succeeded if any file was indexed or nothing needed work.
    pub fn is_success(&self) -> bool {
        self.files_failed == 0 || self.files_indexed > 0
    }
}

/// Status snapshot returned by `get_status()`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProjectIndexStats {
    pub total_files: u64,
    pub total_chunks: u64,
    pub languages: BTreeMap<String, u64>,
    pub store: StoreStats,
    pub last_indexed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_is_stable_and_position_derived() {
        let a = CodeChunk::new("src/a.py", 1, 10, ChunkKind::Function, "f", Language::Python, "x");
        let b = CodeChunk::new("src/a.py", 1, 10, ChunkKind::Function, "g", Language::Python, "y");
        // Same (path, range, kind) yields the same id regardless of content.
        assert_eq!(a.id, b.id);

        let c = CodeChunk::new("src/a.py", 1, 10, ChunkKind::Method, "f", Language::Python, "x");
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn content_hash_is_pure_function_of_content() {
        let a = CodeChunk::new("a.py", 1, 2, ChunkKind::Function, "f", Language::Python, "body");
        let b = CodeChunk::new("b.py", 9, 20, ChunkKind::Method, "g", Language::Python, "body");
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn grade_ordering_puts_a_first() {
        assert!(Grade::A < Grade::B);
        assert!(Grade::D < Grade::F);
        assert_eq!(Grade::from_demerits(0), Grade::A);
        assert_eq!(Grade::from_demerits(4), Grade::C);
        assert_eq!(Grade::from_demerits(12), Grade::F);
    }

    #[test]
    fn relation_kind_canonicalises_inverse_directions() {
        assert_eq!(
            RelationKind::CalledBy.canonical(),
            (RelationKind::Calls, true)
        );
        assert_eq!(
            RelationKind::Imports.canonical(),
            (RelationKind::Imports, false)
        );
    }

    #[test]
    fn language_from_extension_covers_parser_set() {
        assert_eq!(Language::from_extension("py"), Language::Python);
        assert_eq!(Language::from_extension("tsx"), Language::TypeScript);
        assert_eq!(Language::from_extension("dart"), Language::Dart);
        assert_eq!(Language::from_extension("weird"), Language::Unknown);
    }
}
