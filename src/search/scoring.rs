//! Second-stage scoring: weighted fusion of vector similarity with quality
//! and structural signals, plus the adaptive similarity threshold.

use regex::Regex;
use std::sync::OnceLock;

use crate::config::ScoringConfig;
use crate::constants;
use crate::domain::types::{ChunkKind, CodeChunk, Grade, ParseQuality};

/// Quality score in `[0, 1]` derived from grade and smell count.
pub fn quality_score(chunk: &CodeChunk) -> f32 {
    let base = match chunk.quality.grade {
        Grade::A => 1.0,
        Grade::B => 0.8,
        Grade::C => 0.6,
        Grade::D => 0.4,
        Grade::F => 0.2,
    };
    let smell_penalty = 0.05 * chunk.quality.smell_count() as f32;
    // Fallback and invalid parses carry degraded signal.
    let parse_penalty = match chunk.parse_quality {
        ParseQuality::Full => 0.0,
        ParseQuality::Fallback => 0.1,
        ParseQuality::Invalid => 0.3,
    };
    (base - smell_penalty - parse_penalty).clamp(0.0, 1.0)
}

/// Structural bonus in `[0, 1]`: symbol-like queries prefer callable chunks
/// over raw blocks.
pub fn structural_bonus(chunk: &CodeChunk, symbol_query: bool) -> f32 {
    if !symbol_query {
        return 0.0;
    }
    match chunk.kind {
        ChunkKind::Function | ChunkKind::Method => 1.0,
        ChunkKind::Class => 0.6,
        _ => 0.0,
    }
}

fn getter_setter_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:get|set|is)_?[A-Za-z0-9_]*$").unwrap())
}

fn trivial_assign_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:self|this)\.[A-Za-z_]\w*\s*=\s*[A-Za-z_]\w*;?$").unwrap()
    })
}

/// Boilerplate penalty in `{0, 1}`: trivial getters/setters, empty bodies,
/// and field-copy constructors add noise rather than signal.
pub fn boilerplate_penalty(chunk: &CodeChunk) -> f32 {
    if !matches!(chunk.kind, ChunkKind::Function | ChunkKind::Method) {
        return 0.0;
    }
    let body_lines: Vec<&str> = chunk
        .content
        .lines()
        .skip(1)
        .map(str::trim)
        .filter(|l| !l.is_empty() && *l != "{" && *l != "}")
        .collect();

    // Empty or placeholder body.
    if body_lines.is_empty()
        || (body_lines.len() == 1
            && matches!(body_lines[0], "pass" | "return" | "return;" | "..." | "pass;"))
    {
        return 1.0;
    }

    // Short getter/setter by name.
    if getter_setter_re().is_match(&chunk.name) && body_lines.len() <= 2 {
        return 1.0;
    }

    // Constructors that only copy arguments into fields.
    let is_constructor = matches!(chunk.name.as_str(), "__init__" | "constructor" | "new");
    if is_constructor && !body_lines.is_empty() {
        let all_trivial = body_lines
            .iter()
            .all(|line| trivial_assign_re().is_match(line) || line.starts_with("super("));
        if all_trivial {
            return 1.0;
        }
    }

    0.0
}

/// Weighted final score.
pub fn final_score(
    weights: &ScoringConfig,
    vector_similarity: f32,
    chunk: &CodeChunk,
    symbol_query: bool,
) -> f32 {
    weights.vector_weight * vector_similarity
        + weights.quality_weight * quality_score(chunk)
        + weights.structural_weight * structural_bonus(chunk, symbol_query)
        - weights.boilerplate_weight * boilerplate_penalty(chunk)
}

/// Adaptive similarity threshold.
///
/// The drop grows with query brevity, a zero-result history for the same
/// query, and uncommon tokens, and is bounded so the effective threshold
/// never falls more than `MAX_ADAPTIVE_DROP` below the base.
pub fn adaptive_threshold(
    base: f32,
    query: &str,
    zero_result_runs: u32,
    uncommon_fraction: f32,
) -> f32 {
    let brevity = match query.len() {
        0..=7 => 0.08,
        8..=15 => 0.05,
        16..=31 => 0.02,
        _ => 0.0,
    };
    let history = (0.04 * zero_result_runs as f32).min(0.08);
    let uncommon = 0.04 * uncommon_fraction.clamp(0.0, 1.0);
    let drop = (brevity + history + uncommon).min(constants::MAX_ADAPTIVE_DROP);
    (base - drop).max(0.0)
}
