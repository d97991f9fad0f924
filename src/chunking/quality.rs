//! Deterministic quality capture.
//!
//! Metrics are computed from the chunk text with plain token scanning, so
//! they are identical across platforms and parser versions. Smell thresholds
//! are fixed; see `constants`.

use regex::Regex;
use std::sync::OnceLock;

use crate::constants;
use crate::domain::types::{ChunkKind, Grade, Language, QualityMetrics, Severity, Smell, SmellKind};

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap())
}

/// Branching keywords contributing to cyclomatic and cognitive complexity.
fn branch_keywords(language: Language) -> &'static [&'static str] {
    match language {
        Language::Python => &["if", "elif", "for", "while", "except", "case"],
        Language::Ruby => &["if", "elsif", "unless", "while", "until", "when", "rescue"],
        _ => &["if", "for", "while", "case", "catch"],
    }
}

/// Boolean operators that add cyclomatic paths.
fn bool_ops(language: Language) -> &'static [&'static str] {
    match language {
        Language::Python => &["and", "or"],
        Language::Ruby => &["&&", "||", "and", "or"],
        _ => &["&&", "||"],
    }
}

/// Estimate quality metrics for a chunk.
///
/// `method_count` is only meaningful for class chunks and is supplied by the
/// parser, which knows the structure.
pub fn estimate(
    content: &str,
    language: Language,
    kind: ChunkKind,
    parameter_count: u32,
    method_count: u32,
) -> QualityMetrics {
    let loc = content.lines().filter(|l| !l.trim().is_empty()).count() as u32;
    let (cyclomatic, cognitive, nesting_depth) = complexity(content, language);

    let mut metrics = QualityMetrics {
        cyclomatic,
        cognitive,
        nesting_depth,
        parameter_count,
        loc,
        method_count,
        smells: Vec::new(),
        grade: Grade::A,
    };
    detect_smells(&mut metrics, kind);
    let demerits: u32 = metrics.smells.iter().map(|s| s.severity.demerits()).sum();
    metrics.grade = Grade::from_demerits(demerits);
    metrics
}

/// One pass over the lines: cyclomatic, cognitive (with nesting multipliers)
/// and maximum nesting depth.
fn complexity(content: &str, language: Language) -> (u32, u32, u32) {
    let keywords = branch_keywords(language);
    let ops = bool_ops(language);
    let indent_based = matches!(language, Language::Python);

    let base_indent = content
        .lines()
        .find(|l| !l.trim().is_empty())
        .map(indent_width)
        .unwrap_or(0);

    let mut cyclomatic = 1u32;
    let mut cognitive = 0u32;
    let mut max_depth = 0u32;
    let mut brace_depth = 0i32;

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || is_comment_line(trimmed, language) {
            continue;
        }

        let depth = if indent_based {
            ((indent_width(line).saturating_sub(base_indent)) / 4) as u32
        } else {
            brace_depth.max(0) as u32
        };
        max_depth = max_depth.max(depth);

        for word in word_re().find_iter(trimmed) {
            let token = word.as_str();
            if keywords.contains(&token) {
                cyclomatic += 1;
                cognitive += 1 + depth;
            } else if ops.contains(&token) {
                cyclomatic += 1;
            }
        }
        for op in ops.iter().filter(|o| !o.chars().all(char::is_alphanumeric)) {
            cyclomatic += trimmed.matches(op).count() as u32;
        }

        if !indent_based {
            for ch in trimmed.chars() {
                match ch {
                    '{' => brace_depth += 1,
                    '}' => brace_depth -= 1,
                    _ => {}
                }
            }
        }
    }

    (cyclomatic, cognitive, max_depth)
}

fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

fn is_comment_line(trimmed: &str, language: Language) -> bool {
    match language {
        Language::Python | Language::Ruby => trimmed.starts_with('#'),
        Language::Html | Language::Markdown | Language::PlainText => false,
        _ => trimmed.starts_with("//") || trimmed.starts_with('*') || trimmed.starts_with("/*"),
    }
}

fn detect_smells(metrics: &mut QualityMetrics, kind: ChunkKind) {
    let is_callable = matches!(kind, ChunkKind::Function | ChunkKind::Method);

    if is_callable && metrics.loc > constants::LONG_METHOD_LOC {
        let severity = if metrics.loc > constants::LONG_METHOD_LOC * 2 {
            Severity::Error
        } else {
            Severity::Warning
        };
        metrics.smells.push(Smell {
            kind: SmellKind::LongMethod,
            severity,
        });
    }

    if kind == ChunkKind::Class
        && (metrics.loc > constants::GOD_CLASS_LOC
            || metrics.method_count > constants::GOD_CLASS_METHODS)
    {
        metrics.smells.push(Smell {
            kind: SmellKind::GodClass,
            severity: Severity::Error,
        });
    }

    if metrics.nesting_depth > constants::DEEP_NESTING_DEPTH {
        metrics.smells.push(Smell {
            kind: SmellKind::DeepNesting,
            severity: Severity::Warning,
        });
    }

    if metrics.cyclomatic > constants::HIGH_COMPLEXITY_CYCLOMATIC {
        let severity = if metrics.cyclomatic > constants::HIGH_COMPLEXITY_CYCLOMATIC * 2 {
            Severity::Error
        } else {
            Severity::Warning
        };
        metrics.smells.push(Smell {
            kind: SmellKind::HighComplexity,
            severity,
        });
    }

    if metrics.parameter_count > constants::LONG_PARAMETER_LIST {
        metrics.smells.push(Smell {
            kind: SmellKind::LongParameterList,
            severity: Severity::Info,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_line_code_grades_a() {
        let metrics = estimate(
            "def f():\n    return 1\n",
            Language::Python,
            ChunkKind::Function,
            0,
            0,
        );
        assert_eq!(metrics.cyclomatic, 1);
        assert_eq!(metrics.grade, Grade::A);
        assert!(metrics.smells.is_empty());
    }

    #[test]
    fn branches_raise_cyclomatic() {
        let src = "def f(x):\n    if x and x > 1:\n        return 1\n    elif x:\n        return 2\n    return 3\n";
        let metrics = estimate(src, Language::Python, ChunkKind::Function, 1, 0);
        // 1 + if + elif + and
        assert_eq!(metrics.cyclomatic, 4);
        assert!(metrics.cognitive >= 2);
    }

    #[test]
    fn long_method_smell_fires_past_fifty_lines() {
        let body: String = (0..60).map(|i| format!("    x{i} = {i}\n")).collect();
        let src = format!("def f():\n{body}");
        let metrics = estimate(&src, Language::Python, ChunkKind::Function, 0, 0);
        assert!(metrics
            .smells
            .iter()
            .any(|s| s.kind == SmellKind::LongMethod));
        assert!(metrics.grade > Grade::A);
    }

    #[test]
    fn god_class_smell_uses_method_count() {
        let metrics = estimate("class C:\n    pass\n", Language::Python, ChunkKind::Class, 0, 25);
        assert!(metrics.smells.iter().any(|s| s.kind == SmellKind::GodClass));
    }

    #[test]
    fn deep_nesting_detected_from_braces() {
        let src = "function f() {\n  if (a) {\n    if (b) {\n      if (c) {\n        if (d) {\n          if (e) { g(); }\n        }\n      }\n    }\n  }\n}\n";
        let metrics = estimate(src, Language::JavaScript, ChunkKind::Function, 0, 0);
        assert!(metrics.nesting_depth > 4);
        assert!(metrics
            .smells
            .iter()
            .any(|s| s.kind == SmellKind::DeepNesting));
    }

    #[test]
    fn long_parameter_list_is_info() {
        let metrics = estimate(
            "def f(a, b, c, d, e, f7):\n    pass\n",
            Language::Python,
            ChunkKind::Function,
            6,
            0,
        );
        let smell = metrics
            .smells
            .iter()
            .find(|s| s.kind == SmellKind::LongParameterList)
            .unwrap();
        assert_eq!(smell.severity, Severity::Info);
    }
}
