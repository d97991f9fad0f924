//! Query preprocessing: whitespace normalisation, abbreviation expansion,
//! and the signals the adaptive threshold feeds on.

use std::collections::HashSet;

/// Common developer abbreviations expanded into the query so short inputs
/// still land near the right embeddings.
const EXPANSIONS: &[(&str, &str)] = &[
    ("auth", "authentication authorize login"),
    ("db", "database data storage"),
    ("api", "application programming interface endpoint"),
    ("ui", "user interface frontend view"),
    ("util", "utility helper function"),
    ("config", "configuration settings options"),
    ("async", "asynchronous await promise"),
    ("sync", "synchronous blocking"),
    ("func", "function method"),
    ("var", "variable"),
    ("param", "parameter argument"),
    ("init", "initialize setup create"),
    ("parse", "parsing parser analyze"),
    ("validate", "validation check verify"),
    ("handle", "handler process manage"),
    ("error", "exception failure bug"),
    ("test", "testing unittest spec"),
    ("mock", "mocking stub fake"),
    ("log", "logging logger debug"),
];

/// Collapse whitespace and append expansions for known abbreviations,
/// deduplicating while preserving first-seen order.
pub fn expand(query: &str) -> String {
    let mut seen: HashSet<String> = HashSet::new();
    let mut words = Vec::new();
    for word in query.split_whitespace() {
        let lower = word.to_lowercase();
        if seen.insert(lower.clone()) {
            words.push(lower.clone());
        }
        if let Some((_, expansion)) = EXPANSIONS.iter().find(|(k, _)| *k == lower) {
            for extra in expansion.split_whitespace() {
                if seen.insert(extra.to_string()) {
                    words.push(extra.to_string());
                }
            }
        }
    }
    words.join(" ")
}

/// Heuristic: the input names a file rather than describing code.
pub fn looks_like_path(query: &str) -> bool {
    if query.split_whitespace().count() != 1 {
        return false;
    }
    query.contains('/')
        || std::path::Path::new(query)
            .extension()
            .map(|e| !e.is_empty())
            .unwrap_or(false)
}

/// Identifier-shaped queries earn the structural bonus for callable chunks.
pub fn is_symbol_like(query: &str) -> bool {
    let trimmed = query.trim();
    if trimmed.is_empty() || trimmed.split_whitespace().count() > 2 {
        return false;
    }
    trimmed.split_whitespace().all(|word| {
        word.chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == ':' || c == '.')
    })
}

/// Fraction of tokens that look uncommon (long, snake_case or camelCase).
pub fn uncommon_token_fraction(query: &str) -> f32 {
    let tokens: Vec<&str> = query.split_whitespace().collect();
    if tokens.is_empty() {
        return 0.0;
    }
    let uncommon = tokens
        .iter()
        .filter(|t| {
            t.len() > 12
                || t.contains('_')
                || (t.chars().any(|c| c.is_uppercase()) && t.chars().any(|c| c.is_lowercase()))
        })
        .count();
    uncommon as f32 / tokens.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expansion_preserves_order_and_dedupes() {
        let expanded = expand("db   auth db");
        assert!(expanded.starts_with("db database data storage auth"));
        assert_eq!(
            expanded.matches("db").count(),
            1,
            "duplicate query words collapse"
        );
    }

    #[test]
    fn plain_words_pass_through() {
        assert_eq!(expand("Find The Widget"), "find the widget");
    }

    #[test]
    fn path_detection() {
        assert!(looks_like_path("src/app/main.py"));
        assert!(looks_like_path("main.py"));
        assert!(!looks_like_path("how does indexing work"));
        assert!(!looks_like_path("main"));
    }

    #[test]
    fn symbol_detection() {
        assert!(is_symbol_like("parse_config"));
        assert!(is_symbol_like("Widget.render"));
        assert!(!is_symbol_like("where is the config parsed"));
    }

    #[test]
    fn uncommon_fraction_counts_identifiers() {
        assert_eq!(uncommon_token_fraction("find the bug"), 0.0);
        assert!(uncommon_token_fraction("find compute_semantic_links") > 0.0);
    }
}
