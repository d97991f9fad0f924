//! Call and import extraction.
//!
//! Best-effort, pattern-based: call sites are identifiers followed by an
//! opening parenthesis minus control-flow keywords; imports use per-language
//! patterns and resolve against the set of project paths. Unresolved
//! references are dropped.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::domain::types::Language;

const CALL_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "yield", "await", "async", "elif",
    "except", "match", "case", "assert", "print", "super", "new", "function", "def", "raise",
    "unless", "until", "when",
];

fn call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([A-Za-z_]\w*)\s*\(").unwrap())
}

/// Identifiers that appear as call sites in the text.
pub fn extract_calls(content: &str) -> HashSet<String> {
    call_re()
        .captures_iter(content)
        .map(|cap| cap[1].to_string())
        .filter(|name| !CALL_KEYWORDS.contains(&name.as_str()))
        .collect()
}

fn python_import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*(?:from\s+([\w.]+)\s+import|import\s+([\w.]+))").unwrap()
    })
}

fn js_import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?m)(?:import\s+[^;]*?from\s+|import\s+|require\s*\(\s*)["']([^"']+)["']"#)
            .unwrap()
    })
}

fn dart_import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?m)^\s*import\s+["']([^"']+)["']"#).unwrap())
}

fn ruby_import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?m)^\s*require(?:_relative)?\s+["']([^"']+)["']"#).unwrap()
    })
}

fn php_import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?m)(?:require|include)(?:_once)?\s*\(?\s*["']([^"']+)["']"#).unwrap()
    })
}

/// Raw import specifiers found in the file text.
pub fn extract_imports(content: &str, language: Language) -> Vec<String> {
    let mut imports = Vec::new();
    match language {
        Language::Python => {
            for cap in python_import_re().captures_iter(content) {
                if let Some(m) = cap.get(1).or_else(|| cap.get(2)) {
                    imports.push(m.as_str().to_string());
                }
            }
        }
        Language::JavaScript | Language::TypeScript => {
            for cap in js_import_re().captures_iter(content) {
                imports.push(cap[1].to_string());
            }
        }
        Language::Dart => {
            for cap in dart_import_re().captures_iter(content) {
                imports.push(cap[1].to_string());
            }
        }
        Language::Ruby => {
            for cap in ruby_import_re().captures_iter(content) {
                imports.push(cap[1].to_string());
            }
        }
        Language::Php => {
            for cap in php_import_re().captures_iter(content) {
                imports.push(cap[1].to_string());
            }
        }
        _ => {}
    }
    imports.sort();
    imports.dedup();
    imports
}

/// Resolve an import specifier to a known project-relative path.
///
/// Python dotted modules map to slashes; relative specifiers resolve against
/// the importing file's directory; bare names try common extensions.
pub fn resolve_import(
    specifier: &str,
    importer: &str,
    language: Language,
    known_paths: &HashSet<String>,
) -> Option<String> {
    let extensions: &[&str] = match language {
        Language::Python => &["py"],
        Language::JavaScript => &["js", "jsx", "mjs"],
        Language::TypeScript => &["ts", "tsx", "js"],
        Language::Dart => &["dart"],
        Language::Ruby => &["rb"],
        Language::Php => &["php"],
        _ => return None,
    };

    let base = if language == Language::Python {
        specifier.replace('.', "/")
    } else {
        specifier.trim_end_matches(std::path::is_separator).to_string()
    };

    let mut candidates = Vec::new();
    if base.starts_with("./") || base.starts_with("../") {
        let dir = std::path::Path::new(importer)
            .parent()
            .unwrap_or_else(|| std::path::Path::new(""));
        if let Some(joined) = normalise(&dir.join(&base)) {
            candidates.push(joined);
        }
    } else {
        candidates.push(base.clone());
        // Imports are often written relative to a source root the project
        // nests one level down; try the importer's top-level directory too.
        if let Some(root) = importer.split('/').next() {
            if !root.is_empty() && root != importer {
                candidates.push(format!("{root}/{base}"));
            }
        }
    }

    for candidate in candidates {
        let trimmed = candidate.trim_start_matches("./").to_string();
        if known_paths.contains(&trimmed) {
            return Some(trimmed);
        }
        for ext in extensions {
            let with_ext = format!("{trimmed}.{ext}");
            if known_paths.contains(&with_ext) {
                return Some(with_ext);
            }
            let as_index = format!("{trimmed}/__init__.{ext}");
            if language == Language::Python && known_paths.contains(&as_index) {
                return Some(as_index);
            }
        }
    }
    None
}

/// Lexically resolve `..` and `.` components without touching the disk.
fn normalise(path: &std::path::Path) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                parts.pop()?;
            }
            std::path::Component::CurDir => {}
            other => parts.push(other.as_os_str().to_string_lossy().into_owned()),
        }
    }
    Some(parts.join("/"))
}
