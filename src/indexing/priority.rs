//! Initial traversal ordering.
//!
//! Surfacing order: files changed in the VCS working tree, then declared
//! entry points, then top-level docs, then everything else. This is an
//! optimisation only; correctness never depends on it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;

const ENTRY_POINT_STEMS: &[&str] = &["main", "index", "app", "lib", "mod", "__init__"];

/// Paths git reports as changed in the working tree; empty outside a repo.
fn vcs_changed_files(project_root: &Path) -> HashSet<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(project_root)
        .args(["status", "--porcelain"])
        .output();
    let Ok(output) = output else {
        return HashSet::new();
    };
    if !output.status.success() {
        return HashSet::new();
    }
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| line.get(3..))
        .map(|p| p.trim().to_string())
        .collect()
}

fn rank(rel: &str, changed: &HashSet<String>) -> u8 {
    if changed.contains(rel) {
        return 0;
    }
    let path = Path::new(rel);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if ENTRY_POINT_STEMS.contains(&stem.as_str()) {
        return 1;
    }
    let top_level = !rel.contains('/');
    if top_level && (stem == "readme" || stem.contains("doc")) {
        return 2;
    }
    3
}

/// Stable-sort `(absolute, relative)` path pairs into surfacing order.
pub fn prioritise(
    mut paths: Vec<(PathBuf, String)>,
    project_root: &Path,
) -> Vec<(PathBuf, String)> {
    let changed = vcs_changed_files(project_root);
    paths.sort_by_key(|(_, rel)| (rank(rel, &changed), rel.clone()));
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_points_and_docs_surface_before_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let paths = vec![
            (PathBuf::from("/p/z.py"), "z.py".to_string()),
            (PathBuf::from("/p/README.md"), "README.md".to_string()),
            (PathBuf::from("/p/src/main.py"), "src/main.py".to_string()),
            (PathBuf::from("/p/a.py"), "a.py".to_string()),
        ];
        let ordered = prioritise(paths, dir.path());
        let rels: Vec<&str> = ordered.iter().map(|(_, r)| r.as_str()).collect();
        assert_eq!(rels, vec!["src/main.py", "README.md", "a.py", "z.py"]);
    }
}
