//! Module label computation
//!
//! Labels are workspace-relative, separator-normalized paths. When the
//! workspace holds exactly one project-root subtree (marker files), that
//! subtree becomes the label base so labels read `src/a.py` rather than
//! `backend/src/a.py`; otherwise top-level prefixes are preserved.

use std::path::{Path, PathBuf};

use crate::walker::is_pruned_dir;

/// Marker files identifying a project-root subtree.
pub const PROJECT_MARKERS: &[&str] = &[
    "Cargo.toml",
    "package.json",
    "pyproject.toml",
    "go.mod",
    "setup.py",
];

fn has_marker(dir: &Path) -> bool {
    PROJECT_MARKERS.iter().any(|m| dir.join(m).is_file())
}

/// The directory labels are computed relative to: `root` itself when it
/// carries a marker (or when zero or several subtrees do), else the single
/// marked child subtree.
pub fn detect_label_base(root: &Path) -> PathBuf {
    if has_marker(root) {
        return root.to_path_buf();
    }
    let Ok(entries) = std::fs::read_dir(root) else {
        return root.to_path_buf();
    };
    let mut marked: Vec<PathBuf> = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') || is_pruned_dir(&name) {
            continue;
        }
        if has_marker(&path) {
            marked.push(path);
        }
    }
    match marked.as_slice() {
        [single] => single.clone(),
        _ => root.to_path_buf(),
    }
}

/// Workspace-relative, `/`-normalized label for `path`, with the optional
/// configured prefix stripped.
pub fn module_label(base: &Path, strip_prefix: Option<&str>, path: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    let mut label = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    if let Some(prefix) = strip_prefix {
        let prefix = prefix.trim_end_matches('/');
        if let Some(rest) = label.strip_prefix(prefix) {
            label = rest.trim_start_matches('/').to_string();
        }
    }
    label
}
