//! Streaming workspace enumeration
//!
//! Walks the workspace with directory pruning applied before descent, so a
//! `node_modules` with half a million entries is never opened. Consumers
//! receive paths through a callback; the full list is never materialized
//! here.

use std::path::Path;

use ignore::WalkBuilder;

use codecanvas_extract::Lang;

/// Directories never descended into: SCM metadata, build caches,
/// virtualenvs, and dependency vendor trees.
pub const PRUNED_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "target",
    "build",
    "dist",
    ".venv",
    "venv",
    "__pycache__",
    ".mypy_cache",
    ".pytest_cache",
    ".ruff_cache",
    ".tox",
    "vendor",
    "third_party",
    ".idea",
    ".vscode",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkSummary {
    /// Source files handed to the consumer.
    pub enumerated: usize,
    /// Files skipped for exceeding the size cap.
    pub oversized: usize,
}

pub fn is_pruned_dir(name: &str) -> bool {
    PRUNED_DIRS.contains(&name)
}

/// Stream every source file under `root` (recognized extensions only, size
/// capped) into `consumer`.
pub fn walk_source_files(
    root: &Path,
    max_file_size: u64,
    mut consumer: impl FnMut(std::path::PathBuf),
) -> WalkSummary {
    let mut summary = WalkSummary::default();
    let walker = WalkBuilder::new(root)
        .follow_links(false)
        .filter_entry(|entry| {
            // Never prune the walk root itself, whatever it is named.
            if entry.depth() == 0 {
                return true;
            }
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !is_pruned_dir(&name)
        })
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!(error = %e, "walk error, skipping entry");
                continue;
            }
        };
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        if Lang::from_path(path).is_none() {
            continue;
        }
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        if size > max_file_size {
            tracing::debug!(path = %path.display(), size, "skipping oversized file");
            summary.oversized += 1;
            continue;
        }
        summary.enumerated += 1;
        consumer(path.to_path_buf());
    }
    summary
}
