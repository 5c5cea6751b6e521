//! Artifact garbage collection
//!
//! Digest-addressed files accumulate one set per published snapshot. The
//! pruner keeps the digest the latest pointers reference plus the most
//! recent `keep` others, and deletes the rest under the lock.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use codecanvas_core::CanvasError;

use crate::lock::ArtifactLock;
use crate::paths::ArtifactDir;
use crate::publish::load_latest_meta;

fn digest_of(file_name: &str, prefix: &str, suffix: &str) -> Option<String> {
    let rest = file_name.strip_prefix(prefix)?;
    let digest = rest.strip_suffix(suffix)?;
    (!digest.is_empty() && digest.chars().all(|c| c.is_ascii_hexdigit()))
        .then(|| digest.to_string())
}

/// Delete digest-addressed artifacts beyond the referenced digest and the
/// `keep` most recently written others. Returns how many files were removed.
pub fn prune_artifacts(
    dir: &ArtifactDir,
    wait: Duration,
    keep: usize,
) -> Result<usize, CanvasError> {
    let _guard = ArtifactLock::acquire(&dir.lock_path(), wait)?;
    let current = load_latest_meta(dir)?.map(|meta| meta.digest().to_string());

    // Group every digest-addressed file by digest, tracking the newest mtime.
    let mut groups: BTreeMap<String, (SystemTime, Vec<PathBuf>)> = BTreeMap::new();
    for entry in std::fs::read_dir(dir.root())?.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        let digest = digest_of(&name, "graph_meta.", ".json")
            .or_else(|| digest_of(&name, "architecture.", ".png"))
            .or_else(|| digest_of(&name, "call_edges.", ".json"));
        let Some(digest) = digest else { continue };
        let mtime = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let group = groups
            .entry(digest)
            .or_insert_with(|| (SystemTime::UNIX_EPOCH, Vec::new()));
        group.0 = group.0.max(mtime);
        group.1.push(entry.path());
    }

    if let Some(current) = &current {
        groups.remove(current);
    }

    let mut ordered: Vec<(String, (SystemTime, Vec<PathBuf>))> = groups.into_iter().collect();
    ordered.sort_by(|a, b| b.1 .0.cmp(&a.1 .0));

    let mut removed = 0;
    for (digest, (_, files)) in ordered.into_iter().skip(keep) {
        for file in files {
            if std::fs::remove_file(&file).is_ok() {
                removed += 1;
            }
        }
        tracing::debug!(digest = %digest, "pruned stale snapshot artifacts");
    }
    Ok(removed)
}

/// Remove the entire artifact directory.
pub fn clear_artifacts(dir: &ArtifactDir) -> std::io::Result<()> {
    if dir.root().exists() {
        std::fs::remove_dir_all(dir.root())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_parsing_rejects_non_hex_names() {
        assert_eq!(
            digest_of("graph_meta.abc123.json", "graph_meta.", ".json"),
            Some("abc123".to_string())
        );
        assert_eq!(digest_of("graph_meta.json", "graph_meta.", ".json"), None);
        assert_eq!(
            digest_of("graph_meta.not-hex!.json", "graph_meta.", ".json"),
            None
        );
        assert_eq!(digest_of("dirty.json", "graph_meta.", ".json"), None);
    }
}
