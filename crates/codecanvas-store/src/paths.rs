//! Artifact directory layout
//!
//! The artifact directory lives outside the workspace so source scans never
//! see derived state. Latest pointers are full copies of digest-addressed
//! files, swapped in by rename.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const LOCK_FILE: &str = "lock";
pub const GRAPH_META: &str = "graph_meta.json";
pub const ARCHITECTURE_PNG: &str = "architecture.png";
pub const CALL_EDGES: &str = "call_edges.json";
pub const DIRTY_FILE: &str = "dirty.json";
pub const WARMUP_FILE: &str = "lsp_warmup.json";

/// Handle to one workspace's artifact directory.
#[derive(Debug, Clone)]
pub struct ArtifactDir {
    root: PathBuf,
}

impl ArtifactDir {
    /// Open (creating if needed) the artifact directory at `root`.
    pub fn open(root: PathBuf) -> io::Result<Self> {
        fs::create_dir_all(&root)?;
        Ok(ArtifactDir { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    pub fn graph_meta_latest(&self) -> PathBuf {
        self.root.join(GRAPH_META)
    }

    pub fn graph_meta_digest(&self, digest: &str) -> PathBuf {
        self.root.join(format!("graph_meta.{digest}.json"))
    }

    pub fn architecture_latest(&self) -> PathBuf {
        self.root.join(ARCHITECTURE_PNG)
    }

    pub fn architecture_digest(&self, digest: &str) -> PathBuf {
        self.root.join(format!("architecture.{digest}.png"))
    }

    pub fn call_edges_latest(&self) -> PathBuf {
        self.root.join(CALL_EDGES)
    }

    pub fn call_edges_digest(&self, digest: &str) -> PathBuf {
        self.root.join(format!("call_edges.{digest}.json"))
    }

    pub fn dirty_path(&self) -> PathBuf {
        self.root.join(DIRTY_FILE)
    }

    pub fn warmup_path(&self) -> PathBuf {
        self.root.join(WARMUP_FILE)
    }

    /// Write `bytes` to `path` atomically: temp file in the same directory,
    /// fsync, rename. A crash leaves either the old file or the new one.
    pub fn write_atomic(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let tmp = self.root.join(format!(
            ".tmp-{}-{}",
            std::process::id(),
            path.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "artifact".into())
        ));
        {
            let mut file = fs::File::create(&tmp)?;
            io::Write::write_all(&mut file, bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}
