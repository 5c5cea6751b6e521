//! Merkle snapshot identity
//!
//! A snapshot digest is the root of a Merkle tree over the module files that
//! contributed to a graph plus a config leaf. The same file bytes and config
//! always produce the same root, regardless of enumeration order, so the
//! digest is a stable address for derived artifacts.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Reserved key for the config leaf; sorts before any module label.
pub const CONFIG_LEAF_KEY: &str = "\u{0}config";

/// Reserved key for the empty-workspace sentinel leaf. A workspace with no
/// module files still has a digest: the `sha256("empty")` sentinel combined
/// with the config leaf, never the config leaf standing alone.
pub const EMPTY_LEAF_KEY: &str = "\u{0}empty";

/// Per-module Merkle leaf record, persisted in `graph_meta` so later
/// snapshots can reuse content hashes when `(mtime_ns, size)` are unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleLeaf {
    pub fs_path: PathBuf,
    pub mtime_ns: u64,
    pub size: u64,
    pub content_sha256: String,
    pub leaf: String,
    pub missing: bool,
}

/// The computed snapshot: leaves keyed by module label, the config leaf, and
/// the Merkle root (the graph digest).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotInputs {
    pub leaves: BTreeMap<String, ModuleLeaf>,
    pub config_leaf: String,
    pub root: String,
}

/// Parser configuration folded into the config leaf. Changing any field
/// changes every snapshot digest.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotConfig {
    pub version: u32,
    pub lsp: bool,
    pub lang_set: Vec<String>,
    pub label_strip_prefix: Option<String>,
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn sha256(parts: &[&[u8]]) -> [u8; 32] {
    let mut h = Sha256::new();
    for p in parts {
        h.update(p);
    }
    h.finalize().into()
}

/// `sha256("file\0" || label || 0x00 || content_sha256)`
fn file_leaf(label: &str, content_sha256: &[u8]) -> [u8; 32] {
    sha256(&[b"file\0", label.as_bytes(), &[0u8], content_sha256])
}

/// `sha256("config\0" || canonical_json(config))`
///
/// serde_json maps are ordered, so serializing a `json!` value with object
/// keys yields a canonical byte string.
pub fn config_leaf(cfg: &SnapshotConfig) -> String {
    let canonical = serde_json::json!({
        "version": cfg.version,
        "lsp": cfg.lsp,
        "lang_set": cfg.lang_set,
        "label_strip_prefix": cfg.label_strip_prefix,
    });
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    hex(&sha256(&[b"config\0", &bytes]))
}

fn decode_hex(s: &str) -> Vec<u8> {
    (0..s.len())
        .step_by(2)
        .filter_map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}

/// Combine an ordered `(key, leaf_hash)` list into the Merkle root.
/// Pairwise `sha256("node\0" || left || right)`, duplicating the odd tail at
/// each level. Empty input hashes the literal string "empty".
pub fn merkle_root(items: &[(String, [u8; 32])]) -> String {
    if items.is_empty() {
        return hex(&sha256(&[b"empty"]));
    }
    let mut sorted: Vec<_> = items.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    let mut level: Vec<[u8; 32]> = sorted.into_iter().map(|(_, h)| h).collect();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            let last = *level.last().unwrap_or(&[0u8; 32]);
            level.push(last);
        }
        level = level
            .chunks(2)
            .map(|pair| sha256(&[b"node\0", &pair[0], &pair[1]]))
            .collect();
    }
    hex(&level[0])
}

fn stat_sig(path: &Path) -> Option<(u64, u64)> {
    let meta = fs::metadata(path).ok()?;
    let mtime_ns = meta
        .modified()
        .ok()?
        .duration_since(std::time::UNIX_EPOCH)
        .ok()?
        .as_nanos() as u64;
    Some((mtime_ns, meta.len()))
}

fn content_sha256(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    Ok(hex(&sha256(&[&bytes])))
}

/// Compute the snapshot for `(label, fs_path)` module files.
///
/// Content hashes are reused from `prior` leaves when the file's
/// `(mtime_ns, size, fs_path)` signature is unchanged; otherwise the file is
/// re-read and hashed. Hashing fans out across a rayon pool, so call this off
/// the async runtime. Missing files produce a `missing` leaf hashed over an
/// empty content digest.
pub fn compute_snapshot(
    files: &[(String, PathBuf)],
    prior: Option<&BTreeMap<String, ModuleLeaf>>,
    cfg: &SnapshotConfig,
) -> SnapshotInputs {
    let leaves: BTreeMap<String, ModuleLeaf> = files
        .par_iter()
        .map(|(label, path)| {
            let sig = stat_sig(path);
            let reused = prior
                .and_then(|p| p.get(label))
                .filter(|leaf| {
                    !leaf.missing
                        && leaf.fs_path == *path
                        && sig == Some((leaf.mtime_ns, leaf.size))
                })
                .map(|leaf| leaf.content_sha256.clone());
            let (content, missing) = match reused {
                Some(c) => (c, false),
                None => match content_sha256(path) {
                    Ok(c) => (c, false),
                    Err(_) => (hex(&sha256(&[b""])), true),
                },
            };
            let (mtime_ns, size) = sig.unwrap_or((0, 0));
            let leaf = hex(&file_leaf(label, &decode_hex(&content)));
            (
                label.clone(),
                ModuleLeaf {
                    fs_path: path.clone(),
                    mtime_ns,
                    size,
                    content_sha256: content,
                    leaf,
                    missing,
                },
            )
        })
        .collect();

    let config = config_leaf(cfg);
    let mut items: Vec<(String, [u8; 32])> = leaves
        .iter()
        .map(|(label, leaf)| {
            let mut h = [0u8; 32];
            let bytes = decode_hex(&leaf.leaf);
            h.copy_from_slice(&bytes);
            (label.clone(), h)
        })
        .collect();
    if items.is_empty() {
        items.push((EMPTY_LEAF_KEY.to_string(), sha256(&[b"empty"])));
    }
    let mut cfg_hash = [0u8; 32];
    cfg_hash.copy_from_slice(&decode_hex(&config));
    items.push((CONFIG_LEAF_KEY.to_string(), cfg_hash));

    let root = merkle_root(&items);
    SnapshotInputs {
        leaves,
        config_leaf: config,
        root,
    }
}

/// Re-stat every leaf's source file; true when all `(mtime_ns, size)`
/// signatures still match. The publisher runs this under the lock to reject
/// stale computes.
pub fn leaves_unchanged(leaves: &BTreeMap<String, ModuleLeaf>) -> bool {
    leaves.values().all(|leaf| {
        if leaf.missing {
            return !leaf.fs_path.exists();
        }
        stat_sig(&leaf.fs_path) == Some((leaf.mtime_ns, leaf.size))
    })
}
