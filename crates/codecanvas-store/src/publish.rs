//! Two-phase snapshot publication
//!
//! Phase one (no lock): the caller computes the digest, serializes the meta
//! record, renders the architecture image, and gathers the call-edge cache.
//! Phase two (lock held): re-stat every leaf, gate on quality, write the
//! digest-addressed files, then swap the latest pointers by rename.

use std::time::Duration;

use codecanvas_core::{snapshot, CallEdgeCache, CanvasError, GraphMeta};

use crate::lock::ArtifactLock;
use crate::paths::ArtifactDir;

/// Everything phase one produced.
#[derive(Debug, Clone)]
pub struct PublishInputs {
    pub meta: GraphMeta,
    pub image: Vec<u8>,
    pub call_edges: CallEdgeCache,
}

/// Verify-and-commit. Fails with `StaleCompute` when any source file changed
/// since it contributed to the digest, `QualityRegression` when an existing
/// meta at the same digest is strictly better, and `LockBusy` when the lock
/// could not be acquired in `wait`. None of these regress on-disk state.
pub fn publish(dir: &ArtifactDir, wait: Duration, inputs: &PublishInputs) -> Result<(), CanvasError> {
    let digest = inputs.meta.digest().to_string();
    debug_assert_eq!(digest, inputs.meta.merkle.root);
    debug_assert_eq!(digest, inputs.call_edges.graph_digest);

    let _guard = ArtifactLock::acquire(&dir.lock_path(), wait)?;

    if !snapshot::leaves_unchanged(&inputs.meta.merkle.leaves) {
        return Err(CanvasError::StaleCompute);
    }

    if let Some(existing) = load_latest_meta(dir)? {
        let same_digest = existing.digest() == digest;
        let strictly_better =
            existing.graph.parse_summary.quality() > inputs.meta.graph.parse_summary.quality();
        if same_digest && strictly_better {
            return Err(CanvasError::QualityRegression(digest));
        }
    }

    let meta_bytes = serde_json::to_vec_pretty(&inputs.meta)?;
    let edges_bytes = serde_json::to_vec_pretty(&inputs.call_edges)?;

    // Digest-addressed files first; the latest pointers only ever name
    // fully-written artifacts.
    dir.write_atomic(&dir.graph_meta_digest(&digest), &meta_bytes)?;
    dir.write_atomic(&dir.architecture_digest(&digest), &inputs.image)?;
    dir.write_atomic(&dir.call_edges_digest(&digest), &edges_bytes)?;

    dir.write_atomic(&dir.architecture_latest(), &inputs.image)?;
    dir.write_atomic(&dir.call_edges_latest(), &edges_bytes)?;
    dir.write_atomic(&dir.graph_meta_latest(), &meta_bytes)?;

    tracing::info!(
        digest = %digest,
        modules = inputs.meta.graph.stats.modules,
        call_edges = inputs.meta.graph.stats.call_edges,
        action = %inputs.meta.updated_by.action,
        "snapshot published"
    );
    Ok(())
}

/// Latest snapshot record, if one has been published. Readers never lock.
pub fn load_latest_meta(dir: &ArtifactDir) -> Result<Option<GraphMeta>, CanvasError> {
    let path = dir.graph_meta_latest();
    if !path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(&path)?;
    Ok(Some(serde_json::from_slice(&bytes)?))
}

/// Call-edge cache for `digest`. Caches whose recorded digest disagrees are
/// rejected — a stale cache must never seed a newer snapshot.
pub fn load_call_edges(dir: &ArtifactDir, digest: &str) -> Result<Option<CallEdgeCache>, CanvasError> {
    let path = dir.call_edges_digest(digest);
    if !path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(&path)?;
    let cache: CallEdgeCache = serde_json::from_slice(&bytes)?;
    if cache.graph_digest != digest {
        tracing::warn!(
            expected = %digest,
            found = %cache.graph_digest,
            "rejecting call-edge cache with mismatched digest"
        );
        return Ok(None);
    }
    Ok(Some(cache))
}

/// Write the call-edge cache for its digest and refresh the latest pointer
/// when the current meta names the same digest. Every resolver pass ends
/// here, including passes that found zero edges.
pub fn write_call_edges(
    dir: &ArtifactDir,
    wait: Duration,
    cache: &CallEdgeCache,
) -> Result<(), CanvasError> {
    let _guard = ArtifactLock::acquire(&dir.lock_path(), wait)?;
    let bytes = serde_json::to_vec_pretty(cache)?;
    dir.write_atomic(&dir.call_edges_digest(&cache.graph_digest), &bytes)?;

    let latest_matches = load_latest_meta(dir)?
        .map(|meta| meta.digest() == cache.graph_digest)
        .unwrap_or(false);
    if latest_matches {
        dir.write_atomic(&dir.call_edges_latest(), &bytes)?;
    }
    Ok(())
}
