//! Persistent dirty queue with lease/acknowledge semantics
//!
//! External editors mark paths; refresh passes claim bounded batches and ack
//! each path once its portion of the update committed. Claims carry a lease:
//! the reaper returns any claim older than the TTL to pending, so a client
//! that dies between claim and ack never loses the entry.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use codecanvas_core::{now_s, CanvasError};

use crate::lock::ArtifactLock;
use crate::paths::ArtifactDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirtyStatus {
    Pending,
    InProgress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirtyEntry {
    pub path: PathBuf,
    pub queued_at: f64,
    pub updated_at: f64,
    pub status: DirtyStatus,
    pub reason: String,
    pub attempts: u32,
    pub mtime_ns: Option<u64>,
    pub size: Option<u64>,
    pub missing_at_mark: bool,
    pub last_error: Option<String>,
    pub claim_id: Option<String>,
    pub claimed_at: Option<f64>,
}

/// Outcome reported for one claimed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckOutcome {
    /// Work committed; the entry is removed.
    Ok,
    /// The file no longer exists and its nodes were dropped; removed.
    Deleted,
    /// Ran out of budget; returned to pending.
    Deferred,
    /// Processing failed; returned to pending with the error recorded.
    Error(String),
}

#[derive(Clone)]
pub struct DirtyQueue {
    dir: ArtifactDir,
    ttl: Duration,
    lock_wait: Duration,
}

fn stat_sig(path: &Path) -> Option<(u64, u64)> {
    let meta = std::fs::metadata(path).ok()?;
    let mtime_ns = meta
        .modified()
        .ok()?
        .duration_since(std::time::UNIX_EPOCH)
        .ok()?
        .as_nanos() as u64;
    Some((mtime_ns, meta.len()))
}

impl DirtyQueue {
    pub fn new(dir: ArtifactDir, ttl: Duration, lock_wait: Duration) -> Self {
        DirtyQueue { dir, ttl, lock_wait }
    }

    fn load(&self) -> Result<Vec<DirtyEntry>, CanvasError> {
        let path = self.dir.dirty_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let bytes = std::fs::read(&path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn save(&self, entries: &[DirtyEntry]) -> Result<(), CanvasError> {
        let bytes = serde_json::to_vec_pretty(entries)?;
        self.dir.write_atomic(&self.dir.dirty_path(), &bytes)?;
        Ok(())
    }

    /// Return expired `in_progress` entries to pending. Runs on every access
    /// before new work is considered.
    fn reap(entries: &mut [DirtyEntry], ttl: Duration, now: f64) -> usize {
        let mut reaped = 0;
        for entry in entries.iter_mut() {
            if entry.status != DirtyStatus::InProgress {
                continue;
            }
            let expired = entry
                .claimed_at
                .map(|at| now - at > ttl.as_secs_f64())
                .unwrap_or(true);
            if expired {
                tracing::debug!(path = %entry.path.display(), "reaping expired dirty claim");
                entry.status = DirtyStatus::Pending;
                entry.claim_id = None;
                entry.claimed_at = None;
                entry.updated_at = now;
                reaped += 1;
            }
        }
        reaped
    }

    /// Add or refresh pending entries for `paths`. Signatures are stat'ed
    /// best-effort; a missing file is still queued so its nodes get dropped.
    pub fn mark(&self, paths: &[PathBuf], reason: &str) -> Result<usize, CanvasError> {
        if paths.is_empty() {
            return Ok(0);
        }
        let _guard = ArtifactLock::acquire(&self.dir.lock_path(), self.lock_wait)?;
        let mut entries = self.load()?;
        let now = now_s();
        Self::reap(&mut entries, self.ttl, now);

        let mut marked = 0;
        for path in paths {
            let sig = stat_sig(path);
            if let Some(existing) = entries.iter_mut().find(|e| &e.path == path) {
                // Never steal an active claim; just refresh the signature.
                existing.updated_at = now;
                existing.reason = reason.to_string();
                existing.mtime_ns = sig.map(|(m, _)| m);
                existing.size = sig.map(|(_, s)| s);
                existing.missing_at_mark = sig.is_none();
                marked += 1;
                continue;
            }
            entries.push(DirtyEntry {
                path: path.clone(),
                queued_at: now,
                updated_at: now,
                status: DirtyStatus::Pending,
                reason: reason.to_string(),
                attempts: 0,
                mtime_ns: sig.map(|(m, _)| m),
                size: sig.map(|(_, s)| s),
                missing_at_mark: sig.is_none(),
                last_error: None,
                claim_id: None,
                claimed_at: None,
            });
            marked += 1;
        }
        self.save(&entries)?;
        Ok(marked)
    }

    /// Move up to `max_items` pending entries to `in_progress` under a fresh
    /// claim id. A claimed entry is invisible to other processes until it is
    /// acked or its lease expires.
    pub fn claim(&self, max_items: usize) -> Result<Vec<DirtyEntry>, CanvasError> {
        let _guard = ArtifactLock::acquire(&self.dir.lock_path(), self.lock_wait)?;
        let mut entries = self.load()?;
        let now = now_s();
        Self::reap(&mut entries, self.ttl, now);

        let claim_id = uuid::Uuid::new_v4().to_string();
        let mut claimed = Vec::new();
        for entry in entries.iter_mut() {
            if claimed.len() >= max_items {
                break;
            }
            if entry.status != DirtyStatus::Pending {
                continue;
            }
            entry.status = DirtyStatus::InProgress;
            entry.claim_id = Some(claim_id.clone());
            entry.claimed_at = Some(now);
            entry.updated_at = now;
            claimed.push(entry.clone());
        }
        if !claimed.is_empty() {
            self.save(&entries)?;
        }
        Ok(claimed)
    }

    /// Acknowledge one claimed path. Unknown `(claim_id, path)` pairs are
    /// ignored: the lease may have been reaped and reclaimed elsewhere.
    pub fn ack(&self, claim_id: &str, path: &Path, outcome: AckOutcome) -> Result<(), CanvasError> {
        let _guard = ArtifactLock::acquire(&self.dir.lock_path(), self.lock_wait)?;
        let mut entries = self.load()?;
        let now = now_s();

        let Some(idx) = entries.iter().position(|e| {
            e.path == path && e.claim_id.as_deref() == Some(claim_id)
        }) else {
            tracing::debug!(path = %path.display(), "ack for unknown claim, ignoring");
            return Ok(());
        };

        match outcome {
            AckOutcome::Ok | AckOutcome::Deleted => {
                entries.remove(idx);
            }
            AckOutcome::Deferred => {
                let entry = &mut entries[idx];
                entry.status = DirtyStatus::Pending;
                entry.reason = "deferred".to_string();
                entry.claim_id = None;
                entry.claimed_at = None;
                entry.updated_at = now;
            }
            AckOutcome::Error(message) => {
                let entry = &mut entries[idx];
                entry.status = DirtyStatus::Pending;
                entry.attempts += 1;
                entry.last_error = Some(message);
                entry.claim_id = None;
                entry.claimed_at = None;
                entry.updated_at = now;
            }
        }
        self.save(&entries)?;
        Ok(())
    }

    /// Pending entry count (after reaping), for status reporting.
    pub fn pending_len(&self) -> Result<usize, CanvasError> {
        let _guard = ArtifactLock::acquire(&self.dir.lock_path(), self.lock_wait)?;
        let mut entries = self.load()?;
        Self::reap(&mut entries, self.ttl, now_s());
        Ok(entries
            .iter()
            .filter(|e| e.status == DirtyStatus::Pending)
            .count())
    }

    /// Every entry, reaped view. For status reporting and tests.
    pub fn entries(&self) -> Result<Vec<DirtyEntry>, CanvasError> {
        let _guard = ArtifactLock::acquire(&self.dir.lock_path(), self.lock_wait)?;
        let mut entries = self.load()?;
        Self::reap(&mut entries, self.ttl, now_s());
        Ok(entries)
    }
}
