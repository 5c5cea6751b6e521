//! Cross-process advisory lock
//!
//! A single file lock covers every artifact write and dirty-queue mutation.
//! Readers never take it. Writers wait a bounded time; on failure the caller
//! keeps its computed result for a later pass rather than regressing disk
//! state.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::time::{Duration, Instant};

use fs2::FileExt;

use codecanvas_core::CanvasError;

/// RAII guard over the artifact lock file. Unlocks on drop.
pub struct ArtifactLock {
    file: File,
}

impl ArtifactLock {
    /// Acquire the exclusive lock, polling until `wait` elapses.
    pub fn acquire(path: &Path, wait: Duration) -> Result<Self, CanvasError> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        let deadline = Instant::now() + wait;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(ArtifactLock { file }),
                Err(_) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(25));
                }
                Err(_) => {
                    tracing::debug!(path = %path.display(), "artifact lock busy");
                    return Err(CanvasError::LockBusy);
                }
            }
        }
    }
}

impl Drop for ArtifactLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}
