//! Filesystem watcher bridge
//!
//! Translates external-editor filesystem events into dirty-queue marks and
//! periodic refresh drains. The core never requires the watcher; short-lived
//! hosts can rely on explicit `mark_dirty` calls instead.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use codecanvas_core::Result;
use codecanvas_extract::Lang;
use codecanvas_resolver::CancelFlag;

use crate::service::Canvas;
use crate::walker;

/// Quiet window after the last event before a batch is flushed.
const DEBOUNCE: Duration = Duration::from_millis(250);

pub struct CanvasWatcher {
    watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<PathBuf>,
}

fn relevant(path: &Path) -> bool {
    if Lang::from_path(path).is_none() {
        return false;
    }
    !path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .map(walker::is_pruned_dir)
            .unwrap_or(false)
    })
}

impl CanvasWatcher {
    pub fn new(root: &Path) -> notify::Result<Self> {
        let (tx, events) = mpsc::unbounded_channel();
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    if matches!(
                        event.kind,
                        notify::EventKind::Create(_)
                            | notify::EventKind::Modify(_)
                            | notify::EventKind::Remove(_)
                    ) {
                        for path in event.paths {
                            if relevant(&path) {
                                let _ = tx.send(path);
                            }
                        }
                    }
                }
                Err(e) => tracing::error!(error = %e, "filesystem watch error"),
            })?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        tracing::info!(root = %root.display(), "watching for external edits");
        Ok(CanvasWatcher { watcher, events })
    }

    /// Collect events into debounced batches, mark them dirty, and drain the
    /// queue. Runs until `cancel` fires.
    pub async fn run(mut self, canvas: Arc<Canvas>, cancel: CancelFlag) -> Result<()> {
        loop {
            let first = tokio::select! {
                event = self.events.recv() => event,
                _ = tokio::time::sleep(Duration::from_millis(200)) => {
                    if cancel.is_cancelled() {
                        break;
                    }
                    continue;
                }
            };
            let Some(first) = first else { break };

            // Absorb the burst: editors typically touch several files at once.
            let mut batch: HashSet<PathBuf> = HashSet::from([first]);
            loop {
                match tokio::time::timeout(DEBOUNCE, self.events.recv()).await {
                    Ok(Some(path)) => {
                        batch.insert(path);
                    }
                    Ok(None) | Err(_) => break,
                }
            }

            let paths: Vec<PathBuf> = batch.into_iter().collect();
            tracing::debug!(count = paths.len(), "external edits detected");
            canvas.mark_dirty(paths, "fs-event").await?;
            let summary = canvas.refresh().await?;
            if summary.claimed > 0 {
                tracing::info!(
                    claimed = summary.claimed,
                    reparsed = summary.reparsed,
                    deleted = summary.deleted,
                    digest = %summary.digest,
                    "refresh applied"
                );
            }
            if cancel.is_cancelled() {
                break;
            }
        }
        drop(self.watcher);
        Ok(())
    }
}
