//! The budgeted resolver pass

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use tokio::sync::Semaphore;
use tokio::time::Instant;

use codecanvas_core::{NodeId, SourcePos};

use crate::cancel::CancelFlag;
use crate::provider::DefinitionProvider;
use crate::range_index::RangeIndex;

/// One unresolved call site: the file it lives in and the position of the
/// call-target token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PendingSite {
    pub file: PathBuf,
    pub pos: SourcePos,
}

/// Result of one pass. `deferred` counts sites the budget or a cancel left
/// unprocessed; those stay queued for the next pass.
#[derive(Debug, Clone, Default)]
pub struct ResolveOutcome {
    pub edges: Vec<(NodeId, NodeId)>,
    /// Sites whose lookup completed (even when no edge came of it).
    pub resolved: Vec<PendingSite>,
    pub deferred: usize,
}

impl ResolveOutcome {
    pub fn partial(&self) -> bool {
        self.deferred > 0
    }
}

/// Runs definition lookups for call sites concurrently and maps results to
/// caller→callee FUNC pairs.
pub struct CallResolver<P: ?Sized> {
    provider: Arc<P>,
    pool_width: usize,
}

impl<P: DefinitionProvider + ?Sized + 'static> CallResolver<P> {
    pub fn new(provider: Arc<P>, pool_width: usize) -> Self {
        CallResolver {
            provider,
            pool_width: pool_width.max(1),
        }
    }

    /// Resolve as many of `sites` as `budget` allows.
    ///
    /// Lookups overlap across a pool of `pool_width` permits; serializing
    /// them would blow the foreground budget before the first file finished.
    /// When the deadline or `cancel` fires, in-flight lookups are drained,
    /// their edges kept, and the remainder counted as deferred.
    pub async fn resolve(
        &self,
        index: &RangeIndex,
        sites: Vec<PendingSite>,
        budget: Duration,
        cancel: &CancelFlag,
    ) -> ResolveOutcome {
        let deadline = Instant::now() + budget;
        let total = sites.len();
        let semaphore = Arc::new(Semaphore::new(self.pool_width));

        let mut lookups = stream::iter(sites.into_iter().map(|site| {
            let provider = Arc::clone(&self.provider);
            let semaphore = Arc::clone(&semaphore);
            async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return (site, Vec::new());
                };
                match provider.definitions(&site.file, site.pos).await {
                    Ok(locations) => (site, locations),
                    Err(e) => {
                        tracing::debug!(
                            file = %site.file.display(),
                            error = %e,
                            "definition lookup failed"
                        );
                        (site, Vec::new())
                    }
                }
            }
        }))
        // Buffer beyond the semaphore so permit handoff never idles the pool.
        .buffer_unordered(self.pool_width * 2);

        let mut edges: Vec<(NodeId, NodeId)> = Vec::new();
        let mut seen: HashSet<(NodeId, NodeId)> = HashSet::new();
        let mut resolved: Vec<PendingSite> = Vec::new();

        let mut record = |site: PendingSite, locations: Vec<(PathBuf, SourcePos)>| {
            // The call site must sit inside a known function; sites outside
            // any FUNC are silently skipped.
            if let Some(caller) = index.enclosing(&site.file, site.pos) {
                // Every returned definition location produces an edge;
                // locations in files outside the graph drop out in
                // `enclosing`.
                for (path, pos) in locations {
                    let Some(callee) = index.enclosing(&path, pos) else {
                        continue;
                    };
                    let pair = (caller.clone(), callee.clone());
                    if seen.insert(pair.clone()) {
                        edges.push(pair);
                    }
                }
            }
            resolved.push(site);
        };

        let mut expired = false;
        while !expired && !cancel.is_cancelled() {
            let next = tokio::select! {
                biased;
                _ = tokio::time::sleep_until(deadline) => {
                    expired = true;
                    None
                }
                item = lookups.next() => item,
            };
            match next {
                Some((site, locations)) => record(site, locations),
                None => break,
            }
        }

        // Keep whatever already finished while we were timing out; only
        // never-started lookups count as deferred.
        use futures_util::FutureExt;
        while let Some(Some((site, locations))) = lookups.next().now_or_never() {
            record(site, locations);
        }
        drop(lookups);

        let deferred = total - resolved.len();
        if deferred > 0 {
            tracing::debug!(resolved = resolved.len(), deferred, "resolver budget exhausted");
        }
        ResolveOutcome {
            edges,
            resolved,
            deferred,
        }
    }
}
