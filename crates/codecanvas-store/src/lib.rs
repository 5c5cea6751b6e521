//! Snapshot artifact store — digest-addressed files, cross-process locking,
//! and the persistent dirty queue

pub mod dirty;
pub mod lock;
pub mod paths;
pub mod prune;
pub mod publish;
pub mod warmup;

#[cfg(test)]
mod tests;

pub use dirty::{AckOutcome, DirtyEntry, DirtyQueue, DirtyStatus};
pub use lock::ArtifactLock;
pub use paths::ArtifactDir;
pub use prune::{clear_artifacts, prune_artifacts};
pub use publish::{load_call_edges, load_latest_meta, publish, write_call_edges, PublishInputs};
pub use warmup::{read_warmup, write_warmup, WarmupRecord};
