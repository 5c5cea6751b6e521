//! Integration tests for CodeCanvas
//!
//! Multi-process scenarios driven through two service instances sharing one
//! artifact directory, with a stub definition provider standing in for live
//! language servers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use codecanvas_core::{CanvasConfig, CanvasError, EdgeKind, NodeId, SourcePos};
use codecanvas_engine::Canvas;
use codecanvas_resolver::DefinitionProvider;
use codecanvas_store::{load_call_edges, load_latest_meta, AckOutcome, DirtyQueue};

/// Answers every lookup in a file with a fixed set of definition locations.
struct FileProvider {
    answers: Mutex<HashMap<PathBuf, Vec<(PathBuf, SourcePos)>>>,
}

impl FileProvider {
    fn new() -> Arc<Self> {
        Arc::new(FileProvider {
            answers: Mutex::new(HashMap::new()),
        })
    }

    fn set(&self, file: &Path, defs: Vec<(PathBuf, SourcePos)>) {
        self.answers
            .lock()
            .unwrap()
            .insert(file.to_path_buf(), defs);
    }
}

#[async_trait]
impl DefinitionProvider for FileProvider {
    async fn definitions(
        &self,
        path: &Path,
        _pos: SourcePos,
    ) -> Result<Vec<(PathBuf, SourcePos)>, CanvasError> {
        Ok(self
            .answers
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .unwrap_or_default())
    }
}

fn config(artifacts: &Path) -> CanvasConfig {
    CanvasConfig {
        use_lsp: false,
        artifact_root: Some(artifacts.to_path_buf()),
        ..Default::default()
    }
}

fn three_file_project() -> (tempfile::TempDir, PathBuf) {
    let ws = tempfile::tempdir().unwrap();
    std::fs::write(ws.path().join("a.py"), "def foo():\n    pass\n").unwrap();
    std::fs::write(
        ws.path().join("b.py"),
        "from a import foo\n\ndef bar():\n    foo()\n",
    )
    .unwrap();
    std::fs::write(ws.path().join("c.py"), "").unwrap();
    let root = std::fs::canonicalize(ws.path()).unwrap();
    (ws, root)
}

fn canvas(ws: &Path, artifacts: &Path, provider: Arc<FileProvider>) -> Arc<Canvas> {
    Arc::new(
        Canvas::new(ws, config(artifacts))
            .unwrap()
            .with_provider(provider),
    )
}

#[tokio::test]
async fn cold_init_publishes_schema_complete_artifacts() {
    let (ws, root) = three_file_project();
    let artifacts = tempfile::tempdir().unwrap();

    let provider = FileProvider::new();
    provider.set(&root.join("b.py"), vec![(root.join("a.py"), SourcePos::new(0, 4))]);

    let service = canvas(ws.path(), artifacts.path(), provider);
    let summary = service.init().await.unwrap();
    service.join_background().await;

    assert_eq!(summary.parsed_files, 3);
    assert_eq!(summary.skipped_files, 0);

    let (_, digest) = service.graph_snapshot().await;
    let meta = load_latest_meta(service.artifact_dir()).unwrap().unwrap();

    // The published record is digest-consistent end to end.
    assert_eq!(meta.version, 1);
    assert_eq!(meta.merkle.algo, "sha256");
    assert_eq!(meta.merkle.root, digest);
    assert_eq!(meta.graph.digest, digest);
    assert_eq!(meta.architecture.digest, digest);
    assert_eq!(meta.graph.stats.modules, 3);
    assert_eq!(meta.graph.stats.call_edges, 1);
    assert_eq!(meta.merkle.leaves.len(), 3);
    assert!(meta.merkle.leaves.contains_key("a.py"));
    assert_eq!(meta.updated_by.pid, std::process::id());

    // The call-edge cache matches the current snapshot.
    let cache = load_call_edges(service.artifact_dir(), &digest)
        .unwrap()
        .expect("cache for current digest");
    assert_eq!(cache.version, 3);
    assert_eq!(cache.graph_digest, digest);
    assert!(!cache.partial);
    assert_eq!(cache.edges.len(), 1);
    assert_eq!(cache.edges[0].from, NodeId::func("b.py", "bar").to_string());
    assert_eq!(cache.edges[0].to, NodeId::func("a.py", "foo").to_string());

    service.shutdown().await;
}

#[tokio::test]
async fn concurrent_marking_claims_exactly_once() {
    let (ws, root) = three_file_project();
    let artifacts = tempfile::tempdir().unwrap();

    let p1 = canvas(ws.path(), artifacts.path(), FileProvider::new());
    p1.init().await.unwrap();
    p1.join_background().await;
    let p2 = canvas(ws.path(), artifacts.path(), FileProvider::new());
    p2.ensure_loaded().await.unwrap();

    // Both processes notice the same external edit.
    std::fs::write(root.join("a.py"), "def foo():\n    return 1\n").unwrap();
    p1.mark_dirty(vec![root.join("a.py")], "edit").await.unwrap();
    p2.mark_dirty(vec![root.join("a.py")], "edit").await.unwrap();

    // Exactly one refresh claims the entry; the other finds nothing pending.
    let s1 = p1.refresh().await.unwrap();
    assert_eq!(s1.claimed, 1);
    assert_eq!(s1.reparsed, 1);
    let s2 = p2.refresh().await.unwrap();
    assert_eq!(s2.claimed, 0);

    p1.shutdown().await;
    p2.shutdown().await;
}

#[tokio::test]
async fn crash_between_claim_and_ack_is_recovered_by_the_reaper() {
    let (ws, root) = three_file_project();
    let artifacts = tempfile::tempdir().unwrap();

    let service = canvas(ws.path(), artifacts.path(), FileProvider::new());
    service.init().await.unwrap();
    service.join_background().await;
    let (_, digest_before) = service.graph_snapshot().await;

    // A doomed process claims the entry and dies before acking. Model it
    // with a raw queue handle over the same artifact directory.
    let ttl = Duration::from_millis(20);
    let queue = DirtyQueue::new(service.artifact_dir().clone(), ttl, Duration::from_secs(2));
    queue.mark(&[root.join("a.py")], "edit").unwrap();
    let doomed = queue.claim(1).unwrap();
    assert_eq!(doomed.len(), 1);

    // The claim expires; a healthy process gets the same path back.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let recovered = queue.claim(1).unwrap();
    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].path, root.join("a.py"));

    // On-disk state still references the pre-crash snapshot.
    let meta = load_latest_meta(service.artifact_dir()).unwrap().unwrap();
    assert_eq!(meta.digest(), digest_before);

    let claim_id = recovered[0].claim_id.clone().unwrap();
    queue
        .ack(&claim_id, &recovered[0].path, AckOutcome::Ok)
        .unwrap();
    service.shutdown().await;
}

#[tokio::test]
async fn edits_move_the_digest_but_not_function_ids() {
    let (ws, root) = three_file_project();
    let artifacts = tempfile::tempdir().unwrap();

    let provider = FileProvider::new();
    provider.set(&root.join("b.py"), vec![(root.join("a.py"), SourcePos::new(0, 4))]);
    let service = canvas(ws.path(), artifacts.path(), provider);
    service.init().await.unwrap();
    service.join_background().await;
    let (graph_before, digest_before) = service.graph_snapshot().await;
    let foo = NodeId::func("a.py", "foo");
    assert!(graph_before.contains(&foo));

    std::fs::write(root.join("a.py"), "def foo():\n    return 42\n").unwrap();
    service
        .mark_dirty(vec![root.join("a.py")], "edit")
        .await
        .unwrap();
    let summary = service.refresh().await.unwrap();
    assert_ne!(summary.digest, digest_before);

    let (graph_after, _) = service.graph_snapshot().await;
    assert!(graph_after.contains(&foo));
    assert!(graph_after.has_edge(&NodeId::func("b.py", "bar"), &foo, EdgeKind::Call));

    service.shutdown().await;
}
