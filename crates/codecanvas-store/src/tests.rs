//! Unit tests for publication, cache loading, and the dirty queue

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use codecanvas_core::meta::{
    ArchitectureMeta, GraphMeta, GraphSection, MerkleMeta, ParseSummary, ParserMeta, UpdatedBy,
};
use codecanvas_core::snapshot::{self, SnapshotConfig, SnapshotInputs};
use codecanvas_core::{now_s, CallEdgeCache, CanvasError, GraphStats};

use crate::dirty::{AckOutcome, DirtyQueue, DirtyStatus};
use crate::paths::ArtifactDir;
use crate::publish::{load_call_edges, load_latest_meta, publish, write_call_edges, PublishInputs};

const WAIT: Duration = Duration::from_secs(2);

fn snap_cfg() -> SnapshotConfig {
    SnapshotConfig {
        version: 1,
        lsp: false,
        lang_set: vec!["python".into()],
        label_strip_prefix: None,
    }
}

fn meta_from(project: &Path, snap: &SnapshotInputs, summary: ParseSummary) -> GraphMeta {
    GraphMeta {
        version: 1,
        project_path: project.to_path_buf(),
        generated_at: now_s(),
        parser: ParserMeta {
            use_lsp: false,
            lsp_langs: Vec::new(),
            label_strip_prefix: None,
        },
        merkle: MerkleMeta {
            algo: "sha256".into(),
            root: snap.root.clone(),
            leaf_count: snap.leaves.len() + 1,
            leaves: snap.leaves.clone(),
            config_leaf: snap.config_leaf.clone(),
        },
        graph: GraphSection {
            digest: snap.root.clone(),
            stats: GraphStats::default(),
            parse_summary: summary,
            symbol_files: BTreeMap::new(),
        },
        architecture: ArchitectureMeta {
            latest_png: "architecture.png".into(),
            digest_png: format!("architecture.{}.png", snap.root),
            digest: snap.root.clone(),
            rendered_at: now_s(),
        },
        updated_by: UpdatedBy {
            pid: std::process::id(),
            action: "init".into(),
        },
    }
}

fn workspace_with_file(content: &str) -> (tempfile::TempDir, PathBuf, SnapshotInputs) {
    let ws = tempfile::tempdir().unwrap();
    let file = ws.path().join("a.py");
    std::fs::write(&file, content).unwrap();
    let files = vec![("a.py".to_string(), file.clone())];
    let snap = snapshot::compute_snapshot(&files, None, &snap_cfg());
    (ws, file, snap)
}

fn inputs_for(project: &Path, snap: &SnapshotInputs, summary: ParseSummary) -> PublishInputs {
    PublishInputs {
        meta: meta_from(project, snap, summary),
        image: b"digraph g {}".to_vec(),
        call_edges: CallEdgeCache::new(&snap.root, Vec::new(), false),
    }
}

#[test]
fn publish_then_load_round_trips_the_meta() {
    let (ws, _file, snap) = workspace_with_file("def foo():\n    pass\n");
    let (_tmp, dir) = artifact_dir();
    let inputs = inputs_for(ws.path(), &snap, ParseSummary::default());

    publish(&dir, WAIT, &inputs).unwrap();

    let loaded = load_latest_meta(&dir).unwrap().expect("latest meta");
    assert_eq!(loaded, inputs.meta);
    assert!(dir.graph_meta_digest(&snap.root).exists());
    assert!(dir.architecture_digest(&snap.root).exists());
    assert!(dir.call_edges_digest(&snap.root).exists());
}

#[test]
fn stale_compute_aborts_without_touching_latest() {
    let (ws, file, snap) = workspace_with_file("def foo():\n    pass\n");
    let (_tmp, dir) = artifact_dir();

    // First snapshot goes out cleanly.
    let first = inputs_for(ws.path(), &snap, ParseSummary::default());
    publish(&dir, WAIT, &first).unwrap();

    // Second compute, then the file changes before commit.
    let files = vec![("a.py".to_string(), file.clone())];
    let snap2 = snapshot::compute_snapshot(&files, None, &snap_cfg());
    std::fs::write(&file, "def foo():\n    return 2\n").unwrap();
    let stale = inputs_for(ws.path(), &snap2, ParseSummary::default());

    match publish(&dir, WAIT, &stale) {
        Err(CanvasError::StaleCompute) => {}
        other => panic!("expected StaleCompute, got {other:?}"),
    }
    let latest = load_latest_meta(&dir).unwrap().unwrap();
    assert_eq!(latest.digest(), first.meta.digest());
}

#[test]
fn quality_gate_refuses_strictly_worse_same_digest() {
    let (ws, _file, snap) = workspace_with_file("def foo():\n    pass\n");
    let (_tmp, dir) = artifact_dir();

    let rich = ParseSummary {
        parsed_files: 1,
        lsp_files: 1,
        ..Default::default()
    };
    publish(&dir, WAIT, &inputs_for(ws.path(), &snap, rich.clone())).unwrap();

    let poor = ParseSummary {
        parsed_files: 1,
        lsp_files: 0,
        tree_sitter_files: 1,
        ..Default::default()
    };
    match publish(&dir, WAIT, &inputs_for(ws.path(), &snap, poor)) {
        Err(CanvasError::QualityRegression(d)) => assert_eq!(d, snap.root),
        other => panic!("expected QualityRegression, got {other:?}"),
    }
    // The richer snapshot is still what readers see.
    let latest = load_latest_meta(&dir).unwrap().unwrap();
    assert_eq!(latest.graph.parse_summary, rich);

    // Equal quality may overwrite (fresh generated_at wins no gate).
    publish(&dir, WAIT, &inputs_for(ws.path(), &snap, rich)).unwrap();
}

#[test]
fn call_edge_cache_rejects_mismatched_digest() {
    let (ws, _file, snap) = workspace_with_file("def foo():\n    pass\n");
    let (_tmp, dir) = artifact_dir();
    publish(&dir, WAIT, &inputs_for(ws.path(), &snap, ParseSummary::default())).unwrap();

    assert!(load_call_edges(&dir, &snap.root).unwrap().is_some());
    // Loading under a different digest finds nothing.
    assert!(load_call_edges(&dir, "feedbeef").unwrap().is_none());

    // A cache file whose recorded digest disagrees with its address is
    // rejected outright.
    let forged = CallEdgeCache::new("other-digest", Vec::new(), false);
    std::fs::write(
        dir.call_edges_digest(&snap.root),
        serde_json::to_vec(&forged).unwrap(),
    )
    .unwrap();
    assert!(load_call_edges(&dir, &snap.root).unwrap().is_none());
}

#[test]
fn call_edge_writes_update_latest_only_for_current_digest() {
    let (ws, _file, snap) = workspace_with_file("def foo():\n    pass\n");
    let (_tmp, dir) = artifact_dir();
    publish(&dir, WAIT, &inputs_for(ws.path(), &snap, ParseSummary::default())).unwrap();

    // A pass for some older digest persists its cache but must not clobber
    // the latest pointer.
    let stale_cache = CallEdgeCache::new("00000000", Vec::new(), true);
    write_call_edges(&dir, WAIT, &stale_cache).unwrap();
    let latest: CallEdgeCache =
        serde_json::from_slice(&std::fs::read(dir.call_edges_latest()).unwrap()).unwrap();
    assert_eq!(latest.graph_digest, snap.root);

    // A pass for the current digest refreshes both.
    let current = CallEdgeCache::new(&snap.root, Vec::new(), false);
    write_call_edges(&dir, WAIT, &current).unwrap();
    let latest: CallEdgeCache =
        serde_json::from_slice(&std::fs::read(dir.call_edges_latest()).unwrap()).unwrap();
    assert_eq!(latest.instance_id, current.instance_id);
}

fn queue(dir: &ArtifactDir, ttl: Duration) -> DirtyQueue {
    DirtyQueue::new(dir.clone(), ttl, WAIT)
}

fn artifact_dir() -> (tempfile::TempDir, ArtifactDir) {
    let tmp = tempfile::tempdir().unwrap();
    let dir = ArtifactDir::open(tmp.path().join("artifacts")).unwrap();
    (tmp, dir)
}

#[test]
fn mark_claim_ack_removes_exactly_the_marked_set() {
    let (_tmp, dir) = artifact_dir();
    let q = queue(&dir, Duration::from_secs(60));

    let paths = vec![PathBuf::from("/w/a.py"), PathBuf::from("/w/b.py")];
    assert_eq!(q.mark(&paths, "edit").unwrap(), 2);

    let claimed = q.claim(10).unwrap();
    assert_eq!(claimed.len(), 2);
    let claim_id = claimed[0].claim_id.clone().unwrap();
    assert!(claimed.iter().all(|e| e.status == DirtyStatus::InProgress));
    assert!(claimed.iter().all(|e| e.claim_id.as_deref() == Some(claim_id.as_str())));

    for entry in &claimed {
        q.ack(&claim_id, &entry.path, AckOutcome::Ok).unwrap();
    }
    assert_eq!(q.pending_len().unwrap(), 0);
    assert!(q.entries().unwrap().is_empty());
}

#[test]
fn claims_are_exclusive_across_queue_handles() {
    let (_tmp, dir) = artifact_dir();
    // Two handles over the same artifact dir model two host processes.
    let p1 = queue(&dir, Duration::from_secs(60));
    let p2 = queue(&dir, Duration::from_secs(60));

    let paths = vec![PathBuf::from("/w/a.py")];
    p1.mark(&paths, "edit").unwrap();
    p2.mark(&paths, "edit").unwrap();
    // Double marking coalesces to a single entry.
    assert_eq!(p1.entries().unwrap().len(), 1);

    let claimed = p1.claim(1).unwrap();
    assert_eq!(claimed.len(), 1);
    // The other process sees nothing claimable.
    assert!(p2.claim(1).unwrap().is_empty());
}

#[test]
fn deferred_and_error_outcomes_return_to_pending() {
    let (_tmp, dir) = artifact_dir();
    let q = queue(&dir, Duration::from_secs(60));
    q.mark(&[PathBuf::from("/w/a.py")], "edit").unwrap();

    let claimed = q.claim(1).unwrap();
    let claim_id = claimed[0].claim_id.clone().unwrap();
    q.ack(&claim_id, &claimed[0].path, AckOutcome::Deferred).unwrap();
    let entries = q.entries().unwrap();
    assert_eq!(entries[0].status, DirtyStatus::Pending);
    assert_eq!(entries[0].reason, "deferred");

    let claimed = q.claim(1).unwrap();
    let claim_id = claimed[0].claim_id.clone().unwrap();
    q.ack(&claim_id, &claimed[0].path, AckOutcome::Error("boom".into()))
        .unwrap();
    let entries = q.entries().unwrap();
    assert_eq!(entries[0].status, DirtyStatus::Pending);
    assert_eq!(entries[0].attempts, 1);
    assert_eq!(entries[0].last_error.as_deref(), Some("boom"));
}

#[test]
fn reaper_returns_expired_claims_to_pending() {
    let (_tmp, dir) = artifact_dir();
    let q = queue(&dir, Duration::from_millis(10));
    q.mark(&[PathBuf::from("/w/a.py")], "edit").unwrap();

    // Claim, then "crash" without acking.
    let claimed = q.claim(1).unwrap();
    assert_eq!(claimed.len(), 1);
    std::thread::sleep(Duration::from_millis(30));

    // A later process gets the same path back.
    let reclaimed = q.claim(1).unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].path, claimed[0].path);
    assert_ne!(reclaimed[0].claim_id, claimed[0].claim_id);
}

#[test]
fn acks_from_reaped_claims_are_ignored() {
    let (_tmp, dir) = artifact_dir();
    let q = queue(&dir, Duration::from_millis(10));
    q.mark(&[PathBuf::from("/w/a.py")], "edit").unwrap();

    let old = q.claim(1).unwrap();
    let old_claim = old[0].claim_id.clone().unwrap();
    std::thread::sleep(Duration::from_millis(30));
    let fresh = q.claim(1).unwrap();
    assert_eq!(fresh.len(), 1);

    // The zombie's ack must not remove the entry now owned by `fresh`.
    q.ack(&old_claim, &old[0].path, AckOutcome::Ok).unwrap();
    assert_eq!(q.entries().unwrap().len(), 1);
}

#[test]
fn marking_keeps_active_claims_intact() {
    let (_tmp, dir) = artifact_dir();
    let q = queue(&dir, Duration::from_secs(60));
    let path = PathBuf::from("/w/a.py");
    q.mark(&[path.clone()], "edit").unwrap();
    let claimed = q.claim(1).unwrap();
    assert_eq!(claimed.len(), 1);

    // Re-marking while claimed refreshes metadata but leaves the lease.
    q.mark(&[path], "edit-again").unwrap();
    let entries = q.entries().unwrap();
    assert_eq!(entries[0].status, DirtyStatus::InProgress);
    assert_eq!(entries[0].reason, "edit-again");
    assert!(entries[0].claim_id.is_some());
}

#[test]
fn pruning_keeps_the_referenced_digest() {
    let (ws, file, snap1) = workspace_with_file("def foo():\n    pass\n");
    let (_tmp, dir) = artifact_dir();
    publish(&dir, WAIT, &inputs_for(ws.path(), &snap1, ParseSummary::default())).unwrap();

    // Second snapshot becomes current; the first is now prunable.
    std::fs::write(&file, "def foo():\n    return 2\n").unwrap();
    let files = vec![("a.py".to_string(), file.clone())];
    let snap2 = snapshot::compute_snapshot(&files, None, &snap_cfg());
    publish(&dir, WAIT, &inputs_for(ws.path(), &snap2, ParseSummary::default())).unwrap();

    let removed = crate::prune::prune_artifacts(&dir, WAIT, 0).unwrap();
    assert_eq!(removed, 3, "meta + image + cache of the old digest");
    assert!(!dir.graph_meta_digest(&snap1.root).exists());
    assert!(dir.graph_meta_digest(&snap2.root).exists());
    assert!(dir.call_edges_digest(&snap2.root).exists());

    // Idempotent: nothing further to remove.
    assert_eq!(crate::prune::prune_artifacts(&dir, WAIT, 0).unwrap(), 0);
}
