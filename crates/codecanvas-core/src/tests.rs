//! Unit tests for the core data model and snapshot identity

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::graph::Graph;
use crate::meta::{CallEdgeCache, CallEdgeRecord, ParseSummary};
use crate::model::{fnv1a32, EdgeKind, GraphNode, NodeId, NodeKind, SourceRange};
use crate::snapshot::{self, SnapshotConfig};

fn range(start_line: u32, end_line: u32) -> SourceRange {
    SourceRange::new(start_line, 0, end_line, 0)
}

#[test]
fn fnv1a32_matches_reference_vectors() {
    // Published FNV-1a test vectors.
    assert_eq!(fnv1a32(b""), 0x811c9dc5);
    assert_eq!(fnv1a32(b"a"), 0xe40c292c);
    assert_eq!(fnv1a32(b"foobar"), 0xbf9cf968);
}

#[test]
fn node_ids_are_stable_and_kind_prefixed() {
    let a = NodeId::func("src/a.py", "foo");
    let b = NodeId::func("src/a.py", "foo");
    assert_eq!(a, b);
    assert!(a.as_str().starts_with("fn_"));
    assert!(NodeId::module("src/a.py").as_str().starts_with("mod_"));
    assert!(NodeId::class("src/a.py", "C").as_str().starts_with("cls_"));
}

#[test]
fn node_id_changes_on_rename_or_move_only() {
    let base = NodeId::func("a.py", "Outer.m");
    // Different qualified name.
    assert_ne!(base, NodeId::func("a.py", "Outer.renamed"));
    // Different containing file label.
    assert_ne!(base, NodeId::func("b.py", "Outer.m"));
    // Same name and file: identical regardless of position, which is not an
    // identity input at all.
    assert_eq!(base, NodeId::func("a.py", "Outer.m"));
}

#[test]
fn call_edges_require_func_endpoints() {
    let mut g = Graph::new();
    let m = g.upsert_node(GraphNode::module("a.py", PathBuf::from("/w/a.py")));
    let f = g.upsert_node(GraphNode::func(
        "a.py",
        "foo",
        PathBuf::from("/w/a.py"),
        range(0, 2),
    ));
    assert!(!g.add_edge(&m, &f, EdgeKind::Call));
    assert!(g.add_edge(&f, &f, EdgeKind::Call), "self calls are allowed");
    assert_eq!(g.stats().call_edges, 1);
}

#[test]
fn contains_edges_respect_kind_pairs() {
    let mut g = Graph::new();
    let m = g.upsert_node(GraphNode::module("a.py", PathBuf::from("/w/a.py")));
    let c = g.upsert_node(GraphNode::class(
        "a.py",
        "C",
        PathBuf::from("/w/a.py"),
        range(0, 10),
    ));
    let f = g.upsert_node(GraphNode::func(
        "a.py",
        "C.m",
        PathBuf::from("/w/a.py"),
        range(1, 3),
    ));
    assert!(g.add_edge(&m, &c, EdgeKind::Contains));
    assert!(g.add_edge(&c, &f, EdgeKind::Contains));
    // Func can never contain anything.
    assert!(!g.add_edge(&f, &c, EdgeKind::Contains));
    // Import edges are module-to-module only.
    assert!(!g.add_edge(&m, &c, EdgeKind::Import));
}

#[test]
fn duplicate_edges_are_coalesced() {
    let mut g = Graph::new();
    let a = g.upsert_node(GraphNode::func(
        "a.py",
        "f",
        PathBuf::from("/w/a.py"),
        range(0, 2),
    ));
    let b = g.upsert_node(GraphNode::func(
        "a.py",
        "g",
        PathBuf::from("/w/a.py"),
        range(3, 5),
    ));
    assert!(g.add_edge(&a, &b, EdgeKind::Call));
    assert!(!g.add_edge(&a, &b, EdgeKind::Call));
    assert_eq!(g.edge_count(), 1);
}

#[test]
fn remove_file_drops_nodes_and_referencing_edges() {
    let mut g = Graph::new();
    let path_a = PathBuf::from("/w/a.py");
    let path_b = PathBuf::from("/w/b.py");
    let fa = g.upsert_node(GraphNode::func("a.py", "foo", path_a.clone(), range(0, 2)));
    let fb = g.upsert_node(GraphNode::func("b.py", "bar", path_b.clone(), range(0, 2)));
    g.add_edge(&fb, &fa, EdgeKind::Call);

    let removed = g.remove_file(&path_a);
    assert_eq!(removed, vec![fa.clone()]);
    assert!(!g.contains(&fa));
    assert!(g.contains(&fb));
    assert_eq!(g.edge_count(), 0, "edges referencing removed nodes go too");
}

#[test]
fn remove_outgoing_calls_keeps_incoming() {
    let mut g = Graph::new();
    let path_a = PathBuf::from("/w/a.py");
    let path_b = PathBuf::from("/w/b.py");
    let fa = g.upsert_node(GraphNode::func("a.py", "foo", path_a.clone(), range(0, 2)));
    let fb = g.upsert_node(GraphNode::func("b.py", "bar", path_b.clone(), range(0, 2)));
    g.add_edge(&fa, &fb, EdgeKind::Call);
    g.add_edge(&fb, &fa, EdgeKind::Call);

    assert_eq!(g.remove_outgoing_calls(&path_a), 1);
    assert!(!g.has_edge(&fa, &fb, EdgeKind::Call));
    assert!(g.has_edge(&fb, &fa, EdgeKind::Call));
}

#[test]
fn func_ranges_are_sorted_by_start() {
    let mut g = Graph::new();
    let path = PathBuf::from("/w/a.py");
    g.upsert_node(GraphNode::func("a.py", "late", path.clone(), range(20, 30)));
    g.upsert_node(GraphNode::func("a.py", "early", path.clone(), range(1, 5)));
    let spans = g.func_ranges(&path);
    assert_eq!(spans.len(), 2);
    assert!(spans[0].1.start_line < spans[1].1.start_line);
}

fn test_cfg() -> SnapshotConfig {
    SnapshotConfig {
        version: 1,
        lsp: false,
        lang_set: vec!["python".into()],
        label_strip_prefix: None,
    }
}

#[test]
fn merkle_root_is_deterministic_and_order_independent() {
    let items = vec![
        ("b.py".to_string(), [1u8; 32]),
        ("a.py".to_string(), [2u8; 32]),
        ("c.py".to_string(), [3u8; 32]),
    ];
    let mut reversed = items.clone();
    reversed.reverse();
    assert_eq!(snapshot::merkle_root(&items), snapshot::merkle_root(&reversed));
}

#[test]
fn merkle_empty_input_hashes_the_empty_sentinel() {
    // sha256("empty")
    assert_eq!(
        snapshot::merkle_root(&[]),
        "2e1cfa82b035c26cbbbdae632cea070514eb8b773f616aaeaf668e2f0be8f10d"
    );
}

#[test]
fn merkle_odd_counts_duplicate_the_tail() {
    let two = vec![
        ("a".to_string(), [1u8; 32]),
        ("b".to_string(), [2u8; 32]),
    ];
    let three = vec![
        ("a".to_string(), [1u8; 32]),
        ("b".to_string(), [2u8; 32]),
        ("c".to_string(), [3u8; 32]),
    ];
    assert_ne!(snapshot::merkle_root(&two), snapshot::merkle_root(&three));
}

#[test]
fn snapshot_digest_is_reproducible_for_unchanged_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.py");
    let b = dir.path().join("b.py");
    std::fs::write(&a, "def foo():\n    pass\n").unwrap();
    std::fs::write(&b, "from a import foo\n").unwrap();
    let files = vec![
        ("a.py".to_string(), a.clone()),
        ("b.py".to_string(), b.clone()),
    ];
    let first = snapshot::compute_snapshot(&files, None, &test_cfg());
    let second = snapshot::compute_snapshot(&files, Some(&first.leaves), &test_cfg());
    assert_eq!(first.root, second.root);
    assert_eq!(first.leaves, second.leaves);
}

#[test]
fn snapshot_digest_changes_with_content() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.py");
    std::fs::write(&a, "def foo():\n    pass\n").unwrap();
    let files = vec![("a.py".to_string(), a.clone())];
    let before = snapshot::compute_snapshot(&files, None, &test_cfg());
    std::fs::write(&a, "def foo():\n    return 1\n").unwrap();
    let after = snapshot::compute_snapshot(&files, None, &test_cfg());
    assert_ne!(before.root, after.root);
}

#[test]
fn snapshot_digest_changes_with_config() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.py");
    std::fs::write(&a, "def foo():\n    pass\n").unwrap();
    let files = vec![("a.py".to_string(), a.clone())];
    let base = snapshot::compute_snapshot(&files, None, &test_cfg());
    let mut other_cfg = test_cfg();
    other_cfg.lsp = true;
    let other = snapshot::compute_snapshot(&files, None, &other_cfg);
    assert_ne!(base.root, other.root);
}

#[test]
fn stale_leaves_are_detected() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.py");
    std::fs::write(&a, "x = 1\n").unwrap();
    let files = vec![("a.py".to_string(), a.clone())];
    let snap = snapshot::compute_snapshot(&files, None, &test_cfg());
    assert!(snapshot::leaves_unchanged(&snap.leaves));
    // Grow the file; the size component of the signature must flag it.
    std::fs::write(&a, "x = 1\ny = 2\n").unwrap();
    assert!(!snapshot::leaves_unchanged(&snap.leaves));
}

#[test]
fn quality_tuple_orders_lexicographically() {
    let mut better = ParseSummary {
        parsed_files: 10,
        skipped_files: 0,
        lsp_files: 5,
        tree_sitter_files: 5,
        lsp_failures: BTreeMap::new(),
    };
    let mut worse = better.clone();
    worse.lsp_files = 2;
    assert!(better.quality() > worse.quality());
    // Fewer skips beats more, even with identical parse counts.
    worse = better.clone();
    worse.skipped_files = 3;
    assert!(better.quality() > worse.quality());
    // More parsed files dominates everything downstream.
    better.parsed_files = 11;
    better.lsp_files = 0;
    assert!(better.quality() > worse.quality());
}

#[test]
fn call_edge_cache_extends_without_duplicates() {
    let mut cache = CallEdgeCache::new(
        "d1",
        vec![CallEdgeRecord {
            from: "fn_1".into(),
            to: "fn_2".into(),
        }],
        true,
    );
    cache.extend_with(vec![
        CallEdgeRecord {
            from: "fn_1".into(),
            to: "fn_2".into(),
        },
        CallEdgeRecord {
            from: "fn_2".into(),
            to: "fn_3".into(),
        },
    ]);
    assert_eq!(cache.edges.len(), 2);
    assert_eq!(cache.graph_digest, "d1");
}

#[test]
fn artifact_dir_uses_explicit_override() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = crate::config::CanvasConfig {
        artifact_root: Some(dir.path().to_path_buf()),
        ..Default::default()
    };
    let project = PathBuf::from("/work/demo");
    let resolved = cfg.artifact_dir(&project).unwrap();
    assert!(resolved.starts_with(dir.path()));
    let name = resolved.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("demo-"));
    // Stable for the same project path.
    assert_eq!(resolved, cfg.artifact_dir(&project).unwrap());
}

#[test]
fn config_file_overrides_merge_onto_defaults() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("codecanvas.toml"),
        "use_lsp = false\nforeground_budget_ms = 100\nlsp_langs = [\"python\"]\n",
    )
    .unwrap();

    let cfg = crate::config::CanvasConfig::load(dir.path()).unwrap();
    assert!(!cfg.use_lsp);
    assert_eq!(cfg.foreground_budget, std::time::Duration::from_millis(100));
    assert_eq!(cfg.lsp_langs, vec!["python".to_string()]);
    // Untouched fields keep their defaults.
    assert_eq!(cfg.definition_pool, 16);
    assert_eq!(cfg.claim_batch, 16);
}

#[test]
fn missing_config_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = crate::config::CanvasConfig::load(dir.path()).unwrap();
    assert!(cfg.use_lsp);
    assert_eq!(cfg.max_file_size, 2_000_000);
}

#[test]
fn malformed_config_is_a_typed_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("codecanvas.toml"), "use_lsp = \"maybe\"\n").unwrap();
    match crate::config::CanvasConfig::load(dir.path()) {
        Err(crate::CanvasError::Config(msg)) => assert!(msg.contains("codecanvas.toml")),
        other => panic!("expected Config error, got {other:?}"),
    }
}

#[test]
fn custom_lsp_servers_parse_from_config() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("codecanvas.toml"),
        r#"
[[custom_lsp]]
lang = "zig"
command = ["zls"]
root_markers = ["build.zig"]

[[custom_lsp]]
lang = "ruby"
command = ["solargraph", "stdio"]
language_id = "ruby"
"#,
    )
    .unwrap();

    let cfg = crate::config::CanvasConfig::load(dir.path()).unwrap();
    assert_eq!(cfg.custom_lsp.len(), 2);
    assert_eq!(cfg.custom_lsp[0].lang, "zig");
    assert_eq!(cfg.custom_lsp[0].command, vec!["zls".to_string()]);
    assert_eq!(cfg.custom_lsp[0].root_markers, vec!["build.zig".to_string()]);
    assert_eq!(cfg.custom_lsp[1].language_id.as_deref(), Some("ruby"));
}

#[test]
fn empty_workspace_digest_combines_sentinel_and_config_leaf() {
    let snap = snapshot::compute_snapshot(&[], None, &test_cfg());
    assert!(snap.leaves.is_empty());

    // D for a workspace with no module files is the pairwise combine of the
    // config leaf (reserved key, sorts first) with the sha256("empty")
    // sentinel — never the bare config leaf.
    use sha2::{Digest, Sha256};
    fn unhex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }
    let sentinel: [u8; 32] = Sha256::digest(b"empty").into();
    let mut combined = Sha256::new();
    combined.update(b"node\0");
    combined.update(unhex(&snap.config_leaf));
    combined.update(sentinel);
    let expected: String = combined
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();

    assert_eq!(snap.root, expected);
    assert_ne!(
        snap.root, snap.config_leaf,
        "the config leaf must never stand in for the digest"
    );

    // Deterministic across recomputation, and sensitive to config.
    assert_eq!(snap.root, snapshot::compute_snapshot(&[], None, &test_cfg()).root);
    let mut other_cfg = test_cfg();
    other_cfg.lsp = true;
    assert_ne!(snap.root, snapshot::compute_snapshot(&[], None, &other_cfg).root);
}
