//! Published artifact schemas
//!
//! `GraphMeta` is the immutable per-digest snapshot record; `CallEdgeCache`
//! is the snapshot-scoped call-edge cache. Both serialize to the exact JSON
//! layout the artifact directory exposes to consumers.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::graph::GraphStats;
use crate::model::{now_s, GraphEdge};
use crate::snapshot::ModuleLeaf;

pub const META_VERSION: u32 = 1;
pub const CALL_EDGE_CACHE_VERSION: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParserMeta {
    pub use_lsp: bool,
    pub lsp_langs: Vec<String>,
    pub label_strip_prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerkleMeta {
    pub algo: String,
    pub root: String,
    pub leaf_count: usize,
    pub leaves: BTreeMap<String, ModuleLeaf>,
    pub config_leaf: String,
}

/// Per-file parse accounting, also the quality gate input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseSummary {
    pub parsed_files: usize,
    pub skipped_files: usize,
    pub lsp_files: usize,
    pub tree_sitter_files: usize,
    #[serde(default)]
    pub lsp_failures: BTreeMap<String, usize>,
}

impl ParseSummary {
    /// Lexicographic quality tuple: more parsed files beat fewer, fewer skips
    /// beat more, then LSP coverage, then tree-sitter coverage.
    pub fn quality(&self) -> (i64, i64, i64, i64) {
        (
            self.parsed_files as i64,
            -(self.skipped_files as i64),
            self.lsp_files as i64,
            self.tree_sitter_files as i64,
        )
    }

    pub fn record_lsp_failure(&mut self, reason: &str) {
        *self.lsp_failures.entry(reason.to_string()).or_default() += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSection {
    /// Equals `merkle.root`.
    pub digest: String,
    pub stats: GraphStats,
    pub parse_summary: ParseSummary,
    pub symbol_files: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureMeta {
    pub latest_png: String,
    pub digest_png: String,
    pub digest: String,
    pub rendered_at: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatedBy {
    pub pid: u32,
    /// One of "init", "load", "refresh".
    pub action: String,
}

/// The snapshot record published as `graph_meta.<D>.json` (and copied to the
/// `graph_meta.json` latest pointer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphMeta {
    pub version: u32,
    pub project_path: PathBuf,
    pub generated_at: f64,
    pub parser: ParserMeta,
    pub merkle: MerkleMeta,
    pub graph: GraphSection,
    pub architecture: ArchitectureMeta,
    pub updated_by: UpdatedBy,
}

impl GraphMeta {
    pub fn digest(&self) -> &str {
        &self.graph.digest
    }
}

/// Snapshot-scoped call-edge cache (`call_edges.<D>.json`). Loaders must
/// reject a cache whose `graph_digest` differs from the current snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEdgeCache {
    pub version: u32,
    pub graph_digest: String,
    pub generated_at: f64,
    pub edges: Vec<CallEdgeRecord>,
    pub instance_id: String,
    pub partial: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallEdgeRecord {
    pub from: String,
    pub to: String,
}

impl CallEdgeCache {
    pub fn new(graph_digest: &str, edges: Vec<CallEdgeRecord>, partial: bool) -> Self {
        CallEdgeCache {
            version: CALL_EDGE_CACHE_VERSION,
            graph_digest: graph_digest.to_string(),
            generated_at: now_s(),
            edges,
            instance_id: uuid::Uuid::new_v4().to_string(),
            partial,
        }
    }

    /// Fold additional edges into this cache, dropping duplicates. Background
    /// passes extend the cache the foreground pass wrote.
    pub fn extend_with(&mut self, edges: impl IntoIterator<Item = CallEdgeRecord>) {
        let mut seen: std::collections::HashSet<CallEdgeRecord> =
            self.edges.iter().cloned().collect();
        for e in edges {
            if seen.insert(e.clone()) {
                self.edges.push(e);
            }
        }
        self.generated_at = now_s();
    }
}

impl From<&GraphEdge> for CallEdgeRecord {
    fn from(e: &GraphEdge) -> Self {
        CallEdgeRecord {
            from: e.from.to_string(),
            to: e.to.to_string(),
        }
    }
}
