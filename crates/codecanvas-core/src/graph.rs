//! Graph wrapper using petgraph::StableDiGraph with stable string identities

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::model::{EdgeKind, GraphEdge, GraphNode, NodeId, NodeKind, SourceRange};

/// Node and edge counts reported in the published snapshot record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub modules: usize,
    pub classes: usize,
    pub funcs: usize,
    pub import_edges: usize,
    pub call_edges: usize,
    pub contains_edges: usize,
}

/// The code graph — a directed graph of modules, classes, and functions with
/// `CONTAINS`, `IMPORT`, and `CALL` edges, plus the derived indexes the
/// resolver and refresh paths query.
#[derive(Clone)]
pub struct Graph {
    inner: StableDiGraph<GraphNode, EdgeKind>,
    ids: HashMap<NodeId, NodeIndex>,
    by_kind: HashMap<NodeKind, HashSet<NodeId>>,
    by_path: HashMap<PathBuf, HashSet<NodeId>>,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("node_count", &self.inner.node_count())
            .field("edge_count", &self.inner.edge_count())
            .finish()
    }
}

impl Graph {
    pub fn new() -> Self {
        Graph {
            inner: StableDiGraph::new(),
            ids: HashMap::new(),
            by_kind: HashMap::new(),
            by_path: HashMap::new(),
        }
    }

    /// Add a node, replacing any existing node with the same id wholesale.
    pub fn upsert_node(&mut self, node: GraphNode) -> NodeId {
        let id = node.id.clone();
        if let Some(&idx) = self.ids.get(&id) {
            // Replace in place; indexes keyed by id stay valid, path may move.
            if let Some(old) = self.inner.node_weight(idx) {
                if let Some(old_path) = old.fs_path.clone() {
                    if old.fs_path != node.fs_path {
                        if let Some(set) = self.by_path.get_mut(&old_path) {
                            set.remove(&id);
                            if set.is_empty() {
                                self.by_path.remove(&old_path);
                            }
                        }
                    }
                }
            }
            if let Some(path) = node.fs_path.clone() {
                self.by_path.entry(path).or_default().insert(id.clone());
            }
            if let Some(w) = self.inner.node_weight_mut(idx) {
                *w = node;
            }
            return id;
        }
        if let Some(path) = node.fs_path.clone() {
            self.by_path.entry(path).or_default().insert(id.clone());
        }
        self.by_kind.entry(node.kind).or_default().insert(id.clone());
        let idx = self.inner.add_node(node);
        self.ids.insert(id.clone(), idx);
        id
    }

    /// Add an edge, coalescing duplicates. Returns false when the edge already
    /// exists, either endpoint is missing, or the edge violates a kind
    /// invariant (`CALL` must be FUNC→FUNC, `IMPORT` MODULE→MODULE, `CONTAINS`
    /// module→class/func or class→class/func).
    pub fn add_edge(&mut self, from: &NodeId, to: &NodeId, kind: EdgeKind) -> bool {
        let (Some(&fi), Some(&ti)) = (self.ids.get(from), self.ids.get(to)) else {
            return false;
        };
        let fk = self.inner[fi].kind;
        let tk = self.inner[ti].kind;
        let ok = match kind {
            EdgeKind::Call => fk == NodeKind::Func && tk == NodeKind::Func,
            EdgeKind::Import => fk == NodeKind::Module && tk == NodeKind::Module,
            EdgeKind::Contains => {
                matches!(
                    (fk, tk),
                    (NodeKind::Module, NodeKind::Class)
                        | (NodeKind::Module, NodeKind::Func)
                        | (NodeKind::Class, NodeKind::Func)
                        | (NodeKind::Class, NodeKind::Class)
                )
            }
        };
        if !ok {
            tracing::warn!(%from, %to, ?kind, "rejecting edge violating kind invariant");
            return false;
        }
        if self
            .inner
            .edges_connecting(fi, ti)
            .any(|e| *e.weight() == kind)
        {
            return false;
        }
        self.inner.add_edge(fi, ti, kind);
        true
    }

    pub fn node(&self, id: &NodeId) -> Option<&GraphNode> {
        self.ids.get(id).and_then(|&idx| self.inner.node_weight(idx))
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.ids.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.edge_count()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.inner.node_weights()
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &GraphNode> + '_ {
        self.by_kind
            .get(&kind)
            .into_iter()
            .flatten()
            .filter_map(|id| self.node(id))
    }

    /// Ids of nodes whose `fs_path` equals `path`.
    pub fn nodes_in_path(&self, path: &Path) -> Vec<NodeId> {
        self.by_path
            .get(path)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn edges(&self) -> impl Iterator<Item = GraphEdge> + '_ {
        self.inner.edge_references().map(|e| {
            GraphEdge::new(
                self.inner[e.source()].id.clone(),
                self.inner[e.target()].id.clone(),
                *e.weight(),
            )
        })
    }

    pub fn outgoing(&self, id: &NodeId) -> Vec<GraphEdge> {
        self.directed_edges(id, Direction::Outgoing)
    }

    pub fn incoming(&self, id: &NodeId) -> Vec<GraphEdge> {
        self.directed_edges(id, Direction::Incoming)
    }

    fn directed_edges(&self, id: &NodeId, dir: Direction) -> Vec<GraphEdge> {
        let Some(&idx) = self.ids.get(id) else {
            return Vec::new();
        };
        self.inner
            .edges_directed(idx, dir)
            .map(|e| {
                GraphEdge::new(
                    self.inner[e.source()].id.clone(),
                    self.inner[e.target()].id.clone(),
                    *e.weight(),
                )
            })
            .collect()
    }

    pub fn has_edge(&self, from: &NodeId, to: &NodeId, kind: EdgeKind) -> bool {
        let (Some(&fi), Some(&ti)) = (self.ids.get(from), self.ids.get(to)) else {
            return false;
        };
        self.inner
            .edges_connecting(fi, ti)
            .any(|e| *e.weight() == kind)
    }

    /// Remove every node whose `fs_path` equals `path`, along with all edges
    /// referencing them. Returns the removed ids.
    pub fn remove_file(&mut self, path: &Path) -> Vec<NodeId> {
        let ids = self.nodes_in_path(path);
        for id in &ids {
            self.remove_node(id);
        }
        ids
    }

    /// Remove outgoing `CALL` edges from every FUNC whose `fs_path` equals
    /// `path`. Used during refresh: a re-parsed file's call sites may have
    /// changed even when its surviving function ids did not.
    pub fn remove_outgoing_calls(&mut self, path: &Path) -> usize {
        let mut removed = 0;
        for id in self.nodes_in_path(path) {
            let Some(&idx) = self.ids.get(&id) else { continue };
            if self.inner[idx].kind != NodeKind::Func {
                continue;
            }
            let edge_ids: Vec<_> = self
                .inner
                .edges_directed(idx, Direction::Outgoing)
                .filter(|e| *e.weight() == EdgeKind::Call)
                .map(|e| e.id())
                .collect();
            for eid in edge_ids {
                self.inner.remove_edge(eid);
                removed += 1;
            }
        }
        removed
    }

    fn remove_node(&mut self, id: &NodeId) {
        let Some(idx) = self.ids.remove(id) else { return };
        if let Some(node) = self.inner.remove_node(idx) {
            if let Some(set) = self.by_kind.get_mut(&node.kind) {
                set.remove(id);
            }
            if let Some(path) = node.fs_path {
                if let Some(set) = self.by_path.get_mut(&path) {
                    set.remove(id);
                    if set.is_empty() {
                        self.by_path.remove(&path);
                    }
                }
            }
        }
    }

    /// Sorted `(id, range)` pairs for FUNC nodes in `path`, ordered by start
    /// position. The resolver's range index binary-searches this.
    pub fn func_ranges(&self, path: &Path) -> Vec<(NodeId, SourceRange)> {
        let mut spans: Vec<_> = self
            .nodes_in_path(path)
            .into_iter()
            .filter_map(|id| {
                let node = self.node(&id)?;
                if node.kind != NodeKind::Func {
                    return None;
                }
                node.range.map(|r| (id, r))
            })
            .collect();
        spans.sort_by_key(|(_, r)| (r.start_line, r.start_char));
        spans
    }

    /// `fs_path` per FUNC/CLASS id, used by the published snapshot record.
    pub fn symbol_files(&self) -> BTreeMap<String, PathBuf> {
        self.nodes()
            .filter(|n| matches!(n.kind, NodeKind::Func | NodeKind::Class))
            .filter_map(|n| Some((n.id.to_string(), n.fs_path.clone()?)))
            .collect()
    }

    /// Module labels of all non-synthetic modules, mapped to their ids.
    pub fn module_labels(&self) -> HashMap<String, NodeId> {
        self.nodes_of_kind(NodeKind::Module)
            .filter(|n| n.fs_path.is_some())
            .map(|n| (n.label.clone(), n.id.clone()))
            .collect()
    }

    pub fn stats(&self) -> GraphStats {
        let count = |k: NodeKind| self.by_kind.get(&k).map_or(0, |s| s.len());
        let mut stats = GraphStats {
            modules: count(NodeKind::Module),
            classes: count(NodeKind::Class),
            funcs: count(NodeKind::Func),
            ..Default::default()
        };
        for e in self.inner.edge_references() {
            match e.weight() {
                EdgeKind::Import => stats.import_edges += 1,
                EdgeKind::Call => stats.call_edges += 1,
                EdgeKind::Contains => stats.contains_edges += 1,
            }
        }
        stats
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}
