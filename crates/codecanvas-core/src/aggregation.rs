//! Module-level edge aggregation
//!
//! Rolls symbol-level edges up to their containing modules so renderers and
//! summary views can show a module diagram without walking the full graph.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde::Serialize;

use crate::graph::Graph;
use crate::model::{EdgeKind, NodeId, NodeKind};

/// A rolled-up edge between two modules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregatedEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
    /// How many underlying symbol edges this represents.
    pub count: usize,
}

/// Roll CALL edges up to module pairs and merge them with IMPORT edges.
/// Self-loops (calls within one module) are dropped; counts accumulate
/// across the collapsed symbol edges.
pub fn aggregate_module_edges(graph: &Graph) -> Vec<AggregatedEdge> {
    // Map each symbol to its module via fs_path.
    let mut module_of_path: HashMap<PathBuf, NodeId> = HashMap::new();
    for node in graph.nodes_of_kind(NodeKind::Module) {
        if let Some(path) = &node.fs_path {
            module_of_path.insert(path.clone(), node.id.clone());
        }
    }

    let mut rolled: BTreeMap<(NodeId, NodeId, EdgeKind), usize> = BTreeMap::new();
    for edge in graph.edges() {
        let pair = match edge.kind {
            EdgeKind::Import => (edge.from.clone(), edge.to.clone()),
            EdgeKind::Call => {
                let from_module = symbol_module(graph, &module_of_path, &edge.from);
                let to_module = symbol_module(graph, &module_of_path, &edge.to);
                match (from_module, to_module) {
                    (Some(f), Some(t)) if f != t => (f, t),
                    _ => continue,
                }
            }
            EdgeKind::Contains => continue,
        };
        *rolled.entry((pair.0, pair.1, edge.kind)).or_default() += 1;
    }

    rolled
        .into_iter()
        .map(|((from, to, kind), count)| AggregatedEdge {
            from,
            to,
            kind,
            count,
        })
        .collect()
}

fn symbol_module(
    graph: &Graph,
    module_of_path: &HashMap<PathBuf, NodeId>,
    id: &NodeId,
) -> Option<NodeId> {
    let node = graph.node(id)?;
    module_of_path.get(node.fs_path.as_ref()?).cloned()
}
