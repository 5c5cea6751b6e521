//! Impact queries over the code graph
//!
//! Answers "if this symbol changes, what else might break": bounded reverse
//! traversal over CALL edges plus the importers of the containing module.
//! Call graphs are arbitrary digraphs — cycles included — so traversal
//! tracks visited nodes and never assumes a DAG.

use std::collections::{HashSet, VecDeque};

use serde::Serialize;

use crate::graph::Graph;
use crate::model::{EdgeKind, NodeId, NodeKind};

/// Bound on traversal work, independent of depth.
const MAX_VISITED: usize = 10_000;

#[derive(Debug, Clone, Serialize)]
pub struct ImpactedSymbol {
    pub id: NodeId,
    pub label: String,
    /// CALL-edge distance from the changed symbol.
    pub distance: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImpactReport {
    /// Functions that (transitively) call the changed symbol.
    pub callers: Vec<ImpactedSymbol>,
    /// Modules importing the changed symbol's module.
    pub importing_modules: Vec<NodeId>,
    /// True when traversal hit the work bound before exhausting the graph.
    pub truncated: bool,
}

/// Transitive callers of `id` up to `depth` CALL hops, breadth-first.
/// The origin itself is not reported, even on a self-call cycle.
pub fn callers_within(graph: &Graph, id: &NodeId, depth: usize) -> ImpactReport {
    let mut report = ImpactReport::default();
    if graph.node(id).is_none() {
        return report;
    }

    let mut visited: HashSet<NodeId> = HashSet::from([id.clone()]);
    let mut queue: VecDeque<(NodeId, usize)> = VecDeque::from([(id.clone(), 0)]);

    while let Some((current, dist)) = queue.pop_front() {
        if dist >= depth {
            continue;
        }
        for edge in graph.incoming(&current) {
            if edge.kind != EdgeKind::Call {
                continue;
            }
            if visited.len() >= MAX_VISITED {
                report.truncated = true;
                queue.clear();
                break;
            }
            if !visited.insert(edge.from.clone()) {
                continue;
            }
            if let Some(node) = graph.node(&edge.from) {
                report.callers.push(ImpactedSymbol {
                    id: edge.from.clone(),
                    label: node.label.clone(),
                    distance: dist + 1,
                });
            }
            queue.push_back((edge.from, dist + 1));
        }
    }

    // Module-level blast radius: whoever imports the containing module.
    if let Some(module_id) = containing_module(graph, id) {
        report.importing_modules = graph
            .incoming(&module_id)
            .into_iter()
            .filter(|e| e.kind == EdgeKind::Import)
            .map(|e| e.from)
            .collect();
        report.importing_modules.sort();
    }

    report.callers.sort_by(|a, b| {
        a.distance
            .cmp(&b.distance)
            .then_with(|| a.label.cmp(&b.label))
    });
    report
}

/// The module whose file contains `id`. For a module id, itself.
pub fn containing_module(graph: &Graph, id: &NodeId) -> Option<NodeId> {
    let node = graph.node(id)?;
    if node.kind == NodeKind::Module {
        return Some(id.clone());
    }
    let path = node.fs_path.as_ref()?;
    graph
        .nodes_in_path(path)
        .into_iter()
        .find(|candidate| {
            graph
                .node(candidate)
                .map(|n| n.kind == NodeKind::Module)
                .unwrap_or(false)
        })
}

/// Every function reachable from `id` following CALL edges forward. Used by
/// consumers sizing a re-verification set after an edit.
pub fn callees_of(graph: &Graph, id: &NodeId) -> HashSet<NodeId> {
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut queue: VecDeque<NodeId> = VecDeque::from([id.clone()]);
    while let Some(current) = queue.pop_front() {
        if visited.len() >= MAX_VISITED {
            break;
        }
        for edge in graph.outgoing(&current) {
            if edge.kind == EdgeKind::Call && visited.insert(edge.to.clone()) {
                queue.push_back(edge.to);
            }
        }
    }
    visited
}
