//! Architecture rendering seam
//!
//! The real raster renderer is an external consumer; the core only requests
//! bytes and publishes them. The bundled renderer emits a deterministic
//! Graphviz DOT description so publication always carries real content.

use std::collections::BTreeMap;

use async_trait::async_trait;

use codecanvas_core::{aggregate_module_edges, CanvasError, EdgeKind, Graph, NodeKind};

#[async_trait]
pub trait ArchitectureRenderer: Send + Sync {
    async fn render(&self, graph: &Graph) -> Result<Vec<u8>, CanvasError>;
}

/// Deterministic module-level DOT rendering: one node per module with its
/// class/function counts, plus aggregated import and call edges.
pub struct DotRenderer;

#[async_trait]
impl ArchitectureRenderer for DotRenderer {
    async fn render(&self, graph: &Graph) -> Result<Vec<u8>, CanvasError> {
        let mut members: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        let mut module_labels: BTreeMap<String, String> = BTreeMap::new();
        for node in graph.nodes_of_kind(NodeKind::Module) {
            module_labels.insert(node.id.to_string(), node.label.clone());
            members.entry(node.label.clone()).or_default();
        }
        for edge in graph.edges() {
            if edge.kind != EdgeKind::Contains {
                continue;
            }
            let Some(label) = module_labels.get(edge.from.as_str()) else {
                continue;
            };
            let Some(child) = graph.node(&edge.to) else {
                continue;
            };
            let entry = members.entry(label.clone()).or_default();
            match child.kind {
                NodeKind::Class => entry.0 += 1,
                NodeKind::Func => entry.1 += 1,
                NodeKind::Module => {}
            }
        }

        let mut out = String::from("digraph architecture {\n  rankdir=LR;\n  node [shape=box];\n");
        for (label, (classes, funcs)) in &members {
            out.push_str(&format!(
                "  \"{label}\" [label=\"{label}\\n{classes} classes, {funcs} funcs\"];\n"
            ));
        }
        for edge in aggregate_module_edges(graph) {
            let Some(from) = graph.node(&edge.from).map(|n| n.label.clone()) else {
                continue;
            };
            let Some(to) = graph.node(&edge.to).map(|n| n.label.clone()) else {
                continue;
            };
            match edge.kind {
                EdgeKind::Import => {
                    out.push_str(&format!("  \"{from}\" -> \"{to}\";\n"));
                }
                EdgeKind::Call => {
                    out.push_str(&format!(
                        "  \"{from}\" -> \"{to}\" [style=dashed, label=\"{} calls\"];\n",
                        edge.count
                    ));
                }
                EdgeKind::Contains => {}
            }
        }
        out.push_str("}\n");
        Ok(out.into_bytes())
    }
}
