//! Per-file FUNC range index
//!
//! Maps a position to the innermost enclosing function by binary search over
//! ranges sorted by start. Built once per resolver pass from the graph.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use codecanvas_core::{Graph, NodeId, NodeKind, SourcePos, SourceRange};

pub struct RangeIndex {
    by_file: HashMap<PathBuf, Vec<(NodeId, SourceRange)>>,
}

impl RangeIndex {
    /// Index every FUNC node that has a range, grouped by file and sorted by
    /// start position.
    pub fn build(graph: &Graph) -> Self {
        let mut by_file: HashMap<PathBuf, Vec<(NodeId, SourceRange)>> = HashMap::new();
        for node in graph.nodes_of_kind(NodeKind::Func) {
            let (Some(path), Some(range)) = (node.fs_path.clone(), node.range) else {
                continue;
            };
            by_file.entry(path).or_default().push((node.id.clone(), range));
        }
        for spans in by_file.values_mut() {
            spans.sort_by_key(|(_, r)| (r.start_line, r.start_char));
        }
        RangeIndex { by_file }
    }

    /// The innermost FUNC whose range contains `pos`, if any. Files not in
    /// the graph return `None`, which drops the call site.
    pub fn enclosing(&self, path: &Path, pos: SourcePos) -> Option<&NodeId> {
        let spans = self.by_file.get(path)?;
        // First span starting after `pos`; everything enclosing lies before.
        let upper = spans.partition_point(|(_, r)| r.start() <= pos);
        spans[..upper]
            .iter()
            .filter(|(_, r)| r.contains(pos))
            .min_by_key(|(_, r)| r.extent())
            .map(|(id, _)| id)
    }

    pub fn file_count(&self) -> usize {
        self.by_file.len()
    }
}
