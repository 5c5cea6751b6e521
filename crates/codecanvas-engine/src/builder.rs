//! Graph building — merging per-file records into typed nodes and edges
//!
//! Merge policy per file: language-server symbols win for CLASS/FUNC when
//! present, then Tier 1 syntactic definitions, then Tier 2, else the file
//! contributes a module node only. Imports always come from the syntactic
//! path; containment derives from qualified-name nesting.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use lsp_types::SymbolKind;

use codecanvas_core::{EdgeKind, Graph, GraphNode, NodeId, NodeKind};
use codecanvas_extract::{DefKind, Definition, FileExtraction, Import};
use codecanvas_lsp::SymbolRecord;

/// Everything one file contributed to the merge.
#[derive(Debug, Clone)]
pub struct FileParse {
    pub path: PathBuf,
    pub label: String,
    pub extraction: FileExtraction,
    /// Present when the language session produced (non-empty) symbols.
    pub lsp_symbols: Option<Vec<SymbolRecord>>,
}

/// Keep class-shaped and function-shaped symbols; drop noise (constants,
/// variables, enum members, fields).
pub fn symbol_filter(kind: SymbolKind) -> Option<DefKind> {
    match kind {
        SymbolKind::CLASS | SymbolKind::STRUCT | SymbolKind::INTERFACE | SymbolKind::ENUM => {
            Some(DefKind::Class)
        }
        SymbolKind::FUNCTION | SymbolKind::METHOD | SymbolKind::CONSTRUCTOR => Some(DefKind::Func),
        _ => None,
    }
}

/// Convert filtered language-server symbols into definition records.
fn lsp_definitions(symbols: &[SymbolRecord]) -> Vec<Definition> {
    symbols
        .iter()
        .filter_map(|sym| {
            let kind = symbol_filter(sym.kind)?;
            Some(Definition {
                kind,
                name: sym.name.clone(),
                qualname: sym.qualname.clone(),
                range: sym.range,
                snippet: String::new(),
            })
        })
        .collect()
}

/// Merge one file's module and definitions into the graph. Returns the
/// module id. Import linking happens in a second pass once every module
/// label is known.
pub fn merge_file(graph: &mut Graph, parse: &FileParse) -> NodeId {
    let module_id = graph.upsert_node(GraphNode::module(&parse.label, parse.path.clone()));

    let definitions = match &parse.lsp_symbols {
        Some(symbols) => lsp_definitions(symbols),
        None => parse.extraction.definitions.clone(),
    };

    // Insert class nodes first so nested definitions can attach to them.
    let mut class_ids: HashMap<String, NodeId> = HashMap::new();
    for def in definitions.iter().filter(|d| d.kind == DefKind::Class) {
        let mut node =
            GraphNode::class(&parse.label, &def.qualname, parse.path.clone(), def.range);
        if !def.snippet.is_empty() {
            node = node.with_snippet(def.snippet.clone());
        }
        let id = graph.upsert_node(node);
        class_ids.insert(def.qualname.clone(), id);
    }

    for def in &definitions {
        let id = match def.kind {
            DefKind::Class => class_ids[&def.qualname].clone(),
            DefKind::Func => {
                let mut node =
                    GraphNode::func(&parse.label, &def.qualname, parse.path.clone(), def.range);
                if !def.snippet.is_empty() {
                    node = node.with_snippet(def.snippet.clone());
                }
                graph.upsert_node(node)
            }
        };
        let parent = enclosing_class(&class_ids, &def.qualname)
            .cloned()
            .unwrap_or_else(|| module_id.clone());
        graph.add_edge(&parent, &id, EdgeKind::Contains);
    }

    module_id
}

/// The nearest class ancestor of `qualname` in this file, walking prefixes
/// from the longest. A function nested in another function attaches to the
/// surrounding class or module, never to the function.
fn enclosing_class<'a>(
    class_ids: &'a HashMap<String, NodeId>,
    qualname: &str,
) -> Option<&'a NodeId> {
    let mut prefix = qualname;
    while let Some(idx) = prefix.rfind('.') {
        prefix = &prefix[..idx];
        if let Some(id) = class_ids.get(prefix) {
            return Some(id);
        }
    }
    None
}

/// Where an import specifier points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    /// A module already in the graph.
    Existing(NodeId),
    /// Nothing in the workspace matches; a synthetic external module.
    External(String),
}

/// Resolve `spec` against the known module labels. Candidate generation is
/// deliberately shallow: dotted → path for Python-style specs, relative
/// `./x` joins for JS/TS, `::` paths under `src/` for Rust. Anything
/// unresolved becomes an external module keyed by the normalized specifier.
pub fn resolve_import_spec(
    labels: &HashMap<String, NodeId>,
    importer_label: &str,
    spec: &str,
) -> ImportTarget {
    let spec = spec.trim();
    for candidate in import_candidates(importer_label, spec) {
        if let Some(id) = labels.get(&candidate) {
            return ImportTarget::Existing(id.clone());
        }
    }
    ImportTarget::External(spec.to_string())
}

fn importer_dir(importer_label: &str) -> &str {
    importer_label
        .rfind('/')
        .map(|idx| &importer_label[..idx])
        .unwrap_or("")
}

fn join_label(dir: &str, rest: &str) -> String {
    let mut parts: Vec<&str> = if dir.is_empty() {
        Vec::new()
    } else {
        dir.split('/').collect()
    };
    for seg in rest.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

fn import_candidates(importer_label: &str, spec: &str) -> Vec<String> {
    let mut out = Vec::new();
    let dir = importer_dir(importer_label);

    if spec.starts_with("./") || spec.starts_with("../") {
        // Relative JS/TS-style specifier.
        let base = join_label(dir, spec);
        for ext in [".ts", ".tsx", ".js", ".jsx", ".mjs"] {
            out.push(format!("{base}{ext}"));
        }
        for index in ["/index.ts", "/index.js"] {
            out.push(format!("{base}{index}"));
        }
        return out;
    }

    if spec.contains("::") {
        // Rust path: strip crate/self/super heads, try under src/ and the
        // importer's own directory.
        let segs: Vec<&str> = spec
            .split("::")
            .filter(|s| !matches!(*s, "crate" | "self" | "super" | ""))
            .collect();
        if !segs.is_empty() {
            let joined = segs.join("/");
            out.push(format!("src/{joined}.rs"));
            out.push(format!("{joined}.rs"));
            out.push(join_label(dir, &format!("{joined}.rs")));
            // `use module::Item` — the tail is often an item, not a module.
            if segs.len() > 1 {
                let parent = segs[..segs.len() - 1].join("/");
                out.push(format!("src/{parent}.rs"));
                out.push(join_label(dir, &format!("{parent}.rs")));
            }
        }
        return out;
    }

    if spec.starts_with('.') {
        // Python relative import: one dot per level up from the importer.
        let dots = spec.chars().take_while(|&c| c == '.').count();
        let rest = spec[dots..].replace('.', "/");
        let mut base_dir = dir.to_string();
        for _ in 1..dots {
            base_dir = importer_dir(&base_dir).to_string();
        }
        let base = join_label(&base_dir, &rest);
        out.push(format!("{base}.py"));
        out.push(format!("{base}/__init__.py"));
        return out;
    }

    // Dotted (or bare) Python-style specifier.
    let path = spec.replace('.', "/");
    out.push(format!("{path}.py"));
    out.push(format!("{path}/__init__.py"));
    out.push(join_label(dir, &format!("{path}.py")));
    // Go-style last-segment match and bare name with known extensions.
    if !spec.contains('.') && !spec.contains('/') {
        for ext in [".go", ".rs", ".ts", ".js"] {
            out.push(format!("{spec}{ext}"));
            out.push(join_label(dir, &format!("{spec}{ext}")));
        }
    }
    out
}

/// Second pass: link one file's imports now that all module labels exist.
pub fn link_imports(
    graph: &mut Graph,
    labels: &HashMap<String, NodeId>,
    module_id: &NodeId,
    importer_label: &str,
    imports: &[Import],
) {
    for import in imports {
        let target = match resolve_import_spec(labels, importer_label, &import.spec) {
            ImportTarget::Existing(id) => id,
            ImportTarget::External(spec) => graph.upsert_node(GraphNode::external_module(&spec)),
        };
        if &target != module_id {
            graph.add_edge(module_id, &target, EdgeKind::Import);
        }
    }
}

/// Whether a file path still has any node in the graph (used after refresh
/// removals).
pub fn file_in_graph(graph: &Graph, path: &Path) -> bool {
    !graph.nodes_in_path(path).is_empty()
}

/// True when the parse produced any structural symbol at all.
pub fn has_symbols(parse: &FileParse) -> bool {
    parse
        .lsp_symbols
        .as_ref()
        .map(|s| !s.is_empty())
        .unwrap_or(false)
        || !parse.extraction.definitions.is_empty()
}

/// Node kind check helper for invariants in tests.
pub fn is_func(graph: &Graph, id: &NodeId) -> bool {
    graph.node(id).map(|n| n.kind == NodeKind::Func).unwrap_or(false)
}
