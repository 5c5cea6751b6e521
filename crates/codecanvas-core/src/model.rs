//! Core data structures for the code graph

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// 32-bit FNV-1a over raw bytes. Node identities render this as 8 hex digits.
pub fn fnv1a32(bytes: &[u8]) -> u32 {
    const OFFSET: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;
    let mut hash = OFFSET;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Wall-clock time as float seconds since the Unix epoch.
pub fn now_s() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Discriminates what kind of code entity a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeKind {
    Module,
    Class,
    Func,
}

/// What kind of relationship an edge represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EdgeKind {
    Import,
    Call,
    Contains,
}

/// Stable string identity for a node.
///
/// The id is a function of the symbol's qualified name, kind, and containing
/// module label only. Editing a function body never changes its id; renaming
/// it or moving it into a different class or file always does.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Id for a module with the given workspace-relative label.
    pub fn module(label: &str) -> Self {
        NodeId(format!("mod_{:08x}", fnv1a32(label.as_bytes())))
    }

    /// Id for a class. `qualname` is the dotted nesting chain.
    pub fn class(label: &str, qualname: &str) -> Self {
        NodeId(format!(
            "cls_{:08x}",
            fnv1a32(format!("{label}:{qualname}").as_bytes())
        ))
    }

    /// Id for a function or method. `qualname` is the dotted nesting chain.
    pub fn func(label: &str, qualname: &str) -> Self {
        NodeId(format!(
            "fn_{:08x}",
            fnv1a32(format!("{label}:{qualname}").as_bytes())
        ))
    }

    /// Synthetic module id for an unresolved import specifier.
    pub fn external(spec: &str) -> Self {
        Self::module(&format!("ext:{spec}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId(s)
    }
}

/// A zero-indexed line/character position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourcePos {
    pub line: u32,
    pub character: u32,
}

impl SourcePos {
    pub fn new(line: u32, character: u32) -> Self {
        SourcePos { line, character }
    }
}

/// A zero-indexed source range. Positions are attributes, never identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRange {
    pub start_line: u32,
    pub start_char: u32,
    pub end_line: u32,
    pub end_char: u32,
}

impl SourceRange {
    pub fn new(start_line: u32, start_char: u32, end_line: u32, end_char: u32) -> Self {
        SourceRange {
            start_line,
            start_char,
            end_line,
            end_char,
        }
    }

    pub fn start(&self) -> SourcePos {
        SourcePos::new(self.start_line, self.start_char)
    }

    pub fn end(&self) -> SourcePos {
        SourcePos::new(self.end_line, self.end_char)
    }

    /// Whether `pos` falls inside this range (inclusive start, exclusive end).
    pub fn contains(&self, pos: SourcePos) -> bool {
        self.start() <= pos && pos < self.end()
    }

    /// Span size used to pick the innermost of several enclosing ranges.
    pub fn extent(&self) -> (u32, u32) {
        (
            self.end_line.saturating_sub(self.start_line),
            self.end_char.saturating_sub(self.start_char),
        )
    }
}

/// A single node in the code graph. Immutable once published in a snapshot;
/// updates replace the node wholesale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphNode {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Display name; qualified for nested definitions (`Outer.Inner.method`).
    pub label: String,
    /// Absolute filesystem path. `None` for synthetic external modules.
    pub fs_path: Option<PathBuf>,
    pub range: Option<SourceRange>,
    /// Optional source excerpt (first line of the definition).
    pub snippet: Option<String>,
}

impl GraphNode {
    pub fn module(label: &str, fs_path: PathBuf) -> Self {
        GraphNode {
            id: NodeId::module(label),
            kind: NodeKind::Module,
            label: label.to_string(),
            fs_path: Some(fs_path),
            range: None,
            snippet: None,
        }
    }

    pub fn external_module(spec: &str) -> Self {
        GraphNode {
            id: NodeId::external(spec),
            kind: NodeKind::Module,
            label: format!("ext:{spec}"),
            fs_path: None,
            range: None,
            snippet: None,
        }
    }

    pub fn class(label: &str, qualname: &str, fs_path: PathBuf, range: SourceRange) -> Self {
        GraphNode {
            id: NodeId::class(label, qualname),
            kind: NodeKind::Class,
            label: qualname.to_string(),
            fs_path: Some(fs_path),
            range: Some(range),
            snippet: None,
        }
    }

    pub fn func(label: &str, qualname: &str, fs_path: PathBuf, range: SourceRange) -> Self {
        GraphNode {
            id: NodeId::func(label, qualname),
            kind: NodeKind::Func,
            label: qualname.to_string(),
            fs_path: Some(fs_path),
            range: Some(range),
            snippet: None,
        }
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }
}

/// A directed edge in the code graph. Duplicates are coalesced by the graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: NodeId,
    pub to: NodeId,
    #[serde(rename = "type")]
    pub kind: EdgeKind,
}

impl GraphEdge {
    pub fn new(from: NodeId, to: NodeId, kind: EdgeKind) -> Self {
        GraphEdge { from, to, kind }
    }
}
