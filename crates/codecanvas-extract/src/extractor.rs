//! Per-file extraction driver
//!
//! Produces one `FileExtraction` record per source file: definitions with
//! qualified names and ranges, raw import specifiers, and call sites with the
//! textual call target. Three tiers: custom query schema, generic fallback,
//! unsupported.

use std::path::{Path, PathBuf};

use thiserror::Error;
use streaming_iterator::StreamingIterator;
use tree_sitter::{Node, QueryCursor};

use codecanvas_core::{SourcePos, SourceRange};

use crate::language::Lang;
use crate::parser_pool::{ParseOutput, ParseRequest, ParserPool};
use crate::postprocess;
use crate::schema;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("grammar error: {0}")]
    Grammar(String),

    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("{0} is not valid UTF-8")]
    Utf8(PathBuf),

    #[error("parser pool is shut down")]
    PoolClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefKind {
    Class,
    Func,
}

/// A class or function definition extracted from one file.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub kind: DefKind,
    pub name: String,
    /// Dotted nesting chain, e.g. `Outer.Inner.method`.
    pub qualname: String,
    pub range: SourceRange,
    /// First line of the definition, for display.
    pub snippet: String,
}

/// A raw import specifier as written in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub spec: String,
}

/// A call site: the textual target and the position of the target token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub target: String,
    pub pos: SourcePos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionTier {
    Custom,
    Generic,
    Unsupported,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileExtraction {
    pub tier: ExtractionTier,
    pub definitions: Vec<Definition>,
    pub imports: Vec<Import>,
    pub call_sites: Vec<CallSite>,
}

impl FileExtraction {
    pub fn unsupported() -> Self {
        FileExtraction {
            tier: ExtractionTier::Unsupported,
            definitions: Vec::new(),
            imports: Vec::new(),
            call_sites: Vec::new(),
        }
    }
}

fn node_range(node: Node) -> SourceRange {
    let start = node.start_position();
    let end = node.end_position();
    SourceRange::new(
        start.row as u32,
        start.column as u32,
        end.row as u32,
        end.column as u32,
    )
}

fn node_pos(node: Node) -> SourcePos {
    let p = node.start_position();
    SourcePos::new(p.row as u32, p.column as u32)
}

fn first_line(node: Node, source: &str) -> String {
    let text = node.utf8_text(source.as_bytes()).unwrap_or_default();
    let line = text.lines().next().unwrap_or_default().trim_end();
    if line.len() > 160 {
        let truncated: String = line.chars().take(160).collect();
        format!("{truncated}…")
    } else {
        line.to_string()
    }
}

fn trim_import_spec(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .to_string()
}

/// Extracts definitions, imports, and call sites from source files.
pub struct Extractor {
    pool: ParserPool,
}

impl Extractor {
    pub fn new(pool: ParserPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &ParserPool {
        &self.pool
    }

    /// Read and extract one file. Unsupported extensions yield an empty
    /// unsupported-tier record.
    pub async fn extract_path(&self, path: &Path) -> Result<FileExtraction, ExtractError> {
        let Some(lang) = Lang::from_path(path) else {
            return Ok(FileExtraction::unsupported());
        };
        let bytes = tokio::fs::read(path).await?;
        let content =
            String::from_utf8(bytes).map_err(|_| ExtractError::Utf8(path.to_path_buf()))?;
        self.extract(lang, path, content).await
    }

    pub async fn extract(
        &self,
        lang: Lang,
        path: &Path,
        content: String,
    ) -> Result<FileExtraction, ExtractError> {
        let output = self
            .pool
            .parse(ParseRequest {
                lang,
                content,
                path: path.to_path_buf(),
            })
            .await?;
        Ok(run_tiers(lang, &output))
    }

    /// Synchronous variant for callers already off the async runtime.
    pub fn extract_blocking(
        &self,
        lang: Lang,
        path: &Path,
        content: String,
    ) -> Result<FileExtraction, ExtractError> {
        let output = self.pool.parse_blocking(ParseRequest {
            lang,
            content,
            path: path.to_path_buf(),
        })?;
        Ok(run_tiers(lang, &output))
    }
}

fn run_tiers(lang: Lang, output: &ParseOutput) -> FileExtraction {
    if lang.has_custom_schema() {
        run_custom(lang, output)
    } else {
        run_generic(lang, output)
    }
}

fn run_custom(lang: Lang, output: &ParseOutput) -> FileExtraction {
    let Some(query) = schema::tier1_query(lang) else {
        return run_generic(lang, output);
    };
    let source = output.content.as_str();
    let root = output.tree.root_node();
    let names = query.capture_names();

    let mut definitions = Vec::new();
    let mut imports = Vec::new();
    let mut call_sites = Vec::new();

    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(query, root, source.as_bytes());
    while let Some(m) = matches.next() {
        let mut def_node: Option<Node> = None;
        let mut def_name: Option<Node> = None;
        let mut def_kind: Option<DefKind> = None;
        for cap in m.captures {
            let node = cap.node;
            match names[cap.index as usize] {
                schema::CAP_DEF_CLASS_NODE => {
                    def_node = Some(node);
                    def_kind = Some(DefKind::Class);
                }
                schema::CAP_DEF_FUNC_NODE => {
                    def_node = Some(node);
                    def_kind = Some(DefKind::Func);
                }
                schema::CAP_DEF_CLASS_NAME | schema::CAP_DEF_FUNC_NAME => {
                    def_name = Some(node);
                }
                schema::CAP_IMPORT_SPEC => {
                    let spec = trim_import_spec(node.utf8_text(source.as_bytes()).unwrap_or(""));
                    if !spec.is_empty() {
                        imports.push(Import { spec });
                    }
                }
                schema::CAP_CALL_TARGET => {
                    let target = node.utf8_text(source.as_bytes()).unwrap_or("").to_string();
                    if !target.is_empty() {
                        call_sites.push(CallSite {
                            target,
                            pos: node_pos(node),
                        });
                    }
                }
                _ => {}
            }
        }
        if let (Some(node), Some(name_node), Some(kind)) = (def_node, def_name, def_kind) {
            let name = name_node
                .utf8_text(source.as_bytes())
                .unwrap_or("")
                .to_string();
            if name.is_empty() {
                continue;
            }
            let qualname = postprocess::qualname(node, lang, source.as_bytes(), &name);
            definitions.push(Definition {
                kind,
                name,
                qualname,
                range: node_range(node),
                snippet: first_line(node, source),
            });
        }
    }

    definitions.dedup_by(|a, b| a.kind == b.kind && a.qualname == b.qualname && a.range == b.range);
    FileExtraction {
        tier: ExtractionTier::Custom,
        definitions,
        imports,
        call_sites,
    }
}

/// Generic fallback: capture every named node, classify by the node type's
/// name, and keep only those with an extractable name. Imports and call
/// sites are not extracted at this tier.
fn run_generic(lang: Lang, output: &ParseOutput) -> FileExtraction {
    let query = schema::generic_query(lang);
    let source = output.content.as_str();
    let root = output.tree.root_node();

    let mut definitions = Vec::new();
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(query, root, source.as_bytes());
    while let Some(m) = matches.next() {
        for cap in m.captures {
            let node = cap.node;
            let Some(kind) = schema::classify_kind(node.kind()) else {
                continue;
            };
            let name = node
                .child_by_field_name("name")
                .and_then(|n| n.utf8_text(source.as_bytes()).ok())
                .map(str::to_string)
                .or_else(|| postprocess::unwrap_declarator(node, source.as_bytes()));
            let Some(name) = name.filter(|n| !n.is_empty()) else {
                continue;
            };
            let qualname = postprocess::qualname(node, lang, source.as_bytes(), &name);
            definitions.push(Definition {
                kind,
                name,
                qualname,
                range: node_range(node),
                snippet: first_line(node, source),
            });
        }
    }

    FileExtraction {
        tier: ExtractionTier::Generic,
        definitions,
        imports: Vec::new(),
        call_sites: Vec::new(),
    }
}
