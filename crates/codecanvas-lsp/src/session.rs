//! One language-server session per `(language, workspace_root)`
//!
//! Sessions start lazily on first request, perform the initialize handshake
//! once, and survive one transparent restart. A second unexpected exit fails
//! the session fast for the rest of the process lifetime.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use lsp_types::{DocumentSymbolResponse, GotoDefinitionResponse, Url};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use codecanvas_core::{SourcePos, SourceRange};

use crate::backend::LspBackend;
use crate::transport::Transport;
use crate::LspError;

/// A flattened symbol record: nested symbols carry their container chain in
/// `qualname`.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolRecord {
    pub name: String,
    pub qualname: String,
    pub kind: lsp_types::SymbolKind,
    pub range: SourceRange,
    pub selection_range: SourceRange,
}

enum State {
    Idle,
    Ready(Arc<Transport>),
    Failed,
}

pub struct LspSession {
    backend: LspBackend,
    root: PathBuf,
    state: Mutex<State>,
    /// `document_symbols` responses memoized by `(path, mtime_ns, size)`.
    symbols_cache: DashMap<(PathBuf, u64, u64), Arc<Vec<SymbolRecord>>>,
    /// Files already announced with `didOpen`, with their version counter.
    opened: DashMap<PathBuf, i32>,
    restart_attempted: AtomicBool,
    timeout: Duration,
}

fn to_range(r: lsp_types::Range) -> SourceRange {
    SourceRange::new(r.start.line, r.start.character, r.end.line, r.end.character)
}

fn file_uri(path: &Path) -> Result<Url, LspError> {
    Url::from_file_path(path)
        .map_err(|_| LspError::Protocol(format!("not an absolute path: {}", path.display())))
}

fn stat_sig(path: &Path) -> Result<(u64, u64), LspError> {
    let meta = std::fs::metadata(path)?;
    let mtime_ns = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    Ok((mtime_ns, meta.len()))
}

impl LspSession {
    pub fn new(backend: LspBackend, root: PathBuf) -> Self {
        let timeout = backend.request_timeout();
        LspSession {
            backend,
            root,
            state: Mutex::new(State::Idle),
            symbols_cache: DashMap::new(),
            opened: DashMap::new(),
            restart_attempted: AtomicBool::new(false),
            timeout,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Drop memoized symbols for `path`; refresh calls this before re-query.
    pub fn invalidate(&self, path: &Path) {
        self.symbols_cache.retain(|(p, _, _), _| p != path);
        self.opened.remove(path);
    }

    async fn start(&self) -> Result<Arc<Transport>, LspError> {
        self.backend.provision()?;
        let (program, args) = self
            .backend
            .command()
            .ok_or_else(|| LspError::Unavailable("empty backend command".into()))?;
        tracing::debug!(program, root = %self.root.display(), "starting language server");
        let transport = Arc::new(Transport::spawn(&program, &args, &self.root).await?);

        let root_uri = file_uri(&self.root)?;
        let params = json!({
            "processId": std::process::id(),
            "rootUri": root_uri.as_str(),
            "capabilities": {
                "textDocument": {
                    "documentSymbol": {"hierarchicalDocumentSymbolSupport": true},
                    "definition": {"linkSupport": true}
                }
            },
            "workspaceFolders": [{"uri": root_uri.as_str(), "name": "workspace"}]
        });
        transport
            .request("initialize", params, Duration::from_secs(10))
            .await?;
        transport.notify("initialized", json!({})).await?;
        // All open-file bookkeeping died with any previous process.
        self.opened.clear();
        Ok(transport)
    }

    /// Current transport, starting or restarting the server as needed.
    /// Exactly one transparent restart is attempted per session lifetime.
    async fn ensure_ready(&self) -> Result<Arc<Transport>, LspError> {
        let mut state = self.state.lock().await;
        loop {
            match &*state {
                State::Ready(t) if t.is_alive() => return Ok(Arc::clone(t)),
                State::Failed => {
                    return Err(LspError::Unavailable(
                        "session failed after restart".into(),
                    ))
                }
                State::Ready(_) => {
                    // Server died. One restart, then fail fast.
                    if self.restart_attempted.swap(true, Ordering::SeqCst) {
                        *state = State::Failed;
                        continue;
                    }
                    tracing::warn!(root = %self.root.display(), "language server exited, restarting once");
                    *state = State::Idle;
                }
                State::Idle => match self.start().await {
                    Ok(t) => *state = State::Ready(t),
                    Err(e) => {
                        *state = State::Failed;
                        return Err(e);
                    }
                },
            }
        }
    }

    async fn ensure_open(&self, transport: &Transport, path: &Path) -> Result<(), LspError> {
        if self.opened.contains_key(path) {
            return Ok(());
        }
        let text = tokio::fs::read_to_string(path).await?;
        let uri = file_uri(path)?;
        transport
            .notify(
                "textDocument/didOpen",
                json!({
                    "textDocument": {
                        "uri": uri.as_str(),
                        "languageId": self.backend.language_id(),
                        "version": 1,
                        "text": text,
                    }
                }),
            )
            .await?;
        self.opened.insert(path.to_path_buf(), 1);
        Ok(())
    }

    /// One request with a transparent retry when the connection closed
    /// underneath us (the restart happens inside `ensure_ready`).
    async fn request(&self, method: &str, params: Value) -> Result<Value, LspError> {
        let transport = self.ensure_ready().await?;
        match transport.request(method, params.clone(), self.timeout).await {
            Err(LspError::Closed) => {
                let transport = self.ensure_ready().await?;
                transport.request(method, params, self.timeout).await
            }
            other => other,
        }
    }

    /// Nested document symbols for `path`, flattened with container chains.
    /// Memoized by `(path, mtime_ns, size)`.
    pub async fn document_symbols(&self, path: &Path) -> Result<Arc<Vec<SymbolRecord>>, LspError> {
        let (mtime_ns, size) = stat_sig(path)?;
        let key = (path.to_path_buf(), mtime_ns, size);
        if let Some(hit) = self.symbols_cache.get(&key) {
            return Ok(Arc::clone(hit.value()));
        }

        let transport = self.ensure_ready().await?;
        self.ensure_open(&transport, path).await?;
        let uri = file_uri(path)?;
        let result = self
            .request(
                "textDocument/documentSymbol",
                json!({"textDocument": {"uri": uri.as_str()}}),
            )
            .await?;

        let records = parse_symbols(result)?;
        if records.is_empty() && size > 0 {
            return Err(LspError::Empty(path.to_path_buf()));
        }
        let records = Arc::new(records);
        self.symbols_cache.insert(key, Arc::clone(&records));
        Ok(records)
    }

    /// Definition locations for the given position. Not cached here; the
    /// call-graph resolver caches at snapshot granularity.
    pub async fn definitions(
        &self,
        path: &Path,
        pos: SourcePos,
    ) -> Result<Vec<(PathBuf, SourcePos)>, LspError> {
        let transport = self.ensure_ready().await?;
        self.ensure_open(&transport, path).await?;
        let uri = file_uri(path)?;
        let result = self
            .request(
                "textDocument/definition",
                json!({
                    "textDocument": {"uri": uri.as_str()},
                    "position": {"line": pos.line, "character": pos.character},
                }),
            )
            .await?;
        parse_definitions(result)
    }

    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if let State::Ready(t) = &*state {
            t.shutdown().await;
        }
        *state = State::Idle;
    }
}

fn parse_symbols(result: Value) -> Result<Vec<SymbolRecord>, LspError> {
    if result.is_null() {
        return Ok(Vec::new());
    }
    let response: DocumentSymbolResponse = serde_json::from_value(result)?;
    let mut records = Vec::new();
    match response {
        DocumentSymbolResponse::Nested(symbols) => {
            for symbol in symbols {
                flatten_symbol(&symbol, &mut Vec::new(), &mut records);
            }
        }
        DocumentSymbolResponse::Flat(symbols) => {
            for symbol in symbols {
                let range = to_range(symbol.location.range);
                records.push(SymbolRecord {
                    name: symbol.name.clone(),
                    qualname: symbol.name,
                    kind: symbol.kind,
                    range,
                    selection_range: range,
                });
            }
        }
    }
    Ok(records)
}

fn flatten_symbol(
    symbol: &lsp_types::DocumentSymbol,
    chain: &mut Vec<String>,
    out: &mut Vec<SymbolRecord>,
) {
    let qualname = if chain.is_empty() {
        symbol.name.clone()
    } else {
        format!("{}.{}", chain.join("."), symbol.name)
    };
    out.push(SymbolRecord {
        name: symbol.name.clone(),
        qualname,
        kind: symbol.kind,
        range: to_range(symbol.range),
        selection_range: to_range(symbol.selection_range),
    });
    if let Some(children) = &symbol.children {
        chain.push(symbol.name.clone());
        for child in children {
            flatten_symbol(child, chain, out);
        }
        chain.pop();
    }
}

fn parse_definitions(result: Value) -> Result<Vec<(PathBuf, SourcePos)>, LspError> {
    if result.is_null() {
        return Ok(Vec::new());
    }
    let response: GotoDefinitionResponse = serde_json::from_value(result)?;
    let locations: Vec<(Url, lsp_types::Range)> = match response {
        GotoDefinitionResponse::Scalar(loc) => vec![(loc.uri, loc.range)],
        GotoDefinitionResponse::Array(locs) => {
            locs.into_iter().map(|l| (l.uri, l.range)).collect()
        }
        GotoDefinitionResponse::Link(links) => links
            .into_iter()
            .map(|l| (l.target_uri, l.target_selection_range))
            .collect(),
    };
    Ok(locations
        .into_iter()
        .filter_map(|(uri, range)| {
            let path = uri.to_file_path().ok()?;
            Some((path, SourcePos::new(range.start.line, range.start.character)))
        })
        .collect())
}
