//! The Canvas service facade
//!
//! Owns the in-memory graph, the language session registry, and the artifact
//! store handles, and exposes the surface the request-handler layer
//! consumes: `init`, `ensure_loaded`, `refresh`, `resolve_call_edges`,
//! `mark_dirty`, `graph_snapshot`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use codecanvas_core::meta::{
    ArchitectureMeta, CallEdgeRecord, GraphSection, MerkleMeta, ParseSummary, ParserMeta,
    UpdatedBy, META_VERSION,
};
use codecanvas_core::snapshot::{self, ModuleLeaf, SnapshotConfig, SnapshotInputs};
use codecanvas_core::{
    now_s, CallEdgeCache, CanvasConfig, CanvasError, EdgeKind, Graph, GraphMeta, NodeKind, Result,
    SourcePos,
};
use codecanvas_extract::{CallSite, Extractor, Import, Lang, ParserPool};
use codecanvas_lsp::{CustomBackendSpec, SessionRegistry};
use codecanvas_resolver::{CallResolver, CancelFlag, DefinitionProvider, PendingSite, RangeIndex};
use codecanvas_store::{
    load_call_edges, load_latest_meta, publish, write_call_edges, write_warmup, AckOutcome,
    ArtifactDir, DirtyEntry, DirtyQueue, PublishInputs, WarmupRecord,
};

use crate::builder::{self, FileParse};
use crate::labels;
use crate::render::{ArchitectureRenderer, DotRenderer};
use crate::walker;

/// How many files parse concurrently during a scan.
const PARSE_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshSummary {
    pub claimed: usize,
    pub reparsed: usize,
    pub deleted: usize,
    pub deferred: usize,
    pub errors: usize,
    pub digest: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolveSummary {
    pub edges_added: usize,
    pub deferred: usize,
}

/// Per-file imports retained for re-linking after incremental updates.
type ImportMap = HashMap<PathBuf, (String, Vec<Import>)>;

struct State {
    graph: Graph,
    digest: String,
    leaves: BTreeMap<String, ModuleLeaf>,
    config_leaf: String,
    call_sites: HashMap<PathBuf, Vec<CallSite>>,
    imports: ImportMap,
    pending: HashSet<PendingSite>,
    summary: ParseSummary,
}

impl Default for State {
    fn default() -> Self {
        State {
            graph: Graph::new(),
            digest: String::new(),
            leaves: BTreeMap::new(),
            config_leaf: String::new(),
            call_sites: HashMap::new(),
            imports: ImportMap::new(),
            pending: HashSet::new(),
            summary: ParseSummary::default(),
        }
    }
}

/// Default definition provider: route through the session registry by the
/// file's language key.
struct RegistryProvider {
    registry: Arc<SessionRegistry>,
    root: PathBuf,
}

#[async_trait]
impl DefinitionProvider for RegistryProvider {
    async fn definitions(
        &self,
        path: &Path,
        pos: SourcePos,
    ) -> std::result::Result<Vec<(PathBuf, SourcePos)>, CanvasError> {
        let Some(lang) = Lang::from_path(path) else {
            return Ok(Vec::new());
        };
        let Some(session) = self.registry.session(lang.key(), &self.root) else {
            return Ok(Vec::new());
        };
        session.definitions(path, pos).await.map_err(Into::into)
    }
}

pub struct Canvas {
    cfg: CanvasConfig,
    root: PathBuf,
    label_base: PathBuf,
    dir: ArtifactDir,
    registry: Arc<SessionRegistry>,
    extractor: Arc<Extractor>,
    renderer: Arc<dyn ArchitectureRenderer>,
    provider: Arc<dyn DefinitionProvider>,
    queue: DirtyQueue,
    state: RwLock<State>,
    cancel: CancelFlag,
    background: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Canvas {
    pub fn new(root: &Path, cfg: CanvasConfig) -> Result<Self> {
        let custom: Vec<CustomBackendSpec> = cfg
            .custom_lsp
            .iter()
            .map(|s| CustomBackendSpec {
                lang: s.lang.clone(),
                command: s.command.clone(),
                language_id: s.language_id.clone().unwrap_or_else(|| s.lang.clone()),
                root_markers: s.root_markers.clone(),
            })
            .collect();
        let registry = Arc::new(SessionRegistry::new(custom));
        Self::with_registry(root, cfg, registry)
    }

    pub fn with_registry(
        root: &Path,
        cfg: CanvasConfig,
        registry: Arc<SessionRegistry>,
    ) -> Result<Self> {
        let root = std::fs::canonicalize(root)?;
        let dir = ArtifactDir::open(cfg.artifact_dir(&root)?)?;
        let label_base = labels::detect_label_base(&root);
        let queue = DirtyQueue::new(dir.clone(), cfg.dirty_ttl, cfg.lock_wait);
        let provider: Arc<dyn DefinitionProvider> = Arc::new(RegistryProvider {
            registry: Arc::clone(&registry),
            root: root.clone(),
        });
        Ok(Canvas {
            cfg,
            root,
            label_base,
            dir,
            registry,
            extractor: Arc::new(Extractor::new(ParserPool::with_default_size())),
            renderer: Arc::new(DotRenderer),
            provider,
            queue,
            state: RwLock::new(State::default()),
            cancel: CancelFlag::new(),
            background: Mutex::new(None),
        })
    }

    /// Swap the definition provider (tests use a stub; production keeps the
    /// registry-backed default).
    pub fn with_provider(mut self, provider: Arc<dyn DefinitionProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn ArchitectureRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn artifact_dir(&self) -> &ArtifactDir {
        &self.dir
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    fn snapshot_config(&self) -> SnapshotConfig {
        SnapshotConfig {
            version: 1,
            lsp: self.cfg.use_lsp,
            lang_set: Lang::all().iter().map(|l| l.key().to_string()).collect(),
            label_strip_prefix: self.cfg.label_strip_prefix.clone(),
        }
    }

    /// Scan, build the graph, publish a snapshot, and run a foreground
    /// resolver pass. A background catch-up pass is spawned when call sites
    /// remain.
    pub async fn init(self: &Arc<Self>) -> Result<ParseSummary> {
        self.rebuild("init").await
    }

    /// Load the latest snapshot from disk when its inputs are still valid;
    /// otherwise fall back to a full init.
    pub async fn ensure_loaded(self: &Arc<Self>) -> Result<()> {
        if !self.state.read().await.digest.is_empty() {
            return Ok(());
        }
        let dir = self.dir.clone();
        let meta = tokio::task::spawn_blocking(move || load_latest_meta(&dir))
            .await
            .map_err(join_err)??;
        match meta {
            None => {
                self.rebuild("init").await?;
            }
            Some(meta) => {
                let leaves = meta.merkle.leaves.clone();
                let unchanged =
                    tokio::task::spawn_blocking(move || snapshot::leaves_unchanged(&leaves))
                        .await
                        .map_err(join_err)?;
                let action = if unchanged { "load" } else { "init" };
                self.rebuild(action).await?;
            }
        }
        Ok(())
    }

    /// Enqueue external-edit notifications.
    pub async fn mark_dirty(&self, paths: Vec<PathBuf>, reason: &str) -> Result<usize> {
        let queue = self.queue.clone();
        let reason = reason.to_string();
        tokio::task::spawn_blocking(move || queue.mark(&paths, &reason))
            .await
            .map_err(join_err)?
    }

    /// The in-memory graph and its digest.
    pub async fn graph_snapshot(&self) -> (Graph, String) {
        let state = self.state.read().await;
        (state.graph.clone(), state.digest.clone())
    }

    /// Cancel background work and stop every language-server session.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.background.lock().await.take() {
            let _ = handle.await;
        }
        self.registry.shutdown_all().await;
    }

    // ── Scan pipeline ───────────────────────────────────────

    async fn parse_file(&self, path: PathBuf, summary: &mut ParseSummary) -> Option<FileParse> {
        let label = labels::module_label(
            &self.label_base,
            self.cfg.label_strip_prefix.as_deref(),
            &path,
        );
        let lang = Lang::from_path(&path)?;

        let extraction = match self.extractor.extract_path(&path).await {
            Ok(extraction) => extraction,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "extraction failed");
                summary.skipped_files += 1;
                return None;
            }
        };

        let mut lsp_symbols = None;
        if self.cfg.use_lsp && self.cfg.lsp_langs.iter().any(|l| l == lang.key()) {
            if let Some(session) = self.registry.session(lang.key(), &self.root) {
                match session.document_symbols(&path).await {
                    Ok(records) => lsp_symbols = Some(records.as_ref().clone()),
                    Err(e) => {
                        let canvas_err: CanvasError = e.into();
                        if let Some(reason) = canvas_err.lsp_failure_reason() {
                            summary.record_lsp_failure(reason);
                        }
                    }
                }
            }
        }

        summary.parsed_files += 1;
        if lsp_symbols.is_some() {
            summary.lsp_files += 1;
        } else {
            summary.tree_sitter_files += 1;
        }
        Some(FileParse {
            path,
            label,
            extraction,
            lsp_symbols,
        })
    }

    async fn scan_workspace(&self) -> Result<(Vec<FileParse>, ParseSummary)> {
        let root = self.root.clone();
        let max_size = self.cfg.max_file_size;
        let (files, walk) = tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();
            let walk = walker::walk_source_files(&root, max_size, |path| files.push(path));
            (files, walk)
        })
        .await
        .map_err(join_err)?;

        let mut summary = ParseSummary {
            skipped_files: walk.oversized,
            ..Default::default()
        };

        // Per-file tallies merge on completion; parse + symbol queries for
        // independent files overlap.
        let parses: Vec<(Option<FileParse>, ParseSummary)> = stream::iter(files)
            .map(|path| async move {
                let mut tally = ParseSummary::default();
                let parse = self.parse_file(path, &mut tally).await;
                (parse, tally)
            })
            .buffer_unordered(PARSE_CONCURRENCY)
            .collect()
            .await;

        let mut out = Vec::new();
        for (parse, tally) in parses {
            summary.parsed_files += tally.parsed_files;
            summary.skipped_files += tally.skipped_files;
            summary.lsp_files += tally.lsp_files;
            summary.tree_sitter_files += tally.tree_sitter_files;
            for (reason, n) in tally.lsp_failures {
                *summary.lsp_failures.entry(reason).or_default() += n;
            }
            if let Some(parse) = parse {
                out.push(parse);
            }
        }
        Ok((out, summary))
    }

    fn build_graph(parses: &[FileParse]) -> (Graph, HashMap<PathBuf, Vec<CallSite>>, ImportMap) {
        let mut graph = Graph::new();
        for parse in parses {
            builder::merge_file(&mut graph, parse);
        }
        let labels_map = graph.module_labels();
        let mut call_sites = HashMap::new();
        let mut imports = ImportMap::new();
        for parse in parses {
            let module_id = codecanvas_core::NodeId::module(&parse.label);
            builder::link_imports(
                &mut graph,
                &labels_map,
                &module_id,
                &parse.label,
                &parse.extraction.imports,
            );
            if !parse.extraction.call_sites.is_empty() {
                call_sites.insert(parse.path.clone(), parse.extraction.call_sites.clone());
            }
            imports.insert(
                parse.path.clone(),
                (parse.label.clone(), parse.extraction.imports.clone()),
            );
        }
        (graph, call_sites, imports)
    }

    async fn compute_snapshot(
        &self,
        files: Vec<(String, PathBuf)>,
        prior: Option<BTreeMap<String, ModuleLeaf>>,
    ) -> Result<SnapshotInputs> {
        let cfg = self.snapshot_config();
        tokio::task::spawn_blocking(move || {
            snapshot::compute_snapshot(&files, prior.as_ref(), &cfg)
        })
        .await
        .map_err(join_err)
    }

    async fn rebuild(self: &Arc<Self>, action: &str) -> Result<ParseSummary> {
        self.write_warmup_records().await?;

        let dir = self.dir.clone();
        let prior = tokio::task::spawn_blocking(move || load_latest_meta(&dir))
            .await
            .map_err(join_err)??
            .map(|meta| meta.merkle.leaves);

        let (parses, summary) = self.scan_workspace().await?;
        let (graph, call_sites, imports) = Self::build_graph(&parses);
        let files: Vec<(String, PathBuf)> = parses
            .iter()
            .map(|p| (p.label.clone(), p.path.clone()))
            .collect();
        let snap = self.compute_snapshot(files, prior).await?;

        let all_sites: HashSet<PendingSite> = call_sites
            .iter()
            .flat_map(|(path, sites)| {
                sites.iter().map(|s| PendingSite {
                    file: path.clone(),
                    pos: s.pos,
                })
            })
            .collect();

        // Reuse a compatible persisted cache: same digest means the edges are
        // still valid, and a non-partial cache means nothing is pending.
        let dir = self.dir.clone();
        let digest_for_cache = snap.root.clone();
        let cached = tokio::task::spawn_blocking(move || load_call_edges(&dir, &digest_for_cache))
            .await
            .map_err(join_err)??;

        {
            let mut state = self.state.write().await;
            state.graph = graph;
            state.digest = snap.root.clone();
            state.leaves = snap.leaves.clone();
            state.config_leaf = snap.config_leaf.clone();
            state.call_sites = call_sites;
            state.imports = imports;
            state.summary = summary.clone();
            state.pending = all_sites;
            if let Some(cache) = cached {
                for record in &cache.edges {
                    let from = codecanvas_core::NodeId::from(record.from.clone());
                    let to = codecanvas_core::NodeId::from(record.to.clone());
                    state.graph.add_edge(&from, &to, EdgeKind::Call);
                }
                if !cache.partial {
                    state.pending.clear();
                }
            }
        }

        self.publish_current(action).await?;
        self.run_foreground_and_background_passes(action).await?;
        Ok(summary)
    }

    async fn write_warmup_records(&self) -> Result<()> {
        if !self.cfg.use_lsp {
            return Ok(());
        }
        let mut records = BTreeMap::new();
        for lang in &self.cfg.lsp_langs {
            let record = if self.registry.provisioned(lang) {
                WarmupRecord::healthy(lang)
            } else {
                WarmupRecord::failed(lang, "server binary not found")
            };
            records.insert(lang.clone(), record);
        }
        let dir = self.dir.clone();
        tokio::task::spawn_blocking(move || write_warmup(&dir, &records))
            .await
            .map_err(join_err)?
    }

    // ── Publication ─────────────────────────────────────────

    async fn build_meta(&self, action: &str) -> Result<(GraphMeta, Vec<u8>, CallEdgeCache)> {
        let state = self.state.read().await;
        let image = self.renderer.render(&state.graph).await?;
        let digest = state.digest.clone();

        let edges: Vec<CallEdgeRecord> = state
            .graph
            .edges()
            .filter(|e| e.kind == EdgeKind::Call)
            .map(|e| CallEdgeRecord {
                from: e.from.to_string(),
                to: e.to.to_string(),
            })
            .collect();
        let cache = CallEdgeCache {
            partial: !state.pending.is_empty(),
            ..CallEdgeCache::new(&digest, edges, true)
        };

        let meta = GraphMeta {
            version: META_VERSION,
            project_path: self.root.clone(),
            generated_at: now_s(),
            parser: ParserMeta {
                use_lsp: self.cfg.use_lsp,
                lsp_langs: self.cfg.lsp_langs.clone(),
                label_strip_prefix: self.cfg.label_strip_prefix.clone(),
            },
            merkle: MerkleMeta {
                algo: "sha256".into(),
                root: digest.clone(),
                leaf_count: state.leaves.len() + 1,
                leaves: state.leaves.clone(),
                config_leaf: state.config_leaf.clone(),
            },
            graph: GraphSection {
                digest: digest.clone(),
                stats: state.graph.stats(),
                parse_summary: state.summary.clone(),
                symbol_files: state.graph.symbol_files(),
            },
            architecture: ArchitectureMeta {
                latest_png: "architecture.png".into(),
                digest_png: format!("architecture.{digest}.png"),
                digest: digest.clone(),
                rendered_at: now_s(),
            },
            updated_by: UpdatedBy {
                pid: std::process::id(),
                action: action.to_string(),
            },
        };
        Ok((meta, image, cache))
    }

    /// Publish the current state. Stale computes, lock contention, and
    /// quality regressions are recoverable: the publish is abandoned and a
    /// later pass retries; on-disk state is never regressed.
    async fn publish_current(&self, action: &str) -> Result<bool> {
        let (meta, image, call_edges) = self.build_meta(action).await?;
        let dir = self.dir.clone();
        let wait = self.cfg.lock_wait;
        let inputs = PublishInputs {
            meta,
            image,
            call_edges,
        };
        let outcome =
            tokio::task::spawn_blocking(move || publish(&dir, wait, &inputs))
                .await
                .map_err(join_err)?;
        match outcome {
            Ok(()) => Ok(true),
            Err(
                e @ (CanvasError::StaleCompute
                | CanvasError::LockBusy
                | CanvasError::QualityRegression(_)),
            ) => {
                tracing::warn!(error = %e, "publish abandoned; a later pass will retry");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    // ── Call-graph resolution ───────────────────────────────

    /// Run one resolver pass within `budget`. Edges found are committed to
    /// the graph and the snapshot-scoped cache; unprocessed sites stay
    /// pending. Budget exhaustion is not an error.
    pub async fn resolve_call_edges(&self, budget: Duration, foreground: bool) -> Result<ResolveSummary> {
        let (digest, index, sites) = {
            let state = self.state.read().await;
            (
                state.digest.clone(),
                RangeIndex::build(&state.graph),
                state.pending.iter().cloned().collect::<Vec<_>>(),
            )
        };
        if digest.is_empty() {
            return Ok(ResolveSummary::default());
        }

        let resolver = CallResolver::new(Arc::clone(&self.provider), self.cfg.definition_pool);
        let outcome = resolver.resolve(&index, sites, budget, &self.cancel).await;
        tracing::debug!(
            foreground,
            edges = outcome.edges.len(),
            resolved = outcome.resolved.len(),
            deferred = outcome.deferred,
            "resolver pass finished"
        );

        let (edges_added, records, partial) = {
            let mut state = self.state.write().await;
            if state.digest != digest {
                // A refresh replaced the snapshot mid-pass; drop the stale
                // result and let the next pass rerun against the new graph.
                return Ok(ResolveSummary {
                    edges_added: 0,
                    deferred: outcome.deferred,
                });
            }
            let mut added = 0;
            for (from, to) in &outcome.edges {
                if state.graph.add_edge(from, to, EdgeKind::Call) {
                    added += 1;
                }
            }
            for site in &outcome.resolved {
                state.pending.remove(site);
            }
            let records: Vec<CallEdgeRecord> = state
                .graph
                .edges()
                .filter(|e| e.kind == EdgeKind::Call)
                .map(|e| CallEdgeRecord {
                    from: e.from.to_string(),
                    to: e.to.to_string(),
                })
                .collect();
            (added, records, !state.pending.is_empty())
        };

        // A cache write ends every pass, even a zero-edge one, so a stale
        // cache from a previous snapshot can never be mistaken for current.
        let dir = self.dir.clone();
        let wait = self.cfg.lock_wait;
        let write_result = tokio::task::spawn_blocking(move || {
            let mut cache = load_call_edges(&dir, &digest)?
                .unwrap_or_else(|| CallEdgeCache::new(&digest, Vec::new(), partial));
            cache.extend_with(records);
            cache.partial = partial;
            write_call_edges(&dir, wait, &cache)
        })
        .await
        .map_err(join_err)?;
        match write_result {
            Err(CanvasError::LockBusy) => {
                tracing::warn!("call-edge cache write skipped: lock busy");
            }
            other => other?,
        }

        Ok(ResolveSummary {
            edges_added,
            deferred: outcome.deferred,
        })
    }

    async fn run_foreground_and_background_passes(self: &Arc<Self>, action: &str) -> Result<()> {
        let fg = self
            .resolve_call_edges(self.cfg.foreground_budget, true)
            .await?;
        if fg.edges_added > 0 {
            // Same digest, same-or-better quality: refresh the published
            // stats so consumers see the resolved edges.
            self.publish_current(action).await?;
        }

        let remaining = !self.state.read().await.pending.is_empty();
        if !remaining {
            return Ok(());
        }
        let canvas = Arc::clone(self);
        let budget = self.cfg.background_budget;
        let handle = tokio::spawn(async move {
            match canvas.resolve_call_edges(budget, false).await {
                Ok(summary) if summary.edges_added > 0 => {
                    if let Err(e) = canvas.publish_current("refresh").await {
                        tracing::warn!(error = %e, "post-resolve publish failed");
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "background resolver pass failed"),
            }
        });
        let mut slot = self.background.lock().await;
        if let Some(old) = slot.replace(handle) {
            old.abort();
        }
        Ok(())
    }

    /// Wait for the background catch-up pass, if one is running.
    pub async fn join_background(&self) {
        if let Some(handle) = self.background.lock().await.take() {
            let _ = handle.await;
        }
    }

    // ── Incremental refresh ─────────────────────────────────

    /// Drain one claimed batch of the dirty queue: invalidate, re-parse,
    /// republish, re-resolve, then ack each path with its outcome.
    pub async fn refresh(self: &Arc<Self>) -> Result<RefreshSummary> {
        self.ensure_loaded().await?;

        let queue = self.queue.clone();
        let batch = self.cfg.claim_batch;
        let claimed = match tokio::task::spawn_blocking(move || queue.claim(batch))
            .await
            .map_err(join_err)?
        {
            Ok(claimed) => claimed,
            Err(CanvasError::LockBusy) => {
                tracing::warn!("dirty queue busy; refresh skipped");
                return Ok(RefreshSummary {
                    digest: self.state.read().await.digest.clone(),
                    ..Default::default()
                });
            }
            Err(e) => return Err(e),
        };

        let mut summary = RefreshSummary {
            claimed: claimed.len(),
            ..Default::default()
        };
        if claimed.is_empty() {
            summary.digest = self.state.read().await.digest.clone();
            return Ok(summary);
        }

        enum PathOutcome {
            Reparsed,
            Deleted,
            Failed(String),
        }
        let mut outcomes: Vec<(DirtyEntry, PathOutcome)> = Vec::new();

        for entry in claimed {
            let path = entry.path.clone();
            let outcome = self.refresh_path(&path).await;
            match outcome {
                Ok(true) => {
                    summary.reparsed += 1;
                    outcomes.push((entry, PathOutcome::Reparsed));
                }
                Ok(false) => {
                    summary.deleted += 1;
                    outcomes.push((entry, PathOutcome::Deleted));
                }
                Err(e) => {
                    summary.errors += 1;
                    outcomes.push((entry, PathOutcome::Failed(e.to_string())));
                }
            }
        }

        // Re-link every file's imports: removals above may have dropped
        // IMPORT edges into re-created modules.
        {
            let mut state = self.state.write().await;
            let labels_map = state.graph.module_labels();
            let imports = state.imports.clone();
            for (_, (label, file_imports)) in imports {
                let module_id = codecanvas_core::NodeId::module(&label);
                if state.graph.contains(&module_id) {
                    builder::link_imports(
                        &mut state.graph,
                        &labels_map,
                        &module_id,
                        &label,
                        &file_imports,
                    );
                }
            }
        }

        // Recompute the Merkle root over the surviving modules and publish.
        let (files, prior) = {
            let state = self.state.read().await;
            let files: Vec<(String, PathBuf)> = state
                .graph
                .nodes_of_kind(NodeKind::Module)
                .filter_map(|n| Some((n.label.clone(), n.fs_path.clone()?)))
                .collect();
            (files, state.leaves.clone())
        };
        let snap = self.compute_snapshot(files, Some(prior)).await?;
        let digest_changed = {
            let mut state = self.state.write().await;
            let changed = state.digest != snap.root;
            state.digest = snap.root.clone();
            state.leaves = snap.leaves;
            state.config_leaf = snap.config_leaf;
            changed
        };
        if digest_changed {
            self.publish_current("refresh").await?;
        }

        // Bounded resolver pass over the changed files' callers and their
        // neighborhood (their sites were queued by refresh_path).
        let resolve = self
            .resolve_call_edges(self.cfg.foreground_budget, true)
            .await?;
        if resolve.edges_added > 0 {
            self.publish_current("refresh").await?;
        }

        let pending_files: HashSet<PathBuf> = {
            let state = self.state.read().await;
            state.pending.iter().map(|s| s.file.clone()).collect()
        };

        for (entry, outcome) in outcomes {
            let Some(claim_id) = entry.claim_id.clone() else {
                continue;
            };
            let ack = match outcome {
                PathOutcome::Failed(message) => AckOutcome::Error(message),
                PathOutcome::Deleted => AckOutcome::Deleted,
                PathOutcome::Reparsed if pending_files.contains(&entry.path) => {
                    summary.deferred += 1;
                    AckOutcome::Deferred
                }
                PathOutcome::Reparsed => AckOutcome::Ok,
            };
            let queue = self.queue.clone();
            let path = entry.path.clone();
            tokio::task::spawn_blocking(move || queue.ack(&claim_id, &path, ack))
                .await
                .map_err(join_err)??;
        }

        summary.digest = self.state.read().await.digest.clone();
        Ok(summary)
    }

    /// Invalidate and re-parse one dirty path. `Ok(true)` means re-parsed,
    /// `Ok(false)` means the file is gone and its nodes were dropped.
    async fn refresh_path(self: &Arc<Self>, path: &Path) -> Result<bool> {
        // Callers into this file's functions need re-resolution after the
        // swap; collect them before the removal drops those edges.
        let caller_files: HashSet<PathBuf> = {
            let state = self.state.read().await;
            state
                .graph
                .nodes_in_path(path)
                .iter()
                .flat_map(|id| state.graph.incoming(id))
                .filter(|e| e.kind == EdgeKind::Call)
                .filter_map(|e| {
                    let state_node = state.graph.node(&e.from)?;
                    state_node.fs_path.clone()
                })
                .filter(|p| p != path)
                .collect()
        };

        {
            let mut state = self.state.write().await;
            state.graph.remove_file(path);
            state.call_sites.remove(path);
            state.imports.remove(path);
            state.pending.retain(|s| s.file != path);
        }
        self.registry.invalidate(path);

        let exists = tokio::fs::try_exists(path).await.unwrap_or(false);
        let reparsed = if exists {
            let mut tally = ParseSummary::default();
            let parse = self.parse_file(path.to_path_buf(), &mut tally).await;
            match parse {
                Some(parse) => {
                    let mut state = self.state.write().await;
                    builder::merge_file(&mut state.graph, &parse);
                    // Surviving function ids keep their identity, but their
                    // call sites may now point elsewhere.
                    state.graph.remove_outgoing_calls(path);
                    for site in &parse.extraction.call_sites {
                        state.pending.insert(PendingSite {
                            file: path.to_path_buf(),
                            pos: site.pos,
                        });
                    }
                    if !parse.extraction.call_sites.is_empty() {
                        state
                            .call_sites
                            .insert(path.to_path_buf(), parse.extraction.call_sites.clone());
                    }
                    state
                        .imports
                        .insert(path.to_path_buf(), (parse.label.clone(), parse.extraction.imports.clone()));
                    state.summary.parsed_files += tally.parsed_files;
                    state.summary.lsp_files += tally.lsp_files;
                    state.summary.tree_sitter_files += tally.tree_sitter_files;
                    true
                }
                None => {
                    return Err(CanvasError::ParseFailed {
                        path: path.to_path_buf(),
                        reason: "extraction produced no parse".into(),
                    });
                }
            }
        } else {
            false
        };

        // Queue the callers' sites for re-resolution.
        if !caller_files.is_empty() {
            let mut state = self.state.write().await;
            let sites: Vec<PendingSite> = caller_files
                .iter()
                .filter_map(|file| state.call_sites.get(file).map(|sites| (file, sites)))
                .flat_map(|(file, sites)| {
                    sites.iter().map(|s| PendingSite {
                        file: file.clone(),
                        pos: s.pos,
                    })
                })
                .collect();
            state.pending.extend(sites);
        }
        Ok(reparsed)
    }
}

fn join_err(e: tokio::task::JoinError) -> CanvasError {
    CanvasError::Io(std::io::Error::other(e.to_string()))
}
