//! CLI command implementations

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use codecanvas_core::CanvasConfig;
use codecanvas_engine::{Canvas, CanvasWatcher};
use codecanvas_store::load_latest_meta;

fn open_canvas(root: &PathBuf) -> anyhow::Result<Arc<Canvas>> {
    let cfg = CanvasConfig::load(root)?;
    Ok(Arc::new(Canvas::new(root, cfg)?))
}

pub async fn init(root: PathBuf) -> anyhow::Result<()> {
    let canvas = open_canvas(&root)?;
    tracing::info!("indexing workspace: {}", canvas.root().display());

    let summary = canvas.init().await?;
    canvas.join_background().await;

    let (graph, digest) = canvas.graph_snapshot().await;
    let stats = graph.stats();
    tracing::info!(
        parsed = summary.parsed_files,
        skipped = summary.skipped_files,
        modules = stats.modules,
        funcs = stats.funcs,
        call_edges = stats.call_edges,
        digest = %digest,
        "snapshot ready"
    );
    canvas.shutdown().await;
    Ok(())
}

pub async fn refresh(root: PathBuf) -> anyhow::Result<()> {
    let canvas = open_canvas(&root)?;
    let summary = canvas.refresh().await?;
    tracing::info!(
        claimed = summary.claimed,
        reparsed = summary.reparsed,
        deleted = summary.deleted,
        deferred = summary.deferred,
        errors = summary.errors,
        digest = %summary.digest,
        "refresh complete"
    );
    canvas.shutdown().await;
    Ok(())
}

pub async fn resolve(root: PathBuf, budget_s: f64) -> anyhow::Result<()> {
    let canvas = open_canvas(&root)?;
    canvas.ensure_loaded().await?;
    let summary = canvas
        .resolve_call_edges(Duration::from_secs_f64(budget_s), false)
        .await?;
    tracing::info!(
        edges_added = summary.edges_added,
        deferred = summary.deferred,
        "resolver pass complete"
    );
    canvas.shutdown().await;
    Ok(())
}

pub async fn watch(root: PathBuf) -> anyhow::Result<()> {
    let canvas = open_canvas(&root)?;
    canvas.ensure_loaded().await?;

    let watcher = CanvasWatcher::new(canvas.root())?;
    let cancel = canvas.cancel_flag();

    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutting down");
            ctrl_c_cancel.cancel();
        }
    });

    watcher.run(Arc::clone(&canvas), cancel).await?;
    canvas.shutdown().await;
    Ok(())
}

pub async fn mark_dirty(root: PathBuf, paths: Vec<PathBuf>, reason: String) -> anyhow::Result<()> {
    let canvas = open_canvas(&root)?;
    let paths: Vec<PathBuf> = paths
        .into_iter()
        .map(|p| {
            if p.is_absolute() {
                p
            } else {
                canvas.root().join(p)
            }
        })
        .collect();
    let marked = canvas.mark_dirty(paths, &reason).await?;
    tracing::info!(marked, "paths queued");
    Ok(())
}

pub async fn impact(root: PathBuf, symbol: String, depth: usize) -> anyhow::Result<()> {
    let canvas = open_canvas(&root)?;
    canvas.ensure_loaded().await?;
    let (graph, _) = canvas.graph_snapshot().await;

    let Some(node) = graph
        .nodes()
        .find(|n| n.label == symbol)
        .or_else(|| graph.nodes().find(|n| n.label.ends_with(&symbol)))
    else {
        anyhow::bail!("no symbol named {symbol} in the graph");
    };

    let report = codecanvas_core::callers_within(&graph, &node.id, depth);
    println!("{}", serde_json::to_string_pretty(&report)?);
    canvas.shutdown().await;
    Ok(())
}

pub fn clear(root: PathBuf) -> anyhow::Result<()> {
    let cfg = CanvasConfig::load(&root)?;
    let project = std::fs::canonicalize(&root)?;
    let dir = codecanvas_store::ArtifactDir::open(cfg.artifact_dir(&project)?)?;
    codecanvas_store::clear_artifacts(&dir)?;
    tracing::info!("artifacts cleared for {}", project.display());
    Ok(())
}

pub async fn status(root: PathBuf) -> anyhow::Result<()> {
    let canvas = open_canvas(&root)?;
    match load_latest_meta(canvas.artifact_dir())? {
        Some(meta) => {
            println!("{}", serde_json::to_string_pretty(&meta)?);
        }
        None => {
            println!("no snapshot published yet for {}", canvas.root().display());
        }
    }
    Ok(())
}
