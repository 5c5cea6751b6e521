//! Service configuration
//!
//! Defaults cover a stock invocation; an optional `codecanvas.toml` at the
//! workspace root overrides individual fields, and `CODECANVAS_HOME` (or a
//! per-user default) designates the artifact directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{CanvasError, Result};
use crate::model::fnv1a32;

/// Environment variable naming the artifact root directory.
pub const HOME_ENV: &str = "CODECANVAS_HOME";

/// Directory name under `$HOME` when `CODECANVAS_HOME` is unset.
pub const DEFAULT_HOME_DIR: &str = ".codecanvas";

pub const CONFIG_FILE: &str = "codecanvas.toml";

/// A language-server command for a language outside the managed pool.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomLspServer {
    pub lang: String,
    pub command: Vec<String>,
    #[serde(default)]
    pub language_id: Option<String>,
    #[serde(default)]
    pub root_markers: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CanvasConfig {
    /// Prefer language-server symbol extraction when a server is available.
    pub use_lsp: bool,
    /// Language keys routed through the session manager.
    pub lsp_langs: Vec<String>,
    /// Optional prefix stripped from workspace-relative module labels.
    pub label_strip_prefix: Option<String>,
    /// Files larger than this are skipped and counted.
    pub max_file_size: u64,
    /// Interactive resolver budget.
    pub foreground_budget: Duration,
    /// Catch-up resolver budget.
    pub background_budget: Duration,
    /// Width of the concurrent definition-lookup pool.
    pub definition_pool: usize,
    /// Maximum dirty entries claimed per refresh batch.
    pub claim_batch: usize,
    /// Lease TTL before an unacked claim is returned to pending.
    pub dirty_ttl: Duration,
    /// Bounded wait for the cross-process artifact lock.
    pub lock_wait: Duration,
    /// Explicit artifact root, overriding env and the per-user default.
    pub artifact_root: Option<PathBuf>,
    /// Language-server commands for languages the managed pool lacks.
    pub custom_lsp: Vec<CustomLspServer>,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        CanvasConfig {
            use_lsp: true,
            lsp_langs: vec![
                "python".into(),
                "rust".into(),
                "typescript".into(),
                "javascript".into(),
                "go".into(),
            ],
            label_strip_prefix: None,
            max_file_size: 2_000_000,
            foreground_budget: Duration::from_millis(300),
            background_budget: Duration::from_secs(30),
            definition_pool: 16,
            claim_batch: 16,
            dirty_ttl: Duration::from_secs(60),
            lock_wait: Duration::from_secs(5),
            artifact_root: None,
            custom_lsp: Vec::new(),
        }
    }
}

/// Partial file overlay for `codecanvas.toml`.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    use_lsp: Option<bool>,
    lsp_langs: Option<Vec<String>>,
    label_strip_prefix: Option<String>,
    max_file_size: Option<u64>,
    foreground_budget_ms: Option<u64>,
    background_budget_s: Option<u64>,
    definition_pool: Option<usize>,
    claim_batch: Option<usize>,
    dirty_ttl_s: Option<u64>,
    lock_wait_s: Option<u64>,
    #[serde(default)]
    custom_lsp: Vec<CustomLspServer>,
}

impl CanvasConfig {
    /// Defaults merged with `codecanvas.toml` from `workspace_root`, if any.
    pub fn load(workspace_root: &Path) -> Result<Self> {
        let mut cfg = CanvasConfig::default();
        let path = workspace_root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(cfg);
        }
        let text = std::fs::read_to_string(&path)?;
        let file: ConfigFile = toml::from_str(&text)
            .map_err(|e| CanvasError::Config(format!("{}: {e}", path.display())))?;
        if let Some(v) = file.use_lsp {
            cfg.use_lsp = v;
        }
        if let Some(v) = file.lsp_langs {
            cfg.lsp_langs = v;
        }
        if file.label_strip_prefix.is_some() {
            cfg.label_strip_prefix = file.label_strip_prefix;
        }
        if let Some(v) = file.max_file_size {
            cfg.max_file_size = v;
        }
        if let Some(v) = file.foreground_budget_ms {
            cfg.foreground_budget = Duration::from_millis(v);
        }
        if let Some(v) = file.background_budget_s {
            cfg.background_budget = Duration::from_secs(v);
        }
        if let Some(v) = file.definition_pool {
            cfg.definition_pool = v.max(1);
        }
        if let Some(v) = file.claim_batch {
            cfg.claim_batch = v.max(1);
        }
        if let Some(v) = file.dirty_ttl_s {
            cfg.dirty_ttl = Duration::from_secs(v);
        }
        if let Some(v) = file.lock_wait_s {
            cfg.lock_wait = Duration::from_secs(v);
        }
        cfg.custom_lsp = file.custom_lsp;
        Ok(cfg)
    }

    /// Artifact directory for `project`: explicit override, then
    /// `CODECANVAS_HOME`, then `~/.codecanvas`, each with a per-project
    /// subdirectory so distinct workspaces never share artifacts.
    pub fn artifact_dir(&self, project: &Path) -> Result<PathBuf> {
        let base = if let Some(root) = &self.artifact_root {
            root.clone()
        } else if let Ok(env) = std::env::var(HOME_ENV) {
            PathBuf::from(env)
        } else {
            let home = std::env::var("HOME")
                .map_err(|_| CanvasError::Config("HOME is not set".into()))?;
            PathBuf::from(home).join(DEFAULT_HOME_DIR)
        };
        let name = project
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "workspace".to_string());
        let tag = fnv1a32(project.to_string_lossy().as_bytes());
        Ok(base.join(format!("{name}-{tag:08x}")))
    }
}
