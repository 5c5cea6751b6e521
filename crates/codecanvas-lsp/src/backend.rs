//! Language-server backend selection
//!
//! A backend is a tagged variant: the managed pool knows launch commands for
//! a fixed set of languages, and the extensibility table maps any other
//! language key to a caller-supplied process command.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::LspError;

/// A managed-pool server: `(language key, argv, LSP language id)`.
const MANAGED_SERVERS: &[(&str, &[&str], &str)] = &[
    ("python", &["pyright-langserver", "--stdio"], "python"),
    ("rust", &["rust-analyzer"], "rust"),
    ("typescript", &["typescript-language-server", "--stdio"], "typescript"),
    ("javascript", &["typescript-language-server", "--stdio"], "javascript"),
    ("go", &["gopls"], "go"),
];

/// Configuration for a language outside the managed pool.
#[derive(Debug, Clone)]
pub struct CustomBackendSpec {
    pub lang: String,
    pub command: Vec<String>,
    pub language_id: String,
    pub root_markers: Vec<String>,
}

/// How a session talks to its server.
#[derive(Debug, Clone)]
pub enum LspBackend {
    /// Managed pool; carries the language key.
    Managed { lang: String },
    /// Extensibility table entry; carries the process command.
    Custom {
        command: Vec<String>,
        language_id: String,
        root_markers: Vec<String>,
    },
}

impl LspBackend {
    /// Backend for `lang`, consulting the custom table first so callers can
    /// override a managed language.
    pub fn for_lang(lang: &str, custom: &[CustomBackendSpec]) -> Option<LspBackend> {
        if let Some(spec) = custom.iter().find(|s| s.lang == lang) {
            return Some(LspBackend::Custom {
                command: spec.command.clone(),
                language_id: spec.language_id.clone(),
                root_markers: spec.root_markers.clone(),
            });
        }
        MANAGED_SERVERS
            .iter()
            .find(|(key, _, _)| *key == lang)
            .map(|_| LspBackend::Managed {
                lang: lang.to_string(),
            })
    }

    /// The process command: `(program, args)`.
    pub fn command(&self) -> Option<(String, Vec<String>)> {
        match self {
            LspBackend::Managed { lang } => MANAGED_SERVERS
                .iter()
                .find(|(key, _, _)| key == lang)
                .map(|(_, argv, _)| {
                    (
                        argv[0].to_string(),
                        argv[1..].iter().map(|s| s.to_string()).collect(),
                    )
                }),
            LspBackend::Custom { command, .. } => command
                .split_first()
                .map(|(prog, args)| (prog.clone(), args.to_vec())),
        }
    }

    pub fn language_id(&self) -> &str {
        match self {
            LspBackend::Managed { lang } => MANAGED_SERVERS
                .iter()
                .find(|(key, _, _)| key == lang)
                .map(|(_, _, id)| *id)
                .unwrap_or("plaintext"),
            LspBackend::Custom { language_id, .. } => language_id,
        }
    }

    /// Locate the server binary. First call per workspace performs this
    /// before any session is spawned; the outcome lands in the warmup record.
    pub fn provision(&self) -> Result<PathBuf, LspError> {
        let (program, _) = self
            .command()
            .ok_or_else(|| LspError::Unavailable("empty backend command".into()))?;
        let path = std::env::var("PATH").unwrap_or_default();
        binary_on_path(&path, &program)
            .ok_or_else(|| LspError::Unavailable(format!("{program} not found on PATH")))
    }

    /// Per-request timeout. Heavier servers get longer defaults.
    pub fn request_timeout(&self) -> Duration {
        match self {
            LspBackend::Managed { lang } => match lang.as_str() {
                "rust" => Duration::from_secs(10),
                "python" | "typescript" | "javascript" | "go" => Duration::from_secs(8),
                _ => Duration::from_secs(5),
            },
            LspBackend::Custom { .. } => Duration::from_secs(5),
        }
    }

    /// Marker files that indicate a usable workspace root for this backend.
    pub fn root_markers(&self) -> Vec<String> {
        match self {
            LspBackend::Managed { lang } => match lang.as_str() {
                "python" => vec!["pyproject.toml".into(), "setup.py".into()],
                "rust" => vec!["Cargo.toml".into()],
                "typescript" | "javascript" => vec!["package.json".into(), "tsconfig.json".into()],
                "go" => vec!["go.mod".into()],
                _ => Vec::new(),
            },
            LspBackend::Custom { root_markers, .. } => root_markers.clone(),
        }
    }
}

/// Search a PATH-style string for an executable named `program`.
pub(crate) fn binary_on_path(path: &str, program: &str) -> Option<PathBuf> {
    if program.contains('/') {
        let p = Path::new(program);
        return p.is_file().then(|| p.to_path_buf());
    }
    for dir in std::env::split_paths(path) {
        let candidate = dir.join(program);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
