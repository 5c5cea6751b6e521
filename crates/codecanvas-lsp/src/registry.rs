//! Session registry keyed by `(language, workspace_root)`
//!
//! Process-wide state with an explicit lifecycle: the registry is passed
//! through component constructors, and `shutdown_all` runs on process exit.
//! Within one host process there is at most one live server per key.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;

use crate::backend::{CustomBackendSpec, LspBackend};
use crate::session::LspSession;

pub struct SessionRegistry {
    sessions: DashMap<(String, PathBuf), Arc<LspSession>>,
    custom: Vec<CustomBackendSpec>,
}

impl SessionRegistry {
    pub fn new(custom: Vec<CustomBackendSpec>) -> Self {
        SessionRegistry {
            sessions: DashMap::new(),
            custom,
        }
    }

    /// Whether any backend (managed or custom) exists for `lang`.
    pub fn supports(&self, lang: &str) -> bool {
        LspBackend::for_lang(lang, &self.custom).is_some()
    }

    /// Whether the backend's binary is actually present on this host.
    pub fn provisioned(&self, lang: &str) -> bool {
        LspBackend::for_lang(lang, &self.custom)
            .map(|b| b.provision().is_ok())
            .unwrap_or(false)
    }

    /// The session for `(lang, root)`, created lazily. `None` when no
    /// backend is registered for the language.
    pub fn session(&self, lang: &str, root: &Path) -> Option<Arc<LspSession>> {
        let backend = LspBackend::for_lang(lang, &self.custom)?;
        let key = (lang.to_string(), root.to_path_buf());
        let session = self
            .sessions
            .entry(key)
            .or_insert_with(|| Arc::new(LspSession::new(backend, root.to_path_buf())))
            .clone();
        Some(session)
    }

    /// Drop memoized symbols for `path` in every session rooted above it.
    pub fn invalidate(&self, path: &Path) {
        for entry in self.sessions.iter() {
            if path.starts_with(entry.value().root()) {
                entry.value().invalidate(path);
            }
        }
    }

    pub async fn shutdown_all(&self) {
        let sessions: Vec<Arc<LspSession>> =
            self.sessions.iter().map(|e| Arc::clone(e.value())).collect();
        self.sessions.clear();
        for session in sessions {
            session.shutdown().await;
        }
    }
}
