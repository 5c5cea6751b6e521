//! Language Session Manager — long-lived language-server sessions per
//! `(language, workspace_root)` with symbol and definition queries

pub mod backend;
pub mod registry;
pub mod session;
pub mod transport;


pub use backend::{CustomBackendSpec, LspBackend};
pub use registry::SessionRegistry;
pub use session::{LspSession, SymbolRecord};

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use codecanvas_core::CanvasError;

#[derive(Debug, Error)]
pub enum LspError {
    #[error("language server unavailable: {0}")]
    Unavailable(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("server returned no symbols for {0}")]
    Empty(PathBuf),

    #[error("server connection closed")]
    Closed,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<LspError> for CanvasError {
    fn from(e: LspError) -> Self {
        match e {
            LspError::Unavailable(s) => CanvasError::LspUnavailable(s),
            LspError::Closed => CanvasError::LspUnavailable("connection closed".into()),
            LspError::Timeout(d) => CanvasError::LspTimeout(d),
            LspError::Empty(p) => CanvasError::LspEmpty(p),
            LspError::Protocol(s) => CanvasError::LspUnavailable(s),
            LspError::Io(e) => CanvasError::Io(e),
            LspError::Json(e) => CanvasError::Json(e),
        }
    }
}
