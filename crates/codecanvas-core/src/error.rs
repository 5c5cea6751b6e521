//! Typed error taxonomy shared across the workspace

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CanvasError>;

#[derive(Debug, Error)]
pub enum CanvasError {
    /// No server could start, or the single transparent restart also failed.
    #[error("language server unavailable for {0}")]
    LspUnavailable(String),

    /// Per-request timeout expired.
    #[error("language server request timed out after {0:?}")]
    LspTimeout(Duration),

    /// The server returned zero symbols for a file known to contain code.
    #[error("language server returned no symbols for {0}")]
    LspEmpty(PathBuf),

    /// Syntax-tree extraction failed; the file is counted as skipped.
    #[error("syntax extraction failed for {path}: {reason}")]
    ParseFailed { path: PathBuf, reason: String },

    /// A source file changed between compute and commit; publish aborted.
    #[error("snapshot inputs changed during publish")]
    StaleCompute,

    /// The cross-process artifact lock was not acquired within the wait.
    #[error("artifact lock busy")]
    LockBusy,

    /// Publishing would replace a strictly better snapshot at the same digest.
    #[error("existing snapshot at digest {0} has higher quality")]
    QualityRegression(String),

    /// A budgeted pass ran out of time; partial results were persisted.
    #[error("budget exhausted with partial results")]
    BudgetExceeded,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CanvasError {
    /// Short tag used in `parse_summary.lsp_failures` tallies.
    pub fn lsp_failure_reason(&self) -> Option<&'static str> {
        match self {
            CanvasError::LspUnavailable(_) => Some("unavailable"),
            CanvasError::LspTimeout(_) => Some("timeout"),
            CanvasError::LspEmpty(_) => Some("empty"),
            _ => None,
        }
    }
}
