//! Definition lookup seam

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use codecanvas_core::{CanvasError, SourcePos};

/// Source of definition locations for a position in a file.
///
/// The production implementation routes through the language session
/// registry; tests substitute a stub with configurable latency. Lookups must
/// be safely callable from many concurrent tasks.
#[async_trait]
pub trait DefinitionProvider: Send + Sync {
    async fn definitions(
        &self,
        path: &Path,
        pos: SourcePos,
    ) -> Result<Vec<(PathBuf, SourcePos)>, CanvasError>;
}
