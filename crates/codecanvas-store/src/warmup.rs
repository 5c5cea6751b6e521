//! Per-language session health records (`lsp_warmup.json`)

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use codecanvas_core::{now_s, CanvasError};

use crate::paths::ArtifactDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarmupRecord {
    pub language: String,
    pub ok: bool,
    pub checked_at: f64,
    pub message: Option<String>,
}

impl WarmupRecord {
    pub fn healthy(language: &str) -> Self {
        WarmupRecord {
            language: language.to_string(),
            ok: true,
            checked_at: now_s(),
            message: None,
        }
    }

    pub fn failed(language: &str, message: impl Into<String>) -> Self {
        WarmupRecord {
            language: language.to_string(),
            ok: false,
            checked_at: now_s(),
            message: Some(message.into()),
        }
    }
}

pub fn read_warmup(dir: &ArtifactDir) -> Result<BTreeMap<String, WarmupRecord>, CanvasError> {
    let path = dir.warmup_path();
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let bytes = std::fs::read(&path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

pub fn write_warmup(
    dir: &ArtifactDir,
    records: &BTreeMap<String, WarmupRecord>,
) -> Result<(), CanvasError> {
    let bytes = serde_json::to_vec_pretty(records)?;
    dir.write_atomic(&dir.warmup_path(), &bytes)?;
    Ok(())
}
