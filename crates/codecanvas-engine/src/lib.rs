//! CodeCanvas Engine — graph building, snapshot publication, incremental
//! refresh, and the service facade

pub mod builder;
pub mod labels;
pub mod render;
pub mod service;
pub mod walker;
pub mod watcher;


pub use render::{ArchitectureRenderer, DotRenderer};
pub use service::{Canvas, RefreshSummary, ResolveSummary};
pub use watcher::CanvasWatcher;
