//! # FlowCraft Store
//!
//! Flowchart documents (JSON or YAML), file-backed graph and history
//! stores, and runner settings.

mod document;
mod history;
mod loader;
mod settings;

pub use document::{
    node_kind, DataSource, DataVariable, FlowchartDocument, GroupDocument,
    LinkDocument, NodeDocument,
};
pub use history::{
    format_elapsed, FileHistoryStore, HistoryEntry, HistorySummary,
};
pub use loader::{FileGraphStore, GraphLoader};
pub use settings::{RunnerSettings, SettingsLoader};

/// Prelude module for store functionality
pub mod prelude {
    pub use crate::{
        FileGraphStore, FileHistoryStore, FlowchartDocument, GraphLoader,
        HistoryEntry, HistorySummary, RunnerSettings, SettingsLoader,
    };
}
