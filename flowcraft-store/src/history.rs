//! # FlowCraft Store - execution history
//!
//! One JSON file per execution, grouped by flowchart:
//! `<root>/<flowchart>/<execution_id>.json`.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use flowcraft_context::{RunStatus, SessionExport};
use flowcraft_runtime::HistoryStore;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// A stored execution as it appears on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub execution_id: String,
    pub timestamp: DateTime<Utc>,
    pub flowchart_name: String,
    pub execution_data: SessionExport,
}

impl HistoryEntry {
    pub fn summary(&self) -> HistorySummary {
        HistorySummary::from_export(&self.execution_data)
    }
}

#[derive(Debug, Clone)]
pub struct FileHistoryStore {
    root: PathBuf,
    flowchart: String,
}

impl FileHistoryStore {
    /// A trailing `.json` on the flowchart name is ignored.
    pub fn new(root: impl Into<PathBuf>, flowchart: &str) -> Self {
        let flowchart = flowchart.strip_suffix(".json").unwrap_or(flowchart);
        Self {
            root: root.into(),
            flowchart: flowchart.to_string(),
        }
    }

    pub fn flowchart_name(&self) -> &str {
        &self.flowchart
    }

    pub fn dir(&self) -> PathBuf {
        self.root.join(&self.flowchart)
    }

    /// Ids name a file inside [`Self::dir`]; anything that could leave it
    /// is rejected.
    fn entry_path(&self, execution_id: &str) -> Result<PathBuf> {
        if execution_id.is_empty()
            || execution_id.starts_with('.')
            || execution_id.contains(['/', '\\', '\0'])
        {
            bail!("Invalid execution id: {execution_id:?}");
        }
        Ok(self.dir().join(format!("{execution_id}.json")))
    }

    /// Writes the export and returns the execution id it was stored under.
    pub async fn write(&self, export: SessionExport) -> Result<String> {
        let dir = self.dir();
        fs::create_dir_all(&dir).await.with_context(|| {
            format!("Failed to create history directory: {:?}", dir)
        })?;

        let entry = HistoryEntry {
            execution_id: export.session_id.clone(),
            timestamp: Utc::now(),
            flowchart_name: self.flowchart.clone(),
            execution_data: export,
        };
        let path = self.entry_path(&entry.execution_id)?;
        let content = serde_json::to_string_pretty(&entry)
            .with_context(|| "Failed to serialize history entry")?;
        fs::write(&path, content).await.with_context(|| {
            format!("Failed to write history file: {:?}", path)
        })?;

        tracing::debug!(
            execution_id = %entry.execution_id,
            flowchart = %self.flowchart,
            "execution saved to history"
        );
        Ok(entry.execution_id)
    }

    /// All stored executions, newest first. Unreadable files are skipped.
    pub async fn list(&self) -> Result<Vec<HistoryEntry>> {
        let dir = self.dir();
        let mut reader = match fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Vec::new())
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read history directory: {:?}", dir)
                })
            }
        };

        let mut entries = Vec::new();
        while let Some(item) = reader.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_entry(&path).await {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(path = ?path, error = %e, "skipping unreadable history file")
                }
            }
        }

        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }

    pub async fn get(&self, execution_id: &str) -> Result<Option<HistoryEntry>> {
        let path = self.entry_path(execution_id)?;
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(None);
        }
        read_entry(&path).await.map(Some)
    }

    /// Returns whether an entry was removed.
    pub async fn delete(&self, execution_id: &str) -> Result<bool> {
        let path = self.entry_path(execution_id)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(execution_id = %execution_id, "history entry deleted");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| {
                format!("Failed to delete history file: {:?}", path)
            }),
        }
    }

    /// Removes every entry of this flowchart, returning how many went.
    pub async fn clear(&self) -> Result<usize> {
        let entries = self.list().await?;
        let mut removed = 0;
        for entry in &entries {
            if self.delete(&entry.execution_id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

async fn read_entry(path: &Path) -> Result<HistoryEntry> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read history file: {:?}", path))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse history file: {:?}", path))
}

impl HistoryStore for FileHistoryStore {
    fn save(&self, export: SessionExport) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move { self.write(export).await.map(|_| ()) })
    }
}

/// Condensed view of a stored execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistorySummary {
    pub status: RunStatus,
    /// Nodes handed to an executor
    pub total_nodes: usize,
    pub successful_nodes: usize,
    pub success_rate: u32,
    pub failed_node_id: Option<String>,
    /// Sum of executor run times
    pub elapsed_ms: u64,
}

impl HistorySummary {
    pub fn from_export(export: &SessionExport) -> Self {
        let executed: Vec<_> = export
            .order
            .iter()
            .filter_map(|id| export.results.get(id).map(|r| (id, r)))
            .filter(|(_, r)| !r.synthesized)
            .collect();

        let total_nodes = executed.len();
        let successful_nodes = executed.iter().filter(|(_, r)| r.success).count();
        let success_rate = if total_nodes == 0 {
            0
        } else {
            ((successful_nodes as f64 / total_nodes as f64) * 100.0).round() as u32
        };
        let failed_node_id = export.failed_node_id.clone().or_else(|| {
            executed
                .iter()
                .find(|(_, r)| !r.success)
                .map(|(id, _)| id.to_string())
        });
        let elapsed_ms = executed.iter().map(|(_, r)| r.duration_ms).sum();

        Self {
            status: export.status,
            total_nodes,
            successful_nodes,
            success_rate,
            failed_node_id,
            elapsed_ms,
        }
    }

    pub fn elapsed(&self) -> String {
        format_elapsed(self.elapsed_ms)
    }
}

/// `850ms`, `2.50s`, `3m 5s`
pub fn format_elapsed(ms: u64) -> String {
    if ms < 1_000 {
        format!("{ms}ms")
    } else if ms < 60_000 {
        format!("{:.2}s", ms as f64 / 1000.0)
    } else {
        format!("{}m {}s", ms / 60_000, (ms % 60_000) / 1000)
    }
}
