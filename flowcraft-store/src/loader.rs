use crate::document::FlowchartDocument;
use anyhow::{Context, Result};
use flowcraft_core::Graph;
use flowcraft_runtime::GraphStore;
use futures::future::BoxFuture;
use std::fs;
use std::path::{Path, PathBuf};

/// Loads flowchart documents from files or strings.
pub struct GraphLoader;

impl GraphLoader {
    /// Parses a JSON flowchart document
    pub fn document_from_json_str(content: &str) -> Result<FlowchartDocument> {
        serde_json::from_str(content)
            .with_context(|| "Failed to parse JSON flowchart")
    }

    /// Parses a YAML flowchart document
    pub fn document_from_yaml_str(content: &str) -> Result<FlowchartDocument> {
        serde_yaml::from_str(content)
            .with_context(|| "Failed to parse YAML flowchart")
    }

    pub fn from_json_str(content: &str) -> Result<Graph> {
        Self::document_from_json_str(content)?.to_graph()
    }

    pub fn from_yaml_str(content: &str) -> Result<Graph> {
        Self::document_from_yaml_str(content)?.to_graph()
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Graph> {
        let content = fs::read_to_string(&path).with_context(|| {
            format!("Failed to read JSON file: {:?}", path.as_ref())
        })?;
        Self::from_json_str(&content)
            .with_context(|| format!("Invalid flowchart: {:?}", path.as_ref()))
    }

    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Graph> {
        let content = fs::read_to_string(&path).with_context(|| {
            format!("Failed to read YAML file: {:?}", path.as_ref())
        })?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid flowchart: {:?}", path.as_ref()))
    }

    /// Picks the format from the file extension; anything that is not
    /// `.yaml`/`.yml` is read as JSON.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Graph> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_file(path),
            _ => Self::from_json_file(path),
        }
    }

    /// Saves a graph as a JSON flowchart document
    pub fn save_json<P: AsRef<Path>>(graph: &Graph, path: P) -> Result<()> {
        let document = FlowchartDocument::from_graph(graph);
        let json_content = serde_json::to_string_pretty(&document)
            .with_context(|| "Failed to serialize flowchart to JSON")?;

        fs::write(&path, json_content).with_context(|| {
            format!("Failed to write JSON file: {:?}", path.as_ref())
        })?;

        Ok(())
    }
}

/// Graph store reading a flowchart file on every load.
#[derive(Debug, Clone)]
pub struct FileGraphStore {
    path: PathBuf,
}

impl FileGraphStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flowchart name used for history, the file stem
    pub fn flowchart_name(&self) -> String {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("flowchart")
            .to_string()
    }
}

impl GraphStore for FileGraphStore {
    fn load(&self) -> BoxFuture<'_, Result<Graph>> {
        Box::pin(async move {
            let path = self.path.clone();
            let graph = tokio::task::spawn_blocking(move || {
                GraphLoader::from_path(&path)
            })
            .await
            .context("graph loading task panicked")??;
            tracing::debug!(
                path = ?self.path,
                nodes = graph.nodes().len(),
                "flowchart loaded"
            );
            Ok(graph)
        })
    }
}
