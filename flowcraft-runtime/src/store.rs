use anyhow::Result;
use flowcraft_context::SessionExport;
use flowcraft_core::Graph;
use futures::future::BoxFuture;
use tokio::sync::Mutex;

/// Persists finished sessions. Failures are logged by the caller and
/// never fail a run.
pub trait HistoryStore: Send + Sync + 'static {
    fn save(&self, export: SessionExport) -> BoxFuture<'_, Result<()>>;
}

/// Supplies the graph snapshot a run starts from.
pub trait GraphStore: Send + Sync {
    fn load(&self) -> BoxFuture<'_, Result<Graph>>;
}

/// Keeps exported sessions in memory.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    entries: Mutex<Vec<SessionExport>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<SessionExport> {
        self.entries.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn latest(&self) -> Option<SessionExport> {
        self.entries.lock().await.last().cloned()
    }
}

impl HistoryStore for MemoryHistoryStore {
    fn save(&self, export: SessionExport) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.entries.lock().await.push(export);
            Ok(())
        })
    }
}

/// Serves the same graph on every load.
#[derive(Debug, Clone)]
pub struct StaticGraphStore {
    graph: Graph,
}

impl StaticGraphStore {
    pub fn new(graph: Graph) -> Self {
        Self { graph }
    }
}

impl GraphStore for StaticGraphStore {
    fn load(&self) -> BoxFuture<'_, Result<Graph>> {
        let graph = self.graph.clone();
        Box::pin(async move { Ok(graph) })
    }
}
