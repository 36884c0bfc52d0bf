use anyhow::{Context, Result};
use flowcraft_context::RunSession;
use flowcraft_core::{ExecutionPlan, FlowPlanner, Graph, OrderPlanner};
use flowcraft_runtime::{
    GraphStore, NodeExecutor, ProcessExecutor, RunOrchestrator, RunOutcome,
};
use flowcraft_store::{FileGraphStore, FileHistoryStore, RunnerSettings};
use std::path::PathBuf;
use std::sync::Arc;

/// Wires a flowchart file, its history directory and an orchestrator
/// together from [`RunnerSettings`].
pub struct Runner {
    settings: RunnerSettings,
    graph_store: FileGraphStore,
    history: Arc<FileHistoryStore>,
    orchestrator: Arc<RunOrchestrator>,
}

impl Runner {
    /// Runner executing Action nodes as subprocesses
    pub fn new(flowchart: impl Into<PathBuf>, settings: RunnerSettings) -> Self {
        let executor = Arc::new(ProcessExecutor::with_config(settings.process.clone()));
        Self::with_executor(flowchart, settings, executor)
    }

    pub fn with_executor(
        flowchart: impl Into<PathBuf>,
        settings: RunnerSettings,
        executor: Arc<dyn NodeExecutor>,
    ) -> Self {
        let graph_store = FileGraphStore::new(flowchart);
        let history = Arc::new(FileHistoryStore::new(
            &settings.history_dir,
            &graph_store.flowchart_name(),
        ));
        let orchestrator = Arc::new(
            RunOrchestrator::with_config(executor, settings.orchestrator.clone())
                .with_history(history.clone()),
        );
        Self {
            settings,
            graph_store,
            history,
            orchestrator,
        }
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Shared handle, e.g. for stopping a run from a signal handler
    pub fn orchestrator(&self) -> Arc<RunOrchestrator> {
        self.orchestrator.clone()
    }

    pub fn history(&self) -> &FileHistoryStore {
        &self.history
    }

    pub async fn load(&self) -> Result<Graph> {
        self.graph_store.load().await
    }

    pub async fn plan(&self) -> Result<ExecutionPlan> {
        let graph = self.load().await?;
        let planner =
            OrderPlanner::with_config(self.settings.orchestrator.planner.clone());
        Ok(planner.plan(&graph)?)
    }

    pub async fn run(&self) -> Result<RunOutcome> {
        self.orchestrator.run_from_store(&self.graph_store).await
    }

    /// Resumes a stored execution at `node_id` against the current file.
    pub async fn resume(
        &self,
        execution_id: &str,
        node_id: &str,
    ) -> Result<RunOutcome> {
        let entry = self
            .history
            .get(execution_id)
            .await?
            .with_context(|| format!("No stored execution {execution_id}"))?;
        let prior = RunSession::restore(&entry.execution_data);
        let graph = self.load().await?;
        let outcome = self.orchestrator.resume(&graph, node_id, &prior).await?;
        Ok(outcome)
    }
}
