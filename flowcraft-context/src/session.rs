use crate::result::ExecutionResult;
use chrono::{DateTime, Utc};
use flowcraft_core::{Bindings, Graph, LinkTrace, Variables};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Per-node sub-state within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Pending,
    Running,
    Completed,
    Error,
    /// Blocked by a branch that was not taken
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Idle,
    Running,
    Completed,
    Failed,
    Stopped,
    /// Unexpected internal fault
    Error,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Idle | RunStatus::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RunStatus::Idle => "idle",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Stopped => "stopped",
            RunStatus::Error => "error",
        };
        f.write_str(label)
    }
}

/// Terminal summary handed to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub session_id: String,
    pub status: RunStatus,
    pub failed_node_id: Option<String>,
    pub error_message: Option<String>,
    /// Action nodes actually handed to the executor
    pub executed: usize,
    pub total_steps: usize,
    pub duration_ms: u64,
}

/// Serializable form of a finished session, as written to history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionExport {
    pub session_id: String,
    pub status: RunStatus,
    pub order: Vec<String>,
    pub results: BTreeMap<String, ExecutionResult>,
    pub bindings: Bindings,
    pub blocked: BTreeSet<String>,
    #[serde(default)]
    pub node_states: BTreeMap<String, NodeState>,
    #[serde(default)]
    pub branch_traces: BTreeMap<String, Vec<LinkTrace>>,
    #[serde(default)]
    pub failed_node_id: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub executed: usize,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resumed_from: Option<String>,
}

/// Mutable record of one execution. Owned by the orchestrator loop for
/// the lifetime of the run.
#[derive(Debug, Clone)]
pub struct RunSession {
    pub session_id: String,
    pub status: RunStatus,
    pub order: Vec<String>,
    pub results: BTreeMap<String, ExecutionResult>,
    pub bindings: Bindings,
    pub blocked: BTreeSet<String>,
    pub node_states: BTreeMap<String, NodeState>,
    pub branch_traces: BTreeMap<String, Vec<LinkTrace>>,
    pub aborted: bool,
    pub cursor: usize,
    pub executed: usize,
    pub failed_node_id: Option<String>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub resumed_from: Option<String>,
    /// Variables carried over from an earlier run, consulted when a node
    /// has no upstream values of its own
    pub supplementary: Variables,
}

impl RunSession {
    pub fn new(order: Vec<String>) -> Self {
        let node_states = order
            .iter()
            .map(|id| (id.clone(), NodeState::Pending))
            .collect();
        Self {
            session_id: Uuid::new_v4().to_string(),
            status: RunStatus::Idle,
            order,
            results: BTreeMap::new(),
            bindings: Bindings::new(),
            blocked: BTreeSet::new(),
            node_states,
            branch_traces: BTreeMap::new(),
            aborted: false,
            cursor: 0,
            executed: 0,
            failed_node_id: None,
            error_message: None,
            started_at: Utc::now(),
            finished_at: None,
            resumed_from: None,
            supplementary: Variables::new(),
        }
    }

    pub fn mark_running(&mut self) {
        self.status = RunStatus::Running;
        self.started_at = Utc::now();
        tracing::info!(
            session_id = %self.session_id,
            total_steps = self.order.len(),
            "run started"
        );
    }

    pub fn node_state(&self, node_id: &str) -> Option<NodeState> {
        self.node_states.get(node_id).copied()
    }

    /// Marks an Action node as handed to the executor.
    pub fn start_node(&mut self, node_id: &str, step_index: usize) {
        self.cursor = step_index;
        self.executed += 1;
        self.node_states
            .insert(node_id.to_string(), NodeState::Running);
        tracing::info!(session_id = %self.session_id, node = %node_id, "node starting");
    }

    pub fn complete_node(&mut self, node_id: &str, result: ExecutionResult) {
        tracing::info!(
            session_id = %self.session_id,
            node = %node_id,
            duration_ms = result.duration_ms,
            "node completed"
        );
        self.bindings
            .insert(node_id.to_string(), result.returned_value.clone());
        self.results.insert(node_id.to_string(), result);
        self.node_states
            .insert(node_id.to_string(), NodeState::Completed);
    }

    pub fn fail_node(&mut self, node_id: &str, result: ExecutionResult) {
        let error = result.error.clone().unwrap_or_default();
        tracing::error!(
            session_id = %self.session_id,
            node = %node_id,
            duration_ms = result.duration_ms,
            error = %error,
            "node failed"
        );
        self.results.insert(node_id.to_string(), result);
        self.node_states.insert(node_id.to_string(), NodeState::Error);
    }

    /// Records a conditional node's evaluation as a zero-duration success.
    pub fn complete_conditional(
        &mut self,
        node_id: &str,
        step_index: usize,
        traces: Vec<LinkTrace>,
    ) {
        self.cursor = step_index;
        self.results.insert(
            node_id.to_string(),
            ExecutionResult::synthesized(Value::Null),
        );
        self.branch_traces.insert(node_id.to_string(), traces);
        self.node_states
            .insert(node_id.to_string(), NodeState::Completed);
        tracing::info!(session_id = %self.session_id, node = %node_id, "branch resolved");
    }

    /// Stores the synthesized capture of a sink node.
    pub fn record_capture(&mut self, sink_id: &str, captured: Value) {
        tracing::debug!(session_id = %self.session_id, node = %sink_id, "output captured");
        self.results.insert(
            sink_id.to_string(),
            ExecutionResult::synthesized(captured),
        );
        self.node_states
            .insert(sink_id.to_string(), NodeState::Completed);
    }

    pub fn skip_node(&mut self, node_id: &str, step_index: usize) {
        self.cursor = step_index;
        self.node_states
            .insert(node_id.to_string(), NodeState::Skipped);
        tracing::warn!(
            session_id = %self.session_id,
            node = %node_id,
            reason = "blocked",
            "node skipped"
        );
    }

    pub fn is_blocked(&self, node_id: &str) -> bool {
        self.blocked.contains(node_id)
    }

    pub fn abort(&mut self) {
        self.aborted = true;
    }

    /// Moves the session to a terminal status. Only the first call has an
    /// effect.
    pub fn finish(
        &mut self,
        status: RunStatus,
        failed_node_id: Option<String>,
        error_message: Option<String>,
    ) {
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        self.failed_node_id = failed_node_id;
        self.error_message = error_message;
        self.finished_at = Some(Utc::now());

        match status {
            RunStatus::Completed => {
                tracing::info!(session_id = %self.session_id, "run completed")
            }
            RunStatus::Stopped => {
                tracing::warn!(session_id = %self.session_id, "run stopped")
            }
            _ => tracing::error!(
                session_id = %self.session_id,
                status = %status,
                failed_node = ?self.failed_node_id,
                error = ?self.error_message,
                "run ended"
            ),
        }
    }

    pub fn duration_ms(&self) -> u64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds().max(0) as u64
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            session_id: self.session_id.clone(),
            status: self.status,
            failed_node_id: self.failed_node_id.clone(),
            error_message: self.error_message.clone(),
            executed: self.executed,
            total_steps: self.order.len(),
            duration_ms: self.duration_ms(),
        }
    }

    pub fn export(&self) -> SessionExport {
        SessionExport {
            session_id: self.session_id.clone(),
            status: self.status,
            order: self.order.clone(),
            results: self.results.clone(),
            bindings: self.bindings.clone(),
            blocked: self.blocked.clone(),
            node_states: self.node_states.clone(),
            branch_traces: self.branch_traces.clone(),
            failed_node_id: self.failed_node_id.clone(),
            error_message: self.error_message.clone(),
            executed: self.executed,
            started_at: self.started_at,
            finished_at: self.finished_at,
            resumed_from: self.resumed_from.clone(),
        }
    }

    /// Rebuilds a session from a history entry so it can be resumed.
    pub fn restore(export: &SessionExport) -> Self {
        Self {
            session_id: export.session_id.clone(),
            status: export.status,
            order: export.order.clone(),
            results: export.results.clone(),
            bindings: export.bindings.clone(),
            blocked: export.blocked.clone(),
            node_states: export.node_states.clone(),
            branch_traces: export.branch_traces.clone(),
            aborted: false,
            cursor: 0,
            executed: export.executed,
            failed_node_id: export.failed_node_id.clone(),
            error_message: export.error_message.clone(),
            started_at: export.started_at,
            finished_at: export.finished_at,
            resumed_from: export.resumed_from.clone(),
            supplementary: Variables::new(),
        }
    }

    /// Copies the state of `node_ids` over from `prior` without running
    /// anything.
    pub fn seed_from(&mut self, prior: &RunSession, node_ids: &[String]) {
        for id in node_ids {
            if let Some(result) = prior.results.get(id) {
                self.results.insert(id.clone(), result.clone());
            }
            if let Some(value) = prior.bindings.get(id) {
                self.bindings.insert(id.clone(), value.clone());
            }
            if let Some(traces) = prior.branch_traces.get(id) {
                self.branch_traces.insert(id.clone(), traces.clone());
            }
            if let Some(state) = prior.node_states.get(id) {
                self.node_states.insert(id.clone(), *state);
            }
        }
    }

    /// Successful returned values of `node_ids` merged into one variable
    /// map. Records contribute their fields; other values are named after
    /// their node.
    pub fn accumulated_variables(
        &self,
        graph: &Graph,
        node_ids: &[String],
    ) -> Variables {
        let mut variables = Variables::new();
        for id in node_ids {
            let Some(result) = self.results.get(id) else {
                continue;
            };
            if !result.success || result.returned_value.is_null() {
                continue;
            }
            match &result.returned_value {
                Value::Object(fields) => {
                    for (name, value) in fields {
                        variables.insert(name.clone(), value.clone());
                    }
                }
                other => {
                    let name = graph
                        .node(id)
                        .map(|n| n.variable_name())
                        .unwrap_or_else(|| format!("node_{id}"));
                    variables.insert(name, other.clone());
                }
            }
        }
        variables
    }

    pub fn count_in_state(&self, state: NodeState) -> usize {
        self.node_states.values().filter(|s| **s == state).count()
    }
}
