use flowcraft_context::{NodeState, RunSummary};
use serde::Serialize;

/// A node changed state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub step_index: usize,
    pub total_steps: usize,
    pub node_id: String,
    pub state: NodeState,
    /// Action nodes handed to the executor so far
    pub executed: usize,
}

/// Everything an observer of a run can see.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    Started {
        session_id: String,
        total_steps: usize,
    },
    Progress(ProgressEvent),
    Output {
        node_id: String,
        chunk: String,
    },
    Finished(RunSummary),
}
