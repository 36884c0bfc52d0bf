use flowcraft_core::PlannerConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub planner: PlannerConfig,
    /// Capacity of the progress broadcast channel
    pub event_capacity: usize,
    /// Export finished sessions to the history store
    pub save_history: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            planner: PlannerConfig::default(),
            event_capacity: 256,
            save_history: true,
        }
    }
}

/// Subprocess executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessExecutorConfig {
    /// Interpreter or runner invoked for every Action node
    pub program: String,
    /// Arguments placed before the executable reference
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub result_start: String,
    pub result_end: String,
}

impl Default for ProcessExecutorConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
            result_start: "__RESULT_START__".to_string(),
            result_end: "__RESULT_END__".to_string(),
        }
    }
}

impl ProcessExecutorConfig {
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}
