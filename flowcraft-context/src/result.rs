use chrono::{DateTime, Utc};
use flowcraft_core::Variables;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Record of one node execution (real or synthesized).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default)]
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub returned_value: Value,
    #[serde(default)]
    pub params_used: Variables,
    /// Produced by the engine itself rather than by an executor
    #[serde(default)]
    pub synthesized: bool,
}

impl ExecutionResult {
    pub fn success(
        output: impl Into<String>,
        returned_value: Value,
        started_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            duration_ms,
            started_at,
            returned_value,
            params_used: Variables::new(),
            synthesized: false,
        }
    }

    pub fn failure(
        error: impl Into<String>,
        started_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
            duration_ms,
            started_at,
            returned_value: Value::Null,
            params_used: Variables::new(),
            synthesized: false,
        }
    }

    /// Zero-duration success recorded for conditional and sink nodes.
    pub fn synthesized(returned_value: Value) -> Self {
        Self {
            synthesized: true,
            ..Self::success("", returned_value, Utc::now(), 0)
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    pub fn with_params_used(mut self, params_used: Variables) -> Self {
        self.params_used = params_used;
        self
    }
}
