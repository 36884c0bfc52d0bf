use flowcraft_core::Variables;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// One call into an executor for an Action node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub node_id: String,
    pub executable: Option<String>,
    pub args: Variables,
    #[serde(rename = "input_values")]
    pub manual_inputs: Variables,
}

/// Terminal result of an executor call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExecutorOutcome {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub returned_value: Value,
    pub params_used: Variables,
}

impl ExecutorOutcome {
    pub fn succeeded(returned_value: Value) -> Self {
        Self {
            success: true,
            returned_value,
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorEvent {
    /// A chunk of live output
    Stdout(String),
    /// Always the last event of a well-behaved stream
    Finished(ExecutorOutcome),
}

/// Runs the executable behind an Action node.
///
/// The stream yields any number of `Stdout` events followed by exactly one
/// `Finished`. A stream error, or a stream that ends without `Finished`,
/// is treated as an infrastructure failure unless the token was cancelled.
pub trait NodeExecutor: Send + Sync + 'static {
    fn run(
        &self,
        request: ExecutionRequest,
        cancel: CancellationToken,
    ) -> BoxStream<'_, anyhow::Result<ExecutorEvent>>;

    /// Best-effort termination of whatever is currently running.
    fn request_stop(&self) -> BoxFuture<'_, ()>;
}
