//! Test doubles for driving the orchestrator without real processes.

use crate::executor::{
    ExecutionRequest, ExecutorEvent, ExecutorOutcome, NodeExecutor,
};
use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// What a scripted node does when it is run.
#[derive(Debug, Clone)]
pub enum Script {
    /// Succeed with the given returned value
    Return(Value),
    /// Print the lines, then succeed with the value
    Print(Vec<String>, Value),
    /// Report a failure
    Fail(String),
    /// Error out of the stream itself
    Crash(String),
    /// End the stream without a result
    Silent,
    /// Wait until cancelled, then end without a result
    Hang,
}

/// Executor returning pre-programmed outcomes and recording every call.
/// Nodes without a script succeed with `null`.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    scripts: HashMap<String, Script>,
    delay: Option<Duration>,
    calls: Mutex<Vec<ExecutionRequest>>,
    stop_requests: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, node_id: &str, script: Script) -> Self {
        self.scripts.insert(node_id.to_string(), script);
        self
    }

    pub fn returning(self, node_id: &str, value: Value) -> Self {
        self.on(node_id, Script::Return(value))
    }

    pub fn failing(self, node_id: &str, error: &str) -> Self {
        self.on(node_id, Script::Fail(error.to_string()))
    }

    /// Sleeps this long before answering each call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn calls(&self) -> Vec<ExecutionRequest> {
        self.calls.lock().await.clone()
    }

    pub async fn invoked_nodes(&self) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .map(|r| r.node_id.clone())
            .collect()
    }

    pub fn stop_requests(&self) -> usize {
        self.stop_requests.load(Ordering::SeqCst)
    }

    async fn respond(
        &self,
        request: ExecutionRequest,
        cancel: CancellationToken,
    ) -> Vec<Result<ExecutorEvent>> {
        let script = self
            .scripts
            .get(&request.node_id)
            .cloned()
            .unwrap_or(Script::Return(Value::Null));
        self.calls.lock().await.push(request);

        if let Some(delay) = self.delay {
            tokio::select! {
                _ = cancel.cancelled() => return Vec::new(),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        match script {
            Script::Return(value) => {
                vec![Ok(ExecutorEvent::Finished(ExecutorOutcome::succeeded(
                    value,
                )))]
            }
            Script::Print(lines, value) => lines
                .into_iter()
                .map(|line| Ok(ExecutorEvent::Stdout(line)))
                .chain(std::iter::once(Ok(ExecutorEvent::Finished(
                    ExecutorOutcome::succeeded(value),
                ))))
                .collect(),
            Script::Fail(error) => {
                vec![Ok(ExecutorEvent::Finished(ExecutorOutcome::failed(error)))]
            }
            Script::Crash(message) => vec![Err(anyhow!(message))],
            Script::Silent => Vec::new(),
            Script::Hang => {
                cancel.cancelled().await;
                Vec::new()
            }
        }
    }
}

impl NodeExecutor for ScriptedExecutor {
    fn run(
        &self,
        request: ExecutionRequest,
        cancel: CancellationToken,
    ) -> BoxStream<'_, Result<ExecutorEvent>> {
        stream::once(self.respond(request, cancel))
            .flat_map(stream::iter)
            .boxed()
    }

    fn request_stop(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.stop_requests.fetch_add(1, Ordering::SeqCst);
        })
    }
}
