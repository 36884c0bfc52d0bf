//! # FlowCraft Runtime - subprocess executor
//!
//! Runs each Action node as `program [args..] <executable>` and speaks a
//! small line protocol over stdio: the request is written to stdin as JSON,
//! every stdout line is streamed back, and the result is the JSON found
//! between the configured start and end marker lines.

use crate::config::ProcessExecutorConfig;
use crate::executor::{
    ExecutionRequest, ExecutorEvent, ExecutorOutcome, NodeExecutor,
};
use anyhow::{anyhow, Context, Result};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

type EventSender = mpsc::Sender<Result<ExecutorEvent>>;

pub struct ProcessExecutor {
    config: ProcessExecutorConfig,
    running: Arc<Mutex<HashMap<u64, CancellationToken>>>,
    next_id: AtomicU64,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessExecutor {
    pub fn new() -> Self {
        Self::with_config(ProcessExecutorConfig::default())
    }

    pub fn with_config(config: ProcessExecutorConfig) -> Self {
        Self {
            config,
            running: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &ProcessExecutorConfig {
        &self.config
    }
}

impl NodeExecutor for ProcessExecutor {
    fn run(
        &self,
        request: ExecutionRequest,
        cancel: CancellationToken,
    ) -> BoxStream<'_, Result<ExecutorEvent>> {
        let (tx, rx) = mpsc::channel(64);
        let config = self.config.clone();
        let running = self.running.clone();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        tokio::spawn(async move {
            let stop = CancellationToken::new();
            running.lock().await.insert(id, stop.clone());

            let node_id = request.node_id.clone();
            let result =
                run_child(&config, request, &cancel, &stop, &tx).await;
            running.lock().await.remove(&id);

            if let Err(e) = result {
                tracing::error!(node = %node_id, error = %e, "process executor failed");
                let _ = tx.send(Err(e)).await;
            }
        });

        Box::pin(ReceiverStream::new(rx))
    }

    fn request_stop(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let running = self.running.lock().await;
            tracing::info!(processes = running.len(), "stopping running processes");
            for token in running.values() {
                token.cancel();
            }
        })
    }
}

async fn run_child(
    config: &ProcessExecutorConfig,
    request: ExecutionRequest,
    cancel: &CancellationToken,
    stop: &CancellationToken,
    tx: &EventSender,
) -> Result<()> {
    let executable = request
        .executable
        .clone()
        .ok_or_else(|| anyhow!("node {} has no executable", request.node_id))?;

    let mut command = Command::new(&config.program);
    command
        .args(&config.args)
        .arg(&executable)
        .envs(&config.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &config.working_dir {
        command.current_dir(dir);
    }

    let mut child = command
        .spawn()
        .with_context(|| format!("failed to spawn {} {}", config.program, executable))?;
    tracing::debug!(node = %request.node_id, executable = %executable, "process spawned");

    if let Some(mut stdin) = child.stdin.take() {
        let payload = serde_json::to_vec(&request)
            .context("failed to encode execution request")?;
        stdin
            .write_all(&payload)
            .await
            .context("failed to write request to stdin")?;
        // closing stdin signals the end of the request
        drop(stdin);
    }

    let stdout = child.stdout.take().context("stdout was not captured")?;
    let mut stderr = child.stderr.take().context("stderr was not captured")?;
    let stderr_reader = tokio::spawn(async move {
        let mut text = String::new();
        stderr.read_to_string(&mut text).await.map(|_| text)
    });

    let mut lines = BufReader::new(stdout).lines();
    let mut parser = ResultParser::new(&config.result_start, &config.result_end);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                child.kill().await.ok();
                tracing::info!(node = %request.node_id, "process killed on cancellation");
                return Ok(());
            }
            _ = stop.cancelled() => {
                child.kill().await.ok();
                tracing::info!(node = %request.node_id, "process killed on stop request");
                return Ok(());
            }
            line = lines.next_line() => {
                match line.context("failed to read process output")? {
                    Some(line) => {
                        if let Some(chunk) = parser.feed(line) {
                            if tx.send(Ok(ExecutorEvent::Stdout(chunk))).await.is_err() {
                                // receiver gone, nobody is waiting for us
                                child.kill().await.ok();
                                return Ok(());
                            }
                        }
                    }
                    None => break,
                }
            }
        }
    }

    let status = child.wait().await.context("failed to wait for process")?;
    let stderr_text = stderr_reader
        .await
        .context("stderr reader panicked")?
        .context("failed to read stderr")?;

    let outcome = match parser.finish() {
        Some(result) => outcome_from_result(result),
        None if status.success() => ExecutorOutcome::succeeded(Value::Null),
        None => {
            let error = if stderr_text.trim().is_empty() {
                format!("process exited with {status}")
            } else {
                stderr_text.trim().to_string()
            };
            ExecutorOutcome::failed(error)
        }
    };

    let _ = tx.send(Ok(ExecutorEvent::Finished(outcome))).await;
    Ok(())
}

/// Splits process output into streamed lines and the result block.
#[derive(Debug)]
struct ResultParser {
    start: String,
    end: String,
    capturing: bool,
    buffer: String,
    result: Option<Value>,
}

impl ResultParser {
    fn new(start: &str, end: &str) -> Self {
        Self {
            start: start.to_string(),
            end: end.to_string(),
            capturing: false,
            buffer: String::new(),
            result: None,
        }
    }

    /// Returns the line if it is ordinary output.
    fn feed(&mut self, line: String) -> Option<String> {
        let trimmed = line.trim();
        if trimmed == self.start {
            self.capturing = true;
            self.buffer.clear();
            return None;
        }
        if trimmed == self.end && self.capturing {
            self.capturing = false;
            match serde_json::from_str(self.buffer.trim()) {
                Ok(value) => self.result = Some(value),
                Err(e) => {
                    tracing::warn!(error = %e, "malformed result block ignored")
                }
            }
            return None;
        }
        if self.capturing {
            self.buffer.push_str(&line);
            self.buffer.push('\n');
            return None;
        }
        Some(line)
    }

    fn finish(self) -> Option<Value> {
        self.result
    }
}

fn outcome_from_result(result: Value) -> ExecutorOutcome {
    let text = |key: &str| {
        result
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let params_used = result
        .get("params_used")
        .or_else(|| result.get("function_args"))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    ExecutorOutcome {
        success: result
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        output: text("output").unwrap_or_default(),
        error: text("error").filter(|e| !e.is_empty()),
        returned_value: result.get("return_value").cloned().unwrap_or(Value::Null),
        params_used,
    }
}
