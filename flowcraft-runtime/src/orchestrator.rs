//! # FlowCraft Runtime - run orchestrator
//!
//! Drives one run at a time: plans the graph, walks the order strictly in
//! sequence, resolves branches, hands Action nodes to the executor and
//! exports the finished session to history exactly once.

use crate::config::OrchestratorConfig;
use crate::events::{ProgressEvent, RunEvent};
use crate::executor::{
    ExecutionRequest, ExecutorEvent, ExecutorOutcome, NodeExecutor,
};
use crate::store::{GraphStore, HistoryStore};
use chrono::Utc;
use flowcraft_context::{
    ExecutionResult, NodeState, RunSession, RunStatus, RunSummary,
};
use flowcraft_core::{
    propagate_block, ConditionEvaluator, FlowError, FlowPlanner, FlowResult,
    Graph, Node, NodeKind, OrderPlanner, VariableBinder,
};
use futures::StreamExt;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;

const CANCELLED_MESSAGE: &str = "execution was cancelled by user";

/// Terminal summary plus the full session it was taken from.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub session: RunSession,
}

/// How the step loop ended.
struct Termination {
    status: RunStatus,
    failed_node_id: Option<String>,
    error_message: Option<String>,
}

impl Termination {
    fn completed() -> Self {
        Self {
            status: RunStatus::Completed,
            failed_node_id: None,
            error_message: None,
        }
    }

    fn stopped() -> Self {
        Self {
            status: RunStatus::Stopped,
            failed_node_id: None,
            error_message: Some(CANCELLED_MESSAGE.to_string()),
        }
    }

    fn from_error(node_id: &str, error: FlowError) -> Self {
        let status = match &error {
            FlowError::Cancelled => return Self::stopped(),
            e if e.is_failure() => RunStatus::Failed,
            _ => RunStatus::Error,
        };
        let message = match error {
            FlowError::Execution { message, .. }
            | FlowError::Infrastructure { message, .. } => message,
            other => other.to_string(),
        };
        Self {
            status,
            failed_node_id: Some(node_id.to_string()),
            error_message: Some(message),
        }
    }
}

pub struct RunOrchestrator {
    executor: Arc<dyn NodeExecutor>,
    history: Option<Arc<dyn HistoryStore>>,
    config: OrchestratorConfig,
    planner: OrderPlanner,
    evaluator: ConditionEvaluator,
    binder: VariableBinder,
    events: broadcast::Sender<RunEvent>,
    active: Mutex<Option<CancellationToken>>,
}

impl RunOrchestrator {
    pub fn new(executor: Arc<dyn NodeExecutor>) -> Self {
        Self::with_config(executor, OrchestratorConfig::default())
    }

    pub fn with_config(
        executor: Arc<dyn NodeExecutor>,
        config: OrchestratorConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            executor,
            history: None,
            planner: OrderPlanner::with_config(config.planner.clone()),
            config,
            evaluator: ConditionEvaluator::new(),
            binder: VariableBinder::new(),
            events,
            active: Mutex::new(None),
        }
    }

    pub fn with_history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Progress, output and terminal events of every subsequent run.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    /// Requests the active run to stop. A no-op when nothing is running.
    pub async fn stop(&self) {
        let token = self.active.lock().await.clone();
        match token {
            Some(token) => {
                tracing::info!("stop requested");
                token.cancel();
                self.executor.request_stop().await;
            }
            None => tracing::debug!("stop requested with no active run"),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Plans and runs `graph`. A planning error returns `Err` and nothing
    /// is started or exported.
    pub async fn run(&self, graph: &Graph) -> FlowResult<RunOutcome> {
        let token = self.claim().await?;
        match self.planner.plan(graph) {
            Ok(plan) => {
                let session = RunSession::new(plan.order);
                Ok(self.execute(graph, session, 0, token).await)
            }
            Err(e) => {
                self.release().await;
                Err(e)
            }
        }
    }

    pub async fn run_from_store(
        &self,
        store: &dyn GraphStore,
    ) -> anyhow::Result<RunOutcome> {
        let graph = store.load().await?;
        Ok(self.run(&graph).await?)
    }

    /// Runs `graph` again starting at `node_id`, reusing everything
    /// `prior` recorded for the nodes before it. `prior` is not modified.
    pub async fn resume(
        &self,
        graph: &Graph,
        node_id: &str,
        prior: &RunSession,
    ) -> FlowResult<RunOutcome> {
        let token = self.claim().await?;
        match self.resumed_session(graph, node_id, prior) {
            Ok((session, start)) => {
                Ok(self.execute(graph, session, start, token).await)
            }
            Err(e) => {
                self.release().await;
                Err(e)
            }
        }
    }

    fn resumed_session(
        &self,
        graph: &Graph,
        node_id: &str,
        prior: &RunSession,
    ) -> FlowResult<(RunSession, usize)> {
        let plan = self.planner.plan(graph)?;
        let (before, _) = plan.split_at(node_id)?;
        let start = before.len();

        let mut session = RunSession::new(plan.order.clone());
        session.resumed_from = Some(prior.session_id.clone());
        session.seed_from(prior, before);
        session.supplementary = prior.accumulated_variables(graph, before);

        // earlier branch decisions still hold; replay them
        for id in before {
            let Some(traces) = prior.branch_traces.get(id) else {
                continue;
            };
            let (taken, not_taken): (Vec<_>, Vec<_>) =
                traces.iter().partition(|t| t.outcome);
            let true_targets: Vec<String> =
                taken.iter().map(|t| t.target.clone()).collect();
            let false_targets: Vec<String> =
                not_taken.iter().map(|t| t.target.clone()).collect();
            propagate_block(
                graph,
                &mut session.blocked,
                &false_targets,
                &true_targets,
            );
        }

        tracing::info!(
            prior_session = %prior.session_id,
            resume_node = %node_id,
            reused = start,
            variables = session.supplementary.len(),
            "resuming run"
        );
        Ok((session, start))
    }

    /// Takes the single run slot; a second run is refused while one is active.
    async fn claim(&self) -> FlowResult<CancellationToken> {
        let mut active = self.active.lock().await;
        if active.is_some() {
            tracing::warn!("run refused, another run is in progress");
            return Err(FlowError::AlreadyRunning);
        }
        let token = CancellationToken::new();
        *active = Some(token.clone());
        Ok(token)
    }

    async fn release(&self) {
        *self.active.lock().await = None;
    }

    async fn execute(
        &self,
        graph: &Graph,
        mut session: RunSession,
        start: usize,
        token: CancellationToken,
    ) -> RunOutcome {
        if session.order.is_empty() {
            tracing::warn!(session_id = %session.session_id, "nothing to execute");
            session.finish(
                RunStatus::Failed,
                None,
                Some("nothing to execute".to_string()),
            );
            self.release().await;
            return self.conclude(session).await;
        }

        session.mark_running();
        self.emit(RunEvent::Started {
            session_id: session.session_id.clone(),
            total_steps: session.order.len(),
        });

        let termination = self.drive(graph, &mut session, start, &token).await;
        if termination.status == RunStatus::Stopped {
            session.abort();
        }
        session.finish(
            termination.status,
            termination.failed_node_id,
            termination.error_message,
        );

        self.release().await;
        self.conclude(session).await
    }

    /// Exports the session and announces the terminal summary.
    async fn conclude(&self, session: RunSession) -> RunOutcome {
        if self.config.save_history {
            if let Some(history) = &self.history {
                if let Err(e) = history.save(session.export()).await {
                    tracing::warn!(
                        session_id = %session.session_id,
                        error = %e,
                        "failed to save run history"
                    );
                }
            }
        }

        let summary = session.summary();
        self.emit(RunEvent::Finished(summary.clone()));
        RunOutcome { summary, session }
    }

    async fn drive(
        &self,
        graph: &Graph,
        session: &mut RunSession,
        start: usize,
        token: &CancellationToken,
    ) -> Termination {
        let order = session.order.clone();

        for (index, node_id) in order.iter().enumerate().skip(start) {
            // let a stop requested on this thread land between steps
            tokio::task::yield_now().await;
            if token.is_cancelled() || session.aborted {
                return Termination::stopped();
            }

            let node = match graph.require_node(node_id) {
                Ok(node) => node,
                Err(error) => return Termination::from_error(node_id, error),
            };

            if session.is_blocked(node_id) {
                session.skip_node(node_id, index);
                self.progress(session, index, node_id, NodeState::Skipped);
                continue;
            }

            match node.kind {
                NodeKind::Conditional => {
                    let decision =
                        self.evaluator.evaluate(graph, node_id, &session.bindings);
                    propagate_block(
                        graph,
                        &mut session.blocked,
                        &decision.false_targets,
                        &decision.true_targets,
                    );
                    session.complete_conditional(node_id, index, decision.traces);
                    self.progress(session, index, node_id, NodeState::Completed);
                }
                NodeKind::Action => {
                    if let Err(error) = self
                        .run_action(graph, session, node, index, token)
                        .await
                    {
                        return Termination::from_error(node_id, error);
                    }
                }
                NodeKind::Input | NodeKind::Sink => {}
            }
        }

        Termination::completed()
    }

    async fn run_action(
        &self,
        graph: &Graph,
        session: &mut RunSession,
        node: &Node,
        index: usize,
        token: &CancellationToken,
    ) -> FlowResult<()> {
        let supplementary = (!session.supplementary.is_empty())
            .then_some(&session.supplementary);
        let gathered =
            self.binder
                .gather(graph, &node.id, &session.bindings, supplementary);

        session.start_node(&node.id, index);
        self.progress(session, index, &node.id, NodeState::Running);

        let request = ExecutionRequest {
            node_id: node.id.clone(),
            executable: node.executable.clone(),
            args: gathered.args.clone(),
            manual_inputs: gathered.manual_inputs,
        };
        let started_at = Utc::now();
        let clock = Instant::now();

        let streamed = self.stream_node(&node.id, request, token).await;
        let duration_ms = clock.elapsed().as_millis() as u64;

        let (outcome, stdout) = match streamed {
            Ok(done) => done,
            Err(error) => {
                let message = error.to_string();
                session.fail_node(
                    &node.id,
                    ExecutionResult::failure(&message, started_at, duration_ms),
                );
                self.progress(session, index, &node.id, NodeState::Error);
                return Err(error);
            }
        };

        let output = if outcome.output.is_empty() {
            stdout
        } else {
            outcome.output
        };
        let params_used = if outcome.params_used.is_empty() {
            gathered.args
        } else {
            outcome.params_used
        };

        if outcome.success {
            let result = ExecutionResult::success(
                output,
                outcome.returned_value,
                started_at,
                duration_ms,
            )
            .with_params_used(params_used);
            let returned = result.returned_value.clone();
            session.complete_node(&node.id, result);
            self.progress(session, index, &node.id, NodeState::Completed);
            self.emit_sinks(graph, session, &node.id, &returned, index);
            Ok(())
        } else {
            let message = outcome
                .error
                .unwrap_or_else(|| "execution failed".to_string());
            let result =
                ExecutionResult::failure(&message, started_at, duration_ms)
                    .with_output(output)
                    .with_params_used(params_used);
            session.fail_node(&node.id, result);
            self.progress(session, index, &node.id, NodeState::Error);

            // a failure reported while stopping is the stop itself
            if token.is_cancelled() {
                return Err(FlowError::Cancelled);
            }
            Err(FlowError::Execution {
                node_id: node.id.clone(),
                message,
            })
        }
    }

    /// Consumes the executor stream until its terminal event, the end of
    /// the stream or cancellation of the session.
    async fn stream_node(
        &self,
        node_id: &str,
        request: ExecutionRequest,
        token: &CancellationToken,
    ) -> FlowResult<(ExecutorOutcome, String)> {
        let mut stream = self.executor.run(request, token.child_token());
        let mut stdout = String::new();

        let finished = loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::warn!(node = %node_id, "cancelled while running");
                    return Err(FlowError::Cancelled);
                }
                event = stream.next() => {
                    match event {
                        Some(Ok(ExecutorEvent::Stdout(chunk))) => {
                            stdout.push_str(&chunk);
                            stdout.push('\n');
                            self.emit(RunEvent::Output {
                                node_id: node_id.to_string(),
                                chunk,
                            });
                        }
                        Some(Ok(ExecutorEvent::Finished(outcome))) => {
                            break Some(outcome)
                        }
                        Some(Err(e)) => {
                            if token.is_cancelled() {
                                return Err(FlowError::Cancelled);
                            }
                            return Err(FlowError::Infrastructure {
                                node_id: node_id.to_string(),
                                message: format!("{e:#}"),
                            });
                        }
                        None => break None,
                    }
                }
            }
        };

        match finished {
            Some(outcome) => Ok((outcome, stdout)),
            None if token.is_cancelled() => Err(FlowError::Cancelled),
            None => Err(FlowError::Infrastructure {
                node_id: node_id.to_string(),
                message: "no result received".to_string(),
            }),
        }
    }

    /// Records a synthesized capture for every Sink wired to `node_id`.
    fn emit_sinks(
        &self,
        graph: &Graph,
        session: &mut RunSession,
        node_id: &str,
        value: &Value,
        index: usize,
    ) {
        for sink in graph.sinks_for(node_id) {
            session.record_capture(&sink.id, capture_value(sink, value));
            self.progress(session, index, &sink.id, NodeState::Completed);
        }
    }

    fn progress(
        &self,
        session: &RunSession,
        step_index: usize,
        node_id: &str,
        state: NodeState,
    ) {
        self.emit(RunEvent::Progress(ProgressEvent {
            step_index,
            total_steps: session.order.len(),
            node_id: node_id.to_string(),
            state,
            executed: session.executed,
        }));
    }

    fn emit(&self, event: RunEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

/// The `{name: value}` record a sink stores for `value`.
fn has_capture_name(sink: &Node) -> bool {
    sink.capture.as_ref().is_some_and(|c| !c.trim().is_empty())
}

fn capture_value(sink: &Node, value: &Value) -> Value {
    let fallback_key = || {
        sink.capture
            .clone()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| sink.variable_name())
    };

    let mut captured = Map::new();
    match value {
        Value::Object(fields) => {
            let named = sink
                .capture
                .as_ref()
                .and_then(|name| fields.get(name).map(|v| (name.clone(), v)));
            match named {
                Some((name, field)) => {
                    captured.insert(name, field.clone());
                }
                // an unnamed capture takes the first field
                None if fields.len() == 1 || !has_capture_name(sink) => {
                    match fields.iter().next() {
                        Some((name, field)) => {
                            captured.insert(name.clone(), field.clone());
                        }
                        None => {
                            captured.insert(fallback_key(), value.clone());
                        }
                    }
                }
                None => {
                    captured.insert(fallback_key(), value.clone());
                }
            }
        }
        other => {
            captured.insert(fallback_key(), other.clone());
        }
    }
    Value::Object(captured)
}
