//! # FlowCraft Logging
//!
//! Tracing setup and run summaries for FlowCraft sessions

use flowcraft_context::{NodeState, RunSession};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Initialize a human-readable tracing subscriber. `RUST_LOG` wins over
/// `default_filter` when set.
pub fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_filter))
        .with_target(false)
        .init();
}

/// Initialize a JSON tracing subscriber, one object per line
pub fn init_json_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter(default_filter))
        .init();
}

fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Logger bound to one run session
pub struct SessionLogger {
    pub session_id: String,
}

impl SessionLogger {
    pub fn new(session: &RunSession) -> Self {
        Self {
            session_id: session.session_id.clone(),
        }
    }

    /// Log session summary
    pub fn log_session_summary(&self, session: &RunSession) {
        info!(
            session_id = %self.session_id,
            status = %session.status,
            total_steps = session.order.len(),
            executed = session.executed,
            completed = session.count_in_state(NodeState::Completed),
            failed = session.count_in_state(NodeState::Error),
            skipped = session.count_in_state(NodeState::Skipped),
            duration_ms = session.duration_ms(),
            "Run summary"
        );

        if let Some(node_id) = &session.failed_node_id {
            error!(
                session_id = %self.session_id,
                node_id = %node_id,
                error = %session.error_message.as_deref().unwrap_or("Unknown error"),
                "Run failed"
            );
        }
        if let Some(prior) = &session.resumed_from {
            info!(session_id = %self.session_id, prior = %prior, "Resumed run");
        }

        self.log_node_details(session);
    }

    /// Log one line per planned node
    pub fn log_node_details(&self, session: &RunSession) {
        for node_id in &session.order {
            let result = session.results.get(node_id);
            match session.node_state(node_id) {
                Some(NodeState::Completed) => {
                    info!(
                        session_id = %self.session_id,
                        node_id = %node_id,
                        duration_ms = result.map(|r| r.duration_ms).unwrap_or_default(),
                        "Node completed"
                    );
                }
                Some(NodeState::Error) => {
                    error!(
                        session_id = %self.session_id,
                        node_id = %node_id,
                        error = %result
                            .and_then(|r| r.error.as_deref())
                            .unwrap_or("Unknown error"),
                        "Node failed"
                    );
                }
                Some(NodeState::Skipped) => {
                    warn!(session_id = %self.session_id, node_id = %node_id, "Node skipped");
                }
                _ => {
                    warn!(session_id = %self.session_id, node_id = %node_id, "Node not run");
                }
            }
        }
    }
}
