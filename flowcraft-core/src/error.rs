use thiserror::Error;

/// Errors raised by planning and running a graph.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FlowError {
    /// The dependency graph contains a cycle; no order can be produced.
    #[error("dependency cycle detected among nodes: {}", remaining.join(", "))]
    Cycle { remaining: Vec<String> },

    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("node {0} is not part of the execution order")]
    NotInPlan(String),

    /// An Action node's executor reported failure.
    #[error("node {node_id} failed: {message}")]
    Execution { node_id: String, message: String },

    #[error("execution was cancelled by user")]
    Cancelled,

    /// A run was requested while another one is still in progress.
    #[error("cannot start a run, another execution is already in progress")]
    AlreadyRunning,

    /// The executor could not be reached or crashed mid-call.
    #[error("executor failure on node {node_id}: {message}")]
    Infrastructure { node_id: String, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`FlowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Planning,
    Execution,
    Cancellation,
    Infrastructure,
    Internal,
}

impl FlowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FlowError::Cycle { .. }
            | FlowError::InvalidGraph(_)
            | FlowError::NodeNotFound(_)
            | FlowError::NotInPlan(_)
            | FlowError::AlreadyRunning => ErrorKind::Planning,
            FlowError::Execution { .. } => ErrorKind::Execution,
            FlowError::Cancelled => ErrorKind::Cancellation,
            FlowError::Infrastructure { .. } => ErrorKind::Infrastructure,
            FlowError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether this error should end the session as a failure
    /// (as opposed to a user stop or an internal fault).
    pub fn is_failure(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Execution | ErrorKind::Infrastructure
        )
    }
}

pub type FlowResult<T> = std::result::Result<T, FlowError>;
