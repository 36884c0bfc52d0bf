//! # FlowCraft Runtime
//!
//! Run orchestration for FlowCraft: sequential, cancellable execution of a
//! planned graph, resume from any node, progress events, and the executor
//! and store interfaces the engine talks to.

mod config;
mod events;
mod executor;
mod orchestrator;
mod process;
mod store;
pub mod testing;


pub use config::{OrchestratorConfig, ProcessExecutorConfig};
pub use events::{ProgressEvent, RunEvent};
pub use executor::{
    ExecutionRequest, ExecutorEvent, ExecutorOutcome, NodeExecutor,
};
pub use orchestrator::{RunOrchestrator, RunOutcome};
pub use process::ProcessExecutor;
pub use store::{GraphStore, HistoryStore, MemoryHistoryStore, StaticGraphStore};

/// Prelude module for runtime functionality
pub mod prelude {
    pub use crate::{
        ExecutionRequest, ExecutorEvent, ExecutorOutcome, GraphStore,
        HistoryStore, NodeExecutor, OrchestratorConfig, ProcessExecutor,
        RunEvent, RunOrchestrator, RunOutcome,
    };
    pub use tokio_util::sync::CancellationToken;
}
