//! # FlowCraft - Flow Execution Engine
//!
//! FlowCraft runs graphs of executable scripts, conditional splitters,
//! manual inputs and output captures in dependency order, with cancellation,
//! resume from any node and per-run history.
//!
//! ## Crates
//!
//! - `flowcraft-core` (re-exported at the root): graph model, planning,
//!   conditions, blocking and binding
//! - [`context`]: run session state and its history form
//! - [`runtime`]: the orchestrator and executor interfaces
//! - [`store`]: flowchart documents, history files and settings
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use flowcraft::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let graph = GraphLoader::from_path("pipeline.json")?;
//!     let orchestrator = RunOrchestrator::new(Arc::new(ProcessExecutor::new()));
//!     let outcome = orchestrator.run(&graph).await?;
//!     println!("{}", outcome.summary.status);
//!     Ok(())
//! }
//! ```

pub mod logging;
mod runner;

// Re-export core functionality
pub use flowcraft_context as context;
pub use flowcraft_core::*;
pub use flowcraft_runtime as runtime;
pub use flowcraft_store as store;

pub use runner::Runner;

/// Prelude module for easy imports
pub mod prelude {
    pub use crate::logging::{init_json_tracing, init_tracing, SessionLogger};
    pub use crate::Runner;
    pub use flowcraft_context::{
        ExecutionResult, NodeState, RunSession, RunStatus, RunSummary,
        SessionExport,
    };
    pub use flowcraft_core::prelude::*;
    pub use flowcraft_runtime::prelude::*;
    pub use flowcraft_store::prelude::*;
}
