//! # FlowCraft Core
//!
//! Graph model, execution-order planning, condition evaluation, branch
//! blocking and variable binding. Everything in this crate is synchronous
//! and free of I/O; the runtime crate drives it.

mod binder;
mod blocking;
mod builder;
mod condition;
mod error;
mod graph;
mod plan;


pub use binder::{match_parameter, GatheredInputs, VariableBinder};
pub use blocking::propagate_block;
pub use builder::GraphBuilder;
pub use condition::{
    BranchDecision, ConditionEvaluator, ConditionTrace, LinkTrace,
};
pub use error::{ErrorKind, FlowError, FlowResult};
pub use graph::{
    sanitize_name, Bindings, Combiner, Condition, Graph, Group, Link,
    LinkKind, Node, NodeKind, Operator, Position, Signature, Variables,
};
pub use plan::{
    ExecutionPlan, FlowPlanner, OrderPlanner, PlanMetadata, PlannerConfig,
    TieBreak,
};

/// Prelude module for core functionality
pub mod prelude {
    pub use crate::{
        Bindings, Condition, ConditionEvaluator, ExecutionPlan, FlowError,
        FlowPlanner, FlowResult, Graph, GraphBuilder, Node, NodeKind,
        OrderPlanner, VariableBinder, Variables,
    };
}
