//! # FlowCraft Context
//!
//! Run session state: results, bindings, the blocked set and the terminal
//! status of one execution, plus its serializable history form.

mod result;
mod session;

pub use result::ExecutionResult;
pub use session::{
    NodeState, RunSession, RunStatus, RunSummary, SessionExport,
};

#[cfg(test)]
mod tests {
    use super::*;
    use flowcraft_core::GraphBuilder;
    use serde_json::json;

    fn session() -> RunSession {
        RunSession::new(vec!["a".into(), "if".into(), "b".into()])
    }

    #[test]
    fn test_new_session_is_idle_and_pending() {
        let s = session();
        assert_eq!(s.status, RunStatus::Idle);
        assert_eq!(s.count_in_state(NodeState::Pending), 3);
        assert!(!s.aborted);
    }

    #[test]
    fn test_complete_node_updates_bindings() {
        let mut s = session();
        s.mark_running();
        s.start_node("a", 0);
        s.complete_node(
            "a",
            ExecutionResult::success("ok", json!({"n": 1}), chrono::Utc::now(), 5),
        );

        assert_eq!(s.executed, 1);
        assert_eq!(s.bindings.get("a"), Some(&json!({"n": 1})));
        assert_eq!(s.node_state("a"), Some(NodeState::Completed));
    }

    #[test]
    fn test_failed_node_keeps_no_binding() {
        let mut s = session();
        s.start_node("a", 0);
        s.fail_node("a", ExecutionResult::failure("boom", chrono::Utc::now(), 1));
        assert!(s.bindings.is_empty());
        assert_eq!(s.node_state("a"), Some(NodeState::Error));
        assert_eq!(s.results["a"].error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_finish_only_once() {
        let mut s = session();
        s.mark_running();
        s.finish(RunStatus::Stopped, None, None);
        s.finish(RunStatus::Completed, None, None);
        assert_eq!(s.status, RunStatus::Stopped);
        assert!(s.finished_at.is_some());
        assert_eq!(s.summary().status, RunStatus::Stopped);
    }

    #[test]
    fn test_export_restore_round_trip() {
        let mut s = session();
        s.mark_running();
        s.start_node("a", 0);
        s.complete_node(
            "a",
            ExecutionResult::success("", json!(3), chrono::Utc::now(), 2),
        );
        s.blocked.insert("b".into());
        s.skip_node("b", 2);
        s.finish(RunStatus::Completed, None, None);

        let export = s.export();
        let text = serde_json::to_string(&export).unwrap();
        let parsed: SessionExport = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, export);

        let restored = RunSession::restore(&parsed);
        assert_eq!(restored.session_id, s.session_id);
        assert_eq!(restored.bindings, s.bindings);
        assert_eq!(restored.node_state("b"), Some(NodeState::Skipped));
    }

    #[test]
    fn test_accumulated_variables() {
        let graph = GraphBuilder::new()
            .action("a", "Row Count")
            .action("b", "B")
            .action("c", "C")
            .data_link("a", "b")
            .data_link("b", "c")
            .build()
            .unwrap();

        let mut s = RunSession::new(vec!["a".into(), "b".into(), "c".into()]);
        let now = chrono::Utc::now();
        s.complete_node("a", ExecutionResult::success("", json!(12), now, 1));
        s.complete_node(
            "b",
            ExecutionResult::success("", json!({"mean": 2.5}), now, 1),
        );

        let vars = s.accumulated_variables(&graph, &["a".into(), "b".into()]);
        assert_eq!(vars.get("row_count"), Some(&json!(12)));
        assert_eq!(vars.get("mean"), Some(&json!(2.5)));
    }

    #[test]
    fn test_seed_from_copies_prior_state() {
        let mut prior = session();
        let now = chrono::Utc::now();
        prior.complete_node("a", ExecutionResult::success("", json!(1), now, 1));

        let mut next = session();
        next.seed_from(&prior, &["a".into()]);
        assert_eq!(next.bindings.get("a"), Some(&json!(1)));
        assert_eq!(next.node_state("a"), Some(NodeState::Completed));
        // the prior session is untouched
        assert_eq!(prior.results.len(), 1);
    }
}
