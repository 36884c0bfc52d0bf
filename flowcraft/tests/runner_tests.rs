use flowcraft::context::{NodeState, RunStatus};
use flowcraft::logging::SessionLogger;
use flowcraft::runtime::testing::{Script, ScriptedExecutor};
use flowcraft::runtime::RunEvent;
use flowcraft::store::RunnerSettings;
use flowcraft::{FlowError, Runner};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const SCENARIO: &str = r#"{
  "nodes": [
    {"id": "A", "type": "python_file", "name": "A", "x": 0, "y": 0, "pythonFile": "a.py"},
    {"id": "B", "type": "python_file", "name": "B", "x": 200, "y": 0, "pythonFile": "b.py"},
    {"id": "If", "type": "if_node", "name": "If", "x": 100, "y": 150},
    {"id": "C", "type": "python_file", "name": "C", "x": 0, "y": 300, "pythonFile": "c.py"},
    {"id": "D", "type": "python_file", "name": "D", "x": 200, "y": 300, "pythonFile": "d.py"}
  ],
  "links": [
    {"source": "A", "target": "If"},
    {"source": "B", "target": "If"},
    {"source": "If", "target": "C",
     "conditions": [{"variable": "count", "operator": ">", "value": "5"}]},
    {"source": "If", "target": "D"}
  ]
}"#;

struct Workspace {
    _dir: TempDir,
    flowchart: PathBuf,
    settings: RunnerSettings,
}

fn workspace() -> Workspace {
    let dir = TempDir::new().unwrap();
    let flowchart = dir.path().join("scenario.json");
    std::fs::write(&flowchart, SCENARIO).unwrap();
    let settings = RunnerSettings {
        history_dir: dir.path().join("history"),
        ..RunnerSettings::default()
    };
    Workspace {
        _dir: dir,
        flowchart,
        settings,
    }
}

fn runner(ws: &Workspace, executor: Arc<ScriptedExecutor>) -> Runner {
    Runner::with_executor(&ws.flowchart, ws.settings.clone(), executor)
}

fn counting() -> ScriptedExecutor {
    ScriptedExecutor::new()
        .returning("A", json!({"count": 3}))
        .returning("B", json!({"count": 7}))
}

fn history_files(dir: &Path) -> usize {
    std::fs::read_dir(dir.join("scenario"))
        .map(|entries| entries.count())
        .unwrap_or(0)
}

#[tokio::test]
async fn test_plan_from_file() {
    let ws = workspace();
    let plan = runner(&ws, Arc::new(ScriptedExecutor::new()))
        .plan()
        .await
        .unwrap();
    assert_eq!(plan.order, vec!["A", "B", "If", "C", "D"]);
    assert_eq!(plan.metadata.total_nodes, 5);
}

#[tokio::test]
async fn test_scenario_end_to_end() {
    let ws = workspace();
    let executor = Arc::new(counting());
    let runner = runner(&ws, executor.clone());

    let outcome = runner.run().await.unwrap();
    let session = &outcome.session;

    assert_eq!(outcome.summary.status, RunStatus::Completed);
    assert_eq!(executor.invoked_nodes().await, vec!["A", "B", "C"]);
    let keys: Vec<&str> = session.results.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["A", "B", "C", "If"]);
    assert!(session.is_blocked("D"));
    assert_eq!(session.node_state("D"), Some(NodeState::Skipped));

    let traces = &session.branch_traces["If"];
    let to_c = traces.iter().find(|t| t.target == "C").unwrap();
    assert!(to_c.outcome);
    assert_eq!(to_c.variables.get("count"), Some(&json!(7)));

    SessionLogger::new(session).log_session_summary(session);
    assert_eq!(history_files(&ws.settings.history_dir), 1);
}

#[tokio::test]
async fn test_fail_fast_then_resume_from_failed_node() {
    let ws = workspace();
    let first = Arc::new(counting().failing("C", "ZeroDivisionError"));
    let outcome = runner(&ws, first.clone()).run().await.unwrap();

    assert_eq!(outcome.summary.status, RunStatus::Failed);
    assert_eq!(outcome.summary.failed_node_id.as_deref(), Some("C"));
    assert_eq!(
        outcome.summary.error_message.as_deref(),
        Some("ZeroDivisionError")
    );
    assert!(!outcome.session.results.contains_key("D"));

    let fixed = Arc::new(counting());
    let runner = runner(&ws, fixed.clone());
    let resumed = runner
        .resume(&outcome.summary.session_id, "C")
        .await
        .unwrap();

    assert_eq!(resumed.summary.status, RunStatus::Completed);
    assert_eq!(fixed.invoked_nodes().await, vec!["C"]);
    assert_eq!(
        resumed.session.resumed_from.as_deref(),
        Some(outcome.summary.session_id.as_str())
    );
    assert_eq!(resumed.session.bindings.get("B"), Some(&json!({"count": 7})));
    assert!(resumed.session.is_blocked("D"));

    let stored = runner.history().list().await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].execution_id, resumed.summary.session_id);
}

#[tokio::test]
async fn test_resume_errors() {
    let ws = workspace();
    let runner = runner(&ws, Arc::new(counting()));

    let err = runner.resume("missing", "C").await.unwrap_err();
    assert!(err.to_string().contains("missing"));

    let outcome = runner.run().await.unwrap();
    let err = runner
        .resume(&outcome.summary.session_id, "Z")
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FlowError>(),
        Some(FlowError::NotInPlan(_))
    ));
}

#[tokio::test]
async fn test_ctrl_c_style_stop() {
    let ws = workspace();
    let executor = Arc::new(counting().on("B", Script::Hang));
    let runner = Arc::new(runner(&ws, executor.clone()));
    let mut events = runner.orchestrator().subscribe();

    let task = {
        let runner = runner.clone();
        tokio::spawn(async move { runner.run().await })
    };

    loop {
        match events.recv().await.unwrap() {
            RunEvent::Progress(p) if p.node_id == "B" && p.state == NodeState::Running => {
                break
            }
            _ => {}
        }
    }
    runner.orchestrator().stop().await;

    let outcome = task.await.unwrap().unwrap();
    assert_eq!(outcome.summary.status, RunStatus::Stopped);
    assert_eq!(
        outcome.summary.error_message.as_deref(),
        Some("execution was cancelled by user")
    );
    assert_eq!(executor.stop_requests(), 1);
    assert!(!executor.invoked_nodes().await.contains(&"C".to_string()));
    assert!(!runner.orchestrator().is_running().await);
    assert_eq!(history_files(&ws.settings.history_dir), 1);
}
