use flowcraft_context::{RunSession, RunStatus};
use flowcraft_core::{LinkKind, NodeKind};
use flowcraft_runtime::testing::ScriptedExecutor;
use flowcraft_runtime::{GraphStore, RunOrchestrator};
use flowcraft_store::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const FLOWCHART_JSON: &str = r#"{
  "nodes": [
    {"id": "A", "type": "python_file", "name": "Load", "x": 0, "y": 0,
     "pythonFile": "load.py", "returns": ["count"]},
    {"id": "If", "type": "if_node", "name": "Enough?", "x": 0, "y": 100},
    {"id": "C", "type": "python_file", "name": "Report", "x": 0, "y": 200,
     "pythonFile": "report.py", "parameters": ["count"]},
    {"id": "D", "type": "python_file", "name": "Alert", "x": 200, "y": 200,
     "pythonFile": "alert.py"},
    {"id": "S", "type": "data_save", "name": "Keep count",
     "dataSource": {"variable": {"name": "count"}}}
  ],
  "links": [
    {"source": "A", "target": "If"},
    {"source": "If", "target": "C",
     "conditions": [{"variable": "count", "operator": ">", "value": "5"}]},
    {"source": "If", "target": "D",
     "conditions": [{"variable": "count", "operator": "<=", "value": "5"}]},
    {"source": "A", "target": "S"}
  ]
}"#;

const FLOWCHART_YAML: &str = r#"
nodes:
  - id: first
    type: python_file
    name: First
    pythonFile: first.py
  - id: second
    type: python_file
    name: Second
    pythonFile: second.py
    y: 100
links:
  - source: first
    target: second
"#;

fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_json_and_yaml_by_extension() {
    let dir = TempDir::new().unwrap();
    let json_path = write(&dir, "etl.json", FLOWCHART_JSON);
    let yaml_path = write(&dir, "small.yaml", FLOWCHART_YAML);

    let graph = GraphLoader::from_path(&json_path).unwrap();
    assert_eq!(graph.nodes().len(), 5);
    assert_eq!(graph.node("If").unwrap().kind, NodeKind::Conditional);
    assert_eq!(
        graph
            .outgoing("If")
            .filter(|l| l.kind == LinkKind::Conditional)
            .count(),
        2
    );
    assert_eq!(graph.sinks_for("A").len(), 1);

    let graph = GraphLoader::from_path(&yaml_path).unwrap();
    assert_eq!(graph.node("second").unwrap().position.y, 100.0);
}

#[test]
fn test_invalid_documents_report_context() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "broken.json", "{ not json");
    let err = GraphLoader::from_json_file(&path).unwrap_err();
    assert!(format!("{err:?}").contains("Failed to parse JSON flowchart"));

    let path = write(
        &dir,
        "dangling.json",
        r#"{"nodes": [{"id": "a", "type": "python_file"}],
            "links": [{"source": "a", "target": "ghost"}]}"#,
    );
    assert!(GraphLoader::from_json_file(&path).is_err());

    assert!(GraphLoader::from_path(dir.path().join("missing.json")).is_err());
}

#[test]
fn test_save_json_then_reload() {
    let dir = TempDir::new().unwrap();
    let graph = GraphLoader::from_json_str(FLOWCHART_JSON).unwrap();
    let path = dir.path().join("copy.json");

    GraphLoader::save_json(&graph, &path).unwrap();
    let reloaded = GraphLoader::from_json_file(&path).unwrap();
    assert_eq!(reloaded.nodes(), graph.nodes());
    assert_eq!(reloaded.links(), graph.links());
}

#[tokio::test]
async fn test_file_graph_store_loads_current_file() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "pipeline.yml", FLOWCHART_YAML);
    let store = FileGraphStore::new(&path);
    assert_eq!(store.flowchart_name(), "pipeline");

    let graph = store.load().await.unwrap();
    assert_eq!(graph.nodes().len(), 2);

    std::fs::write(&path, "nodes: []\n").unwrap();
    let graph = store.load().await.unwrap();
    assert!(graph.nodes().is_empty());
}

#[tokio::test]
async fn test_run_is_written_to_history() {
    let dir = TempDir::new().unwrap();
    let graph = GraphLoader::from_json_str(FLOWCHART_JSON).unwrap();
    let history = Arc::new(FileHistoryStore::new(dir.path(), "etl.json"));
    let executor =
        Arc::new(ScriptedExecutor::new().returning("A", json!({"count": 7})));
    let orchestrator =
        RunOrchestrator::new(executor).with_history(history.clone());

    let outcome = orchestrator.run(&graph).await.unwrap();
    assert_eq!(outcome.summary.status, RunStatus::Completed);

    let file = dir
        .path()
        .join("etl")
        .join(format!("{}.json", outcome.summary.session_id));
    assert!(file.exists());

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&file).unwrap()).unwrap();
    assert_eq!(raw["flowchart_name"], "etl");
    assert_eq!(raw["execution_id"], json!(outcome.summary.session_id));
    assert!(raw["timestamp"].is_string());
    assert_eq!(raw["execution_data"]["status"], "completed");

    let entry = history
        .get(&outcome.summary.session_id)
        .await
        .unwrap()
        .unwrap();
    let restored = RunSession::restore(&entry.execution_data);
    assert!(restored.is_blocked("D"));
    assert_eq!(restored.bindings.get("A"), Some(&json!({"count": 7})));

    let summary = entry.summary();
    assert_eq!(summary.total_nodes, 2);
    assert_eq!(summary.successful_nodes, 2);
    assert_eq!(summary.success_rate, 100);
    assert_eq!(summary.failed_node_id, None);
}

#[tokio::test]
async fn test_history_summary_of_failed_run() {
    let dir = TempDir::new().unwrap();
    let graph = GraphLoader::from_json_str(FLOWCHART_JSON).unwrap();
    let history = Arc::new(FileHistoryStore::new(dir.path(), "etl"));
    let executor = Arc::new(
        ScriptedExecutor::new()
            .returning("A", json!({"count": 9}))
            .failing("C", "report template missing"),
    );
    let orchestrator =
        RunOrchestrator::new(executor).with_history(history.clone());

    let outcome = orchestrator.run(&graph).await.unwrap();
    let entry = history
        .get(&outcome.summary.session_id)
        .await
        .unwrap()
        .unwrap();
    let summary = entry.summary();

    assert_eq!(summary.status, RunStatus::Failed);
    assert_eq!(summary.total_nodes, 2);
    assert_eq!(summary.successful_nodes, 1);
    assert_eq!(summary.success_rate, 50);
    assert_eq!(summary.failed_node_id.as_deref(), Some("C"));
    assert!(summary.elapsed().ends_with("ms"));
}

#[tokio::test]
async fn test_list_get_delete_clear() {
    let dir = TempDir::new().unwrap();
    let graph = GraphLoader::from_yaml_str(FLOWCHART_YAML).unwrap();
    let history = Arc::new(FileHistoryStore::new(dir.path(), "small"));
    let orchestrator = RunOrchestrator::new(Arc::new(ScriptedExecutor::new()))
        .with_history(history.clone());

    assert!(history.list().await.unwrap().is_empty());

    let mut ids = Vec::new();
    for _ in 0..3 {
        let outcome = orchestrator.run(&graph).await.unwrap();
        ids.push(outcome.summary.session_id);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // garbage next to real entries is skipped
    std::fs::write(history.dir().join("junk.json"), "{}").unwrap();

    let listed: Vec<String> = history
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.execution_id)
        .collect();
    let newest_first: Vec<String> = ids.iter().rev().cloned().collect();
    assert_eq!(listed, newest_first);

    assert!(history.get("nope").await.unwrap().is_none());
    assert!(history.delete(&ids[0]).await.unwrap());
    assert!(!history.delete(&ids[0]).await.unwrap());
    assert_eq!(history.list().await.unwrap().len(), 2);

    assert_eq!(history.clear().await.unwrap(), 2);
    assert!(history.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_history_ids_cannot_leave_the_flowchart_dir() {
    let dir = TempDir::new().unwrap();
    let history = FileHistoryStore::new(dir.path(), "small");
    std::fs::create_dir_all(history.dir()).unwrap();
    let outside = dir.path().join("secret.json");
    std::fs::write(&outside, "{}").unwrap();

    for id in ["../secret", "..\\secret", "a/b", "", ".hidden"] {
        assert!(history.get(id).await.is_err(), "get accepted {id:?}");
        assert!(history.delete(id).await.is_err(), "delete accepted {id:?}");
    }
    assert!(outside.exists());
}
