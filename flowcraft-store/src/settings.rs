use anyhow::{Context, Result};
use flowcraft_runtime::{OrchestratorConfig, ProcessExecutorConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Everything a runner needs besides the flowchart itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    pub orchestrator: OrchestratorConfig,
    pub process: ProcessExecutorConfig,
    pub history_dir: PathBuf,
    /// `tracing_subscriber::EnvFilter` directive
    pub log_filter: String,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorConfig::default(),
            process: ProcessExecutorConfig::default(),
            history_dir: PathBuf::from("history"),
            log_filter: "info".to_string(),
        }
    }
}

pub struct SettingsLoader;

impl SettingsLoader {
    pub fn from_yaml_str(content: &str) -> Result<RunnerSettings> {
        serde_yaml::from_str(content)
            .with_context(|| "Failed to parse YAML settings")
    }

    pub fn from_json_str(content: &str) -> Result<RunnerSettings> {
        serde_json::from_str(content)
            .with_context(|| "Failed to parse JSON settings")
    }

    /// `.json` files are read as JSON, everything else as YAML.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<RunnerSettings> {
        let content = fs::read_to_string(&path).with_context(|| {
            format!("Failed to read settings file: {:?}", path.as_ref())
        })?;
        match path.as_ref().extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    /// Loads `path` when given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<RunnerSettings> {
        match path {
            Some(path) => Self::from_path(path),
            None => Ok(RunnerSettings::default()),
        }
    }
}
