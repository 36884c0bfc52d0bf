use anyhow::Result;
use clap::{Parser, Subcommand};
use flowcraft::logging::{init_json_tracing, init_tracing, SessionLogger};
use flowcraft::runtime::{RunEvent, RunOrchestrator, RunOutcome};
use flowcraft::store::{format_elapsed, RunnerSettings, SettingsLoader};
use flowcraft::context::RunStatus;
use flowcraft::Runner;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Parser)]
#[command(name = "flowcraft", version, about = "Run flowcharts of scripts in dependency order")]
struct Cli {
    /// Runner settings (YAML or JSON)
    #[arg(long, global = true, env = "FLOWCRAFT_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides the history directory from the settings
    #[arg(long, global = true)]
    history_dir: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the execution order of a flowchart
    Plan { graph: PathBuf },
    /// Execute a flowchart; Ctrl-C stops the run
    Run { graph: PathBuf },
    /// Re-run a stored execution starting at one node
    Resume {
        graph: PathBuf,
        #[arg(long)]
        execution: String,
        #[arg(long)]
        from: String,
    },
    /// List, delete or clear stored executions
    History {
        graph: PathBuf,
        #[arg(long)]
        delete: Option<String>,
        #[arg(long, conflicts_with = "delete")]
        clear: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut settings = SettingsLoader::load_or_default(cli.config.as_deref())?;
    if let Some(dir) = cli.history_dir {
        settings.history_dir = dir;
    }
    if cli.json_logs {
        init_json_tracing(&settings.log_filter);
    } else {
        init_tracing(&settings.log_filter);
    }

    match cli.command {
        Command::Plan { graph } => {
            let plan = runner(graph, settings).plan().await?;
            for (index, node_id) in plan.order.iter().enumerate() {
                println!("{:>3}. {}", index + 1, node_id);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Run { graph } => {
            let runner = runner(graph, settings);
            let watchers = watch(runner.orchestrator());
            let outcome = runner.run().await;
            report(outcome, watchers).await
        }
        Command::Resume {
            graph,
            execution,
            from,
        } => {
            let runner = runner(graph, settings);
            let watchers = watch(runner.orchestrator());
            let outcome = runner.resume(&execution, &from).await;
            report(outcome, watchers).await
        }
        Command::History {
            graph,
            delete,
            clear,
        } => {
            let runner = runner(graph, settings);
            let history = runner.history();
            if let Some(id) = delete {
                if history.delete(&id).await? {
                    println!("deleted {id}");
                } else {
                    println!("no execution {id}");
                    return Ok(ExitCode::FAILURE);
                }
            } else if clear {
                println!("removed {} executions", history.clear().await?);
            } else {
                for entry in history.list().await? {
                    let summary = entry.summary();
                    println!(
                        "{}  {}  {:<9} {}/{} nodes ({}%)  {}{}",
                        entry.execution_id,
                        entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        summary.status.to_string(),
                        summary.successful_nodes,
                        summary.total_nodes,
                        summary.success_rate,
                        format_elapsed(summary.elapsed_ms),
                        summary
                            .failed_node_id
                            .map(|id| format!("  failed at {id}"))
                            .unwrap_or_default(),
                    );
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn runner(graph: PathBuf, settings: RunnerSettings) -> Runner {
    Runner::new(graph, settings)
}

/// Prints run events and stops the run on Ctrl-C.
fn watch(orchestrator: Arc<RunOrchestrator>) -> [JoinHandle<()>; 2] {
    let mut events = orchestrator.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                RunEvent::Started { total_steps, .. } => {
                    println!("running {total_steps} steps");
                }
                RunEvent::Progress(p) => {
                    println!(
                        "[{}/{}] {} {:?}",
                        p.step_index + 1,
                        p.total_steps,
                        p.node_id,
                        p.state
                    );
                }
                RunEvent::Output { node_id, chunk } => {
                    println!("  {node_id} | {chunk}");
                }
                RunEvent::Finished(_) => break,
            }
        }
    });

    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("stopping...");
            orchestrator.stop().await;
        }
    });

    [printer, interrupt]
}

async fn report(
    outcome: Result<RunOutcome>,
    [printer, interrupt]: [JoinHandle<()>; 2],
) -> Result<ExitCode> {
    interrupt.abort();
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(e) => {
            printer.abort();
            return Err(e);
        }
    };
    printer.await.ok();

    SessionLogger::new(&outcome.session).log_session_summary(&outcome.session);
    let summary = &outcome.summary;
    println!(
        "{} {}: {}/{} steps executed in {}",
        summary.session_id,
        summary.status,
        summary.executed,
        summary.total_steps,
        format_elapsed(summary.duration_ms)
    );
    if let (Some(node), Some(error)) = (&summary.failed_node_id, &summary.error_message) {
        println!("failed at {node}: {error}");
    }

    Ok(match summary.status {
        RunStatus::Completed => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}
