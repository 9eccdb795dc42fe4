//! `agentflow` CLI entry-point.
//!
//! Available sub-commands:
//! - `serve`     — start the HTTP/WebSocket server.
//! - `migrate`   — run pending database migrations.
//! - `validate`  — validate a workflow JSON file and print its execution order.
//! - `run`       — execute a workflow from a file, a template or the database.
//! - `templates` — list the built-in workflow templates.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{ArgGroup, Args, Parser, Subcommand};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use agents::{AgentCatalog, AgentExecutor, ProcessExecutor, ProcessExecutorConfig, TimeoutExecutor};
use engine::{
    ExecutionState, FailurePolicy, RunEvent, RunOptions, RunStatus, RunnerConfig,
    SqlWorkflowStore, StatusBroadcaster, Workflow, WorkflowDraft, WorkflowRunner, WorkflowStore,
};

#[derive(Parser)]
#[command(
    name = "agentflow",
    about = "Run DAGs of AI coding agents in dependency order",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP and WebSocket server.
    Serve {
        #[arg(long, env = "AGENTFLOW_BIND", default_value = "127.0.0.1:3456")]
        bind: String,
        #[command(flatten)]
        db: DbArgs,
        #[command(flatten)]
        agents: AgentArgs,
    },
    /// Run pending database migrations.
    Migrate {
        #[command(flatten)]
        db: DbArgs,
    },
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
    /// Execute a workflow and print each node's outcome.
    #[command(group(ArgGroup::new("source").required(true).args(["file", "workflow_id", "template"])))]
    Run {
        /// Workflow JSON file; it is saved before running.
        file: Option<PathBuf>,
        /// ID of a workflow already in the database.
        #[arg(long)]
        workflow_id: Option<Uuid>,
        /// Key of a built-in template (see `templates`).
        #[arg(long)]
        template: Option<String>,
        /// Keep dispatching nodes after one fails.
        #[arg(long)]
        continue_on_error: bool,
        #[command(flatten)]
        db: DbArgs,
        #[command(flatten)]
        agents: AgentArgs,
    },
    /// List built-in workflow templates.
    Templates,
}

#[derive(Args)]
struct DbArgs {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://agentflow.db?mode=rwc")]
    database_url: String,
}

#[derive(Args)]
struct AgentArgs {
    /// Program invoked as `<program> <agent_type> <args>...` for every node.
    #[arg(long, env = "AGENTFLOW_AGENT_PROGRAM", default_value = "cce-agent")]
    agent_program: PathBuf,
    /// Working directory for agents when a run does not set one.
    #[arg(long, env = "AGENTFLOW_WORKDIR")]
    workdir: Option<PathBuf>,
    /// Per-node time limit in seconds.
    #[arg(long, env = "AGENTFLOW_NODE_TIMEOUT_SECS")]
    node_timeout_secs: Option<u64>,
}

impl AgentArgs {
    fn executor(&self) -> Arc<dyn AgentExecutor> {
        let process = ProcessExecutor::new(
            ProcessExecutorConfig {
                program: self.agent_program.clone(),
                default_working_directory: self.workdir.clone(),
            },
            AgentCatalog::default(),
        );
        match self.node_timeout_secs {
            Some(secs) => Arc::new(TimeoutExecutor::new(process, Duration::from_secs(secs))),
            None => Arc::new(process),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind, db, agents } => {
            let executor = agents.executor();
            let runner = build_runner(&db, &agents, executor.clone(), FailurePolicy::FailFast).await?;
            info!("Starting API server on {bind}");
            let state = api::AppState::new(runner, executor, AgentCatalog::default());
            api::serve(&bind, state)
                .await
                .with_context(|| format!("server on {bind} failed"))?;
        }
        Command::Migrate { db } => {
            info!("Running migrations against {}", db.database_url);
            let pool = db::pool::create_pool(&db.database_url, 2)
                .await
                .context("failed to connect to database")?;
            db::pool::run_migrations(&pool).await.context("migration failed")?;
            info!("Migrations applied successfully");
        }
        Command::Validate { path } => {
            let workflow = read_workflow(&path)?;
            match engine::validate_dag(&workflow.graph) {
                Ok(order) => println!("✅ Workflow is valid. Execution order: {order:?}"),
                Err(e) => {
                    eprintln!("❌ Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Run { file, workflow_id, template, continue_on_error, db, agents } => {
            let policy = if continue_on_error {
                FailurePolicy::ContinueOnError
            } else {
                FailurePolicy::FailFast
            };
            let runner = build_runner(&db, &agents, agents.executor(), policy).await?;

            let workflow = match (file, workflow_id, template) {
                (Some(path), _, _) => {
                    let workflow = read_savable_workflow(&path)?;
                    runner.store().create(&workflow).await.context("failed to save workflow")?;
                    workflow
                }
                (_, Some(id), _) => runner.store().get(id).await.context("failed to load workflow")?,
                (_, _, Some(key)) => {
                    let Some(t) = engine::templates::template(&key) else {
                        bail!("unknown template '{key}'");
                    };
                    let workflow = Workflow::new(t.name, t.description, t.graph);
                    runner.store().create(&workflow).await.context("failed to save workflow")?;
                    workflow
                }
                (None, None, None) => bail!("no workflow given"),
            };

            let prepared = runner.prepare(&workflow, RunOptions::default())?;
            let printer = tokio::spawn(print_events(
                runner.broadcaster().subscribe(),
                prepared.execution_id(),
            ));
            let record = runner.execute(prepared).await?;
            printer.await.context("event printer panicked")?;

            println!();
            for node_id in &record.execution_order {
                let mark = match record.state_of(node_id) {
                    ExecutionState::Completed => "✅",
                    ExecutionState::Failed => "❌",
                    _ => "⏭ ",
                };
                println!("{mark} {node_id}");
            }
            println!(
                "Execution {} finished with status '{}' in {:.1}s",
                record.execution_id,
                record.status,
                record.duration_seconds()
            );
            if record.status == RunStatus::Error {
                std::process::exit(1);
            }
        }
        Command::Templates => {
            for t in engine::templates::templates() {
                println!("{:<10} {} ({} nodes): {}", t.key, t.name, t.graph.nodes.len(), t.description);
            }
        }
    }

    Ok(())
}

async fn build_runner(
    db: &DbArgs,
    agents: &AgentArgs,
    executor: Arc<dyn AgentExecutor>,
    failure_policy: FailurePolicy,
) -> anyhow::Result<Arc<WorkflowRunner>> {
    let pool = db::pool::create_pool(&db.database_url, 5)
        .await
        .context("failed to connect to database")?;
    db::pool::run_migrations(&pool).await.context("migration failed")?;

    Ok(Arc::new(WorkflowRunner::new(
        executor,
        Arc::new(SqlWorkflowStore::new(pool)),
        StatusBroadcaster::default(),
        RunnerConfig {
            failure_policy,
            default_working_directory: agents.workdir.clone(),
        },
    )))
}

fn read_workflow(path: &Path) -> anyhow::Result<Workflow> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    let draft: WorkflowDraft = serde_json::from_str(&content)
        .with_context(|| format!("invalid workflow JSON in {}", path.display()))?;
    Ok(draft.into_workflow())
}

/// Like [`read_workflow`], but rejects duplicate ids and dangling edges so a
/// malformed graph is never saved.
fn read_savable_workflow(path: &Path) -> anyhow::Result<Workflow> {
    let workflow = read_workflow(path)?;
    engine::validate(&workflow.graph)
        .with_context(|| format!("invalid workflow in {}", path.display()))?;
    Ok(workflow)
}

/// Print node transitions of one run until it completes.
async fn print_events(mut events: broadcast::Receiver<RunEvent>, execution_id: Uuid) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return,
        };
        if event.execution_id() != execution_id {
            continue;
        }
        match event {
            RunEvent::NodeStarted { node_id, agent_type, .. } => {
                println!("▶ {node_id} ({agent_type})");
            }
            RunEvent::NodeCompleted { node_id, duration_seconds, .. } => {
                println!("  {node_id} completed in {duration_seconds:.1}s");
            }
            RunEvent::NodeFailed { node_id, error, .. } => {
                println!("  {node_id} failed: {error}");
            }
            RunEvent::RunCompleted { .. } => return,
            RunEvent::RunStarted { .. } => {}
        }
    }
}
