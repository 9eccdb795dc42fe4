//! Workflow execution engine.
//!
//! `WorkflowRunner` is the central orchestrator:
//! 1. Validates the graph and produces a topological ordering ([`WorkflowRunner::prepare`]).
//! 2. Iterates through nodes in order, dispatching each via `AgentExecutor`,
//!    strictly one at a time.
//! 3. Emits a `RunEvent` for every node state transition.
//! 4. Stops at the first failure (or keeps going, per `FailurePolicy`) and
//!    honours cooperative cancellation between nodes.
//! 5. Persists the `ExecutionRecord` and the workflow's execution counters.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use agents::{AgentExecutor, ExecutorError};

use crate::dag::validate_dag;
use crate::events::{RunEvent, StatusBroadcaster};
use crate::models::{
    ExecutionRecord, ExecutionState, NodeResult, RunStatus, TerminationReason, Workflow,
};
use crate::store::WorkflowStore;
use crate::{GraphError, RunError, StoreError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do after a node fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Start no further nodes.
    #[default]
    FailFast,
    /// Keep dispatching the remaining nodes in order.
    ContinueOnError,
}

/// Tuning knobs for the runner.
#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
    pub failure_policy: FailurePolicy,
    /// Working directory handed to agents when a run does not set one.
    pub default_working_directory: Option<PathBuf>,
}

/// Per-run overrides.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub working_directory: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Prepared and active runs
// ---------------------------------------------------------------------------

/// A validated, ordered run that has not started yet.
///
/// Holds its own copy of the workflow: later edits to the stored workflow do
/// not affect it. Dropping it without executing removes it from the active
/// set.
#[derive(Debug)]
pub struct PreparedRun {
    workflow: Workflow,
    working_directory: Option<PathBuf>,
    cancel: CancellationToken,
    guard: RunGuard,
}

impl PreparedRun {
    pub fn execution_id(&self) -> Uuid {
        self.guard.record.execution_id
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn order(&self) -> &[String] {
        &self.guard.record.execution_order
    }

    /// Cancelling this token stops the run before its next node.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Point-in-time view of an in-flight run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub workflow_name: String,
    pub started_at: DateTime<Utc>,
    pub current_node: Option<String>,
    pub node_states: BTreeMap<String, ExecutionState>,
}

#[derive(Debug)]
struct ActiveRun {
    cancel: CancellationToken,
    snapshot: RunSnapshot,
}

type ActiveRuns = Arc<Mutex<HashMap<Uuid, ActiveRun>>>;

fn lock(active: &ActiveRuns) -> MutexGuard<'_, HashMap<Uuid, ActiveRun>> {
    // The map holds plain data; a panic mid-update cannot leave it invalid.
    active.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Prepared,
    Running,
    Finished,
}

/// Owns the in-progress record and the run's active-set entry.
///
/// Whatever happens to the run, dropping the guard removes the entry. A run
/// abandoned after it started (its future dropped mid-node) is finalized here
/// as `Cancelled` and persisted on a background task.
struct RunGuard {
    active: ActiveRuns,
    store: Arc<dyn WorkflowStore>,
    broadcaster: StatusBroadcaster,
    record: ExecutionRecord,
    phase: Phase,
    node_started: Option<Instant>,
}

impl std::fmt::Debug for RunGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunGuard")
            .field("execution_id", &self.record.execution_id)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl RunGuard {
    /// Mark the run finished, leave the active set, and hand out the record.
    fn finish(&mut self) -> ExecutionRecord {
        self.phase = Phase::Finished;
        lock(&self.active).remove(&self.record.execution_id);
        self.record.clone()
    }

    fn abandon(&mut self) {
        let now = Utc::now();
        let elapsed = self.node_started.map(|t| t.elapsed().as_secs_f64()).unwrap_or_default();
        let record = &mut self.record;

        for (node_id, state) in record.node_states.iter_mut() {
            if *state == ExecutionState::Running {
                *state = ExecutionState::Failed;
                record.node_results.insert(
                    node_id.clone(),
                    NodeResult {
                        success: false,
                        output: None,
                        error: Some("run was abandoned while the node was running".into()),
                        exit_status: None,
                        duration_seconds: elapsed,
                    },
                );
            }
        }
        record.reason = Some(TerminationReason::Cancelled);
        record.status = RunStatus::Error;
        record.end_time = now;

        warn!(execution_id = %record.execution_id, "run abandoned before it finished");
        self.broadcaster.emit(RunEvent::RunCompleted {
            execution_id: record.execution_id,
            status: record.status,
            reason: record.reason.clone(),
        });

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = Arc::clone(&self.store);
                let record = record.clone();
                handle.spawn(async move {
                    if let Err(e) = persist(store.as_ref(), &record).await {
                        error!("abandoned execution {} could not be persisted: {}", record.execution_id, e);
                    }
                });
            }
            Err(_) => error!(
                "abandoned execution {} could not be persisted: no runtime",
                record.execution_id
            ),
        }
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        lock(&self.active).remove(&self.record.execution_id);
        if self.phase == Phase::Running {
            self.abandon();
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowRunner
// ---------------------------------------------------------------------------

/// Runs workflows against an agent executor and a store.
///
/// One runner serves any number of concurrent runs; all per-node state is
/// keyed by execution id.
pub struct WorkflowRunner {
    executor: Arc<dyn AgentExecutor>,
    store: Arc<dyn WorkflowStore>,
    broadcaster: StatusBroadcaster,
    config: RunnerConfig,
    active: ActiveRuns,
}

impl WorkflowRunner {
    /// Create a new runner.
    pub fn new(
        executor: Arc<dyn AgentExecutor>,
        store: Arc<dyn WorkflowStore>,
        broadcaster: StatusBroadcaster,
        config: RunnerConfig,
    ) -> Self {
        Self {
            executor,
            store,
            broadcaster,
            config,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn broadcaster(&self) -> &StatusBroadcaster {
        &self.broadcaster
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    /// Validate and order `workflow`, and register the run as active.
    ///
    /// # Errors
    /// Any [`GraphError`]; in that case nothing is registered.
    pub fn prepare(&self, workflow: &Workflow, options: RunOptions) -> Result<PreparedRun, GraphError> {
        let order = validate_dag(&workflow.graph)?;
        let execution_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let now = Utc::now();

        let snapshot = RunSnapshot {
            execution_id,
            workflow_id: workflow.id,
            workflow_name: workflow.name.clone(),
            started_at: now,
            current_node: None,
            node_states: idle_states(workflow),
        };
        self.active().insert(execution_id, ActiveRun { cancel: cancel.clone(), snapshot });

        let record = ExecutionRecord {
            execution_id,
            workflow_id: workflow.id,
            workflow_name: workflow.name.clone(),
            status: RunStatus::Completed,
            reason: None,
            start_time: now,
            end_time: now,
            execution_order: order,
            node_states: idle_states(workflow),
            node_results: BTreeMap::new(),
        };

        Ok(PreparedRun {
            workflow: workflow.clone(),
            working_directory: options
                .working_directory
                .or_else(|| self.config.default_working_directory.clone()),
            cancel,
            guard: RunGuard {
                active: Arc::clone(&self.active),
                store: Arc::clone(&self.store),
                broadcaster: self.broadcaster.clone(),
                record,
                phase: Phase::Prepared,
                node_started: None,
            },
        })
    }

    /// Prepare and execute in one step.
    pub async fn run(&self, workflow: &Workflow, options: RunOptions) -> Result<ExecutionRecord, RunError> {
        let prepared = self.prepare(workflow, options)?;
        self.execute(prepared).await
    }

    /// Load a workflow from the store, then run it.
    pub async fn run_stored(&self, workflow_id: Uuid, options: RunOptions) -> Result<ExecutionRecord, RunError> {
        let workflow = self.store.get(workflow_id).await?;
        self.run(&workflow, options).await
    }

    /// Request cancellation of an in-flight run. Returns `false` if no such
    /// run is active.
    pub fn cancel(&self, execution_id: Uuid) -> bool {
        match self.active().get(&execution_id) {
            Some(run) => {
                info!(%execution_id, "cancellation requested");
                run.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Live state of an in-flight run.
    pub fn snapshot(&self, execution_id: Uuid) -> Option<RunSnapshot> {
        self.active().get(&execution_id).map(|run| run.snapshot.clone())
    }

    /// Execution ids of every run that has been prepared but not finalized.
    pub fn active_runs(&self) -> Vec<Uuid> {
        self.active().keys().copied().collect()
    }

    /// Execute a prepared run to completion.
    ///
    /// Node failures do not surface as errors: they are captured in the
    /// returned record. The only error is [`RunError::Persist`], which still
    /// carries the full record.
    ///
    /// If the returned future is dropped mid-run, the run is finalized as
    /// `Cancelled` and persisted in the background.
    #[instrument(skip(self, run), fields(execution_id = %run.execution_id(), workflow_id = %run.workflow.id))]
    pub async fn execute(&self, run: PreparedRun) -> Result<ExecutionRecord, RunError> {
        let PreparedRun { workflow, working_directory, cancel, mut guard } = run;
        let execution_id = guard.record.execution_id;
        let order = guard.record.execution_order.clone();
        guard.record.start_time = Utc::now();
        guard.phase = Phase::Running;

        info!(
            "executing {} nodes in order: {:?}",
            order.len(), order
        );
        self.broadcaster.emit(RunEvent::RunStarted {
            execution_id,
            workflow_id: workflow.id,
            workflow_name: workflow.name.clone(),
            node_count: order.len(),
        });

        // ------------------------------------------------------------------
        // Execute nodes sequentially.
        // ------------------------------------------------------------------
        for node_id in &order {
            if cancel.is_cancelled() {
                warn!("run cancelled before node '{}'", node_id);
                guard.record.reason = Some(TerminationReason::Cancelled);
                break;
            }

            let Some(node) = workflow.graph.node(node_id) else {
                continue;
            };

            guard.record.node_states.insert(node_id.clone(), ExecutionState::Running);
            self.mark(execution_id, node_id, ExecutionState::Running);
            self.broadcaster.emit(RunEvent::NodeStarted {
                execution_id,
                node_id: node_id.clone(),
                agent_type: node.agent_type.clone(),
            });

            let started = Instant::now();
            guard.node_started = Some(started);
            let outcome = self
                .executor
                .run(&node.agent_type, &node.arguments, working_directory.as_deref())
                .await;
            let duration_seconds = started.elapsed().as_secs_f64();

            let result = match outcome {
                Ok(out) if out.is_success() => NodeResult {
                    success: true,
                    output: Some(out.output),
                    error: None,
                    exit_status: Some(out.exit_status),
                    duration_seconds,
                },
                Ok(out) => NodeResult {
                    success: false,
                    error: Some(format!("agent exited with status {}", out.exit_status)),
                    output: Some(out.output),
                    exit_status: Some(out.exit_status),
                    duration_seconds,
                },
                Err(e) => {
                    // A failed process may still have written useful output.
                    let (output, exit_status) = match &e {
                        ExecutorError::NonZeroExit { code, stdout, .. } => {
                            (Some(stdout.clone()).filter(|s| !s.is_empty()), Some(*code))
                        }
                        _ => (None, None),
                    };
                    NodeResult {
                        success: false,
                        output,
                        error: Some(e.to_string()),
                        exit_status,
                        duration_seconds,
                    }
                }
            };

            if result.success {
                info!("node '{}' completed in {:.3}s", node_id, duration_seconds);
                guard.record.node_states.insert(node_id.clone(), ExecutionState::Completed);
                self.mark(execution_id, node_id, ExecutionState::Completed);
                self.broadcaster.emit(RunEvent::NodeCompleted {
                    execution_id,
                    node_id: node_id.clone(),
                    duration_seconds,
                });
                guard.record.node_results.insert(node_id.clone(), result);
                continue;
            }

            let message = result.error.clone().unwrap_or_default();
            error!("node '{}' failed: {}", node_id, message);
            guard.record.node_states.insert(node_id.clone(), ExecutionState::Failed);
            self.mark(execution_id, node_id, ExecutionState::Failed);
            self.broadcaster.emit(RunEvent::NodeFailed {
                execution_id,
                node_id: node_id.clone(),
                error: message,
                duration_seconds,
            });
            guard.record.node_results.insert(node_id.clone(), result);

            if guard.record.reason.is_none() {
                guard.record.reason = Some(TerminationReason::NodeFailed { node_id: node_id.clone() });
            }
            if self.config.failure_policy == FailurePolicy::FailFast {
                break;
            }
        }

        // ------------------------------------------------------------------
        // Finalize the record.
        // ------------------------------------------------------------------
        guard.record.status = if guard.record.reason.is_some() {
            RunStatus::Error
        } else {
            RunStatus::Completed
        };
        guard.record.end_time = Utc::now();
        let record = guard.finish();
        drop(guard);

        let persisted = persist(self.store.as_ref(), &record).await;

        self.broadcaster.emit(RunEvent::RunCompleted {
            execution_id,
            status: record.status,
            reason: record.reason.clone(),
        });

        match persisted {
            Ok(()) => {
                info!("workflow '{}' execution {} finished: {}", workflow.id, execution_id, record.status);
                Ok(record)
            }
            Err(source) => {
                error!("execution {} finished but could not be persisted: {}", execution_id, source);
                Err(RunError::Persist { record: Box::new(record), source })
            }
        }
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn mark(&self, execution_id: Uuid, node_id: &str, state: ExecutionState) {
        if let Some(run) = self.active().get_mut(&execution_id) {
            run.snapshot.node_states.insert(node_id.to_owned(), state);
            run.snapshot.current_node = match state {
                ExecutionState::Running => Some(node_id.to_owned()),
                _ => None,
            };
        }
    }

    fn active(&self) -> MutexGuard<'_, HashMap<Uuid, ActiveRun>> {
        lock(&self.active)
    }
}

/// Append the record, then bump the workflow's counters.
async fn persist(store: &dyn WorkflowStore, record: &ExecutionRecord) -> Result<(), StoreError> {
    store.append_execution(record).await?;
    store
        .record_execution_summary(record.workflow_id, record.end_time)
        .await?;
    Ok(())
}

/// Every node of the workflow, in `Idle`.
fn idle_states(workflow: &Workflow) -> BTreeMap<String, ExecutionState> {
    workflow
        .graph
        .nodes
        .iter()
        .map(|n| (n.id.clone(), ExecutionState::Idle))
        .collect()
}
