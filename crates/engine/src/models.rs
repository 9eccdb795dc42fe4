//! Core domain models for the workflow engine.
//!
//! These types are the source of truth for what a workflow looks like
//! in memory.  The graph is serialised to the `definition` column of the
//! `workflows` table; execution records are stored whole in `executions`.
//! Field names are camelCase on the wire to match the dashboard.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A single agent invocation in the workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier within this graph (referenced by edges).
    pub id: String,
    /// Agent to invoke, e.g. `coder` or `tester`.
    pub agent_type: String,
    pub label: String,
    /// Opaque argument string handed to the agent executor.
    #[serde(default)]
    pub arguments: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Node {
    pub fn new(
        id: impl Into<String>,
        agent_type: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            agent_type: agent_type.into(),
            label: label.into(),
            arguments: String::new(),
            description: None,
        }
    }

    pub fn with_arguments(mut self, arguments: impl Into<String>) -> Self {
        self.arguments = arguments.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// `target` must run after `source`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    #[serde(default)]
    pub id: String,
    pub source: String,
    pub target: String,
}

impl Edge {
    /// Edge with the dashboard's `e<source>-<target>` id convention.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        Self { id: format!("e{source}-{target}"), source, target }
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// Nodes in authored order plus their dependency edges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A persisted workflow: graph, metadata and execution counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub graph: Graph,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    #[serde(default)]
    pub execution_count: u64,
    #[serde(default)]
    pub last_executed: Option<DateTime<Utc>>,
}

impl Workflow {
    /// A fresh, never-executed workflow.
    pub fn new(name: impl Into<String>, description: impl Into<String>, graph: Graph) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            graph,
            created: now,
            modified: now,
            execution_count: 0,
            last_executed: None,
        }
    }
}

/// What a client submits to create a workflow (a file on disk or a request
/// body). Nodes and edges sit at the top level, as the dashboard saves them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub graph: Graph,
}

impl WorkflowDraft {
    pub fn into_workflow(self) -> Workflow {
        Workflow::new(self.name, self.description, self.graph)
    }
}

/// Partial update of a workflow's editable fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub graph: Option<Graph>,
    /// When set, the update fails with a write conflict unless the stored
    /// `modified` timestamp still equals this value.
    pub expected_modified: Option<DateTime<Utc>>,
}

impl WorkflowPatch {
    /// Apply the present fields to `workflow` and stamp `modified`.
    pub fn apply(self, workflow: &mut Workflow, modified: DateTime<Utc>) {
        if let Some(name) = self.name {
            workflow.name = name;
        }
        if let Some(description) = self.description {
            workflow.description = description;
        }
        if let Some(graph) = self.graph {
            workflow.graph = graph;
        }
        workflow.modified = modified;
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Per-node state within one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionState {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl ExecutionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Overall outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    Completed,
    Error,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Why a run ended with [`RunStatus::Error`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TerminationReason {
    /// The first node that failed.
    #[serde(rename_all = "camelCase")]
    NodeFailed { node_id: String },
    /// A cancellation signal stopped the run before every node started.
    Cancelled,
}

/// What happened to a node that was dispatched to the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<i32>,
    pub duration_seconds: f64,
}

/// The immutable outcome of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub workflow_name: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<TerminationReason>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// The scheduled order, including nodes that never started.
    pub execution_order: Vec<String>,
    /// Final state of every node in the graph.
    pub node_states: BTreeMap<String, ExecutionState>,
    /// Only nodes that were dispatched have an entry.
    pub node_results: BTreeMap<String, NodeResult>,
}

impl ExecutionRecord {
    pub fn state_of(&self, node_id: &str) -> ExecutionState {
        self.node_states.get(node_id).copied().unwrap_or_default()
    }

    pub fn duration_seconds(&self) -> f64 {
        (self.end_time - self.start_time).num_milliseconds() as f64 / 1000.0
    }
}
