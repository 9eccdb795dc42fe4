//! Engine-level error types.

use thiserror::Error;
use uuid::Uuid;

use crate::models::ExecutionRecord;

/// Structural problems that make a graph impossible to run.
///
/// Always raised before any node is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// An edge references a node ID that doesn't exist in the graph.
    #[error("edge '{edge_id}' references unknown node '{node_id}' ({side} side)")]
    DanglingEdge {
        edge_id: String,
        node_id: String,
        side: &'static str,
    },

    /// No topological order exists; `nodes` could not be scheduled.
    #[error("workflow graph contains a cycle through: {}", .nodes.join(", "))]
    CycleDetected { nodes: Vec<String> },
}

/// Persistence failures, surfaced to the caller as-is.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("write conflict: {0}")]
    WriteConflict(String),

    #[error("database error: {0}")]
    Database(db::DbError),

    #[error("stored document could not be decoded: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Attach entity context to a repository error.
    pub(crate) fn from_db(err: db::DbError, entity: &'static str, id: Uuid) -> Self {
        match err {
            db::DbError::NotFound => Self::NotFound { entity, id },
            db::DbError::Conflict(msg) => Self::WriteConflict(msg),
            other => Self::Database(other),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors returned by the runner.
///
/// Node failures are not errors: they end up inside the `ExecutionRecord`.
#[derive(Debug, Error)]
pub enum RunError {
    /// The graph was rejected; nothing ran.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The workflow could not be loaded; nothing ran.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The run finished but its record or summary could not be written.
    #[error("execution {id} finished but was not persisted: {source}", id = .record.execution_id)]
    Persist {
        record: Box<ExecutionRecord>,
        source: StoreError,
    },
}
