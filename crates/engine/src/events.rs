//! Live status events and the broadcaster that fans them out.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

use crate::models::{RunStatus, TerminationReason};

/// One state transition or milestone of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RunEvent {
    #[serde(rename_all = "camelCase")]
    RunStarted {
        execution_id: Uuid,
        workflow_id: Uuid,
        workflow_name: String,
        node_count: usize,
    },
    #[serde(rename_all = "camelCase")]
    NodeStarted {
        execution_id: Uuid,
        node_id: String,
        agent_type: String,
    },
    #[serde(rename_all = "camelCase")]
    NodeCompleted {
        execution_id: Uuid,
        node_id: String,
        duration_seconds: f64,
    },
    #[serde(rename_all = "camelCase")]
    NodeFailed {
        execution_id: Uuid,
        node_id: String,
        error: String,
        duration_seconds: f64,
    },
    #[serde(rename_all = "camelCase")]
    RunCompleted {
        execution_id: Uuid,
        status: RunStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<TerminationReason>,
    },
}

impl RunEvent {
    pub fn execution_id(&self) -> Uuid {
        match self {
            Self::RunStarted { execution_id, .. }
            | Self::NodeStarted { execution_id, .. }
            | Self::NodeCompleted { execution_id, .. }
            | Self::NodeFailed { execution_id, .. }
            | Self::RunCompleted { execution_id, .. } => *execution_id,
        }
    }
}

/// Fans run events out to every attached observer.
///
/// Backed by a tokio broadcast channel: `emit` never blocks, an observer
/// that falls more than `capacity` events behind skips the oldest ones, and
/// each observer sees events in emission order.
#[derive(Debug, Clone)]
pub struct StatusBroadcaster {
    tx: broadcast::Sender<RunEvent>,
}

impl StatusBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Fire-and-forget delivery to current observers.
    pub fn emit(&self, event: RunEvent) {
        trace!(?event, "emitting run event");
        // No observers is not an error.
        let _ = self.tx.send(event);
    }

    /// Attach a new observer; it receives events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.tx.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}
