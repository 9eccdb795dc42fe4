//! The `AgentExecutor` trait — the contract every agent backend must fulfil.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ExecutorError;

/// What an agent invocation produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentOutput {
    /// Captured standard output.
    pub output: String,
    /// Process exit status; `0` means success.
    pub exit_status: i32,
}

impl AgentOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self { output: output.into(), exit_status: 0 }
    }

    pub fn is_success(&self) -> bool {
        self.exit_status == 0
    }
}

/// Runs a named agent job.
///
/// Implementations must be safe to call repeatedly and concurrently from
/// unrelated executions.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Run `agent_type` with its opaque `arguments`, optionally inside
    /// `working_directory`.
    async fn run(
        &self,
        agent_type: &str,
        arguments: &str,
        working_directory: Option<&Path>,
    ) -> Result<AgentOutput, ExecutorError>;
}
