//! Executor-level error type.

use std::time::Duration;

use thiserror::Error;

/// Errors returned by [`AgentExecutor::run`](crate::AgentExecutor::run).
///
/// The runner does not distinguish between variants: any of them marks the
/// node as failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    /// The agent type is not part of the allowed catalog.
    #[error("unknown agent type '{0}'")]
    UnknownAgent(String),

    /// The argument string was rejected before anything was spawned.
    #[error("invalid agent arguments: {0}")]
    InvalidArguments(String),

    /// The process could not be started or awaited.
    #[error("failed to spawn agent process: {0}")]
    Spawn(String),

    /// The process exited with a non-zero status. Whatever it printed is kept.
    #[error("agent exited with status {code}: {stderr}")]
    NonZeroExit {
        code: i32,
        stdout: String,
        stderr: String,
    },

    /// The caller-imposed deadline elapsed.
    #[error("agent timed out after {0:?}")]
    Timeout(Duration),
}
