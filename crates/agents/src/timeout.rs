//! Deadline wrapper for any executor.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::{AgentExecutor, AgentOutput, ExecutorError};

/// Fails an invocation with [`ExecutorError::Timeout`] once `limit` elapses.
///
/// The inner future is dropped on timeout; for [`ProcessExecutor`](crate::ProcessExecutor)
/// that kills the child process.
pub struct TimeoutExecutor<E> {
    inner: E,
    limit: Duration,
}

impl<E> TimeoutExecutor<E> {
    pub fn new(inner: E, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl<E: AgentExecutor> AgentExecutor for TimeoutExecutor<E> {
    async fn run(
        &self,
        agent_type: &str,
        arguments: &str,
        working_directory: Option<&Path>,
    ) -> Result<AgentOutput, ExecutorError> {
        tokio::time::timeout(self.limit, self.inner.run(agent_type, arguments, working_directory))
            .await
            .map_err(|_| ExecutorError::Timeout(self.limit))?
    }
}
