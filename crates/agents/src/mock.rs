//! `MockExecutor` — a test double for `AgentExecutor`.
//!
//! Behaviour is keyed by the node's argument string, so a test can make one
//! specific node of a workflow fail while every other node succeeds.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::{AgentExecutor, AgentOutput, ExecutorError};

/// Behaviour injected into `MockExecutor` for a given argument string.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Succeed with `"<agent_type>:<arguments>"` as output.
    Succeed,
    /// Return normally but with a non-zero exit status.
    ExitWith(i32),
    /// Fail with the given error.
    Fail(ExecutorError),
    /// Sleep, then succeed.
    Delay(Duration),
}

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub agent_type: String,
    pub arguments: String,
}

/// A mock executor that records every call it receives.
#[derive(Clone, Default)]
pub struct MockExecutor {
    behaviours: HashMap<String, MockBehaviour>,
    /// All invocations seen (in call order).
    pub calls: Arc<Mutex<Vec<MockCall>>>,
}

impl MockExecutor {
    /// A mock that succeeds for every argument string.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with `ExecutorError::NonZeroExit` whenever `arguments` is seen.
    pub fn failing(self, arguments: impl Into<String>, msg: impl Into<String>) -> Self {
        self.with(
            arguments,
            MockBehaviour::Fail(ExecutorError::NonZeroExit {
                code: 1,
                stdout: String::new(),
                stderr: msg.into(),
            }),
        )
    }

    /// Return a non-zero exit status without raising an error.
    pub fn exiting(self, arguments: impl Into<String>, code: i32) -> Self {
        self.with(arguments, MockBehaviour::ExitWith(code))
    }

    /// Sleep for `delay` before succeeding.
    pub fn delay(self, arguments: impl Into<String>, delay: Duration) -> Self {
        self.with(arguments, MockBehaviour::Delay(delay))
    }

    pub fn with(mut self, arguments: impl Into<String>, behaviour: MockBehaviour) -> Self {
        self.behaviours.insert(arguments.into(), behaviour);
        self
    }

    /// Number of invocations so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Argument strings in call order.
    pub fn called_arguments(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|c| c.arguments.clone()).collect()
    }
}

#[async_trait]
impl AgentExecutor for MockExecutor {
    async fn run(
        &self,
        agent_type: &str,
        arguments: &str,
        _working_directory: Option<&Path>,
    ) -> Result<AgentOutput, ExecutorError> {
        self.calls.lock().unwrap().push(MockCall {
            agent_type: agent_type.to_owned(),
            arguments: arguments.to_owned(),
        });

        let output = format!("{agent_type}:{arguments}");
        match self.behaviours.get(arguments).cloned().unwrap_or(MockBehaviour::Succeed) {
            MockBehaviour::Succeed => Ok(AgentOutput::success(output)),
            MockBehaviour::ExitWith(code) => Ok(AgentOutput { output, exit_status: code }),
            MockBehaviour::Fail(err) => Err(err),
            MockBehaviour::Delay(d) => {
                tokio::time::sleep(d).await;
                Ok(AgentOutput::success(output))
            }
        }
    }
}
