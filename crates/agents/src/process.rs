//! Process-backed executor.
//!
//! Each node becomes `<program> <agent_type> <arg>...`. No shell is involved:
//! the argument string is split on whitespace and handed to the process as
//! separate argv entries.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{AgentCatalog, AgentExecutor, AgentOutput, ExecutorError};

/// Upper bound on the argument string accepted from a workflow node.
const MAX_ARGUMENT_BYTES: usize = 8 * 1024;

#[derive(Debug, Clone)]
pub struct ProcessExecutorConfig {
    /// Program invoked for every agent.
    pub program: PathBuf,
    /// Working directory used when the caller does not supply one.
    pub default_working_directory: Option<PathBuf>,
}

impl Default for ProcessExecutorConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("cce-agent"),
            default_working_directory: None,
        }
    }
}

pub struct ProcessExecutor {
    config: ProcessExecutorConfig,
    catalog: AgentCatalog,
}

impl ProcessExecutor {
    pub fn new(config: ProcessExecutorConfig, catalog: AgentCatalog) -> Self {
        Self { config, catalog }
    }

    pub fn catalog(&self) -> &AgentCatalog {
        &self.catalog
    }

    /// Split and check the opaque argument string.
    pub fn sanitize_arguments(arguments: &str) -> Result<Vec<String>, ExecutorError> {
        if arguments.len() > MAX_ARGUMENT_BYTES {
            return Err(ExecutorError::InvalidArguments(format!(
                "argument string is {} bytes (max {MAX_ARGUMENT_BYTES})",
                arguments.len()
            )));
        }
        if let Some(c) = arguments.chars().find(|c| c.is_control() && !c.is_whitespace()) {
            return Err(ExecutorError::InvalidArguments(format!(
                "control character {:?} is not allowed",
                c
            )));
        }
        Ok(arguments.split_whitespace().map(str::to_owned).collect())
    }
}

#[async_trait]
impl AgentExecutor for ProcessExecutor {
    async fn run(
        &self,
        agent_type: &str,
        arguments: &str,
        working_directory: Option<&Path>,
    ) -> Result<AgentOutput, ExecutorError> {
        if !self.catalog.contains(agent_type) {
            return Err(ExecutorError::UnknownAgent(agent_type.to_owned()));
        }
        let args = Self::sanitize_arguments(arguments)?;

        let mut command = Command::new(&self.config.program);
        command
            .arg(agent_type)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let cwd = working_directory.or(self.config.default_working_directory.as_deref());
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        debug!(
            program = %self.config.program.display(),
            agent_type,
            argc = args.len(),
            "spawning agent process"
        );

        let output = command
            .output()
            .await
            .map_err(|e| ExecutorError::Spawn(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        match output.status.code() {
            Some(0) => Ok(AgentOutput::success(stdout)),
            Some(code) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
                warn!(agent_type, code, "agent process exited with non-zero status");
                Err(ExecutorError::NonZeroExit { code, stdout, stderr })
            }
            // Terminated by a signal.
            None => Err(ExecutorError::Spawn(format!(
                "agent process terminated without an exit code: {}",
                output.status
            ))),
        }
    }
}
