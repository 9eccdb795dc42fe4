//! Built-in agent types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Display metadata for one agent type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// The set of agent types an executor is allowed to invoke.
#[derive(Debug, Clone)]
pub struct AgentCatalog {
    agents: BTreeMap<String, AgentInfo>,
}

impl AgentCatalog {
    /// An empty catalog; nothing is allowed until agents are registered.
    pub fn empty() -> Self {
        Self { agents: BTreeMap::new() }
    }

    /// Register (or replace) an agent type.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> &mut Self {
        let id = id.into();
        self.agents.insert(
            id.clone(),
            AgentInfo { id, name: name.into(), description: description.into() },
        );
        self
    }

    pub fn contains(&self, agent_type: &str) -> bool {
        self.agents.contains_key(agent_type)
    }

    pub fn get(&self, agent_type: &str) -> Option<&AgentInfo> {
        self.agents.get(agent_type)
    }

    /// All registered agents, sorted by id.
    pub fn list(&self) -> Vec<AgentInfo> {
        self.agents.values().cloned().collect()
    }
}

impl Default for AgentCatalog {
    fn default() -> Self {
        let mut catalog = Self::empty();
        catalog
            .register("coder", "Coder", "Write code for specific tasks")
            .register("reviewer", "Reviewer", "Review code quality and security")
            .register("tester", "Tester", "Generate comprehensive tests")
            .register("documenter", "Documenter", "Create documentation")
            .register("debugger", "Debugger", "Find and fix bugs")
            .register("deployer", "Deployer", "Setup deployment configs")
            .register("analyzer", "Analyzer", "Deep code analysis");
        catalog
    }
}
