//! Built-in workflow templates.

use serde::Serialize;

use crate::models::{Edge, Graph, Node};

/// A ready-made workflow a client can start from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowTemplate {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub graph: Graph,
}

/// The single node a new, empty workflow starts with.
pub fn starter_graph() -> Graph {
    Graph::new(
        vec![Node::new("1", "analyzer", "Start Here")
            .with_description("Add agents to create your workflow")],
        vec![],
    )
}

pub fn templates() -> Vec<WorkflowTemplate> {
    vec![full_stack(), debug_investigation()]
}

pub fn template(key: &str) -> Option<WorkflowTemplate> {
    templates().into_iter().find(|t| t.key == key)
}

fn full_stack() -> WorkflowTemplate {
    WorkflowTemplate {
        key: "fullstack",
        name: "Full-Stack Development",
        description: "Complete application development workflow",
        graph: Graph::new(
            vec![
                Node::new("1", "analyzer", "Project Analysis")
                    .with_description("Analyze requirements and plan architecture"),
                Node::new("2", "coder", "Backend API")
                    .with_description("Develop API endpoints and database"),
                Node::new("3", "coder", "Frontend UI")
                    .with_description("Create React components and pages"),
                Node::new("4", "tester", "Testing Suite")
                    .with_description("Generate comprehensive tests"),
                Node::new("5", "documenter", "Documentation")
                    .with_description("Create project documentation"),
            ],
            vec![
                Edge::new("1", "2"),
                Edge::new("1", "3"),
                Edge::new("2", "4"),
                Edge::new("3", "4"),
                Edge::new("4", "5"),
            ],
        ),
    }
}

fn debug_investigation() -> WorkflowTemplate {
    WorkflowTemplate {
        key: "debug",
        name: "Debug Investigation",
        description: "Systematic bug investigation and resolution",
        graph: Graph::new(
            vec![
                Node::new("1", "debugger", "Issue Analysis")
                    .with_description("Analyze the reported issue"),
                Node::new("2", "analyzer", "Root Cause")
                    .with_description("Find root cause of the issue"),
                Node::new("3", "coder", "Fix Implementation")
                    .with_description("Implement the fix"),
                Node::new("4", "tester", "Verify Fix")
                    .with_description("Test the fix thoroughly"),
            ],
            vec![Edge::new("1", "2"), Edge::new("2", "3"), Edge::new("3", "4")],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::validate_dag;
    use agents::AgentCatalog;

    #[test]
    fn every_template_is_schedulable_with_known_agents() {
        let catalog = AgentCatalog::default();
        for t in templates() {
            validate_dag(&t.graph).unwrap_or_else(|e| panic!("{}: {e}", t.key));
            for node in &t.graph.nodes {
                assert!(catalog.contains(&node.agent_type), "{}: {}", t.key, node.agent_type);
            }
        }
    }

    #[test]
    fn full_stack_runs_backend_before_frontend() {
        let order = validate_dag(&template("fullstack").unwrap().graph).unwrap();
        assert_eq!(order, vec!["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn unknown_template_is_none() {
        assert!(template("nope").is_none());
    }

    #[test]
    fn starter_graph_is_a_single_analyzer() {
        let graph = starter_graph();
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0].agent_type, "analyzer");
        assert!(graph.edges.is_empty());
    }
}
