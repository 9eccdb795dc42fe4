//! DAG validation and scheduling — run this before executing a workflow.
//!
//! Rules enforced by [`validate`]:
//! 1. Node IDs must be unique within the graph.
//! 2. Every edge must reference valid node IDs (both `source` and `target`).
//!
//! [`order`] then produces a topological execution order with Kahn's
//! algorithm, or reports the nodes that sit on a cycle.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::{GraphError, models::Graph};

/// A graph whose structure has been checked, with the adjacency data the
/// scheduler needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedGraph {
    /// Node IDs in definition order.
    node_ids: Vec<String>,
    /// Number of incoming edges per node.
    in_degree: HashMap<String, usize>,
    /// Nodes that must run after each node, in edge-definition order.
    successors: HashMap<String, Vec<String>>,
    /// Nodes each node depends on, in edge-definition order.
    dependencies: HashMap<String, Vec<String>>,
}

impl ValidatedGraph {
    pub fn node_ids(&self) -> &[String] {
        &self.node_ids
    }

    pub fn in_degree(&self, node_id: &str) -> usize {
        self.in_degree.get(node_id).copied().unwrap_or(0)
    }

    pub fn out_degree(&self, node_id: &str) -> usize {
        self.successors.get(node_id).map_or(0, Vec::len)
    }

    pub fn successors(&self, node_id: &str) -> &[String] {
        self.successors.get(node_id).map_or(&[], Vec::as_slice)
    }

    pub fn dependencies(&self, node_id: &str) -> &[String] {
        self.dependencies.get(node_id).map_or(&[], Vec::as_slice)
    }
}

/// Check the graph's structure and derive its adjacency data.
///
/// # Errors
/// - [`GraphError::DuplicateNodeId`] if two nodes share an ID.
/// - [`GraphError::DanglingEdge`] if an edge references a missing node.
pub fn validate(graph: &Graph) -> Result<ValidatedGraph, GraphError> {
    // -----------------------------------------------------------------------
    // 1. Ensure node IDs are unique
    // -----------------------------------------------------------------------
    let mut seen_ids: HashSet<&str> = HashSet::new();
    for node in &graph.nodes {
        if !seen_ids.insert(node.id.as_str()) {
            return Err(GraphError::DuplicateNodeId(node.id.clone()));
        }
    }

    // -----------------------------------------------------------------------
    // 2. Validate edge endpoints
    // -----------------------------------------------------------------------
    for edge in &graph.edges {
        for (node_id, side) in [(&edge.source, "source"), (&edge.target, "target")] {
            if !seen_ids.contains(node_id.as_str()) {
                return Err(GraphError::DanglingEdge {
                    edge_id: edge.id.clone(),
                    node_id: node_id.clone(),
                    side,
                });
            }
        }
    }

    // -----------------------------------------------------------------------
    // 3. Adjacency and in-degree
    // -----------------------------------------------------------------------
    let mut in_degree: HashMap<String, usize> = HashMap::with_capacity(graph.nodes.len());
    let mut successors: HashMap<String, Vec<String>> = HashMap::with_capacity(graph.nodes.len());
    let mut dependencies: HashMap<String, Vec<String>> = HashMap::with_capacity(graph.nodes.len());

    for node in &graph.nodes {
        in_degree.insert(node.id.clone(), 0);
        successors.insert(node.id.clone(), Vec::new());
        dependencies.insert(node.id.clone(), Vec::new());
    }

    for edge in &graph.edges {
        successors.entry(edge.source.clone()).or_default().push(edge.target.clone());
        dependencies.entry(edge.target.clone()).or_default().push(edge.source.clone());
        *in_degree.entry(edge.target.clone()).or_insert(0) += 1;
    }

    Ok(ValidatedGraph {
        node_ids: graph.nodes.iter().map(|n| n.id.clone()).collect(),
        in_degree,
        successors,
        dependencies,
    })
}

/// Topologically sort a validated graph (Kahn's algorithm).
///
/// Ready nodes are processed FIFO: the queue is seeded in node-definition
/// order and successors are enqueued in edge-definition order, so the result
/// is fully determined by the graph's authored order.
///
/// # Errors
/// [`GraphError::CycleDetected`] listing every node that could not be
/// scheduled, in definition order. No partial order is returned.
pub fn order(graph: &ValidatedGraph) -> Result<Vec<String>, GraphError> {
    let mut in_degree: HashMap<&str, usize> = graph
        .in_degree
        .iter()
        .map(|(id, d)| (id.as_str(), *d))
        .collect();

    // Seed the queue with nodes that have no incoming edges.
    let mut queue: VecDeque<&str> = graph
        .node_ids
        .iter()
        .map(String::as_str)
        .filter(|id| in_degree.get(id).copied() == Some(0))
        .collect();

    let mut sorted: Vec<String> = Vec::with_capacity(graph.node_ids.len());

    while let Some(node_id) = queue.pop_front() {
        sorted.push(node_id.to_owned());

        for neighbour in graph.successors(node_id) {
            if let Some(deg) = in_degree.get_mut(neighbour.as_str()) {
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(neighbour.as_str());
                }
            }
        }
    }

    // If we didn't visit every node the graph contains a cycle.
    if sorted.len() != graph.node_ids.len() {
        let nodes = graph
            .node_ids
            .iter()
            .filter(|id| in_degree.get(id.as_str()).copied().unwrap_or(0) > 0)
            .cloned()
            .collect();
        return Err(GraphError::CycleDetected { nodes });
    }

    Ok(sorted)
}

/// Validate the graph and return nodes in topological execution order.
pub fn validate_dag(graph: &Graph) -> Result<Vec<String>, GraphError> {
    order(&validate(graph)?)
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Edge, Node};

    fn make_node(id: &str) -> Node {
        Node::new(id, "coder", id.to_uppercase())
    }

    fn make_graph(ids: &[&str], edges: &[(&str, &str)]) -> Graph {
        Graph::new(
            ids.iter().map(|id| make_node(id)).collect(),
            edges.iter().map(|(s, t)| Edge::new(*s, *t)).collect(),
        )
    }

    fn assert_respects_edges(graph: &Graph, sorted: &[String]) {
        assert_eq!(sorted.len(), graph.nodes.len());
        let position: HashMap<&str, usize> =
            sorted.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
        for node in &graph.nodes {
            assert!(position.contains_key(node.id.as_str()), "missing {}", node.id);
        }
        for edge in &graph.edges {
            assert!(
                position[edge.source.as_str()] < position[edge.target.as_str()],
                "{} must precede {}",
                edge.source,
                edge.target
            );
        }
    }

    #[test]
    fn valid_linear_dag_returns_sorted_order() {
        // A → B → C
        let graph = make_graph(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        let sorted = validate_dag(&graph).expect("should be valid");
        assert_eq!(sorted, vec!["a", "b", "c"]);
    }

    #[test]
    fn linear_chain_authored_backwards_still_sorts_by_dependency() {
        let graph = make_graph(&["c", "b", "a"], &[("a", "b"), ("b", "c")]);
        assert_eq!(validate_dag(&graph).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn fan_out_ties_break_in_node_definition_order() {
        // A → B, A → C
        let graph = make_graph(&["a", "b", "c"], &[("a", "b"), ("a", "c")]);
        assert_eq!(validate_dag(&graph).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn successors_are_enqueued_in_edge_order() {
        // Edges list C before B, so C becomes ready first.
        let graph = make_graph(&["a", "b", "c"], &[("a", "c"), ("a", "b")]);
        assert_eq!(validate_dag(&graph).unwrap(), vec!["a", "c", "b"]);
    }

    #[test]
    fn independent_roots_keep_definition_order() {
        let graph = make_graph(&["x", "y", "z"], &[]);
        assert_eq!(validate_dag(&graph).unwrap(), vec!["x", "y", "z"]);
    }

    #[test]
    fn valid_diamond_dag() {
        //   A
        //  / \
        // B   C
        //  \ /
        //   D
        let graph = make_graph(
            &["a", "b", "c", "d"],
            &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")],
        );
        let sorted = validate_dag(&graph).expect("should be valid");
        assert_eq!(sorted, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn full_stack_shape_respects_every_edge() {
        let graph = make_graph(
            &["5", "4", "3", "2", "1"],
            &[("1", "2"), ("1", "3"), ("2", "4"), ("3", "4"), ("4", "5")],
        );
        let sorted = validate_dag(&graph).unwrap();
        assert_respects_edges(&graph, &sorted);
        assert_eq!(sorted, vec!["1", "2", "3", "4", "5"]);
    }

    #[test]
    fn ordering_is_idempotent() {
        let graph = make_graph(
            &["a", "b", "c", "d", "e"],
            &[("a", "d"), ("b", "d"), ("c", "e"), ("d", "e")],
        );
        let first = validate_dag(&graph).unwrap();
        let second = validate_dag(&graph).unwrap();
        assert_eq!(first, second);
        assert_respects_edges(&graph, &first);
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let graph = make_graph(&["a", "a"], &[]); // duplicate!
        assert!(matches!(
            validate(&graph),
            Err(GraphError::DuplicateNodeId(id)) if id == "a"
        ));
    }

    #[test]
    fn edge_referencing_missing_node_is_rejected() {
        let graph = make_graph(&["a"], &[("a", "ghost")]); // ghost doesn't exist
        assert!(matches!(
            validate(&graph),
            Err(GraphError::DanglingEdge { node_id, side: "target", .. }) if node_id == "ghost"
        ));

        let graph = make_graph(&["a"], &[("ghost", "a")]);
        assert!(matches!(
            validate(&graph),
            Err(GraphError::DanglingEdge { side: "source", .. })
        ));
    }

    #[test]
    fn cycle_is_detected_and_lists_unresolved_nodes() {
        // R → A → B → C → A  (cycle!)
        let graph = make_graph(
            &["r", "a", "b", "c"],
            &[("r", "a"), ("a", "b"), ("b", "c"), ("c", "a")], // back-edge
        );
        assert_eq!(
            validate_dag(&graph),
            Err(GraphError::CycleDetected { nodes: vec!["a".into(), "b".into(), "c".into()] })
        );
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let graph = make_graph(&["a", "b"], &[("a", "a")]);
        assert_eq!(
            validate_dag(&graph),
            Err(GraphError::CycleDetected { nodes: vec!["a".into()] })
        );
    }

    #[test]
    fn nodes_downstream_of_a_cycle_are_reported_too() {
        let graph = make_graph(&["a", "b", "c"], &[("a", "b"), ("b", "a"), ("b", "c")]);
        let err = validate_dag(&graph).unwrap_err();
        assert_eq!(err, GraphError::CycleDetected { nodes: vec!["a".into(), "b".into(), "c".into()] });
    }

    #[test]
    fn single_node_no_edges_is_valid() {
        let graph = make_graph(&["solo"], &[]);
        let sorted = validate_dag(&graph).expect("single node should be valid");
        assert_eq!(sorted, vec!["solo"]);
    }

    #[test]
    fn empty_graph_has_empty_order() {
        assert_eq!(validate_dag(&Graph::default()).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn validated_graph_exposes_degrees() {
        let graph = make_graph(&["a", "b", "c"], &[("a", "b"), ("a", "c"), ("b", "c")]);
        let validated = validate(&graph).unwrap();
        assert_eq!(validated.in_degree("a"), 0);
        assert_eq!(validated.in_degree("c"), 2);
        assert_eq!(validated.out_degree("a"), 2);
        assert_eq!(validated.successors("a").to_vec(), vec!["b", "c"]);
        assert_eq!(validated.dependencies("c").to_vec(), vec!["a", "b"]);
        assert!(validated.successors("c").is_empty());
        assert_eq!(validated.node_ids().to_vec(), vec!["a", "b", "c"]);
    }
}
