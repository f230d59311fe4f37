//! The [`Graph`] itself: a named collection of [`Node`]s plus the validation
//! rules that make traversal safe.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::GraphError;
use crate::node::Node;

/// A validated (or validatable) directed graph of [`Node`]s.
///
/// Every composite node (`parallel`, `map`, `dag`) owns one or more nested
/// `Graph`s of its own — see [`crate::NodeKind`] — so a `Graph` is really the
/// node of a tree of graphs, not just a single flat DAG.
#[derive(Debug, Clone)]
pub struct Graph {
    /// Name of this branch, e.g. `""` for the root pipeline, or
    /// `parallel_step.branch_a` for a parallel branch.
    pub internal_branch_name: String,
    pub start_at: String,
    pub description: Option<String>,
    pub max_time: Option<u64>,
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new(
        internal_branch_name: impl Into<String>,
        start_at: impl Into<String>,
        description: Option<String>,
        max_time: Option<u64>,
    ) -> Self {
        Self {
            internal_branch_name: internal_branch_name.into(),
            start_at: start_at.into(),
            description,
            max_time,
            nodes: Vec::new(),
        }
    }

    pub fn add_node(&mut self, node: Node) -> Result<(), GraphError> {
        if self.nodes.iter().any(|n| n.name == node.name) {
            return Err(GraphError::DuplicateNodeName(node.name));
        }
        self.nodes.push(node);
        Ok(())
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn get_node_by_name(&self, name: &str) -> Result<&Node, GraphError> {
        self.nodes
            .iter()
            .find(|n| n.name == name)
            .ok_or_else(|| GraphError::NodeNotFound(name.to_owned()))
    }

    pub fn get_node_by_internal_name(&self, internal_name: &str) -> Result<&Node, GraphError> {
        self.nodes
            .iter()
            .find(|n| n.internal_name == internal_name)
            .ok_or_else(|| GraphError::InternalNodeNotFound(internal_name.to_owned()))
    }

    pub fn get_success_node(&self) -> Result<&Node, GraphError> {
        let mut it = self.nodes.iter().filter(|n| matches!(n.kind, crate::NodeKind::Success));
        let first = it.next().ok_or(GraphError::SuccessNodeCount(0))?;
        if it.next().is_some() {
            let count = self.nodes.iter().filter(|n| matches!(n.kind, crate::NodeKind::Success)).count();
            return Err(GraphError::SuccessNodeCount(count));
        }
        Ok(first)
    }

    pub fn get_fail_node(&self) -> Result<&Node, GraphError> {
        let mut it = self.nodes.iter().filter(|n| matches!(n.kind, crate::NodeKind::Fail));
        let first = it.next().ok_or(GraphError::FailNodeCount(0))?;
        if it.next().is_some() {
            let count = self.nodes.iter().filter(|n| matches!(n.kind, crate::NodeKind::Fail)).count();
            return Err(GraphError::FailNodeCount(count));
        }
        Ok(first)
    }

    /// `start_at` must resolve to a real node.
    pub fn is_start_node_present(&self) -> Result<(), GraphError> {
        self.get_node_by_name(&self.start_at)
            .map(|_| ())
            .map_err(|_| GraphError::StartNodeMissing(self.start_at.clone()))
    }

    /// Exactly one `success` node.
    pub fn success_node_validation(&self) -> Result<(), GraphError> {
        self.get_success_node().map(|_| ())
    }

    /// Exactly one `fail` node.
    pub fn fail_node_validation(&self) -> Result<(), GraphError> {
        self.get_fail_node().map(|_| ())
    }

    /// Every `next`/`on_failure` edge must point at a node that exists.
    pub fn missing_neighbors(&self) -> Result<(), GraphError> {
        let known: HashSet<&str> = self.nodes.iter().map(|n| n.name.as_str()).collect();
        let missing: Vec<String> = self
            .nodes
            .iter()
            .flat_map(|n| n.get_neighbours())
            .filter(|name| !known.contains(name))
            .map(|s| s.to_owned())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(GraphError::MissingNeighbours(missing))
        }
    }

    /// The graph, restricted to `next`/`on_failure` edges, must be acyclic.
    /// Uses Kahn's algorithm: if topological sort can't consume every node,
    /// a cycle remains among the leftovers.
    pub fn is_dag(&self) -> Result<(), GraphError> {
        let mut indegree: HashMap<&str, usize> =
            self.nodes.iter().map(|n| (n.name.as_str(), 0)).collect();
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();

        for node in &self.nodes {
            for neighbour in node.get_neighbours() {
                if let Some(count) = indegree.get_mut(neighbour) {
                    *count += 1;
                }
                adjacency.entry(node.name.as_str()).or_default().push(neighbour);
            }
        }

        let mut queue: VecDeque<&str> = indegree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&name, _)| name)
            .collect();
        let mut visited = 0usize;

        while let Some(name) = queue.pop_front() {
            visited += 1;
            if let Some(neighbours) = adjacency.get(name) {
                for &neighbour in neighbours {
                    if let Some(count) = indegree.get_mut(neighbour) {
                        *count -= 1;
                        if *count == 0 {
                            queue.push_back(neighbour);
                        }
                    }
                }
            }
        }

        if visited == self.nodes.len() {
            Ok(())
        } else {
            Err(GraphError::CycleDetected)
        }
    }

    /// Runs every structural check, then recurses into composite nodes'
    /// nested graphs. Order matches the source test suite: start node,
    /// success node, fail node, missing neighbours, then acyclicity.
    pub fn validate(&self) -> Result<(), GraphError> {
        self.is_start_node_present()?;
        self.success_node_validation()?;
        self.fail_node_validation()?;
        self.missing_neighbors()?;
        self.is_dag()?;

        for node in &self.nodes {
            for (_, branch) in node.branches() {
                branch.validate()?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeConfig, NodeKind};

    fn step(name: &str, next: Option<&str>, on_failure: Option<&str>, kind: NodeKind) -> Node {
        Node::new(
            name,
            format!(".{name}"),
            "",
            NodeConfig {
                next: next.map(str::to_owned),
                on_failure: on_failure.map(str::to_owned),
                ..Default::default()
            },
            kind,
        )
        .unwrap()
    }

    fn linear_graph() -> Graph {
        let mut g = Graph::new("", "start", None, None);
        g.add_node(step("start", Some("success"), Some("fail"), NodeKind::Task)).unwrap();
        g.add_node(step("success", None, None, NodeKind::Success)).unwrap();
        g.add_node(step("fail", None, None, NodeKind::Fail)).unwrap();
        g
    }

    #[test]
    fn valid_linear_graph_passes() {
        assert!(linear_graph().validate().is_ok());
    }

    #[test]
    fn missing_start_node_is_rejected() {
        let mut g = linear_graph();
        g.start_at = "nowhere".to_owned();
        assert!(matches!(g.validate(), Err(GraphError::StartNodeMissing(_))));
    }

    #[test]
    fn requires_exactly_one_success_node() {
        let mut g = linear_graph();
        g.add_node(step("success2", None, None, NodeKind::Success)).unwrap();
        assert!(matches!(g.validate(), Err(GraphError::SuccessNodeCount(2))));
    }

    #[test]
    fn requires_exactly_one_fail_node() {
        let g = Graph::new("", "start", None, None);
        let mut g = g;
        g.add_node(step("start", Some("success"), None, NodeKind::Task)).unwrap();
        g.add_node(step("success", None, None, NodeKind::Success)).unwrap();
        assert!(matches!(g.validate(), Err(GraphError::FailNodeCount(0))));
    }

    #[test]
    fn detects_missing_neighbours() {
        let mut g = linear_graph();
        g.add_node(step("dangling", Some("ghost"), None, NodeKind::Task)).unwrap();
        assert!(matches!(g.validate(), Err(GraphError::MissingNeighbours(_))));
    }

    #[test]
    fn detects_cycles() {
        let mut g = Graph::new("", "a", None, None);
        g.add_node(step("a", Some("b"), None, NodeKind::Task)).unwrap();
        g.add_node(step("b", Some("a"), None, NodeKind::Task)).unwrap();
        g.add_node(step("success", None, None, NodeKind::Success)).unwrap();
        g.add_node(step("fail", None, None, NodeKind::Fail)).unwrap();
        assert!(matches!(g.validate(), Err(GraphError::CycleDetected)));
    }
}
