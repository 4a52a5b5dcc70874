//! Dependency graph with cycle detection via Kahn's algorithm.
//!
//! Grounded on the DAG builder's cycle check: build in-degrees from the
//! reverse edges, repeatedly drain zero-in-degree nodes, and anything left
//! over once the queue empties is part of a cycle.

/// Index into the orchestrator's activity list.
pub type NodeIndex = usize;

#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// index -> activities that depend on it
    forward_edges: Vec<Vec<NodeIndex>>,
    /// index -> activities it depends on
    reverse_edges: Vec<Vec<NodeIndex>>,
}

impl DependencyGraph {
    pub fn new(node_count: usize) -> Self {
        Self {
            forward_edges: vec![Vec::new(); node_count],
            reverse_edges: vec![Vec::new(); node_count],
        }
    }

    /// Record that `from` must complete before `to`.
    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex) {
        self.forward_edges[from].push(to);
        self.reverse_edges[to].push(from);
    }

    pub fn dependents(&self, index: NodeIndex) -> &[NodeIndex] {
        self.forward_edges[index].as_slice()
    }

    pub fn dependencies(&self, index: NodeIndex) -> &[NodeIndex] {
        self.reverse_edges[index].as_slice()
    }

    /// Returns `Ok(())` if the graph is acyclic, or `Err` with the indices
    /// still part of a cycle (everything Kahn's algorithm never drained).
    pub fn check_acyclic(&self) -> Result<(), Vec<NodeIndex>> {
        let mut in_degree: Vec<usize> = self.reverse_edges.iter().map(Vec::len).collect();
        let mut queue: Vec<NodeIndex> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(i, _)| i)
            .collect();

        let mut processed = 0;
        while let Some(node) = queue.pop() {
            processed += 1;
            for &dependent in self.dependents(node) {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push(dependent);
                }
            }
        }

        if processed == in_degree.len() {
            return Ok(());
        }

        let remaining: Vec<NodeIndex> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, deg)| *deg > 0)
            .map(|(i, _)| i)
            .collect();
        Err(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acyclic_diamond_passes() {
        let mut graph = DependencyGraph::new(4);
        graph.add_edge(0, 1);
        graph.add_edge(0, 2);
        graph.add_edge(1, 3);
        graph.add_edge(2, 3);
        assert!(graph.check_acyclic().is_ok());
        assert_eq!(graph.dependencies(3), &[1, 2]);
    }

    #[test]
    fn direct_cycle_is_detected() {
        let mut graph = DependencyGraph::new(3);
        graph.add_edge(0, 1);
        graph.add_edge(1, 2);
        graph.add_edge(2, 0);
        let err = graph.check_acyclic().unwrap_err();
        assert_eq!(err.len(), 3);
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let mut graph = DependencyGraph::new(1);
        graph.add_edge(0, 0);
        assert!(graph.check_acyclic().is_err());
    }

    #[test]
    fn empty_graph_is_acyclic() {
        let graph = DependencyGraph::new(0);
        assert!(graph.check_acyclic().is_ok());
    }
}
