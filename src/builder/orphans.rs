use crate::config::OrphanPolicy;
use crate::error::GraphError;
use crate::graph::{EdgeKind, Node, NodeId, SourceGraph};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Gives every edgeless node a place: hung off the `Detached` sentinel, or
/// removed along with it.
#[derive(Debug, Clone, Copy)]
pub struct OrphanAuditor {
    policy: OrphanPolicy,
}

impl OrphanAuditor {
    pub fn new(policy: OrphanPolicy) -> Self {
        Self { policy }
    }

    pub fn find_orphans(graph: &SourceGraph) -> Vec<NodeId> {
        graph.edgeless_nodes()
    }

    /// Returns the number of orphans found. Fails if the graph still breaks
    /// the edge invariants afterwards.
    pub fn audit(&self, graph: &mut SourceGraph) -> Result<usize, GraphError> {
        let orphans = Self::find_orphans(graph);
        if !orphans.is_empty() {
            let sentinel = graph.add_node(Node::detached_sentinel());
            for orphan in &orphans {
                debug!(node = %orphan, "detached");
                graph.add_edge(sentinel.clone(), orphan.clone(), EdgeKind::Orphan);
            }
            if self.policy == OrphanPolicy::Prune {
                let mut doomed: BTreeSet<NodeId> = graph
                    .outgoing(sentinel.as_str())
                    .filter(|edge| edge.kind == EdgeKind::Orphan)
                    .map(|edge| edge.target.clone())
                    .collect();
                doomed.insert(sentinel);
                graph.remove_nodes(&doomed);
            }
            info!(orphans = orphans.len(), policy = ?self.policy, "orphan audit");
        }
        graph.check_invariants()?;
        Ok(orphans.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;

    fn sample() -> SourceGraph {
        let mut graph = SourceGraph::new();
        let a = graph.add_node(Node::new("a", "a", NodeKind::Module));
        let b = graph.add_node(Node::new("b", "b", NodeKind::Module));
        graph.add_edge(a, b, EdgeKind::Import);
        graph.add_node(Node::new("empty", "empty", NodeKind::Module));
        graph
    }

    #[test]
    fn debug_attaches_orphans_to_sentinel() {
        let mut graph = sample();
        let count = OrphanAuditor::new(OrphanPolicy::Debug)
            .audit(&mut graph)
            .unwrap();
        assert_eq!(count, 1);
        assert!(graph.has_edge("Detached.Detached", "empty.empty", EdgeKind::Orphan));
        assert!(graph.nodes().all(|node| graph.degree(node.id.as_str()) >= 1));
    }

    #[test]
    fn prune_removes_orphans_and_sentinel() {
        let mut graph = sample();
        OrphanAuditor::new(OrphanPolicy::Prune)
            .audit(&mut graph)
            .unwrap();
        assert!(!graph.contains("empty.empty"));
        assert!(!graph.contains("Detached.Detached"));
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn no_sentinel_without_orphans() {
        let mut graph = SourceGraph::new();
        let a = graph.add_node(Node::new("a", "a", NodeKind::Module));
        let b = graph.add_node(Node::new("b", "b", NodeKind::Module));
        graph.add_edge(a, b, EdgeKind::Import);
        let count = OrphanAuditor::new(OrphanPolicy::Debug)
            .audit(&mut graph)
            .unwrap();
        assert_eq!(count, 0);
        assert!(graph.nodes_of_kind(NodeKind::Detached).next().is_none());
    }
}
