use std::collections::VecDeque;

use crate::definitions::{Definition, DefinitionBuffer};
use crate::ids::NodeId;
use crate::node_manager::NodeManager;
use crate::word_graph::WordGraph;

/// An unordered queue of node pairs declared equal, drained with union-find
/// semantics: smaller id always survives, larger id's edges are transplanted
/// onto it and it is deactivated.
///
/// Mirrors the union-find forest in
/// `reasoners::eq_alt::graph::node_store::NodeStore`, adapted from a
/// parent/sibling tree (which that store needs so it can enumerate a
/// group's members) down to a flat redirect map, since nothing here ever
/// needs to list a class's former ids once they have been merged away.
#[derive(Debug, Clone, Default)]
pub struct CoincidenceQueue {
    pending: VecDeque<(NodeId, NodeId)>,
}

impl CoincidenceQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, p: NodeId, q: NodeId) {
        if p != q {
            self.pending.push_back((p, q));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drains every pending coincidence, transplanting edges and
    /// deactivating losing nodes. Returns the number of nodes deactivated.
    ///
    /// When `register_definitions` is set, every edge newly filled in while
    /// resolving a coincidence (step 3 of the algorithm) is pushed onto
    /// `defs` as well, so a Felsch-driven caller keeps seeing consequences
    /// of its own merges. Beyond `large_collapse` deactivations in a single
    /// call, predecessor repointing is deferred to a single compacting pass
    /// over the whole active set rather than being patched edge by edge.
    pub fn drain(
        &mut self,
        graph: &mut WordGraph,
        nodes: &mut NodeManager,
        defs: &mut DefinitionBuffer,
        register_definitions: bool,
        large_collapse: usize,
    ) -> usize {
        let mut collapsed = 0usize;
        while let Some((p, q)) = self.pending.pop_front() {
            let p = graph.find(p);
            let q = graph.find(q);
            if p == q {
                continue;
            }
            let (winner, loser) = if p < q { (p, q) } else { (q, p) };
            graph.set_redirect(loser, winner);

            for g in 0..graph.alphabet_size() as u32 {
                let Some(loser_target) = graph.target(loser, g) else {
                    continue;
                };
                match graph.target(winner, g) {
                    None => {
                        graph.set_target(winner, g, loser_target);
                        if register_definitions {
                            defs.emplace(
                                Definition {
                                    source: winner,
                                    label: g,
                                },
                                |n| nodes.is_active(n),
                            );
                        }
                    }
                    Some(winner_target) => {
                        if winner_target != loser_target {
                            self.pending.push_back((winner_target, loser_target));
                        }
                    }
                }
            }

            if collapsed < large_collapse {
                graph.repoint_predecessors(loser, winner);
            }
            nodes.deactivate(loser);
            collapsed += 1;
        }

        if collapsed > large_collapse {
            let active: Vec<NodeId> = nodes.active_iter().collect();
            graph.normalize_forward_edges(active.iter().copied());
            graph.rebuild_reverse_index(active.iter().copied());
        }

        collapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::DefinitionPolicy;
    use crate::ids::ROOT;

    fn node(n: u32) -> NodeId {
        NodeId::from_u32(n)
    }

    fn setup(alphabet: usize, extra_nodes: u32) -> (WordGraph, NodeManager) {
        let mut graph = WordGraph::new(alphabet);
        let mut nodes = NodeManager::new();
        graph.ensure_node(ROOT);
        for _ in 0..extra_nodes {
            let id = nodes.allocate().unwrap();
            nodes.activate(id);
            graph.ensure_node(id);
        }
        (graph, nodes)
    }

    #[test]
    fn merging_equal_nodes_deactivates_the_larger() {
        let (mut graph, mut nodes) = setup(1, 1);
        let mut defs = DefinitionBuffer::new(DefinitionPolicy::Unlimited, 0);
        let mut q = CoincidenceQueue::new();
        q.push(ROOT, node(1));
        let killed = q.drain(&mut graph, &mut nodes, &mut defs, false, usize::MAX);
        assert_eq!(killed, 1);
        assert!(!nodes.is_active(node(1)));
        assert_eq!(graph.find(node(1)), ROOT);
    }

    #[test]
    fn conflicting_targets_cascade_into_a_second_coincidence() {
        let (mut graph, mut nodes) = setup(1, 3);
        graph.set_target(ROOT, 0, node(2));
        graph.set_target(node(1), 0, node(3));
        let mut defs = DefinitionBuffer::new(DefinitionPolicy::Unlimited, 0);
        let mut q = CoincidenceQueue::new();
        q.push(ROOT, node(1));
        let killed = q.drain(&mut graph, &mut nodes, &mut defs, false, usize::MAX);
        // ROOT absorbs node(1); then their targets 2 and 3 must also merge.
        assert_eq!(killed, 2);
        assert_eq!(graph.find(node(3)), node(2));
    }

    #[test]
    fn large_collapse_threshold_triggers_bulk_rebuild() {
        let (mut graph, mut nodes) = setup(1, 4);
        let mut defs = DefinitionBuffer::new(DefinitionPolicy::Unlimited, 0);
        let mut q = CoincidenceQueue::new();
        q.push(ROOT, node(1));
        q.push(node(2), node(3));
        q.push(ROOT, node(4));
        let killed = q.drain(&mut graph, &mut nodes, &mut defs, false, 1);
        assert_eq!(killed, 3);
        assert!(nodes.is_active(ROOT));
    }
}
