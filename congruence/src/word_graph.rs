use smallvec::SmallVec;
use tc_collections::ref_store::RefVec;

use crate::ids::NodeId;
use crate::presentation::Generator;

/// A predecessor edge `(source, label)` such that `target(source, label)`
/// points at the node owning this entry.
type PredEdge = (NodeId, Generator);

/// The partially-defined deterministic word graph.
///
/// `forward` stores, for every node and generator, the current target (or
/// `None` for an undefined edge). `backward` stores, for every node, the set
/// of edges pointing into it, so that re-pointing predecessors during a
/// coincidence collapse (step 4 of the drain algorithm) does not require a
/// scan of the whole graph. `redirect` is a union-find forest over node ids:
/// a node that has been merged away during the current processing episode
/// points at its surviving representative. Unlike
/// `reasoners::eq_alt::graph::node_store::NodeStore`, which wraps its
/// equivalent structure in a `RefCell` because path compression is driven
/// through shared references from a read-heavy solver query, this graph is
/// only ever touched by the owning engine loop, so compression is a plain
/// `&mut self` method.
#[derive(Debug, Clone)]
pub struct WordGraph {
    alphabet_size: usize,
    forward: RefVec<NodeId, Box<[Option<NodeId>]>>,
    backward: RefVec<NodeId, SmallVec<[PredEdge; 4]>>,
    redirect: RefVec<NodeId, Option<NodeId>>,
    edge_count: usize,
}

impl WordGraph {
    pub fn new(alphabet_size: usize) -> Self {
        WordGraph {
            alphabet_size,
            forward: RefVec::new(),
            backward: RefVec::new(),
            redirect: RefVec::new(),
            edge_count: 0,
        }
    }

    pub fn alphabet_size(&self) -> usize {
        self.alphabet_size
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Grows internal storage so that `id` has backing rows. Called by the
    /// owning coset table immediately after a node is allocated.
    pub fn ensure_node(&mut self, id: NodeId) {
        let width = self.alphabet_size;
        self.forward
            .fill_with(id, || vec![None; width].into_boxed_slice());
        self.backward.fill_with(id, SmallVec::new);
        self.redirect.fill_with(id, || None);
    }

    /// Resets bookkeeping for a recycled id so a stale redirect does not
    /// leak into its next life as an active node.
    pub fn reset_node(&mut self, id: NodeId) {
        for slot in self.forward[id].iter_mut() {
            *slot = None;
        }
        self.backward[id].clear();
        self.redirect[id] = None;
    }

    pub fn target(&self, u: NodeId, g: Generator) -> Option<NodeId> {
        self.forward[u][g as usize]
    }

    /// Records `target(u, g) = v` and the matching reverse edge. Does not
    /// check that `v` is active: callers establish that invariant.
    pub fn set_target(&mut self, u: NodeId, g: Generator, v: NodeId) {
        debug_assert!(self.forward[u][g as usize].is_none());
        self.forward[u][g as usize] = Some(v);
        self.backward[v].push((u, g));
        self.edge_count += 1;
    }

    /// Finds the current representative of `id`, flattening the path it
    /// walked (identical in spirit to `NodeStore::get_group_id`, minus the
    /// sibling/first-child bookkeeping that store needs for backtracking).
    pub fn find(&mut self, id: NodeId) -> NodeId {
        let mut path = SmallVec::<[NodeId; 8]>::new();
        let mut cur = id;
        while let Some(next) = self.redirect[cur] {
            path.push(cur);
            cur = next;
        }
        for node in path {
            self.redirect[node] = Some(cur);
        }
        cur
    }

    /// Marks `loser` as redirected to `winner`. The caller is responsible
    /// for transplanting edges and deactivating `loser` beforehand.
    pub fn set_redirect(&mut self, loser: NodeId, winner: NodeId) {
        debug_assert_ne!(loser, winner);
        self.redirect[loser] = Some(winner);
    }

    pub fn predecessors(&self, v: NodeId) -> &[PredEdge] {
        &self.backward[v]
    }

    pub fn predecessors_mut(&mut self, v: NodeId) -> &mut SmallVec<[PredEdge; 4]> {
        &mut self.backward[v]
    }

    /// Rewrites every predecessor edge `(src, g)` of `from` to instead point
    /// at `to`, and merges `from`'s predecessor list into `to`'s.
    pub fn repoint_predecessors(&mut self, from: NodeId, to: NodeId) {
        let preds = std::mem::take(&mut self.backward[from]);
        for &(src, g) in preds.iter() {
            self.forward[src][g as usize] = Some(to);
        }
        self.backward[to].extend(preds);
    }

    /// Rebuilds `backward` from scratch by scanning every forward edge of
    /// every node in `active`. Used when a single coincidence drain collapses
    /// more than `large_collapse` nodes: patching each reverse edge
    /// individually would do as much work with worse constants.
    pub fn rebuild_reverse_index(&mut self, active: impl Iterator<Item = NodeId> + Clone) {
        for v in active.clone() {
            self.backward[v].clear();
        }
        for u in active {
            for g in 0..self.alphabet_size as u32 {
                if let Some(v) = self.forward[u][g as usize] {
                    self.backward[v].push((u, g));
                }
            }
        }
    }

    /// Replaces every forward target that has since been redirected (merged
    /// away) with its current representative. Used as the first half of the
    /// bulk fix-up performed after a large coincidence collapse, where
    /// patching each reverse edge as it is discovered would do more work
    /// than a single pass at the end.
    pub fn normalize_forward_edges(&mut self, active: impl Iterator<Item = NodeId> + Clone) {
        for u in active.clone() {
            for g in 0..self.alphabet_size as u32 {
                if let Some(v) = self.forward[u][g as usize] {
                    let rep = self.find(v);
                    if rep != v {
                        self.forward[u][g as usize] = Some(rep);
                    }
                }
            }
        }
    }

    /// Fraction of `(node, generator)` pairs over `active` that are defined.
    pub fn complete_ratio(&self, active_count: usize) -> f64 {
        if active_count == 0 || self.alphabet_size == 0 {
            return 1.0;
        }
        let total = active_count * self.alphabet_size;
        self.edge_count as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ROOT;

    fn node(n: u32) -> NodeId {
        NodeId::from_u32(n)
    }

    #[test]
    fn set_and_read_target() {
        let mut g = WordGraph::new(2);
        g.ensure_node(ROOT);
        g.ensure_node(node(1));
        g.set_target(ROOT, 0, node(1));
        assert_eq!(g.target(ROOT, 0), Some(node(1)));
        assert_eq!(g.target(ROOT, 1), None);
        assert_eq!(g.predecessors(node(1)), &[(ROOT, 0)]);
    }

    #[test]
    fn find_flattens_chain() {
        let mut g = WordGraph::new(1);
        for i in 0..4 {
            g.ensure_node(node(i));
        }
        g.set_redirect(node(1), node(0));
        g.set_redirect(node(2), node(1));
        g.set_redirect(node(3), node(2));
        assert_eq!(g.find(node(3)), node(0));
        // path should now be flattened
        assert_eq!(g.redirect[node(2)], Some(node(0)));
    }

    #[test]
    fn repoint_predecessors_moves_edges() {
        let mut g = WordGraph::new(1);
        for i in 0..3 {
            g.ensure_node(node(i));
        }
        g.set_target(node(1), 0, node(2));
        g.repoint_predecessors(node(2), node(0));
        assert_eq!(g.target(node(1), 0), Some(node(0)));
        assert_eq!(g.predecessors(node(0)), &[(node(1), 0)]);
    }
}
