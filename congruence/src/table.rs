use crate::coincidence::CoincidenceQueue;
use crate::definitions::{Definition, DefinitionBuffer, DefinitionPolicy};
use crate::error::Result;
use crate::ids::{NodeId, ROOT};
use crate::presentation::Generator;
use crate::word_graph::WordGraph;

/// The coset table: node lifecycle, the partial word graph, the pending
/// coincidences and the pending definitions bundled as the single piece of
/// state every engine (Felsch, HLT, Lookahead, Standardiser) operates over.
///
/// Grounded on how `reasoners::eq_alt::eq_impl::AltEqTheory` bundles its
/// `constraint_store`, `active_graph` and `trail` into one struct that every
/// `Theory` method is implemented against, rather than threading four
/// separate parameters through every call.
pub struct CosetTable {
    pub nodes: crate::node_manager::NodeManager,
    pub graph: WordGraph,
    pub coincidences: CoincidenceQueue,
    pub defs: DefinitionBuffer,
}

impl CosetTable {
    pub fn new(alphabet_size: usize, def_policy: DefinitionPolicy, def_max: usize) -> Self {
        let nodes = crate::node_manager::NodeManager::new();
        let mut graph = WordGraph::new(alphabet_size);
        graph.ensure_node(ROOT);
        CosetTable {
            nodes,
            graph,
            coincidences: CoincidenceQueue::new(),
            defs: DefinitionBuffer::new(def_policy, def_max),
        }
    }

    pub fn active_count(&self) -> usize {
        self.nodes.active_count()
    }

    /// Allocates and activates a fresh node, resetting any stale adjacency
    /// left over from a previous life of the same id.
    pub fn new_node(&mut self) -> Result<NodeId> {
        let id = self.nodes.allocate()?;
        self.graph.ensure_node(id);
        self.graph.reset_node(id);
        self.nodes.activate(id);
        Ok(id)
    }

    pub fn merge(&mut self, p: NodeId, q: NodeId) {
        self.coincidences.push(p, q);
    }

    pub fn process_coincidences(&mut self, register_definitions: bool, large_collapse: usize) -> usize {
        self.coincidences
            .drain(&mut self.graph, &mut self.nodes, &mut self.defs, register_definitions, large_collapse)
    }

    /// Returns `target(u, g)`, allocating a fresh node and defining the edge
    /// if it was undefined. Optionally registers the new edge as a
    /// [`Definition`] for later Felsch processing.
    pub fn target_or_create(&mut self, u: NodeId, g: Generator, register_definitions: bool) -> Result<NodeId> {
        if let Some(v) = self.graph.target(u, g) {
            return Ok(v);
        }
        let v = self.new_node()?;
        self.graph.set_target(u, g, v);
        if register_definitions {
            let is_active = |n: NodeId| self.nodes.is_active(n);
            self.defs.emplace(Definition { source: u, label: g }, is_active);
        }
        Ok(v)
    }

    /// Defines `target(u, g) = v` for an already-existing `v` (used when the
    /// Felsch "missing last letter" technique closes a relation onto an
    /// existing node rather than a fresh one).
    pub fn define_existing(&mut self, u: NodeId, g: Generator, v: NodeId, register_definitions: bool) {
        self.graph.set_target(u, g, v);
        if register_definitions {
            let is_active = |n: NodeId| self.nodes.is_active(n);
            self.defs.emplace(Definition { source: u, label: g }, is_active);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_or_create_allocates_on_demand() {
        let mut t = CosetTable::new(1, DefinitionPolicy::Unlimited, 0);
        let v = t.target_or_create(ROOT, 0, false).unwrap();
        assert_ne!(v, ROOT);
        assert_eq!(t.graph.target(ROOT, 0), Some(v));
        assert_eq!(t.active_count(), 2);
    }

    #[test]
    fn target_or_create_is_idempotent() {
        let mut t = CosetTable::new(1, DefinitionPolicy::Unlimited, 0);
        let v1 = t.target_or_create(ROOT, 0, false).unwrap();
        let v2 = t.target_or_create(ROOT, 0, false).unwrap();
        assert_eq!(v1, v2);
    }
}
