use std::collections::VecDeque;

use crate::ids::{NodeId, ROOT};
use crate::node_manager::NodeManager;
use crate::presentation::Generator;
use crate::settings::StandardisationOrder;
use crate::table::CosetTable;
use crate::word_graph::WordGraph;

/// For each active node (indexed by its *standardised* id), the
/// `(parent, generator)` edge that first discovered it during the walk
/// that produced the current labelling. The root has no parent.
///
/// Grounded on the `parent`/discovery-edge bookkeeping in
/// `reasoners::eq_alt::graph::node_store::NodeStore`'s union-find forest,
/// but flattened to a plain `Vec` since a standardised labelling is
/// recomputed wholesale rather than incrementally maintained (the open
/// question in DESIGN.md: always rebuild, never patch).
#[derive(Debug, Clone, Default)]
pub struct SpanningForest {
    parent: Vec<Option<(NodeId, Generator)>>,
}

impl SpanningForest {
    pub fn parent_of(&self, v: NodeId) -> Option<(NodeId, Generator)> {
        self.parent.get(v.to_u32() as usize).copied().flatten()
    }

    /// The word (read root-to-`v`) that reaches `v` by walking the forest
    /// back to the root and reversing the collected letters.
    pub fn normal_form(&self, v: NodeId) -> Vec<Generator> {
        let mut letters = Vec::new();
        let mut cur = v;
        while let Some((parent, g)) = self.parent_of(cur) {
            letters.push(g);
            cur = parent;
        }
        letters.reverse();
        letters
    }
}

/// Re-labels the active nodes of a [`CosetTable`] into a canonical order and
/// records the spanning forest discovered along the way (C9).
pub struct Standardiser;

impl Standardiser {
    /// Applies `order`, returning the freshly-built forest and whether the
    /// relabelling actually changed any id. A second call with the same
    /// `order` right after always returns `changed = false` (C9's
    /// idempotency law): the walk visits nodes in the same sequence and so
    /// assigns them the same ids they already have. `order = None` never
    /// touches the table and reports no change.
    pub fn standardize(table: &mut CosetTable, order: StandardisationOrder) -> (bool, SpanningForest) {
        let StandardisationOrder::ShortLex | StandardisationOrder::Lex = order else {
            return (false, SpanningForest::default());
        };
        let (old_of_new, new_of_old, forest) = Self::walk(table, order);

        let changed = old_of_new
            .iter()
            .enumerate()
            .any(|(new_idx, &old)| old.to_u32() as usize != new_idx);
        if changed {
            Self::relabel(table, &old_of_new, &new_of_old);
        }

        (changed, SpanningForest { parent: forest })
    }

    /// Computes the spanning forest for `order` (defaulting to `ShortLex`
    /// when the caller passes `None`) without relabelling any node. Used by
    /// [`crate::controller::Congruence::class_to_normal_form`] so that
    /// normal forms are available even when the caller never asked for a
    /// permanent relabelling of the active set.
    pub fn spanning_forest(table: &CosetTable, order: StandardisationOrder) -> SpanningForest {
        let order = match order {
            StandardisationOrder::None => StandardisationOrder::ShortLex,
            concrete => concrete,
        };
        let (_, _, forest) = Self::walk(table, order);
        SpanningForest { parent: forest }
    }

    /// BFS (shortlex) or DFS (lex) from the root over defined edges,
    /// producing the old->new and new->old id maps plus the discovery
    /// forest. Reachability of every active node is guaranteed by
    /// invariant 1 of §3, so the walk always visits `active_count` nodes.
    fn walk(table: &CosetTable, order: StandardisationOrder) -> (Vec<NodeId>, Vec<Option<NodeId>>, Vec<Option<(NodeId, Generator)>>) {
        let alphabet = table.graph.alphabet_size() as u32;
        let capacity = table.nodes.capacity();
        let active_count = table.active_count();

        let mut new_of_old: Vec<Option<NodeId>> = vec![None; capacity];
        let mut old_of_new: Vec<NodeId> = Vec::with_capacity(active_count);
        let mut forest = vec![None; active_count];

        new_of_old[ROOT.to_u32() as usize] = Some(ROOT);
        old_of_new.push(ROOT);

        match order {
            StandardisationOrder::ShortLex => {
                let mut queue = VecDeque::new();
                queue.push_back(ROOT);
                while let Some(old_u) = queue.pop_front() {
                    for g in 0..alphabet {
                        Self::visit(table, old_u, g, &mut new_of_old, &mut old_of_new, &mut forest, &mut queue);
                    }
                }
            }
            StandardisationOrder::Lex => {
                let mut stack = vec![ROOT];
                while let Some(old_u) = stack.pop() {
                    // Pushing in descending generator order makes the
                    // smallest generator pop (and so get explored) first,
                    // giving a depth-first, lexicographically-least walk.
                    for g in (0..alphabet).rev() {
                        Self::visit(table, old_u, g, &mut new_of_old, &mut old_of_new, &mut forest, &mut stack);
                    }
                }
            }
            StandardisationOrder::None => unreachable!("callers resolve None before reaching walk"),
        }

        debug_assert_eq!(old_of_new.len(), active_count, "every active node must be reachable from root (invariant 1)");
        (old_of_new, new_of_old, forest)
    }

    /// Checks the edge `(old_u, g)`; if it leads to an undiscovered active
    /// node, assigns it the next standardised id, records its discovery
    /// edge in `forest`, and queues it for further exploration.
    #[allow(clippy::too_many_arguments)]
    fn visit(
        table: &CosetTable,
        old_u: NodeId,
        g: Generator,
        new_of_old: &mut [Option<NodeId>],
        old_of_new: &mut Vec<NodeId>,
        forest: &mut [Option<(NodeId, Generator)>],
        frontier: &mut impl Extend<NodeId>,
    ) {
        let Some(old_v) = table.graph.target(old_u, g) else {
            return;
        };
        let idx = old_v.to_u32() as usize;
        if new_of_old[idx].is_some() {
            return;
        }
        let new_v = NodeId::from_u32(old_of_new.len() as u32);
        new_of_old[idx] = Some(new_v);
        old_of_new.push(old_v);
        let new_u = new_of_old[old_u.to_u32() as usize].expect("parent was already assigned when it was dequeued");
        forest[new_v.to_u32() as usize] = Some((new_u, g));
        frontier.extend(std::iter::once(old_v));
    }

    /// Rebuilds the table's node store and word graph so that every active
    /// node `old_of_new[i]` becomes node `i`. Predecessor edges fall out of
    /// the rebuild for free since [`WordGraph::set_target`] maintains them.
    fn relabel(table: &mut CosetTable, old_of_new: &[NodeId], new_of_old: &[Option<NodeId>]) {
        let alphabet = table.graph.alphabet_size();
        let n = old_of_new.len();

        let mut new_graph = WordGraph::new(alphabet);
        for i in 0..n as u32 {
            new_graph.ensure_node(NodeId::from_u32(i));
        }
        for (new_u_idx, &old_u) in old_of_new.iter().enumerate() {
            let new_u = NodeId::from_u32(new_u_idx as u32);
            for g in 0..alphabet as u32 {
                if let Some(old_v) = table.graph.target(old_u, g) {
                    let new_v = new_of_old[old_v.to_u32() as usize]
                        .expect("every active target must have been visited (invariant 1)");
                    new_graph.set_target(new_u, g, new_v);
                }
            }
        }

        let mut new_nodes = NodeManager::new();
        for _ in 1..n {
            // `n` is the active count of the table being relabelled, which
            // already fit under the u32 id space before this rebuild started.
            let id = new_nodes.allocate().expect("relabelling never allocates more ids than the table already had");
            new_nodes.activate(id);
        }

        table.graph = new_graph;
        table.nodes = new_nodes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::DefinitionPolicy;
    use crate::hlt::HltEngine;
    use crate::presentation::{Presentation, Word};

    fn order5_table() -> CosetTable {
        let mut p = Presentation::new(1);
        p.add_rule(vec![0, 0, 0, 0, 0], vec![]).unwrap();
        let mut table = CosetTable::new(1, DefinitionPolicy::Unlimited, 0);
        let empty: Word = vec![];
        HltEngine::trace_relation_at(&mut table, ROOT, &vec![0, 0, 0, 0, 0], &empty, false, usize::MAX);
        table
    }

    #[test]
    fn shortlex_standardisation_roots_at_zero() {
        let mut table = order5_table();
        let (changed, forest) = Standardiser::standardize(&mut table, StandardisationOrder::ShortLex);
        assert!(table.nodes.is_active(ROOT));
        assert!(forest.parent_of(ROOT).is_none());
        let _ = changed;
    }

    #[test]
    fn standardisation_is_idempotent() {
        let mut table = order5_table();
        Standardiser::standardize(&mut table, StandardisationOrder::ShortLex);
        // Once the table is in shortlex order, re-running in the same
        // order must always report no change.
        let (second, _) = Standardiser::standardize(&mut table, StandardisationOrder::ShortLex);
        assert!(!second);
        let (third, _) = Standardiser::standardize(&mut table, StandardisationOrder::ShortLex);
        assert!(!third);
    }

    #[test]
    fn spanning_forest_recovers_normal_forms() {
        let mut table = order5_table();
        let (_, forest) = Standardiser::standardize(&mut table, StandardisationOrder::ShortLex);
        for v in table.nodes.active_iter() {
            let word = forest.normal_form(v);
            let mut cur = ROOT;
            for g in &word {
                cur = table.graph.target(cur, *g).expect("normal form word must be fully defined");
            }
            assert_eq!(cur, v);
        }
    }

    #[test]
    fn spanning_forest_is_available_without_relabelling() {
        let table = order5_table();
        let forest = Standardiser::spanning_forest(&table, StandardisationOrder::None);
        for v in table.nodes.active_iter() {
            let word = forest.normal_form(v);
            let mut cur = ROOT;
            for g in &word {
                cur = table.graph.target(cur, *g).expect("normal form word must be fully defined");
            }
            assert_eq!(cur, v);
        }
    }

    #[test]
    fn none_order_is_always_a_no_op() {
        let mut table = order5_table();
        let (changed, forest) = Standardiser::standardize(&mut table, StandardisationOrder::None);
        assert!(!changed);
        assert!(forest.parent_of(ROOT).is_none());
    }
}
