use crate::error::Result;
use crate::ids::{NodeId, ROOT};
use crate::presentation::Word;
use crate::settings::Settings;
use crate::table::CosetTable;

/// Advances the run cursor through active nodes, tracing relations and
/// creating nodes as needed (Haselgrove-Leech-Trotter style definitions).
pub struct HltEngine;

/// Why a call to [`HltEngine::sweep`] returned control to its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// The active set was exhausted: every active node (as of when it was
    /// last visited) has had every relation traced from it.
    Exhausted,
    /// `active_count` crossed `lookahead_next`, or the definition buffer
    /// skipped an entry; C6 interrupts HLT for a lookahead on this signal.
    GrowthSignal,
    /// The caller's node-creation budget was reached.
    BudgetReached,
    /// `stop` requested cancellation.
    Cancelled,
}

impl HltEngine {
    /// Traces both sides of `(s, t)` from `v`, creating nodes along the way,
    /// and registers a coincidence between the two words' endpoints.
    pub fn trace_relation_at(
        table: &mut CosetTable,
        v: NodeId,
        s: &Word,
        t: &Word,
        register_definitions: bool,
        large_collapse: usize,
    ) -> Result<()> {
        let end_s = Self::complete(table, v, s, register_definitions)?;
        let end_t = Self::complete(table, v, t, register_definitions)?;
        if end_s != end_t {
            table.merge(end_s, end_t);
            table.process_coincidences(register_definitions, large_collapse);
        }
        Ok(())
    }

    fn complete(table: &mut CosetTable, start: NodeId, word: &Word, register_definitions: bool) -> Result<NodeId> {
        let mut cur = start;
        for &g in word {
            cur = table.graph.find(cur);
            cur = table.target_or_create(cur, g, register_definitions)?;
        }
        Ok(table.graph.find(cur))
    }

    /// Processes every relation from `v`, re-resolving `v` to its current
    /// representative before each one since an earlier relation in the same
    /// batch may have collapsed `v` into another node.
    pub fn process_node(
        table: &mut CosetTable,
        relations: &[(Word, Word)],
        v: NodeId,
        register_definitions: bool,
        large_collapse: usize,
    ) -> Result<()> {
        for (s, t) in relations {
            let v = table.graph.find(v);
            Self::trace_relation_at(table, v, s, t, register_definitions, large_collapse)?;
        }
        Ok(())
    }

    /// Advances `cursor` through the active set, processing every relation
    /// at each node it visits (lazily re-seating the cursor to the next
    /// active node whenever it finds the one it was handed has since been
    /// deactivated - the "lazy re-seating" choice recorded in DESIGN.md).
    ///
    /// Returns as soon as one of four things happens, leaving the cursor at
    /// the point it should resume from: the active set is exhausted; a
    /// growth signal fires (C6); `budget` new nodes have been created since
    /// entry; or `stop` requests cancellation. The Strategy interprets
    /// [`SweepOutcome::GrowthSignal`] by running a lookahead and calling
    /// `sweep` again from the returned cursor.
    #[allow(clippy::too_many_arguments)]
    pub fn sweep(
        table: &mut CosetTable,
        relations: &[(Word, Word)],
        mut cursor: NodeId,
        register_definitions: bool,
        settings: &Settings,
        budget: Option<usize>,
        stop: &mut impl FnMut() -> bool,
    ) -> Result<(SweepOutcome, NodeId)> {
        let before = table.active_count();
        loop {
            if stop() {
                return Ok((SweepOutcome::Cancelled, cursor));
            }
            let seat = if table.nodes.is_active(cursor) {
                Some(cursor)
            } else {
                table.nodes.next_active(cursor)
            };
            let Some(v) = seat else {
                return Ok((SweepOutcome::Exhausted, ROOT));
            };
            Self::process_node(table, relations, v, register_definitions, settings.large_collapse)?;
            cursor = table.nodes.next_active(v).unwrap_or(ROOT);

            if table.active_count() > settings.lookahead_next || table.defs.any_skipped() {
                return Ok((SweepOutcome::GrowthSignal, cursor));
            }
            if budget.is_some_and(|b| table.active_count().saturating_sub(before) >= b) {
                return Ok((SweepOutcome::BudgetReached, cursor));
            }
        }
    }

    /// Seeds the table with the generating pairs (and, for a two-sided
    /// congruence, the presentation's own relations) traced from the root,
    /// per the Strategy's initial-run policy (C8).
    pub fn seed(
        table: &mut CosetTable,
        generating_pairs: &[(Word, Word)],
        extra_relations: &[(Word, Word)],
        register_definitions: bool,
        large_collapse: usize,
    ) -> Result<()> {
        for (s, t) in generating_pairs {
            let root = table.graph.find(crate::ids::ROOT);
            Self::trace_relation_at(table, root, s, t, register_definitions, large_collapse)?;
        }
        for (s, t) in extra_relations {
            let root = table.graph.find(crate::ids::ROOT);
            Self::trace_relation_at(table, root, s, t, register_definitions, large_collapse)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::DefinitionPolicy;
    use crate::ids::ROOT;
    use crate::presentation::Presentation;

    #[test]
    fn tracing_a_relation_creates_nodes_and_closes_it() {
        // a a a = <empty>: order-3 cyclic group.
        let mut table = CosetTable::new(1, DefinitionPolicy::Unlimited, 0);
        let s = vec![0, 0, 0];
        let t: Word = vec![];
        HltEngine::trace_relation_at(&mut table, ROOT, &s, &t, false, usize::MAX).unwrap();
        assert_eq!(table.active_count(), 3);
        let a = table.graph.target(ROOT, 0).unwrap();
        let aa = table.graph.target(a, 0).unwrap();
        assert_eq!(table.graph.target(aa, 0), Some(ROOT));
    }

    #[test]
    fn generating_pair_seeded_at_root_identifies_words() {
        let mut table = CosetTable::new(2, DefinitionPolicy::Unlimited, 0);
        let pairs = vec![(vec![0], vec![1])];
        HltEngine::seed(&mut table, &pairs, &[], false, usize::MAX).unwrap();
        let a = table.graph.find(table.graph.target(ROOT, 0).unwrap_or(ROOT));
        let b = table.graph.find(table.graph.target(ROOT, 1).unwrap_or(ROOT));
        assert_eq!(a, b);
    }

    #[test]
    fn sweep_exhausts_a_finite_cyclic_group() {
        // a^3 = <empty>.
        let mut p = Presentation::new(1);
        p.add_rule(vec![0, 0, 0], vec![]).unwrap();
        let mut table = CosetTable::new(1, DefinitionPolicy::Unlimited, 0);
        let settings = Settings::default();
        let mut cursor = ROOT;
        loop {
            let (outcome, next) =
                HltEngine::sweep(&mut table, p.relations(), cursor, false, &settings, None, &mut || false).unwrap();
            cursor = next;
            if outcome == SweepOutcome::Exhausted {
                break;
            }
            assert_ne!(outcome, SweepOutcome::Cancelled);
        }
        assert_eq!(table.active_count(), 3);
    }

    #[test]
    fn sweep_reports_cancellation_immediately() {
        let mut table = CosetTable::new(1, DefinitionPolicy::Unlimited, 0);
        let relations: Vec<(Word, Word)> = vec![];
        let settings = Settings::default();
        let (outcome, _) = HltEngine::sweep(&mut table, &relations, ROOT, false, &settings, None, &mut || true).unwrap();
        assert_eq!(outcome, SweepOutcome::Cancelled);
    }
}
