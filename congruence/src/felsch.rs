use crate::presentation::{Presentation, Word};
use crate::table::CosetTable;
use crate::trace::trace_defined_prefix;

/// Closes every relation affected by newly-defined edges.
///
/// Relations are considered in both orientations so that a definition whose
/// label matches the first letter of either side of a rule triggers a
/// check, mirroring the symmetry of `u = v`.
pub struct FelschEngine {
    both_orientations: Vec<(Word, Word)>,
}

impl FelschEngine {
    pub fn new(presentation: &Presentation) -> Self {
        Self::from_relations(presentation.relations())
    }

    /// Builds the engine directly from a relation set rather than a
    /// [`Presentation`], used by [`crate::controller::Controller`] so that a
    /// two-sided congruence's generating pairs (folded into the effective
    /// relation set before the run starts) are also closed by Felsch.
    pub fn from_relations(relations: &[(Word, Word)]) -> Self {
        let mut both_orientations = Vec::with_capacity(relations.len() * 2);
        for (s, t) in relations {
            both_orientations.push((s.clone(), t.clone()));
            if s != t {
                both_orientations.push((t.clone(), s.clone()));
            }
        }
        FelschEngine { both_orientations }
    }

    /// Drains `table.defs` until both the definition buffer and the
    /// coincidence queue are empty, as required by C5's terminal condition.
    pub fn run(&self, table: &mut CosetTable, large_collapse: usize) -> usize {
        self.run_bounded(table, large_collapse, None, &mut || false).1
    }

    /// Cooperative, budgeted variant of [`FelschEngine::run`]. Checks `stop`
    /// before every definition processed (the suspension point the
    /// Strategy's `run_until`/`run_for` rely on) and returns as soon as
    /// `budget` definitions have been processed, if given. The returned
    /// `bool` is `true` iff the buffer and coincidence queue were left
    /// empty - i.e. this call reached the same terminal condition as
    /// `run`, rather than being cut short by the budget or by `stop`.
    pub fn run_bounded(
        &self,
        table: &mut CosetTable,
        large_collapse: usize,
        budget: Option<usize>,
        stop: &mut impl FnMut() -> bool,
    ) -> (bool, usize) {
        let mut steps = 0;
        loop {
            if stop() {
                return (false, steps);
            }
            match table.defs.pop() {
                Some(d) => {
                    steps += 1;
                    self.process_one(table, d.source, d.label, large_collapse);
                    if budget.is_some_and(|b| steps >= b) {
                        return (table.defs.is_empty() && table.coincidences.is_empty(), steps);
                    }
                }
                None => {
                    if table.coincidences.is_empty() {
                        return (true, steps);
                    }
                    table.process_coincidences(true, large_collapse);
                }
            }
        }
    }

    /// Closes every relation whose first letter is `g`, as triggered by the
    /// edge `target(u, g)` having just been defined. Each side of the
    /// relation is traced from `u`; if one side completes and the other
    /// stalls exactly one letter short, the missing edge is defined
    /// (closing the relation) rather than waiting for it to appear on its
    /// own - the "missing last letter" completion technique.
    fn process_one(
        &self,
        table: &mut CosetTable,
        u: crate::ids::NodeId,
        g: crate::presentation::Generator,
        large_collapse: usize,
    ) {
        for (s, t) in &self.both_orientations {
            if s.first() != Some(&g) {
                continue;
            }
            let (end_s, consumed_s) = trace_defined_prefix(&table.graph, u, s);
            let (end_t, consumed_t) = trace_defined_prefix(&table.graph, u, t);
            let s_done = consumed_s == s.len();
            let t_done = consumed_t == t.len();

            if s_done && t_done {
                table.merge(end_s, end_t);
                table.process_coincidences(true, large_collapse);
            } else if s_done && consumed_t + 1 == t.len() {
                self.close_missing_edge(table, end_t, t[t.len() - 1], end_s, large_collapse);
            } else if t_done && consumed_s + 1 == s.len() {
                self.close_missing_edge(table, end_s, s[s.len() - 1], end_t, large_collapse);
            }
        }
    }

    fn close_missing_edge(
        &self,
        table: &mut CosetTable,
        source: crate::ids::NodeId,
        label: crate::presentation::Generator,
        expected_target: crate::ids::NodeId,
        large_collapse: usize,
    ) {
        match table.graph.target(source, label) {
            None => table.define_existing(source, label, expected_target, true),
            Some(existing) if existing != expected_target => {
                table.merge(existing, expected_target);
                table.process_coincidences(true, large_collapse);
            }
            Some(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::DefinitionPolicy;
    use crate::ids::ROOT;

    #[test]
    fn order_two_generator_closes_its_own_inverse_edge() {
        // a a = <empty word> : a has order 2, so the graph closes into a
        // two-element cycle rather than collapsing further.
        let mut p = Presentation::new(1);
        p.add_rule(vec![0, 0], vec![]).unwrap();
        let engine = FelschEngine::new(&p);
        let mut table = CosetTable::new(1, DefinitionPolicy::Unlimited, 0);
        let a = table.target_or_create(ROOT, 0, true).unwrap();
        engine.run(&mut table, usize::MAX);
        assert_eq!(table.graph.target(ROOT, 0), Some(a));
        assert_eq!(table.graph.target(a, 0), Some(ROOT));
        assert_eq!(table.active_count(), 2);
    }
}
