use std::time::{Duration, Instant};

use crate::definitions::Definition;
use crate::felsch::FelschEngine;
use crate::ids::{NodeId, ROOT};
use crate::presentation::Word;
use crate::settings::{LookaheadExtent, LookaheadStyle, Settings};
use crate::table::CosetTable;
use crate::trace::trace_defined_prefix;

/// Sweeps existing nodes applying relations (HLT-style) or the whole
/// definition buffer (Felsch-style) without creating new nodes, to collapse
/// the graph before it grows further.
pub struct Lookahead;

/// Outcome of a single lookahead pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct LookaheadReport {
    pub nodes_killed: usize,
    pub stopped_early: bool,
}

impl Lookahead {
    pub fn run(
        table: &mut CosetTable,
        relations: &[(Word, Word)],
        felsch: &FelschEngine,
        cursor: NodeId,
        settings: &Settings,
    ) -> (LookaheadReport, NodeId) {
        match settings.lookahead_style {
            LookaheadStyle::Hlt => Self::run_hlt_style(table, relations, cursor, settings),
            LookaheadStyle::Felsch => (Self::run_felsch_style(table, felsch, settings), cursor),
        }
    }

    /// Applies every relation at every active node (starting from `cursor`
    /// for a partial pass, from the root for a full one) without creating
    /// new nodes: an undefined prefix simply means there is nothing to
    /// check yet at this node.
    fn run_hlt_style(
        table: &mut CosetTable,
        relations: &[(Word, Word)],
        cursor: NodeId,
        settings: &Settings,
    ) -> (LookaheadReport, NodeId) {
        let start = match settings.lookahead_extent {
            LookaheadExtent::Full => ROOT,
            LookaheadExtent::Partial => cursor,
        };
        let before = table.active_count();
        let mut killed_since_sample = 0usize;
        let mut last_sample = Instant::now();
        let mut stopped_early = false;
        let mut v = start;

        loop {
            if table.nodes.is_active(v) {
                for (s, t) in relations {
                    let v = table.graph.find(v);
                    let (end_s, consumed_s) = trace_defined_prefix(&table.graph, v, s);
                    let (end_t, consumed_t) = trace_defined_prefix(&table.graph, v, t);
                    if consumed_s == s.len() && consumed_t == t.len() && end_s != end_t {
                        let killed_before = table.active_count();
                        table.merge(end_s, end_t);
                        table.process_coincidences(false, settings.large_collapse);
                        killed_since_sample += killed_before.saturating_sub(table.active_count());
                    }
                }
            }

            if last_sample.elapsed() >= settings.lookahead_stop_early_interval {
                let active = table.active_count().max(1);
                if (killed_since_sample as f64) < settings.lookahead_stop_early_ratio * active as f64 {
                    stopped_early = true;
                    break;
                }
                killed_since_sample = 0;
                last_sample = Instant::now();
            }

            match table.nodes.next_active(v) {
                Some(next) => v = next,
                None => break,
            }
        }

        let killed = before.saturating_sub(table.active_count());
        (
            LookaheadReport {
                nodes_killed: killed,
                stopped_early,
            },
            table.graph.find(v),
        )
    }

    /// Fills the definition buffer with every `(node, generator)` pair over
    /// the active set, then lets Felsch close everything it can.
    fn run_felsch_style(table: &mut CosetTable, felsch: &FelschEngine, settings: &Settings) -> LookaheadReport {
        let before = table.active_count();
        let alphabet = table.graph.alphabet_size() as u32;
        let active: Vec<NodeId> = table.nodes.active_iter().collect();
        for node in active {
            if !table.nodes.is_active(node) {
                continue;
            }
            for g in 0..alphabet {
                if table.graph.target(node, g).is_some() {
                    let is_active = |n: NodeId| table.nodes.is_active(n);
                    table.defs.emplace(Definition { source: node, label: g }, is_active);
                }
            }
        }
        felsch.run(table, settings.large_collapse);
        LookaheadReport {
            nodes_killed: before.saturating_sub(table.active_count()),
            stopped_early: false,
        }
    }
}

/// Adaptive update of `lookahead_next`, applied after a lookahead completes.
pub fn update_lookahead_next(settings: &mut Settings, active: usize, killed: usize) {
    let scaled = (settings.lookahead_growth_factor * active as f64) as usize;
    if scaled < settings.lookahead_next || active > settings.lookahead_next {
        settings.lookahead_next = scaled.max(settings.lookahead_min);
    } else if settings.lookahead_growth_threshold > 0
        && killed * settings.lookahead_growth_threshold < killed + active
    {
        settings.lookahead_next =
            ((settings.lookahead_next as f64) * settings.lookahead_growth_factor) as usize;
    }
}

pub fn sample_interval_default() -> Duration {
    Duration::from_millis(200)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::DefinitionPolicy;
    use crate::presentation::Presentation;

    #[test]
    fn hlt_style_lookahead_collapses_without_creating_nodes() {
        let mut p = Presentation::new(1);
        p.add_rule(vec![0, 0], vec![]).unwrap();
        let felsch = FelschEngine::new(&p);
        let mut table = CosetTable::new(1, DefinitionPolicy::Unlimited, 0);
        let a = table.target_or_create(ROOT, 0, false).unwrap();
        table.target_or_create(a, 0, false).unwrap();
        let before = table.active_count();
        let settings = Settings::default();
        let (report, _cursor) = Lookahead::run(&mut table, p.relations(), &felsch, ROOT, &settings);
        assert!(table.active_count() <= before);
        assert!(!report.stopped_early || report.nodes_killed == 0);
    }

    #[test]
    fn lookahead_next_grows_when_still_collapsing() {
        let mut settings = Settings::default();
        settings.lookahead_next = 10;
        settings.lookahead_growth_threshold = 4;
        update_lookahead_next(&mut settings, 100, 0);
        assert!(settings.lookahead_next >= settings.lookahead_min);
    }
}
