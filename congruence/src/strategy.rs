use crate::error::Result;
use crate::felsch::FelschEngine;
use crate::hlt::{HltEngine, SweepOutcome};
use crate::ids::ROOT;
use crate::lookahead::{update_lookahead_next, Lookahead, LookaheadReport};
use crate::presentation::Word;
use crate::report::Reporter;
use crate::settings::{LookaheadExtent, Settings, StrategyKind};
use crate::table::CosetTable;

/// Orchestrates [`FelschEngine`] and [`HltEngine`], deciding when to
/// interrupt either for a [`Lookahead`] pass, and scripting the composite
/// strategies of C8. Owns the two cursors (`run_cursor`, `lookahead_cursor`)
/// across calls so that a cancelled run resumes exactly where it left off.
pub struct Strategy {
    run_cursor: crate::ids::NodeId,
    lookahead_cursor: crate::ids::NodeId,
    felsch: FelschEngine,
}

/// Outcome of one call to [`Strategy::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The presentation is closed: every relation holds at every active
    /// node, and a final verifying lookahead killed nothing.
    Finished,
    /// `stop` requested cancellation before the presentation closed.
    Cancelled,
}

impl Strategy {
    pub fn new(felsch: FelschEngine) -> Self {
        Strategy {
            run_cursor: ROOT,
            lookahead_cursor: ROOT,
            felsch,
        }
    }

    /// Runs the strategy scripted by `settings.strategy` until the
    /// presentation closes or `stop` interrupts it.
    ///
    /// Every script ends the same way regardless of which composite chose
    /// to get there: a full HLT-style lookahead that kills zero nodes while
    /// the definition buffer and coincidence queue are both empty is the
    /// only certificate this implementation accepts for "finished" (the
    /// open question on verifying-lookahead-on-skip is resolved in
    /// DESIGN.md as "always verify"). If that lookahead finds more to do,
    /// the inner script runs again.
    pub fn run(
        &mut self,
        table: &mut CosetTable,
        relations: &[(Word, Word)],
        settings: &mut Settings,
        reporter: &mut Reporter,
        stop: &mut impl FnMut() -> bool,
    ) -> Result<RunOutcome> {
        loop {
            if stop() {
                return Ok(RunOutcome::Cancelled);
            }
            let Progress { made_progress, cancelled } = self.run_script(table, relations, settings, reporter, stop)?;
            if cancelled {
                return Ok(RunOutcome::Cancelled);
            }
            let report = self.lookahead_pass(table, relations, settings, reporter, true);
            reporter.record_lookahead();
            update_lookahead_next(settings, table.active_count(), report.nodes_killed);
            table.defs.reset_skipped();

            if report.nodes_killed == 0 && !made_progress && table.defs.is_empty() && table.coincidences.is_empty() {
                if let Some(lower_bound) = settings.lower_bound {
                    if table.active_count() < lower_bound {
                        tracing::warn!(
                            target: "congruence::strategy",
                            active = table.active_count(),
                            lower_bound,
                            "final lookahead closed the presentation below the configured lower bound"
                        );
                    }
                }
                tracing::info!(target: "congruence::strategy", active = table.active_count(), "enumeration finished");
                return Ok(RunOutcome::Finished);
            }
        }
    }

    fn run_script(
        &mut self,
        table: &mut CosetTable,
        relations: &[(Word, Word)],
        settings: &mut Settings,
        reporter: &mut Reporter,
        stop: &mut impl FnMut() -> bool,
    ) -> Result<Progress> {
        match settings.strategy {
            StrategyKind::Hlt => self.hlt_to_completion(table, relations, settings, reporter, stop),
            StrategyKind::Felsch => Ok(self.felsch_to_completion(table, settings, reporter, stop)),
            StrategyKind::Cr => self.cr(table, relations, settings, reporter, stop),
            StrategyKind::CrThenFull => self.lower_cr(table, relations, settings, reporter, stop),
            StrategyKind::Rc => self.rc(table, relations, settings, reporter, stop),
            StrategyKind::ROverC => self.r_over_c(table, relations, settings, reporter, stop),
        }
    }

    /// hlt: loop HLT, handling growth-signal interrupts with a lookahead,
    /// until the active set is exhausted or `stop` fires.
    fn hlt_to_completion(
        &mut self,
        table: &mut CosetTable,
        relations: &[(Word, Word)],
        settings: &mut Settings,
        reporter: &mut Reporter,
        stop: &mut impl FnMut() -> bool,
    ) -> Result<Progress> {
        let mut made_progress = false;
        loop {
            match self.hlt_sweep(table, relations, settings, reporter, stop, None)? {
                SweepResult::Exhausted { progressed } => return Ok(Progress::new(made_progress || progressed, false)),
                SweepResult::Cancelled => return Ok(Progress::new(made_progress, true)),
                SweepResult::BudgetReached { progressed } => made_progress |= progressed, // unreachable with budget None
            }
        }
    }

    /// felsch: drain Felsch to its terminal condition, handling growth
    /// signals the same way HLT does (a Felsch-only run can still trip
    /// `lookahead_next` through newly-defined edges alone).
    fn felsch_to_completion(
        &mut self,
        table: &mut CosetTable,
        settings: &mut Settings,
        reporter: &mut Reporter,
        stop: &mut impl FnMut() -> bool,
    ) -> Progress {
        let (finished, progressed) = self.felsch_sweep(table, settings, reporter, stop, None);
        let _ = finished;
        Progress::new(progressed, stop())
    }

    /// CR (capital-capital): alternate Felsch and HLT in bounded bursts
    /// until a full alternation makes no progress.
    fn cr(
        &mut self,
        table: &mut CosetTable,
        relations: &[(Word, Word)],
        settings: &mut Settings,
        reporter: &mut Reporter,
        stop: &mut impl FnMut() -> bool,
    ) -> Result<Progress> {
        let mut any = false;
        loop {
            if stop() {
                return Ok(Progress::new(any, true));
            }
            let (_, fp) = self.felsch_sweep(table, settings, reporter, stop, Some(settings.f_defs));
            if stop() {
                return Ok(Progress::new(any || fp, true));
            }
            let hlt_budget = (settings.hlt_defs / relations.len().max(1)).max(1);
            let hp = match self.hlt_sweep(table, relations, settings, reporter, stop, Some(hlt_budget))? {
                SweepResult::Cancelled => return Ok(Progress::new(any || fp, true)),
                SweepResult::Exhausted { progressed } | SweepResult::BudgetReached { progressed } => progressed,
            };
            any = any || fp || hp;
            if !fp && !hp {
                return Ok(Progress::new(any, false));
            }
        }
    }

    /// Cr (lower-case r): one Felsch burst, one HLT burst, then Felsch to
    /// completion.
    fn lower_cr(
        &mut self,
        table: &mut CosetTable,
        relations: &[(Word, Word)],
        settings: &mut Settings,
        reporter: &mut Reporter,
        stop: &mut impl FnMut() -> bool,
    ) -> Result<Progress> {
        let (_, a) = self.felsch_sweep(table, settings, reporter, stop, Some(settings.f_defs));
        if stop() {
            return Ok(Progress::new(a, true));
        }
        let hlt_budget = (settings.hlt_defs / relations.len().max(1)).max(1);
        let b = match self.hlt_sweep(table, relations, settings, reporter, stop, Some(hlt_budget))? {
            SweepResult::Cancelled => return Ok(Progress::new(a, true)),
            SweepResult::Exhausted { progressed } | SweepResult::BudgetReached { progressed } => progressed,
        };
        if stop() {
            return Ok(Progress::new(a || b, true));
        }
        let (_, c) = self.felsch_sweep(table, settings, reporter, stop, None);
        Ok(Progress::new(a || b || c, stop()))
    }

    /// Rc: one HLT burst, one Felsch burst, then HLT to completion.
    fn rc(
        &mut self,
        table: &mut CosetTable,
        relations: &[(Word, Word)],
        settings: &mut Settings,
        reporter: &mut Reporter,
        stop: &mut impl FnMut() -> bool,
    ) -> Result<Progress> {
        let hlt_budget = (settings.hlt_defs / (relations.len() + 1)).max(1);
        let a = match self.hlt_sweep(table, relations, settings, reporter, stop, Some(hlt_budget))? {
            SweepResult::Cancelled => return Ok(Progress::new(false, true)),
            SweepResult::Exhausted { progressed } | SweepResult::BudgetReached { progressed } => progressed,
        };
        if stop() {
            return Ok(Progress::new(a, true));
        }
        let (_, b) = self.felsch_sweep(table, settings, reporter, stop, Some(settings.f_defs));
        if stop() {
            return Ok(Progress::new(a || b, true));
        }
        let c = match self.hlt_sweep(table, relations, settings, reporter, stop, None)? {
            SweepResult::Cancelled => return Ok(Progress::new(a || b, true)),
            SweepResult::Exhausted { progressed } | SweepResult::BudgetReached { progressed } => progressed,
        };
        Ok(Progress::new(a || b || c, false))
    }

    /// R_over_C: HLT until `active_count >= lookahead_next`, a full
    /// early-stopping HLT lookahead, then CR for the remainder.
    fn r_over_c(
        &mut self,
        table: &mut CosetTable,
        relations: &[(Word, Word)],
        settings: &mut Settings,
        reporter: &mut Reporter,
        stop: &mut impl FnMut() -> bool,
    ) -> Result<Progress> {
        let mut any = false;
        loop {
            if stop() {
                return Ok(Progress::new(any, true));
            }
            if table.active_count() >= settings.lookahead_next {
                break;
            }
            match self.hlt_sweep(table, relations, settings, reporter, stop, Some(1))? {
                SweepResult::Cancelled => return Ok(Progress::new(any, true)),
                SweepResult::Exhausted { progressed } => {
                    any |= progressed;
                    break;
                }
                SweepResult::BudgetReached { progressed } => any |= progressed,
            }
        }
        if stop() {
            return Ok(Progress::new(any, true));
        }
        let report = self.lookahead_pass(table, relations, settings, reporter, true);
        any = any || report.nodes_killed > 0;
        let rest = self.cr(table, relations, settings, reporter, stop)?;
        Ok(Progress::new(any || rest.made_progress, rest.cancelled))
    }

    fn hlt_sweep(
        &mut self,
        table: &mut CosetTable,
        relations: &[(Word, Word)],
        settings: &mut Settings,
        reporter: &mut Reporter,
        stop: &mut impl FnMut() -> bool,
        budget: Option<usize>,
    ) -> Result<SweepResult> {
        let mut progressed = false;
        loop {
            let register = settings.registers_definitions();
            let (outcome, next_cursor) =
                HltEngine::sweep(table, relations, self.run_cursor, register, settings, budget, stop)?;
            self.run_cursor = next_cursor;
            reporter.record_hlt_step();
            sync_reporter(reporter, table);
            reporter.maybe_tick("hlt");

            if outcome != SweepOutcome::Cancelled {
                progressed = true;
                if settings.save {
                    // C6's "hybrid HLT+Felsch" mode: definitions registered
                    // while tracing relations are drained immediately.
                    self.felsch.run(table, settings.large_collapse);
                }
            }

            match outcome {
                SweepOutcome::Exhausted => return Ok(SweepResult::Exhausted { progressed }),
                SweepOutcome::BudgetReached => return Ok(SweepResult::BudgetReached { progressed }),
                SweepOutcome::Cancelled => return Ok(SweepResult::Cancelled),
                SweepOutcome::GrowthSignal => {
                    let report = self.lookahead_pass(table, relations, settings, reporter, false);
                    update_lookahead_next(settings, table.active_count(), report.nodes_killed);
                    table.defs.reset_skipped();
                    if stop() {
                        return Ok(SweepResult::Cancelled);
                    }
                    // fall through and resume the sweep from run_cursor
                }
            }
        }
    }

    fn felsch_sweep(
        &mut self,
        table: &mut CosetTable,
        settings: &mut Settings,
        reporter: &mut Reporter,
        stop: &mut impl FnMut() -> bool,
        budget: Option<usize>,
    ) -> (bool, bool) {
        let (exhausted, steps) = self.felsch.run_bounded(table, settings.large_collapse, budget, stop);
        reporter.record_felsch_step();
        sync_reporter(reporter, table);
        reporter.maybe_tick("felsch");
        (exhausted, steps > 0)
    }

    fn lookahead_pass(
        &mut self,
        table: &mut CosetTable,
        relations: &[(Word, Word)],
        settings: &Settings,
        reporter: &mut Reporter,
        force_full: bool,
    ) -> LookaheadReport {
        sync_reporter(reporter, table);
        reporter.maybe_tick("lookahead");
        if force_full {
            let mut full_settings = settings.clone();
            full_settings.lookahead_extent = LookaheadExtent::Full;
            let (report, next) = Lookahead::run(table, relations, &self.felsch, self.lookahead_cursor, &full_settings);
            self.lookahead_cursor = next;
            if report.stopped_early {
                tracing::warn!(target: "congruence::strategy", killed = report.nodes_killed, "lookahead stopped early");
            }
            report
        } else {
            let (report, next) = Lookahead::run(table, relations, &self.felsch, self.lookahead_cursor, settings);
            self.lookahead_cursor = next;
            if report.stopped_early {
                tracing::warn!(target: "congruence::strategy", killed = report.nodes_killed, "lookahead stopped early");
            }
            report
        }
    }
}

/// Refreshes the reporter's live gauges from the table ahead of a tick.
/// `killed` is read as the free list's current size - every id the table has
/// ever allocated but is not presently active - rather than a cumulative
/// count, matching `active_nodes` being a live gauge too.
fn sync_reporter(reporter: &mut Reporter, table: &CosetTable) {
    let active = table.active_count();
    let killed = table.nodes.capacity() - active;
    let edges = table.graph.edge_count();
    let complete_ratio = table.graph.complete_ratio(active);
    reporter.sync(active as u64, killed as u64, edges as u64, complete_ratio);
}

struct Progress {
    made_progress: bool,
    cancelled: bool,
}

impl Progress {
    fn new(made_progress: bool, cancelled: bool) -> Self {
        Progress { made_progress, cancelled }
    }
}

enum SweepResult {
    Exhausted { progressed: bool },
    BudgetReached { progressed: bool },
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::DefinitionPolicy;
    use crate::presentation::Presentation;
    use crate::settings::StrategyKind;
    use std::time::Duration;

    fn run_to_finish(p: &Presentation, strategy: StrategyKind) -> usize {
        let mut table = CosetTable::new(p.alphabet_size(), DefinitionPolicy::NoStackIfNoSpace, 1024);
        let mut settings = Settings::default().with_strategy(strategy);
        HltEngine::seed(&mut table, &[], p.relations(), settings.registers_definitions(), settings.large_collapse).unwrap();
        let mut strategy = Strategy::new(FelschEngine::new(p));
        let mut reporter = Reporter::new(Duration::from_secs(1));
        let outcome = strategy.run(&mut table, p.relations(), &mut settings, &mut reporter, &mut || false).unwrap();
        assert_eq!(outcome, RunOutcome::Finished);
        table.active_count() - 1 // node 0 is the empty word's class
    }

    fn order5_presentation() -> Presentation {
        let mut p = Presentation::new(1);
        p.add_rule(vec![0, 0, 0, 0, 0], vec![]).unwrap();
        p
    }

    #[test]
    fn hlt_strategy_finds_order_five_group() {
        assert_eq!(run_to_finish(&order5_presentation(), StrategyKind::Hlt), 4);
    }

    #[test]
    fn felsch_strategy_finds_order_five_group() {
        assert_eq!(run_to_finish(&order5_presentation(), StrategyKind::Felsch), 4);
    }

    #[test]
    fn cr_strategy_agrees_with_hlt_and_felsch() {
        assert_eq!(run_to_finish(&order5_presentation(), StrategyKind::Cr), 4);
    }

    #[test]
    fn lower_bound_below_the_true_count_does_not_block_finishing() {
        // lower_bound is a diagnostic check, not a gate: finishing below it
        // only logs a warning, since the graph is provably complete either way.
        let p = order5_presentation();
        let mut table = CosetTable::new(p.alphabet_size(), DefinitionPolicy::Unlimited, 0);
        let mut settings = Settings::default();
        settings.lower_bound = Some(1000);
        HltEngine::seed(&mut table, &[], p.relations(), settings.registers_definitions(), settings.large_collapse).unwrap();
        let mut strategy = Strategy::new(FelschEngine::new(&p));
        let mut reporter = Reporter::new(Duration::from_secs(1));
        let outcome = strategy.run(&mut table, p.relations(), &mut settings, &mut reporter, &mut || false).unwrap();
        assert_eq!(outcome, RunOutcome::Finished);
        assert_eq!(table.active_count(), 5);
    }

    #[test]
    fn cancellation_returns_early_and_is_resumable() {
        let p = order5_presentation();
        let mut table = CosetTable::new(p.alphabet_size(), DefinitionPolicy::Unlimited, 0);
        let mut settings = Settings::default();
        HltEngine::seed(&mut table, &[], p.relations(), settings.registers_definitions(), settings.large_collapse).unwrap();
        let mut strategy = Strategy::new(FelschEngine::new(&p));
        let mut reporter = Reporter::new(Duration::from_secs(1));

        let outcome = strategy.run(&mut table, p.relations(), &mut settings, &mut reporter, &mut || true).unwrap();
        assert_eq!(outcome, RunOutcome::Cancelled);

        let outcome = strategy.run(&mut table, p.relations(), &mut settings, &mut reporter, &mut || false).unwrap();
        assert_eq!(outcome, RunOutcome::Finished);
    }
}
