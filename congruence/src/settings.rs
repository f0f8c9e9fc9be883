use std::time::Duration;

use env_param::EnvParam;

use crate::definitions::DefinitionPolicy;

/// Which of C5/C6 drives new-definition creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Hlt,
    Felsch,
    /// Alternate Felsch, HLT, Felsch, ... (felsch-first composite).
    Cr,
    /// Alternate HLT, Felsch, HLT, ... (hlt-first composite).
    Rc,
    /// Felsch / HLT / Felsch-to-completion / full lookahead.
    CrThenFull,
    /// HLT-until-threshold / full lookahead / CR.
    ROverC,
}

/// Extent of a [`crate::lookahead::Lookahead`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookaheadExtent {
    Partial,
    Full,
}

/// Which engine a lookahead pass borrows its traversal from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookaheadStyle {
    Hlt,
    Felsch,
}

/// Canonical order used by [`crate::standardise::Standardiser`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardisationOrder {
    None,
    ShortLex,
    Lex,
}

static LOOKAHEAD_NEXT_DEFAULT: EnvParam<usize> = EnvParam::new("CONGRUENCE_LOOKAHEAD_NEXT", "5000");
static LOOKAHEAD_MIN_DEFAULT: EnvParam<usize> = EnvParam::new("CONGRUENCE_LOOKAHEAD_MIN", "10");
static LARGE_COLLAPSE_DEFAULT: EnvParam<usize> = EnvParam::new("CONGRUENCE_LARGE_COLLAPSE", "100000");
static DEF_MAX_DEFAULT: EnvParam<usize> = EnvParam::new("CONGRUENCE_DEF_MAX", "2000000");

/// Every tunable of a coset enumeration run.
///
/// Most fields have sane defaults (see [`Settings::default`]); the four
/// wired through `env_param` mirror how the teacher crate exposes numeric
/// thresholds such as `aries::solver::stats::PRINT_RUNNING_STATS` for local
/// experimentation without plumbing a CLI flag through several layers.
#[derive(Debug, Clone)]
pub struct Settings {
    pub strategy: StrategyKind,
    pub save: bool,
    pub def_policy: DefinitionPolicy,
    pub def_max: usize,
    pub hlt_defs: usize,
    pub f_defs: usize,
    pub lookahead_extent: LookaheadExtent,
    pub lookahead_style: LookaheadStyle,
    pub lookahead_next: usize,
    pub lookahead_min: usize,
    pub lookahead_growth_factor: f64,
    pub lookahead_growth_threshold: usize,
    pub lookahead_stop_early_ratio: f64,
    pub lookahead_stop_early_interval: Duration,
    pub lower_bound: Option<usize>,
    pub use_relations_in_extra: bool,
    pub large_collapse: usize,
    pub standardisation: StandardisationOrder,
    pub report_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            strategy: StrategyKind::Hlt,
            save: false,
            def_policy: DefinitionPolicy::NoStackIfNoSpace,
            def_max: DEF_MAX_DEFAULT.get(),
            hlt_defs: 200_000,
            f_defs: 100_000,
            lookahead_extent: LookaheadExtent::Partial,
            lookahead_style: LookaheadStyle::Hlt,
            lookahead_next: LOOKAHEAD_NEXT_DEFAULT.get(),
            lookahead_min: LOOKAHEAD_MIN_DEFAULT.get(),
            lookahead_growth_factor: 2.0,
            lookahead_growth_threshold: 4,
            lookahead_stop_early_ratio: 0.01,
            lookahead_stop_early_interval: Duration::from_millis(200),
            lower_bound: None,
            use_relations_in_extra: false,
            large_collapse: LARGE_COLLAPSE_DEFAULT.get(),
            standardisation: StandardisationOrder::ShortLex,
            report_interval: Duration::from_secs(1),
        }
    }
}

impl Settings {
    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_standardisation(mut self, order: StandardisationOrder) -> Self {
        self.standardisation = order;
        self
    }

    /// Whether HLT/Felsch processing for this strategy should register
    /// definitions as it goes, per the initial-run policy of C8.
    pub fn registers_definitions(&self) -> bool {
        self.save || matches!(self.strategy, StrategyKind::Felsch)
    }
}
