use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;

use dataflow::InternalError;
use dataflow::cfg::ControlFlowGraph;
use dataflow::solvers::{AnalysisResult, ForwardSolver, SolverConfig};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::declarations::Declarations;
use crate::error::MalformedQualifier;
use crate::hierarchy::QualifierHierarchy;
use crate::ir::Cfg;
use crate::rules::{self, RefinementRules};
use crate::store::Store;
use crate::transfer::QualifierTransfer;
use crate::value::AbstractValue;

/// How the analysis treats the heap.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AnalysisOptions {
    pub solver: SolverConfig,
    /// Assume no other thread changes fields behind the analyzed code's back.
    /// Without it, facts about fields are never stored.
    pub sequential_semantics: bool,
    /// Treat every method and constructor as side-effect free.
    pub assume_side_effect_free: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            solver: SolverConfig::default(),
            sequential_semantics: true,
            assume_side_effect_free: false,
        }
    }
}

/// The built-in qualifier systems.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum System {
    Odd,
    Nullness,
    LowerBound,
    SameLen,
    IndexFor,
    IntRange,
    Conversion,
}

impl System {
    pub const ALL: [System; 7] = [
        System::Odd,
        System::Nullness,
        System::LowerBound,
        System::SameLen,
        System::IndexFor,
        System::IntRange,
        System::Conversion,
    ];

    pub fn name(self) -> &'static str {
        match self {
            System::Odd => "odd",
            System::Nullness => "nullness",
            System::LowerBound => "lower-bound",
            System::SameLen => "same-len",
            System::IndexFor => "index-for",
            System::IntRange => "int-range",
            System::Conversion => "conversion",
        }
    }

    pub fn rules(self) -> Box<dyn RefinementRules> {
        match self {
            System::Odd => Box::new(rules::OddRules::new()),
            System::Nullness => Box::new(rules::NullnessRules::new()),
            System::LowerBound => Box::new(rules::LowerBoundRules::new()),
            System::SameLen => Box::new(rules::SameLenRules::new()),
            System::IndexFor => Box::new(rules::IndexForRules::new()),
            System::IntRange => Box::new(rules::IntRangeRules::new()),
            System::Conversion => Box::new(rules::ConversionRules::new()),
        }
    }
}

impl fmt::Display for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for System {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        System::ALL
            .into_iter()
            .find(|system| system.name() == s)
            .ok_or_else(|| format!("unknown qualifier system `{s}`"))
    }
}

pub type QualifierResult = AnalysisResult<AbstractValue, Store>;

/// The solver configuration for a hierarchy. Unless the options say
/// otherwise, hierarchies that need widening get it, and the visit budget
/// grows so that widening gets a chance to kick in before the solver gives
/// up.
pub fn solver_config(options: &AnalysisOptions, hierarchy: &dyn QualifierHierarchy) -> SolverConfig {
    let mut config = options.solver.clone();
    if config.widen_after.is_some() {
        return config;
    }
    config.widen_after = hierarchy.iterations_before_widening();
    if let (Some(threshold), true) = (config.widen_after, config.node_limit > 0) {
        config.node_limit = config.node_limit.max(threshold.saturating_mul(5));
    }
    config
}

fn solve(
    cfg: &Cfg,
    rules: &dyn RefinementRules,
    declarations: &Declarations,
    options: &AnalysisOptions,
) -> Result<QualifierResult, InternalError> {
    let hierarchy = rules.hierarchy();
    let seed = declarations.initial_store(cfg, hierarchy, options.sequential_semantics);
    let mut transfer = QualifierTransfer::new(rules, declarations, options);
    let result = ForwardSolver::new(solver_config(options, hierarchy)).solve(
        cfg,
        seed,
        hierarchy,
        &mut transfer,
    )?;
    debug!(
        unit = cfg.name(),
        hierarchy = hierarchy.name(),
        iterations = result.iterations(),
        "unit analyzed"
    );
    Ok(result)
}

/// The outcome of analyzing a single unit.
#[derive(Debug)]
pub struct UnitReport {
    pub result: Result<QualifierResult, InternalError>,
    /// Declarations that were replaced by top.
    pub malformed: Vec<MalformedQualifier>,
}

/// Run the forward analysis on a single unit. The declarations are checked
/// against the names of this unit only.
pub fn analyze_unit(
    cfg: &Cfg,
    rules: &dyn RefinementRules,
    declarations: &Declarations,
    options: &AnalysisOptions,
) -> UnitReport {
    let (declarations, malformed) =
        declarations.sanitize(rules.hierarchy(), core::slice::from_ref(cfg));
    let result = solve(cfg, rules, &declarations, options);
    if let Err(err) = &result {
        warn!(unit = cfg.name(), %err, "unit is unanalyzable");
    }
    UnitReport { result, malformed }
}

/// The outcome of analyzing a group of units.
#[derive(Debug)]
pub struct UnitsReport {
    /// Keyed by unit name. Units that hit an internal error are
    /// unanalyzable, the others are unaffected.
    pub results: BTreeMap<String, Result<QualifierResult, InternalError>>,
    pub malformed: Vec<MalformedQualifier>,
}

impl UnitsReport {
    pub fn failures(&self) -> impl Iterator<Item = &InternalError> {
        self.results.values().filter_map(|result| result.as_ref().err())
    }
}

/// Analyze independent units in parallel. Malformed declarations are
/// reported once for the whole group.
pub fn analyze_units(
    units: &[Cfg],
    rules: &dyn RefinementRules,
    declarations: &Declarations,
    options: &AnalysisOptions,
) -> UnitsReport {
    let (declarations, malformed) = declarations.sanitize(rules.hierarchy(), units);
    let results = units
        .par_iter()
        .map(|cfg| {
            let result = solve(cfg, rules, &declarations, options);
            if let Err(err) = &result {
                warn!(unit = cfg.name(), %err, "unit is unanalyzable");
            }
            (cfg.name().to_owned(), result)
        })
        .collect();
    UnitsReport { results, malformed }
}
