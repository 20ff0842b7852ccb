use clap::{Parser as CommandLineParser, ValueEnum};
use dataflow::cfg::ControlFlowGraph;
use dataflow::solvers::Stores;
use qualifiers::check::Checker;
use qualifiers::ir::{Cfg, print_node};
use qualifiers::liveness::live_variables;
use qualifiers::runner::{QualifierResult, analyze_units};
use qualifiers::{AnalysisOptions, System};
use utils::DiagnosticEmitter;

pub mod demos;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum)]
pub enum CLISystem {
    Odd,
    #[default]
    Nullness,
    LowerBound,
    SameLen,
    IndexFor,
    IntRange,
    Conversion,
}

impl From<CLISystem> for System {
    fn from(value: CLISystem) -> Self {
        match value {
            CLISystem::Odd => System::Odd,
            CLISystem::Nullness => System::Nullness,
            CLISystem::LowerBound => System::LowerBound,
            CLISystem::SameLen => System::SameLen,
            CLISystem::IndexFor => System::IndexFor,
            CLISystem::IntRange => System::IntRange,
            CLISystem::Conversion => System::Conversion,
        }
    }
}

#[derive(Debug, CommandLineParser, Default)]
#[command(
    name = "qualflow",
    version,
    about = "Refine type qualifiers over the built-in demonstration units."
)]
pub struct Opt {
    /// Qualifier system to run.
    #[arg(long, value_enum, default_value_t)]
    pub system: CLISystem,

    /// Only analyze the unit with this name.
    #[arg(long, value_name = "UNIT_NAME")]
    pub unit: Option<String>,

    /// Print the names of the demonstration units.
    #[arg(long)]
    pub list: bool,

    /// Dump the control flow graph with the input store of each block in graphviz format.
    #[arg(long)]
    pub dump_cfg: bool,

    /// Print the live variables before each node instead of refining qualifiers.
    #[arg(long)]
    pub liveness: bool,

    /// Give up on a unit after this many visits per block on average.
    #[arg(long, value_name = "VISITS")]
    pub node_limit: Option<usize>,

    /// Assume other threads can change fields at any time.
    #[arg(long)]
    pub concurrent_semantics: bool,

    /// Treat every method and constructor as side-effect free.
    #[arg(long)]
    pub assume_side_effect_free: bool,

    /// Log the progress of the solvers.
    #[arg(short, long)]
    pub verbose: bool,
}

impl Opt {
    pub fn analysis_options(&self) -> AnalysisOptions {
        let mut options = AnalysisOptions {
            sequential_semantics: !self.concurrent_semantics,
            assume_side_effect_free: self.assume_side_effect_free,
            ..AnalysisOptions::default()
        };
        if let Some(limit) = self.node_limit {
            options.solver.node_limit = limit;
        }
        options
    }
}

fn print_stores(cfg: &Cfg, result: &QualifierResult, diag: &mut DiagnosticEmitter) {
    diag.out_ln(&format!("{}:", cfg.name()));
    for block in 0..cfg.blocks().len() {
        match result.block_input(block) {
            Some(Stores::Regular(store)) => diag.out_ln(&format!("  block {block}: {store}")),
            Some(Stores::Conditional {
                then_store,
                else_store,
            }) => diag.out_ln(&format!(
                "  block {block}: then {then_store} else {else_store}"
            )),
            None => {}
        }
    }
}

/// Units the solver gives up on are reported and skipped.
fn print_liveness(units: &[Cfg], diag: &mut DiagnosticEmitter, opts: &Opt) -> Option<()> {
    let config = opts.analysis_options().solver;
    for cfg in units {
        let result = match live_variables(cfg, config.clone()) {
            Ok(result) => result,
            Err(err) => {
                diag.error(&err.to_string());
                continue;
            }
        };
        diag.out_ln(&format!("{}:", cfg.name()));
        for pos in cfg.positions() {
            if let (Some(node), Some(Stores::Regular(live))) =
                (cfg.node(pos), result.store_before(pos))
            {
                diag.out_ln(&format!(
                    "  {}:{}: {live:?} {}",
                    pos.block_id,
                    pos.op_id,
                    print_node(node)
                ));
            }
        }
    }
    (diag.error_count() == 0).then_some(())
}

pub fn process(diag: &mut DiagnosticEmitter, opts: &Opt) -> Option<()> {
    let units = demos::units();
    if opts.list {
        for cfg in &units {
            diag.out_ln(cfg.name());
        }
        return Some(());
    }

    let units: Vec<Cfg> = match &opts.unit {
        Some(name) => {
            let selected: Vec<_> = units.into_iter().filter(|cfg| cfg.name() == name).collect();
            if selected.is_empty() {
                diag.error(&format!("no unit named `{name}`"));
                return None;
            }
            selected
        }
        None => units,
    };

    if opts.liveness {
        return print_liveness(&units, diag, opts);
    }

    let system = System::from(opts.system);
    let rules = system.rules();
    let declarations = demos::declarations(system);
    let report = analyze_units(
        &units,
        rules.as_ref(),
        &declarations,
        &opts.analysis_options(),
    );
    for malformed in &report.malformed {
        diag.warning(&malformed.to_string());
    }

    for cfg in &units {
        let result = match report.results.get(cfg.name()) {
            Some(Ok(result)) => result,
            Some(Err(err)) => {
                diag.error(&err.to_string());
                continue;
            }
            None => continue,
        };

        if opts.dump_cfg {
            diag.out_ln(&result.visualize(cfg, print_node, |store| store.to_string()));
        } else {
            print_stores(cfg, result, diag);
        }

        let checker = Checker {
            cfg,
            rules: rules.as_ref(),
            declarations: &declarations,
            result,
        };
        match checker.check_returns() {
            Ok(errors) => {
                for error in errors {
                    diag.err_ln(&error.to_string());
                }
            }
            Err(err) => diag.error(&err.to_string()),
        }
    }

    (diag.error_count() == 0).then_some(())
}
