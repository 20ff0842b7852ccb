use std::collections::BTreeSet;

use dataflow::cfg::OpPos;
use dataflow::domains::PowerSet;
use dataflow::solvers::{
    AnalysisResult, BackwardSolver, SolverConfig, TransferFunction, TransferInput, TransferResult,
};
use dataflow::{FlowError, InternalError};

use crate::ir::{Cfg, Expr, Node};

pub type LiveSet = PowerSet<String>;

/// Live variables: a local is live when some path reads it before the next
/// assignment. Arguments of calls and constructors count as reads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LiveVariables;

impl TransferFunction<Cfg, LiveSet> for LiveVariables {
    type Value = ();

    fn operation(
        &mut self,
        _pos: OpPos,
        op: &Node,
        _cfg: &Cfg,
        ctx: &(),
        input: &TransferInput<LiveSet>,
    ) -> Result<TransferResult<(), LiveSet>, FlowError> {
        let mut live = input.regular(ctx)?;
        let mut reads = BTreeSet::new();
        match op.target().map(Expr::canonical) {
            Some(Expr::Local(name)) => {
                live.remove(&name);
            }
            // Writing `a[i]` or `x.f` reads `a`, `i` and `x`.
            Some(target) => target.locals(&mut reads),
            None => {}
        }
        for operand in op.operands() {
            operand.locals(&mut reads);
        }
        live.extend(reads);
        Ok(TransferResult::regular(None, live))
    }
}

/// The variables live before each node of `cfg`. Nothing is live at the
/// exits.
pub fn live_variables(
    cfg: &Cfg,
    config: SolverConfig,
) -> Result<AnalysisResult<(), LiveSet>, InternalError> {
    BackwardSolver::new(config).solve(
        cfg,
        LiveSet::default(),
        LiveSet::default(),
        &(),
        &mut LiveVariables,
    )
}
