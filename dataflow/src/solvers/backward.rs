use tracing::{debug, trace, warn};

use crate::cfg::{
    BlockKind, CfgBlock, ControlFlowGraph, EdgeLabel, OpPos, RPOWorklist, SpecialBlockKind,
    validate,
};
use crate::domains::JoinSemiLattice;
use crate::error::{FlowError, InternalError};
use crate::solvers::{AnalysisResult, SolverConfig, Stores, TransferFunction};

/// A worklist solver propagating stores from the exit blocks towards the
/// entry, visiting the queued blocks in post-order. Conditions do not split
/// stores in this direction, every store is regular.
///
/// Exception blocks keep the stores arriving from their exceptional
/// successors apart: those are merged into the store before the block
/// without going through the node, since the node did not complete.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct BackwardSolver {
    pub config: SolverConfig,
}

struct BackwardState<'a, S: JoinSemiLattice> {
    ctx: &'a S::LatticeContext,
    out_stores: Vec<Option<S>>,
    exception_stores: Vec<Option<S>>,
    entry_store: Option<S>,
    worklist: RPOWorklist,
}

fn merge_into<S: JoinSemiLattice>(
    slot: &mut Option<S>,
    store: S,
    ctx: &S::LatticeContext,
) -> Result<bool, FlowError> {
    let merged = match slot {
        Some(previous) => store.join(previous, ctx)?,
        None => store,
    };
    if slot.as_ref() == Some(&merged) {
        return Ok(false);
    }
    *slot = Some(merged);
    Ok(true)
}

impl<S: JoinSemiLattice> BackwardState<'_, S> {
    /// Send the store before `from` to the predecessor `pred`.
    fn add_store_after<Cfg: ControlFlowGraph>(
        &mut self,
        cfg: &Cfg,
        pred: usize,
        from: usize,
        store: S,
    ) -> Result<(), FlowError> {
        let pred_block = &cfg.blocks()[pred];
        let mut normal = false;
        let mut exceptional = false;
        for edge in pred_block.edges().iter().filter(|e| e.target == from) {
            match edge.label {
                EdgeLabel::Exceptional(_) if pred_block.kind() == BlockKind::Exception => {
                    exceptional = true
                }
                _ => normal = true,
            }
        }

        let mut changed = false;
        if exceptional {
            changed |= merge_into(&mut self.exception_stores[pred], store.clone(), self.ctx)?;
        }
        if normal {
            changed |= merge_into(&mut self.out_stores[pred], store, self.ctx)?;
        }
        if changed {
            self.worklist.push(pred);
        }
        Ok(())
    }
}

impl BackwardSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    /// Run the analysis from the exit blocks of `cfg`. The normal exit starts
    /// with `exit_seed`, the exceptional exit with `exceptional_exit_seed`.
    pub fn solve<Cfg, S, F>(
        &self,
        cfg: &Cfg,
        exit_seed: S,
        exceptional_exit_seed: S,
        ctx: &S::LatticeContext,
        transfer: &mut F,
    ) -> Result<AnalysisResult<F::Value, S>, InternalError>
    where
        Cfg: ControlFlowGraph,
        S: JoinSemiLattice,
        F: TransferFunction<Cfg, S>,
    {
        let unit = cfg.name();
        validate(cfg).map_err(|(block, err)| err.at(unit, Some(block)))?;

        let block_num = cfg.blocks().len();
        debug!(unit, blocks = block_num, "starting backward analysis");
        let mut state = BackwardState {
            ctx,
            out_stores: vec![None; block_num],
            exception_stores: vec![None; block_num],
            entry_store: None,
            worklist: RPOWorklist::new_backward(cfg),
        };

        let exit = cfg.special_block(SpecialBlockKind::Exit);
        let exceptional_exit = cfg.special_block(SpecialBlockKind::ExceptionalExit);
        if exit.is_none() && exceptional_exit.is_none() {
            return Err(FlowError::malformed("no exit block to start from").at(unit, None));
        }
        for (block, seed) in [(exit, exit_seed), (exceptional_exit, exceptional_exit_seed)] {
            if let Some(block) = block {
                state.out_stores[block] = Some(seed);
                state.worklist.push(block);
            }
        }

        let limit = self.config.node_limit.saturating_mul(block_num);
        let mut iterations = 0_usize;
        while let Some(current) = state.worklist.pop() {
            if limit > 0 && iterations >= limit {
                warn!(unit, limit, "backward analysis did not converge");
                return Err(FlowError::NoConvergence { limit }.at(unit, Some(current)));
            }
            iterations += 1;
            trace!(unit, block = current, "processing block");
            process_block(current, cfg, &mut state, transfer, None)
                .map_err(|err| err.at(unit, Some(current)))?;
        }
        debug!(unit, iterations, "backward analysis reached fixpoint");

        let mut result = AnalysisResult::new(block_num);
        result.iterations = iterations;
        for block in 0..block_num {
            process_block(block, cfg, &mut state, transfer, Some(&mut result))
                .map_err(|err| err.at(unit, Some(block)))?;
        }
        result.entry_store = state.entry_store.clone();
        result.regular_exit_store = exit.and_then(|b| state.out_stores[b].clone());
        result.exceptional_exit_store =
            exceptional_exit.and_then(|b| state.out_stores[b].clone());
        Ok(result)
    }
}

/// Compute the store before a block and hand it to the predecessors. When
/// `record` is set, the fixpoint is already reached: the per node results are
/// recorded and nothing is propagated.
fn process_block<Cfg, S, F>(
    block_id: usize,
    cfg: &Cfg,
    state: &mut BackwardState<'_, S>,
    transfer: &mut F,
    mut record: Option<&mut AnalysisResult<F::Value, S>>,
) -> Result<(), FlowError>
where
    Cfg: ControlFlowGraph,
    S: JoinSemiLattice,
    F: TransferFunction<Cfg, S>,
{
    let block = &cfg.blocks()[block_id];
    let exception_store = state.exception_stores[block_id].clone();
    let after = match (state.out_stores[block_id].clone(), &exception_store) {
        (Some(after), _) => after,
        // A node that always throws.
        (None, Some(exceptional)) => exceptional.clone(),
        (None, None) if record.is_some() => return Ok(()),
        (None, None) => return Err(FlowError::MissingStore),
    };

    let mut current = after.clone();
    for (op_id, op) in block.operations().iter().enumerate().rev() {
        let pos = OpPos { block_id, op_id };
        let input = Stores::Regular(current.clone());
        let transferred = transfer.operation(pos, op, cfg, state.ctx, &input)?;
        let before = transferred.stores.regular(state.ctx)?;
        if let Some(result) = record.as_deref_mut() {
            if let Some(value) = transferred.value {
                result.values.insert(pos, value);
            }
            if transfer.is_return(op) {
                result.return_stores.push((pos, current.clone()));
            }
            result.stores_after.insert(pos, Stores::Regular(current));
            result.stores_before.insert(pos, Stores::Regular(before.clone()));
        }
        current = before;
    }
    if block.kind() == BlockKind::Exception {
        if let Some(exceptional) = exception_store {
            current = current.join(&exceptional, state.ctx)?;
        }
    }

    if let Some(result) = record {
        result.block_inputs[block_id] = Some(Stores::Regular(after));
        return Ok(());
    }

    if block.kind() == BlockKind::Special(SpecialBlockKind::Entry) {
        state.entry_store = Some(current.clone());
    }
    for &pred in block.predecessors() {
        state.add_store_after(cfg, pred, block_id, current.clone())?;
    }
    Ok(())
}
