use tracing::{debug, trace, warn};

use crate::cfg::{
    BlockKind, CfgBlock, ControlFlowGraph, Edge, EdgeLabel, FlowRule, OpPos, RPOWorklist,
    SpecialBlockKind, validate,
};
use crate::domains::JoinSemiLattice;
use crate::error::{FlowError, InternalError};
use crate::solvers::{AnalysisResult, SolverConfig, Stores, TransferFunction};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StoreKind {
    Then,
    Else,
    Both,
}

/// A worklist solver propagating stores from the entry block towards the
/// exits. Each block has a then and an else input store, so facts learned
/// from a condition survive until the conditional block that consumes them.
/// The worklist visits the queued blocks in reverse post-order.
///
/// Stores flowing into a block are merged with join until the block received
/// [`SolverConfig::widen_after`] stores, then the next merge widens and the
/// count starts over.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ForwardSolver {
    pub config: SolverConfig,
}

struct ForwardState<'a, S: JoinSemiLattice> {
    ctx: &'a S::LatticeContext,
    widen_after: Option<usize>,
    then_stores: Vec<Option<S>>,
    else_stores: Vec<Option<S>>,
    inputs: Vec<Option<Stores<S>>>,
    block_count: Vec<usize>,
    arrivals: Vec<usize>,
    worklist: RPOWorklist,
}

impl<S: JoinSemiLattice> ForwardState<'_, S> {
    fn merge(
        &self,
        block: usize,
        new: S,
        previous: Option<&S>,
        widen: bool,
    ) -> Result<S, FlowError> {
        match previous {
            None => Ok(new),
            Some(previous) if widen => new.widen(previous, self.ctx, self.arrivals[block]),
            Some(previous) => new.join(previous, self.ctx),
        }
    }

    fn add_store_before(
        &mut self,
        block: usize,
        store: S,
        kind: StoreKind,
    ) -> Result<(), FlowError> {
        let then_store = self.then_stores[block].clone();
        let else_store = self.else_stores[block].clone();

        self.arrivals[block] += 1;
        let should_widen = match self.widen_after {
            Some(threshold) if self.block_count[block] >= threshold => {
                debug!(block, arrivals = self.arrivals[block], "widening");
                self.block_count[block] = 0;
                true
            }
            Some(_) => {
                self.block_count[block] += 1;
                false
            }
            None => false,
        };

        let mut changed = false;
        match kind {
            StoreKind::Then => {
                let new_then = self.merge(block, store, then_store.as_ref(), should_widen)?;
                if Some(&new_then) != then_store.as_ref() {
                    self.then_stores[block] = Some(new_then.clone());
                    if let Some(else_store) = else_store {
                        self.inputs[block] = Some(Stores::Conditional {
                            then_store: new_then,
                            else_store,
                        });
                        changed = true;
                    }
                }
            }
            StoreKind::Else => {
                let new_else = self.merge(block, store, else_store.as_ref(), should_widen)?;
                if Some(&new_else) != else_store.as_ref() {
                    self.else_stores[block] = Some(new_else.clone());
                    if let Some(then_store) = then_store {
                        self.inputs[block] = Some(Stores::Conditional {
                            then_store,
                            else_store: new_else,
                        });
                        changed = true;
                    }
                }
            }
            StoreKind::Both if then_store == else_store => {
                // There is only one regular store so far.
                let new_store = self.merge(block, store, then_store.as_ref(), should_widen)?;
                if Some(&new_store) != then_store.as_ref() {
                    self.then_stores[block] = Some(new_store.clone());
                    self.else_stores[block] = Some(new_store.clone());
                    self.inputs[block] = Some(Stores::Regular(new_store));
                    changed = true;
                }
            }
            StoreKind::Both => {
                let new_then =
                    self.merge(block, store.clone(), then_store.as_ref(), should_widen)?;
                let new_else = self.merge(block, store, else_store.as_ref(), should_widen)?;
                if Some(&new_then) != then_store.as_ref() || Some(&new_else) != else_store.as_ref()
                {
                    self.then_stores[block] = Some(new_then.clone());
                    self.else_stores[block] = Some(new_else.clone());
                    self.inputs[block] = Some(Stores::Conditional {
                        then_store: new_then,
                        else_store: new_else,
                    });
                    changed = true;
                }
            }
        }

        if changed {
            self.worklist.push(block);
        }
        Ok(())
    }

    fn propagate(&mut self, edge: &Edge, stores: &Stores<S>) -> Result<(), FlowError> {
        let target = edge.target;
        match edge.flow_rule {
            FlowRule::EachToEach => match stores {
                Stores::Regular(store) => {
                    self.add_store_before(target, store.clone(), StoreKind::Both)
                }
                Stores::Conditional {
                    then_store,
                    else_store,
                } => {
                    self.add_store_before(target, then_store.clone(), StoreKind::Then)?;
                    self.add_store_before(target, else_store.clone(), StoreKind::Else)
                }
            },
            FlowRule::ThenToBoth => {
                self.add_store_before(target, stores.then_store().clone(), StoreKind::Both)
            }
            FlowRule::ElseToBoth => {
                self.add_store_before(target, stores.else_store().clone(), StoreKind::Both)
            }
            FlowRule::ThenToThen => {
                self.add_store_before(target, stores.then_store().clone(), StoreKind::Then)
            }
            FlowRule::ElseToElse => {
                self.add_store_before(target, stores.else_store().clone(), StoreKind::Else)
            }
        }
    }
}

impl ForwardSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    /// Run the analysis from the entry block of `cfg`, starting with `seed`.
    /// The seed usually has the declared facts about the formal parameters.
    ///
    /// Blocks the analysis never reaches have no stores in the result.
    pub fn solve<Cfg, S, F>(
        &self,
        cfg: &Cfg,
        seed: S,
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
        debug!(unit, blocks = block_num, "starting forward analysis");
        let mut state = ForwardState {
            ctx,
            widen_after: self.config.widen_after,
            then_stores: vec![None; block_num],
            else_stores: vec![None; block_num],
            inputs: vec![None; block_num],
            block_count: vec![0; block_num],
            arrivals: vec![0; block_num],
            worklist: RPOWorklist::new(cfg),
        };
        let entry = cfg.entry();
        state
            .add_store_before(entry, seed, StoreKind::Both)
            .map_err(|err| err.at(unit, Some(entry)))?;

        let limit = self.config.node_limit.saturating_mul(block_num);
        let mut iterations = 0_usize;
        while let Some(current) = state.worklist.pop() {
            if limit > 0 && iterations >= limit {
                warn!(unit, limit, "forward analysis did not converge");
                return Err(FlowError::NoConvergence { limit }.at(unit, Some(current)));
            }
            iterations += 1;
            trace!(unit, block = current, "processing block");
            process_block(current, cfg, &mut state, transfer)
                .map_err(|err| err.at(unit, Some(current)))?;
        }
        debug!(unit, iterations, "forward analysis reached fixpoint");

        let mut result = AnalysisResult::new(block_num);
        result.iterations = iterations;
        for block in 0..block_num {
            record_block(block, cfg, &state, transfer, &mut result)
                .map_err(|err| err.at(unit, Some(block)))?;
        }
        Ok(result)
    }
}

fn process_block<Cfg, S, F>(
    block_id: usize,
    cfg: &Cfg,
    state: &mut ForwardState<'_, S>,
    transfer: &mut F,
) -> Result<(), FlowError>
where
    Cfg: ControlFlowGraph,
    S: JoinSemiLattice,
    F: TransferFunction<Cfg, S>,
{
    let block = &cfg.blocks()[block_id];
    let input = state.inputs[block_id].clone().ok_or(FlowError::MissingStore)?;
    match block.kind() {
        BlockKind::Regular => {
            let mut current = input;
            for (op_id, op) in block.operations().iter().enumerate() {
                let pos = OpPos { block_id, op_id };
                current = transfer.operation(pos, op, cfg, state.ctx, &current)?.stores;
            }
            for edge in block.edges() {
                state.propagate(edge, &current)?;
            }
        }
        BlockKind::Exception => {
            let pos = OpPos { block_id, op_id: 0 };
            let op = block
                .operations()
                .first()
                .ok_or_else(|| FlowError::malformed("exception block without a node"))?;
            let mut result = transfer.operation(pos, op, cfg, state.ctx, &input)?;
            for edge in block.edges() {
                match &edge.label {
                    EdgeLabel::Exceptional(cause) => {
                        // Refinements made by the node itself might not hold
                        // if it threw.
                        let store = match result.exceptional_stores.remove(cause) {
                            Some(store) => store,
                            None => input.regular(state.ctx)?,
                        };
                        state.add_store_before(edge.target, store, StoreKind::Both)?;
                    }
                    _ => state.propagate(edge, &result.stores)?,
                }
            }
        }
        BlockKind::Conditional | BlockKind::Special(SpecialBlockKind::Entry) => {
            for edge in block.edges() {
                state.propagate(edge, &input)?;
            }
        }
        BlockKind::Special(_) => {}
    }
    Ok(())
}

/// Replay a block from its final input store to record the per node results.
fn record_block<Cfg, S, F>(
    block_id: usize,
    cfg: &Cfg,
    state: &ForwardState<'_, S>,
    transfer: &mut F,
    result: &mut AnalysisResult<F::Value, S>,
) -> Result<(), FlowError>
where
    Cfg: ControlFlowGraph,
    S: JoinSemiLattice,
    F: TransferFunction<Cfg, S>,
{
    let Some(input) = state.inputs[block_id].clone() else {
        return Ok(());
    };
    let block = &cfg.blocks()[block_id];
    match block.kind() {
        BlockKind::Special(SpecialBlockKind::Exit) => {
            result.regular_exit_store = Some(input.regular(state.ctx)?);
        }
        BlockKind::Special(SpecialBlockKind::ExceptionalExit) => {
            result.exceptional_exit_store = Some(input.regular(state.ctx)?);
        }
        _ => {}
    }

    let mut current = input.clone();
    for (op_id, op) in block.operations().iter().enumerate() {
        let pos = OpPos { block_id, op_id };
        let transferred = transfer.operation(pos, op, cfg, state.ctx, &current)?;
        result.stores_before.insert(pos, current);
        if let Some(value) = transferred.value {
            result.values.insert(pos, value);
        }
        if transfer.is_return(op) {
            result
                .return_stores
                .push((pos, transferred.stores.regular(state.ctx)?));
        }
        result.stores_after.insert(pos, transferred.stores.clone());
        current = transferred.stores;
    }
    result.block_inputs[block_id] = Some(input);
    Ok(())
}
