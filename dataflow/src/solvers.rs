use core::fmt::Debug;
use std::collections::BTreeMap;

use crate::cfg::{ControlFlowGraph, OpPos, OperationOf};
use crate::domains::JoinSemiLattice;
use crate::error::FlowError;

/// Knobs shared by the solvers.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SolverConfig {
    /// Set the approximate iteration limit per block. If the limit is reached
    /// (the analysis did not converge in the permitted number of steps),
    /// the solver gives up with [`FlowError::NoConvergence`]. Zero disables
    /// the limit.
    pub node_limit: usize,
    /// Number of stores that can flow into a block before the solver
    /// switches from join to widening for that block. `None` never widens.
    pub widen_after: Option<usize>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            node_limit: 20,
            widen_after: None,
        }
    }
}

/// The stores valid at one program point. Right after a boolean condition
/// the facts differ depending on the outcome, so there is a separate store
/// for each outcome.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Stores<S> {
    Regular(S),
    Conditional { then_store: S, else_store: S },
}

/// What a transfer function gets: the store(s) right before the node.
pub type TransferInput<S> = Stores<S>;

impl<S: JoinSemiLattice> Stores<S> {
    pub fn is_conditional(&self) -> bool {
        matches!(self, Stores::Conditional { .. })
    }

    /// The store valid when the last condition evaluated to true.
    pub fn then_store(&self) -> &S {
        match self {
            Stores::Regular(store) => store,
            Stores::Conditional { then_store, .. } => then_store,
        }
    }

    /// The store valid when the last condition evaluated to false.
    pub fn else_store(&self) -> &S {
        match self {
            Stores::Regular(store) => store,
            Stores::Conditional { else_store, .. } => else_store,
        }
    }

    /// A single store that is valid regardless of the outcome of the last
    /// condition.
    pub fn regular(&self, ctx: &S::LatticeContext) -> Result<S, FlowError> {
        match self {
            Stores::Regular(store) => Ok(store.clone()),
            Stores::Conditional {
                then_store,
                else_store,
            } => then_store.join(else_store, ctx),
        }
    }
}

/// The effect of a single node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferResult<V, S> {
    /// The abstract value the node evaluates to, if it has one.
    pub value: Option<V>,
    pub stores: Stores<S>,
    /// Stores to propagate along exceptional edges, keyed by the exception
    /// cause. Causes without an entry receive the store that was valid before
    /// the node.
    pub exceptional_stores: BTreeMap<String, S>,
}

impl<V, S> TransferResult<V, S> {
    pub fn regular(value: Option<V>, store: S) -> Self {
        Self {
            value,
            stores: Stores::Regular(store),
            exceptional_stores: BTreeMap::new(),
        }
    }

    pub fn conditional(value: Option<V>, then_store: S, else_store: S) -> Self {
        Self {
            value,
            stores: Stores::Conditional {
                then_store,
                else_store,
            },
            exceptional_stores: BTreeMap::new(),
        }
    }

    pub fn with_exceptional_store(mut self, cause: impl Into<String>, store: S) -> Self {
        self.exceptional_stores.insert(cause.into(), store);
        self
    }
}

/// Transfer functions describe the effect of a single node on the store.
/// The solvers take care of sequencing the nodes of a block, routing stores
/// between blocks and merging them.
///
/// In backward analyses, the input is the store after the node in program
/// order and the result is the store before it.
pub trait TransferFunction<Cfg, S>
where
    Cfg: ControlFlowGraph,
    S: JoinSemiLattice,
{
    type Value: Clone + Debug;

    /// Must not assume anything about how often or in which order it is
    /// called; the solvers replay blocks to record the final results.
    fn operation(
        &mut self,
        pos: OpPos,
        op: &OperationOf<Cfg>,
        cfg: &Cfg,
        ctx: &S::LatticeContext,
        input: &TransferInput<S>,
    ) -> Result<TransferResult<Self::Value, S>, FlowError>;

    /// Stores after nodes for which this returns true are collected in
    /// [`AnalysisResult::return_stores`].
    fn is_return(&self, _op: &OperationOf<Cfg>) -> bool {
        false
    }
}

mod backward;
mod forward;
mod result;

pub use backward::*;
pub use forward::*;
pub use result::*;
