use core::fmt::Debug;
use std::collections::BTreeMap;

use crate::cfg::{ControlFlowGraph, OpPos, OperationOf, print_with_annotations};
use crate::solvers::Stores;

/// The outcome of a solver run, queryable per block and per node.
///
/// Block inputs are in the direction of the analysis: the store before the
/// block for forward analyses and the store after it for backward ones. Node
/// level stores are always in program order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnalysisResult<V, S> {
    pub(crate) block_inputs: Vec<Option<Stores<S>>>,
    pub(crate) values: BTreeMap<OpPos, V>,
    pub(crate) stores_before: BTreeMap<OpPos, Stores<S>>,
    pub(crate) stores_after: BTreeMap<OpPos, Stores<S>>,
    pub(crate) return_stores: Vec<(OpPos, S)>,
    pub(crate) regular_exit_store: Option<S>,
    pub(crate) exceptional_exit_store: Option<S>,
    pub(crate) entry_store: Option<S>,
    pub(crate) iterations: usize,
}

impl<V, S> AnalysisResult<V, S> {
    pub(crate) fn new(block_num: usize) -> Self {
        Self {
            block_inputs: (0..block_num).map(|_| None).collect(),
            values: BTreeMap::new(),
            stores_before: BTreeMap::new(),
            stores_after: BTreeMap::new(),
            return_stores: Vec::new(),
            regular_exit_store: None,
            exceptional_exit_store: None,
            entry_store: None,
            iterations: 0,
        }
    }

    /// `None` when the analysis never reached the block.
    pub fn block_input(&self, block: usize) -> Option<&Stores<S>> {
        self.block_inputs.get(block).and_then(Option::as_ref)
    }

    pub fn is_reachable(&self, block: usize) -> bool {
        self.block_input(block).is_some()
    }

    pub fn value(&self, pos: OpPos) -> Option<&V> {
        self.values.get(&pos)
    }

    pub fn store_before(&self, pos: OpPos) -> Option<&Stores<S>> {
        self.stores_before.get(&pos)
    }

    pub fn store_after(&self, pos: OpPos) -> Option<&Stores<S>> {
        self.stores_after.get(&pos)
    }

    /// The stores right after each return node, in block order.
    pub fn return_stores(&self) -> &[(OpPos, S)] {
        &self.return_stores
    }

    pub fn regular_exit_store(&self) -> Option<&S> {
        self.regular_exit_store.as_ref()
    }

    pub fn exceptional_exit_store(&self) -> Option<&S> {
        self.exceptional_exit_store.as_ref()
    }

    /// Only set by backward analyses.
    pub fn entry_store(&self) -> Option<&S> {
        self.entry_store.as_ref()
    }

    /// Number of blocks processed before reaching the fixpoint.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Renders the graph with the input store of each block.
    pub fn visualize<Cfg, OpPrinter, StorePrinter>(
        &self,
        cfg: &Cfg,
        printer: OpPrinter,
        store_printer: StorePrinter,
    ) -> String
    where
        Cfg: ControlFlowGraph,
        OpPrinter: Fn(&OperationOf<Cfg>) -> String,
        StorePrinter: Fn(&S) -> String,
    {
        print_with_annotations(Some(cfg.name()), cfg, printer, |block| {
            self.block_input(block).map(|stores| match stores {
                Stores::Regular(store) => store_printer(store),
                Stores::Conditional {
                    then_store,
                    else_store,
                } => format!(
                    "then: {}\nelse: {}",
                    store_printer(then_store),
                    store_printer(else_store)
                ),
            })
        })
    }
}
