use dataflow::cfg::{ControlFlowGraph, OpPos};
use dataflow::{FlowError, InternalError};

use crate::declarations::Declarations;
use crate::error::TypeError;
use crate::ir::{Cfg, Expr, Node};
use crate::qualifier::Qualifier;
use crate::rules::RefinementRules;
use crate::runner::QualifierResult;
use crate::store::Store;
use crate::transfer::refined_qualifier;

/// What the checks need to know about an analyzed unit.
pub struct Checker<'a> {
    pub cfg: &'a Cfg,
    pub rules: &'a dyn RefinementRules,
    pub declarations: &'a Declarations,
    pub result: &'a QualifierResult,
}

impl Checker<'_> {
    fn compare(
        &self,
        pos: OpPos,
        store: &Store,
        expr: &Expr,
        required: &Qualifier,
    ) -> Result<Option<TypeError>, InternalError> {
        let found = refined_qualifier(self.rules, self.declarations, self.cfg, store, expr);
        let hierarchy = self.rules.hierarchy();
        let satisfied = hierarchy
            .is_subtype(&found, required)
            .map_err(|err| FlowError::from(err).at(self.cfg.name(), Some(pos.block_id)))?;
        if satisfied {
            return Ok(None);
        }
        Ok(Some(TypeError {
            unit: self.cfg.name().to_owned(),
            pos,
            expression: expr.to_string(),
            required: required.to_string(),
            found: found.to_string(),
        }))
    }

    /// Whether `expr` has (a subtype of) `required` right before the node at
    /// `pos`. Unreachable nodes satisfy every requirement.
    pub fn check_requirement(
        &self,
        pos: OpPos,
        expr: &Expr,
        required: &Qualifier,
    ) -> Result<Option<TypeError>, InternalError> {
        let Some(stores) = self.result.store_before(pos) else {
            return Ok(None);
        };
        let store = stores
            .regular(self.rules.hierarchy())
            .map_err(|err| err.at(self.cfg.name(), Some(pos.block_id)))?;
        self.compare(pos, &store, expr, required)
    }

    /// Check every returned value against the declared return qualifier of
    /// the unit.
    pub fn check_returns(&self) -> Result<Vec<TypeError>, InternalError> {
        let Some(required) = self
            .declarations
            .contract(self.cfg.name())
            .and_then(|contract| contract.returns.as_ref())
        else {
            return Ok(Vec::new());
        };
        let mut errors = Vec::new();
        for (pos, store) in self.result.return_stores() {
            if let Some(Node::Return { value: Some(value) }) = self.cfg.node(*pos) {
                errors.extend(self.compare(*pos, store, value, required)?);
            }
        }
        Ok(errors)
    }
}
