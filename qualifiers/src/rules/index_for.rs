use dataflow::FlowError;

use crate::error::QualifierError;
use crate::hierarchy::QualifierHierarchy;
use crate::hierarchy::index_for::IndexForHierarchy;
use crate::ir::{BinaryOp, CompareOp, Expr};
use crate::qualifier::Qualifier;
use crate::rules::{
    Branches, Invalidation, Operand, RefinementRules, array_name, forget_names, refine_equality,
};
use crate::store::Store;

/// `i < a.length` makes `i` an index for `a` in the then branch,
/// `i >= a.length` in the else branch. Decrementing an index keeps it below
/// the length.
#[derive(Debug, Default)]
pub struct IndexForRules {
    hierarchy: IndexForHierarchy,
}

impl IndexForRules {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RefinementRules for IndexForRules {
    fn hierarchy(&self) -> &(dyn QualifierHierarchy + 'static) {
        &self.hierarchy
    }

    fn binary(
        &self,
        op: BinaryOp,
        lhs: Operand<'_>,
        rhs: Operand<'_>,
    ) -> Result<Qualifier, QualifierError> {
        let keeps_bound = match (op, rhs.expr.int_literal()) {
            (BinaryOp::Sub, Some(value)) => value >= 0,
            (BinaryOp::Add, Some(value)) => value <= 0,
            _ => false,
        };
        Ok(if keeps_bound {
            lhs.qualifier
        } else {
            self.hierarchy.top()
        })
    }

    fn compare(
        &self,
        op: CompareOp,
        lhs: Operand<'_>,
        rhs: Operand<'_>,
        branches: &mut Branches,
    ) -> Result<(), FlowError> {
        refine_equality(&self.hierarchy, op, &lhs, &rhs, branches)?;
        // Put the array length on the right.
        let (op, index, length) = match (lhs.expr.canonical(), rhs.expr.canonical()) {
            (_, Expr::ArrayLength(array)) => (op, &lhs, *array),
            (Expr::ArrayLength(array), _) => (op.flip(), &rhs, *array),
            _ => return Ok(()),
        };
        let Some(name) = array_name(&length) else {
            return Ok(());
        };
        let store = match op {
            CompareOp::Lt => &mut branches.then_store,
            CompareOp::Ge => &mut branches.else_store,
            _ => return Ok(()),
        };
        let refined = self.hierarchy.lt_length_of([name]);
        store.insert_or_refine(&self.hierarchy, index.expr, refined.into())
    }

    fn invalidate(&self, killed: Invalidation<'_>, store: &mut Store) -> Result<(), FlowError> {
        forget_names(store, killed, |rest| self.hierarchy.lt_length_of(rest));
        Ok(())
    }
}
