use dataflow::FlowError;

use crate::error::QualifierError;
use crate::hierarchy::QualifierHierarchy;
use crate::hierarchy::enumerated::{self, EnumeratedHierarchy};
use crate::ir::{BinaryOp, CompareOp, Expr, Literal, UnaryOp};
use crate::qualifier::Qualifier;
use crate::rules::{Branches, Operand, RefinementRules, refine_equality};
use crate::store::Store;

/// `null` is the only nullable literal, new objects and arrays are never
/// null, and a successful dereference proves the receiver was not null.
/// Comparing against null refines the other operand in both branches.
#[derive(Debug)]
pub struct NullnessRules {
    hierarchy: EnumeratedHierarchy<4>,
    non_null: Qualifier,
    null: Qualifier,
}

impl Default for NullnessRules {
    fn default() -> Self {
        let hierarchy = enumerated::nullness();
        let [_, non_null, null, _] = hierarchy.qualifiers().clone();
        Self {
            hierarchy,
            non_null,
            null,
        }
    }
}

impl NullnessRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn non_null(&self) -> &Qualifier {
        &self.non_null
    }

    pub fn null(&self) -> &Qualifier {
        &self.null
    }
}

impl RefinementRules for NullnessRules {
    fn hierarchy(&self) -> &(dyn QualifierHierarchy + 'static) {
        &self.hierarchy
    }

    fn literal(&self, literal: &Literal) -> Qualifier {
        match literal {
            Literal::Null => self.null.clone(),
            _ => self.non_null.clone(),
        }
    }

    fn array_length(&self) -> Qualifier {
        self.non_null.clone()
    }

    fn new_object(&self) -> Qualifier {
        self.non_null.clone()
    }

    fn new_array(&self, _length: Operand<'_>) -> Result<Qualifier, QualifierError> {
        Ok(self.non_null.clone())
    }

    fn unary(&self, _op: UnaryOp, _operand: Operand<'_>) -> Result<Qualifier, QualifierError> {
        Ok(self.non_null.clone())
    }

    fn binary(
        &self,
        _op: BinaryOp,
        _lhs: Operand<'_>,
        _rhs: Operand<'_>,
    ) -> Result<Qualifier, QualifierError> {
        Ok(self.non_null.clone())
    }

    fn compare(
        &self,
        op: CompareOp,
        lhs: Operand<'_>,
        rhs: Operand<'_>,
        branches: &mut Branches,
    ) -> Result<(), FlowError> {
        refine_equality(&self.hierarchy, op, &lhs, &rhs, branches)?;
        let not_null_store = match op {
            CompareOp::Eq => &mut branches.else_store,
            CompareOp::Ne => &mut branches.then_store,
            _ => return Ok(()),
        };
        for (operand, other) in [(&lhs, &rhs), (&rhs, &lhs)] {
            if other.qualifier == self.null {
                not_null_store.insert_or_refine(
                    &self.hierarchy,
                    operand.expr,
                    self.non_null.clone().into(),
                )?;
            }
        }
        Ok(())
    }

    fn instance_of(&self, operand: &Expr, then_store: &mut Store) -> Result<(), FlowError> {
        then_store.insert_or_refine(&self.hierarchy, operand, self.non_null.clone().into())
    }

    fn dereferenced(&self) -> Option<Qualifier> {
        Some(self.non_null.clone())
    }
}
