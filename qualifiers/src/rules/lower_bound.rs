use dataflow::FlowError;

use crate::error::QualifierError;
use crate::hierarchy::QualifierHierarchy;
use crate::hierarchy::enumerated::{self, EnumeratedHierarchy};
use crate::ir::{BinaryOp, CompareOp, Literal, UnaryOp};
use crate::qualifier::Qualifier;
use crate::rules::{Branches, Operand, RefinementRules, refine_equality};
use crate::store::Store;

/// What a lower bound qualifier says about the value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Bound {
    Unknown,
    AtLeast(i64),
    Bottom,
}

/// Lower bounds of integers: arithmetic on known bounds and refinement by
/// relational comparisons.
#[derive(Debug)]
pub struct LowerBoundRules {
    hierarchy: EnumeratedHierarchy<5>,
}

impl Default for LowerBoundRules {
    fn default() -> Self {
        Self {
            hierarchy: enumerated::lower_bound(),
        }
    }
}

impl LowerBoundRules {
    pub fn new() -> Self {
        Self::default()
    }

    fn bound(&self, qualifier: &Qualifier) -> Result<Bound, QualifierError> {
        let idx = self
            .hierarchy
            .qualifiers()
            .iter()
            .position(|q| q == qualifier)
            .ok_or_else(|| QualifierError::foreign(self.hierarchy.name(), qualifier))?;
        Ok(match idx {
            0 => Bound::Unknown,
            1 => Bound::AtLeast(-1),
            2 => Bound::AtLeast(0),
            3 => Bound::AtLeast(1),
            _ => Bound::Bottom,
        })
    }

    /// The most precise qualifier for values of at least `bound`.
    fn qualifier(&self, bound: Bound) -> Qualifier {
        let idx = match bound {
            Bound::Unknown => 0,
            Bound::AtLeast(n) if n >= 1 => 3,
            Bound::AtLeast(0) => 2,
            Bound::AtLeast(-1) => 1,
            Bound::AtLeast(_) => 0,
            Bound::Bottom => 4,
        };
        self.hierarchy.qualifiers()[idx].clone()
    }

    /// `left > right`: left is at least one more than the lower bound of
    /// right.
    fn refine_gt(
        &self,
        store: &mut Store,
        left: &Operand<'_>,
        right: &Operand<'_>,
    ) -> Result<(), FlowError> {
        if let Bound::AtLeast(n) = self.bound(&right.qualifier)? {
            let refined = self.qualifier(Bound::AtLeast(n.saturating_add(1)));
            store.insert_or_refine(&self.hierarchy, left.expr, refined.into())?;
        }
        Ok(())
    }

    /// `left >= right`: left has at least the lower bound of right.
    fn refine_gte(
        &self,
        store: &mut Store,
        left: &Operand<'_>,
        right: &Operand<'_>,
    ) -> Result<(), FlowError> {
        store.insert_or_refine(&self.hierarchy, left.expr, right.qualifier.clone().into())
    }

    /// `left != right`: excluding the lower bound itself raises it by one.
    fn refine_not_equal(
        &self,
        store: &mut Store,
        left: &Operand<'_>,
        right: &Operand<'_>,
    ) -> Result<(), FlowError> {
        for (operand, other) in [(left, right), (right, left)] {
            let Some(value) = other.expr.int_literal() else {
                continue;
            };
            if self.bound(&operand.qualifier)? == Bound::AtLeast(value) {
                let raised = self.qualifier(Bound::AtLeast(value.saturating_add(1)));
                store.insert_or_refine(&self.hierarchy, operand.expr, raised.into())?;
            }
        }
        Ok(())
    }

    /// Refine the operands in a store where `left op right` holds.
    fn refine_relation(
        &self,
        store: &mut Store,
        op: CompareOp,
        left: &Operand<'_>,
        right: &Operand<'_>,
    ) -> Result<(), FlowError> {
        match op {
            CompareOp::Gt => self.refine_gt(store, left, right),
            CompareOp::Ge => self.refine_gte(store, left, right),
            CompareOp::Lt => self.refine_gt(store, right, left),
            CompareOp::Le => self.refine_gte(store, right, left),
            CompareOp::Ne => self.refine_not_equal(store, left, right),
            // Covered by the equality refinement.
            CompareOp::Eq => Ok(()),
        }
    }
}

impl RefinementRules for LowerBoundRules {
    fn hierarchy(&self) -> &(dyn QualifierHierarchy + 'static) {
        &self.hierarchy
    }

    fn literal(&self, literal: &Literal) -> Qualifier {
        match literal {
            Literal::Int(value) => self.qualifier(Bound::AtLeast(*value)),
            _ => self.hierarchy.top(),
        }
    }

    fn array_length(&self) -> Qualifier {
        self.qualifier(Bound::AtLeast(0))
    }

    fn unary(&self, op: UnaryOp, operand: Operand<'_>) -> Result<Qualifier, QualifierError> {
        Ok(match (op, operand.expr.int_literal()) {
            (UnaryOp::Neg, Some(value)) => self.qualifier(Bound::AtLeast(value.saturating_neg())),
            _ => self.hierarchy.top(),
        })
    }

    fn binary(
        &self,
        op: BinaryOp,
        lhs: Operand<'_>,
        rhs: Operand<'_>,
    ) -> Result<Qualifier, QualifierError> {
        let (left, right) = (self.bound(&lhs.qualifier)?, self.bound(&rhs.qualifier)?);
        let result = match (op, left, right) {
            (_, Bound::Bottom, _) | (_, _, Bound::Bottom) => Bound::Bottom,
            (BinaryOp::Add, Bound::AtLeast(a), Bound::AtLeast(b)) => {
                Bound::AtLeast(a.saturating_add(b))
            }
            (BinaryOp::Sub, Bound::AtLeast(a), _) => match rhs.expr.int_literal() {
                Some(value) => Bound::AtLeast(a.saturating_sub(value)),
                None => Bound::Unknown,
            },
            (BinaryOp::Mul, Bound::AtLeast(a), Bound::AtLeast(b)) if a >= 0 && b >= 0 => {
                Bound::AtLeast(a.saturating_mul(b))
            }
            _ => Bound::Unknown,
        };
        Ok(self.qualifier(result))
    }

    fn compare(
        &self,
        op: CompareOp,
        lhs: Operand<'_>,
        rhs: Operand<'_>,
        branches: &mut Branches,
    ) -> Result<(), FlowError> {
        refine_equality(&self.hierarchy, op, &lhs, &rhs, branches)?;
        self.refine_relation(&mut branches.then_store, op, &lhs, &rhs)?;
        self.refine_relation(&mut branches.else_store, op.negate(), &lhs, &rhs)
    }
}
