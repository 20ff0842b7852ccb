use dataflow::FlowError;

use crate::error::QualifierError;
use crate::hierarchy::QualifierHierarchy;
use crate::hierarchy::int_range::IntRangeHierarchy;
use crate::ir::{BinaryOp, CompareOp, Literal, UnaryOp};
use crate::qualifier::{IntRange, Qualifier};
use crate::rules::{Branches, Operand, RefinementRules, refine_equality};
use crate::store::Store;

/// Interval arithmetic on integer ranges. Results that do not fit in 64 bits
/// are unknown.
#[derive(Debug, Default)]
pub struct IntRangeRules {
    hierarchy: IntRangeHierarchy,
}

fn negate(range: IntRange) -> Option<IntRange> {
    Some(IntRange::new(range.to.checked_neg()?, range.from.checked_neg()?))
}

fn arithmetic(op: BinaryOp, a: IntRange, b: IntRange) -> Option<IntRange> {
    match op {
        BinaryOp::Add => Some(IntRange::new(
            a.from.checked_add(b.from)?,
            a.to.checked_add(b.to)?,
        )),
        BinaryOp::Sub => Some(IntRange::new(
            a.from.checked_sub(b.to)?,
            a.to.checked_sub(b.from)?,
        )),
        BinaryOp::Mul => {
            let products = [
                a.from.checked_mul(b.from)?,
                a.from.checked_mul(b.to)?,
                a.to.checked_mul(b.from)?,
                a.to.checked_mul(b.to)?,
            ];
            let from = products.iter().copied().min()?;
            let to = products.iter().copied().max()?;
            Some(IntRange::new(from, to))
        }
    }
}

/// The ranges of `a` and `b` knowing `a < b`, or `a <= b` when `strict` is
/// not set.
fn below(a: IntRange, b: IntRange, strict: bool) -> (Option<IntRange>, Option<IntRange>) {
    let gap = i64::from(strict);
    let a_to = a.to.min(b.to.saturating_sub(gap));
    let b_from = b.from.max(a.from.saturating_add(gap));
    (
        (a.from <= a_to).then_some(IntRange::new(a.from, a_to)),
        (b_from <= b.to).then_some(IntRange::new(b_from, b.to)),
    )
}

/// The range of an operand known to differ from `value`.
fn exclude(range: IntRange, value: i64) -> Option<IntRange> {
    match (range.from == value, range.to == value) {
        (true, true) => None,
        (true, false) => Some(IntRange::new(value + 1, range.to)),
        (false, true) => Some(IntRange::new(range.from, value - 1)),
        (false, false) => Some(range),
    }
}

impl IntRangeRules {
    pub fn new() -> Self {
        Self::default()
    }

    fn qualifier(&self, range: Option<IntRange>) -> Qualifier {
        self.hierarchy.from_range(range)
    }

    fn refine(
        &self,
        store: &mut Store,
        operand: &Operand<'_>,
        range: Option<IntRange>,
    ) -> Result<(), FlowError> {
        store.insert_or_refine(&self.hierarchy, operand.expr, self.qualifier(range).into())
    }

    fn refine_not_equal(
        &self,
        store: &mut Store,
        lhs: &Operand<'_>,
        rhs: &Operand<'_>,
    ) -> Result<(), FlowError> {
        for (operand, other) in [(lhs, rhs), (rhs, lhs)] {
            let (Some(range), Some(constant)) = (
                self.hierarchy.range_of(&operand.qualifier)?,
                self.hierarchy.range_of(&other.qualifier)?,
            ) else {
                continue;
            };
            if constant.from == constant.to {
                self.refine(store, operand, exclude(range, constant.from))?;
            }
        }
        Ok(())
    }
}

impl RefinementRules for IntRangeRules {
    fn hierarchy(&self) -> &(dyn QualifierHierarchy + 'static) {
        &self.hierarchy
    }

    fn literal(&self, literal: &Literal) -> Qualifier {
        match literal {
            Literal::Int(value) => self.qualifier(Some(IntRange::constant(*value))),
            _ => self.hierarchy.top(),
        }
    }

    fn array_length(&self) -> Qualifier {
        self.qualifier(Some(IntRange::new(0, i32::MAX as i64)))
    }

    fn unary(&self, op: UnaryOp, operand: Operand<'_>) -> Result<Qualifier, QualifierError> {
        let Some(range) = self.hierarchy.range_of(&operand.qualifier)? else {
            return Ok(self.hierarchy.bottom());
        };
        Ok(match op {
            UnaryOp::Neg => self.qualifier(Some(negate(range).unwrap_or(IntRange::EVERYTHING))),
            UnaryOp::Not => self.hierarchy.top(),
        })
    }

    fn binary(
        &self,
        op: BinaryOp,
        lhs: Operand<'_>,
        rhs: Operand<'_>,
    ) -> Result<Qualifier, QualifierError> {
        let (Some(a), Some(b)) = (
            self.hierarchy.range_of(&lhs.qualifier)?,
            self.hierarchy.range_of(&rhs.qualifier)?,
        ) else {
            return Ok(self.hierarchy.bottom());
        };
        let result = arithmetic(op, a, b).unwrap_or(IntRange::EVERYTHING);
        Ok(self.qualifier(Some(result)))
    }

    fn compare(
        &self,
        op: CompareOp,
        lhs: Operand<'_>,
        rhs: Operand<'_>,
        branches: &mut Branches,
    ) -> Result<(), FlowError> {
        refine_equality(&self.hierarchy, op, &lhs, &rhs, branches)?;
        let Branches {
            then_store,
            else_store,
        } = branches;
        // Bring the comparison to the form `small < big` or `small <= big`.
        let (op, small, big) = match op {
            CompareOp::Eq => return self.refine_not_equal(else_store, &lhs, &rhs),
            CompareOp::Ne => return self.refine_not_equal(then_store, &lhs, &rhs),
            CompareOp::Lt | CompareOp::Le => (op, lhs, rhs),
            CompareOp::Gt | CompareOp::Ge => (op.flip(), rhs, lhs),
        };
        let (Some(a), Some(b)) = (
            self.hierarchy.range_of(&small.qualifier)?,
            self.hierarchy.range_of(&big.qualifier)?,
        ) else {
            return Ok(());
        };
        let strict = op == CompareOp::Lt;
        let (small_then, big_then) = below(a, b, strict);
        self.refine(then_store, &small, small_then)?;
        self.refine(then_store, &big, big_then)?;
        // The negation swaps the roles: `small >= big` is `big <= small`.
        let (big_else, small_else) = below(b, a, !strict);
        self.refine(else_store, &small, small_else)?;
        self.refine(else_store, &big, big_else)
    }
}
