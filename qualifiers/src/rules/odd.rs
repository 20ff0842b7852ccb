use crate::error::QualifierError;
use crate::hierarchy::QualifierHierarchy;
use crate::hierarchy::enumerated::{self, EnumeratedHierarchy};
use crate::ir::{BinaryOp, Literal, UnaryOp};
use crate::qualifier::Qualifier;
use crate::rules::{Operand, RefinementRules};

/// Odd literals are odd, and oddness survives negation, multiplication by
/// an odd number and adding an even literal.
#[derive(Debug)]
pub struct OddRules {
    hierarchy: EnumeratedHierarchy<3>,
    odd: Qualifier,
}

impl Default for OddRules {
    fn default() -> Self {
        let hierarchy = enumerated::odd();
        let [_, odd, _] = hierarchy.qualifiers().clone();
        Self { hierarchy, odd }
    }
}

impl OddRules {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_odd(&self, operand: &Operand<'_>) -> bool {
        operand.qualifier == self.odd
    }

    fn is_even_literal(operand: &Operand<'_>) -> bool {
        operand.expr.int_literal().is_some_and(|value| value % 2 == 0)
    }
}

impl RefinementRules for OddRules {
    fn hierarchy(&self) -> &(dyn QualifierHierarchy + 'static) {
        &self.hierarchy
    }

    fn literal(&self, literal: &Literal) -> Qualifier {
        match literal {
            Literal::Int(value) if value % 2 != 0 => self.odd.clone(),
            _ => self.hierarchy.top(),
        }
    }

    fn unary(&self, op: UnaryOp, operand: Operand<'_>) -> Result<Qualifier, QualifierError> {
        Ok(match op {
            UnaryOp::Neg if self.is_odd(&operand) => self.odd.clone(),
            _ => self.hierarchy.top(),
        })
    }

    fn binary(
        &self,
        op: BinaryOp,
        lhs: Operand<'_>,
        rhs: Operand<'_>,
    ) -> Result<Qualifier, QualifierError> {
        let odd = match op {
            BinaryOp::Mul => self.is_odd(&lhs) && self.is_odd(&rhs),
            BinaryOp::Add | BinaryOp::Sub => {
                (self.is_odd(&lhs) && Self::is_even_literal(&rhs))
                    || (self.is_odd(&rhs) && Self::is_even_literal(&lhs))
            }
        };
        Ok(if odd {
            self.odd.clone()
        } else {
            self.hierarchy.top()
        })
    }
}
