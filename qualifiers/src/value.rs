use core::fmt;

use dataflow::FlowError;
use dataflow::domains::{JoinSemiLattice, Lattice};

use crate::hierarchy::QualifierHierarchy;
use crate::qualifier::Qualifier;

/// The qualifier believed to hold for an expression at a program point.
/// Equality is decided by the qualifier, not by where the value came from.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AbstractValue {
    qualifier: Qualifier,
}

impl AbstractValue {
    pub fn new(qualifier: Qualifier) -> Self {
        Self { qualifier }
    }

    pub fn qualifier(&self) -> &Qualifier {
        &self.qualifier
    }

    /// The more specific of the two values.
    pub fn most_specific(
        &self,
        other: &AbstractValue,
        hierarchy: &dyn QualifierHierarchy,
    ) -> Result<AbstractValue, FlowError> {
        Ok(hierarchy
            .greatest_lower_bound(&self.qualifier, &other.qualifier)?
            .into())
    }
}

impl From<Qualifier> for AbstractValue {
    fn from(qualifier: Qualifier) -> Self {
        Self::new(qualifier)
    }
}

impl fmt::Debug for AbstractValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualifier)
    }
}

impl fmt::Display for AbstractValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualifier)
    }
}

impl JoinSemiLattice for AbstractValue {
    type LatticeContext = dyn QualifierHierarchy;

    fn join(&self, other: &Self, ctx: &Self::LatticeContext) -> Result<Self, FlowError> {
        Ok(ctx.least_upper_bound(&self.qualifier, &other.qualifier)?.into())
    }

    fn widen(
        &self,
        previous: &Self,
        ctx: &Self::LatticeContext,
        _iteration: usize,
    ) -> Result<Self, FlowError> {
        Ok(ctx
            .widened_upper_bound(&self.qualifier, &previous.qualifier)?
            .into())
    }
}

impl Lattice for AbstractValue {
    fn top(ctx: &Self::LatticeContext) -> Self {
        ctx.top().into()
    }

    fn bottom(ctx: &Self::LatticeContext) -> Self {
        ctx.bottom().into()
    }

    fn meet(&self, other: &Self, ctx: &Self::LatticeContext) -> Result<Self, FlowError> {
        Ok(ctx
            .greatest_lower_bound(&self.qualifier, &other.qualifier)?
            .into())
    }

    fn is_leq(&self, other: &Self, ctx: &Self::LatticeContext) -> Result<bool, FlowError> {
        Ok(ctx.is_subtype(&self.qualifier, &other.qualifier)?)
    }
}
