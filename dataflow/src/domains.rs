use core::fmt::Debug;
use core::ops::{Deref, DerefMut};
use std::collections::BTreeSet;

use crate::error::FlowError;

/////////////////////////
// Traits for domains. //
/////////////////////////

/// A join semi-lattice is a partially ordered set where the least upper
/// bound exists for every pair of elements. The ordering relation reads as
/// "safe approximation": for a qualifier store, a store that knows fewer
/// facts approximates one that knows more. Top is the largest approximation.
///
/// Unlike textbook lattices, the operations are fallible. Lattices whose
/// elements are created by a plug-in (e.g. a qualifier hierarchy) can be
/// handed an element that does not belong to them, and that is a framework bug
/// the solver needs to report instead of silently producing garbage.
pub trait JoinSemiLattice: Eq + Clone + Debug {
    /// A type to hold some information about the lattice on the side.
    ///
    /// Qualifier stores keep the qualifier hierarchy here, finite lattices
    /// their encoding tables. Use unit when no such data is needed.
    type LatticeContext: ?Sized;

    /// Given two elements of the lattice the join operation will compute a
    /// precise and safe over approximation of its arguments. The solver
    /// uses it at merge points where the program location after the branching
    /// needs to over approximate all predecessors.
    ///
    /// Requirements:
    /// * Reflexive: a.join(a, ctx) == a
    /// * Commutative: a.join(b, ctx) == b.join(a, ctx)
    /// * Upper bound: a.join(b, ctx) >= a and a.join(b, ctx) >= b
    fn join(&self, other: &Self, ctx: &Self::LatticeContext) -> Result<Self, FlowError>;

    /// In case a lattice has infinite (or very long) ascending chains,
    /// the widening operation can ensure convergence. The solver calls
    /// `new.widen(previous, ..)` instead of `new.join(previous, ..)` once a
    /// block was visited often enough. The iteration count is the number of
    /// visits of the block, which lets implementations widen in tiers.
    ///
    /// Requirements:
    /// * The result is an upper bound of both arguments.
    /// * Every ascending chain built by repeated widening stabilizes.
    fn widen(
        &self,
        previous: &Self,
        ctx: &Self::LatticeContext,
        _iteration: usize,
    ) -> Result<Self, FlowError> {
        self.join(previous, ctx)
    }
}

/// A lattice is a join semi-lattice that is also a meet semi-lattice, i.e.,
/// the greatest lower bound (meet) also exists for all pairs, and has both a
/// top and a bottom element.
pub trait Lattice: JoinSemiLattice {
    /// The unit element of the meet operation, the largest element.
    fn top(ctx: &Self::LatticeContext) -> Self;

    /// The unit element of the join operation, the smallest element. Bottom
    /// values in the analysis result often stand for infeasible states.
    fn bottom(ctx: &Self::LatticeContext) -> Self;

    /// Computes the greatest lower bound. This is usually useful to exclude
    /// infeasible program states, e.g., when evaluating conditions.
    ///
    /// * Reflexive: a.meet(a, ctx) == a
    /// * Commutative: a.meet(b, ctx) == b.meet(a, ctx)
    /// * Top is unit: top.meet(b, ctx) == b
    /// * Lower bound: a.meet(b, ctx) <= a and a.meet(b, ctx) <= b
    fn meet(&self, other: &Self, ctx: &Self::LatticeContext) -> Result<Self, FlowError>;

    /// The partial order of the lattice.
    fn is_leq(&self, other: &Self, ctx: &Self::LatticeContext) -> Result<bool, FlowError>;
}

/////////////////////////////////////
// Concrete domain implementations //
/////////////////////////////////////

/// In the power set lattice, the empty set is bottom and union is join.
/// The elements are kept ordered so that printing and comparing stores is
/// deterministic across runs. Backward analyses like live variables use it
/// directly as their store.
#[derive(PartialEq, Eq, Clone, Default, Hash)]
pub struct PowerSet<T: Ord>(pub BTreeSet<T>);

impl<T: Ord> Deref for PowerSet<T> {
    type Target = BTreeSet<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: Ord> DerefMut for PowerSet<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<T: Ord> FromIterator<T> for PowerSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<T: Ord + Debug> Debug for PowerSet<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let elements: Vec<String> = self.iter().map(|x| format!("{x:?}")).collect();
        write!(f, "{{{}}}", elements.join(", "))
    }
}

impl<T: Ord + Debug + Clone> JoinSemiLattice for PowerSet<T> {
    type LatticeContext = ();

    fn join(&self, other: &Self, _ctx: &Self::LatticeContext) -> Result<Self, FlowError> {
        Ok(Self(self.union(other).cloned().collect()))
    }
}

mod finite;
pub use finite::*;
