use dataflow::domains::{Finite, FiniteCtx, FiniteDomainError, JoinSemiLattice, Lattice};

use crate::error::QualifierError;
use crate::hierarchy::QualifierHierarchy;
use crate::qualifier::Qualifier;

pub const ODD_TOP: &str = "MaybeOdd";
pub const ODD: &str = "Odd";
pub const ODD_BOTTOM: &str = "OddBottom";

pub const NULLABLE: &str = "Nullable";
pub const NON_NULL: &str = "NonNull";
pub const NULL: &str = "Null";
pub const NULLNESS_BOTTOM: &str = "NullnessBottom";

pub const LOWER_BOUND_UNKNOWN: &str = "LowerBoundUnknown";
pub const GTE_NEGATIVE_ONE: &str = "GTENegativeOne";
pub const NON_NEGATIVE: &str = "NonNegative";
pub const POSITIVE: &str = "Positive";
pub const LOWER_BOUND_BOTTOM: &str = "LowerBoundBottom";

/// A hierarchy of qualifiers without arguments, given by its Hasse diagram.
/// The lattice operations run on the bit matrix encoding of [`FiniteCtx`].
#[derive(Debug)]
pub struct EnumeratedHierarchy<const N: usize> {
    name: &'static str,
    lattice: FiniteCtx<&'static str, N>,
    qualifiers: [Qualifier; N],
}

impl<const N: usize> EnumeratedHierarchy<N> {
    /// Top must be the first element and bottom the last one. The pairs in
    /// `less` are the edges of the Hasse diagram, the first element of each
    /// pair is the smaller one.
    pub fn new(
        name: &'static str,
        elements: [&'static str; N],
        less: &[(&'static str, &'static str)],
    ) -> Result<Self, FiniteDomainError> {
        let lattice = FiniteCtx::new(&elements, less)?;
        Ok(Self {
            name,
            lattice,
            qualifiers: elements.map(Qualifier::new),
        })
    }

    /// The qualifier with the given name. The returned handles are shared,
    /// every lattice operation returns one of them.
    pub fn qualifier(&self, name: &str) -> Option<&Qualifier> {
        self.qualifiers.iter().find(|q| q.name() == name)
    }

    pub fn qualifiers(&self) -> &[Qualifier; N] {
        &self.qualifiers
    }

    fn encode(&self, qualifier: &Qualifier) -> Result<Finite<&'static str, N>, QualifierError> {
        if qualifier.has_argument() {
            return Err(QualifierError::foreign(self.name, qualifier));
        }
        self.lattice
            .elements()
            .iter()
            .position(|e| *e == qualifier.name())
            .map(|idx| self.lattice.encode_idx(idx))
            .ok_or_else(|| QualifierError::foreign(self.name, qualifier))
    }

    fn decode(
        &self,
        element: &Finite<&'static str, N>,
        operation: &'static str,
        (a, b): (&Qualifier, &Qualifier),
    ) -> Result<Qualifier, QualifierError> {
        self.lattice
            .index_of(element)
            .map(|idx| self.qualifiers[idx].clone())
            .ok_or_else(|| QualifierError::Unresolvable {
                hierarchy: self.name,
                operation,
                left: a.to_string(),
                right: b.to_string(),
            })
    }
}

impl<const N: usize> QualifierHierarchy for EnumeratedHierarchy<N> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn top(&self) -> Qualifier {
        self.qualifiers[0].clone()
    }

    fn bottom(&self) -> Qualifier {
        self.qualifiers[N - 1].clone()
    }

    fn contains(&self, qualifier: &Qualifier) -> bool {
        self.encode(qualifier).is_ok()
    }

    fn is_subtype(&self, sub: &Qualifier, sup: &Qualifier) -> Result<bool, QualifierError> {
        let (sub, sup) = (self.encode(sub)?, self.encode(sup)?);
        // Comparing two encoded elements only fails for foreign elements.
        Ok(sub.is_leq(&sup, &self.lattice).unwrap_or(false))
    }

    fn least_upper_bound(&self, a: &Qualifier, b: &Qualifier) -> Result<Qualifier, QualifierError> {
        let (ea, eb) = (self.encode(a)?, self.encode(b)?);
        let unresolvable = || QualifierError::Unresolvable {
            hierarchy: self.name,
            operation: "least upper bound",
            left: a.to_string(),
            right: b.to_string(),
        };
        let joined = ea.join(&eb, &self.lattice).map_err(|_| unresolvable())?;
        self.decode(&joined, "least upper bound", (a, b))
    }

    fn greatest_lower_bound(
        &self,
        a: &Qualifier,
        b: &Qualifier,
    ) -> Result<Qualifier, QualifierError> {
        let (ea, eb) = (self.encode(a)?, self.encode(b)?);
        let met = self
            .lattice
            .meet(&ea, &eb)
            .ok_or_else(|| QualifierError::Unresolvable {
                hierarchy: self.name,
                operation: "greatest lower bound",
                left: a.to_string(),
                right: b.to_string(),
            })?;
        self.decode(&met, "greatest lower bound", (a, b))
    }
}

/// The smallest useful hierarchy: is an integer odd or not.
pub fn odd() -> EnumeratedHierarchy<3> {
    EnumeratedHierarchy::new(
        "odd",
        [ODD_TOP, ODD, ODD_BOTTOM],
        &[(ODD, ODD_TOP), (ODD_BOTTOM, ODD)],
    )
    .expect("the odd hierarchy is a lattice")
}

pub fn nullness() -> EnumeratedHierarchy<4> {
    EnumeratedHierarchy::new(
        "nullness",
        [NULLABLE, NON_NULL, NULL, NULLNESS_BOTTOM],
        &[
            (NON_NULL, NULLABLE),
            (NULL, NULLABLE),
            (NULLNESS_BOTTOM, NON_NULL),
            (NULLNESS_BOTTOM, NULL),
        ],
    )
    .expect("the nullness hierarchy is a lattice")
}

/// Lower bounds of integers, a chain from "anything" to "at least one".
pub fn lower_bound() -> EnumeratedHierarchy<5> {
    EnumeratedHierarchy::new(
        "lower bound",
        [
            LOWER_BOUND_UNKNOWN,
            GTE_NEGATIVE_ONE,
            NON_NEGATIVE,
            POSITIVE,
            LOWER_BOUND_BOTTOM,
        ],
        &[
            (GTE_NEGATIVE_ONE, LOWER_BOUND_UNKNOWN),
            (NON_NEGATIVE, GTE_NEGATIVE_ONE),
            (POSITIVE, NON_NEGATIVE),
            (LOWER_BOUND_BOTTOM, POSITIVE),
        ],
    )
    .expect("the lower bound hierarchy is a lattice")
}
