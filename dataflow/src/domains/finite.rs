use core::array;
use core::marker::PhantomData;

use crate::domains::*;

use fixedbitset::FixedBitSet;

/// Hold the auxiliary information for a finite lattice encoding partially based on:
/// ```txt
///   H. Ait-Kaci, R. Boyer, P. Lincoln, R. Nasr. Efficient implementation of
///   lattice operations. In ACM Transactions on Programming Languages and
///   Systems (TOPLAS), Volume 11, Issue 1, Jan. 1989, pages 115-146.
/// ```
#[derive(Debug, Clone)]
pub struct FiniteCtx<T: Clone + Eq, const N: usize> {
    elements: [T; N],
    smaller_matrix: [FixedBitSet; N],
    greater_matrix: [FixedBitSet; N],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiniteDomainError {
    NoLeastUpperBound(usize, usize),
    NoGreatestLowerBound(usize, usize),
    TopNotFirst,
    BottomNotLast,
    LatticeTooSmall,
    HasDuplicateElements,
    NonExistentEdge,
}

impl core::fmt::Display for FiniteDomainError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for FiniteDomainError {}

impl<T: Clone + Debug + Eq, const N: usize> FiniteCtx<T, N> {
    /// Similar to [`FiniteCtx::new`], but edges are defined by indices into the first parameter.
    pub fn new_idx(elements: &[T; N], less: &[(usize, usize)]) -> Result<Self, FiniteDomainError> {
        if elements.len() < 2 {
            return Err(FiniteDomainError::LatticeTooSmall);
        }

        if (1..elements.len()).any(|i| elements[i..].contains(&elements[i - 1])) {
            return Err(FiniteDomainError::HasDuplicateElements);
        }

        for &(x, y) in less {
            if x >= elements.len() || y >= elements.len() {
                return Err(FiniteDomainError::NonExistentEdge);
            }
        }

        let mut result = Self {
            elements: elements.clone(),
            smaller_matrix: array::from_fn(|_| FixedBitSet::with_capacity(N)),
            greater_matrix: array::from_fn(|_| FixedBitSet::with_capacity(N)),
        };

        edge_list_to_matrix(&mut result.smaller_matrix, less);
        reflexive_closure(&mut result.smaller_matrix);
        transitive_closure(&mut result.smaller_matrix);
        transpose(&result.smaller_matrix, &mut result.greater_matrix);

        result.is_lattice()?;
        if result.smaller_matrix[0] != Finite::<T, N>::top_row() {
            return Err(FiniteDomainError::TopNotFirst);
        }
        if result.smaller_matrix[N - 1] != Finite::<T, N>::bottom_row() {
            return Err(FiniteDomainError::BottomNotLast);
        }

        Ok(result)
    }

    /// Creating a lattice based on the Hasse diagram:
    ///
    /// ```txt
    ///      A
    ///     / \
    ///    B   C
    ///     \ /
    ///      D
    /// ```
    ///
    /// Would be encoded as:
    /// ```
    /// use dataflow::domains::FiniteCtx;
    /// #[derive(Debug, Clone, PartialEq, Eq)]
    /// enum E { A, B, C, D }
    /// use E::*;
    /// let ctx = FiniteCtx::new(
    ///   &[A, B, C, D],
    ///   &[(B, A), (C, A), (D, B), (D, C)]).unwrap();
    /// ```
    ///
    /// Top must be the first, Bottom must be the last element.
    ///
    /// Returns an error when the input diagram is not a lattice.
    ///
    /// # Parameters
    ///
    /// * `elements`: List of lattice elements
    /// * `less`: pairs of elements, the first element is smaller than the second.
    pub fn new(elements: &[T; N], less: &[(T, T)]) -> Result<Self, FiniteDomainError> {
        let mut less_indices = Vec::with_capacity(less.len());

        for (x, y) in less {
            let Some(from) = elements.iter().position(|i| i == x) else {
                return Err(FiniteDomainError::NonExistentEdge);
            };
            let Some(to) = elements.iter().position(|i| i == y) else {
                return Err(FiniteDomainError::NonExistentEdge);
            };

            less_indices.push((from, to));
        }

        Self::new_idx(elements, &less_indices)
    }

    pub fn elements(&self) -> &[T; N] {
        &self.elements
    }

    pub fn decode(&self, element: &Finite<T, N>) -> Option<&T> {
        self.index_of(element).map(|pos| &self.elements[pos])
    }

    pub fn encode(&self, element: &T) -> Option<Finite<T, N>> {
        let pos = self.elements.iter().position(|e| e == element)?;
        Some(self.encode_idx(pos))
    }

    pub fn encode_idx(&self, pos: usize) -> Finite<T, N> {
        Finite {
            smaller_than: self.smaller_matrix[pos].clone(),
            phantom: PhantomData,
        }
    }

    /// Position of the element in the list the context was created from.
    pub fn index_of(&self, element: &Finite<T, N>) -> Option<usize> {
        self.smaller_matrix
            .iter()
            .position(|r| *r == element.smaller_than)
    }

    pub fn meet(&self, lhs: &Finite<T, N>, rhs: &Finite<T, N>) -> Option<Finite<T, N>> {
        let (lhs_idx, rhs_idx) = (self.index_of(lhs)?, self.index_of(rhs)?);
        let mut column = self.greater_matrix[lhs_idx].clone();
        column.intersect_with(&self.greater_matrix[rhs_idx]);
        let column_idx = self.greater_matrix.iter().position(|r| *r == column)?;
        Some(self.encode_idx(column_idx))
    }

    fn is_lattice(&self) -> Result<(), FiniteDomainError> {
        for i in 0..N {
            for j in (i + 1)..N {
                let mut lub = self.smaller_matrix[i].clone();
                lub.intersect_with(&self.smaller_matrix[j]);
                if !self.smaller_matrix.iter().any(|r| *r == lub) {
                    return Err(FiniteDomainError::NoLeastUpperBound(i, j));
                }
                let mut glb = self.greater_matrix[i].clone();
                glb.intersect_with(&self.greater_matrix[j]);
                if !self.greater_matrix.iter().any(|r| *r == glb) {
                    return Err(FiniteDomainError::NoGreatestLowerBound(i, j));
                }
            }
        }
        Ok(())
    }
}

/// Use [`FiniteCtx`] to generate the encoded lattice elements
/// and [`FiniteCtx::decode`] to get the actual element. The
/// algorithms are running on the encoded representation, the result needs
/// to be decoded. The encoding is really efficient up to 64 elements,
/// the join operation is cheaper than meet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Finite<T: Clone + Eq, const N: usize> {
    smaller_than: FixedBitSet,
    phantom: PhantomData<T>,
}

impl<T: Clone + Eq, const N: usize> Finite<T, N> {
    fn top_row() -> FixedBitSet {
        let mut smaller_than = FixedBitSet::with_capacity(N);
        smaller_than.insert(0);
        smaller_than
    }

    fn bottom_row() -> FixedBitSet {
        let mut smaller_than = FixedBitSet::with_capacity(N);
        smaller_than.insert_range(..);
        smaller_than
    }
}

impl<T: Clone + Debug + Eq, const N: usize> JoinSemiLattice for Finite<T, N> {
    type LatticeContext = FiniteCtx<T, N>;

    fn join(&self, other: &Self, _: &Self::LatticeContext) -> Result<Self, FlowError> {
        let mut smaller_than = self.smaller_than.clone();
        smaller_than.intersect_with(&other.smaller_than);
        Ok(Self {
            smaller_than,
            phantom: PhantomData,
        })
    }
}

impl<T: Clone + Debug + Eq, const N: usize> Lattice for Finite<T, N> {
    fn top(_: &Self::LatticeContext) -> Self {
        Self {
            smaller_than: Self::top_row(),
            phantom: PhantomData,
        }
    }

    fn bottom(_: &Self::LatticeContext) -> Self {
        Self {
            smaller_than: Self::bottom_row(),
            phantom: PhantomData,
        }
    }

    fn meet(&self, other: &Self, ctx: &Self::LatticeContext) -> Result<Self, FlowError> {
        ctx.meet(self, other).ok_or_else(|| {
            FlowError::lattice(
                "finite",
                format!("no greatest lower bound for {self:?} and {other:?}"),
            )
        })
    }

    fn is_leq(&self, other: &Self, _: &Self::LatticeContext) -> Result<bool, FlowError> {
        // Every element other is smaller than, self is smaller than too.
        Ok(self.smaller_than.is_superset(&other.smaller_than))
    }
}

fn edge_list_to_matrix<const N: usize>(empty: &mut [FixedBitSet; N], edges: &[(usize, usize)]) {
    for &(from, to) in edges {
        empty[from].insert(to);
    }
}

fn reflexive_closure<const N: usize>(bool_matrix: &mut [FixedBitSet; N]) {
    for (i, item) in bool_matrix.iter_mut().enumerate() {
        item.insert(i);
    }
}

fn transitive_closure<const N: usize>(bool_matrix: &mut [FixedBitSet; N]) {
    // Warshall's algorithm.
    for k in 0..N {
        for i in 0..N {
            if bool_matrix[i].contains(k) {
                let row_k = bool_matrix[k].clone();
                bool_matrix[i].union_with(&row_k);
            }
        }
    }
}

fn transpose<const N: usize>(from: &[FixedBitSet; N], to: &mut [FixedBitSet; N]) {
    #[allow(clippy::needless_range_loop)]
    for i in 0..N {
        for j in 0..N {
            to[j].set(i, from[i].contains(j));
        }
    }
}
