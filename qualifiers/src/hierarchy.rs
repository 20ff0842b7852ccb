use core::fmt::Debug;
use std::collections::BTreeSet;

use crate::error::QualifierError;
use crate::qualifier::Qualifier;

/// A qualifier system: a bounded lattice of qualifiers. Hierarchies are built
/// once and only queried afterwards, possibly from many threads at once.
///
/// All operations fail with [`QualifierError`] when they get a qualifier that
/// is not part of the hierarchy.
pub trait QualifierHierarchy: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    fn top(&self) -> Qualifier;

    fn bottom(&self) -> Qualifier;

    /// Whether `qualifier` is an element of this hierarchy.
    fn contains(&self, qualifier: &Qualifier) -> bool;

    fn is_subtype(&self, sub: &Qualifier, sup: &Qualifier) -> Result<bool, QualifierError>;

    fn least_upper_bound(&self, a: &Qualifier, b: &Qualifier) -> Result<Qualifier, QualifierError>;

    fn greatest_lower_bound(
        &self,
        a: &Qualifier,
        b: &Qualifier,
    ) -> Result<Qualifier, QualifierError>;

    /// An upper bound of `new` and `previous` that guarantees termination
    /// when applied repeatedly. Hierarchies without infinite ascending chains
    /// can keep the default.
    fn widened_upper_bound(
        &self,
        new: &Qualifier,
        previous: &Qualifier,
    ) -> Result<Qualifier, QualifierError> {
        self.least_upper_bound(new, previous)
    }

    /// Number of stores a block may receive before the solver starts to
    /// widen. `None` for hierarchies that never need widening.
    fn iterations_before_widening(&self) -> Option<usize> {
        None
    }

    /// Check a declared qualifier. `in_scope` has the names of the variables
    /// the qualifier may refer to.
    fn validate(&self, qualifier: &Qualifier, _in_scope: &BTreeSet<String>) -> Result<(), String> {
        if self.contains(qualifier) {
            Ok(())
        } else {
            Err(format!("not a qualifier of the {} hierarchy", self.name()))
        }
    }

    fn is_top(&self, qualifier: &Qualifier) -> bool {
        *qualifier == self.top()
    }

    fn is_bottom(&self, qualifier: &Qualifier) -> bool {
        *qualifier == self.bottom()
    }
}

/// Validation shared by the hierarchies whose qualifiers name arrays.
fn validate_names(
    hierarchy: &dyn QualifierHierarchy,
    qualifier: &Qualifier,
    in_scope: &BTreeSet<String>,
) -> Result<(), String> {
    if !hierarchy.contains(qualifier) {
        return Err(format!("not a qualifier of the {} hierarchy", hierarchy.name()));
    }
    if let Ok(names) = qualifier.names() {
        if let Some(missing) = names.iter().find(|n| !in_scope.contains(*n)) {
            return Err(format!("`{missing}` is not in scope"));
        }
    }
    Ok(())
}

pub mod conversion;
pub mod enumerated;
pub mod index_for;
pub mod int_range;
pub mod same_len;

pub use conversion::ConversionHierarchy;
pub use enumerated::EnumeratedHierarchy;
pub use index_for::IndexForHierarchy;
pub use int_range::IntRangeHierarchy;
pub use same_len::SameLenHierarchy;
