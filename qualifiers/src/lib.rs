//! Qualifier systems on top of the `dataflow` engine.
//!
//! A qualifier refines a type of the analyzed language, like "this reference
//! is not null" or "this integer is a valid index for the array `a`". Every
//! qualifier system is a bounded lattice described by a
//! [`QualifierHierarchy`]. The [`transfer::QualifierTransfer`] is a generic
//! forward transfer function that keeps a [`Store`] mapping expressions to
//! their refined qualifiers, and consults the [`RefinementRules`] of the
//! selected system for everything that is specific to it.
//!
//! The [`runner`] module wires everything together and analyzes single or
//! multiple units, the [`check`] module compares the inferred facts against
//! the required ones.

pub mod check;
pub mod declarations;
pub mod error;
pub mod hierarchy;
pub mod ir;
pub mod liveness;
pub mod qualifier;
pub mod rules;
pub mod runner;
pub mod store;
pub mod transfer;
pub mod value;

pub use declarations::{Declarations, MethodContract};
pub use error::{MalformedQualifier, QualifierError, TypeError};
pub use hierarchy::QualifierHierarchy;
pub use qualifier::{IntRange, Qualifier, QualifierArgument};
pub use rules::RefinementRules;
pub use runner::{AnalysisOptions, System};
pub use store::Store;
pub use value::AbstractValue;

#[cfg(test)]
mod liveness_tests;
#[cfg(test)]
mod runner_tests;
#[cfg(test)]
mod store_tests;
#[cfg(test)]
mod transfer_tests;
