//! This crate contains the engine for flow-sensitive type refinement based
//! on [abstract interpretation](https://en.wikipedia.org/wiki/Abstract_interpretation).
//! The building blocks include helpers for
//! [control flow graphs](https://en.wikipedia.org/wiki/Control-flow_graph)
//! with conditional, exceptional and special blocks,
//! [lattice](https://en.wikipedia.org/wiki/Lattice_(order)) traits with a
//! few concrete implementations, and forward and backward worklist solvers.
//!
//! The engine knows nothing about qualifiers or the analyzed language. Look
//! at the qualifiers crate for an example how to define analyses using the
//! helpers in this crate.
//!
//! Some resources to learn more about dataflow analysis:
//! * [Static Program Analysis, Anders Møller and Michael I. Schwartzbach](https://cs.au.dk/~amoeller/spa/)
//! * [Data Flow Analysis: Theory and Practice](https://www.amazon.com/Data-Flow-Analysis-Theory-Practice/dp/0849328802)
//! * [Data flow analysis: an informal introduction](https://clang.llvm.org/docs/DataFlowAnalysisIntro.html)
//! * [The Checker Framework manual](https://checkerframework.org/manual/)

/// Trait for defining a control flow graph, and some algorithms and data
/// structures to make it easier to work with them.
pub mod cfg;

/// Lattice traits, the finite lattice encoding and the power set lattice.
pub mod domains;

pub mod error;

/// Implementations of fixed-point iteration algorithms using worklists.
pub mod solvers;

pub use error::{FlowError, InternalError};
