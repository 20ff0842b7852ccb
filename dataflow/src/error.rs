use core::fmt;

/// Failures of the framework itself. None of these mean that the analyzed
/// program is wrong: they signal a bug in a lattice, a transfer function, or
/// the graph handed to the solver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// A lattice operation could not be resolved to an element of the lattice,
    /// or was asked about an element that does not belong to it.
    Lattice { hierarchy: String, message: String },
    /// The graph has a block whose shape the solver cannot interpret.
    MalformedBlock { reason: String },
    /// The worklist was popped more often than the configured budget allows.
    NoConvergence { limit: usize },
    /// A block was scheduled without any store flowing into it.
    MissingStore,
}

impl FlowError {
    pub fn lattice(hierarchy: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Lattice {
            hierarchy: hierarchy.into(),
            message: message.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedBlock {
            reason: reason.into(),
        }
    }

    /// Attach the analyzed unit and, when known, the block being processed.
    pub fn at(self, unit: &str, block: Option<usize>) -> InternalError {
        InternalError {
            unit: unit.to_owned(),
            block,
            error: self,
        }
    }
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowError::Lattice { hierarchy, message } => {
                write!(f, "lattice invariant violated in hierarchy `{hierarchy}`: {message}")
            }
            FlowError::MalformedBlock { reason } => write!(f, "malformed block: {reason}"),
            FlowError::NoConvergence { limit } => {
                write!(f, "no fixpoint after {limit} worklist iterations")
            }
            FlowError::MissingStore => write!(f, "block scheduled without an input store"),
        }
    }
}

impl std::error::Error for FlowError {}

/// An unrecoverable error that aborted the analysis of one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalError {
    pub unit: String,
    pub block: Option<usize>,
    pub error: FlowError,
}

impl fmt::Display for InternalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.block {
            Some(block) => write!(
                f,
                "internal error while analyzing `{}` (block {block}): {}",
                self.unit, self.error
            ),
            None => write!(
                f,
                "internal error while analyzing `{}`: {}",
                self.unit, self.error
            ),
        }
    }
}

impl std::error::Error for InternalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
