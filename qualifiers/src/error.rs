use core::fmt;

use dataflow::FlowError;
use dataflow::cfg::OpPos;

/// A qualifier operation got something it cannot handle. Always a bug in a
/// hierarchy, rule set, or in the code that built the qualifier, never a
/// problem with the analyzed program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QualifierError {
    /// The qualifier does not belong to the hierarchy.
    Foreign {
        hierarchy: &'static str,
        qualifier: String,
    },
    /// The qualifier does not carry the argument the operation needs.
    MissingArgument {
        qualifier: String,
        expected: &'static str,
    },
    /// A lattice operation could not be resolved to any qualifier.
    Unresolvable {
        hierarchy: &'static str,
        operation: &'static str,
        left: String,
        right: String,
    },
}

impl QualifierError {
    pub fn foreign(hierarchy: &'static str, qualifier: &impl fmt::Display) -> Self {
        Self::Foreign {
            hierarchy,
            qualifier: qualifier.to_string(),
        }
    }

    fn hierarchy(&self) -> &str {
        match self {
            QualifierError::Foreign { hierarchy, .. }
            | QualifierError::Unresolvable { hierarchy, .. } => hierarchy,
            QualifierError::MissingArgument { .. } => "<unknown>",
        }
    }
}

impl fmt::Display for QualifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualifierError::Foreign {
                hierarchy,
                qualifier,
            } => write!(f, "{qualifier} is not a qualifier of the {hierarchy} hierarchy"),
            QualifierError::MissingArgument {
                qualifier,
                expected,
            } => write!(f, "{qualifier} does not carry {expected}"),
            QualifierError::Unresolvable {
                hierarchy,
                operation,
                left,
                right,
            } => write!(
                f,
                "{operation} of {left} and {right} is not defined in the {hierarchy} hierarchy"
            ),
        }
    }
}

impl std::error::Error for QualifierError {}

impl From<QualifierError> for FlowError {
    fn from(err: QualifierError) -> Self {
        FlowError::lattice(err.hierarchy(), err.to_string())
    }
}

/// A declared qualifier that cannot be used, e.g. because it mentions an
/// array that is not in scope. The analysis treats the declaration as top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedQualifier {
    pub site: String,
    pub qualifier: String,
    pub reason: String,
}

impl fmt::Display for MalformedQualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "malformed qualifier {} on {}: {}",
            self.qualifier, self.site, self.reason
        )
    }
}

impl std::error::Error for MalformedQualifier {}

/// A type error in the analyzed program: the refined qualifier of an
/// expression is not a subtype of the required one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeError {
    pub unit: String,
    pub pos: OpPos,
    pub expression: String,
    pub required: String,
    pub found: String,
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: `{}`: required {} but found {}",
            self.unit, self.pos.block_id, self.pos.op_id, self.expression, self.required, self.found
        )
    }
}

impl std::error::Error for TypeError {}
