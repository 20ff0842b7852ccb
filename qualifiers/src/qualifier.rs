use core::fmt;
use std::collections::BTreeSet;
use std::sync::Arc;

use itertools::Itertools;

use crate::error::QualifierError;

/// An inclusive range of integers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IntRange {
    pub from: i64,
    pub to: i64,
}

impl IntRange {
    pub const EVERYTHING: IntRange = IntRange::new(i64::MIN, i64::MAX);

    pub const fn new(from: i64, to: i64) -> Self {
        Self { from, to }
    }

    pub const fn constant(value: i64) -> Self {
        Self::new(value, value)
    }

    pub fn contains(&self, other: &IntRange) -> bool {
        self.from <= other.from && other.to <= self.to
    }

    pub fn hull(&self, other: &IntRange) -> IntRange {
        IntRange::new(self.from.min(other.from), self.to.max(other.to))
    }

    /// `None` when the ranges are disjoint.
    pub fn intersect(&self, other: &IntRange) -> Option<IntRange> {
        let from = self.from.max(other.from);
        let to = self.to.min(other.to);
        (from <= to).then_some(IntRange::new(from, to))
    }

    pub fn is_within(&self, from: i64, to: i64) -> bool {
        from <= self.from && self.to <= to
    }
}

impl fmt::Display for IntRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.from, self.to)
    }
}

/// Auxiliary data some qualifiers carry.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QualifierArgument {
    None,
    Names(BTreeSet<String>),
    Range(IntRange),
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct QualifierData {
    name: String,
    argument: QualifierArgument,
}

/// An immutable qualifier, cheap to clone. Two qualifiers are equal when
/// their names and arguments are equal, no matter where they were created.
/// Hierarchies that intern their qualifiers can also use [`Qualifier::ptr_eq`].
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Qualifier(Arc<QualifierData>);

impl Qualifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_argument(name, QualifierArgument::None)
    }

    pub fn with_argument(name: impl Into<String>, argument: QualifierArgument) -> Self {
        Self(Arc::new(QualifierData {
            name: name.into(),
            argument,
        }))
    }

    pub fn with_names<I, S>(name: impl Into<String>, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = names.into_iter().map(Into::into).collect();
        Self::with_argument(name, QualifierArgument::Names(names))
    }

    pub fn with_range(name: impl Into<String>, range: IntRange) -> Self {
        Self::with_argument(name, QualifierArgument::Range(range))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn argument(&self) -> &QualifierArgument {
        &self.0.argument
    }

    pub fn has_argument(&self) -> bool {
        self.0.argument != QualifierArgument::None
    }

    pub fn names(&self) -> Result<&BTreeSet<String>, QualifierError> {
        match &self.0.argument {
            QualifierArgument::Names(names) => Ok(names),
            _ => Err(QualifierError::MissingArgument {
                qualifier: self.to_string(),
                expected: "a set of names",
            }),
        }
    }

    pub fn range(&self) -> Result<IntRange, QualifierError> {
        match &self.0.argument {
            QualifierArgument::Range(range) => Ok(*range),
            _ => Err(QualifierError::MissingArgument {
                qualifier: self.to_string(),
                expected: "an integer range",
            }),
        }
    }

    /// True when both handles point to the same interned qualifier.
    pub fn ptr_eq(&self, other: &Qualifier) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.argument {
            QualifierArgument::None => write!(f, "{}", self.0.name),
            QualifierArgument::Names(names) => write!(
                f,
                "{}({})",
                self.0.name,
                names.iter().map(|n| format!("\"{n}\"")).join(", ")
            ),
            QualifierArgument::Range(range) => write!(f, "{}({range})", self.0.name),
        }
    }
}

impl fmt::Debug for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
