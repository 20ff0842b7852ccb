use std::collections::BTreeSet;

use crate::error::QualifierError;
use crate::hierarchy::{QualifierHierarchy, validate_names};
use crate::qualifier::{Qualifier, QualifierArgument};

pub const UPPER_BOUND_UNKNOWN: &str = "UpperBoundUnknown";
pub const LT_LENGTH_OF: &str = "LTLengthOf";
pub const UPPER_BOUND_BOTTOM: &str = "UpperBoundBottom";

/// Integers that are valid indices for the named arrays.
///
/// Every name is a separate fact, so a larger set is more specific:
/// `LTLengthOf(a)` is below `LTLengthOf(b)` when `a` is a superset of `b`.
/// The least upper bound keeps the facts both sides agree on, the greatest
/// lower bound collects all of them.
#[derive(Debug)]
pub struct IndexForHierarchy {
    top: Qualifier,
    bottom: Qualifier,
}

impl Default for IndexForHierarchy {
    fn default() -> Self {
        Self {
            top: Qualifier::new(UPPER_BOUND_UNKNOWN),
            bottom: Qualifier::new(UPPER_BOUND_BOTTOM),
        }
    }
}

enum Element<'a> {
    Top,
    Names(&'a BTreeSet<String>),
    Bottom,
}

impl IndexForHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// `LTLengthOf` of the given arrays, top when there are none.
    pub fn lt_length_of<I, S>(&self, names: I) -> Qualifier
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            self.top.clone()
        } else {
            Qualifier::with_argument(LT_LENGTH_OF, QualifierArgument::Names(names))
        }
    }

    fn classify<'a>(&self, qualifier: &'a Qualifier) -> Result<Element<'a>, QualifierError> {
        match (qualifier.name(), qualifier.argument()) {
            (UPPER_BOUND_UNKNOWN, QualifierArgument::None) => Ok(Element::Top),
            (UPPER_BOUND_BOTTOM, QualifierArgument::None) => Ok(Element::Bottom),
            (LT_LENGTH_OF, QualifierArgument::Names(names)) if !names.is_empty() => {
                Ok(Element::Names(names))
            }
            _ => Err(QualifierError::foreign(self.name(), qualifier)),
        }
    }
}

impl QualifierHierarchy for IndexForHierarchy {
    fn name(&self) -> &'static str {
        "index for"
    }

    fn top(&self) -> Qualifier {
        self.top.clone()
    }

    fn bottom(&self) -> Qualifier {
        self.bottom.clone()
    }

    fn contains(&self, qualifier: &Qualifier) -> bool {
        self.classify(qualifier).is_ok()
    }

    fn is_subtype(&self, sub: &Qualifier, sup: &Qualifier) -> Result<bool, QualifierError> {
        Ok(match (self.classify(sub)?, self.classify(sup)?) {
            (Element::Bottom, _) | (_, Element::Top) => true,
            (Element::Names(sub), Element::Names(sup)) => sub.is_superset(sup),
            _ => false,
        })
    }

    fn least_upper_bound(&self, a: &Qualifier, b: &Qualifier) -> Result<Qualifier, QualifierError> {
        Ok(match (self.classify(a)?, self.classify(b)?) {
            (Element::Top, _) | (_, Element::Top) => self.top(),
            (Element::Bottom, _) => b.clone(),
            (_, Element::Bottom) => a.clone(),
            (Element::Names(x), Element::Names(y)) => {
                self.lt_length_of(x.intersection(y).cloned())
            }
        })
    }

    fn greatest_lower_bound(
        &self,
        a: &Qualifier,
        b: &Qualifier,
    ) -> Result<Qualifier, QualifierError> {
        Ok(match (self.classify(a)?, self.classify(b)?) {
            (Element::Bottom, _) | (_, Element::Bottom) => self.bottom(),
            (Element::Top, _) => b.clone(),
            (_, Element::Top) => a.clone(),
            (Element::Names(x), Element::Names(y)) => self.lt_length_of(x.union(y).cloned()),
        })
    }

    fn validate(&self, qualifier: &Qualifier, in_scope: &BTreeSet<String>) -> Result<(), String> {
        validate_names(self, qualifier, in_scope)
    }
}
