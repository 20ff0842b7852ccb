use std::collections::BTreeSet;

use crate::error::QualifierError;
use crate::hierarchy::{QualifierHierarchy, validate_names};
use crate::qualifier::{Qualifier, QualifierArgument};

pub const SAME_LEN_UNKNOWN: &str = "SameLenUnknown";
pub const SAME_LEN: &str = "SameLen";
pub const SAME_LEN_BOTTOM: &str = "SameLenBottom";

/// Groups of arrays known to have the same length.
///
/// `SameLen(a)` is below `SameLen(b)` when `a` is a subset of `b`. Two
/// overlapping sets describe the same group of arrays, so their least upper
/// bound collects every name; disjoint sets share no guarantee and go to top.
/// Dually, the greatest lower bound keeps the common names and disjoint sets
/// are contradictory. Going to top for disjoint sets skips the union, so the
/// least upper bound is not associative across disjoint and overlapping
/// operands.
#[derive(Debug)]
pub struct SameLenHierarchy {
    top: Qualifier,
    bottom: Qualifier,
}

impl Default for SameLenHierarchy {
    fn default() -> Self {
        Self {
            top: Qualifier::new(SAME_LEN_UNKNOWN),
            bottom: Qualifier::new(SAME_LEN_BOTTOM),
        }
    }
}

enum Element<'a> {
    Top,
    Names(&'a BTreeSet<String>),
    Bottom,
}

impl SameLenHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// `SameLen` of the given names, top when there are none.
    pub fn same_len<I, S>(&self, names: I) -> Qualifier
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            self.top.clone()
        } else {
            Qualifier::with_argument(SAME_LEN, QualifierArgument::Names(names))
        }
    }

    fn classify<'a>(&self, qualifier: &'a Qualifier) -> Result<Element<'a>, QualifierError> {
        match (qualifier.name(), qualifier.argument()) {
            (SAME_LEN_UNKNOWN, QualifierArgument::None) => Ok(Element::Top),
            (SAME_LEN_BOTTOM, QualifierArgument::None) => Ok(Element::Bottom),
            (SAME_LEN, QualifierArgument::Names(names)) if !names.is_empty() => {
                Ok(Element::Names(names))
            }
            _ => Err(QualifierError::foreign(self.name(), qualifier)),
        }
    }
}

impl QualifierHierarchy for SameLenHierarchy {
    fn name(&self) -> &'static str {
        "same length"
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
            (Element::Names(sub), Element::Names(sup)) => sub.is_subset(sup),
            _ => false,
        })
    }

    fn least_upper_bound(&self, a: &Qualifier, b: &Qualifier) -> Result<Qualifier, QualifierError> {
        Ok(match (self.classify(a)?, self.classify(b)?) {
            (Element::Top, _) | (_, Element::Top) => self.top(),
            (Element::Bottom, _) => b.clone(),
            (_, Element::Bottom) => a.clone(),
            (Element::Names(x), Element::Names(y)) if x.is_disjoint(y) => self.top(),
            (Element::Names(x), Element::Names(y)) => self.same_len(x.union(y).cloned()),
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
            (Element::Names(x), Element::Names(y)) if x.is_disjoint(y) => self.bottom(),
            (Element::Names(x), Element::Names(y)) => self.same_len(x.intersection(y).cloned()),
        })
    }

    fn validate(&self, qualifier: &Qualifier, in_scope: &BTreeSet<String>) -> Result<(), String> {
        validate_names(self, qualifier, in_scope)
    }
}
