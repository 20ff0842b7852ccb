use std::collections::BTreeSet;

use dashmap::DashMap;
use tracing::trace;

use crate::error::QualifierError;
use crate::hierarchy::QualifierHierarchy;
use crate::qualifier::{Qualifier, QualifierArgument};

pub const CONVERSION_GENERAL: &str = "ConversionGeneral";
pub const CONVERSION: &str = "Conversion";
pub const CONVERSION_NULL: &str = "ConversionNull";

pub const CHAR: &str = "CHAR";
pub const INT: &str = "INT";
pub const FLOAT: &str = "FLOAT";
pub const TIME: &str = "TIME";

pub const CATEGORIES: [&str; 4] = [CHAR, INT, FLOAT, TIME];

/// Combinations of categories a single value can satisfy at once.
const COMPATIBLE: [&[&str]; 2] = [&[CHAR, INT], &[INT, TIME]];

/// Format conversion categories: which conversions a value can be formatted
/// with. A value that has to work with several conversions belongs to the
/// intersection of their categories, so the greatest lower bound of two
/// compatible categories is a new qualifier naming both.
///
/// Synthesized qualifiers are interned per hierarchy, repeated lattice
/// operations hand out the same [`Qualifier`] handle.
#[derive(Debug)]
pub struct ConversionHierarchy {
    top: Qualifier,
    bottom: Qualifier,
    interned: DashMap<BTreeSet<String>, Qualifier>,
}

impl Default for ConversionHierarchy {
    fn default() -> Self {
        Self {
            top: Qualifier::new(CONVERSION_GENERAL),
            bottom: Qualifier::new(CONVERSION_NULL),
            interned: DashMap::new(),
        }
    }
}

impl ConversionHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(&self, category: &str) -> Result<Qualifier, QualifierError> {
        let categories = BTreeSet::from([category.to_owned()]);
        if !is_allowed(&categories) {
            return Err(QualifierError::foreign(self.name(), &category));
        }
        Ok(self.intern(categories))
    }

    /// Number of synthesized qualifiers created so far.
    pub fn interned_count(&self) -> usize {
        self.interned.len()
    }

    fn intern(&self, categories: BTreeSet<String>) -> Qualifier {
        self.interned
            .entry(categories.clone())
            .or_insert_with(|| {
                trace!(?categories, "interning conversion category");
                Qualifier::with_argument(CONVERSION, QualifierArgument::Names(categories))
            })
            .value()
            .clone()
    }

    /// `None` for top and bottom, the categories otherwise.
    fn categories<'a>(
        &self,
        qualifier: &'a Qualifier,
    ) -> Result<Option<&'a BTreeSet<String>>, QualifierError> {
        match (qualifier.name(), qualifier.argument()) {
            (CONVERSION_GENERAL | CONVERSION_NULL, QualifierArgument::None) => Ok(None),
            (CONVERSION, QualifierArgument::Names(names)) if is_allowed(names) => Ok(Some(names)),
            _ => Err(QualifierError::foreign(self.name(), qualifier)),
        }
    }
}

fn is_allowed(categories: &BTreeSet<String>) -> bool {
    match categories.len() {
        1 => categories
            .first()
            .is_some_and(|c| CATEGORIES.contains(&c.as_str())),
        _ => COMPATIBLE
            .iter()
            .any(|combination| {
                categories
                    .iter()
                    .map(String::as_str)
                    .eq(combination.iter().copied())
            }),
    }
}

impl QualifierHierarchy for ConversionHierarchy {
    fn name(&self) -> &'static str {
        "conversion"
    }

    fn top(&self) -> Qualifier {
        self.top.clone()
    }

    fn bottom(&self) -> Qualifier {
        self.bottom.clone()
    }

    fn contains(&self, qualifier: &Qualifier) -> bool {
        self.categories(qualifier).is_ok()
    }

    fn is_subtype(&self, sub: &Qualifier, sup: &Qualifier) -> Result<bool, QualifierError> {
        let (sub_categories, sup_categories) = (self.categories(sub)?, self.categories(sup)?);
        if self.is_bottom(sub) || self.is_top(sup) {
            return Ok(true);
        }
        Ok(match (sub_categories, sup_categories) {
            (Some(sub), Some(sup)) => sub.is_superset(sup),
            _ => false,
        })
    }

    fn least_upper_bound(&self, a: &Qualifier, b: &Qualifier) -> Result<Qualifier, QualifierError> {
        let (ca, cb) = (self.categories(a)?, self.categories(b)?);
        if self.is_top(a) || self.is_top(b) {
            return Ok(self.top());
        }
        Ok(match (ca, cb) {
            (Some(x), Some(y)) => {
                let common: BTreeSet<String> = x.intersection(y).cloned().collect();
                if common.is_empty() {
                    self.top()
                } else {
                    self.intern(common)
                }
            }
            (None, _) => b.clone(),
            (_, None) => a.clone(),
        })
    }

    fn greatest_lower_bound(
        &self,
        a: &Qualifier,
        b: &Qualifier,
    ) -> Result<Qualifier, QualifierError> {
        let (ca, cb) = (self.categories(a)?, self.categories(b)?);
        if self.is_bottom(a) || self.is_bottom(b) {
            return Ok(self.bottom());
        }
        Ok(match (ca, cb) {
            (Some(x), Some(y)) => {
                let all: BTreeSet<String> = x.union(y).cloned().collect();
                if is_allowed(&all) {
                    self.intern(all)
                } else {
                    self.bottom()
                }
            }
            (None, _) => b.clone(),
            (_, None) => a.clone(),
        })
    }
}
