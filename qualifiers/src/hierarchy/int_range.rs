use crate::error::QualifierError;
use crate::hierarchy::QualifierHierarchy;
use crate::qualifier::{IntRange, Qualifier, QualifierArgument};

pub const UNKNOWN_VAL: &str = "UnknownVal";
pub const INT_RANGE: &str = "IntRange";
pub const BOTTOM_VAL: &str = "BottomVal";

/// The number of distinct values a range may take through joins before a
/// block starts widening.
pub const MAX_VALUES: usize = 10;

const BYTE_EVERYTHING: IntRange = IntRange::new(i8::MIN as i64, i8::MAX as i64);
const SHORT_EVERYTHING: IntRange = IntRange::new(i16::MIN as i64, i16::MAX as i64);
const INT_EVERYTHING: IntRange = IntRange::new(i32::MIN as i64, i32::MAX as i64);

/// Integer ranges. The least upper bound is the convex hull, the greatest
/// lower bound the intersection. Ranges can grow one value at a time in a
/// loop, so widening jumps to the bounds of the next wider integer type.
#[derive(Debug)]
pub struct IntRangeHierarchy {
    top: Qualifier,
    bottom: Qualifier,
}

impl Default for IntRangeHierarchy {
    fn default() -> Self {
        Self {
            top: Qualifier::new(UNKNOWN_VAL),
            bottom: Qualifier::new(BOTTOM_VAL),
        }
    }
}

impl IntRangeHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// The qualifier for a range. `None` stands for the empty range.
    pub fn from_range(&self, range: Option<IntRange>) -> Qualifier {
        match range {
            None => self.bottom.clone(),
            Some(IntRange::EVERYTHING) => self.top.clone(),
            Some(range) => Qualifier::with_range(INT_RANGE, range),
        }
    }

    /// The values a qualifier allows. `None` when it allows none.
    pub fn range_of(&self, qualifier: &Qualifier) -> Result<Option<IntRange>, QualifierError> {
        match (qualifier.name(), qualifier.argument()) {
            (UNKNOWN_VAL, QualifierArgument::None) => Ok(Some(IntRange::EVERYTHING)),
            (BOTTOM_VAL, QualifierArgument::None) => Ok(None),
            (INT_RANGE, QualifierArgument::Range(range))
                if range.from <= range.to && *range != IntRange::EVERYTHING =>
            {
                Ok(Some(*range))
            }
            _ => Err(QualifierError::foreign(self.name(), qualifier)),
        }
    }

    fn widened_range(new: IntRange, previous: IntRange) -> IntRange {
        let lub = new.hull(&previous);
        if lub == previous {
            return lub;
        }
        if new.from >= previous.from && new.to >= previous.to {
            return IntRange::new(lub.from, widen_up(lub.to));
        }
        if new.from <= previous.from && new.to <= previous.to {
            return IntRange::new(widen_down(lub.from), lub.to);
        }
        [BYTE_EVERYTHING, SHORT_EVERYTHING, INT_EVERYTHING]
            .into_iter()
            .find(|tier| {
                lub.is_within(tier.from + 1, tier.to) || lub.is_within(tier.from, tier.to - 1)
            })
            .unwrap_or(IntRange::EVERYTHING)
    }
}

fn widen_up(to: i64) -> i64 {
    [i8::MAX as i64, i16::MAX as i64, i32::MAX as i64]
        .into_iter()
        .find(|&bound| to < bound)
        .unwrap_or(i64::MAX)
}

fn widen_down(from: i64) -> i64 {
    [i8::MIN as i64, i16::MIN as i64, i32::MIN as i64]
        .into_iter()
        .find(|&bound| from > bound)
        .unwrap_or(i64::MIN)
}

impl QualifierHierarchy for IntRangeHierarchy {
    fn name(&self) -> &'static str {
        "integer range"
    }

    fn top(&self) -> Qualifier {
        self.top.clone()
    }

    fn bottom(&self) -> Qualifier {
        self.bottom.clone()
    }

    fn contains(&self, qualifier: &Qualifier) -> bool {
        self.range_of(qualifier).is_ok()
    }

    fn is_subtype(&self, sub: &Qualifier, sup: &Qualifier) -> Result<bool, QualifierError> {
        Ok(match (self.range_of(sub)?, self.range_of(sup)?) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(sub), Some(sup)) => sup.contains(&sub),
        })
    }

    fn least_upper_bound(&self, a: &Qualifier, b: &Qualifier) -> Result<Qualifier, QualifierError> {
        let hull = match (self.range_of(a)?, self.range_of(b)?) {
            (None, other) | (other, None) => other,
            (Some(x), Some(y)) => Some(x.hull(&y)),
        };
        Ok(self.from_range(hull))
    }

    fn greatest_lower_bound(
        &self,
        a: &Qualifier,
        b: &Qualifier,
    ) -> Result<Qualifier, QualifierError> {
        let intersection = match (self.range_of(a)?, self.range_of(b)?) {
            (Some(x), Some(y)) => x.intersect(&y),
            _ => None,
        };
        Ok(self.from_range(intersection))
    }

    fn widened_upper_bound(
        &self,
        new: &Qualifier,
        previous: &Qualifier,
    ) -> Result<Qualifier, QualifierError> {
        match (self.range_of(new)?, self.range_of(previous)?) {
            (Some(new), Some(previous)) => {
                Ok(self.from_range(Some(Self::widened_range(new, previous))))
            }
            _ => self.least_upper_bound(new, previous),
        }
    }

    fn iterations_before_widening(&self) -> Option<usize> {
        Some(MAX_VALUES + 1)
    }
}
