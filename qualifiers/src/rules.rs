use core::fmt::Debug;
use std::collections::BTreeSet;

use dataflow::FlowError;

use crate::error::QualifierError;
use crate::hierarchy::QualifierHierarchy;
use crate::ir::{BinaryOp, CompareOp, Expr, Literal, UnaryOp};
use crate::qualifier::Qualifier;
use crate::store::Store;

/// An operand of a node with the qualifier it has before the node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Operand<'a> {
    pub expr: &'a Expr,
    pub qualifier: Qualifier,
}

/// The stores after a condition, refined for each outcome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Branches {
    pub then_store: Store,
    pub else_store: Store,
}

/// The part of the transfer function that is specific to a qualifier system.
/// The generic [`crate::transfer::QualifierTransfer`] handles the store
/// updates every system shares and asks the rules about the rest. The
/// defaults know nothing: values are top and conditions refine only through
/// equality.
pub trait RefinementRules: Send + Sync + Debug {
    fn hierarchy(&self) -> &(dyn QualifierHierarchy + 'static);

    fn literal(&self, _literal: &Literal) -> Qualifier {
        self.hierarchy().top()
    }

    /// The qualifier of any `a.length` expression.
    fn array_length(&self) -> Qualifier {
        self.hierarchy().top()
    }

    fn new_object(&self) -> Qualifier {
        self.hierarchy().top()
    }

    fn new_array(&self, _length: Operand<'_>) -> Result<Qualifier, QualifierError> {
        Ok(self.hierarchy().top())
    }

    fn unary(&self, _op: UnaryOp, _operand: Operand<'_>) -> Result<Qualifier, QualifierError> {
        Ok(self.hierarchy().top())
    }

    fn binary(
        &self,
        _op: BinaryOp,
        _lhs: Operand<'_>,
        _rhs: Operand<'_>,
    ) -> Result<Qualifier, QualifierError> {
        Ok(self.hierarchy().top())
    }

    /// Called after `target = value` was recorded in the store.
    fn assigned(&self, _target: &Expr, _value: &Expr, _store: &mut Store) -> Result<(), FlowError> {
        Ok(())
    }

    /// Called after `target = new [length]` was recorded in the store.
    fn array_created(
        &self,
        _target: &Expr,
        _length: &Expr,
        _store: &mut Store,
    ) -> Result<(), FlowError> {
        Ok(())
    }

    /// Called before an assignment or a heap change. Qualifiers that name an
    /// array through the changed location no longer hold afterwards.
    fn invalidate(&self, _killed: Invalidation<'_>, _store: &mut Store) -> Result<(), FlowError> {
        Ok(())
    }

    fn compare(
        &self,
        op: CompareOp,
        lhs: Operand<'_>,
        rhs: Operand<'_>,
        branches: &mut Branches,
    ) -> Result<(), FlowError> {
        refine_equality(self.hierarchy(), op, &lhs, &rhs, branches)
    }

    fn instance_of(&self, _operand: &Expr, _then_store: &mut Store) -> Result<(), FlowError> {
        Ok(())
    }

    /// The qualifier an expression has after it was dereferenced without an
    /// exception.
    fn dereferenced(&self) -> Option<Qualifier> {
        None
    }
}

/// Equal operands have the qualifiers of both: refines the then store of
/// `==` and the else store of `!=`.
pub fn refine_equality(
    hierarchy: &dyn QualifierHierarchy,
    op: CompareOp,
    lhs: &Operand<'_>,
    rhs: &Operand<'_>,
    branches: &mut Branches,
) -> Result<(), FlowError> {
    let store = match op {
        CompareOp::Eq => &mut branches.then_store,
        CompareOp::Ne => &mut branches.else_store,
        _ => return Ok(()),
    };
    let both = hierarchy.greatest_lower_bound(&lhs.qualifier, &rhs.qualifier)?;
    store.insert_or_refine(hierarchy, lhs.expr, both.clone().into())?;
    store.insert_or_refine(hierarchy, rhs.expr, both.into())
}

/// What a node might have changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Invalidation<'a> {
    /// The location gets a new value.
    Assigned(&'a Expr),
    /// Any field, array element or method result might have changed.
    Heap,
}

fn is_identifier(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '#'
}

/// The character before every whole-word occurrence of `word` in `name`.
fn occurrences<'a>(name: &'a str, word: &'a str) -> impl Iterator<Item = Option<char>> + 'a {
    name.match_indices(word).filter_map(move |(start, _)| {
        let before = name[..start].chars().next_back();
        let after = name[start + word.len()..].chars().next();
        (!before.is_some_and(is_identifier) && !after.is_some_and(is_identifier)).then_some(before)
    })
}

impl Invalidation<'_> {
    /// Whether the array called `name` (see [`array_name`]) might denote
    /// another array afterwards.
    pub fn affects(&self, name: &str) -> bool {
        match self {
            Invalidation::Heap => name.contains(['.', '[', '(']),
            Invalidation::Assigned(target) => match target.canonical() {
                Expr::Local(local) => occurrences(name, &local).any(|before| before != Some('.')),
                Expr::This => occurrences(name, "this").any(|before| before != Some('.')),
                // The receivers might alias.
                Expr::Field { field, .. } => {
                    name.contains('(') || occurrences(name, &field).any(|before| before == Some('.'))
                }
                Expr::ArrayAccess { .. } => name.contains(['[', '(']),
                _ => false,
            },
        }
    }
}

/// Drop the names `killed` affects from the name sets of every qualifier in
/// the store, `rebuild` creates the qualifier for the remaining names.
pub(crate) fn forget_names(
    store: &mut Store,
    killed: Invalidation<'_>,
    rebuild: impl Fn(BTreeSet<String>) -> Qualifier,
) {
    store.rewrite_values(|_, value| match value.qualifier().names() {
        Ok(names) if names.iter().any(|n| killed.affects(n)) => {
            let rest: BTreeSet<String> =
                names.iter().filter(|n| !killed.affects(n)).cloned().collect();
            (!rest.is_empty()).then(|| rebuild(rest).into())
        }
        _ => Some(value.clone()),
    });
}

/// The name an array is referred to by in qualifier arguments.
pub(crate) fn array_name(expr: &Expr) -> Option<String> {
    let expr = expr.canonical();
    expr.is_trackable().then(|| expr.to_string())
}

pub mod conversion;
pub mod index_for;
pub mod int_range;
pub mod lower_bound;
pub mod nullness;
pub mod odd;
pub mod same_len;

pub use conversion::ConversionRules;
pub use index_for::IndexForRules;
pub use int_range::IntRangeRules;
pub use lower_bound::LowerBoundRules;
pub use nullness::NullnessRules;
pub use odd::OddRules;
pub use same_len::SameLenRules;

#[cfg(test)]
mod rules_tests;
