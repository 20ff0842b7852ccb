use core::fmt;
use std::collections::BTreeMap;

use dataflow::FlowError;
use dataflow::domains::JoinSemiLattice;
use itertools::Itertools;

use crate::hierarchy::QualifierHierarchy;
use crate::ir::Expr;
use crate::value::AbstractValue;

/// The facts valid at one program point: a map from expressions to the
/// qualifiers refined for them. Expressions without an entry have their
/// declared qualifier, so top is never stored.
///
/// Keys are canonical expressions, see [`Expr::canonical`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Store {
    values: BTreeMap<Expr, AbstractValue>,
    sequential_semantics: bool,
}

impl Default for Store {
    fn default() -> Self {
        Self::new(true)
    }
}

fn any_subexpression(expr: &Expr, pred: &impl Fn(&Expr) -> bool) -> bool {
    pred(expr)
        || expr
            .subexpressions()
            .into_iter()
            .any(|e| any_subexpression(e, pred))
}

/// Whether the value of the expression might change when the heap changes.
fn reads_heap(expr: &Expr) -> bool {
    any_subexpression(expr, &|e| {
        matches!(
            e,
            Expr::Field { .. } | Expr::ArrayAccess { .. } | Expr::Call { .. }
        )
    })
}

impl Store {
    /// Without sequential semantics another thread might change any field at
    /// any time, so facts about fields are never kept.
    pub fn new(sequential_semantics: bool) -> Self {
        Self {
            values: BTreeMap::new(),
            sequential_semantics,
        }
    }

    pub fn sequential_semantics(&self) -> bool {
        self.sequential_semantics
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Expr, &AbstractValue)> {
        self.values.iter()
    }

    pub fn get_value(&self, expr: &Expr) -> Option<&AbstractValue> {
        self.values.get(&expr.canonical())
    }

    fn can_insert(&self, expr: &Expr) -> bool {
        expr.is_trackable()
            && (self.sequential_semantics
                || !any_subexpression(expr, &|e| matches!(e, Expr::Field { .. })))
    }

    /// Overwrite the fact about `expr`.
    pub fn insert_value(
        &mut self,
        hierarchy: &dyn QualifierHierarchy,
        expr: &Expr,
        value: AbstractValue,
    ) {
        let expr = expr.canonical();
        if !self.can_insert(&expr) {
            return;
        }
        if hierarchy.is_top(value.qualifier()) {
            self.values.remove(&expr);
        } else {
            self.values.insert(expr, value);
        }
    }

    /// Add `value` to what is already known about `expr`.
    pub fn insert_or_refine(
        &mut self,
        hierarchy: &dyn QualifierHierarchy,
        expr: &Expr,
        value: AbstractValue,
    ) -> Result<(), FlowError> {
        let refined = match self.get_value(expr) {
            Some(previous) => previous.most_specific(&value, hierarchy)?,
            None => value,
        };
        self.insert_value(hierarchy, expr, refined);
        Ok(())
    }

    /// Forget the fact about `expr` only.
    pub fn clear_value(&mut self, expr: &Expr) -> Option<AbstractValue> {
        self.values.remove(&expr.canonical())
    }

    /// Forget the fact about `expr` and about every expression built from it.
    pub fn kill_value(&mut self, expr: &Expr) {
        let expr = expr.canonical();
        self.values.retain(|key, _| !key.contains(&expr));
    }

    /// Kill everything the assignment might invalidate, then record the new
    /// value of the target. Assigning a field invalidates every field with the
    /// same name, the receivers might alias. Assigning an array element
    /// invalidates all array elements. Both might change the result of any
    /// method call.
    pub fn update_for_assignment(
        &mut self,
        hierarchy: &dyn QualifierHierarchy,
        target: &Expr,
        value: Option<AbstractValue>,
    ) {
        let target = target.canonical();
        match &target {
            Expr::Local(_) | Expr::This => self.kill_value(&target),
            Expr::Field { field, .. } => self.values.retain(|key, _| {
                !any_subexpression(key, &|e| match e {
                    Expr::Field { field: other, .. } => other == field,
                    Expr::Call { .. } => true,
                    _ => false,
                })
            }),
            Expr::ArrayAccess { .. } => self.values.retain(|key, _| {
                !any_subexpression(key, &|e| {
                    matches!(e, Expr::ArrayAccess { .. } | Expr::Call { .. })
                })
            }),
            _ => {}
        }
        if let Some(value) = value {
            self.insert_value(hierarchy, &target, value);
        }
    }

    /// A method that is not side-effect free might change any field or array
    /// element, and the result of any other call. Locals and array lengths
    /// survive. The result of a deterministic method is stored under the
    /// call expression.
    pub fn update_for_method_call(
        &mut self,
        hierarchy: &dyn QualifierHierarchy,
        call: &Expr,
        side_effect_free: bool,
        deterministic: bool,
        result: Option<AbstractValue>,
    ) {
        if !side_effect_free {
            self.havoc_heap();
        }
        if let (true, Some(result)) = (deterministic, result) {
            self.insert_value(hierarchy, call, result);
        }
    }

    /// Forget every fact that depends on the heap.
    pub fn havoc_heap(&mut self) {
        self.values.retain(|key, _| !reads_heap(key));
    }

    /// Replace every value with the result of `f`, `None` removes the entry.
    pub fn rewrite_values(
        &mut self,
        mut f: impl FnMut(&Expr, &AbstractValue) -> Option<AbstractValue>,
    ) {
        self.values = core::mem::take(&mut self.values)
            .into_iter()
            .filter_map(|(expr, value)| f(&expr, &value).map(|value| (expr, value)))
            .collect();
    }

    /// Whether every fact of `other` is implied by a fact of this store.
    pub fn is_leq(
        &self,
        other: &Store,
        hierarchy: &dyn QualifierHierarchy,
    ) -> Result<bool, FlowError> {
        for (expr, other_value) in &other.values {
            let Some(value) = self.values.get(expr) else {
                return Ok(false);
            };
            if !hierarchy.is_subtype(value.qualifier(), other_value.qualifier())? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Point-wise merge of the expressions present in both stores. An
    /// expression known in only one of them falls back to its declared
    /// qualifier.
    fn merge(
        &self,
        other: &Store,
        hierarchy: &dyn QualifierHierarchy,
        mut f: impl FnMut(&AbstractValue, &AbstractValue) -> Result<AbstractValue, FlowError>,
    ) -> Result<Store, FlowError> {
        let mut values = BTreeMap::new();
        for (expr, value) in &self.values {
            let Some(other_value) = other.values.get(expr) else {
                continue;
            };
            let merged = f(value, other_value)?;
            if !hierarchy.is_top(merged.qualifier()) {
                values.insert(expr.clone(), merged);
            }
        }
        Ok(Store {
            values,
            sequential_semantics: self.sequential_semantics && other.sequential_semantics,
        })
    }
}

impl JoinSemiLattice for Store {
    type LatticeContext = dyn QualifierHierarchy;

    fn join(&self, other: &Self, ctx: &Self::LatticeContext) -> Result<Self, FlowError> {
        self.merge(other, ctx, |a, b| a.join(b, ctx))
    }

    fn widen(
        &self,
        previous: &Self,
        ctx: &Self::LatticeContext,
        iteration: usize,
    ) -> Result<Self, FlowError> {
        self.merge(previous, ctx, |new, old| new.widen(old, ctx, iteration))
    }
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{}}}",
            self.values
                .iter()
                .map(|(expr, value)| format!("{expr}: {value}"))
                .join(", ")
        )
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
