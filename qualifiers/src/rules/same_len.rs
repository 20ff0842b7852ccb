use std::collections::BTreeSet;

use dataflow::FlowError;

use crate::hierarchy::QualifierHierarchy;
use crate::hierarchy::same_len::SameLenHierarchy;
use crate::ir::Expr;
use crate::rules::{Invalidation, RefinementRules, array_name, forget_names};
use crate::store::Store;

/// Copying an array reference, or creating an array with the length of
/// another one, puts both arrays in the same group. Every member of a group
/// knows all the other members.
#[derive(Debug, Default)]
pub struct SameLenRules {
    hierarchy: SameLenHierarchy,
}

impl SameLenRules {
    pub fn new() -> Self {
        Self::default()
    }

    fn link(&self, target: &Expr, source: &Expr, store: &mut Store) -> Result<(), FlowError> {
        let (Some(target_name), Some(source_name)) = (array_name(target), array_name(source))
        else {
            return Ok(());
        };
        if target_name == source_name {
            return Ok(());
        }
        let mut group: BTreeSet<String> = match store.get_value(source) {
            Some(value) => value.qualifier().names().cloned().unwrap_or_default(),
            None => BTreeSet::new(),
        };
        group.insert(source_name);
        group.insert(target_name);
        for member in &group {
            let others = group.iter().filter(|n| *n != member).cloned();
            let qualifier = self.hierarchy.same_len(others);
            store.insert_value(&self.hierarchy, &Expr::local(member.clone()), qualifier.into());
        }
        Ok(())
    }
}

impl RefinementRules for SameLenRules {
    fn hierarchy(&self) -> &(dyn QualifierHierarchy + 'static) {
        &self.hierarchy
    }

    fn assigned(&self, target: &Expr, value: &Expr, store: &mut Store) -> Result<(), FlowError> {
        match (target.canonical(), value.canonical()) {
            (Expr::Local(_), source @ Expr::Local(_)) => self.link(target, &source, store),
            _ => Ok(()),
        }
    }

    fn array_created(
        &self,
        target: &Expr,
        length: &Expr,
        store: &mut Store,
    ) -> Result<(), FlowError> {
        match (target.canonical(), length.canonical()) {
            (Expr::Local(_), Expr::ArrayLength(array)) if matches!(*array, Expr::Local(_)) => {
                self.link(target, &array, store)
            }
            _ => Ok(()),
        }
    }

    fn invalidate(&self, killed: Invalidation<'_>, store: &mut Store) -> Result<(), FlowError> {
        forget_names(store, killed, |rest| self.hierarchy.same_len(rest));
        Ok(())
    }
}
