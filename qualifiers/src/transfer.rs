use dataflow::FlowError;
use dataflow::cfg::{ControlFlowGraph, OpPos};
use dataflow::solvers::{TransferFunction, TransferInput, TransferResult};
use tracing::trace;

use crate::declarations::{Declarations, MethodContract};
use crate::hierarchy::QualifierHierarchy;
use crate::ir::{Cfg, Expr, Node};
use crate::qualifier::Qualifier;
use crate::rules::{Branches, Invalidation, Operand, RefinementRules};
use crate::runner::AnalysisOptions;
use crate::store::Store;
use crate::value::AbstractValue;

/// The qualifier of `expr` at a program point with the facts in `store`.
/// Expressions the store knows nothing about have their declared qualifier:
/// the rules decide for literals and array lengths, the declarations for
/// formals, fields and method results. Everything else is top.
pub fn refined_qualifier(
    rules: &dyn RefinementRules,
    declarations: &Declarations,
    cfg: &Cfg,
    store: &Store,
    expr: &Expr,
) -> Qualifier {
    let expr = expr.canonical();
    if let Some(value) = store.get_value(&expr) {
        return value.qualifier().clone();
    }
    let declared = match &expr {
        Expr::Literal(literal) => return rules.literal(literal),
        Expr::ArrayLength(_) => return rules.array_length(),
        Expr::Local(name) if cfg.formals().contains(name) => {
            declarations.parameter(cfg.name(), name)
        }
        Expr::Field { field, .. } => declarations.field(field),
        Expr::Call { method, .. } => declarations
            .contract(method)
            .and_then(|contract| contract.returns.as_ref()),
        _ => None,
    };
    declared
        .cloned()
        .unwrap_or_else(|| rules.hierarchy().top())
}

/// The forward transfer function shared by every qualifier system. It takes
/// care of the store updates (kill-then-gen on assignment, havoc on calls,
/// contracts, dereferences) and asks the [`RefinementRules`] for the
/// qualifiers of computed values and the refinements of conditions.
pub struct QualifierTransfer<'a> {
    rules: &'a dyn RefinementRules,
    declarations: &'a Declarations,
    options: &'a AnalysisOptions,
}

impl<'a> QualifierTransfer<'a> {
    pub fn new(
        rules: &'a dyn RefinementRules,
        declarations: &'a Declarations,
        options: &'a AnalysisOptions,
    ) -> Self {
        Self {
            rules,
            declarations,
            options,
        }
    }

    fn hierarchy(&self) -> &'a (dyn QualifierHierarchy + 'static) {
        self.rules.hierarchy()
    }

    fn qualifier(&self, cfg: &Cfg, store: &Store, expr: &Expr) -> Qualifier {
        refined_qualifier(self.rules, self.declarations, cfg, store, expr)
    }

    fn operand<'e>(&self, cfg: &Cfg, store: &Store, expr: &'e Expr) -> Operand<'e> {
        Operand {
            expr,
            qualifier: self.qualifier(cfg, store, expr),
        }
    }

    /// Evaluating the expressions went through every dereference in them
    /// without an exception.
    fn dereference<'e>(
        &self,
        store: &mut Store,
        exprs: impl IntoIterator<Item = &'e Expr>,
    ) -> Result<(), FlowError> {
        let Some(qualifier) = self.rules.dereferenced() else {
            return Ok(());
        };
        let mut pending: Vec<&Expr> = exprs.into_iter().collect();
        while let Some(expr) = pending.pop() {
            if let Some(receiver) = expr.dereferenced() {
                store.insert_or_refine(self.hierarchy(), receiver, qualifier.clone().into())?;
            }
            pending.extend(expr.subexpressions());
        }
        Ok(())
    }

    /// Kill-then-gen for `target = <value with qualifier>`.
    fn assign(
        &self,
        store: &mut Store,
        target: &Expr,
        qualifier: Qualifier,
    ) -> Result<(), FlowError> {
        let target = target.canonical();
        self.rules.invalidate(Invalidation::Assigned(&target), store)?;
        store.update_for_assignment(self.hierarchy(), &target, Some(qualifier.into()));
        Ok(())
    }

    /// The invoked code might have changed any field or array element.
    fn havoc(&self, store: &mut Store) -> Result<(), FlowError> {
        self.rules.invalidate(Invalidation::Heap, store)?;
        store.havoc_heap();
        Ok(())
    }

    fn assign_both(
        &self,
        target: Option<&Expr>,
        qualifier: &Qualifier,
        then_store: &mut Store,
        else_store: &mut Store,
    ) -> Result<(), FlowError> {
        if let Some(target) = target {
            self.assign(then_store, target, qualifier.clone())?;
            self.assign(else_store, target, qualifier.clone())?;
        }
        Ok(())
    }

    fn contract(&self, method: &str) -> MethodContract {
        let mut contract = self
            .declarations
            .contract(method)
            .cloned()
            .unwrap_or_default();
        contract.side_effect_free |= self.options.assume_side_effect_free;
        contract
    }

    /// The store an exception thrown by the invoked code sees: none of the
    /// refinements made by the node hold, and the callee might have changed
    /// the heap before throwing.
    fn add_exceptional_stores(
        &self,
        result: TransferResult<AbstractValue, Store>,
        pos: OpPos,
        cfg: &Cfg,
        store: &Store,
        side_effect_free: bool,
    ) -> Result<TransferResult<AbstractValue, Store>, FlowError> {
        let mut havocked = store.clone();
        if !side_effect_free {
            self.havoc(&mut havocked)?;
        }
        Ok(cfg
            .exception_causes(pos.block_id)
            .fold(result, |result, cause| {
                result.with_exceptional_store(cause, havocked.clone())
            }))
    }

    #[allow(clippy::too_many_arguments)]
    fn method_call(
        &self,
        pos: OpPos,
        cfg: &Cfg,
        store: Store,
        target: Option<&Expr>,
        receiver: Option<&Expr>,
        method: &str,
        args: &[Expr],
    ) -> Result<TransferResult<AbstractValue, Store>, FlowError> {
        let hierarchy = self.hierarchy();
        let call = Expr::call(receiver.cloned(), method, args.to_vec());
        let contract = self.contract(method);

        // The result of a call that does not change the heap can build on
        // what was known about the call before.
        let result = if contract.side_effect_free {
            self.qualifier(cfg, &store, &call)
        } else {
            contract.returns.clone().unwrap_or_else(|| hierarchy.top())
        };

        let mut after = store.clone();
        self.dereference(&mut after, receiver.into_iter().chain(args))?;
        if !contract.side_effect_free {
            self.rules.invalidate(Invalidation::Heap, &mut after)?;
        }
        after.update_for_method_call(
            hierarchy,
            &call,
            contract.side_effect_free,
            contract.deterministic,
            Some(result.clone().into()),
        );
        // The target is written once the call returned.
        self.dereference(&mut after, target)?;

        let mut then_store = after.clone();
        let mut else_store = after;
        let mut conditional = false;
        for postcondition in &contract.postconditions {
            let Some(expr) = postcondition.expression.substitute(receiver, args) else {
                trace!(
                    method,
                    expression = %postcondition.expression,
                    "postcondition does not match the call site"
                );
                continue;
            };
            let value: AbstractValue = postcondition.qualifier.clone().into();
            match postcondition.when {
                None => {
                    then_store.insert_or_refine(hierarchy, &expr, value.clone())?;
                    else_store.insert_or_refine(hierarchy, &expr, value)?;
                }
                Some(true) => {
                    conditional = true;
                    then_store.insert_or_refine(hierarchy, &expr, value)?;
                }
                Some(false) => {
                    conditional = true;
                    else_store.insert_or_refine(hierarchy, &expr, value)?;
                }
            }
        }
        self.assign_both(target, &result, &mut then_store, &mut else_store)?;

        let value = Some(AbstractValue::new(result));
        let transferred = if conditional {
            TransferResult::conditional(value, then_store, else_store)
        } else {
            TransferResult::regular(value, then_store)
        };
        self.add_exceptional_stores(transferred, pos, cfg, &store, contract.side_effect_free)
    }
}

impl TransferFunction<Cfg, Store> for QualifierTransfer<'_> {
    type Value = AbstractValue;

    fn operation(
        &mut self,
        pos: OpPos,
        op: &Node,
        cfg: &Cfg,
        ctx: &(dyn QualifierHierarchy + 'static),
        input: &TransferInput<Store>,
    ) -> Result<TransferResult<AbstractValue, Store>, FlowError> {
        trace!(block = pos.block_id, op = pos.op_id, node = %op, "transfer");
        let store = input.regular(ctx)?;
        let mut after = store.clone();
        self.dereference(&mut after, op.target().into_iter().chain(op.operands()))?;
        let value = match op {
            Node::Assign { target, value } => {
                let qualifier = self.qualifier(cfg, &after, value);
                self.assign(&mut after, target, qualifier.clone())?;
                self.rules.assigned(target, value, &mut after)?;
                Some(qualifier)
            }
            Node::Unary {
                target,
                op,
                operand,
            } => {
                let operand = self.operand(cfg, &after, operand);
                let qualifier = self.rules.unary(*op, operand)?;
                self.assign(&mut after, target, qualifier.clone())?;
                Some(qualifier)
            }
            Node::Binary {
                target,
                op,
                lhs,
                rhs,
            } => {
                let lhs = self.operand(cfg, &after, lhs);
                let rhs = self.operand(cfg, &after, rhs);
                let qualifier = self.rules.binary(*op, lhs, rhs)?;
                self.assign(&mut after, target, qualifier.clone())?;
                Some(qualifier)
            }
            Node::Comparison {
                target,
                op,
                lhs,
                rhs,
            } => {
                let lhs = self.operand(cfg, &after, lhs);
                let rhs = self.operand(cfg, &after, rhs);
                let mut branches = Branches {
                    then_store: after.clone(),
                    else_store: after,
                };
                self.rules.compare(*op, lhs, rhs, &mut branches)?;
                let top = ctx.top();
                let Branches {
                    mut then_store,
                    mut else_store,
                } = branches;
                self.assign_both(target.as_ref(), &top, &mut then_store, &mut else_store)?;
                return Ok(TransferResult::conditional(
                    Some(top.into()),
                    then_store,
                    else_store,
                ));
            }
            Node::InstanceOf {
                target, operand, ..
            } => {
                let mut then_store = after.clone();
                let mut else_store = after;
                self.rules.instance_of(operand, &mut then_store)?;
                let top = ctx.top();
                self.assign_both(target.as_ref(), &top, &mut then_store, &mut else_store)?;
                return Ok(TransferResult::conditional(
                    Some(top.into()),
                    then_store,
                    else_store,
                ));
            }
            Node::Ternary {
                target,
                then_value,
                else_value,
                ..
            } => {
                let qualifier = ctx.least_upper_bound(
                    &self.qualifier(cfg, &after, then_value),
                    &self.qualifier(cfg, &after, else_value),
                )?;
                self.assign(&mut after, target, qualifier.clone())?;
                Some(qualifier)
            }
            Node::TypeCast {
                target, operand, ..
            } => {
                let qualifier = self.qualifier(cfg, &after, operand);
                self.assign(&mut after, target, qualifier.clone())?;
                Some(qualifier)
            }
            Node::MethodCall {
                target,
                receiver,
                method,
                args,
            } => {
                return self.method_call(
                    pos,
                    cfg,
                    store,
                    target.as_ref(),
                    receiver.as_ref(),
                    method,
                    args,
                );
            }
            Node::ObjectCreation { target, class, .. } => {
                // Constructors are looked up by class name.
                let contract = self.contract(class);
                if !contract.side_effect_free {
                    self.havoc(&mut after)?;
                }
                let qualifier = self.rules.new_object();
                self.assign(&mut after, target, qualifier.clone())?;
                let transferred = TransferResult::regular(Some(qualifier.into()), after);
                return self.add_exceptional_stores(
                    transferred,
                    pos,
                    cfg,
                    &store,
                    contract.side_effect_free,
                );
            }
            Node::ArrayCreation { target, length } => {
                let length_operand = self.operand(cfg, &after, length);
                let qualifier = self.rules.new_array(length_operand)?;
                self.assign(&mut after, target, qualifier.clone())?;
                self.rules.array_created(target, length, &mut after)?;
                Some(qualifier)
            }
            Node::Return { value } => value
                .as_ref()
                .map(|value| self.qualifier(cfg, &after, value)),
        };
        Ok(TransferResult::regular(
            value.map(AbstractValue::new),
            after,
        ))
    }

    fn is_return(&self, op: &Node) -> bool {
        matches!(op, Node::Return { .. })
    }
}
