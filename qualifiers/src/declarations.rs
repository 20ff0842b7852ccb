use core::fmt;
use std::collections::{BTreeMap, BTreeSet};

use dataflow::cfg::ControlFlowGraph;
use tracing::warn;

use crate::error::MalformedQualifier;
use crate::hierarchy::QualifierHierarchy;
use crate::ir::{Cfg, Expr};
use crate::qualifier::Qualifier;
use crate::store::Store;

/// Where a qualifier was declared.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeclarationSite {
    Parameter { unit: String, name: String },
    Field { name: String },
    Return { method: String },
    Postcondition { method: String, index: usize },
}

impl fmt::Display for DeclarationSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclarationSite::Parameter { unit, name } => write!(f, "parameter `{name}` of `{unit}`"),
            DeclarationSite::Field { name } => write!(f, "field `{name}`"),
            DeclarationSite::Return { method } => write!(f, "return value of `{method}`"),
            DeclarationSite::Postcondition { method, index } => {
                write!(f, "postcondition {index} of `{method}`")
            }
        }
    }
}

/// `expression` has `qualifier` after the call returned. Conditional
/// postconditions only hold when the boolean result equals `when`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Postcondition {
    pub expression: Expr,
    pub qualifier: Qualifier,
    pub when: Option<bool>,
}

/// What the analysis may assume about a call. Expressions refer to the
/// arguments as `#1`, `#2`, ... and to the receiver as `this`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MethodContract {
    /// The method does not change any field or array element.
    pub side_effect_free: bool,
    /// Calling the method again with the same arguments gives the same result.
    pub deterministic: bool,
    pub returns: Option<Qualifier>,
    pub postconditions: Vec<Postcondition>,
}

impl MethodContract {
    /// Side-effect free and deterministic.
    pub fn pure() -> Self {
        Self {
            side_effect_free: true,
            deterministic: true,
            ..Self::default()
        }
    }

    pub fn returning(mut self, qualifier: Qualifier) -> Self {
        self.returns = Some(qualifier);
        self
    }

    pub fn ensures(mut self, expression: Expr, qualifier: Qualifier) -> Self {
        self.postconditions.push(Postcondition {
            expression,
            qualifier,
            when: None,
        });
        self
    }

    pub fn ensures_if(mut self, result: bool, expression: Expr, qualifier: Qualifier) -> Self {
        self.postconditions.push(Postcondition {
            expression,
            qualifier,
            when: Some(result),
        });
        self
    }
}

/// The declared qualifiers and contracts of a program, as read by the
/// front-end. Nothing here changes during the analysis.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Declarations {
    parameters: BTreeMap<(String, String), Qualifier>,
    fields: BTreeMap<String, Qualifier>,
    contracts: BTreeMap<String, MethodContract>,
}

impl Declarations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare_parameter(
        &mut self,
        unit: impl Into<String>,
        name: impl Into<String>,
        qualifier: Qualifier,
    ) -> &mut Self {
        self.parameters.insert((unit.into(), name.into()), qualifier);
        self
    }

    pub fn declare_field(&mut self, name: impl Into<String>, qualifier: Qualifier) -> &mut Self {
        self.fields.insert(name.into(), qualifier);
        self
    }

    pub fn declare_method(
        &mut self,
        method: impl Into<String>,
        contract: MethodContract,
    ) -> &mut Self {
        self.contracts.insert(method.into(), contract);
        self
    }

    pub fn parameter(&self, unit: &str, name: &str) -> Option<&Qualifier> {
        self.parameters.get(&(unit.to_owned(), name.to_owned()))
    }

    pub fn field(&self, name: &str) -> Option<&Qualifier> {
        self.fields.get(name)
    }

    pub fn contract(&self, method: &str) -> Option<&MethodContract> {
        self.contracts.get(method)
    }

    /// Check every declaration against the hierarchy and the names visible
    /// in `units`. Malformed qualifiers are logged, reported, and replaced by
    /// top in the returned declarations.
    pub fn sanitize(
        &self,
        hierarchy: &dyn QualifierHierarchy,
        units: &[Cfg],
    ) -> (Declarations, Vec<MalformedQualifier>) {
        let all_names: BTreeSet<String> = units.iter().flat_map(Cfg::variables).collect();
        let mut reports = Vec::new();
        let mut check = |site: DeclarationSite, qualifier: &Qualifier, scope: &BTreeSet<String>| {
            match hierarchy.validate(qualifier, scope) {
                Ok(()) => qualifier.clone(),
                Err(reason) => {
                    let site = site.to_string();
                    warn!(
                        site = site.as_str(),
                        qualifier = %qualifier,
                        reason = reason.as_str(),
                        "malformed qualifier replaced by top"
                    );
                    reports.push(MalformedQualifier {
                        site,
                        qualifier: qualifier.to_string(),
                        reason,
                    });
                    hierarchy.top()
                }
            }
        };

        let mut result = Declarations::new();
        for ((unit, name), qualifier) in &self.parameters {
            let unit_names = units.iter().find(|cfg| cfg.name() == unit.as_str());
            let scope = unit_names.map_or_else(|| all_names.clone(), Cfg::variables);
            let site = DeclarationSite::Parameter {
                unit: unit.clone(),
                name: name.clone(),
            };
            let qualifier = check(site, qualifier, &scope);
            result.declare_parameter(unit.clone(), name.clone(), qualifier);
        }
        for (name, qualifier) in &self.fields {
            let site = DeclarationSite::Field { name: name.clone() };
            let qualifier = check(site, qualifier, &all_names);
            result.declare_field(name.clone(), qualifier);
        }
        for (method, contract) in &self.contracts {
            let mut scope = all_names.clone();
            for postcondition in &contract.postconditions {
                postcondition.expression.locals(&mut scope);
            }
            let mut sanitized = contract.clone();
            if let Some(returns) = &contract.returns {
                let site = DeclarationSite::Return {
                    method: method.clone(),
                };
                sanitized.returns = Some(check(site, returns, &scope));
            }
            for (index, postcondition) in sanitized.postconditions.iter_mut().enumerate() {
                let site = DeclarationSite::Postcondition {
                    method: method.clone(),
                    index,
                };
                postcondition.qualifier = check(site, &postcondition.qualifier, &scope);
            }
            result.declare_method(method.clone(), sanitized);
        }
        (result, reports)
    }

    /// The store at the entry of `cfg`: every formal has its declared
    /// qualifier.
    pub fn initial_store(
        &self,
        cfg: &Cfg,
        hierarchy: &dyn QualifierHierarchy,
        sequential_semantics: bool,
    ) -> Store {
        let mut store = Store::new(sequential_semantics);
        for formal in cfg.formals() {
            if let Some(qualifier) = self.parameter(cfg.name(), formal) {
                let formal = Expr::local(formal.clone());
                store.insert_value(hierarchy, &formal, qualifier.clone().into());
            }
        }
        store
    }
}
