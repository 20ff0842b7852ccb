use dataflow::FlowError;
use dataflow::cfg::OpPos;
use dataflow::solvers::SolverConfig;

use crate::check::Checker;
use crate::declarations::{Declarations, MethodContract};
use crate::hierarchy::enumerated::{self, NON_NULL};
use crate::hierarchy::index_for::IndexForHierarchy;
use crate::hierarchy::int_range::IntRangeHierarchy;
use crate::hierarchy::same_len::SameLenHierarchy;
use crate::ir::{Cfg, CompareOp, Expr, Node};
use crate::qualifier::Qualifier;
use crate::runner::{AnalysisOptions, System, analyze_unit, analyze_units, solver_config};

/// `if (i < a.length) { x = a[i]; }`
fn guarded_access(name: &str) -> (Cfg, usize, usize) {
    let (a, i) = (Expr::local("a"), Expr::local("i"));
    let mut cfg = Cfg::new(name, vec!["a".to_owned(), "i".to_owned()]);
    let test = cfg.regular([Node::compare(
        CompareOp::Lt,
        i.clone(),
        Expr::length(a.clone()),
    )]);
    let cond = cfg.conditional();
    let access = cfg.regular([Node::assign(Expr::local("x"), Expr::access(a, i))]);
    let done = cfg.regular([Node::ret(None)]);
    cfg.add_edge(Cfg::ENTRY, test)
        .add_edge(test, cond)
        .add_branch(cond, access, done)
        .add_edge(access, done)
        .add_edge(done, Cfg::EXIT);
    (cfg, test, access)
}

#[test]
fn system_names() {
    for system in System::ALL {
        assert_eq!(system.name().parse::<System>(), Ok(system));
    }
    assert_eq!(System::IntRange.to_string(), "int-range");
    assert_eq!("lower-bound".parse::<System>(), Ok(System::LowerBound));
    assert_eq!(
        "interval".parse::<System>(),
        Err("unknown qualifier system `interval`".to_owned())
    );
}

#[test]
fn widening_follows_the_hierarchy() {
    let options = AnalysisOptions::default();
    assert_eq!(
        solver_config(&options, &enumerated::lower_bound()),
        SolverConfig::default()
    );
    assert_eq!(
        solver_config(&options, &IntRangeHierarchy::new()),
        SolverConfig {
            node_limit: 55,
            widen_after: Some(11),
        }
    );

    let explicit = AnalysisOptions {
        solver: SolverConfig {
            node_limit: 7,
            widen_after: Some(3),
        },
        ..AnalysisOptions::default()
    };
    assert_eq!(
        solver_config(&explicit, &IntRangeHierarchy::new()),
        explicit.solver
    );

    let unlimited = AnalysisOptions {
        solver: SolverConfig {
            node_limit: 0,
            widen_after: None,
        },
        ..AnalysisOptions::default()
    };
    assert_eq!(
        solver_config(&unlimited, &IntRangeHierarchy::new()).node_limit,
        0
    );
}

#[test]
fn broken_units_do_not_stop_the_others() {
    let (first, _, _) = guarded_access("first");
    let mut broken = Cfg::new("broken", vec![]);
    let dangling = broken.regular([Node::ret(None)]);
    broken.add_edge(Cfg::ENTRY, dangling);

    let mut declarations = Declarations::new();
    declarations.declare_parameter(
        "first",
        "a",
        SameLenHierarchy::new().same_len(["ghost"]),
    );

    let rules = System::SameLen.rules();
    let report = analyze_units(
        &[first, broken],
        rules.as_ref(),
        &declarations,
        &AnalysisOptions::default(),
    );
    assert!(report.results["first"].is_ok());
    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].unit, "broken");
    assert_eq!(failures[0].block, Some(dangling));
    assert!(matches!(failures[0].error, FlowError::MalformedBlock { .. }));

    assert_eq!(report.malformed.len(), 1);
    assert_eq!(
        report.malformed[0].to_string(),
        r#"malformed qualifier SameLen("ghost") on parameter `a` of `first`: `ghost` is not in scope"#
    );
}

#[test]
fn requirements_before_nodes() {
    let (mut cfg, test, access) = guarded_access("index");
    let dead = cfg.regular([Node::ret(Some(Expr::local("i")))]);
    cfg.add_edge(dead, Cfg::EXIT);
    let declarations = Declarations::new();
    let rules = System::IndexFor.rules();
    let result = analyze_unit(
        &cfg,
        rules.as_ref(),
        &declarations,
        &AnalysisOptions::default(),
    )
    .result
    .unwrap();

    let checker = Checker {
        cfg: &cfg,
        rules: rules.as_ref(),
        declarations: &declarations,
        result: &result,
    };
    let i = Expr::local("i");
    let required = IndexForHierarchy::new().lt_length_of(["a"]);
    let at = |block_id| OpPos { block_id, op_id: 0 };

    assert_eq!(checker.check_requirement(at(access), &i, &required), Ok(None));
    let error = checker
        .check_requirement(at(test), &i, &required)
        .unwrap()
        .unwrap();
    assert_eq!(
        error.to_string(),
        format!(r#"index:{test}:0: `i`: required LTLengthOf("a") but found UpperBoundUnknown"#)
    );
    assert_eq!(checker.check_requirement(at(dead), &i, &required), Ok(None));
}

#[test]
fn returns_match_the_declared_qualifier() {
    let (p, x) = (Expr::local("p"), Expr::local("x"));
    let mut cfg = Cfg::new("make", vec!["p".to_owned()]);
    let test = cfg.regular([Node::compare(CompareOp::Eq, p.clone(), Expr::null())]);
    let cond = cfg.conditional();
    let early = cfg.regular([Node::ret(Some(p))]);
    let late = cfg.regular([
        Node::ObjectCreation {
            target: x.clone(),
            class: "Widget".to_owned(),
            args: vec![],
        },
        Node::ret(Some(x)),
    ]);
    cfg.add_edge(Cfg::ENTRY, test)
        .add_edge(test, cond)
        .add_branch(cond, early, late)
        .add_edge(early, Cfg::EXIT)
        .add_edge(late, Cfg::EXIT);

    let mut declarations = Declarations::new();
    declarations.declare_method(
        "make",
        MethodContract::default().returning(Qualifier::new(NON_NULL)),
    );
    let rules = System::Nullness.rules();
    let result = analyze_unit(
        &cfg,
        rules.as_ref(),
        &declarations,
        &AnalysisOptions::default(),
    )
    .result
    .unwrap();
    assert_eq!(result.return_stores().len(), 2);

    let checker = Checker {
        cfg: &cfg,
        rules: rules.as_ref(),
        declarations: &declarations,
        result: &result,
    };
    let errors = checker.check_returns().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].to_string(),
        format!("make:{early}:0: `p`: required NonNull but found Null")
    );
}

#[test]
fn malformed_contracts_are_reported() {
    let (cfg, _, _) = guarded_access("lookup");
    let index_for = IndexForHierarchy::new();
    let mut declarations = Declarations::new();
    declarations.declare_method(
        "pick",
        MethodContract::pure().returning(index_for.lt_length_of(["ghost"])),
    );
    declarations.declare_parameter("lookup", "i", index_for.lt_length_of(["a"]));

    let rules = System::IndexFor.rules();
    let report = analyze_unit(
        &cfg,
        rules.as_ref(),
        &declarations,
        &AnalysisOptions::default(),
    );
    assert!(report.result.is_ok());
    assert_eq!(report.malformed.len(), 1);
    assert_eq!(
        report.malformed[0].to_string(),
        r#"malformed qualifier LTLengthOf("ghost") on return value of `pick`: `ghost` is not in scope"#
    );
}
