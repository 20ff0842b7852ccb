use dataflow::FlowError;
use dataflow::cfg::OpPos;
use dataflow::solvers::{SolverConfig, Stores};

use crate::declarations::{Declarations, MethodContract};
use crate::hierarchy::enumerated::*;
use crate::ir::{BinaryOp, Cfg, CompareOp, Expr, Node};
use crate::qualifier::Qualifier;
use crate::runner::{AnalysisOptions, QualifierResult, System, analyze_unit};
use crate::store::Store;

fn analyze(system: System, cfg: &Cfg, declarations: &Declarations) -> QualifierResult {
    let rules = system.rules();
    analyze_unit(cfg, rules.as_ref(), declarations, &AnalysisOptions::default())
        .result
        .unwrap()
}

fn input(result: &QualifierResult, block: usize) -> Store {
    match result.block_input(block) {
        Some(Stores::Regular(store)) => store.clone(),
        other => panic!("unexpected input of block {block}: {other:?}"),
    }
}

fn after(result: &QualifierResult, block_id: usize, op_id: usize) -> Store {
    match result.store_after(OpPos { block_id, op_id }) {
        Some(Stores::Regular(store)) => store.clone(),
        other => panic!("unexpected store after {block_id}:{op_id}: {other:?}"),
    }
}

fn qualifier_of(store: &Store, expr: &Expr) -> Option<String> {
    store.get_value(expr).map(ToString::to_string)
}

/// `while (x < n) { x = x + 1; } return x;`
fn counting_loop(name: &str, formals: &[&str], init: Option<Node>) -> (Cfg, usize) {
    let (x, n) = (Expr::local("x"), Expr::local("n"));
    let mut cfg = Cfg::new(name, formals.iter().map(|f| f.to_string()).collect());
    let pre = cfg.regular(init);
    let head = cfg.regular([Node::compare(CompareOp::Lt, x.clone(), n)]);
    let cond = cfg.conditional();
    let body = cfg.regular([Node::binary(
        x.clone(),
        BinaryOp::Add,
        x.clone(),
        Expr::int(1),
    )]);
    let exit = cfg.regular([Node::ret(Some(x))]);
    cfg.add_edge(Cfg::ENTRY, pre)
        .add_edge(pre, head)
        .add_edge(head, cond)
        .add_branch(cond, body, exit)
        .add_edge(body, head)
        .add_edge(exit, Cfg::EXIT);
    (cfg, exit)
}

#[test]
fn branches_join_to_common_bound() {
    let (x, y) = (Expr::local("x"), Expr::local("y"));
    let mut cfg = Cfg::new("branches", vec![]);
    let head = cfg.regular([
        Node::assign(x.clone(), Expr::int(5)),
        Node::compare(CompareOp::Gt, x.clone(), Expr::int(0)),
    ]);
    let cond = cfg.conditional();
    let then = cfg.regular([Node::assign(y.clone(), x.clone())]);
    let otherwise = cfg.regular([Node::assign(y.clone(), Expr::int(0))]);
    let join = cfg.regular([Node::ret(Some(y))]);
    cfg.add_edge(Cfg::ENTRY, head)
        .add_edge(head, cond)
        .add_branch(cond, then, otherwise)
        .add_edge(then, join)
        .add_edge(otherwise, join)
        .add_edge(join, Cfg::EXIT);

    let result = analyze(System::LowerBound, &cfg, &Declarations::new());
    assert!(result.block_input(cond).is_some_and(Stores::is_conditional));
    assert!(!result.is_reachable(Cfg::EXCEPTIONAL_EXIT));
    assert_eq!(input(&result, then).to_string(), "{x: Positive}");
    assert_eq!(
        input(&result, join).to_string(),
        "{x: Positive, y: NonNegative}"
    );
    let returned = result.value(OpPos {
        block_id: join,
        op_id: 0,
    });
    assert_eq!(returned.map(ToString::to_string).as_deref(), Some("NonNegative"));
    assert_eq!(result.return_stores().len(), 1);
    assert_eq!(
        result.regular_exit_store().map(ToString::to_string).as_deref(),
        Some("{x: Positive, y: NonNegative}")
    );
}

#[test]
fn loop_reaches_fixpoint_without_widening() {
    let (cfg, exit) = counting_loop("count", &["x", "n"], None);
    let mut declarations = Declarations::new();
    declarations.declare_parameter("count", "x", Qualifier::new(NON_NEGATIVE));

    let result = analyze(System::LowerBound, &cfg, &declarations);
    assert_eq!(input(&result, exit).to_string(), "{x: NonNegative}");
    // The head block comes right after the entry and the initializer.
    assert_eq!(input(&result, 4).to_string(), "{x: NonNegative}");
}

#[test]
fn ranges_widen_in_loops() {
    let init = Node::assign(Expr::local("x"), Expr::int(0));
    let (cfg, exit) = counting_loop("grow", &["n"], Some(init));

    let result = analyze(System::IntRange, &cfg, &Declarations::new());
    assert_eq!(
        input(&result, exit).to_string(),
        format!("{{x: IntRange(0, {})}}", i64::MAX)
    );
}

#[test]
fn divergent_analysis_hits_the_limit() {
    let init = Node::assign(Expr::local("x"), Expr::int(0));
    let (cfg, _) = counting_loop("grow", &["n"], Some(init));
    let options = AnalysisOptions {
        solver: SolverConfig {
            node_limit: 5,
            widen_after: Some(1_000_000),
        },
        ..AnalysisOptions::default()
    };

    let rules = System::IntRange.rules();
    let err = analyze_unit(&cfg, rules.as_ref(), &Declarations::new(), &options)
        .result
        .unwrap_err();
    assert_eq!(err.unit, "grow");
    assert_eq!(err.error, FlowError::NoConvergence { limit: 40 });
}

#[test]
fn exceptional_edges_lose_refinements() {
    let (x, y) = (Expr::local("x"), Expr::local("y"));
    let field = Expr::field(Expr::This, "f");
    let mut cfg = Cfg::new("catch", vec!["y".to_owned()]);
    let pre = cfg.regular([
        Node::ObjectCreation {
            target: x.clone(),
            class: "Object".to_owned(),
            args: vec![],
        },
        Node::assign(field.clone(), x.clone()),
    ]);
    let call = cfg.exception(Node::call(None, Some(y.clone()), "foo", vec![]));
    let normal = cfg.regular([Node::ret(None)]);
    let handler = cfg.regular([Node::ret(None)]);
    cfg.add_edge(Cfg::ENTRY, pre)
        .add_edge(pre, call)
        .add_edge(call, normal)
        .add_exceptional_edge(call, handler, "Exception")
        .add_edge(normal, Cfg::EXIT)
        .add_edge(handler, Cfg::EXIT);

    let result = analyze(System::Nullness, &cfg, &Declarations::new());
    let before_call = input(&result, call);
    assert_eq!(qualifier_of(&before_call, &field).as_deref(), Some("NonNull"));

    let normal_store = input(&result, normal);
    assert_eq!(qualifier_of(&normal_store, &y).as_deref(), Some("NonNull"));
    assert_eq!(qualifier_of(&normal_store, &field), None);

    let handler_store = input(&result, handler);
    assert_eq!(qualifier_of(&handler_store, &y), None);
    assert_eq!(qualifier_of(&handler_store, &field), None);
    assert_eq!(qualifier_of(&handler_store, &x).as_deref(), Some("NonNull"));
}

#[test]
fn failed_dereference_keeps_input_store() {
    let (x, y) = (Expr::local("x"), Expr::local("y"));
    let mut cfg = Cfg::new("npe", vec!["x".to_owned()]);
    let load = cfg.exception(Node::assign(y.clone(), Expr::field(x.clone(), "next")));
    let normal = cfg.regular([Node::ret(Some(y))]);
    let handler = cfg.regular([Node::ret(None)]);
    cfg.add_edge(Cfg::ENTRY, load)
        .add_edge(load, normal)
        .add_exceptional_edge(load, handler, "NullPointerException")
        .add_edge(normal, Cfg::EXIT)
        .add_edge(handler, Cfg::EXIT);

    let result = analyze(System::Nullness, &cfg, &Declarations::new());
    assert_eq!(input(&result, normal).to_string(), "{x: NonNull}");
    assert!(input(&result, handler).is_empty());
}

#[test]
fn contracts_refine_call_sites() {
    let (x, m, c, z) = (
        Expr::local("x"),
        Expr::local("m"),
        Expr::local("c"),
        Expr::local("z"),
    );
    let non_null = Qualifier::new(NON_NULL);
    let get = Expr::call(Some(m.clone()), "get", vec![]);
    let mut declarations = Declarations::new();
    declarations
        .declare_method(
            "isPresent",
            MethodContract::pure().ensures_if(true, Expr::local("#1"), non_null.clone()),
        )
        .declare_method("get", MethodContract::pure())
        .declare_method(
            "init",
            MethodContract::default().ensures(Expr::field(Expr::This, "f"), non_null),
        );

    let mut cfg = Cfg::new("contracts", vec!["x".to_owned(), "m".to_owned()]);
    let test = cfg.regular([Node::call(Some(c), None, "isPresent", vec![x.clone()])]);
    let present = cfg.conditional();
    let init = cfg.regular([
        Node::call(None, Some(m.clone()), "init", vec![]),
        Node::compare(CompareOp::Ne, get.clone(), Expr::null()),
    ]);
    let checked = cfg.conditional();
    let load = cfg.regular([Node::call(Some(z.clone()), Some(m.clone()), "get", vec![])]);
    let done = cfg.regular([Node::ret(None)]);
    cfg.add_edge(Cfg::ENTRY, test)
        .add_edge(test, present)
        .add_branch(present, init, done)
        .add_edge(init, checked)
        .add_branch(checked, load, done)
        .add_edge(load, done)
        .add_edge(done, Cfg::EXIT);

    let result = analyze(System::Nullness, &cfg, &declarations);
    let init_store = input(&result, init);
    assert_eq!(init_store.to_string(), "{x: NonNull}");

    let initialized = result
        .store_after(OpPos {
            block_id: init,
            op_id: 0,
        })
        .and_then(|stores| match stores {
            Stores::Regular(store) => Some(store.clone()),
            Stores::Conditional { .. } => None,
        })
        .unwrap();
    assert_eq!(
        qualifier_of(&initialized, &Expr::field(m.clone(), "f")).as_deref(),
        Some("NonNull")
    );
    assert_eq!(qualifier_of(&initialized, &m).as_deref(), Some("NonNull"));

    let loaded = after(&result, load, 0);
    assert_eq!(qualifier_of(&loaded, &z).as_deref(), Some("NonNull"));
    assert_eq!(qualifier_of(&loaded, &get).as_deref(), Some("NonNull"));

    // Analyzing again gives the same result.
    assert_eq!(result, analyze(System::Nullness, &cfg, &declarations));
}

#[test]
fn computed_values() {
    let (x, y, t, s, c) = (
        Expr::local("x"),
        Expr::local("y"),
        Expr::local("t"),
        Expr::local("s"),
        Expr::local("c"),
    );
    let mut cfg = Cfg::new("values", vec![]);
    let block = cfg.regular([
        Node::assign(x.clone(), Expr::int(3)),
        Node::binary(y.clone(), BinaryOp::Mul, x.clone(), x.clone()),
        Node::Ternary {
            target: t.clone(),
            condition: c,
            then_value: y.clone(),
            else_value: Expr::int(2),
        },
        Node::TypeCast {
            target: s.clone(),
            operand: y,
            ty: "int".to_owned(),
        },
    ]);
    cfg.add_edge(Cfg::ENTRY, block).add_edge(block, Cfg::EXIT);

    let result = analyze(System::Odd, &cfg, &Declarations::new());
    assert_eq!(
        result.regular_exit_store().map(ToString::to_string).as_deref(),
        Some("{s: Odd, x: Odd, y: Odd}")
    );
    let ternary = result.value(OpPos {
        block_id: block,
        op_id: 2,
    });
    assert_eq!(ternary.map(ToString::to_string).as_deref(), Some("MaybeOdd"));
    assert_eq!(qualifier_of(&after(&result, block, 2), &t), None);
}

#[test]
fn array_copies_share_length() {
    let (a, b, c, n) = (
        Expr::local("a"),
        Expr::local("b"),
        Expr::local("c"),
        Expr::local("n"),
    );
    let mut cfg = Cfg::new("copies", vec!["a".to_owned(), "n".to_owned()]);
    let block = cfg.regular([
        Node::ArrayCreation {
            target: b.clone(),
            length: Expr::length(a),
        },
        Node::assign(c, b.clone()),
        Node::ArrayCreation {
            target: b,
            length: n,
        },
    ]);
    cfg.add_edge(Cfg::ENTRY, block).add_edge(block, Cfg::EXIT);

    let result = analyze(System::SameLen, &cfg, &Declarations::new());
    assert_eq!(
        after(&result, block, 1).to_string(),
        r#"{a: SameLen("b", "c"), b: SameLen("a", "c"), c: SameLen("a", "b")}"#
    );
    assert_eq!(
        after(&result, block, 2).to_string(),
        r#"{a: SameLen("c"), c: SameLen("a")}"#
    );
}

/// `if (i < this.a.length) { <body>; return i; }`
fn field_guard(name: &str, body: Node) -> (Cfg, usize) {
    let i = Expr::local("i");
    let mut cfg = Cfg::new(name, vec!["i".to_owned()]);
    let test = cfg.regular([Node::compare(
        CompareOp::Lt,
        i.clone(),
        Expr::length(Expr::field(Expr::This, "a")),
    )]);
    let cond = cfg.conditional();
    let then = cfg.regular([body, Node::ret(Some(i))]);
    let done = cfg.regular([Node::ret(None)]);
    cfg.add_edge(Cfg::ENTRY, test)
        .add_edge(test, cond)
        .add_branch(cond, then, done)
        .add_edge(then, Cfg::EXIT)
        .add_edge(done, Cfg::EXIT);
    (cfg, then)
}

#[test]
fn reassigned_field_arrays_drop_indices() {
    let i = Expr::local("i");
    let reassign = Node::ArrayCreation {
        target: Expr::field(Expr::This, "a"),
        length: Expr::int(0),
    };
    let (cfg, then) = field_guard("reassign", reassign);

    let result = analyze(System::IndexFor, &cfg, &Declarations::new());
    assert_eq!(
        qualifier_of(&input(&result, then), &i).as_deref(),
        Some(r#"LTLengthOf("this.a")"#)
    );
    assert_eq!(qualifier_of(&after(&result, then, 0), &i), None);
}

#[test]
fn calls_drop_indices_into_the_heap() {
    let i = Expr::local("i");
    let reset = Node::call(None, Some(Expr::This), "reset", vec![]);
    let (cfg, then) = field_guard("reset", reset);
    let result = analyze(System::IndexFor, &cfg, &Declarations::new());
    assert_eq!(qualifier_of(&after(&result, then, 0), &i), None);

    let mut declarations = Declarations::new();
    declarations.declare_method("peek", MethodContract::pure());
    let peek = Node::call(None, Some(Expr::This), "peek", vec![]);
    let (cfg, then) = field_guard("peek", peek);
    let result = analyze(System::IndexFor, &cfg, &declarations);
    assert_eq!(
        qualifier_of(&after(&result, then, 0), &i).as_deref(),
        Some(r#"LTLengthOf("this.a")"#)
    );
}

#[test]
fn call_targets_are_dereferenced() {
    let (o, y) = (Expr::local("o"), Expr::local("y"));
    let mut cfg = Cfg::new("store_result", vec!["o".to_owned(), "y".to_owned()]);
    let block = cfg.regular([
        Node::call(Some(Expr::field(o.clone(), "f")), Some(y.clone()), "m", vec![]),
        Node::ret(None),
    ]);
    cfg.add_edge(Cfg::ENTRY, block).add_edge(block, Cfg::EXIT);

    let result = analyze(System::Nullness, &cfg, &Declarations::new());
    let store = after(&result, block, 0);
    assert_eq!(qualifier_of(&store, &o).as_deref(), Some("NonNull"));
    assert_eq!(qualifier_of(&store, &y).as_deref(), Some("NonNull"));
    assert_eq!(store.to_string(), "{o: NonNull, y: NonNull}");
}

#[test]
fn postconditions_on_this_in_any_spelling() {
    let m = Expr::local("m");
    let spelled = Expr::field(Expr::local("this"), "f");
    assert_eq!(
        spelled.substitute(Some(&m), &[]),
        Some(Expr::field(m.clone(), "f"))
    );
    assert_eq!(
        Expr::Paren(Box::new(Expr::local("#1"))).substitute(None, &[m.clone()]),
        Some(m.clone())
    );

    let mut cfg = Cfg::new("setup", vec!["m".to_owned()]);
    let block = cfg.regular([Node::call(None, Some(m.clone()), "init", vec![]), Node::ret(None)]);
    cfg.add_edge(Cfg::ENTRY, block).add_edge(block, Cfg::EXIT);
    let mut declarations = Declarations::new();
    declarations.declare_method(
        "init",
        MethodContract::default().ensures(spelled, Qualifier::new(NON_NULL)),
    );

    let result = analyze(System::Nullness, &cfg, &declarations);
    assert_eq!(
        after(&result, block, 0).to_string(),
        "{m: NonNull, m.f: NonNull}"
    );
}
