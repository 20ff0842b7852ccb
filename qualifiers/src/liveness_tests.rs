use dataflow::cfg::OpPos;
use dataflow::solvers::{AnalysisResult, SolverConfig, Stores};

use crate::ir::{BinaryOp, Cfg, CompareOp, Expr, Node};
use crate::liveness::{LiveSet, live_variables};

fn live_before(result: &AnalysisResult<(), LiveSet>, block_id: usize, op_id: usize) -> String {
    match result.store_before(OpPos { block_id, op_id }) {
        Some(Stores::Regular(live)) => format!("{live:?}"),
        other => panic!("unexpected store before {block_id}:{op_id}: {other:?}"),
    }
}

#[test]
fn straight_line() {
    let (a, b, x, y) = (
        Expr::local("a"),
        Expr::local("b"),
        Expr::local("x"),
        Expr::local("y"),
    );
    let mut cfg = Cfg::new("straight", vec!["a".to_owned(), "b".to_owned()]);
    let block = cfg.regular([
        Node::assign(x.clone(), a),
        Node::binary(y.clone(), BinaryOp::Add, x, b),
        Node::assign(Expr::field(y.clone(), "f"), Expr::int(1)),
        Node::ret(Some(y)),
    ]);
    cfg.add_edge(Cfg::ENTRY, block).add_edge(block, Cfg::EXIT);

    let result = live_variables(&cfg, SolverConfig::default()).unwrap();
    assert_eq!(live_before(&result, block, 0), r#"{"a", "b"}"#);
    assert_eq!(live_before(&result, block, 1), r#"{"b", "x"}"#);
    // Writing a field reads the receiver.
    assert_eq!(live_before(&result, block, 2), r#"{"y"}"#);
    assert_eq!(live_before(&result, block, 3), r#"{"y"}"#);
    assert_eq!(
        result.entry_store().map(|live| format!("{live:?}")).as_deref(),
        Some(r#"{"a", "b"}"#)
    );
}

#[test]
fn loop_keeps_variables_alive() {
    let (i, n, sum) = (Expr::local("i"), Expr::local("n"), Expr::local("sum"));
    let mut cfg = Cfg::new("sum", vec!["n".to_owned()]);
    let init = cfg.regular([
        Node::assign(i.clone(), Expr::int(0)),
        Node::assign(sum.clone(), Expr::int(0)),
    ]);
    let head = cfg.regular([Node::compare(CompareOp::Lt, i.clone(), n)]);
    let cond = cfg.conditional();
    let body = cfg.regular([
        Node::binary(sum.clone(), BinaryOp::Add, sum.clone(), i.clone()),
        Node::binary(i.clone(), BinaryOp::Add, i, Expr::int(1)),
    ]);
    let done = cfg.regular([Node::ret(Some(sum))]);
    cfg.add_edge(Cfg::ENTRY, init)
        .add_edge(init, head)
        .add_edge(head, cond)
        .add_branch(cond, body, done)
        .add_edge(body, head)
        .add_edge(done, Cfg::EXIT);

    let result = live_variables(&cfg, SolverConfig::default()).unwrap();
    assert_eq!(live_before(&result, init, 0), r#"{"n"}"#);
    assert_eq!(live_before(&result, head, 0), r#"{"i", "n", "sum"}"#);
    assert_eq!(live_before(&result, body, 1), r#"{"i", "n", "sum"}"#);
    assert_eq!(live_before(&result, done, 0), r#"{"sum"}"#);
}

#[test]
fn exceptional_successors_are_live_before_the_node() {
    let (x, y, z) = (Expr::local("x"), Expr::local("y"), Expr::local("z"));
    let mut cfg = Cfg::new("handler", vec!["x".to_owned(), "z".to_owned()]);
    let call = cfg.exception(Node::call(Some(y.clone()), Some(x), "get", vec![]));
    let normal = cfg.regular([Node::ret(Some(y))]);
    let handler = cfg.regular([Node::ret(Some(z))]);
    cfg.add_edge(Cfg::ENTRY, call)
        .add_edge(call, normal)
        .add_exceptional_edge(call, handler, "IOException")
        .add_edge(normal, Cfg::EXIT)
        .add_edge(handler, Cfg::EXIT);

    let result = live_variables(&cfg, SolverConfig::default()).unwrap();
    assert_eq!(live_before(&result, call, 0), r#"{"x"}"#);
    assert_eq!(
        result.entry_store().map(|live| format!("{live:?}")).as_deref(),
        Some(r#"{"x", "z"}"#)
    );
}
