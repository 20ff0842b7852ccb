//! Small hand-built units, one or two for every qualifier system. Each unit
//! runs under any system, the declarations only make sense for some.

use qualifiers::hierarchy::conversion::{CHAR, CONVERSION, INT};
use qualifiers::hierarchy::enumerated::{NON_NEGATIVE, NON_NULL};
use qualifiers::ir::{BinaryOp, Cfg, CompareOp, Expr, Node};
use qualifiers::{Declarations, MethodContract, Qualifier, System};

fn local(name: &str) -> Expr {
    Expr::local(name)
}

fn formals(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_owned()).collect()
}

/// `x = 3; y = x * x; return y;`
fn odd_square() -> Cfg {
    let mut cfg = Cfg::new("odd_square", Vec::new());
    let body = cfg.regular([
        Node::assign(local("x"), Expr::int(3)),
        Node::binary(local("y"), BinaryOp::Mul, local("x"), local("x")),
        Node::ret(Some(local("y"))),
    ]);
    cfg.add_edge(Cfg::ENTRY, body).add_edge(body, Cfg::EXIT);
    cfg
}

/// `q = p != null ? p.next : make(); return q;`
fn null_check() -> Cfg {
    let mut cfg = Cfg::new("null_check", formals(&["p"]));
    let test = cfg.regular([Node::compare(CompareOp::Ne, local("p"), Expr::null())]);
    let cond = cfg.conditional();
    let load = cfg.regular([Node::assign(local("q"), Expr::field(local("p"), "next"))]);
    let make = cfg.regular([Node::call(Some(local("q")), None, "make", Vec::new())]);
    let join = cfg.regular([Node::ret(Some(local("q")))]);
    cfg.add_edge(Cfg::ENTRY, test)
        .add_edge(test, cond)
        .add_branch(cond, load, make)
        .add_edge(load, join)
        .add_edge(make, join)
        .add_edge(join, Cfg::EXIT);
    cfg
}

/// `x = new Object(); this.f = x; try { y.foo(); } catch (Exception e) {}`
fn catch() -> Cfg {
    let mut cfg = Cfg::new("catch", formals(&["y"]));
    let field = Expr::field(Expr::This, "f");
    let init = cfg.regular([
        Node::ObjectCreation {
            target: local("x"),
            class: "Object".to_owned(),
            args: Vec::new(),
        },
        Node::assign(field, local("x")),
    ]);
    let call = cfg.exception(Node::call(None, Some(local("y")), "foo", Vec::new()));
    let normal = cfg.regular([Node::ret(None)]);
    let handler = cfg.regular([Node::ret(None)]);
    cfg.add_edge(Cfg::ENTRY, init)
        .add_edge(init, call)
        .add_edge(call, normal)
        .add_exceptional_edge(call, handler, "Exception")
        .add_edge(normal, Cfg::EXIT)
        .add_edge(handler, Cfg::EXIT);
    cfg
}

/// `while (x < n) { x = x + 1; } return x;` after an optional initializer.
fn counting_loop(name: &str, formal_names: &[&str], init: Option<Node>) -> Cfg {
    let mut cfg = Cfg::new(name, formals(formal_names));
    let pre = cfg.regular(init);
    let head = cfg.regular([Node::compare(CompareOp::Lt, local("x"), local("n"))]);
    let cond = cfg.conditional();
    let body = cfg.regular([Node::binary(
        local("x"),
        BinaryOp::Add,
        local("x"),
        Expr::int(1),
    )]);
    let done = cfg.regular([Node::ret(Some(local("x")))]);
    cfg.add_edge(Cfg::ENTRY, pre)
        .add_edge(pre, head)
        .add_edge(head, cond)
        .add_branch(cond, body, done)
        .add_edge(body, head)
        .add_edge(done, Cfg::EXIT);
    cfg
}

/// `b = new int[a.length]; c = b; return c;`
fn copy_array() -> Cfg {
    let mut cfg = Cfg::new("copy_array", formals(&["a"]));
    let body = cfg.regular([
        Node::ArrayCreation {
            target: local("b"),
            length: Expr::length(local("a")),
        },
        Node::assign(local("c"), local("b")),
        Node::ret(Some(local("c"))),
    ]);
    cfg.add_edge(Cfg::ENTRY, body).add_edge(body, Cfg::EXIT);
    cfg
}

/// `if (i < a.length) { x = a[i]; }`
fn bounded_index() -> Cfg {
    let mut cfg = Cfg::new("bounded_index", formals(&["a", "i"]));
    let test = cfg.regular([Node::compare(
        CompareOp::Lt,
        local("i"),
        Expr::length(local("a")),
    )]);
    let cond = cfg.conditional();
    let access = cfg.regular([Node::assign(
        local("x"),
        Expr::access(local("a"), local("i")),
    )]);
    let done = cfg.regular([Node::ret(None)]);
    cfg.add_edge(Cfg::ENTRY, test)
        .add_edge(test, cond)
        .add_branch(cond, access, done)
        .add_edge(access, done)
        .add_edge(done, Cfg::EXIT);
    cfg
}

/// `checkInt(s); return s;`
fn format() -> Cfg {
    let mut cfg = Cfg::new("format", formals(&["s"]));
    let body = cfg.regular([
        Node::call(None, None, "checkInt", vec![local("s")]),
        Node::ret(Some(local("s"))),
    ]);
    cfg.add_edge(Cfg::ENTRY, body).add_edge(body, Cfg::EXIT);
    cfg
}

pub fn units() -> Vec<Cfg> {
    vec![
        odd_square(),
        null_check(),
        catch(),
        counting_loop("count_up", &["x", "n"], None),
        copy_array(),
        bounded_index(),
        counting_loop(
            "grow",
            &["n"],
            Some(Node::assign(local("x"), Expr::int(0))),
        ),
        format(),
    ]
}

/// The declarations the units are analyzed with under `system`.
pub fn declarations(system: System) -> Declarations {
    let mut declarations = Declarations::new();
    match system {
        System::Nullness => {
            let non_null = Qualifier::new(NON_NULL);
            declarations
                .declare_method("make", MethodContract::default().returning(non_null.clone()))
                .declare_method("null_check", MethodContract::default().returning(non_null));
        }
        System::LowerBound => {
            declarations.declare_parameter("count_up", "x", Qualifier::new(NON_NEGATIVE));
        }
        System::Conversion => {
            declarations
                .declare_parameter("format", "s", Qualifier::with_names(CONVERSION, [CHAR]))
                .declare_method(
                    "checkInt",
                    MethodContract::default()
                        .ensures(local("#1"), Qualifier::with_names(CONVERSION, [INT])),
                );
        }
        System::Odd | System::SameLen | System::IndexFor | System::IntRange => {}
    }
    declarations
}
