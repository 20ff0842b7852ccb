use core::fmt::{self, Display};
use std::collections::BTreeSet;

use dataflow::cfg::*;
use itertools::Itertools;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Literal {
    Int(i64),
    Bool(bool),
    Null,
    Str(String),
}

/// Expressions of the analyzed program as they appear in the operands of
/// nodes. The store keys its facts by (canonical) expressions.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Expr {
    Local(String),
    This,
    Field {
        receiver: Box<Expr>,
        field: String,
    },
    ArrayLength(Box<Expr>),
    ArrayAccess {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        receiver: Option<Box<Expr>>,
        method: String,
        args: Vec<Expr>,
    },
    Literal(Literal),
    Paren(Box<Expr>),
    /// Anything the front-end could not express, never tracked.
    Unknown(String),
}

impl Expr {
    pub fn local(name: impl Into<String>) -> Self {
        Expr::Local(name.into())
    }

    pub fn int(value: i64) -> Self {
        Expr::Literal(Literal::Int(value))
    }

    pub fn null() -> Self {
        Expr::Literal(Literal::Null)
    }

    pub fn field(receiver: Expr, field: impl Into<String>) -> Self {
        Expr::Field {
            receiver: Box::new(receiver),
            field: field.into(),
        }
    }

    pub fn length(array: Expr) -> Self {
        Expr::ArrayLength(Box::new(array))
    }

    pub fn access(array: Expr, index: Expr) -> Self {
        Expr::ArrayAccess {
            array: Box::new(array),
            index: Box::new(index),
        }
    }

    pub fn call(receiver: Option<Expr>, method: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            receiver: receiver.map(Box::new),
            method: method.into(),
            args,
        }
    }

    /// Removes redundant parentheses and spells `this` the same way
    /// everywhere, so equal locations get equal keys.
    pub fn canonical(&self) -> Expr {
        match self {
            Expr::Local(name) if name == "this" => Expr::This,
            Expr::Paren(inner) => inner.canonical(),
            Expr::Field { receiver, field } => Expr::field(receiver.canonical(), field.clone()),
            Expr::ArrayLength(array) => Expr::length(array.canonical()),
            Expr::ArrayAccess { array, index } => Expr::access(array.canonical(), index.canonical()),
            Expr::Call {
                receiver,
                method,
                args,
            } => Expr::call(
                receiver.as_deref().map(Expr::canonical),
                method.clone(),
                args.iter().map(Expr::canonical).collect(),
            ),
            Expr::Local(_) | Expr::This | Expr::Literal(_) | Expr::Unknown(_) => self.clone(),
        }
    }

    /// Whether facts about the expression can be kept in a store.
    pub fn is_trackable(&self) -> bool {
        match self {
            Expr::Local(_) | Expr::This => true,
            Expr::Field { receiver, .. } => receiver.is_trackable(),
            Expr::ArrayLength(array) => array.is_trackable(),
            Expr::ArrayAccess { array, index } => {
                array.is_trackable() && (index.is_trackable() || index.int_literal().is_some())
            }
            Expr::Call { receiver, args, .. } => {
                receiver.as_deref().is_none_or(Expr::is_trackable)
                    && args
                        .iter()
                        .all(|a| a.is_trackable() || matches!(a, Expr::Literal(_)))
            }
            Expr::Paren(inner) => inner.is_trackable(),
            Expr::Literal(_) | Expr::Unknown(_) => false,
        }
    }

    pub fn subexpressions(&self) -> Vec<&Expr> {
        match self {
            Expr::Field { receiver, .. } => vec![receiver.as_ref()],
            Expr::ArrayLength(array) | Expr::Paren(array) => vec![array.as_ref()],
            Expr::ArrayAccess { array, index } => vec![array.as_ref(), index.as_ref()],
            Expr::Call { receiver, args, .. } => {
                receiver.as_deref().into_iter().chain(args).collect()
            }
            Expr::Local(_) | Expr::This | Expr::Literal(_) | Expr::Unknown(_) => Vec::new(),
        }
    }

    /// Whether `other` occurs in this expression, including the expression
    /// itself.
    pub fn contains(&self, other: &Expr) -> bool {
        self == other || self.subexpressions().into_iter().any(|e| e.contains(other))
    }

    /// The locals read when evaluating the expression.
    pub fn locals(&self, out: &mut BTreeSet<String>) {
        if let Expr::Local(name) = self {
            out.insert(name.clone());
        }
        for sub in self.subexpressions() {
            sub.locals(out);
        }
    }

    pub fn int_literal(&self) -> Option<i64> {
        match self {
            Expr::Literal(Literal::Int(value)) => Some(*value),
            Expr::Paren(inner) => inner.int_literal(),
            _ => None,
        }
    }

    pub fn is_null_literal(&self) -> bool {
        match self {
            Expr::Literal(Literal::Null) => true,
            Expr::Paren(inner) => inner.is_null_literal(),
            _ => false,
        }
    }

    /// The expression whose value is dereferenced when evaluating this one.
    pub fn dereferenced(&self) -> Option<&Expr> {
        match self {
            Expr::Field { receiver, .. } => Some(receiver.as_ref()),
            Expr::ArrayLength(array) | Expr::ArrayAccess { array, .. } => Some(array.as_ref()),
            Expr::Call {
                receiver: Some(receiver),
                ..
            } => Some(receiver.as_ref()),
            Expr::Paren(inner) => inner.dereferenced(),
            _ => None,
        }
    }

    /// Instantiates a contract expression at a call site: `#1`, `#2`, ...
    /// stand for the arguments and `this` for the receiver, however it is
    /// spelled. Returns `None` when a placeholder has no matching argument.
    pub fn substitute(&self, receiver: Option<&Expr>, args: &[Expr]) -> Option<Expr> {
        Some(match self {
            Expr::Local(name) if name.starts_with('#') => {
                let idx: usize = name[1..].parse().ok()?;
                args.get(idx.checked_sub(1)?)?.clone()
            }
            Expr::Local(name) if name == "this" => receiver.cloned().unwrap_or(Expr::This),
            Expr::This => receiver.cloned().unwrap_or(Expr::This),
            Expr::Field { receiver: r, field } => {
                Expr::field(r.substitute(receiver, args)?, field.clone())
            }
            Expr::ArrayLength(array) => Expr::length(array.substitute(receiver, args)?),
            Expr::ArrayAccess { array, index } => Expr::access(
                array.substitute(receiver, args)?,
                index.substitute(receiver, args)?,
            ),
            Expr::Call {
                receiver: r,
                method,
                args: call_args,
            } => Expr::call(
                match r {
                    Some(r) => Some(r.substitute(receiver, args)?),
                    None => None,
                },
                method.clone(),
                call_args
                    .iter()
                    .map(|a| a.substitute(receiver, args))
                    .collect::<Option<_>>()?,
            ),
            Expr::Paren(inner) => inner.substitute(receiver, args)?,
            Expr::Local(_) | Expr::Literal(_) | Expr::Unknown(_) => self.clone(),
        })
    }
}

impl Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(value) => write!(f, "{value}"),
            Literal::Bool(value) => write!(f, "{value}"),
            Literal::Null => write!(f, "null"),
            Literal::Str(value) => write!(f, "{value:?}"),
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Local(name) => write!(f, "{name}"),
            Expr::This => write!(f, "this"),
            Expr::Field { receiver, field } => write!(f, "{receiver}.{field}"),
            Expr::ArrayLength(array) => write!(f, "{array}.length"),
            Expr::ArrayAccess { array, index } => write!(f, "{array}[{index}]"),
            Expr::Call {
                receiver: Some(receiver),
                method,
                args,
            } => write!(f, "{receiver}.{method}({})", args.iter().join(", ")),
            Expr::Call {
                receiver: None,
                method,
                args,
            } => write!(f, "{method}({})", args.iter().join(", ")),
            Expr::Literal(literal) => write!(f, "{literal}"),
            Expr::Paren(inner) => write!(f, "({inner})"),
            Expr::Unknown(text) => write!(f, "{text}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// The operator that gives the same result with the operands swapped.
    pub fn flip(self) -> Self {
        match self {
            CompareOp::Lt => CompareOp::Gt,
            CompareOp::Le => CompareOp::Ge,
            CompareOp::Gt => CompareOp::Lt,
            CompareOp::Ge => CompareOp::Le,
            CompareOp::Eq | CompareOp::Ne => self,
        }
    }

    /// The operator that holds exactly when this one does not.
    pub fn negate(self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Ne,
            CompareOp::Ne => CompareOp::Eq,
            CompareOp::Lt => CompareOp::Ge,
            CompareOp::Le => CompareOp::Gt,
            CompareOp::Gt => CompareOp::Le,
            CompareOp::Ge => CompareOp::Lt,
        }
    }
}

impl Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Neg => write!(f, "-"),
            UnaryOp::Not => write!(f, "!"),
        }
    }
}

impl Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Add => write!(f, "+"),
            BinaryOp::Sub => write!(f, "-"),
            BinaryOp::Mul => write!(f, "*"),
        }
    }
}

impl Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        };
        write!(f, "{text}")
    }
}

/// The nodes of the analyzed program. Nodes that compute a value store it
/// in their target, comparisons and type tests also decide the branch taken
/// by the following conditional block.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Node {
    Assign {
        target: Expr,
        value: Expr,
    },
    Unary {
        target: Expr,
        op: UnaryOp,
        operand: Expr,
    },
    Binary {
        target: Expr,
        op: BinaryOp,
        lhs: Expr,
        rhs: Expr,
    },
    Comparison {
        target: Option<Expr>,
        op: CompareOp,
        lhs: Expr,
        rhs: Expr,
    },
    Ternary {
        target: Expr,
        condition: Expr,
        then_value: Expr,
        else_value: Expr,
    },
    TypeCast {
        target: Expr,
        operand: Expr,
        ty: String,
    },
    InstanceOf {
        target: Option<Expr>,
        operand: Expr,
        ty: String,
    },
    MethodCall {
        target: Option<Expr>,
        receiver: Option<Expr>,
        method: String,
        args: Vec<Expr>,
    },
    ObjectCreation {
        target: Expr,
        class: String,
        args: Vec<Expr>,
    },
    ArrayCreation {
        target: Expr,
        length: Expr,
    },
    Return {
        value: Option<Expr>,
    },
}

impl Node {
    pub fn assign(target: Expr, value: Expr) -> Self {
        Node::Assign { target, value }
    }

    pub fn compare(op: CompareOp, lhs: Expr, rhs: Expr) -> Self {
        Node::Comparison {
            target: None,
            op,
            lhs,
            rhs,
        }
    }

    pub fn binary(target: Expr, op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Node::Binary {
            target,
            op,
            lhs,
            rhs,
        }
    }

    pub fn call(
        target: Option<Expr>,
        receiver: Option<Expr>,
        method: impl Into<String>,
        args: Vec<Expr>,
    ) -> Self {
        Node::MethodCall {
            target,
            receiver,
            method: method.into(),
            args,
        }
    }

    pub fn ret(value: Option<Expr>) -> Self {
        Node::Return { value }
    }

    /// The location the node writes.
    pub fn target(&self) -> Option<&Expr> {
        match self {
            Node::Assign { target, .. }
            | Node::Unary { target, .. }
            | Node::Binary { target, .. }
            | Node::Ternary { target, .. }
            | Node::TypeCast { target, .. }
            | Node::ObjectCreation { target, .. }
            | Node::ArrayCreation { target, .. } => Some(target),
            Node::Comparison { target, .. }
            | Node::InstanceOf { target, .. }
            | Node::MethodCall { target, .. } => target.as_ref(),
            Node::Return { .. } => None,
        }
    }

    /// The expressions the node evaluates, in evaluation order.
    pub fn operands(&self) -> Vec<&Expr> {
        match self {
            Node::Assign { value, .. } => vec![value],
            Node::Unary { operand, .. }
            | Node::TypeCast { operand, .. }
            | Node::InstanceOf { operand, .. } => vec![operand],
            Node::Binary { lhs, rhs, .. } | Node::Comparison { lhs, rhs, .. } => vec![lhs, rhs],
            Node::Ternary {
                condition,
                then_value,
                else_value,
                ..
            } => vec![condition, then_value, else_value],
            Node::MethodCall { receiver, args, .. } => {
                receiver.iter().chain(args).collect()
            }
            Node::ObjectCreation { args, .. } => args.iter().collect(),
            Node::ArrayCreation { length, .. } => vec![length],
            Node::Return { value } => value.iter().collect(),
        }
    }

    /// The expression a method call node evaluates to.
    pub fn call_expr(&self) -> Option<Expr> {
        match self {
            Node::MethodCall {
                receiver,
                method,
                args,
                ..
            } => Some(Expr::call(receiver.clone(), method.clone(), args.clone())),
            _ => None,
        }
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let assigned = |target: &Option<Expr>| match target {
            Some(target) => format!("{target} = "),
            None => String::new(),
        };
        match self {
            Node::Assign { target, value } => write!(f, "{target} = {value}"),
            Node::Unary {
                target,
                op,
                operand,
            } => write!(f, "{target} = {op}{operand}"),
            Node::Binary {
                target,
                op,
                lhs,
                rhs,
            } => write!(f, "{target} = {lhs} {op} {rhs}"),
            Node::Comparison {
                target,
                op,
                lhs,
                rhs,
            } => write!(f, "{}{lhs} {op} {rhs}", assigned(target)),
            Node::Ternary {
                target,
                condition,
                then_value,
                else_value,
            } => write!(f, "{target} = {condition} ? {then_value} : {else_value}"),
            Node::TypeCast {
                target,
                operand,
                ty,
            } => write!(f, "{target} = ({ty}) {operand}"),
            Node::InstanceOf {
                target,
                operand,
                ty,
            } => write!(f, "{}{operand} instanceof {ty}", assigned(target)),
            Node::MethodCall { target, .. } => match self.call_expr() {
                Some(call) => write!(f, "{}{call}", assigned(target)),
                None => Ok(()),
            },
            Node::ObjectCreation {
                target,
                class,
                args,
            } => write!(f, "{target} = new {class}({})", args.iter().join(", ")),
            Node::ArrayCreation { target, length } => write!(f, "{target} = new [{length}]"),
            Node::Return { value: Some(value) } => write!(f, "return {value}"),
            Node::Return { value: None } => write!(f, "return"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    kind: BlockKind,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    preds: Vec<usize>,
}

impl CfgBlock for Block {
    type Operation = Node;

    fn kind(&self) -> BlockKind {
        self.kind
    }

    fn operations(&self) -> &[Self::Operation] {
        &self.nodes
    }

    fn edges(&self) -> &[Edge] {
        &self.edges
    }

    fn predecessors(&self) -> &[usize] {
        &self.preds
    }
}

/// The control flow graph of one analyzed unit (a method or initializer),
/// as handed over by the front-end. Blocks live in an arena and refer to each
/// other by index.
///
/// The entry, the normal exit and the exceptional exit are created up front,
/// the rest is added with the builder methods.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cfg {
    name: String,
    formals: Vec<String>,
    blocks: Vec<Block>,
}

impl ControlFlowGraph for Cfg {
    type Block = Block;

    fn blocks(&self) -> &[Self::Block] {
        &self.blocks
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Cfg {
    pub const ENTRY: usize = 0;
    pub const EXIT: usize = 1;
    pub const EXCEPTIONAL_EXIT: usize = 2;

    pub fn new(name: impl Into<String>, formals: Vec<String>) -> Self {
        let mut cfg = Self {
            name: name.into(),
            formals,
            blocks: Vec::new(),
        };
        for kind in [
            SpecialBlockKind::Entry,
            SpecialBlockKind::Exit,
            SpecialBlockKind::ExceptionalExit,
        ] {
            cfg.add_block(BlockKind::Special(kind), Vec::new());
        }
        cfg
    }

    pub fn add_block(&mut self, kind: BlockKind, nodes: Vec<Node>) -> usize {
        self.blocks.push(Block {
            kind,
            nodes,
            edges: Vec::new(),
            preds: Vec::new(),
        });
        self.blocks.len() - 1
    }

    pub fn regular(&mut self, nodes: impl IntoIterator<Item = Node>) -> usize {
        self.add_block(BlockKind::Regular, nodes.into_iter().collect())
    }

    pub fn conditional(&mut self) -> usize {
        self.add_block(BlockKind::Conditional, Vec::new())
    }

    /// A block holding a single node that might throw.
    pub fn exception(&mut self, node: Node) -> usize {
        self.add_block(BlockKind::Exception, vec![node])
    }

    pub fn add_labeled_edge(&mut self, from: usize, edge: Edge) -> &mut Self {
        let to = edge.target;
        self.blocks[from].edges.push(edge);
        if !self.blocks[to].preds.contains(&from) {
            self.blocks[to].preds.push(from);
        }
        self
    }

    pub fn add_edge(&mut self, from: usize, to: usize) -> &mut Self {
        self.add_labeled_edge(from, Edge::normal(to))
    }

    pub fn add_branch(&mut self, condition: usize, then: usize, otherwise: usize) -> &mut Self {
        self.add_labeled_edge(condition, Edge::then(then))
            .add_labeled_edge(condition, Edge::otherwise(otherwise))
    }

    pub fn add_exceptional_edge(
        &mut self,
        from: usize,
        to: usize,
        cause: impl Into<String>,
    ) -> &mut Self {
        self.add_labeled_edge(from, Edge::exceptional(to, cause))
    }

    pub fn formals(&self) -> &[String] {
        &self.formals
    }

    pub fn node(&self, pos: OpPos) -> Option<&Node> {
        self.blocks.get(pos.block_id)?.nodes.get(pos.op_id)
    }

    /// Positions of all nodes, in block order.
    pub fn positions(&self) -> impl Iterator<Item = OpPos> + '_ {
        self.blocks.iter().enumerate().flat_map(|(block_id, block)| {
            (0..block.nodes.len()).map(move |op_id| OpPos { block_id, op_id })
        })
    }

    /// The causes of the exceptional edges leaving a block.
    pub fn exception_causes(&self, block: usize) -> impl Iterator<Item = &str> + '_ {
        self.blocks[block].edges.iter().filter_map(|e| match &e.label {
            EdgeLabel::Exceptional(cause) => Some(cause.as_str()),
            _ => None,
        })
    }

    /// Every local variable name the unit mentions, formals included.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut result: BTreeSet<String> = self.formals.iter().cloned().collect();
        for block in &self.blocks {
            for node in &block.nodes {
                for expr in node.target().into_iter().chain(node.operands()) {
                    expr.locals(&mut result);
                }
            }
        }
        result
    }
}

pub fn print_node(node: &Node) -> String {
    format!("{node};")
}
