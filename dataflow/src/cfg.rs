use core::cmp::Reverse;
use core::fmt::Write;
use std::collections::HashSet;

use fixedbitset::FixedBitSet;
use priority_queue::PriorityQueue;

use crate::error::FlowError;

/// Position of a node within the control flow graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpPos {
    pub block_id: usize,
    pub op_id: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpecialBlockKind {
    Entry,
    Exit,
    ExceptionalExit,
}

/// The shape of a block decides how the solvers route stores out of it:
/// * Regular blocks run their nodes in order and have a single successor.
/// * Conditional blocks hold no nodes, they send the then store along the
///   then edge and the else store along the else edge.
/// * Exception blocks hold exactly one node that might throw. Besides the
///   normal successor, they have a successor per exception cause.
/// * Special blocks mark the entry and the exits of the unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Regular,
    Conditional,
    Exception,
    Special(SpecialBlockKind),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EdgeLabel {
    Normal,
    Then,
    Else,
    /// Taken when the node of an exception block throws the named exception.
    Exceptional(String),
}

/// Selects which of the stores leaving a block are sent along an edge, and
/// into which store of the successor they land. Short-circuiting boolean
/// operators use the non-default rules to keep then and else stores apart.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FlowRule {
    /// Then store to then store, else store to else store. A single regular
    /// store goes to both.
    #[default]
    EachToEach,
    ThenToBoth,
    ElseToBoth,
    ThenToThen,
    ElseToElse,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Edge {
    pub target: usize,
    pub label: EdgeLabel,
    pub flow_rule: FlowRule,
}

impl Edge {
    pub fn normal(target: usize) -> Self {
        Self {
            target,
            label: EdgeLabel::Normal,
            flow_rule: FlowRule::EachToEach,
        }
    }

    pub fn then(target: usize) -> Self {
        Self {
            target,
            label: EdgeLabel::Then,
            flow_rule: FlowRule::ThenToBoth,
        }
    }

    pub fn otherwise(target: usize) -> Self {
        Self {
            target,
            label: EdgeLabel::Else,
            flow_rule: FlowRule::ElseToBoth,
        }
    }

    pub fn exceptional(target: usize, cause: impl Into<String>) -> Self {
        Self {
            target,
            label: EdgeLabel::Exceptional(cause.into()),
            flow_rule: FlowRule::EachToEach,
        }
    }

    pub fn with_rule(mut self, flow_rule: FlowRule) -> Self {
        self.flow_rule = flow_rule;
        self
    }
}

pub trait CfgBlock {
    type Operation;

    fn kind(&self) -> BlockKind;
    fn operations(&self) -> &[Self::Operation];
    fn edges(&self) -> &[Edge];
    fn predecessors(&self) -> &[usize];

    fn successors(&self) -> impl DoubleEndedIterator<Item = usize> + '_ {
        self.edges().iter().map(|e| e.target)
    }

    fn successor(&self, label: &EdgeLabel) -> Option<usize> {
        self.edges()
            .iter()
            .find(|e| e.label == *label)
            .map(|e| e.target)
    }
}

pub trait ControlFlowGraph {
    type Block: CfgBlock;

    fn blocks(&self) -> &[Self::Block];

    /// The name of the analyzed unit, used in diagnostics.
    fn name(&self) -> &str {
        "<anonymous>"
    }

    fn entry(&self) -> usize {
        0
    }

    fn special_block(&self, kind: SpecialBlockKind) -> Option<usize> {
        self.blocks()
            .iter()
            .position(|b| b.kind() == BlockKind::Special(kind))
    }
}

pub type OperationOf<Cfg> = <<Cfg as ControlFlowGraph>::Block as CfgBlock>::Operation;

/// Check that every block has the shape its kind promises. The solvers
/// assume a validated graph.
pub fn validate<Cfg: ControlFlowGraph>(cfg: &Cfg) -> Result<(), (usize, FlowError)> {
    let block_num = cfg.blocks().len();
    if cfg.entry() >= block_num {
        return Err((cfg.entry(), FlowError::malformed("entry block does not exist")));
    }
    for (id, block) in cfg.blocks().iter().enumerate() {
        let fail = |reason: &str| Err((id, FlowError::malformed(reason)));
        if let Some(edge) = block.edges().iter().find(|e| e.target >= block_num) {
            return Err((
                id,
                FlowError::malformed(format!("edge to non-existent block {}", edge.target)),
            ));
        }

        let count = |pred: fn(&EdgeLabel) -> bool| {
            block.edges().iter().filter(|e| pred(&e.label)).count()
        };
        let normal = count(|l| *l == EdgeLabel::Normal);
        let then = count(|l| *l == EdgeLabel::Then);
        let otherwise = count(|l| *l == EdgeLabel::Else);
        let exceptional = count(|l| matches!(l, EdgeLabel::Exceptional(_)));

        match block.kind() {
            BlockKind::Regular => {
                if normal != 1 || block.edges().len() != 1 {
                    return fail("regular block needs exactly one normal successor");
                }
            }
            BlockKind::Conditional => {
                if !block.operations().is_empty() {
                    return fail("conditional block holds nodes");
                }
                if then != 1 || otherwise != 1 || block.edges().len() != 2 {
                    return fail("conditional block needs a then and an else successor");
                }
            }
            BlockKind::Exception => {
                if block.operations().len() != 1 {
                    return fail("exception block needs exactly one node");
                }
                if normal > 1 || normal + exceptional != block.edges().len() {
                    return fail("exception block has unexpected successors");
                }
            }
            BlockKind::Special(kind) => {
                if !block.operations().is_empty() {
                    return fail("special block holds nodes");
                }
                let expected_edges = usize::from(kind == SpecialBlockKind::Entry);
                if normal != expected_edges || block.edges().len() != expected_edges {
                    return fail("special block has unexpected successors");
                }
            }
        }
    }
    Ok(())
}

/// Renders the graph in graphviz format.
pub fn print<Cfg, OpPrinter>(name: Option<&str>, cfg: &Cfg, printer: OpPrinter) -> String
where
    Cfg: ControlFlowGraph,
    OpPrinter: Fn(&OperationOf<Cfg>) -> String,
{
    print_with_annotations(name, cfg, printer, |_| None)
}

/// Like [`print`], but `annotate` can add extra lines after the operations
/// of each block, e.g., the analysis state.
pub fn print_with_annotations<Cfg, OpPrinter, Annotator>(
    name: Option<&str>,
    cfg: &Cfg,
    printer: OpPrinter,
    annotate: Annotator,
) -> String
where
    Cfg: ControlFlowGraph,
    OpPrinter: Fn(&OperationOf<Cfg>) -> String,
    Annotator: Fn(usize) -> Option<String>,
{
    let mut output = match name {
        Some(name) => format!("digraph \"{name}\" {{\n"),
        None => "digraph CFG {\n".to_owned(),
    };
    for (counter, block) in cfg.blocks().iter().enumerate() {
        let mut text: Vec<_> = match block.kind() {
            BlockKind::Special(kind) => vec![format!("{kind:?}")],
            _ => block.operations().iter().map(&printer).collect(),
        };
        if let Some(annotation) = annotate(counter) {
            text.push(annotation);
        }
        let label = escape(&text.join("\n"));
        writeln!(output, "  Node_{counter}[label=\"{label}\"]").unwrap();
    }
    output.push('\n');
    for (counter, block) in cfg.blocks().iter().enumerate() {
        for edge in block.edges() {
            match &edge.label {
                EdgeLabel::Normal => {
                    writeln!(output, "  Node_{counter} -> Node_{}", edge.target).unwrap()
                }
                EdgeLabel::Then => writeln!(
                    output,
                    "  Node_{counter} -> Node_{}[label=\"then\"]",
                    edge.target
                )
                .unwrap(),
                EdgeLabel::Else => writeln!(
                    output,
                    "  Node_{counter} -> Node_{}[label=\"else\"]",
                    edge.target
                )
                .unwrap(),
                EdgeLabel::Exceptional(cause) => writeln!(
                    output,
                    "  Node_{counter} -> Node_{}[label=\"{}\", style=dashed]",
                    edge.target,
                    escape(cause)
                )
                .unwrap(),
            }
        }
    }
    output.push_str("}\n");
    output
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Depth first traversal from the entry visiting successors in reverse
/// order. Returns the post order and the edges pointing to a block that is
/// on the traversal stack.
fn depth_first<Cfg: ControlFlowGraph>(cfg: &Cfg) -> (Vec<usize>, Vec<(usize, usize)>) {
    let blocks = cfg.blocks();
    let mut post_order = Vec::with_capacity(blocks.len());
    let mut back_edges = Vec::new();
    if blocks.is_empty() {
        return (post_order, back_edges);
    }

    let mut visited = FixedBitSet::with_capacity(blocks.len());
    let mut on_stack = FixedBitSet::with_capacity(blocks.len());
    let successors = |id: usize| blocks[id].successors().rev().collect::<Vec<_>>();

    let entry = cfg.entry();
    visited.insert(entry);
    on_stack.insert(entry);
    let mut stack = vec![(entry, successors(entry), 0_usize)];
    while let Some((current, succs, next)) = stack.last_mut() {
        if let Some(&succ) = succs.get(*next) {
            *next += 1;
            let current = *current;
            if on_stack.contains(succ) {
                back_edges.push((current, succ));
            } else if !visited.contains(succ) {
                visited.insert(succ);
                on_stack.insert(succ);
                stack.push((succ, successors(succ), 0));
            }
        } else {
            on_stack.set(*current, false);
            post_order.push(*current);
            stack.pop();
        }
    }
    (post_order, back_edges)
}

/// Edges whose target is on the depth first traversal stack from the entry.
/// For reducible graphs, these are the edges going to loop heads.
pub fn get_back_edges<Cfg: ControlFlowGraph>(cfg: &Cfg) -> HashSet<(usize, usize)> {
    depth_first(cfg).1.into_iter().collect()
}

/// A worklist that always returns the queued block that comes first in the
/// chosen traversal order, and never contains duplicates. Forward solvers
/// use reverse post-order so a block is usually processed after all of its
/// predecessors. Backward solvers use post-order. Blocks unreachable from
/// the entry come after the reachable ones.
pub struct RPOWorklist {
    queue: PriorityQueue<usize, Reverse<usize>>,
    order: Vec<usize>,
}

impl RPOWorklist {
    pub fn new<Cfg: ControlFlowGraph>(cfg: &Cfg) -> Self {
        let (mut post_order, _) = depth_first(cfg);
        post_order.reverse();
        Self::from_traversal(cfg, post_order)
    }

    pub fn new_backward<Cfg: ControlFlowGraph>(cfg: &Cfg) -> Self {
        let (post_order, _) = depth_first(cfg);
        Self::from_traversal(cfg, post_order)
    }

    fn from_traversal<Cfg: ControlFlowGraph>(cfg: &Cfg, traversal: Vec<usize>) -> Self {
        let block_num = cfg.blocks().len();
        let mut order = vec![usize::MAX; block_num];
        for (idx, &block) in traversal.iter().enumerate() {
            order[block] = idx;
        }
        let mut next = traversal.len();
        for slot in order.iter_mut().filter(|o| **o == usize::MAX) {
            *slot = next;
            next += 1;
        }
        Self {
            queue: PriorityQueue::with_capacity(block_num),
            order,
        }
    }

    pub fn get_rpo_order(&self, block: usize) -> usize {
        self.order[block]
    }

    pub fn push(&mut self, block: usize) {
        self.queue.push(block, Reverse(self.order[block]));
    }

    pub fn push_successors<Cfg: ControlFlowGraph>(&mut self, block: usize, cfg: &Cfg) {
        for succ in cfg.blocks()[block].successors() {
            self.push(succ);
        }
    }

    pub fn pop(&mut self) -> Option<usize> {
        self.queue.pop().map(|(block, _)| block)
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
