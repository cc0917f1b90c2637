//! Control flow graph model
//!
//! Blocks and nodes live in two arenas owned by [`Cfg`]; every cross
//! reference is an index. A `Cfg` is only ever produced through
//! [`Cfg::from_parts`], which validates the structural invariants, so a value
//! of this type is always well formed.

use super::node::{Node, NodeId};
use crate::error::{CfgError, CfgResult};
use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{depth_first_search, DfsEvent};
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};
use std::collections::HashSet;
use std::fmt;

/// Index of a block in its CFG's block arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub usize);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block {}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialKind {
    Entry,
    Exit,
    ExceptionalExit,
    LoopHead,
}

impl SpecialKind {
    pub fn name(self) -> &'static str {
        match self {
            SpecialKind::Entry => "entry",
            SpecialKind::Exit => "exit",
            SpecialKind::ExceptionalExit => "exceptional-exit",
            SpecialKind::LoopHead => "loop-head",
        }
    }

    fn is_exit(self) -> bool {
        matches!(self, SpecialKind::Exit | SpecialKind::ExceptionalExit)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    Regular {
        successor: BlockId,
    },
    /// Empty block routing on `condition`, the last node of its only
    /// predecessor.
    Conditional {
        condition: NodeId,
        then_successor: BlockId,
        else_successor: BlockId,
    },
    /// Holds exactly one node that may raise. `successor` is absent when the
    /// node never completes normally (`throw`, failed assertion).
    Exceptional {
        successor: Option<BlockId>,
        exceptional: IndexMap<String, BlockId>,
    },
    Special {
        kind: SpecialKind,
        successor: Option<BlockId>,
    },
}

impl BlockKind {
    pub fn name(&self) -> &'static str {
        match self {
            BlockKind::Regular { .. } => "regular",
            BlockKind::Conditional { .. } => "conditional",
            BlockKind::Exceptional { .. } => "exceptional",
            BlockKind::Special { kind, .. } => kind.name(),
        }
    }

    /// Successors in a fixed order: normal successor first, then exceptional
    /// successors in declaration order. A conditional block whose two arms
    /// coincide still lists the target twice.
    pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
        match self {
            BlockKind::Regular { successor } => smallvec![*successor],
            BlockKind::Conditional {
                then_successor,
                else_successor,
                ..
            } => smallvec![*then_successor, *else_successor],
            BlockKind::Exceptional { successor, exceptional } => {
                successor.iter().chain(exceptional.values()).copied().collect()
            }
            BlockKind::Special { successor, .. } => successor.iter().copied().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: BlockId,
    pub nodes: Vec<NodeId>,
    pub kind: BlockKind,
}

impl Block {
    pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
        self.kind.successors()
    }

    pub fn last_node(&self) -> Option<NodeId> {
        self.nodes.last().copied()
    }
}

/// Raw material for a [`Cfg`]: arenas plus the designated special blocks.
#[derive(Debug, Clone)]
pub struct CfgParts {
    pub name: String,
    pub blocks: Vec<Block>,
    pub nodes: Vec<Node>,
    pub entry: BlockId,
    pub exit: BlockId,
    pub exceptional_exit: BlockId,
}

#[derive(Debug, Clone)]
pub struct Cfg {
    name: String,
    blocks: Vec<Block>,
    nodes: Vec<Node>,
    entry: BlockId,
    exit: BlockId,
    exceptional_exit: BlockId,
    predecessors: Vec<SmallVec<[BlockId; 4]>>,
    unreachable: Vec<BlockId>,
}

impl Cfg {
    /// Validate `parts` and derive predecessor sets and the unreachable set.
    pub fn from_parts(parts: CfgParts) -> CfgResult<Self> {
        let CfgParts {
            name,
            blocks,
            nodes,
            entry,
            exit,
            exceptional_exit,
        } = parts;

        for (index, block) in blocks.iter().enumerate() {
            if block.id.0 != index {
                return Err(CfgError::BlockIdMismatch { index, id: block.id });
            }
            for succ in block.successors() {
                if succ.0 >= blocks.len() {
                    return Err(CfgError::DanglingEdge { from: block.id, to: succ });
                }
            }
        }
        for special in [entry, exit, exceptional_exit] {
            if special.0 >= blocks.len() {
                return Err(CfgError::DanglingEdge {
                    from: special,
                    to: special,
                });
            }
        }

        for (index, node) in nodes.iter().enumerate() {
            if node.id.0 != index {
                return Err(CfgError::NodeIdMismatch { index, id: node.id });
            }
            if let Some(&operand) = node.kind.operands().iter().find(|operand| operand.0 >= nodes.len()) {
                return Err(CfgError::DanglingOperand { node: node.id, operand });
            }
        }

        let mut predecessors: Vec<SmallVec<[BlockId; 4]>> = vec![SmallVec::new(); blocks.len()];
        for block in &blocks {
            for succ in block.successors() {
                if !predecessors[succ.0].contains(&block.id) {
                    predecessors[succ.0].push(block.id);
                }
            }
        }

        let mut cfg = Self {
            name,
            blocks,
            nodes,
            entry,
            exit,
            exceptional_exit,
            predecessors,
            unreachable: Vec::new(),
        };
        cfg.validate()?;

        let reachable: HashSet<BlockId> = cfg.reverse_postorder().into_iter().collect();
        cfg.unreachable = cfg
            .blocks
            .iter()
            .map(|b| b.id)
            .filter(|id| !reachable.contains(id))
            .collect();
        Ok(cfg)
    }

    /// Check every structural invariant of the graph.
    pub fn validate(&self) -> CfgResult<()> {
        let mut listed = vec![false; self.nodes.len()];
        for block in &self.blocks {
            for &node_id in &block.nodes {
                let node = self.nodes.get(node_id.0).ok_or(CfgError::OrphanNode { node: node_id })?;
                if node.block != block.id {
                    return Err(CfgError::NodeBlockMismatch {
                        node: node_id,
                        claimed: node.block,
                        actual: block.id,
                    });
                }
                listed[node_id.0] = true;
            }
            self.validate_block(block)?;
        }
        if let Some(orphan) = listed.iter().position(|seen| !seen) {
            return Err(CfgError::OrphanNode { node: NodeId(orphan) });
        }
        Ok(())
    }

    fn validate_block(&self, block: &Block) -> CfgResult<()> {
        match &block.kind {
            BlockKind::Regular { .. } => Ok(()),
            BlockKind::Conditional { condition, .. } => {
                if !block.nodes.is_empty() {
                    return Err(CfgError::NonEmptyBlock {
                        block: block.id,
                        kind: "conditional",
                    });
                }
                let preds = &self.predecessors[block.id.0];
                let ends_with_condition = preds.len() == 1 && self.blocks[preds[0].0].last_node() == Some(*condition);
                if !ends_with_condition {
                    return Err(CfgError::ConditionNotInPredecessor {
                        block: block.id,
                        condition: *condition,
                    });
                }
                Ok(())
            }
            BlockKind::Exceptional { successor, exceptional } => {
                if block.nodes.len() != 1 {
                    return Err(CfgError::ExceptionalContents {
                        block: block.id,
                        found: block.nodes.len(),
                    });
                }
                let found = usize::from(successor.is_some()) + exceptional.len();
                if found == 0 {
                    return Err(CfgError::SuccessorCount {
                        block: block.id,
                        kind: "exceptional",
                        found,
                    });
                }
                Ok(())
            }
            BlockKind::Special { kind, successor } => {
                if !block.nodes.is_empty() {
                    return Err(CfgError::NonEmptyBlock {
                        block: block.id,
                        kind: kind.name(),
                    });
                }
                match (kind.is_exit(), successor) {
                    (true, Some(_)) => Err(CfgError::ExitHasSuccessors(block.id)),
                    (false, None) => Err(CfgError::SuccessorCount {
                        block: block.id,
                        kind: kind.name(),
                        found: 0,
                    }),
                    _ => Ok(()),
                }
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0]
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn entry(&self) -> BlockId {
        self.entry
    }

    pub fn exit(&self) -> BlockId {
        self.exit
    }

    pub fn exceptional_exit(&self) -> BlockId {
        self.exceptional_exit
    }

    pub fn successors(&self, id: BlockId) -> SmallVec<[BlockId; 2]> {
        self.blocks[id.0].successors()
    }

    pub fn predecessors(&self, id: BlockId) -> &[BlockId] {
        &self.predecessors[id.0]
    }

    /// Blocks not reachable from the entry. They are kept in the graph.
    pub fn unreachable_blocks(&self) -> &[BlockId] {
        &self.unreachable
    }

    pub fn is_reachable(&self, id: BlockId) -> bool {
        !self.unreachable.contains(&id)
    }

    /// Reachable blocks in reverse postorder (useful for forward dataflow)
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut order = self.postorder();
        order.reverse();
        order
    }

    /// Reachable blocks in postorder, visiting successors in their listed order
    pub fn postorder(&self) -> Vec<BlockId> {
        let mut visited = vec![false; self.blocks.len()];
        let mut postorder = Vec::with_capacity(self.blocks.len());
        let mut stack: Vec<(BlockId, usize)> = vec![(self.entry, 0)];
        visited[self.entry.0] = true;

        while let Some((block, next)) = stack.pop() {
            let succs = self.successors(block);
            if let Some(&succ) = succs.get(next) {
                stack.push((block, next + 1));
                if !visited[succ.0] {
                    visited[succ.0] = true;
                    stack.push((succ, 0));
                }
            } else {
                postorder.push(block);
            }
        }
        postorder
    }

    /// The block graph as a petgraph graph; node weights are block ids.
    pub fn graph(&self) -> DiGraph<BlockId, ()> {
        let mut graph = DiGraph::with_capacity(self.blocks.len(), self.blocks.len() * 2);
        for block in &self.blocks {
            graph.add_node(block.id);
        }
        for block in &self.blocks {
            for succ in block.successors() {
                graph.update_edge(NodeIndex::new(block.id.0), NodeIndex::new(succ.0), ());
            }
        }
        graph
    }

    /// Edges closing a cycle in a depth-first walk from the entry
    pub fn back_edges(&self) -> Vec<(BlockId, BlockId)> {
        let graph = self.graph();
        let mut edges = Vec::new();
        depth_first_search(&graph, Some(NodeIndex::new(self.entry.0)), |event| {
            if let DfsEvent::BackEdge(from, to) = event {
                edges.push((graph[from], graph[to]));
            }
        });
        edges
    }

    pub fn has_cycle(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.graph())
    }
}

impl fmt::Display for Cfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "cfg `{}`: {} blocks, {} nodes",
            self.name,
            self.blocks.len(),
            self.nodes.len()
        )?;
        for block in &self.blocks {
            write!(f, "{} [{}]", block.id, block.kind.name())?;
            if !self.is_reachable(block.id) {
                write!(f, " (unreachable)")?;
            }
            match &block.kind {
                BlockKind::Conditional {
                    condition,
                    then_successor,
                    else_successor,
                } => write!(f, " on #{}: then -> {}, else -> {}", condition.0, then_successor.0, else_successor.0)?,
                BlockKind::Exceptional { successor, exceptional } => {
                    if let Some(succ) = successor {
                        write!(f, " -> {}", succ.0)?;
                    }
                    for (category, target) in exceptional {
                        write!(f, " {category} -> {}", target.0)?;
                    }
                }
                BlockKind::Regular { successor } => write!(f, " -> {}", successor.0)?,
                BlockKind::Special { successor, .. } => {
                    if let Some(succ) = successor {
                        write!(f, " -> {}", succ.0)?;
                    }
                }
            }
            writeln!(f)?;
            for &node in &block.nodes {
                writeln!(f, "  #{}: {}", node.0, self.nodes[node.0].kind)?;
            }
        }
        Ok(())
    }
}
