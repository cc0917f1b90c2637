//! CFG construction from the lowered statement tree
//!
//! Blocks are drafted with open exits and closed as control moves on. Boolean
//! tests lower to conditional blocks (jump lowering for `&&`, `||`, `!` and
//! `?:`), every node that may raise gets an exceptional block of its own, and
//! `finally` bodies are copied onto each path that leaves a protected region.
//! Empty regular blocks are removed before the graph is validated.

use super::cfg::{Block, BlockId, BlockKind, Cfg, CfgParts, SpecialKind};
use super::node::{LocalVar, Node, NodeId, NodeKind, NodeTarget};
use crate::error::{CfgError, CfgResult};
use crate::hir::{AnalysisUnit, AssignTarget, BinOp, CatchHandler, HirExpr, HirStmt, UnaryOp};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace};

/// Raised by every call and object creation
pub const RUNTIME_EXCEPTION: &str = "RuntimeException";
/// Raised by a failed assertion
pub const ASSERTION_ERROR: &str = "AssertionError";
/// Handler category that catches everything
pub const CATCH_ALL: &str = "*";

#[derive(Debug)]
enum Exits {
    Open,
    Goto(BlockId),
    Branch {
        condition: NodeId,
        then_successor: BlockId,
        else_successor: BlockId,
    },
    Raise {
        successor: Option<BlockId>,
        exceptional: IndexMap<String, BlockId>,
        terminal: bool,
    },
    Special {
        kind: SpecialKind,
        successor: Option<BlockId>,
    },
}

#[derive(Debug)]
struct Draft {
    nodes: Vec<NodeId>,
    exits: Exits,
}

#[derive(Debug, Clone)]
enum Frame<'a> {
    Loop {
        label: Option<&'a str>,
        continue_target: BlockId,
        break_target: BlockId,
    },
    /// Catch clauses active while the protected body is built
    Handlers(Vec<(&'a str, BlockId)>),
    Finally {
        id: usize,
        body: &'a [HirStmt],
    },
}

/// Builder for constructing a CFG from one analysis unit
pub struct CfgBuilder<'a> {
    name: String,
    drafts: Vec<Draft>,
    nodes: Vec<Node>,
    current: Option<BlockId>,
    entry: BlockId,
    exit: BlockId,
    exceptional_exit: BlockId,
    frames: Vec<Frame<'a>>,
    scopes: Vec<HashMap<&'a str, LocalVar>>,
    next_finally: usize,
    finally_paths: HashMap<(Vec<usize>, BlockId), BlockId>,
}

impl<'a> CfgBuilder<'a> {
    pub fn new(name: impl Into<String>) -> Self {
        let mut builder = Self {
            name: name.into(),
            drafts: Vec::new(),
            nodes: Vec::new(),
            current: None,
            entry: BlockId(0),
            exit: BlockId(0),
            exceptional_exit: BlockId(0),
            frames: Vec::new(),
            scopes: Vec::new(),
            next_finally: 0,
            finally_paths: HashMap::new(),
        };
        builder.entry = builder.new_special(SpecialKind::Entry);
        builder.exit = builder.new_special(SpecialKind::Exit);
        builder.exceptional_exit = builder.new_special(SpecialKind::ExceptionalExit);
        builder
    }

    pub fn build_unit(mut self, unit: &'a AnalysisUnit) -> CfgResult<Cfg> {
        let params = unit
            .params
            .iter()
            .map(|p| (p.name.as_str(), LocalVar::parameter(p.name.clone(), p.qualifier.clone())))
            .collect();
        self.scopes.push(params);

        let first = self.new_block();
        self.link(self.entry, first);
        self.current = Some(first);
        self.block_stmts(&unit.body)?;

        // Falling off the end returns normally
        let exit = self.exit;
        self.close_with(exit);
        self.finish()
    }

    fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.drafts.len());
        self.drafts.push(Draft {
            nodes: Vec::new(),
            exits: Exits::Open,
        });
        id
    }

    fn new_special(&mut self, kind: SpecialKind) -> BlockId {
        let id = BlockId(self.drafts.len());
        self.drafts.push(Draft {
            nodes: Vec::new(),
            exits: Exits::Special { kind, successor: None },
        });
        id
    }

    /// Connect the pending exit of `from` to `to`. Closed exits are left alone.
    fn link(&mut self, from: BlockId, to: BlockId) {
        let exits = &mut self.drafts[from.0].exits;
        match exits {
            Exits::Open => *exits = Exits::Goto(to),
            Exits::Raise {
                successor,
                terminal: false,
                ..
            }
            | Exits::Special { successor, .. } => {
                if successor.is_none() {
                    *successor = Some(to);
                }
            }
            _ => {}
        }
    }

    /// End the current path with a jump to `target`.
    fn close_with(&mut self, target: BlockId) {
        if let Some(current) = self.current.take() {
            self.link(current, target);
        }
    }

    fn is_open(&self, block: BlockId) -> bool {
        matches!(self.drafts[block.0].exits, Exits::Open)
    }

    /// Block that accepts the next node, starting a fresh one where needed.
    /// Code after a jump lands in a fresh block without predecessors.
    fn open_block(&mut self) -> BlockId {
        match self.current {
            Some(block) if self.is_open(block) => block,
            previous => {
                let block = self.new_block();
                if let Some(previous) = previous {
                    self.link(previous, block);
                }
                self.current = Some(block);
                block
            }
        }
    }

    fn push_node(&mut self, block: BlockId, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node { id, block, kind });
        self.drafts[block.0].nodes.push(id);
        id
    }

    fn emit(&mut self, kind: NodeKind) -> NodeId {
        let block = self.open_block();
        self.push_node(block, kind)
    }

    /// Place a node that may raise `categories` in an exceptional block of its
    /// own. A terminal node never completes normally.
    fn emit_raising(&mut self, kind: NodeKind, categories: &[&str], terminal: bool) -> CfgResult<NodeId> {
        let mut exceptional = IndexMap::new();
        for &category in categories {
            if category.is_empty() {
                return Err(CfgError::EmptyExceptionCategory);
            }
            if !exceptional.contains_key(category) {
                let target = self.exception_target(category)?;
                exceptional.insert(category.to_string(), target);
            }
        }

        let block = match self.current {
            Some(block) if self.is_open(block) && self.drafts[block.0].nodes.is_empty() => block,
            previous => {
                let block = self.new_block();
                if let Some(previous) = previous {
                    self.link(previous, block);
                }
                block
            }
        };
        let id = self.push_node(block, kind);
        self.drafts[block.0].exits = Exits::Raise {
            successor: None,
            exceptional,
            terminal,
        };
        self.current = if terminal { None } else { Some(block) };
        Ok(id)
    }

    /// Route `condition`'s outcome: `condition` must be the last node emitted.
    fn branch(&mut self, condition: NodeId, then_successor: BlockId, else_successor: BlockId) {
        let from = self.nodes[condition.0].block;
        let test = self.new_block();
        self.drafts[test.0].exits = Exits::Branch {
            condition,
            then_successor,
            else_successor,
        };
        self.link(from, test);
        self.current = None;
    }

    /// Nearest handler for `category`, reached through any `finally` bodies
    /// in between; the exceptional exit when nothing catches it.
    fn exception_target(&mut self, category: &str) -> CfgResult<BlockId> {
        let handler = self.frames.iter().enumerate().rev().find_map(|(index, frame)| match frame {
            Frame::Handlers(handlers) => handlers
                .iter()
                .find(|(caught, _)| *caught == category || *caught == CATCH_ALL)
                .map(|(_, target)| (index + 1, *target)),
            _ => None,
        });
        let (depth, dest) = handler.unwrap_or((0, self.exceptional_exit));
        self.abrupt_path(depth, dest)
    }

    /// Entry of the path from the current position to `dest`, which lies
    /// outside `frames[depth..]`: a copy of every `finally` body in those
    /// frames, innermost first, followed by `dest`.
    fn abrupt_path(&mut self, depth: usize, dest: BlockId) -> CfgResult<BlockId> {
        let crossed: Vec<(usize, usize, &'a [HirStmt])> = self.frames[depth..]
            .iter()
            .enumerate()
            .rev()
            .filter_map(|(offset, frame)| match frame {
                Frame::Finally { id, body } => Some((depth + offset, *id, *body)),
                _ => None,
            })
            .collect();
        if crossed.is_empty() {
            return Ok(dest);
        }

        let key = (crossed.iter().map(|(_, id, _)| *id).collect::<Vec<_>>(), dest);
        if let Some(&start) = self.finally_paths.get(&key) {
            return Ok(start);
        }

        let saved_frames = self.frames.clone();
        let saved_current = self.current.take();
        let start = self.new_block();
        self.current = Some(start);
        for (index, _, body) in &crossed {
            // The copy runs outside the region its finally protects
            self.frames.truncate(*index);
            self.block_stmts(body)?;
        }
        self.close_with(dest);
        self.frames = saved_frames;
        self.current = saved_current;

        trace!(finally_bodies = crossed.len(), %dest, %start, "copied finally path");
        self.finally_paths.insert(key, start);
        Ok(start)
    }

    fn declare(&mut self, name: &'a str, var: LocalVar) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, var);
        }
    }

    fn lookup(&self, name: &str) -> LocalVar {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).cloned())
            .unwrap_or_else(|| LocalVar::local(name, None))
    }

    fn block_stmts(&mut self, stmts: &'a [HirStmt]) -> CfgResult<()> {
        self.scopes.push(HashMap::new());
        for stmt in stmts {
            self.build_stmt(stmt)?;
        }
        self.scopes.pop();
        Ok(())
    }

    fn build_stmt(&mut self, stmt: &'a HirStmt) -> CfgResult<()> {
        match stmt {
            HirStmt::LocalDecl { name, qualifier, init } => {
                let value = init.as_ref().map(|e| self.build_expr(e)).transpose()?;
                let var = LocalVar::local(name.clone(), qualifier.clone());
                self.declare(name, var.clone());
                self.emit(NodeKind::LocalDecl(var.clone()));
                if let Some(value) = value {
                    self.emit(NodeKind::Assign {
                        target: NodeTarget::Local(var),
                        value,
                    });
                }
            }
            HirStmt::Assign { target, value } => match target {
                AssignTarget::Local(name) => {
                    let value = self.build_expr(value)?;
                    let var = self.lookup(name);
                    self.emit(NodeKind::Assign {
                        target: NodeTarget::Local(var),
                        value,
                    });
                }
                AssignTarget::Field { receiver, field } => {
                    let receiver = self.build_expr(receiver)?;
                    let value = self.build_expr(value)?;
                    self.emit(NodeKind::Assign {
                        target: NodeTarget::Field {
                            receiver,
                            field: field.clone(),
                        },
                        value,
                    });
                }
            },
            HirStmt::Expr(expr) => {
                self.build_expr(expr)?;
            }
            HirStmt::If {
                condition,
                then_body,
                else_body,
            } => self.build_if(condition, then_body, else_body.as_deref())?,
            HirStmt::While { label, condition, body } => self.build_while(label.as_deref(), condition, body)?,
            HirStmt::DoWhile { label, body, condition } => self.build_do_while(label.as_deref(), body, condition)?,
            HirStmt::For {
                label,
                init,
                condition,
                update,
                body,
            } => self.build_for(label.as_deref(), init, condition.as_ref(), update, body)?,
            HirStmt::Break(label) => self.build_jump(label.as_deref(), true)?,
            HirStmt::Continue(label) => self.build_jump(label.as_deref(), false)?,
            HirStmt::Return(value) => {
                let value = value.as_ref().map(|e| self.build_expr(e)).transpose()?;
                self.emit(NodeKind::Return { value });
                let target = self.abrupt_path(0, self.exit)?;
                self.close_with(target);
            }
            HirStmt::Throw { exception, value } => {
                let value = value.as_ref().map(|e| self.build_expr(e)).transpose()?;
                self.emit_raising(
                    NodeKind::Throw {
                        exception: exception.clone(),
                        value,
                    },
                    &[exception.as_str()],
                    true,
                )?;
            }
            HirStmt::Try { body, handlers, finally } => self.build_try(body, handlers, finally.as_deref())?,
            HirStmt::Assert { condition } => {
                let holds = self.new_block();
                let fails = self.new_block();
                self.build_condition(condition, holds, fails)?;
                self.current = Some(fails);
                self.emit_raising(NodeKind::AssertFailure, &[ASSERTION_ERROR], true)?;
                self.current = Some(holds);
            }
        }
        Ok(())
    }

    fn build_if(&mut self, condition: &'a HirExpr, then_body: &'a [HirStmt], else_body: Option<&'a [HirStmt]>) -> CfgResult<()> {
        let then_block = self.new_block();
        let else_block = self.new_block();
        let merge_block = self.new_block();

        self.build_condition(condition, then_block, else_block)?;

        self.current = Some(then_block);
        self.block_stmts(then_body)?;
        self.close_with(merge_block);

        self.current = Some(else_block);
        if let Some(else_body) = else_body {
            self.block_stmts(else_body)?;
        }
        self.close_with(merge_block);

        self.current = Some(merge_block);
        Ok(())
    }

    fn build_while(&mut self, label: Option<&'a str>, condition: &'a HirExpr, body: &'a [HirStmt]) -> CfgResult<()> {
        let head = self.new_special(SpecialKind::LoopHead);
        self.close_with(head);
        let test_block = self.new_block();
        self.link(head, test_block);
        let body_block = self.new_block();
        let exit_block = self.new_block();

        self.current = Some(test_block);
        self.build_condition(condition, body_block, exit_block)?;

        self.frames.push(Frame::Loop {
            label,
            continue_target: head,
            break_target: exit_block,
        });
        self.current = Some(body_block);
        self.block_stmts(body)?;
        self.frames.pop();

        // Back edge to header
        self.close_with(head);
        self.current = Some(exit_block);
        Ok(())
    }

    fn build_do_while(&mut self, label: Option<&'a str>, body: &'a [HirStmt], condition: &'a HirExpr) -> CfgResult<()> {
        let head = self.new_special(SpecialKind::LoopHead);
        self.close_with(head);
        let body_block = self.new_block();
        self.link(head, body_block);
        let test_block = self.new_block();
        let exit_block = self.new_block();

        self.frames.push(Frame::Loop {
            label,
            continue_target: test_block,
            break_target: exit_block,
        });
        self.current = Some(body_block);
        self.block_stmts(body)?;
        self.frames.pop();
        self.close_with(test_block);

        self.current = Some(test_block);
        self.build_condition(condition, head, exit_block)?;
        self.current = Some(exit_block);
        Ok(())
    }

    fn build_for(
        &mut self,
        label: Option<&'a str>,
        init: &'a [HirStmt],
        condition: Option<&'a HirExpr>,
        update: &'a [HirStmt],
        body: &'a [HirStmt],
    ) -> CfgResult<()> {
        // Loop variables are scoped to the statement
        self.scopes.push(HashMap::new());
        for stmt in init {
            self.build_stmt(stmt)?;
        }

        let head = self.new_special(SpecialKind::LoopHead);
        self.close_with(head);
        let test_block = self.new_block();
        self.link(head, test_block);
        let body_block = self.new_block();
        let update_block = self.new_block();
        let exit_block = self.new_block();

        self.current = Some(test_block);
        match condition {
            Some(condition) => self.build_condition(condition, body_block, exit_block)?,
            None => self.close_with(body_block),
        }

        self.frames.push(Frame::Loop {
            label,
            continue_target: update_block,
            break_target: exit_block,
        });
        self.current = Some(body_block);
        self.block_stmts(body)?;
        self.frames.pop();
        self.close_with(update_block);

        self.current = Some(update_block);
        for stmt in update {
            self.build_stmt(stmt)?;
        }
        self.close_with(head);
        self.scopes.pop();

        self.current = Some(exit_block);
        Ok(())
    }

    fn build_jump(&mut self, label: Option<&str>, is_break: bool) -> CfgResult<()> {
        let found = self.frames.iter().enumerate().rev().find_map(|(index, frame)| match frame {
            Frame::Loop {
                label: loop_label,
                continue_target,
                break_target,
            } if label.is_none() || *loop_label == label => Some((index, *continue_target, *break_target)),
            _ => None,
        });
        let Some((index, continue_target, break_target)) = found else {
            return Err(match label {
                Some(label) => CfgError::UnknownLabel(label.to_string()),
                None if is_break => CfgError::BreakOutsideLoop,
                None => CfgError::ContinueOutsideLoop,
            });
        };

        let dest = if is_break { break_target } else { continue_target };
        let target = self.abrupt_path(index + 1, dest)?;
        self.close_with(target);
        Ok(())
    }

    fn build_try(
        &mut self,
        body: &'a [HirStmt],
        handlers: &'a [CatchHandler],
        finally: Option<&'a [HirStmt]>,
    ) -> CfgResult<()> {
        let mut seen = HashSet::new();
        for handler in handlers {
            if handler.exception.is_empty() {
                return Err(CfgError::EmptyExceptionCategory);
            }
            if !seen.insert(handler.exception.as_str()) {
                return Err(CfgError::DuplicateHandler(handler.exception.clone()));
            }
        }

        let after = self.new_block();
        let targets: Vec<(&'a str, BlockId)> = handlers
            .iter()
            .map(|handler| (handler.exception.as_str(), self.new_block()))
            .collect();

        let finally_depth = self.frames.len();
        if let Some(body) = finally {
            let id = self.next_finally;
            self.next_finally += 1;
            self.frames.push(Frame::Finally { id, body });
        }

        self.frames.push(Frame::Handlers(targets.clone()));
        self.block_stmts(body)?;
        self.frames.pop();
        let normal_exit = self.abrupt_path(finally_depth, after)?;
        self.close_with(normal_exit);

        for (handler, (_, handler_block)) in handlers.iter().zip(&targets) {
            self.current = Some(*handler_block);
            self.scopes.push(HashMap::new());
            if let Some(binding) = &handler.binding {
                let var = LocalVar::local(binding.clone(), None);
                self.declare(binding, var.clone());
                self.emit(NodeKind::LocalDecl(var));
            }
            for stmt in &handler.body {
                self.build_stmt(stmt)?;
            }
            self.scopes.pop();
            let handler_exit = self.abrupt_path(finally_depth, after)?;
            self.close_with(handler_exit);
        }

        if finally.is_some() {
            self.frames.pop();
        }
        self.current = Some(after);
        Ok(())
    }

    /// Jump lowering of a boolean test.
    fn build_condition(&mut self, expr: &'a HirExpr, then_target: BlockId, else_target: BlockId) -> CfgResult<()> {
        match expr {
            HirExpr::Binary {
                op: BinOp::And,
                lhs,
                rhs,
            } => {
                let rhs_block = self.new_block();
                self.build_condition(lhs, rhs_block, else_target)?;
                self.current = Some(rhs_block);
                self.build_condition(rhs, then_target, else_target)
            }
            HirExpr::Binary { op: BinOp::Or, lhs, rhs } => {
                let rhs_block = self.new_block();
                self.build_condition(lhs, then_target, rhs_block)?;
                self.current = Some(rhs_block);
                self.build_condition(rhs, then_target, else_target)
            }
            HirExpr::Unary {
                op: UnaryOp::Not,
                operand,
            } => self.build_condition(operand, else_target, then_target),
            HirExpr::Ternary {
                condition,
                then_value,
                else_value,
            } => {
                let then_block = self.new_block();
                let else_block = self.new_block();
                self.build_condition(condition, then_block, else_block)?;
                self.current = Some(then_block);
                self.build_condition(then_value, then_target, else_target)?;
                self.current = Some(else_block);
                self.build_condition(else_value, then_target, else_target)
            }
            _ => {
                let node = self.build_expr(expr)?;
                self.branch(node, then_target, else_target);
                Ok(())
            }
        }
    }

    fn build_exprs(&mut self, exprs: &'a [HirExpr]) -> CfgResult<Vec<NodeId>> {
        exprs.iter().map(|e| self.build_expr(e)).collect()
    }

    /// Lower an expression in value position; returns the node holding its
    /// value, which is always the last node emitted.
    fn build_expr(&mut self, expr: &'a HirExpr) -> CfgResult<NodeId> {
        let id = match expr {
            HirExpr::Literal(lit) => self.emit(NodeKind::Literal(lit.clone())),
            HirExpr::Var(name) => {
                let var = self.lookup(name);
                self.emit(NodeKind::LocalRead(var))
            }
            HirExpr::This => self.emit(NodeKind::This),
            HirExpr::Field { receiver, field } => {
                let receiver = self.build_expr(receiver)?;
                self.emit(NodeKind::FieldRead {
                    receiver,
                    field: field.clone(),
                })
            }
            HirExpr::Call {
                receiver,
                method,
                args,
                throws,
            } => {
                let receiver = receiver.as_deref().map(|r| self.build_expr(r)).transpose()?;
                let args = self.build_exprs(args)?;
                let mut categories = vec![RUNTIME_EXCEPTION];
                categories.extend(throws.iter().map(String::as_str));
                self.emit_raising(
                    NodeKind::Call {
                        receiver,
                        method: method.clone(),
                        args,
                    },
                    &categories,
                    false,
                )?
            }
            HirExpr::New { class, args } => {
                let args = self.build_exprs(args)?;
                self.emit_raising(
                    NodeKind::New {
                        class: class.clone(),
                        args,
                    },
                    &[RUNTIME_EXCEPTION],
                    false,
                )?
            }
            HirExpr::Binary { op, lhs, rhs } if op.is_short_circuit() => self.build_short_circuit(*op, lhs, rhs)?,
            HirExpr::Binary { op, lhs, rhs } => {
                let lhs = self.build_expr(lhs)?;
                let rhs = self.build_expr(rhs)?;
                self.emit(NodeKind::Binary { op: *op, lhs, rhs })
            }
            HirExpr::Unary { op, operand } => {
                let operand = self.build_expr(operand)?;
                self.emit(NodeKind::Unary { op: *op, operand })
            }
            HirExpr::Ternary {
                condition,
                then_value,
                else_value,
            } => {
                let then_block = self.new_block();
                let else_block = self.new_block();
                let merge_block = self.new_block();
                self.build_condition(condition, then_block, else_block)?;

                self.current = Some(then_block);
                let then_value = self.build_expr(then_value)?;
                self.close_with(merge_block);
                self.current = Some(else_block);
                let else_value = self.build_expr(else_value)?;
                self.close_with(merge_block);

                self.current = Some(merge_block);
                self.emit(NodeKind::TernaryMerge { then_value, else_value })
            }
            HirExpr::Cast { qualifier, operand } => {
                let operand = self.build_expr(operand)?;
                self.emit(NodeKind::Cast {
                    qualifier: qualifier.clone(),
                    operand,
                })
            }
        };
        Ok(id)
    }

    /// `a && b` / `a || b` as a value: the right operand runs only on one arm.
    fn build_short_circuit(&mut self, op: BinOp, lhs: &'a HirExpr, rhs: &'a HirExpr) -> CfgResult<NodeId> {
        let lhs = self.build_expr(lhs)?;
        let rhs_block = self.new_block();
        let merge_block = self.new_block();
        match op {
            BinOp::And => self.branch(lhs, rhs_block, merge_block),
            _ => self.branch(lhs, merge_block, rhs_block),
        }

        self.current = Some(rhs_block);
        let rhs = self.build_expr(rhs)?;
        self.close_with(merge_block);

        self.current = Some(merge_block);
        Ok(self.emit(NodeKind::ShortCircuit { op, lhs, rhs }))
    }

    /// Close dangling exits, drop empty regular blocks, compact and validate.
    fn finish(mut self) -> CfgResult<Cfg> {
        let exit = self.exit;
        for draft in &mut self.drafts {
            if matches!(draft.exits, Exits::Open) {
                draft.exits = Exits::Goto(exit);
            }
            if let Exits::Raise {
                successor,
                terminal: false,
                ..
            } = &mut draft.exits
            {
                if successor.is_none() {
                    *successor = Some(exit);
                }
            }
        }

        let final_ids = self.compact_ids();
        let remap = |block: BlockId| final_ids[block.0].1;

        let mut blocks = Vec::new();
        for (index, draft) in self.drafts.into_iter().enumerate() {
            let (kept, id) = final_ids[index];
            if !kept {
                continue;
            }
            let kind = match draft.exits {
                Exits::Open => BlockKind::Regular { successor: remap(exit) },
                Exits::Goto(target) => BlockKind::Regular {
                    successor: remap(target),
                },
                Exits::Branch {
                    condition,
                    then_successor,
                    else_successor,
                } => BlockKind::Conditional {
                    condition,
                    then_successor: remap(then_successor),
                    else_successor: remap(else_successor),
                },
                Exits::Raise {
                    successor, exceptional, ..
                } => BlockKind::Exceptional {
                    successor: successor.map(remap),
                    exceptional: exceptional
                        .into_iter()
                        .map(|(category, target)| (category, remap(target)))
                        .collect(),
                },
                Exits::Special { kind, successor } => BlockKind::Special {
                    kind,
                    successor: successor.map(remap),
                },
            };
            for &node in &draft.nodes {
                self.nodes[node.0].block = id;
            }
            blocks.push(Block {
                id,
                nodes: draft.nodes,
                kind,
            });
        }

        let cfg = Cfg::from_parts(CfgParts {
            name: self.name,
            blocks,
            nodes: self.nodes,
            entry: remap(self.entry),
            exit: remap(self.exit),
            exceptional_exit: remap(self.exceptional_exit),
        })?;
        debug!(
            unit = cfg.name(),
            blocks = cfg.len(),
            nodes = cfg.node_count(),
            unreachable = cfg.unreachable_blocks().len(),
            "built cfg"
        );
        Ok(cfg)
    }

    /// For every draft: whether it survives, and the id it (or the block it
    /// forwards to) ends up with.
    fn compact_ids(&self) -> Vec<(bool, BlockId)> {
        let forward = |index: usize| match self.drafts[index].exits {
            Exits::Goto(target) if self.drafts[index].nodes.is_empty() => Some(target),
            _ => None,
        };
        let mut removable: Vec<bool> = (0..self.drafts.len()).map(|i| forward(i).is_some()).collect();

        // A cycle made only of empty blocks keeps its blocks
        for start in 0..self.drafts.len() {
            let mut path = Vec::new();
            let mut at = start;
            while removable[at] {
                if path.contains(&at) {
                    for &block in &path {
                        removable[block] = false;
                    }
                    break;
                }
                path.push(at);
                match forward(at) {
                    Some(next) => at = next.0,
                    None => break,
                }
            }
        }

        let mut final_ids = vec![(false, BlockId(0)); self.drafts.len()];
        let mut next = 0;
        for (index, slot) in final_ids.iter_mut().enumerate() {
            if !removable[index] {
                *slot = (true, BlockId(next));
                next += 1;
            }
        }
        for index in 0..self.drafts.len() {
            if removable[index] {
                let mut at = index;
                while removable[at] {
                    match forward(at) {
                        Some(next) => at = next.0,
                        None => break,
                    }
                }
                final_ids[index] = (false, final_ids[at].1);
            }
        }
        final_ids
    }
}

/// Build the CFG of one unit.
pub fn build_cfg(unit: &AnalysisUnit) -> CfgResult<Cfg> {
    CfgBuilder::new(unit.name.clone()).build_unit(unit)
}
