//! Qualifier transfer function
//!
//! Walks a block's nodes in order, computing each node's qualifier and the
//! store after it. Boolean tests may split the store (see
//! [`super::refinement`]); the split survives only until the next node, which
//! is where the builder puts the conditional block.

use super::cfg::{Block, BlockId, BlockKind, Cfg};
use super::node::{LocalVar, Node, NodeId, NodeKind, NodeTarget, VarOrigin};
use super::refinement::{RefinementContext, RefinementRegistry};
use super::solver::{BlockTransfer, DataflowAnalysis};
use super::store::{FlowKey, Store, TransferResult};
use crate::error::{AnalysisError, AnalysisResult};
use crate::hir::{BinOp, UnaryOp};
use crate::qualifiers::{Checker, ImplicitSubject, PostconditionTarget, Qualifier, QualifierHierarchy, SyntaxKind};
use tracing::trace;

/// Upper bounds and defaults that come from declarations rather than flow
#[derive(Clone, Copy)]
pub struct Declarations<'c> {
    checker: &'c Checker,
}

impl<'c> Declarations<'c> {
    pub fn new(checker: &'c Checker) -> Self {
        Self { checker }
    }

    pub fn hierarchy(&self) -> &'c QualifierHierarchy {
        self.checker.hierarchy()
    }

    /// Resolve an explicit qualifier written at `node`.
    pub fn resolve(&self, name: &str, node: &Node) -> AnalysisResult<Qualifier> {
        self.hierarchy()
            .lookup(name)
            .ok_or_else(|| AnalysisError::UnknownQualifier {
                name: name.to_string(),
                block: node.block,
                node: node.id,
            })
    }

    fn element(&self, kind: SyntaxKind) -> Qualifier {
        self.checker.implicit().evaluate(ImplicitSubject::Element(kind))
    }

    pub fn local_bound(&self, var: &LocalVar, node: &Node) -> AnalysisResult<Qualifier> {
        match &var.declared {
            Some(name) => self.resolve(name, node),
            None => Ok(self.element(match var.origin {
                VarOrigin::Parameter => SyntaxKind::Parameter,
                VarOrigin::Local => SyntaxKind::LocalVariable,
            })),
        }
    }

    pub fn field_bound(&self, field: &str) -> Qualifier {
        self.checker
            .signatures()
            .field(field)
            .unwrap_or_else(|| self.element(SyntaxKind::Field))
    }

    pub fn call_result(&self, method: &str) -> Qualifier {
        self.checker
            .signatures()
            .method(method)
            .and_then(|sig| sig.returns)
            .unwrap_or_else(|| self.element(SyntaxKind::MethodReturn))
    }
}

/// Flow key of every node that denotes a trackable expression.
pub fn node_keys(cfg: &Cfg, checker: &Checker) -> Vec<Option<FlowKey>> {
    let mut keys: Vec<Option<FlowKey>> = Vec::with_capacity(cfg.node_count());
    for node in cfg.nodes() {
        // Operands precede their users in the arena
        let operand = |id: NodeId| keys.get(id.0).and_then(Option::as_ref);
        let key = match &node.kind {
            NodeKind::LocalRead(var) => Some(FlowKey::local(var.name.clone())),
            NodeKind::This => Some(FlowKey::This),
            NodeKind::Literal(lit) => Some(FlowKey::Literal(lit.text())),
            NodeKind::FieldRead { receiver, field } => operand(*receiver)
                .filter(|key| key.is_refinable())
                .map(|key| FlowKey::field(key.clone(), field.clone())),
            NodeKind::Call { receiver, method, args } if checker.signatures().is_pure(method) => {
                let receiver = match receiver {
                    Some(r) => operand(*r)
                        .filter(|key| key.is_refinable())
                        .map(|key| Some(Box::new(key.clone()))),
                    None => Some(None),
                };
                let args: Option<Vec<FlowKey>> = args.iter().map(|a| operand(*a).cloned()).collect();
                match (receiver, args) {
                    (Some(receiver), Some(args)) => Some(FlowKey::PureCall {
                        receiver,
                        method: method.clone(),
                        args,
                    }),
                    _ => None,
                }
            }
            _ => None,
        };
        keys.push(key);
    }
    keys
}

/// The qualifier analysis of one unit
pub struct QualifierTransfer<'c> {
    decls: Declarations<'c>,
    checker: &'c Checker,
    registry: RefinementRegistry,
    initial: Store,
    keys: Vec<Option<FlowKey>>,
    /// Blocks outside a node's own block that read its value
    consumers: Vec<Vec<BlockId>>,
    values: Vec<Option<Qualifier>>,
}

impl<'c> QualifierTransfer<'c> {
    pub fn new(checker: &'c Checker, cfg: &Cfg, initial: Store) -> Self {
        let mut consumers: Vec<Vec<BlockId>> = vec![Vec::new(); cfg.node_count()];
        for node in cfg.nodes() {
            for operand in node.kind.operands() {
                let uses = &mut consumers[operand.0];
                if cfg.node(operand).block != node.block && !uses.contains(&node.block) {
                    uses.push(node.block);
                }
            }
        }

        Self {
            decls: Declarations::new(checker),
            checker,
            registry: RefinementRegistry::new(checker.refinement()),
            initial,
            keys: node_keys(cfg, checker),
            consumers,
            values: vec![None; cfg.node_count()],
        }
    }

    pub fn values(&self) -> &[Option<Qualifier>] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Option<Qualifier>> {
        self.values
    }

    /// Evaluate the nodes of a block no execution reaches, starting from the
    /// initial store. Nothing flows out of it.
    pub fn evaluate_detached(&mut self, cfg: &Cfg, block: BlockId) -> AnalysisResult<()> {
        let input = self.initial_fact();
        self.run_nodes(cfg, cfg.block(block), &input).map(|_| ())
    }

    /// Evaluate every unreachable block detached. A block whose operands sit
    /// in another pending block waits for a later round.
    pub fn evaluate_unreachable(&mut self, cfg: &Cfg) -> AnalysisResult<()> {
        let mut pending: Vec<BlockId> = cfg.unreachable_blocks().to_vec();
        while !pending.is_empty() {
            let mut waiting = Vec::new();
            let mut first_missing = None;
            for &block in &pending {
                match self.evaluate_detached(cfg, block) {
                    Ok(()) => {}
                    Err(error @ AnalysisError::MissingOperand { .. }) => {
                        first_missing.get_or_insert(error);
                        waiting.push(block);
                    }
                    Err(error) => return Err(error),
                }
            }
            if waiting.len() == pending.len() {
                if let Some(error) = first_missing {
                    return Err(error);
                }
            }
            pending = waiting;
        }
        Ok(())
    }

    fn hierarchy(&self) -> &'c QualifierHierarchy {
        self.checker.hierarchy()
    }

    fn operand(&self, operand: NodeId, node: &Node) -> AnalysisResult<Qualifier> {
        self.values[operand.0].ok_or(AnalysisError::MissingOperand {
            operand,
            node: node.id,
            block: node.block,
        })
    }

    fn key(&self, id: NodeId) -> Option<&FlowKey> {
        self.keys[id.0].as_ref().filter(|key| key.is_refinable())
    }

    /// Run the block's nodes over `input`. Returns the result after the last
    /// node and the blocks that must see changed node values.
    fn run_nodes(&mut self, cfg: &Cfg, block: &Block, input: &TransferResult) -> AnalysisResult<(TransferResult, Vec<BlockId>)> {
        let mut current = input.clone();
        let mut revisit = Vec::new();
        for &id in &block.nodes {
            let (value, result) = self.transfer_node(cfg.node(id), current)?;
            current = result;

            let joined = match self.values[id.0] {
                Some(old) => self.hierarchy().join(old, value),
                None => value,
            };
            if self.values[id.0] != Some(joined) {
                self.values[id.0] = Some(joined);
                for &consumer in &self.consumers[id.0] {
                    if !revisit.contains(&consumer) {
                        revisit.push(consumer);
                    }
                }
            }
        }
        Ok((current, revisit))
    }

    fn transfer_node(&self, node: &Node, input: TransferResult) -> AnalysisResult<(Qualifier, TransferResult)> {
        let h = self.hierarchy();
        let id = node.id;
        for operand in node.kind.operands() {
            self.operand(operand, node)?;
        }

        // `!` keeps the split of its operand, with the arms exchanged
        if let NodeKind::Unary {
            op: UnaryOp::Not,
            operand,
        } = &node.kind
        {
            let value = self.operand(*operand, node)?;
            return Ok((value, input.swap()));
        }

        let mut store = input.into_regular(h);
        let value = match &node.kind {
            NodeKind::Literal(lit) => self.checker.implicit().evaluate(ImplicitSubject::Literal(lit)),
            NodeKind::LocalRead(var) => {
                let bound = self.decls.local_bound(var, node)?;
                match store.get(&FlowKey::local(var.name.clone())) {
                    Some(flow) => h.meet(flow, bound),
                    None => bound,
                }
            }
            NodeKind::This => store.value_or_top(&FlowKey::This),
            NodeKind::FieldRead { field, .. } => {
                let bound = self.decls.field_bound(field);
                match self.key(id).and_then(|key| store.get(key)) {
                    Some(flow) => h.meet(flow, bound),
                    None => bound,
                }
            }
            NodeKind::Call { receiver, method, args } => {
                let signature = self.checker.signatures().method(method);
                if !signature.is_some_and(|sig| sig.pure) {
                    store.invalidate_heap();
                }
                let declared = self.decls.call_result(method);
                let value = match self.key(id).and_then(|key| store.get(key)) {
                    Some(flow) => h.meet(flow, declared),
                    None => declared,
                };
                for post in signature.map(|sig| sig.ensures.as_slice()).unwrap_or_default() {
                    let target = match post.target {
                        PostconditionTarget::Receiver => *receiver,
                        PostconditionTarget::Argument(index) => args.get(index).copied(),
                    };
                    if let Some(key) = target.and_then(|t| self.key(t)) {
                        store.refine(key.clone(), post.qualifier, h);
                    }
                }
                value
            }
            NodeKind::New { .. } => {
                store.invalidate_heap();
                self.checker.implicit().evaluate(ImplicitSubject::Element(SyntaxKind::NewObject))
            }
            NodeKind::Binary { op, lhs, rhs } => {
                let kind = if op.is_comparison() {
                    SyntaxKind::Comparison
                } else if *op == BinOp::Concat {
                    SyntaxKind::Concatenation
                } else {
                    SyntaxKind::Arithmetic
                };
                let implicit = self.checker.implicit().find(ImplicitSubject::Element(kind));
                match implicit {
                    Some(q) => q,
                    None if op.is_comparison() => h.top(),
                    None => h.join(self.operand(*lhs, node)?, self.operand(*rhs, node)?),
                }
            }
            NodeKind::ShortCircuit { lhs, rhs, .. } => h.join(self.operand(*lhs, node)?, self.operand(*rhs, node)?),
            NodeKind::TernaryMerge { then_value, else_value } => {
                h.join(self.operand(*then_value, node)?, self.operand(*else_value, node)?)
            }
            NodeKind::Cast { qualifier, .. } => self.decls.resolve(qualifier, node)?,
            NodeKind::Unary { operand, .. } => self.operand(*operand, node)?,
            NodeKind::LocalDecl(var) => {
                store.invalidate_local(&var.name);
                self.decls.local_bound(var, node)?
            }
            NodeKind::Assign { target, value } => {
                let source = self.operand(*value, node)?;
                match target {
                    NodeTarget::Local(var) => {
                        let bound = self.decls.local_bound(var, node)?;
                        let assigned = if h.is_subtype(source, bound) { source } else { bound };
                        store.invalidate_local(&var.name);
                        store.insert(FlowKey::local(var.name.clone()), assigned);
                        assigned
                    }
                    NodeTarget::Field { receiver, field } => {
                        let bound = self.decls.field_bound(field);
                        let assigned = if h.is_subtype(source, bound) { source } else { bound };
                        store.invalidate_field(field);
                        if let Some(receiver_key) = self.key(*receiver) {
                            store.insert(FlowKey::field(receiver_key.clone(), field.clone()), assigned);
                        }
                        assigned
                    }
                }
            }
            NodeKind::Return { value } | NodeKind::Throw { value, .. } => match value {
                Some(v) => self.operand(*v, node)?,
                None => h.top(),
            },
            NodeKind::AssertFailure => h.top(),
        };

        trace!(node = %id, kind = %node.kind, value = h.name(value), "transferred node");

        let ctx = RefinementContext::new(node, h, self.checker.signatures(), &self.values, &self.keys);
        let result = self
            .registry
            .refine(&ctx, &store)
            .unwrap_or(TransferResult::Regular(store));
        Ok((value, result))
    }
}

impl DataflowAnalysis for QualifierTransfer<'_> {
    type Fact = TransferResult;

    fn initial_fact(&self) -> TransferResult {
        TransferResult::Regular(self.initial.clone())
    }

    fn bottom(&self) -> TransferResult {
        TransferResult::Regular(Store::unreachable(self.hierarchy()))
    }

    fn join(&self, a: &TransferResult, b: &TransferResult) -> TransferResult {
        a.join(b, self.hierarchy())
    }

    fn transfer(&mut self, cfg: &Cfg, id: BlockId, input: &TransferResult) -> AnalysisResult<BlockTransfer<TransferResult>> {
        let h = self.hierarchy();
        let block = cfg.block(id);
        let transfer = match &block.kind {
            BlockKind::Conditional {
                then_successor,
                else_successor,
                ..
            } => BlockTransfer {
                output: input.clone(),
                edges: vec![
                    (*then_successor, TransferResult::Regular(input.then_store().clone())),
                    (*else_successor, TransferResult::Regular(input.else_store().clone())),
                ],
                revisit: Vec::new(),
            },
            BlockKind::Special { successor, .. } => {
                let store = TransferResult::Regular(input.regular(h));
                BlockTransfer {
                    edges: successor.iter().map(|s| (*s, store.clone())).collect(),
                    output: store,
                    revisit: Vec::new(),
                }
            }
            BlockKind::Regular { successor } => {
                let (output, revisit) = self.run_nodes(cfg, block, input)?;
                BlockTransfer {
                    edges: vec![(*successor, output.clone())],
                    output,
                    revisit,
                }
            }
            BlockKind::Exceptional { successor, exceptional } => {
                // Handlers see the store from before the raising node
                let before = TransferResult::Regular(input.regular(h));
                let (output, revisit) = self.run_nodes(cfg, block, input)?;
                let mut edges: Vec<(BlockId, TransferResult)> =
                    successor.iter().map(|s| (*s, output.clone())).collect();
                edges.extend(exceptional.values().map(|handler| (*handler, before.clone())));
                BlockTransfer { output, edges, revisit }
            }
        };
        Ok(transfer)
    }
}
