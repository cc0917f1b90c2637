//! Flow refinement on boolean tests
//!
//! Each handler recognizes one test shape (an equality comparison, a call
//! with conditional postconditions, ...) and splits the store into the
//! refinements that hold when the test is true and when it is false.

mod equality;
mod postcondition;

use super::node::{Node, NodeId, NodeKind};
use super::store::{FlowKey, Store, TransferResult};
use crate::qualifiers::{Qualifier, QualifierHierarchy, SignatureTable};
use serde::{Deserialize, Serialize};

pub use equality::EqualityRefinement;
pub use postcondition::PostconditionRefinement;

/// Which built-in refinements a checker enables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementRules {
    /// Refine both operands of `==`/`!=` to their meet on the equal branch
    pub equality: bool,
}

impl Default for RefinementRules {
    fn default() -> Self {
        Self { equality: true }
    }
}

/// What a handler may read about the node under test
pub struct RefinementContext<'a> {
    pub node: &'a Node,
    pub hierarchy: &'a QualifierHierarchy,
    pub signatures: &'a SignatureTable,
    values: &'a [Option<Qualifier>],
    keys: &'a [Option<FlowKey>],
}

impl<'a> RefinementContext<'a> {
    pub fn new(
        node: &'a Node,
        hierarchy: &'a QualifierHierarchy,
        signatures: &'a SignatureTable,
        values: &'a [Option<Qualifier>],
        keys: &'a [Option<FlowKey>],
    ) -> Self {
        Self {
            node,
            hierarchy,
            signatures,
            values,
            keys,
        }
    }

    /// Computed qualifier of an operand; top if none was computed.
    pub fn value(&self, id: NodeId) -> Qualifier {
        self.values
            .get(id.0)
            .copied()
            .flatten()
            .unwrap_or_else(|| self.hierarchy.top())
    }

    /// Store key of an operand, if it can carry a refinement.
    pub fn key(&self, id: NodeId) -> Option<&FlowKey> {
        self.keys
            .get(id.0)
            .and_then(Option::as_ref)
            .filter(|key| key.is_refinable())
    }
}

/// Trait for handlers that split a store on the outcome of a test
pub trait RefinementHandler {
    fn name(&self) -> &'static str;

    /// Check if this handler understands the node's shape
    fn applies_to(&self, node: &NodeKind, signatures: &SignatureTable) -> bool;

    /// Stores for the true and the false outcome, derived from `store`
    fn refine(&self, ctx: &RefinementContext<'_>, store: &Store) -> Option<(Store, Store)>;
}

/// Registry of all refinement handlers
pub struct RefinementRegistry {
    handlers: Vec<Box<dyn RefinementHandler + Send + Sync>>,
}

impl RefinementRegistry {
    pub fn new(rules: &RefinementRules) -> Self {
        let mut registry = Self { handlers: Vec::new() };
        if rules.equality {
            registry.register(Box::new(EqualityRefinement));
        }
        registry.register(Box::new(PostconditionRefinement));
        registry
    }

    pub fn register(&mut self, handler: Box<dyn RefinementHandler + Send + Sync>) {
        self.handlers.push(handler);
    }

    /// Apply the first handler that both applies and produces a split
    pub fn refine(&self, ctx: &RefinementContext<'_>, store: &Store) -> Option<TransferResult> {
        self.handlers
            .iter()
            .filter(|handler| handler.applies_to(&ctx.node.kind, ctx.signatures))
            .find_map(|handler| handler.refine(ctx, store))
            .map(|(then_store, else_store)| TransferResult::Conditional { then_store, else_store })
    }

    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for RefinementRegistry {
    fn default() -> Self {
        Self::new(&RefinementRules::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_respects_rules() {
        assert_eq!(
            RefinementRegistry::default().handler_names(),
            vec!["equality", "postcondition"]
        );
        let without = RefinementRegistry::new(&RefinementRules { equality: false });
        assert_eq!(without.handler_names(), vec!["postcondition"]);
    }
}
