//! Refinement from conditional postconditions of boolean methods

use super::{RefinementContext, RefinementHandler};
use crate::dataflow::node::NodeKind;
use crate::dataflow::store::Store;
use crate::qualifiers::{PostconditionTarget, SignatureTable};

/// `ensures_if { result, target, qualifier }`: when the call returns
/// `result`, `target` is refined to `qualifier`.
pub struct PostconditionRefinement;

impl RefinementHandler for PostconditionRefinement {
    fn name(&self) -> &'static str {
        "postcondition"
    }

    fn applies_to(&self, node: &NodeKind, signatures: &SignatureTable) -> bool {
        match node {
            NodeKind::Call { method, .. } => signatures
                .method(method)
                .is_some_and(|sig| !sig.ensures_if.is_empty()),
            _ => false,
        }
    }

    fn refine(&self, ctx: &RefinementContext<'_>, store: &Store) -> Option<(Store, Store)> {
        let NodeKind::Call { receiver, method, args } = &ctx.node.kind else {
            return None;
        };
        let signature = ctx.signatures.method(method)?;

        let mut then_store = store.clone();
        let mut else_store = store.clone();
        let mut refined = false;
        for post in &signature.ensures_if {
            let operand = match post.target {
                PostconditionTarget::Receiver => *receiver,
                PostconditionTarget::Argument(index) => args.get(index).copied(),
            };
            let Some(key) = operand.and_then(|id| ctx.key(id)) else {
                continue;
            };
            let target = if post.result { &mut then_store } else { &mut else_store };
            target.refine(key.clone(), post.qualifier, ctx.hierarchy);
            refined = true;
        }

        refined.then_some((then_store, else_store))
    }
}
