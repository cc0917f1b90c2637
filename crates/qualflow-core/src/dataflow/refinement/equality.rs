//! Refinement for `==` and `!=`

use super::{RefinementContext, RefinementHandler};
use crate::dataflow::node::NodeKind;
use crate::dataflow::store::Store;
use crate::hir::BinOp;
use crate::qualifiers::SignatureTable;

/// On the equal branch both operands hold the same value, so each may be
/// narrowed to the meet of the two qualifiers.
pub struct EqualityRefinement;

impl RefinementHandler for EqualityRefinement {
    fn name(&self) -> &'static str {
        "equality"
    }

    fn applies_to(&self, node: &NodeKind, _signatures: &SignatureTable) -> bool {
        matches!(node, NodeKind::Binary { op, .. } if op.is_equality())
    }

    fn refine(&self, ctx: &RefinementContext<'_>, store: &Store) -> Option<(Store, Store)> {
        let NodeKind::Binary { op, lhs, rhs } = &ctx.node.kind else {
            return None;
        };
        let lhs_key = ctx.key(*lhs);
        let rhs_key = ctx.key(*rhs);
        if lhs_key.is_none() && rhs_key.is_none() {
            return None;
        }

        let common = ctx.hierarchy.meet(ctx.value(*lhs), ctx.value(*rhs));
        let mut equal = store.clone();
        for key in lhs_key.into_iter().chain(rhs_key) {
            equal.refine(key.clone(), common, ctx.hierarchy);
        }

        match op {
            BinOp::Eq => Some((equal, store.clone())),
            _ => Some((store.clone(), equal)),
        }
    }
}
