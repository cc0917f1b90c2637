//! Comparison of computed qualifiers against declared requirements
//!
//! Runs after the fixpoint and produces plain [`Diagnostic`] values for an
//! external reporter. A mismatch is an analysis result, never an error.

use crate::dataflow::{BlockId, Cfg, Declarations, NodeId, NodeKind, NodeTarget};
use crate::error::AnalysisResult;
use crate::qualifiers::{Checker, Qualifier};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    AssignmentIncompatible,
    ArgumentIncompatible,
    ReceiverIncompatible,
    ReturnIncompatible,
    UnsafeCast,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DiagnosticKind::AssignmentIncompatible => "incompatible assignment",
            DiagnosticKind::ArgumentIncompatible => "incompatible argument",
            DiagnosticKind::ReceiverIncompatible => "incompatible receiver",
            DiagnosticKind::ReturnIncompatible => "incompatible return value",
            DiagnosticKind::UnsafeCast => "unsafe cast",
        };
        f.write_str(text)
    }
}

/// A computed qualifier that is not a subtype of the required one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub block: BlockId,
    pub node: NodeId,
    pub found: String,
    pub required: String,
    /// What was checked, e.g. `x`, `this.name`, `argument 0 of sanitize`
    pub subject: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}: {} ({}): found `{}`, required `{}`",
            self.block, self.node, self.kind, self.subject, self.found, self.required
        )
    }
}

struct Checks<'a> {
    checker: &'a Checker,
    diagnostics: Vec<Diagnostic>,
}

impl Checks<'_> {
    fn require(&mut self, kind: DiagnosticKind, block: BlockId, node: NodeId, found: Qualifier, required: Qualifier, subject: String) {
        let h = self.checker.hierarchy();
        if !h.is_subtype(found, required) {
            self.diagnostics.push(Diagnostic {
                kind,
                block,
                node,
                found: h.name(found).to_string(),
                required: h.name(required).to_string(),
                subject,
            });
        }
    }
}

/// Check every node with a computed value. `values` is indexed by node id.
pub fn check_unit(
    checker: &Checker,
    cfg: &Cfg,
    values: &[Option<Qualifier>],
    return_bound: Option<Qualifier>,
    include_unreachable: bool,
) -> AnalysisResult<Vec<Diagnostic>> {
    let decls = Declarations::new(checker);
    let value = |id: NodeId| values.get(id.0).copied().flatten();
    let mut checks = Checks {
        checker,
        diagnostics: Vec::new(),
    };

    for node in cfg.nodes() {
        if !include_unreachable && !cfg.is_reachable(node.block) {
            continue;
        }
        let (block, id) = (node.block, node.id);
        match &node.kind {
            NodeKind::Assign { target, value: source } => {
                let Some(found) = value(*source) else { continue };
                match target {
                    NodeTarget::Local(var) => {
                        let required = decls.local_bound(var, node)?;
                        checks.require(DiagnosticKind::AssignmentIncompatible, block, id, found, required, var.name.clone());
                    }
                    NodeTarget::Field { field, .. } => {
                        let required = decls.field_bound(field);
                        checks.require(
                            DiagnosticKind::AssignmentIncompatible,
                            block,
                            id,
                            found,
                            required,
                            format!("field {field}"),
                        );
                    }
                }
            }
            NodeKind::Call { receiver, method, args } => {
                let Some(signature) = checker.signatures().method(method) else {
                    continue;
                };
                for (index, (required, arg)) in signature.params.iter().zip(args).enumerate() {
                    if let (Some(required), Some(found)) = (required, value(*arg)) {
                        checks.require(
                            DiagnosticKind::ArgumentIncompatible,
                            block,
                            id,
                            found,
                            *required,
                            format!("argument {index} of {method}"),
                        );
                    }
                }
                if let (Some(required), Some(found)) = (signature.receiver, receiver.and_then(value)) {
                    checks.require(
                        DiagnosticKind::ReceiverIncompatible,
                        block,
                        id,
                        found,
                        required,
                        format!("receiver of {method}"),
                    );
                }
            }
            NodeKind::Return { value: Some(returned) } => {
                if let (Some(required), Some(found)) = (return_bound, value(*returned)) {
                    checks.require(DiagnosticKind::ReturnIncompatible, block, id, found, required, "return".to_string());
                }
            }
            NodeKind::Cast { qualifier, operand } => {
                let required = decls.resolve(qualifier, node)?;
                if let Some(found) = value(*operand) {
                    checks.require(DiagnosticKind::UnsafeCast, block, id, found, required, format!("@{qualifier}"));
                }
            }
            _ => {}
        }
    }
    Ok(checks.diagnostics)
}
