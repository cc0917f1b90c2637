//! Atomic operations of a lowered unit

use super::cfg::BlockId;
use crate::hir::{BinOp, Literal, UnaryOp};
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};
use std::fmt;

/// Index of a node in its CFG's node arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarOrigin {
    Parameter,
    Local,
}

/// A local variable as seen at one use site, with the qualifier its
/// declaration carries (if any).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalVar {
    pub name: String,
    pub declared: Option<String>,
    pub origin: VarOrigin,
}

impl LocalVar {
    pub fn local(name: impl Into<String>, declared: Option<String>) -> Self {
        Self {
            name: name.into(),
            declared,
            origin: VarOrigin::Local,
        }
    }

    pub fn parameter(name: impl Into<String>, declared: Option<String>) -> Self {
        Self {
            name: name.into(),
            declared,
            origin: VarOrigin::Parameter,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeTarget {
    Local(LocalVar),
    Field { receiver: NodeId, field: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Literal(Literal),
    LocalRead(LocalVar),
    This,
    FieldRead {
        receiver: NodeId,
        field: String,
    },
    Call {
        receiver: Option<NodeId>,
        method: String,
        args: Vec<NodeId>,
    },
    New {
        class: String,
        args: Vec<NodeId>,
    },
    Binary {
        op: BinOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    Unary {
        op: UnaryOp,
        operand: NodeId,
    },
    /// Value of `&&`/`||` at the point where both paths merge
    ShortCircuit {
        op: BinOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    TernaryMerge {
        then_value: NodeId,
        else_value: NodeId,
    },
    Cast {
        qualifier: String,
        operand: NodeId,
    },
    LocalDecl(LocalVar),
    Assign {
        target: NodeTarget,
        value: NodeId,
    },
    Return {
        value: Option<NodeId>,
    },
    Throw {
        exception: String,
        value: Option<NodeId>,
    },
    AssertFailure,
}

impl NodeKind {
    /// Nodes whose computed values this node reads.
    pub fn operands(&self) -> SmallVec<[NodeId; 4]> {
        match self {
            NodeKind::Literal(_)
            | NodeKind::LocalRead(_)
            | NodeKind::This
            | NodeKind::LocalDecl(_)
            | NodeKind::AssertFailure => SmallVec::new(),
            NodeKind::FieldRead { receiver, .. } => smallvec![*receiver],
            NodeKind::Call { receiver, args, .. } => receiver.iter().chain(args.iter()).copied().collect(),
            NodeKind::New { args, .. } => args.iter().copied().collect(),
            NodeKind::Binary { lhs, rhs, .. } | NodeKind::ShortCircuit { lhs, rhs, .. } => smallvec![*lhs, *rhs],
            NodeKind::TernaryMerge { then_value, else_value } => smallvec![*then_value, *else_value],
            NodeKind::Unary { operand, .. } | NodeKind::Cast { operand, .. } => smallvec![*operand],
            NodeKind::Assign { target, value } => match target {
                NodeTarget::Local(_) => smallvec![*value],
                NodeTarget::Field { receiver, .. } => smallvec![*receiver, *value],
            },
            NodeKind::Return { value } | NodeKind::Throw { value, .. } => value.iter().copied().collect(),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(ids: &[NodeId]) -> String {
            ids.iter().map(|id| format!("#{}", id.0)).collect::<Vec<_>>().join(", ")
        }

        match self {
            NodeKind::Literal(Literal::String(s)) => write!(f, "{s:?}"),
            NodeKind::Literal(Literal::Char(c)) => write!(f, "{c:?}"),
            NodeKind::Literal(lit) => write!(f, "{}", lit.text()),
            NodeKind::LocalRead(var) => write!(f, "{}", var.name),
            NodeKind::This => write!(f, "this"),
            NodeKind::FieldRead { receiver, field } => write!(f, "#{}.{field}", receiver.0),
            NodeKind::Call { receiver, method, args } => match receiver {
                Some(r) => write!(f, "#{}.{method}({})", r.0, list(args)),
                None => write!(f, "{method}({})", list(args)),
            },
            NodeKind::New { class, args } => write!(f, "new {class}({})", list(args)),
            NodeKind::Binary { op, lhs, rhs } | NodeKind::ShortCircuit { op, lhs, rhs } => {
                write!(f, "#{} {} #{}", lhs.0, op.symbol(), rhs.0)
            }
            NodeKind::Unary { op, operand } => match op {
                UnaryOp::Not => write!(f, "!#{}", operand.0),
                UnaryOp::Neg => write!(f, "-#{}", operand.0),
            },
            NodeKind::TernaryMerge { then_value, else_value } => {
                write!(f, "? #{} : #{}", then_value.0, else_value.0)
            }
            NodeKind::Cast { qualifier, operand } => write!(f, "(@{qualifier}) #{}", operand.0),
            NodeKind::LocalDecl(var) => match &var.declared {
                Some(q) => write!(f, "decl @{q} {}", var.name),
                None => write!(f, "decl {}", var.name),
            },
            NodeKind::Assign { target, value } => match target {
                NodeTarget::Local(var) => write!(f, "{} = #{}", var.name, value.0),
                NodeTarget::Field { receiver, field } => write!(f, "#{}.{field} = #{}", receiver.0, value.0),
            },
            NodeKind::Return { value: Some(v) } => write!(f, "return #{}", v.0),
            NodeKind::Return { value: None } => write!(f, "return"),
            NodeKind::Throw { exception, .. } => write!(f, "throw {exception}"),
            NodeKind::AssertFailure => write!(f, "assert failed"),
        }
    }
}

/// One atomic operation. `block` is the index of the block that lists it.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub block: BlockId,
    pub kind: NodeKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operands_in_evaluation_order() {
        let call = NodeKind::Call {
            receiver: Some(NodeId(0)),
            method: "equals".into(),
            args: vec![NodeId(1), NodeId(2)],
        };
        assert_eq!(call.operands().as_slice(), &[NodeId(0), NodeId(1), NodeId(2)]);

        let assign = NodeKind::Assign {
            target: NodeTarget::Field {
                receiver: NodeId(3),
                field: "name".into(),
            },
            value: NodeId(4),
        };
        assert_eq!(assign.operands().as_slice(), &[NodeId(3), NodeId(4)]);
        assert!(NodeKind::AssertFailure.operands().is_empty());
    }

    #[test]
    fn test_node_display() {
        let call = NodeKind::Call {
            receiver: None,
            method: "sanitize".into(),
            args: vec![NodeId(5)],
        };
        assert_eq!(call.to_string(), "sanitize(#5)");
        assert_eq!(NodeKind::Literal(Literal::String("a".into())).to_string(), "\"a\"");
        assert_eq!(NodeId(7).to_string(), "node 7");
    }
}
