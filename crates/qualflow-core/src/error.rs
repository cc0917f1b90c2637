//! Error taxonomy for the checking engine
//!
//! Three families, each fatal for the smallest unit of work it concerns:
//! - [`ConfigError`]: a malformed checker declaration (one hierarchy load)
//! - [`CfgError`]: inconsistent control structure (one analyzed unit)
//! - [`AnalysisError`]: hierarchy/node mismatch discovered while solving (one unit)
//!
//! Qualifier mismatches in the analyzed program are not errors; they are
//! reported as [`crate::check::Diagnostic`] values.

use crate::dataflow::{BlockId, NodeId};
use thiserror::Error;

/// Configuration errors raised while building a qualifier hierarchy, rule set
/// or signature table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("qualifier `{0}` is declared more than once")]
    DuplicateQualifier(String),

    #[error("`{context}` refers to unknown qualifier `{name}`")]
    UnknownQualifier { name: String, context: String },

    #[error("subtype declarations form a cycle through `{0}`")]
    CyclicSubtyping(String),

    #[error("hierarchy declares no qualifiers")]
    EmptyHierarchy,

    #[error("hierarchy has no unique top; maximal qualifiers: {}", .0.join(", "))]
    NoUniqueTop(Vec<String>),

    #[error("hierarchy has no unique bottom; minimal qualifiers: {}", .0.join(", "))]
    NoUniqueBottom(Vec<String>),

    #[error("`{a}` and `{b}` have no unique least upper bound (candidates: {})", .candidates.join(", "))]
    NoUniqueJoin {
        a: String,
        b: String,
        candidates: Vec<String>,
    },

    #[error("`{a}` and `{b}` have no unique greatest lower bound (candidates: {})", .candidates.join(", "))]
    NoUniqueMeet {
        a: String,
        b: String,
        candidates: Vec<String>,
    },

    #[error("invalid string pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("integer range [{from}, {to}] is empty")]
    InvalidRange { from: i64, to: i64 },

    #[error("implicit rules for pattern {pattern} disagree: `{first}` vs `{second}`")]
    ContradictoryImplicitRules {
        pattern: String,
        first: String,
        second: String,
    },

    #[error("method `{0}` has more than one signature")]
    DuplicateSignature(String),

    #[error("postcondition of `{method}` targets argument {index}, but it takes {arity}")]
    PostconditionTarget {
        method: String,
        index: usize,
        arity: usize,
    },

    #[error("field `{0}` is declared more than once")]
    DuplicateField(String),

    #[error("malformed declaration: {0}")]
    Malformed(String),
}

impl ConfigError {
    pub fn unknown(name: impl Into<String>, context: impl Into<String>) -> Self {
        Self::UnknownQualifier {
            name: name.into(),
            context: context.into(),
        }
    }

    pub fn malformed<E: std::fmt::Display>(e: E) -> Self {
        Self::Malformed(e.to_string())
    }
}

/// Construction errors raised by the CFG builder. A unit that fails
/// construction is skipped; no partial graph escapes the builder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CfgError {
    #[error("`break` outside of a loop")]
    BreakOutsideLoop,

    #[error("`continue` outside of a loop")]
    ContinueOutsideLoop,

    #[error("no enclosing loop is labelled `{0}`")]
    UnknownLabel(String),

    #[error("try statement has two handlers for `{0}`")]
    DuplicateHandler(String),

    #[error("handler for an empty exception category")]
    EmptyExceptionCategory,

    #[error("block at position {index} is numbered {id}")]
    BlockIdMismatch { index: usize, id: BlockId },

    #[error("node at position {index} is numbered {id}")]
    NodeIdMismatch { index: usize, id: NodeId },

    #[error("{node} reads nonexistent {operand}")]
    DanglingOperand { node: NodeId, operand: NodeId },

    #[error("{from} has an edge to nonexistent {to}")]
    DanglingEdge { from: BlockId, to: BlockId },

    #[error("{node} claims {claimed} but is listed in {actual}")]
    NodeBlockMismatch {
        node: NodeId,
        claimed: BlockId,
        actual: BlockId,
    },

    #[error("{node} is not listed in any block")]
    OrphanNode { node: NodeId },

    #[error("{block} is a {kind} block but has {found} successors")]
    SuccessorCount {
        block: BlockId,
        kind: &'static str,
        found: usize,
    },

    #[error("exceptional {block} must hold exactly one node, found {found}")]
    ExceptionalContents { block: BlockId, found: usize },

    #[error("{kind} {block} must not hold nodes")]
    NonEmptyBlock { block: BlockId, kind: &'static str },

    #[error("conditional {block} tests {condition}, which does not end its predecessor")]
    ConditionNotInPredecessor { block: BlockId, condition: NodeId },

    #[error("exit {0} has successors")]
    ExitHasSuccessors(BlockId),
}

/// Internal errors raised while solving one unit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("qualifier `{name}` used at {node} in {block} is not part of the hierarchy")]
    UnknownQualifier {
        name: String,
        block: BlockId,
        node: NodeId,
    },

    #[error("qualifier `{name}` declared for {context} is not part of the hierarchy")]
    UnknownUnitQualifier { name: String, context: String },

    #[error("operand {operand} of {node} in {block} has no computed qualifier")]
    MissingOperand {
        operand: NodeId,
        node: NodeId,
        block: BlockId,
    },

    #[error("fixpoint not reached after {visits} block visits")]
    VisitLimit { visits: usize },
}

/// Failure of one analyzed unit, either while building or while solving.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnitError {
    #[error("unit `{unit}`: construction failed: {source}")]
    Construction {
        unit: String,
        #[source]
        source: CfgError,
    },

    #[error("unit `{unit}`: analysis failed: {source}")]
    Analysis {
        unit: String,
        #[source]
        source: AnalysisError,
    },
}

impl UnitError {
    pub fn unit(&self) -> &str {
        match self {
            UnitError::Construction { unit, .. } | UnitError::Analysis { unit, .. } => unit,
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
pub type CfgResult<T> = std::result::Result<T, CfgError>;
pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;
