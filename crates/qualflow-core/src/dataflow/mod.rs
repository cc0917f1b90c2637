//! Flow-sensitive qualifier inference
//!
//! This module implements the dataflow side of the engine:
//! - Control flow graph model and its construction from the lowered program
//! - Stores of refined qualifiers and their join
//! - The per-node transfer function with pluggable test refinements
//! - Worklist-based fixpoint solver

mod analysis;
mod builder;
mod cfg;
mod node;
pub mod refinement;
mod solver;
mod store;
mod transfer;

pub use analysis::{QualifiedUnit, QualifierAnalyzer};
pub use builder::{build_cfg, CfgBuilder, ASSERTION_ERROR, CATCH_ALL, RUNTIME_EXCEPTION};
pub use cfg::{Block, BlockId, BlockKind, Cfg, CfgParts, SpecialKind};
pub use node::{LocalVar, Node, NodeId, NodeKind, NodeTarget, VarOrigin};
pub use refinement::{RefinementContext, RefinementHandler, RefinementRegistry, RefinementRules};
pub use solver::{BlockStatus, BlockTransfer, DataflowAnalysis, FixpointResult, FixpointSolver};
pub use store::{FlowKey, Store, TransferResult};
pub use transfer::{node_keys, Declarations, QualifierTransfer};
