//! Qualifier lattices and their declarations
//!
//! - [`QualifierHierarchy`]: the validated subtype lattice with precomputed
//!   join and meet tables
//! - [`ImplicitRuleSet`]: ordered defaults for unannotated syntax
//! - [`SignatureTable`]: declared method and field qualifiers
//! - [`Checker`]: all of the above, resolved from a [`CheckerDecl`]

mod decl;
mod hierarchy;
mod implicit;
mod signatures;

pub use decl::{
    Checker, CheckerDecl, ConditionalPostconditionDecl, FieldDecl, ImplicitRuleDecl, PatternDecl, PostconditionDecl,
    QualifierDecl, RefinementDecl, SignatureDecl, TargetDecl,
};
pub use hierarchy::{HierarchyBuilder, Qualifier, QualifierHierarchy};
pub use implicit::{ImplicitPattern, ImplicitRule, ImplicitRuleSet, ImplicitSubject, SyntaxKind};
pub use signatures::{ConditionalPostcondition, MethodSignature, Postcondition, PostconditionTarget, SignatureTable};
