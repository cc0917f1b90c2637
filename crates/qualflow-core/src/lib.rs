//! Flow-sensitive, pluggable type-qualifier checking
//!
//! A checker is declared as data ([`qualifiers::CheckerDecl`]): a lattice of
//! qualifiers, ordered implicit rules and method signatures. Each lowered
//! program unit ([`hir::AnalysisUnit`]) is turned into a control flow graph,
//! solved to a fixpoint of qualifier stores, and checked against the
//! declared requirements.
//!
//! ```
//! use qualflow_core::hir::{AnalysisUnit, HirExpr, HirStmt};
//! use qualflow_core::qualifiers::{Checker, CheckerDecl};
//!
//! let decl = CheckerDecl::from_json_str(r#"{
//!     "qualifiers": [
//!         {"name": "Tainted"},
//!         {"name": "Untainted", "subtype_of": ["Tainted"]}
//!     ],
//!     "signatures": [{"method": "readLine", "returns": "Tainted"}]
//! }"#).unwrap();
//! let checker = Checker::from_decl(&decl).unwrap();
//!
//! let unit = AnalysisUnit::new("main", vec![
//!     HirStmt::decl("s", Some("Untainted"), Some(HirExpr::call("readLine", vec![]))),
//! ]);
//! let result = checker.analyze(&unit).unwrap();
//! assert_eq!(result.diagnostics().len(), 1);
//! ```

pub mod check;
pub mod config;
pub mod dataflow;
pub mod error;
pub mod hir;
pub mod qualifiers;

pub use check::{Diagnostic, DiagnosticKind};
pub use config::AnalysisConfig;
pub use dataflow::{Cfg, QualifiedUnit, QualifierAnalyzer};
pub use error::{AnalysisError, CfgError, ConfigError, UnitError};
pub use qualifiers::{Checker, CheckerDecl, Qualifier, QualifierHierarchy};
