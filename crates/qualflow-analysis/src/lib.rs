//! # Qualflow Analysis
//!
//! Work that sits on top of the per-unit engine in `qualflow-core`.
//!
//! ## Modules
//!
//! - **[`driver`]** - Analysis of many units against one shared checker
//! - **[`metrics`]** - Aggregate numbers for a batch run
//! - **[`verify`]** - Lattice-law verification of declared hierarchies
//!
//! ## Quick Start
//!
//! ```rust
//! use qualflow_analysis::prelude::*;
//! use qualflow_core::hir::{AnalysisUnit, HirExpr, HirStmt};
//! use qualflow_core::qualifiers::{Checker, CheckerDecl};
//!
//! let decl = CheckerDecl::from_json_str(
//!     r#"{"qualifiers": [{"name": "Top"}, {"name": "Bottom", "subtype_of": ["Top"]}]}"#,
//! ).unwrap();
//! let checker = Checker::from_decl(&decl).unwrap();
//!
//! let units = vec![AnalysisUnit::new("main", vec![HirStmt::assign("x", HirExpr::int(1))])];
//! let report = BatchAnalyzer::default().run(&checker, &units);
//! assert!(!report.has_findings());
//!
//! let laws = LatticeVerifier::new().verify(checker.hierarchy());
//! assert!(laws.iter().all(|r| !r.is_violated()));
//! ```

pub mod driver;
pub mod metrics;
pub mod verify;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::driver::{BatchAnalyzer, BatchConfig, BatchReport, ReportSummary, UnitSummary};
    pub use crate::metrics::{BatchMetrics, VisitDistribution};
    pub use crate::verify::{LatticeProperty, LatticeVerifier, PropertyStatus, VerificationMethod, VerificationResult};
}

pub use driver::{BatchAnalyzer, BatchConfig, BatchReport};
pub use metrics::BatchMetrics;
pub use verify::{LatticeProperty, LatticeVerifier, PropertyStatus, VerificationResult};
