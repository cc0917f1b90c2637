//! Analysis of many units against one checker
//!
//! Units are independent: each gets its own graph, stores and solver, while
//! the [`Checker`] is shared by reference. A unit that fails to build or to
//! converge only produces an `Err` outcome for itself.

use crate::metrics::BatchMetrics;
use qualflow_core::error::{ConfigError, ConfigResult};
use qualflow_core::hir::AnalysisUnit;
use qualflow_core::qualifiers::Checker;
use qualflow_core::{AnalysisConfig, Diagnostic, QualifiedUnit, QualifierAnalyzer, UnitError};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Analyze units on the rayon thread pool
    pub parallel: bool,
    pub analysis: AnalysisConfig,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            analysis: AnalysisConfig::default(),
        }
    }
}

impl BatchConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Malformed(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&content).map_err(ConfigError::malformed)
    }
}

pub struct BatchAnalyzer {
    config: BatchConfig,
}

impl BatchAnalyzer {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Analyze every unit; outcomes keep the order of `units`.
    pub fn run(&self, checker: &Checker, units: &[AnalysisUnit]) -> BatchReport {
        let started = Instant::now();
        let analyzer = QualifierAnalyzer::new(checker, self.config.analysis.clone());

        let outcomes: Vec<Result<QualifiedUnit, UnitError>> = if self.config.parallel {
            units.par_iter().map(|unit| analyzer.analyze(unit)).collect()
        } else {
            units.iter().map(|unit| analyzer.analyze(unit)).collect()
        };

        for error in outcomes.iter().filter_map(|o| o.as_ref().err()) {
            warn!(unit = error.unit(), %error, "unit skipped");
        }
        let metrics = BatchMetrics::collect(&outcomes, started.elapsed());
        info!(
            checker = checker.name(),
            units = metrics.units,
            failed = metrics.failed,
            diagnostics = metrics.diagnostics,
            visits = metrics.block_visits,
            "batch finished"
        );
        BatchReport { outcomes, metrics }
    }
}

impl Default for BatchAnalyzer {
    fn default() -> Self {
        Self::new(BatchConfig::default())
    }
}

#[derive(Debug)]
pub struct BatchReport {
    pub outcomes: Vec<Result<QualifiedUnit, UnitError>>,
    pub metrics: BatchMetrics,
}

impl BatchReport {
    pub fn analyzed(&self) -> impl Iterator<Item = &QualifiedUnit> {
        self.outcomes.iter().filter_map(|o| o.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = &UnitError> {
        self.outcomes.iter().filter_map(|o| o.as_ref().err())
    }

    /// Every diagnostic, paired with the name of its unit
    pub fn diagnostics(&self) -> impl Iterator<Item = (&str, &Diagnostic)> {
        self.analyzed()
            .flat_map(|unit| unit.diagnostics().iter().map(move |d| (unit.name(), d)))
    }

    /// Whether any unit failed or reported a diagnostic.
    pub fn has_findings(&self) -> bool {
        self.metrics.failed > 0 || self.metrics.diagnostics > 0
    }

    pub fn summary(&self) -> ReportSummary {
        let units = self
            .outcomes
            .iter()
            .map(|outcome| match outcome {
                Ok(unit) => UnitSummary {
                    name: unit.name().to_string(),
                    error: None,
                    blocks: unit.cfg().len(),
                    visits: unit.visits(),
                    diagnostics: unit.diagnostics().to_vec(),
                },
                Err(error) => UnitSummary {
                    name: error.unit().to_string(),
                    error: Some(error.to_string()),
                    blocks: 0,
                    visits: 0,
                    diagnostics: Vec::new(),
                },
            })
            .collect();
        ReportSummary {
            units,
            metrics: self.metrics.clone(),
        }
    }
}

/// Serializable view of a [`BatchReport`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub units: Vec<UnitSummary>,
    pub metrics: BatchMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub blocks: usize,
    pub visits: usize,
    pub diagnostics: Vec<Diagnostic>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use qualflow_core::hir::{HirExpr, HirStmt};
    use qualflow_core::qualifiers::CheckerDecl;

    fn tainting() -> Checker {
        let decl = CheckerDecl::from_json_str(
            r#"{
                "name": "tainting",
                "qualifiers": [
                    {"name": "Tainted"},
                    {"name": "Untainted", "subtype_of": ["Tainted"]}
                ],
                "signatures": [
                    {"method": "readLine", "returns": "Tainted"},
                    {"method": "exec", "params": ["Untainted"]}
                ]
            }"#,
        )
        .unwrap();
        Checker::from_decl(&decl).unwrap()
    }

    fn leaky(name: &str) -> AnalysisUnit {
        AnalysisUnit::new(
            name,
            vec![HirStmt::Expr(HirExpr::call(
                "exec",
                vec![HirExpr::call("readLine", vec![])],
            ))],
        )
    }

    fn units() -> Vec<AnalysisUnit> {
        vec![
            leaky("first"),
            AnalysisUnit::new("broken", vec![HirStmt::Continue(None)]),
            AnalysisUnit::new("clean", vec![HirStmt::assign("x", HirExpr::int(0))]),
            leaky("last"),
        ]
    }

    #[test]
    fn test_failure_is_isolated() {
        let report = BatchAnalyzer::default().run(&tainting(), &units());

        let names: Vec<_> = report.analyzed().map(|u| u.name()).collect();
        assert_eq!(names, ["first", "clean", "last"]);
        let failures: Vec<_> = report.failures().map(|e| e.unit()).collect();
        assert_eq!(failures, ["broken"]);
        assert_eq!(report.metrics.failed, 1);
        assert_eq!(report.metrics.diagnostics, 2);
        assert!(report.has_findings());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let checker = tainting();
        let units = units();
        let parallel = BatchAnalyzer::default().run(&checker, &units);
        let sequential = BatchAnalyzer::new(BatchConfig {
            parallel: false,
            ..BatchConfig::default()
        })
        .run(&checker, &units);

        let mut a = parallel.summary();
        let mut b = sequential.summary();
        a.metrics.elapsed = Default::default();
        b.metrics.elapsed = Default::default();
        assert_eq!(a, b);
    }

    #[test]
    fn test_diagnostics_carry_unit_names() {
        let report = BatchAnalyzer::default().run(&tainting(), &units());
        let units: Vec<_> = report.diagnostics().map(|(unit, _)| unit).collect();
        assert_eq!(units, ["first", "last"]);
        let summary = serde_json::to_value(report.summary()).unwrap();
        assert_eq!(summary["units"][1]["name"], "broken");
        assert!(summary["units"][1]["error"].as_str().unwrap().contains("continue"));
        assert!(summary["units"][0].get("error").is_none());
    }

    #[test]
    fn test_empty_batch() {
        let report = BatchAnalyzer::default().run(&tainting(), &[]);
        assert!(!report.has_findings());
        assert_eq!(report.metrics.units, 0);
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.json");
        std::fs::write(&path, r#"{"parallel": false, "analysis": {"max_block_visits": 50}}"#).unwrap();
        let config = BatchConfig::from_file(&path).unwrap();
        assert!(!config.parallel);
        assert_eq!(config.analysis.max_block_visits, Some(50));
    }
}
