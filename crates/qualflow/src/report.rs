//! Terminal rendering of batch and verification results

use colored::Colorize;
use qualflow_analysis::{BatchReport, VerificationResult};
use std::fmt::{self, Write};

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{count} {word}")
    } else {
        format!("{count} {word}s")
    }
}

pub fn render_batch(report: &BatchReport) -> Result<String, fmt::Error> {
    let mut out = String::new();
    for outcome in &report.outcomes {
        match outcome {
            Ok(unit) => {
                let diagnostics = unit.diagnostics();
                let status = if diagnostics.is_empty() {
                    "ok".green().to_string()
                } else {
                    plural(diagnostics.len(), "diagnostic").yellow().to_string()
                };
                writeln!(
                    out,
                    "{} {}: {status} ({}, {})",
                    "unit".bold(),
                    unit.name().bold(),
                    plural(unit.cfg().len(), "block"),
                    plural(unit.visits(), "visit")
                )?;
                for diagnostic in diagnostics {
                    writeln!(out, "  {}: {diagnostic}", "error".red().bold())?;
                }
            }
            Err(error) => {
                writeln!(out, "{} {}: {} {error}", "unit".bold(), error.unit().bold(), "failed:".red().bold())?;
            }
        }
    }

    let m = &report.metrics;
    writeln!(
        out,
        "{}: {}, {} failed, {} in {:.2?}",
        "summary".bold(),
        plural(m.units, "unit"),
        m.failed,
        plural(m.diagnostics, "diagnostic"),
        m.elapsed
    )?;
    Ok(out)
}

pub fn render_verification(checker: &str, results: &[VerificationResult]) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "{} {}", "lattice laws of".bold(), checker.bold())?;
    for result in results {
        let mark = if result.is_violated() {
            "FAIL".red().bold()
        } else {
            "ok".green()
        };
        writeln!(out, "  [{mark}] {result}")?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qualflow_analysis::{BatchAnalyzer, LatticeVerifier};
    use qualflow_core::hir::{AnalysisUnit, HirExpr, HirStmt};
    use qualflow_core::qualifiers::{Checker, CheckerDecl};

    fn checker() -> Checker {
        let decl = CheckerDecl::from_json_str(
            r#"{
                "name": "tainting",
                "qualifiers": [{"name": "Tainted"}, {"name": "Untainted", "subtype_of": ["Tainted"]}],
                "signatures": [
                    {"method": "readLine", "returns": "Tainted"},
                    {"method": "exec", "params": ["Untainted"]}
                ]
            }"#,
        )
        .unwrap();
        Checker::from_decl(&decl).unwrap()
    }

    #[test]
    fn test_render_batch() {
        colored::control::set_override(false);
        let units = vec![
            AnalysisUnit::new(
                "leak",
                vec![HirStmt::Expr(HirExpr::call("exec", vec![HirExpr::call("readLine", vec![])]))],
            ),
            AnalysisUnit::new("broken", vec![HirStmt::Break(None)]),
        ];
        let report = BatchAnalyzer::default().run(&checker(), &units);
        let text = render_batch(&report).unwrap();

        assert!(text.contains("unit leak: 1 diagnostic"), "{text}");
        assert!(text.contains("error: block"), "{text}");
        assert!(text.contains("found `Tainted`, required `Untainted`"), "{text}");
        assert!(text.contains("unit broken: failed:"), "{text}");
        assert!(text.contains("summary: 2 units, 1 failed, 1 diagnostic"), "{text}");
    }

    #[test]
    fn test_render_verification() {
        colored::control::set_override(false);
        let checker = checker();
        let results = LatticeVerifier::new().verify(checker.hierarchy());
        let text = render_verification(checker.name(), &results).unwrap();

        assert!(text.starts_with("lattice laws of tainting"));
        assert_eq!(text.matches("[ok]").count(), results.len());
    }

    #[test]
    fn test_render_empty_batch() {
        colored::control::set_override(false);
        let report = BatchAnalyzer::default().run(&checker(), &[]);
        let text = render_batch(&report).unwrap();

        assert_eq!(text.lines().count(), 1, "{text}");
        assert!(text.starts_with("summary: 0 units, 0 failed, 0 diagnostics"), "{text}");
    }
}
