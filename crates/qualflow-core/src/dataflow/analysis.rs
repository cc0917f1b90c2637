//! Per-unit entry point: build, solve, check

use super::builder::build_cfg;
use super::cfg::{BlockId, Cfg};
use super::node::NodeId;
use super::solver::{BlockStatus, FixpointSolver};
use super::store::{FlowKey, Store, TransferResult};
use super::transfer::QualifierTransfer;
use crate::check::{check_unit, Diagnostic};
use crate::config::AnalysisConfig;
use crate::error::{AnalysisError, AnalysisResult, UnitError};
use crate::hir::AnalysisUnit;
use crate::qualifiers::{Checker, ImplicitSubject, Qualifier, SyntaxKind};
use tracing::{debug, info_span, warn};

/// Analyzes units against one checker. Holds nothing mutable, so one
/// analyzer can serve any number of threads.
#[derive(Debug, Clone)]
pub struct QualifierAnalyzer<'c> {
    checker: &'c Checker,
    config: AnalysisConfig,
}

impl<'c> QualifierAnalyzer<'c> {
    pub fn new(checker: &'c Checker, config: AnalysisConfig) -> Self {
        Self { checker, config }
    }

    pub fn checker(&self) -> &'c Checker {
        self.checker
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Build and analyze one unit. Failures concern this unit only.
    pub fn analyze(&self, unit: &AnalysisUnit) -> Result<QualifiedUnit, UnitError> {
        let _span = info_span!("unit", name = %unit.name).entered();
        let cfg = build_cfg(unit).map_err(|source| {
            warn!(error = %source, "construction failed");
            UnitError::Construction {
                unit: unit.name.clone(),
                source,
            }
        })?;
        self.analyze_cfg(unit, cfg).map_err(|source| {
            warn!(error = %source, "analysis failed");
            UnitError::Analysis {
                unit: unit.name.clone(),
                source,
            }
        })
    }

    /// Analyze a prebuilt graph of `unit`.
    pub fn analyze_cfg(&self, unit: &AnalysisUnit, cfg: Cfg) -> AnalysisResult<QualifiedUnit> {
        let h = self.checker.hierarchy();
        let initial = self.initial_store(unit)?;
        let return_bound = unit
            .return_qualifier
            .as_deref()
            .map(|name| self.resolve_unit_qualifier(name, "return value"))
            .transpose()?;

        let limit = self.config.visit_limit(cfg.len(), cfg.node_count(), h.height());
        let solver = FixpointSolver::new(limit).record_history(self.config.record_history);
        let mut transfer = QualifierTransfer::new(self.checker, &cfg, initial);
        let result = solver.solve(&mut transfer, &cfg)?;
        if self.config.check_unreachable {
            transfer.evaluate_unreachable(&cfg)?;
        }
        let values = transfer.into_values();

        let diagnostics = check_unit(self.checker, &cfg, &values, return_bound, self.config.check_unreachable)?;
        debug!(
            visits = result.visits,
            rounds = result.rounds,
            limit,
            diagnostics = diagnostics.len(),
            "analyzed unit"
        );

        Ok(QualifiedUnit {
            name: unit.name.clone(),
            cfg,
            input: result.in_facts,
            output: result.out_facts,
            values,
            visits: result.visits,
            rounds: result.rounds,
            statuses: result.statuses,
            history: result.history,
            diagnostics,
        })
    }

    /// Parameters start at their declared (or implicit) qualifier.
    pub fn initial_store(&self, unit: &AnalysisUnit) -> AnalysisResult<Store> {
        let mut store = Store::new(self.checker.hierarchy());
        for param in &unit.params {
            let qualifier = match &param.qualifier {
                Some(name) => self.resolve_unit_qualifier(name, &format!("parameter `{}`", param.name))?,
                None => self
                    .checker
                    .implicit()
                    .evaluate(ImplicitSubject::Element(SyntaxKind::Parameter)),
            };
            store.insert(FlowKey::local(param.name.clone()), qualifier);
        }
        Ok(store)
    }

    fn resolve_unit_qualifier(&self, name: &str, context: &str) -> AnalysisResult<Qualifier> {
        self.checker
            .hierarchy()
            .lookup(name)
            .ok_or_else(|| AnalysisError::UnknownUnitQualifier {
                name: name.to_string(),
                context: context.to_string(),
            })
    }
}

/// Analysis result of one unit: per-block stores, per-node qualifiers and
/// the diagnostics derived from them.
#[derive(Debug)]
pub struct QualifiedUnit {
    name: String,
    cfg: Cfg,
    input: Vec<Option<TransferResult>>,
    output: Vec<Option<TransferResult>>,
    values: Vec<Option<Qualifier>>,
    visits: usize,
    rounds: usize,
    statuses: Vec<BlockStatus>,
    history: Option<Vec<(BlockId, TransferResult)>>,
    diagnostics: Vec<Diagnostic>,
}

impl QualifiedUnit {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cfg(&self) -> &Cfg {
        &self.cfg
    }

    /// Store entering `block`; `None` if no execution reaches it.
    pub fn input(&self, block: BlockId) -> Option<&TransferResult> {
        self.input.get(block.0).and_then(Option::as_ref)
    }

    pub fn output(&self, block: BlockId) -> Option<&TransferResult> {
        self.output.get(block.0).and_then(Option::as_ref)
    }

    /// Final qualifier computed for `node`.
    pub fn value(&self, node: NodeId) -> Option<Qualifier> {
        self.values.get(node.0).copied().flatten()
    }

    pub fn values(&self) -> &[Option<Qualifier>] {
        &self.values
    }

    pub fn visits(&self) -> usize {
        self.visits
    }

    /// Solver passes over the reverse postorder
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn status(&self, block: BlockId) -> BlockStatus {
        self.statuses.get(block.0).copied().unwrap_or(BlockStatus::Unvisited)
    }

    pub fn history(&self) -> Option<&[(BlockId, TransferResult)]> {
        self.history.as_deref()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Store at normal exit, if the unit can complete normally.
    pub fn exit_store(&self) -> Option<&Store> {
        // Special blocks collapse their input, so this is a regular result
        self.output(self.cfg.exit()).map(TransferResult::then_store)
    }
}

impl Checker {
    /// Analyze one unit with the default configuration.
    pub fn analyze(&self, unit: &AnalysisUnit) -> Result<QualifiedUnit, UnitError> {
        QualifierAnalyzer::new(self, AnalysisConfig::default()).analyze(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::DiagnosticKind;
    use crate::hir::{BinOp, CatchHandler, HirExpr, HirParam, HirStmt};
    use crate::qualifiers::CheckerDecl;

    fn tainting() -> Checker {
        let decl = CheckerDecl::from_json_str(
            r#"{
                "name": "tainting",
                "qualifiers": [
                    {"name": "Tainted"},
                    {"name": "Untainted", "subtype_of": ["Tainted"]}
                ],
                "implicit": [{"pattern": {"literal": "string"}, "qualifier": "Untainted"}],
                "signatures": [
                    {"method": "readLine", "returns": "Tainted"},
                    {"method": "sanitize", "params": [null], "returns": "Untainted", "pure": true},
                    {"method": "isClean", "params": [null], "pure": true,
                     "ensures_if": [{"result": true, "target": {"argument": 0}, "qualifier": "Untainted"}]},
                    {"method": "exec", "params": ["Untainted"]}
                ]
            }"#,
        )
        .unwrap();
        Checker::from_decl(&decl).unwrap()
    }

    fn read_line() -> HirExpr {
        HirExpr::call("readLine", vec![])
    }

    fn subjects(unit: &QualifiedUnit) -> Vec<&str> {
        unit.diagnostics().iter().map(|d| d.subject.as_str()).collect()
    }

    #[test]
    fn test_sanitized_value_is_accepted() {
        let unit = AnalysisUnit::new(
            "sanitize",
            vec![
                HirStmt::decl("s", None, Some(read_line())),
                HirStmt::decl("t", Some("Untainted"), Some(HirExpr::call("sanitize", vec![HirExpr::var("s")]))),
                HirStmt::decl("u", Some("Untainted"), Some(HirExpr::var("s"))),
            ],
        );
        let result = tainting().analyze(&unit).unwrap();

        let diagnostics = result.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::AssignmentIncompatible);
        assert_eq!(diagnostics[0].subject, "u");
        assert_eq!(diagnostics[0].found, "Tainted");
        assert_eq!(diagnostics[0].required, "Untainted");
    }

    #[test]
    fn test_boolean_method_refines_then_branch_only() {
        let unit = AnalysisUnit::new(
            "guarded",
            vec![
                HirStmt::decl("s", None, Some(read_line())),
                HirStmt::if_else(
                    HirExpr::call("isClean", vec![HirExpr::var("s")]),
                    vec![HirStmt::decl("x", Some("Untainted"), Some(HirExpr::var("s")))],
                    Some(vec![HirStmt::decl("y", Some("Untainted"), Some(HirExpr::var("s")))]),
                ),
            ],
        );
        let result = tainting().analyze(&unit).unwrap();
        assert_eq!(subjects(&result), vec!["y"]);
    }

    #[test]
    fn test_negated_test_refines_else_branch() {
        let unit = AnalysisUnit::new(
            "negated",
            vec![
                HirStmt::decl("s", None, Some(read_line())),
                HirStmt::if_else(
                    HirExpr::not(HirExpr::call("isClean", vec![HirExpr::var("s")])),
                    vec![HirStmt::Return(None)],
                    None,
                ),
                HirStmt::Expr(HirExpr::call("exec", vec![HirExpr::var("s")])),
            ],
        );
        let result = tainting().analyze(&unit).unwrap();
        assert!(result.diagnostics().is_empty(), "{:?}", result.diagnostics());
    }

    #[test]
    fn test_equality_with_literal_refines() {
        let unit = AnalysisUnit::new(
            "equality",
            vec![
                HirStmt::decl("s", None, Some(read_line())),
                HirStmt::if_else(
                    HirExpr::binary(BinOp::Eq, HirExpr::var("s"), HirExpr::string("safe")),
                    vec![HirStmt::decl("x", Some("Untainted"), Some(HirExpr::var("s")))],
                    Some(vec![HirStmt::decl("y", Some("Untainted"), Some(HirExpr::var("s")))]),
                ),
            ],
        );
        let result = tainting().analyze(&unit).unwrap();
        assert_eq!(subjects(&result), vec!["y"]);
    }

    #[test]
    fn test_impure_call_invalidates_field_refinement() {
        let guarded_field = |between: Vec<HirStmt>| {
            let mut then_body = between;
            then_body.push(HirStmt::decl(
                "x",
                Some("Untainted"),
                Some(HirExpr::field(HirExpr::This, "name")),
            ));
            AnalysisUnit::new(
                "field",
                vec![HirStmt::if_else(
                    HirExpr::call("isClean", vec![HirExpr::field(HirExpr::This, "name")]),
                    then_body,
                    None,
                )],
            )
        };

        let checker = tainting();
        assert!(checker.analyze(&guarded_field(vec![])).unwrap().diagnostics().is_empty());
        let invalidated = checker
            .analyze(&guarded_field(vec![HirStmt::Expr(HirExpr::call("log", vec![]))]))
            .unwrap();
        assert_eq!(subjects(&invalidated), vec!["x"]);
    }

    #[test]
    fn test_argument_and_return_checks() {
        let unit = AnalysisUnit::new(
            "run",
            vec![
                HirStmt::Expr(HirExpr::call("exec", vec![HirExpr::var("cmd")])),
                HirStmt::Return(Some(HirExpr::var("cmd"))),
            ],
        )
        .with_param(HirParam::new("cmd"))
        .with_return_qualifier("Untainted");
        let result = tainting().analyze(&unit).unwrap();

        let kinds: Vec<DiagnosticKind> = result.diagnostics().iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![DiagnosticKind::ArgumentIncompatible, DiagnosticKind::ReturnIncompatible]
        );
    }

    #[test]
    fn test_qualified_parameter_seeds_entry_store() {
        let unit = AnalysisUnit::new("run", vec![HirStmt::Expr(HirExpr::call("exec", vec![HirExpr::var("cmd")]))])
            .with_param(HirParam::qualified("cmd", "Untainted"));
        let result = tainting().analyze(&unit).unwrap();
        assert!(result.diagnostics().is_empty());

        let checker = tainting();
        let entry = result.input(result.cfg().entry()).unwrap().then_store();
        assert_eq!(
            entry.get(&FlowKey::local("cmd")),
            checker.hierarchy().lookup("Untainted")
        );
    }

    #[test]
    fn test_handler_sees_store_before_raising_call() {
        let unit = AnalysisUnit::new(
            "handler",
            vec![
                HirStmt::decl("x", None, Some(read_line())),
                HirStmt::Try {
                    body: vec![
                        HirStmt::assign("x", HirExpr::call("sanitize", vec![HirExpr::var("x")])),
                        HirStmt::Expr(HirExpr::call("exec", vec![HirExpr::var("x")])),
                    ],
                    handlers: vec![CatchHandler {
                        exception: "RuntimeException".into(),
                        binding: None,
                        body: vec![HirStmt::decl("y", Some("Untainted"), Some(HirExpr::var("x")))],
                    }],
                    finally: None,
                },
            ],
        );
        let result = tainting().analyze(&unit).unwrap();
        // `exec` gets the sanitized value; the handler may run before sanitizing
        assert_eq!(subjects(&result), vec!["y"]);
    }

    #[test]
    fn test_cast_with_unknown_qualifier_fails_unit() {
        let unit = AnalysisUnit::new(
            "cast",
            vec![HirStmt::Expr(HirExpr::cast("Trusted", HirExpr::string("a")))],
        );
        let err = tainting().analyze(&unit).unwrap_err();
        assert_eq!(err.unit(), "cast");
        assert!(matches!(
            err,
            UnitError::Analysis {
                source: AnalysisError::UnknownQualifier { ref name, .. },
                ..
            } if name == "Trusted"
        ));
    }

    #[test]
    fn test_unknown_parameter_qualifier() {
        let unit = AnalysisUnit::new("p", vec![]).with_param(HirParam::qualified("a", "Nope"));
        let err = tainting().analyze(&unit).unwrap_err();
        assert!(matches!(
            err,
            UnitError::Analysis {
                source: AnalysisError::UnknownUnitQualifier { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_construction_error_is_reported_per_unit() {
        let unit = AnalysisUnit::new("broken", vec![HirStmt::Break(None)]);
        let err = tainting().analyze(&unit).unwrap_err();
        assert!(matches!(err, UnitError::Construction { .. }));
    }

    #[test]
    fn test_unsafe_cast_reported() {
        let unit = AnalysisUnit::new(
            "cast",
            vec![HirStmt::decl("t", Some("Untainted"), Some(HirExpr::cast("Untainted", read_line())))],
        );
        let result = tainting().analyze(&unit).unwrap();
        let kinds: Vec<DiagnosticKind> = result.diagnostics().iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![DiagnosticKind::UnsafeCast]);
    }

    #[test]
    fn test_dead_code_checked_only_on_request() {
        let unit = AnalysisUnit::new(
            "dead",
            vec![
                HirStmt::Return(None),
                HirStmt::decl("y", Some("Untainted"), Some(read_line())),
            ],
        );
        let checker = tainting();
        assert!(checker.analyze(&unit).unwrap().diagnostics().is_empty());

        let config = AnalysisConfig {
            check_unreachable: true,
            ..AnalysisConfig::default()
        };
        let result = QualifierAnalyzer::new(&checker, config).analyze(&unit).unwrap();
        assert_eq!(subjects(&result), vec!["y"]);
    }


    fn dead_code_config() -> AnalysisConfig {
        AnalysisConfig {
            check_unreachable: true,
            ..AnalysisConfig::default()
        }
    }

    #[test]
    fn test_dead_operand_in_later_block_is_evaluated_first() {
        // The merge block of `a || b` is created after the ternary's merge block
        let ternary = HirExpr::Ternary {
            condition: Box::new(HirExpr::var("p")),
            then_value: Box::new(read_line()),
            else_value: Box::new(HirExpr::binary(BinOp::Or, HirExpr::var("a"), HirExpr::var("b"))),
        };
        let decl = HirStmt::decl("y", Some("Untainted"), Some(ternary));
        let checker = tainting();
        let analyzer = QualifierAnalyzer::new(&checker, dead_code_config());

        let live = analyzer.analyze(&AnalysisUnit::new("live", vec![decl.clone()])).unwrap();
        assert_eq!(subjects(&live), vec!["y"]);

        let dead = analyzer
            .analyze(&AnalysisUnit::new("dead", vec![HirStmt::Return(None), decl]))
            .unwrap();
        assert_eq!(subjects(&dead), vec!["y"]);
    }

    #[test]
    fn test_dead_code_error_fails_unit() {
        let unit = AnalysisUnit::new(
            "dead-cast",
            vec![
                HirStmt::Return(None),
                HirStmt::Expr(HirExpr::cast("Trusted", HirExpr::string("a"))),
            ],
        );
        let checker = tainting();
        assert!(checker.analyze(&unit).is_ok());

        let err = QualifierAnalyzer::new(&checker, dead_code_config()).analyze(&unit).unwrap_err();
        assert!(matches!(
            err,
            UnitError::Analysis {
                source: AnalysisError::UnknownQualifier { ref name, .. },
                ..
            } if name == "Trusted"
        ));
    }
}
