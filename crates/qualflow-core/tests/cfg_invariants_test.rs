//! Structural invariants of built control flow graphs

use proptest::prelude::*;
use qualflow_core::dataflow::{build_cfg, BlockKind, Cfg, SpecialKind, RUNTIME_EXCEPTION};
use qualflow_core::hir::{AnalysisUnit, BinOp, CatchHandler, HirExpr, HirStmt};

fn assert_well_formed(cfg: &Cfg) {
    cfg.validate().unwrap();

    for node in cfg.nodes() {
        assert!(cfg.block(node.block).nodes.contains(&node.id), "{} not in {}", node.id, node.block);
    }
    for block in cfg.blocks() {
        for &node in &block.nodes {
            assert_eq!(cfg.node(node).block, block.id);
        }
        let successors = block.successors();
        match &block.kind {
            BlockKind::Regular { .. } => assert_eq!(successors.len(), 1),
            BlockKind::Conditional { condition, .. } => {
                assert_eq!(successors.len(), 2);
                assert!(block.nodes.is_empty());
                let preds = cfg.predecessors(block.id);
                assert_eq!(preds.len(), 1, "{} has {} predecessors", block.id, preds.len());
                assert_eq!(cfg.block(preds[0]).last_node(), Some(*condition));
            }
            BlockKind::Exceptional { successor, exceptional } => {
                assert_eq!(block.nodes.len(), 1);
                assert!(!exceptional.is_empty());
                assert_eq!(successors.len(), usize::from(successor.is_some()) + exceptional.len());
            }
            BlockKind::Special { kind, .. } => match kind {
                SpecialKind::Exit | SpecialKind::ExceptionalExit => assert!(successors.is_empty()),
                SpecialKind::Entry | SpecialKind::LoopHead => assert_eq!(successors.len(), 1),
            },
        }
        for successor in successors {
            assert!(cfg.predecessors(successor).contains(&block.id));
        }
    }
    assert!(cfg.is_reachable(cfg.entry()));
}

fn call(method: &str, args: Vec<HirExpr>) -> HirExpr {
    HirExpr::call(method, args)
}

#[test]
fn test_mixed_program_is_well_formed() {
    let body = vec![
        HirStmt::decl("s", None, Some(call("readLine", vec![]))),
        HirStmt::Try {
            body: vec![
                HirStmt::while_loop(
                    HirExpr::binary(
                        BinOp::And,
                        call("more", vec![]),
                        HirExpr::not(HirExpr::binary(BinOp::Eq, HirExpr::var("s"), HirExpr::string(""))),
                    ),
                    vec![
                        HirStmt::if_else(
                            call("done", vec![]),
                            vec![HirStmt::Break(None)],
                            Some(vec![HirStmt::assign("s", call("next", vec![HirExpr::var("s")]))]),
                        ),
                        HirStmt::Assert {
                            condition: call("valid", vec![HirExpr::var("s")]),
                        },
                    ],
                ),
                HirStmt::Throw {
                    exception: "IOException".to_string(),
                    value: None,
                },
            ],
            handlers: vec![CatchHandler {
                exception: "IOException".to_string(),
                binding: Some("e".to_string()),
                body: vec![HirStmt::Return(Some(HirExpr::string("failed")))],
            }],
            finally: Some(vec![HirStmt::Expr(call("close", vec![]))]),
        },
        HirStmt::Return(Some(HirExpr::var("s"))),
    ];
    let cfg = build_cfg(&AnalysisUnit::new("mixed", body)).unwrap();

    assert_well_formed(&cfg);
    assert!(cfg.has_cycle());
    assert!(!cfg.back_edges().is_empty());
    let catches_runtime = cfg.blocks().iter().any(|b| match &b.kind {
        BlockKind::Exceptional { exceptional, .. } => exceptional.contains_key(RUNTIME_EXCEPTION),
        _ => false,
    });
    assert!(catches_runtime);
    assert!(cfg.is_reachable(cfg.exit()));
}

#[test]
fn test_dump_lists_every_block() {
    let unit = AnalysisUnit::new(
        "dump",
        vec![HirStmt::if_else(
            HirExpr::var("c"),
            vec![HirStmt::assign("x", HirExpr::int(1))],
            Some(vec![HirStmt::assign("x", HirExpr::int(2))]),
        )],
    );
    let cfg = build_cfg(&unit).unwrap();
    let dump = cfg.to_string();

    assert!(dump.starts_with("cfg `dump`"));
    for block in cfg.blocks() {
        assert!(dump.contains(&block.id.to_string()), "{} missing from\n{dump}", block.id);
    }
}

fn leaf_expr() -> impl Strategy<Value = HirExpr> {
    prop_oneof![
        Just(HirExpr::var("x")),
        Just(HirExpr::string("s")),
        (0i64..3).prop_map(HirExpr::int),
        Just(HirExpr::call("f", vec![])),
    ]
}

fn expr() -> impl Strategy<Value = HirExpr> {
    leaf_expr().prop_recursive(3, 12, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| HirExpr::binary(BinOp::And, l, r)),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| HirExpr::binary(BinOp::Or, l, r)),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| HirExpr::binary(BinOp::Add, l, r)),
            inner.clone().prop_map(HirExpr::not),
            (inner.clone(), inner.clone(), inner).prop_map(|(c, t, e)| HirExpr::Ternary {
                condition: Box::new(c),
                then_value: Box::new(t),
                else_value: Box::new(e),
            }),
        ]
    })
}

/// Statements that are valid anywhere, plus `break`/`continue` inside loops.
fn stmts(in_loop: bool, depth: u32) -> BoxedStrategy<Vec<HirStmt>> {
    let mut simple: Vec<BoxedStrategy<HirStmt>> = vec![
        expr().prop_map(|e| HirStmt::assign("x", e)).boxed(),
        expr().prop_map(HirStmt::Expr).boxed(),
        expr().prop_map(|e| HirStmt::Return(Some(e))).boxed(),
        expr().prop_map(|condition| HirStmt::Assert { condition }).boxed(),
    ];
    if in_loop {
        simple.push(Just(HirStmt::Break(None)).boxed());
        simple.push(Just(HirStmt::Continue(None)).boxed());
    }
    let simple = prop::strategy::Union::new(simple).boxed();
    if depth == 0 {
        return prop::collection::vec(simple, 0..4).boxed();
    }

    let compound = prop_oneof![
        (expr(), stmts(in_loop, depth - 1), prop::option::of(stmts(in_loop, depth - 1)))
            .prop_map(|(c, t, e)| HirStmt::if_else(c, t, e)),
        (expr(), stmts(true, depth - 1)).prop_map(|(c, body)| HirStmt::while_loop(c, body)),
        (stmts(true, depth - 1), expr()).prop_map(|(body, condition)| HirStmt::DoWhile {
            label: None,
            body,
            condition,
        }),
        (stmts(in_loop, depth - 1), stmts(in_loop, depth - 1), prop::option::of(stmts(in_loop, depth - 1)))
            .prop_map(|(body, handler, finally)| HirStmt::Try {
                body,
                handlers: vec![CatchHandler {
                    exception: "*".to_string(),
                    binding: None,
                    body: handler,
                }],
                finally,
            }),
    ];
    prop::collection::vec(prop_oneof![3 => simple, 1 => compound], 0..4).boxed()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn test_generated_programs_are_well_formed(body in stmts(false, 2)) {
        let cfg = build_cfg(&AnalysisUnit::new("generated", body)).unwrap();
        assert_well_formed(&cfg);
        let order = cfg.reverse_postorder();
        prop_assert_eq!(order.first().copied(), Some(cfg.entry()));
        for block in order {
            prop_assert!(cfg.is_reachable(block));
        }
    }
}
