//! Dataflow analysis framework with worklist-based fixpoint solver

use super::cfg::{BlockId, Cfg};
use crate::error::{AnalysisError, AnalysisResult};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, trace, warn};

/// Lifecycle of a block during solving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStatus {
    /// Never reached; its facts are bottom
    Unvisited,
    /// Queued for (re)processing
    Pending,
    /// Last visit produced an output different from the one before
    Changed,
    /// Last visit produced nothing new
    Stable,
}

/// Output of one block visit
#[derive(Debug, Clone)]
pub struct BlockTransfer<F> {
    /// Fact after the block's last node
    pub output: F,
    /// Fact flowing along each outgoing edge
    pub edges: Vec<(BlockId, F)>,
    /// Other blocks that read something this visit changed
    pub revisit: Vec<BlockId>,
}

/// Generic trait for forward dataflow analyses
pub trait DataflowAnalysis {
    /// The type of facts being propagated
    type Fact: Clone + PartialEq;

    /// Fact at the entry block
    fn initial_fact(&self) -> Self::Fact;

    /// Fact of an unreached program point
    fn bottom(&self) -> Self::Fact;

    /// Merge facts arriving along different edges
    fn join(&self, a: &Self::Fact, b: &Self::Fact) -> Self::Fact;

    /// Transfer function: compute the facts leaving `block` from its input
    fn transfer(&mut self, cfg: &Cfg, block: BlockId, input: &Self::Fact) -> AnalysisResult<BlockTransfer<Self::Fact>>;
}

/// Result of fixpoint computation
#[derive(Debug)]
pub struct FixpointResult<F> {
    /// Facts at entry of each block; `None` for blocks never visited
    pub in_facts: Vec<Option<F>>,
    /// Facts at exit of each block
    pub out_facts: Vec<Option<F>>,
    /// Facts per (from, to) edge
    pub edge_facts: HashMap<(BlockId, BlockId), F>,
    /// Number of block visits until the worklist emptied
    pub visits: usize,
    /// Passes over the reverse postorder. A pass ends when the next block
    /// taken from the worklist does not come later in the order.
    pub rounds: usize,
    pub statuses: Vec<BlockStatus>,
    /// Output of every visit in order, when recorded
    pub history: Option<Vec<(BlockId, F)>>,
    /// Status each visit left its block in, recorded with `history`
    pub visit_statuses: Option<Vec<(BlockId, BlockStatus)>>,
}

impl<F> FixpointResult<F> {
    pub fn in_fact(&self, block: BlockId) -> Option<&F> {
        self.in_facts.get(block.0).and_then(Option::as_ref)
    }

    pub fn out_fact(&self, block: BlockId) -> Option<&F> {
        self.out_facts.get(block.0).and_then(Option::as_ref)
    }

    pub fn status(&self, block: BlockId) -> BlockStatus {
        self.statuses.get(block.0).copied().unwrap_or(BlockStatus::Unvisited)
    }
}

/// Worklist-based fixpoint solver
#[derive(Debug, Clone)]
pub struct FixpointSolver {
    max_visits: usize,
    record_history: bool,
}

impl FixpointSolver {
    pub fn new(max_visits: usize) -> Self {
        Self {
            max_visits,
            record_history: false,
        }
    }

    pub fn record_history(mut self, record: bool) -> Self {
        self.record_history = record;
        self
    }

    pub fn max_visits(&self) -> usize {
        self.max_visits
    }

    /// Compute the fixpoint of a forward analysis.
    ///
    /// The worklist is ordered by reverse postorder, so a block is processed
    /// after its forward predecessors whenever possible. Edge facts are joined
    /// into their previous value, so every fact only grows.
    pub fn solve<A: DataflowAnalysis>(&self, analysis: &mut A, cfg: &Cfg) -> AnalysisResult<FixpointResult<A::Fact>> {
        let n = cfg.len();
        let mut rank = vec![usize::MAX; n];
        for (index, block) in cfg.reverse_postorder().into_iter().enumerate() {
            rank[block.0] = index;
        }

        let mut in_facts: Vec<Option<A::Fact>> = vec![None; n];
        let mut out_facts: Vec<Option<A::Fact>> = vec![None; n];
        let mut edge_facts: HashMap<(BlockId, BlockId), A::Fact> = HashMap::new();
        let mut statuses = vec![BlockStatus::Unvisited; n];
        let mut history = self.record_history.then(Vec::new);
        let mut visit_statuses = self.record_history.then(Vec::new);

        let mut worklist: BTreeSet<(usize, BlockId)> = BTreeSet::new();
        let entry = cfg.entry();
        worklist.insert((rank[entry.0], entry));
        statuses[entry.0] = BlockStatus::Pending;

        let mut visits = 0;
        let mut rounds = 0;
        let mut last_rank = None;
        while let Some((block_rank, block)) = worklist.pop_first() {
            if last_rank.map_or(true, |last| block_rank <= last) {
                rounds += 1;
            }
            last_rank = Some(block_rank);
            visits += 1;
            if visits > self.max_visits {
                warn!(unit = cfg.name(), limit = self.max_visits, "fixpoint visit limit exceeded");
                return Err(AnalysisError::VisitLimit {
                    visits: self.max_visits,
                });
            }

            // Input is the join over incoming edges (plus the initial fact at entry)
            let mut input = (block == entry).then(|| analysis.initial_fact());
            for &pred in cfg.predecessors(block) {
                if let Some(fact) = edge_facts.get(&(pred, block)) {
                    input = Some(match input {
                        Some(acc) => analysis.join(&acc, fact),
                        None => fact.clone(),
                    });
                }
            }
            let input = input.unwrap_or_else(|| analysis.bottom());

            let transfer = analysis.transfer(cfg, block, &input)?;
            let status = if out_facts[block.0].as_ref() == Some(&transfer.output) {
                BlockStatus::Stable
            } else {
                BlockStatus::Changed
            };
            trace!(%block, visit = visits, ?status, "transferred block");
            statuses[block.0] = status;
            if let Some(visit_statuses) = visit_statuses.as_mut() {
                visit_statuses.push((block, status));
            }

            for (succ, fact) in transfer.edges {
                let merged = match edge_facts.get(&(block, succ)) {
                    Some(old) => {
                        let merged = analysis.join(old, &fact);
                        if &merged == old {
                            continue;
                        }
                        merged
                    }
                    None => fact,
                };
                edge_facts.insert((block, succ), merged);
                worklist.insert((rank[succ.0], succ));
                statuses[succ.0] = BlockStatus::Pending;
            }
            for other in transfer.revisit {
                if statuses[other.0] != BlockStatus::Unvisited {
                    worklist.insert((rank[other.0], other));
                    statuses[other.0] = BlockStatus::Pending;
                }
            }

            if let Some(history) = history.as_mut() {
                history.push((block, transfer.output.clone()));
            }
            in_facts[block.0] = Some(input);
            out_facts[block.0] = Some(transfer.output);
        }

        // An empty worklist means no input changed since each block's last
        // visit, so running any block again would reproduce its output
        for status in &mut statuses {
            if *status == BlockStatus::Changed {
                *status = BlockStatus::Stable;
            }
        }

        debug!(unit = cfg.name(), blocks = n, visits, rounds, "fixpoint reached");
        Ok(FixpointResult {
            in_facts,
            out_facts,
            edge_facts,
            visits,
            rounds,
            statuses,
            history,
            visit_statuses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataflow::builder::build_cfg;
    use crate::hir::{AnalysisUnit, BinOp, HirExpr, HirStmt};

    /// Collects the ids of every block on some path to the current point
    struct PathBlocks;

    impl DataflowAnalysis for PathBlocks {
        type Fact = BTreeSet<usize>;

        fn initial_fact(&self) -> Self::Fact {
            BTreeSet::new()
        }

        fn bottom(&self) -> Self::Fact {
            BTreeSet::new()
        }

        fn join(&self, a: &Self::Fact, b: &Self::Fact) -> Self::Fact {
            a.union(b).copied().collect()
        }

        fn transfer(&mut self, cfg: &Cfg, block: BlockId, input: &Self::Fact) -> AnalysisResult<BlockTransfer<Self::Fact>> {
            let mut output = input.clone();
            output.insert(block.0);
            Ok(BlockTransfer {
                edges: cfg.successors(block).into_iter().map(|s| (s, output.clone())).collect(),
                output,
                revisit: Vec::new(),
            })
        }
    }

    fn loop_cfg() -> Cfg {
        build_cfg(&AnalysisUnit::new(
            "count",
            vec![
                HirStmt::assign("i", HirExpr::int(0)),
                HirStmt::while_loop(
                    HirExpr::binary(BinOp::Lt, HirExpr::var("i"), HirExpr::int(10)),
                    vec![HirStmt::assign(
                        "i",
                        HirExpr::binary(BinOp::Add, HirExpr::var("i"), HirExpr::int(1)),
                    )],
                ),
            ],
        ))
        .unwrap()
    }

    #[test]
    fn test_loop_converges() {
        let cfg = loop_cfg();
        let result = FixpointSolver::new(100).solve(&mut PathBlocks, &cfg).unwrap();

        let exit_input = result.in_fact(cfg.exit()).unwrap();
        for block in cfg.reverse_postorder() {
            if block != cfg.exit() {
                assert!(exit_input.contains(&block.0), "{block} missing");
            }
        }
        assert!(result.visits > cfg.reverse_postorder().len());
        for block in cfg.reverse_postorder() {
            assert_eq!(result.status(block), BlockStatus::Stable);
        }
        assert_eq!(result.status(cfg.exceptional_exit()), BlockStatus::Unvisited);
        assert!(result.in_fact(cfg.exceptional_exit()).is_none());
    }

    #[test]
    fn test_history_is_monotone() {
        let cfg = loop_cfg();
        let result = FixpointSolver::new(100)
            .record_history(true)
            .solve(&mut PathBlocks, &cfg)
            .unwrap();

        let history = result.history.unwrap();
        assert_eq!(history.len(), result.visits);
        let mut last: HashMap<BlockId, BTreeSet<usize>> = HashMap::new();
        for (block, output) in history {
            if let Some(previous) = last.get(&block) {
                assert!(previous.is_subset(&output));
            }
            last.insert(block, output);
        }
    }

    #[test]
    fn test_stable_only_when_output_repeats() {
        let cfg = loop_cfg();
        let result = FixpointSolver::new(100)
            .record_history(true)
            .solve(&mut PathBlocks, &cfg)
            .unwrap();

        let history = result.history.clone().unwrap();
        let statuses = result.visit_statuses.clone().unwrap();
        assert_eq!(statuses.len(), history.len());

        let mut last: HashMap<BlockId, BTreeSet<usize>> = HashMap::new();
        for ((block, output), (visited, status)) in history.into_iter().zip(statuses) {
            assert_eq!(block, visited);
            let expected = if last.get(&block) == Some(&output) {
                BlockStatus::Stable
            } else {
                BlockStatus::Changed
            };
            assert_eq!(status, expected, "{block}");
            last.insert(block, output);
        }
        // The loop head is seen again after the first pass; its path set grew
        assert!(result.rounds >= 2);
        for block in cfg.reverse_postorder() {
            assert_eq!(result.status(block), BlockStatus::Stable);
        }
    }

    #[test]
    fn test_visit_limit() {
        let cfg = loop_cfg();
        let err = FixpointSolver::new(2).solve(&mut PathBlocks, &cfg).unwrap_err();
        assert_eq!(err, AnalysisError::VisitLimit { visits: 2 });
    }
}
