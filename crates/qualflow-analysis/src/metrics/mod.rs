//! Aggregate numbers for one batch run
//!
//! Collected after every unit has finished, so the driver's workers never
//! share mutable state.

use qualflow_core::{QualifiedUnit, UnitError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchMetrics {
    pub units: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub blocks: usize,
    pub nodes: usize,
    pub unreachable_blocks: usize,
    pub block_visits: usize,
    pub diagnostics: usize,
    pub elapsed: Duration,
    pub visit_distribution: VisitDistribution,
}

impl BatchMetrics {
    pub fn collect(outcomes: &[Result<QualifiedUnit, UnitError>], elapsed: Duration) -> Self {
        let mut metrics = Self {
            elapsed,
            ..Self::default()
        };
        for outcome in outcomes {
            metrics.record(outcome);
        }
        metrics
    }

    pub fn record(&mut self, outcome: &Result<QualifiedUnit, UnitError>) {
        self.units += 1;
        match outcome {
            Ok(unit) => {
                let cfg = unit.cfg();
                self.succeeded += 1;
                self.blocks += cfg.len();
                self.nodes += cfg.node_count();
                self.unreachable_blocks += cfg.unreachable_blocks().len();
                self.block_visits += unit.visits();
                self.diagnostics += unit.diagnostics().len();
                self.visit_distribution.add(unit.visits(), cfg.len());
            }
            Err(_) => self.failed += 1,
        }
    }

    /// Mean block visits per block over successful units.
    pub fn visits_per_block(&self) -> f64 {
        if self.blocks == 0 {
            return 0.0;
        }
        self.block_visits as f64 / self.blocks as f64
    }
}

/// Units bucketed by how many times the solver visited each block on average.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitDistribution {
    pub single_pass: usize, // visits <= blocks
    pub few: usize,         // <= 2 visits per block
    pub many: usize,        // <= 4 visits per block
    pub excessive: usize,   // more
}

impl VisitDistribution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, visits: usize, blocks: usize) {
        let blocks = blocks.max(1);
        match visits {
            v if v <= blocks => self.single_pass += 1,
            v if v <= 2 * blocks => self.few += 1,
            v if v <= 4 * blocks => self.many += 1,
            _ => self.excessive += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.single_pass + self.few + self.many + self.excessive
    }
}
