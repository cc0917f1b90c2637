//! Solver and reporting settings for one analysis run

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Block visits before a unit is abandoned. `None` derives a bound from
    /// the unit's size and the hierarchy's height.
    pub max_block_visits: Option<usize>,
    /// Keep every block output in visit order
    pub record_history: bool,
    /// Report diagnostics for nodes no execution reaches
    pub check_unreachable: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_block_visits: None,
            record_history: false,
            check_unreachable: false,
        }
    }
}

impl AnalysisConfig {
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        serde_json::from_str(json).map_err(ConfigError::malformed)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Malformed(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&content)
    }

    /// Visit limit for a unit with the given shape.
    pub fn visit_limit(&self, blocks: usize, nodes: usize, height: usize) -> usize {
        self.max_block_visits
            .unwrap_or_else(|| blocks.saturating_mul(height + 1).saturating_mul(nodes + 2))
    }
}
