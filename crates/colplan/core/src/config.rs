// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Cost model constants. The defaults were tuned for a 32KB page column store
/// and are not expected to transfer unchanged to other storage backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    pub io_cost_per_block: f64,
    pub set_op_cost_per_block: f64,
    pub residual_eval_cost_per_million_rows: f64,
    pub sort_constant: f64,
    /// Discount applied to cardinalities and selectivities to model column correlation.
    pub correlation_factor: f64,
    pub bitmap_byte_length: u32,
    pub bitmap_segment_max_size: u32,
    pub page_size: u32,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            io_cost_per_block: 1.0,
            set_op_cost_per_block: 4.4,
            residual_eval_cost_per_million_rows: 82.0,
            sort_constant: 0.000032,
            correlation_factor: 0.5,
            bitmap_byte_length: 8,
            bitmap_segment_max_size: 512,
            page_size: 32768,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub cost: CostConfig,
    /// Tables with fewer rows than this skip index analysis entirely.
    pub small_table_row_count: f64,
    /// Entries a chopper lets through before the downstream merge must drain.
    pub chopper_row_limit: u64,
    /// Upper bound on search nodes visited by the cost-based selector.
    pub max_search_nodes: usize,
    /// Expected fraction of inserted rows violating a unique index.
    pub violation_ratio: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            cost: CostConfig::default(),
            small_table_row_count: 10.0,
            chopper_row_limit: 65536,
            max_search_nodes: 100_000,
            violation_ratio: 0.01,
        }
    }
}

impl PlannerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: PlannerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let cost = &self.cost;
        if !(cost.correlation_factor > 0.0 && cost.correlation_factor <= 1.0) {
            return Err(ConfigError::Invalid(format!("correlation_factor must be in (0, 1], got {}", cost.correlation_factor)));
        }
        if cost.page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be positive".to_string()));
        }
        if cost.bitmap_byte_length == 0 || cost.bitmap_segment_max_size == 0 {
            return Err(ConfigError::Invalid("bitmap sizing constants must be positive".to_string()));
        }
        for (name, value) in [
            ("io_cost_per_block", cost.io_cost_per_block),
            ("set_op_cost_per_block", cost.set_op_cost_per_block),
            ("residual_eval_cost_per_million_rows", cost.residual_eval_cost_per_million_rows),
            ("sort_constant", cost.sort_constant),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!("{name} must be a non-negative number, got {value}")));
            }
        }
        if self.chopper_row_limit == 0 {
            return Err(ConfigError::Invalid("chopper_row_limit must be positive".to_string()));
        }
        if self.max_search_nodes == 0 {
            return Err(ConfigError::Invalid("max_search_nodes must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.violation_ratio) {
            return Err(ConfigError::Invalid(format!("violation_ratio must be in [0, 1], got {}", self.violation_ratio)));
        }
        Ok(())
    }
}
