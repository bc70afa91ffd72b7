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

pub mod explain;
pub mod pipeline;

use anyhow::{Context, Result};
use colplan_core::PlannerConfig;
use colplan_core::graph::Row;
use std::path::Path;

pub struct CommandContext {
    pub config: PlannerConfig,
}

impl CommandContext {
    pub fn new(config: Option<&Path>) -> Result<Self> {
        let config = match config {
            Some(path) => PlannerConfig::from_file(path).with_context(|| format!("loading planner config {}", path.display()))?,
            None => PlannerConfig::default(),
        };
        Ok(Self { config })
    }
}

pub(crate) fn print_rows(rows: &[Row]) {
    for row in rows {
        let values: Vec<String> = row.values.iter().map(|v| v.to_string()).collect();
        match row.rid {
            Some(rid) => println!("  {rid}: ({})", values.join(", ")),
            None => println!("  ({})", values.join(", ")),
        }
    }
    println!("{} rows", rows.len());
}
