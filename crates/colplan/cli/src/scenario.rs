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

use anyhow::{Context, Result, bail};
use colplan_common::{Datum, Rid, SecondaryIndex, TableSchema};
use colplan_core::graph::Row;
use colplan_core::predicate::FilterExpr;
use colplan_core::reference::MemoryTable;
use colplan_core::{Projected, StatisticsCollector, StatisticsSnapshot};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// A table, its statistics or sample data, and the statement to plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub schema: TableSchema,
    /// Secondary indexes of the sample table. Ignored when `statistics` is given.
    #[serde(default)]
    pub indexes: Vec<SecondaryIndex>,
    #[serde(default)]
    pub deletion_index: Option<SecondaryIndex>,
    #[serde(default)]
    pub statistics: Option<StatisticsSnapshot>,
    #[serde(default)]
    pub filter: Option<FilterExpr>,
    /// Defaults to every column.
    #[serde(default)]
    pub projection: Option<Vec<Projected>>,
    #[serde(default)]
    pub rows: Vec<Vec<Datum>>,
    #[serde(default)]
    pub deleted: Vec<Rid>,
    /// Rows fed to an insert, delete or upsert pipeline.
    #[serde(default)]
    pub input: Vec<Row>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading scenario {}", path.display()))?;
        let scenario: Scenario = serde_json::from_str(&text).with_context(|| format!("parsing scenario {}", path.display()))?;
        scenario.schema.validate().context("invalid table schema")?;
        Ok(scenario)
    }

    pub fn projection(&self) -> Vec<Projected> {
        match &self.projection {
            Some(projection) => projection.clone(),
            None => self.schema.column_ids().into_iter().map(Projected::Column).collect(),
        }
    }

    /// Loads the sample rows into a fresh in-memory table.
    pub fn table(&self) -> Result<MemoryTable> {
        let Some(deletion) = self.deletion_index.clone() else {
            bail!("scenario has no deletion_index; sample data cannot be loaded");
        };
        let mut table = MemoryTable::new(self.schema.clone(), deletion);
        for index in &self.indexes {
            table.add_index(index.clone()).with_context(|| format!("adding index {}", index.name))?;
        }
        for (pos, row) in self.rows.iter().enumerate() {
            table.load(row.clone()).with_context(|| format!("loading row {pos}"))?;
        }
        for rid in &self.deleted {
            table.delete(*rid);
        }
        Ok(table)
    }

    /// Statistics from the snapshot when present, otherwise gathered from the
    /// sample table.
    pub fn statistics(&self) -> Result<StatisticsCollector> {
        if let Some(snapshot) = &self.statistics {
            debug!("Using statistics snapshot with {} tables", snapshot.tables.len());
            return Ok(StatisticsCollector::from_snapshot(snapshot.clone()));
        }
        let stats = StatisticsCollector::new();
        self.table()?.analyze(&stats);
        Ok(stats)
    }
}
