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

use colplan_common::{ColumnId, SargSequence, SecondaryIndex, StorageId, TableId};
use serde::{Deserialize, Serialize};

/// Column statistics, optionally restricted to the values admitted by a sarg.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ColumnStats {
    /// Number of distinct values (within the sarg when one was given).
    pub cardinality: Option<f64>,
    /// Fraction of rows admitted by the sarg, 1.0 when no sarg was given.
    pub selectivity: Option<f64>,
}

/// Read-only view of catalog metadata and statistics for one planning attempt.
///
/// Every lookup may come back empty. Missing statistics make a candidate
/// uncostable; they never abort planning.
#[cfg_attr(test, mockall::automock)]
pub trait StatisticsFacade: Send + Sync {
    /// Unclustered indexes on `table`, excluding the deletion index.
    fn indexes(&self, table: TableId) -> Vec<SecondaryIndex>;

    fn deletion_index(&self, table: TableId) -> Option<SecondaryIndex>;

    fn column_stats<'a>(&self, table: TableId, column: ColumnId, sarg: Option<&'a SargSequence>) -> Option<ColumnStats>;

    /// Pages used by a clustered group or index.
    fn page_count(&self, storage: StorageId) -> Option<u64>;

    fn row_count(&self, table: TableId) -> Option<f64>;

    /// Tombstoned rows currently recorded in the deletion index. `Some(0)`
    /// proves a scan has nothing to subtract.
    fn deleted_row_count(&self, _table: TableId) -> Option<u64> {
        None
    }
}
