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

use colplan_common::{ColumnId, Datum, Directive, SargInterval, SargSequence, SecondaryIndex, StorageId, TableId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::facade::{ColumnStats, StatisticsFacade};

/// Per-column statistics gathered by an analyze pass. Range selectivity
/// assumes integer values uniformly spread over `[min, max]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub column: ColumnId,
    #[serde(default)]
    pub cardinality: Option<f64>,
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub max: Option<i64>,
}

impl ColumnProfile {
    pub fn new(column: ColumnId, cardinality: f64) -> Self {
        Self {
            column,
            cardinality: Some(cardinality),
            min: None,
            max: None,
        }
    }

    pub fn with_range(mut self, min: i64, max: i64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn selectivity(&self, sarg: &SargSequence) -> Option<f64> {
        if sarg.is_empty() {
            return Some(0.0);
        }
        if sarg.is_unconstrained() {
            return Some(1.0);
        }
        let mut total = 0.0;
        for interval in sarg.intervals() {
            total += self.interval_selectivity(interval)?;
        }
        Some(total.min(1.0))
    }

    pub fn cardinality_within(&self, sarg: &SargSequence) -> Option<f64> {
        let cardinality = self.cardinality?;
        if sarg.is_point() {
            return Some((sarg.intervals().len() as f64).min(cardinality));
        }
        let selectivity = self.selectivity(sarg)?;
        Some((cardinality * selectivity).max(1.0).min(cardinality))
    }

    fn interval_selectivity(&self, interval: &SargInterval) -> Option<f64> {
        if interval.is_point() {
            let cardinality = self.cardinality?;
            return Some(if cardinality > 0.0 { 1.0 / cardinality } else { 0.0 });
        }
        let (min, max) = (self.min?, self.max?);
        if max <= min {
            return Some(if interval.contains(&Datum::Int(min)) { 1.0 } else { 0.0 });
        }
        let lo = match (&interval.lower.directive, &interval.lower.value) {
            (Directive::Unbounded, _) | (_, None) | (_, Some(Datum::Null)) => min as f64,
            (_, Some(Datum::Int(v))) => (*v).clamp(min, max) as f64,
            _ => return None,
        };
        let hi = match (&interval.upper.directive, &interval.upper.value) {
            (Directive::Unbounded, _) | (_, None) => max as f64,
            (_, Some(Datum::Int(v))) => (*v).clamp(min, max) as f64,
            _ => return None,
        };
        Some(((hi - lo) / (max - min) as f64).clamp(0.0, 1.0))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub table: TableId,
    #[serde(default)]
    pub row_count: Option<f64>,
    #[serde(default)]
    pub deleted_row_count: Option<u64>,
    #[serde(default)]
    pub indexes: Vec<SecondaryIndex>,
    #[serde(default)]
    pub deletion_index: Option<SecondaryIndex>,
    #[serde(default)]
    pub columns: Vec<ColumnProfile>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCount {
    pub storage: StorageId,
    pub pages: u64,
}

/// Serializable form of everything a collector knows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    #[serde(default)]
    pub tables: Vec<TableSnapshot>,
    #[serde(default)]
    pub page_counts: Vec<PageCount>,
}

#[derive(Debug, Default)]
struct TableEntry {
    row_count: Option<f64>,
    deleted_row_count: Option<u64>,
    indexes: BTreeMap<StorageId, SecondaryIndex>,
    deletion_index: Option<SecondaryIndex>,
    columns: BTreeMap<ColumnId, ColumnProfile>,
}

#[derive(Debug, Default)]
struct CollectorState {
    tables: BTreeMap<TableId, TableEntry>,
    page_counts: BTreeMap<StorageId, u64>,
}

/// In-memory, thread-safe statistics store.
#[derive(Debug, Default)]
pub struct StatisticsCollector {
    state: RwLock<CollectorState>,
}

impl StatisticsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StatisticsSnapshot) -> Self {
        let collector = Self::new();
        for table in snapshot.tables {
            if let Some(rows) = table.row_count {
                collector.set_row_count(table.table, rows);
            }
            if let Some(deleted) = table.deleted_row_count {
                collector.set_deleted_row_count(table.table, deleted);
            }
            for index in table.indexes {
                collector.register_index(table.table, index);
            }
            if let Some(deletion) = table.deletion_index {
                collector.register_index(table.table, deletion);
            }
            for profile in table.columns {
                collector.analyze_column(table.table, profile);
            }
        }
        for page_count in snapshot.page_counts {
            collector.set_page_count(page_count.storage, page_count.pages);
        }
        collector
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        let state = self.state.read();
        StatisticsSnapshot {
            tables: state
                .tables
                .iter()
                .map(|(id, entry)| TableSnapshot {
                    table: *id,
                    row_count: entry.row_count,
                    deleted_row_count: entry.deleted_row_count,
                    indexes: entry.indexes.values().cloned().collect(),
                    deletion_index: entry.deletion_index.clone(),
                    columns: entry.columns.values().cloned().collect(),
                })
                .collect(),
            page_counts: state.page_counts.iter().map(|(storage, pages)| PageCount { storage: *storage, pages: *pages }).collect(),
        }
    }

    /// Registers an index; a deletion-kind index replaces the table's deletion index.
    pub fn register_index(&self, table: TableId, index: SecondaryIndex) {
        debug!("Registering index {} on table {}", index, table);
        let mut state = self.state.write();
        let entry = state.tables.entry(table).or_default();
        if index.is_deletion() {
            entry.deletion_index = Some(index);
        } else {
            entry.indexes.insert(index.id, index);
        }
    }

    pub fn set_page_count(&self, storage: StorageId, pages: u64) {
        self.state.write().page_counts.insert(storage, pages);
    }

    pub fn set_row_count(&self, table: TableId, rows: f64) {
        self.state.write().tables.entry(table).or_default().row_count = Some(rows);
    }

    pub fn set_deleted_row_count(&self, table: TableId, deleted: u64) {
        self.state.write().tables.entry(table).or_default().deleted_row_count = Some(deleted);
    }

    pub fn analyze_column(&self, table: TableId, profile: ColumnProfile) {
        let mut state = self.state.write();
        state.tables.entry(table).or_default().columns.insert(profile.column, profile);
    }
}

impl StatisticsFacade for StatisticsCollector {
    fn indexes(&self, table: TableId) -> Vec<SecondaryIndex> {
        let state = self.state.read();
        state.tables.get(&table).map(|t| t.indexes.values().cloned().collect()).unwrap_or_default()
    }

    fn deletion_index(&self, table: TableId) -> Option<SecondaryIndex> {
        self.state.read().tables.get(&table).and_then(|t| t.deletion_index.clone())
    }

    fn column_stats(&self, table: TableId, column: ColumnId, sarg: Option<&SargSequence>) -> Option<ColumnStats> {
        let state = self.state.read();
        let profile = state.tables.get(&table)?.columns.get(&column)?;
        Some(match sarg {
            None => ColumnStats {
                cardinality: profile.cardinality,
                selectivity: Some(1.0),
            },
            Some(sarg) => ColumnStats {
                cardinality: profile.cardinality_within(sarg),
                selectivity: profile.selectivity(sarg),
            },
        })
    }

    fn page_count(&self, storage: StorageId) -> Option<u64> {
        self.state.read().page_counts.get(&storage).copied()
    }

    fn row_count(&self, table: TableId) -> Option<f64> {
        self.state.read().tables.get(&table).and_then(|t| t.row_count)
    }

    fn deleted_row_count(&self, table: TableId) -> Option<u64> {
        self.state.read().tables.get(&table).and_then(|t| t.deleted_row_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colplan_common::Endpoint;

    fn range(lo: i64, hi: i64) -> SargSequence {
        SargSequence::interval(SargInterval::new(Endpoint::open(Datum::Int(lo)), Endpoint::open(Datum::Int(hi))))
    }

    #[test]
    fn test_point_selectivity() {
        let profile = ColumnProfile::new(ColumnId(0), 100.0);
        let sel = profile.selectivity(&SargSequence::points(vec![Datum::Int(1), Datum::Int(2)])).unwrap();
        assert!((sel - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_range_selectivity_uniform() {
        let profile = ColumnProfile::new(ColumnId(1), 1000.0).with_range(0, 100);
        let sel = profile.selectivity(&range(10, 20)).unwrap();
        assert!((sel - 0.1).abs() < 1e-12);
        assert_eq!(profile.cardinality_within(&range(10, 20)), Some(100.0));
    }

    #[test]
    fn test_range_without_bounds_is_unknown() {
        let profile = ColumnProfile::new(ColumnId(1), 1000.0);
        assert_eq!(profile.selectivity(&range(10, 20)), None);
    }

    #[test]
    fn test_missing_entries_are_none() {
        let collector = StatisticsCollector::new();
        assert_eq!(collector.row_count(TableId(1)), None);
        assert_eq!(collector.page_count(StorageId(1)), None);
        assert!(collector.column_stats(TableId(1), ColumnId(0), None).is_none());
        assert!(collector.indexes(TableId(1)).is_empty());
    }

    #[test]
    fn test_snapshot_round_trip() {
        let collector = StatisticsCollector::new();
        collector.set_row_count(TableId(1), 5000.0);
        collector.register_index(TableId(1), SecondaryIndex::unclustered(StorageId(7), "ia", vec![ColumnId(0)], false));
        collector.register_index(TableId(1), SecondaryIndex::deletion(StorageId(8), "del"));
        collector.set_page_count(StorageId(7), 12);
        collector.analyze_column(TableId(1), ColumnProfile::new(ColumnId(0), 50.0));

        let json = serde_json::to_string(&collector.snapshot()).unwrap();
        let restored = StatisticsCollector::from_snapshot(serde_json::from_str(&json).unwrap());
        assert_eq!(restored.snapshot(), collector.snapshot());
        assert_eq!(restored.deletion_index(TableId(1)).map(|i| i.id), Some(StorageId(8)));
        assert_eq!(restored.indexes(TableId(1)).len(), 1);
    }
}
