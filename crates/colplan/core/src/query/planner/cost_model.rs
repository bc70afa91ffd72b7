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

use colplan_common::{ColumnFilter, FilterLists, SecondaryIndex, TableId, TableSchema};
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::assignment::Assignment;
use crate::config::CostConfig;
use crate::statistics::StatisticsFacade;

/// Table-level figures every candidate cost depends on, gathered once per
/// planning attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCostStats {
    pub row_count: f64,
    /// Pages across all clustered groups.
    pub table_blocks: f64,
    pub column_count: usize,
    pub avg_column_length: f64,
    /// Pages one bitmap over the whole table occupies.
    pub bitmap_blocks: f64,
    /// Bitmap entries in one full-table bitmap.
    pub bitmap_rows: f64,
    pub deletion_scan_cost: f64,
}

impl TableCostStats {
    /// Returns `None` if any base statistic is missing.
    pub fn gather(facade: &dyn StatisticsFacade, schema: &TableSchema, config: &CostConfig) -> Option<Self> {
        let row_count = facade.row_count(schema.id)?;
        let mut table_blocks = 0.0;
        for group in &schema.groups {
            table_blocks += facade.page_count(group.id)? as f64;
        }
        let deletion_scan_cost = match facade.deletion_index(schema.id) {
            Some(deletion) => config.io_cost_per_block * facade.page_count(deletion.id)? as f64,
            None => 0.0,
        };

        let page_size = config.page_size as f64;
        let byte_length = config.bitmap_byte_length as f64;
        let column_count = schema.column_count().max(1);
        let avg_column_length = if row_count > 0.0 {
            table_blocks * page_size / (column_count as f64 * row_count)
        } else {
            0.0
        };

        Some(Self {
            row_count,
            table_blocks,
            column_count,
            avg_column_length,
            bitmap_blocks: row_count / (page_size * byte_length),
            bitmap_rows: row_count / (byte_length * config.bitmap_segment_max_size as f64),
            deletion_scan_cost,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub index: f64,
    pub residual: f64,
    pub total: f64,
}

/// Costs candidate index assignments for one table scan. Every estimate is
/// `None` when a statistic it needs is unavailable.
pub struct CostModel<'a> {
    facade: &'a dyn StatisticsFacade,
    table: TableId,
    config: &'a CostConfig,
    stats: TableCostStats,
}

impl<'a> CostModel<'a> {
    pub fn new(facade: &'a dyn StatisticsFacade, schema: &TableSchema, config: &'a CostConfig) -> Option<Self> {
        let stats = TableCostStats::gather(facade, schema, config)?;
        Some(Self {
            facade,
            table: schema.id,
            config,
            stats,
        })
    }

    pub fn stats(&self) -> &TableCostStats {
        &self.stats
    }

    /// Number of distinct-key bitmaps read when `index` is searched on its
    /// first `matched_len` key columns. `last` is the filter on the last
    /// matched column.
    pub fn bitmap_count(&self, index: &SecondaryIndex, matched_len: usize, last: Option<&ColumnFilter>) -> Option<f64> {
        let mut count = match last {
            Some(filter) if matched_len > 0 && !filter.is_point() => self
                .facade
                .column_stats(self.table, filter.column, Some(&filter.sarg))
                .and_then(|s| s.cardinality)
                .unwrap_or(1.0),
            _ => 1.0,
        };

        let corr = self.config.correlation_factor;
        for column in index.key_columns.iter().skip(matched_len) {
            let cardinality = self.facade.column_stats(self.table, *column, None)?.cardinality?;
            count *= if cardinality < 1.0 / corr { 1.0 } else { cardinality * corr };
        }
        Some(count)
    }

    pub fn bitmap_scan_cost(&self, index: &SecondaryIndex, scanned: f64) -> Option<f64> {
        let cost = self.config.io_cost_per_block * self.facade.page_count(index.id)? as f64;
        match self.bitmap_count(index, 0, None) {
            Some(total) if total > 0.0 => Some(cost * scanned / total),
            _ => Some(cost),
        }
    }

    pub fn bit_op_cost(&self, inputs: f64) -> f64 {
        self.config.set_op_cost_per_block * inputs * self.stats.bitmap_blocks
    }

    pub fn sort_cost(&self, scanned: f64) -> f64 {
        if self.stats.row_count <= 1.0 {
            return 0.0;
        }
        let entries = scanned * self.stats.bitmap_rows;
        if entries <= 1.0 {
            return 0.0;
        }
        self.config.sort_constant * entries * entries.ln()
    }

    /// Scan, merge and sort each used index, then scan the deletion index and
    /// intersect the per-index bitmaps.
    pub fn index_search_cost(&self, used: &[(&SecondaryIndex, usize, Option<&ColumnFilter>)]) -> Option<f64> {
        let mut cost = 0.0;
        for (index, matched_len, last) in used {
            let scanned = self.bitmap_count(index, *matched_len, *last)?;
            let scan = self.bitmap_scan_cost(index, scanned)?;
            let merge = self.bit_op_cost(scanned.floor());
            let sort = self.sort_cost(scanned);
            cost += scan + merge + sort;
        }
        cost += self.stats.deletion_scan_cost;
        cost += self.bit_op_cost(used.len() as f64);
        Some(cost)
    }

    pub fn filter_selectivity(&self, filter: &ColumnFilter) -> Option<f64> {
        filter
            .selectivity
            .or_else(|| self.facade.column_stats(self.table, filter.column, Some(&filter.sarg)).and_then(|s| s.selectivity))
    }

    /// Filters less selective than the correlation factor are assumed to add
    /// nothing; the rest are discounted by it.
    pub fn combined_selectivity<'f>(&self, filters: impl IntoIterator<Item = &'f ColumnFilter>) -> Option<f64> {
        let corr = self.config.correlation_factor;
        let mut combined = 1.0;
        for filter in filters {
            let selectivity = self.filter_selectivity(filter)?;
            if selectivity <= corr {
                combined *= selectivity / corr;
            }
        }
        Some(combined)
    }

    pub fn residual_scan_cost(&self, index_filters: &[&ColumnFilter], residual_filters: &[&ColumnFilter]) -> Option<f64> {
        let index_selectivity = self.combined_selectivity(index_filters.iter().copied())?;
        let rows = self.stats.row_count * index_selectivity;
        if rows < 1.0 {
            return Some(0.0);
        }
        let s = self.combined_selectivity(residual_filters.iter().copied())?;
        let r = residual_filters.len() as f64;
        let n = self.stats.column_count as f64 - r;

        let scan = self.config.io_cost_per_block
            * rows
            * self.stats.avg_column_length
            * ((((r + 1.0) * (1.0 + s) / 2.0) + ((n - 1.0) * s)) / self.config.page_size as f64);
        let eval = (self.config.residual_eval_cost_per_million_rows / 1_000_000.0) * rows * r * (1.0 + s) / 2.0;
        Some(scan + eval)
    }

    pub fn semi_join_scan_cost(&self, selectivity: f64) -> f64 {
        self.config.io_cost_per_block * self.stats.table_blocks * selectivity
    }

    /// Total cost of answering `filters` with `assignment`: index access plus
    /// a residual scan for the filters no index absorbs.
    pub fn assignment_cost(&self, assignment: &Assignment, indexes: &[SecondaryIndex], filters: &FilterLists) -> Option<CostBreakdown> {
        let mut index_cost = 0.0;
        if !assignment.is_empty() {
            let mut used = Vec::new();
            for (id, matched_len) in assignment.matched() {
                let index = indexes.iter().find(|i| i.id == id)?;
                let last = index.key_column(matched_len.checked_sub(1)?).and_then(|c| filters.get(c));
                used.push((index, matched_len, last));
            }
            index_cost = self.index_search_cost(&used)?;
        }

        let (absorbed, residual): (Vec<&ColumnFilter>, Vec<&ColumnFilter>) = filters.all().partition(|f| assignment.index_for(f.column).is_some());
        let residual_cost = self.residual_scan_cost(&absorbed, &residual)?;

        let total = index_cost + residual_cost;
        trace!("Assignment {} costs {} (index {}, residual {})", assignment, total, index_cost, residual_cost);
        Some(CostBreakdown {
            index: index_cost,
            residual: residual_cost,
            total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::{ColumnProfile, StatisticsCollector};
    use colplan_common::{ClusteredGroup, Column, ColumnId, ColumnType, Datum, SargSequence, StorageId};

    fn schema() -> TableSchema {
        TableSchema {
            id: TableId(1),
            name: "t".into(),
            columns: (0..4)
                .map(|i| Column {
                    id: ColumnId(i),
                    name: format!("c{i}"),
                    ty: ColumnType::Integer,
                    nullable: true,
                })
                .collect(),
            groups: vec![ClusteredGroup {
                id: StorageId(1),
                name: "g".into(),
                columns: (0..4).map(ColumnId).collect(),
            }],
        }
    }

    fn collector() -> StatisticsCollector {
        let stats = StatisticsCollector::new();
        stats.set_row_count(TableId(1), 1_000_000.0);
        stats.set_page_count(StorageId(1), 4000);
        stats.register_index(TableId(1), SecondaryIndex::deletion(StorageId(2), "del"));
        stats.set_page_count(StorageId(2), 3);
        stats.analyze_column(TableId(1), ColumnProfile::new(ColumnId(0), 1000.0));
        stats.analyze_column(TableId(1), ColumnProfile::new(ColumnId(1), 1.5));
        stats
    }

    #[test]
    fn test_table_stats_derivation() {
        let stats = collector();
        let config = CostConfig::default();
        let derived = TableCostStats::gather(&stats, &schema(), &config).unwrap();
        assert_eq!(derived.table_blocks, 4000.0);
        assert_eq!(derived.deletion_scan_cost, 3.0);
        assert!((derived.avg_column_length - 4000.0 * 32768.0 / 4_000_000.0).abs() < 1e-9);
        assert!((derived.bitmap_blocks - 1_000_000.0 / (32768.0 * 8.0)).abs() < 1e-9);
        assert!((derived.bitmap_rows - 1_000_000.0 / 4096.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_row_count_is_uncostable() {
        let stats = StatisticsCollector::new();
        assert!(CostModel::new(&stats, &schema(), &CostConfig::default()).is_none());
    }

    #[test]
    fn test_bitmap_count_discounts_trailing_columns() {
        let stats = collector();
        let config = CostConfig::default();
        let model = CostModel::new(&stats, &schema(), &config).unwrap();
        let index = SecondaryIndex::unclustered(StorageId(5), "i01", vec![ColumnId(0), ColumnId(1)], false);

        // CND(c1) = 1.5 < 1 / 0.5, so it contributes nothing.
        assert_eq!(model.bitmap_count(&index, 1, None), Some(1.0));
        assert_eq!(model.bitmap_count(&index, 0, None), Some(500.0));

        let unknown = SecondaryIndex::unclustered(StorageId(6), "i2", vec![ColumnId(2)], false);
        assert_eq!(model.bitmap_count(&unknown, 0, None), None);
    }

    #[test]
    fn test_combined_selectivity_with_correlation() {
        let stats = collector();
        let config = CostConfig::default();
        let model = CostModel::new(&stats, &schema(), &config).unwrap();
        let selective = ColumnFilter::new(ColumnId(0), SargSequence::point(Datum::Int(1))).with_selectivity(0.1);
        let weak = ColumnFilter::new(ColumnId(1), SargSequence::point(Datum::Int(1))).with_selectivity(0.9);
        let combined = model.combined_selectivity([&selective, &weak]).unwrap();
        assert!((combined - 0.2).abs() < 1e-12);

        let unknown = ColumnFilter::new(ColumnId(3), SargSequence::point(Datum::Int(1)));
        assert_eq!(model.combined_selectivity([&unknown]), None);
    }

    #[test]
    fn test_sort_cost_guard() {
        let stats = collector();
        let config = CostConfig::default();
        let model = CostModel::new(&stats, &schema(), &config).unwrap();
        assert_eq!(model.sort_cost(0.0), 0.0);
        assert!(model.sort_cost(10.0) > 0.0);
    }

    #[test]
    fn test_residual_cost_zero_when_index_filters_everything() {
        let stats = collector();
        let config = CostConfig::default();
        let model = CostModel::new(&stats, &schema(), &config).unwrap();
        let tiny = ColumnFilter::new(ColumnId(0), SargSequence::point(Datum::Int(1))).with_selectivity(1e-9);
        assert_eq!(model.residual_scan_cost(&[&tiny], &[]), Some(0.0));
    }
}
