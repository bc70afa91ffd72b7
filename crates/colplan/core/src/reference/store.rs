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

use colplan_common::{ColumnId, Datum, Rid, SecondaryIndex, StorageId, TableSchema};
use parking_lot::RwLock;
use roaring::RoaringTreemap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

use super::{EvalError, EvalResult};
use crate::statistics::{ColumnProfile, StatisticsCollector};

const ROWS_PER_PAGE: u64 = 128;
const ENTRIES_PER_PAGE: u64 = 512;

/// Shared tombstone bitmap of one table. Clones refer to the same bitmap;
/// callers bracket their reads and writes with their own statement
/// boundaries.
#[derive(Debug, Clone, Default)]
pub struct DeletionIndexHandle {
    deleted: Arc<RwLock<RoaringTreemap>>,
}

impl DeletionIndexHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, rid: Rid) -> bool {
        self.deleted.read().contains(rid.0)
    }

    /// Returns false if the RID was already deleted.
    pub fn insert(&self, rid: Rid) -> bool {
        self.deleted.write().insert(rid.0)
    }

    pub fn len(&self) -> u64 {
        self.deleted.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.deleted.read().is_empty()
    }

    pub fn snapshot(&self) -> RoaringTreemap {
        self.deleted.read().clone()
    }
}

#[derive(Debug, Clone)]
struct IndexData {
    index: SecondaryIndex,
    entries: BTreeMap<Vec<Datum>, RoaringTreemap>,
}

impl IndexData {
    fn key_of(&self, values: &[Datum]) -> Vec<Datum> {
        self.index.key_columns.iter().map(|c| values[c.index()].clone()).collect()
    }
}

/// Row-oriented stand-in for a column-store table. Rows are keyed by RID and
/// never removed; deletion only marks them in the deletion index.
#[derive(Debug)]
pub struct MemoryTable {
    schema: TableSchema,
    rows: BTreeMap<Rid, Vec<Datum>>,
    indexes: Vec<IndexData>,
    deletion_index: SecondaryIndex,
    deleted: DeletionIndexHandle,
    next_rid: Rid,
}

impl MemoryTable {
    pub fn new(schema: TableSchema, deletion_index: SecondaryIndex) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
            indexes: Vec::new(),
            deletion_index,
            deleted: DeletionIndexHandle::new(),
            next_rid: Rid(0),
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn deletion_index(&self) -> &SecondaryIndex {
        &self.deletion_index
    }

    pub fn deletion_handle(&self) -> DeletionIndexHandle {
        self.deleted.clone()
    }

    pub fn indexes(&self) -> Vec<SecondaryIndex> {
        self.indexes.iter().map(|d| d.index.clone()).collect()
    }

    pub fn index(&self, id: StorageId) -> Option<&SecondaryIndex> {
        self.indexes.iter().map(|d| &d.index).find(|i| i.id == id)
    }

    /// Adds a secondary index and builds it from the rows already stored.
    pub fn add_index(&mut self, index: SecondaryIndex) -> EvalResult<()> {
        if let Some(column) = index.key_columns.iter().find(|c| self.schema.column(**c).is_none()) {
            return Err(EvalError::UnknownColumn(*column));
        }
        let mut data = IndexData {
            index,
            entries: BTreeMap::new(),
        };
        for (rid, values) in &self.rows {
            let key = data.key_of(values);
            data.entries.entry(key).or_default().insert(rid.0);
        }
        self.indexes.push(data);
        self.indexes.sort_by_key(|d| d.index.id);
        Ok(())
    }

    fn check_width(&self, values: &[Datum]) -> EvalResult<()> {
        let expected = self.schema.column_count();
        if values.len() != expected {
            return Err(EvalError::RowWidth {
                expected,
                actual: values.len(),
            });
        }
        Ok(())
    }

    /// Stores a row under the next RID without touching the indexes.
    pub(crate) fn append(&mut self, values: Vec<Datum>) -> EvalResult<Rid> {
        self.check_width(&values)?;
        let rid = self.next_rid;
        self.next_rid = rid.next();
        self.rows.insert(rid, values);
        Ok(rid)
    }

    /// Loads a row and indexes it, bypassing any pipeline.
    pub fn load(&mut self, values: Vec<Datum>) -> EvalResult<Rid> {
        let rid = self.append(values)?;
        let values = &self.rows[&rid];
        for data in &mut self.indexes {
            let key = data.key_of(values);
            data.entries.entry(key).or_default().insert(rid.0);
        }
        Ok(rid)
    }

    pub fn delete(&self, rid: Rid) -> bool {
        self.deleted.insert(rid)
    }

    pub fn is_deleted(&self, rid: Rid) -> bool {
        self.deleted.contains(rid)
    }

    pub fn row(&self, rid: Rid) -> Option<&[Datum]> {
        self.rows.get(&rid).map(Vec::as_slice)
    }

    /// Every stored row, deleted or not, in RID order.
    pub fn rows(&self) -> impl Iterator<Item = (Rid, &[Datum])> {
        self.rows.iter().map(|(rid, values)| (*rid, values.as_slice()))
    }

    pub fn stored_row_count(&self) -> u64 {
        self.rows.len() as u64
    }

    pub fn live_row_count(&self) -> u64 {
        self.rows.keys().filter(|rid| !self.deleted.contains(**rid)).count() as u64
    }

    pub fn deleted_count(&self) -> u64 {
        self.deleted.len()
    }

    pub(crate) fn index_entries(&self, id: StorageId) -> EvalResult<&BTreeMap<Vec<Datum>, RoaringTreemap>> {
        self.indexes
            .iter()
            .find(|d| d.index.id == id)
            .map(|d| &d.entries)
            .ok_or(EvalError::UnknownStorage(id))
    }

    /// Adds `rid` under `key`. For a unique index a key already held by a
    /// live row, with no NULL component, is refused and false returned.
    pub(crate) fn splice(&mut self, id: StorageId, key: Vec<Datum>, rid: Rid) -> EvalResult<bool> {
        let deleted = self.deleted.snapshot();
        let data = self.indexes.iter_mut().find(|d| d.index.id == id).ok_or(EvalError::UnknownStorage(id))?;
        if data.index.unique
            && !key.iter().any(Datum::is_null)
            && let Some(existing) = data.entries.get(&key)
            && existing.iter().any(|r| r != rid.0 && !deleted.contains(r))
        {
            return Ok(false);
        }
        data.entries.entry(key).or_default().insert(rid.0);
        Ok(true)
    }

    /// Publishes row, page and column statistics for this table.
    pub fn analyze(&self, stats: &StatisticsCollector) {
        let table = self.schema.id;
        let live: Vec<&Vec<Datum>> = self.rows.iter().filter(|(rid, _)| !self.deleted.contains(**rid)).map(|(_, v)| v).collect();

        stats.set_row_count(table, live.len() as f64);
        stats.set_deleted_row_count(table, self.deleted.len());
        stats.register_index(table, self.deletion_index.clone());
        stats.set_page_count(self.deletion_index.id, 1 + self.deleted.len() / (ENTRIES_PER_PAGE * 64));

        let stored = self.rows.len() as u64;
        for group in &self.schema.groups {
            stats.set_page_count(group.id, (stored * group.columns.len() as u64).div_ceil(ROWS_PER_PAGE).max(1));
        }
        for data in &self.indexes {
            stats.register_index(table, data.index.clone());
            stats.set_page_count(data.index.id, (data.entries.len() as u64).div_ceil(ENTRIES_PER_PAGE).max(1));
        }

        for column in &self.schema.columns {
            let pos = column.id.index();
            let distinct: BTreeSet<&Datum> = live.iter().map(|v| &v[pos]).collect();
            let ints: Vec<i64> = distinct.iter().filter_map(|d| d.as_int()).collect();
            let mut profile = ColumnProfile::new(column.id, distinct.len().max(1) as f64);
            if let (Some(min), Some(max)) = (ints.iter().min(), ints.iter().max()) {
                profile = profile.with_range(*min, *max);
            }
            stats.analyze_column(table, profile);
        }
        debug!("Analyzed table {}: {} live rows, {} deleted", self.schema.name, live.len(), self.deleted.len());
    }

    pub fn column_value(&self, rid: Rid, column: ColumnId) -> EvalResult<Option<&Datum>> {
        if self.schema.column(column).is_none() {
            return Err(EvalError::UnknownColumn(column));
        }
        Ok(self.rows.get(&rid).map(|values| &values[column.index()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::StatisticsFacade;
    use colplan_common::{ClusteredGroup, Column, ColumnType, TableId};

    fn table() -> MemoryTable {
        let schema = TableSchema {
            id: TableId(1),
            name: "t".into(),
            columns: (0..2)
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
                columns: vec![ColumnId(0), ColumnId(1)],
            }],
        };
        MemoryTable::new(schema, SecondaryIndex::deletion(StorageId(9), "del"))
    }

    #[test]
    fn test_unique_splice_ignores_deleted_rows() {
        let mut table = table();
        table
            .add_index(SecondaryIndex::unclustered(StorageId(5), "u0", vec![ColumnId(0)], true))
            .unwrap();
        let first = table.load(vec![Datum::Int(1), Datum::Int(10)]).unwrap();
        let second = table.append(vec![Datum::Int(1), Datum::Int(20)]).unwrap();

        assert!(!table.splice(StorageId(5), vec![Datum::Int(1)], second).unwrap());
        table.delete(first);
        assert!(table.splice(StorageId(5), vec![Datum::Int(1)], second).unwrap());
    }

    #[test]
    fn test_null_keys_never_conflict() {
        let mut table = table();
        table
            .add_index(SecondaryIndex::unclustered(StorageId(5), "u0", vec![ColumnId(0)], true))
            .unwrap();
        table.load(vec![Datum::Null, Datum::Int(1)]).unwrap();
        let rid = table.append(vec![Datum::Null, Datum::Int(2)]).unwrap();
        assert!(table.splice(StorageId(5), vec![Datum::Null], rid).unwrap());
    }

    #[test]
    fn test_deletion_handle_is_shared() {
        let table = table();
        let handle = table.deletion_handle();
        assert!(handle.insert(Rid(3)));
        assert!(!table.delete(Rid(3)));
        assert_eq!(table.deleted_count(), 1);
    }

    #[test]
    fn test_analyze_publishes_statistics() {
        let mut table = table();
        for i in 0..10 {
            table.load(vec![Datum::Int(i % 4), Datum::Int(i)]).unwrap();
        }
        table.delete(Rid(0));
        let stats = StatisticsCollector::new();
        table.analyze(&stats);

        assert_eq!(stats.row_count(TableId(1)), Some(9.0));
        assert_eq!(stats.deleted_row_count(TableId(1)), Some(1));
        assert_eq!(stats.column_stats(TableId(1), ColumnId(0), None).and_then(|s| s.cardinality), Some(4.0));
        assert_eq!(stats.deletion_index(TableId(1)).map(|i| i.id), Some(StorageId(9)));
    }

    #[test]
    fn test_row_width_checked() {
        let mut table = table();
        assert_eq!(table.load(vec![Datum::Int(1)]), Err(EvalError::RowWidth { expected: 2, actual: 1 }));
    }
}
