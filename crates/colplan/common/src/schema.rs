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
use std::collections::BTreeSet;
use thiserror::Error;

use crate::ids::{ColumnId, StorageId, TableId};
use crate::index::SecondaryIndex;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Table {0} has no clustered groups")]
    NoClusteredGroups(String),
    #[error("Column {column} of table {table} is not at ordinal position {column}")]
    OrdinalMismatch { table: String, column: ColumnId },
    #[error("Clustered group {group} references unknown column {column}")]
    UnknownGroupColumn { group: StorageId, column: ColumnId },
    #[error("Column {column} is stored in {count} clustered groups")]
    ColumnPlacement { column: ColumnId, count: usize },
    #[error("Index {index} references column {column} that is not on table {table}")]
    UnknownIndexColumn { index: String, column: ColumnId, table: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Boolean,
    Integer,
    Varchar(u32),
    /// Decomposed column stored as `width` flattened sub-columns.
    Multi(u32),
}

impl ColumnType {
    pub fn flattened_width(&self) -> usize {
        match self {
            ColumnType::Multi(width) => *width as usize,
            _ => 1,
        }
    }

    pub fn is_multi_valued(&self) -> bool {
        matches!(self, ColumnType::Multi(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: ColumnId,
    pub name: String,
    pub ty: ColumnType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

/// Columns physically co-stored in one clustered column group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusteredGroup {
    pub id: StorageId,
    pub name: String,
    pub columns: Vec<ColumnId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub id: TableId,
    pub name: String,
    pub columns: Vec<Column>,
    pub groups: Vec<ClusteredGroup>,
}

impl TableSchema {
    pub fn column(&self, id: ColumnId) -> Option<&Column> {
        self.columns.get(id.index()).filter(|c| c.id == id)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_ids(&self) -> Vec<ColumnId> {
        self.columns.iter().map(|c| c.id).collect()
    }

    pub fn group_of(&self, column: ColumnId) -> Option<&ClusteredGroup> {
        self.groups.iter().find(|g| g.columns.contains(&column))
    }

    /// Checks the structural invariants the planner relies on: ordinals match
    /// positions, at least one clustered group exists and every column lives in
    /// exactly one group.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.groups.is_empty() {
            return Err(SchemaError::NoClusteredGroups(self.name.clone()));
        }
        for (pos, column) in self.columns.iter().enumerate() {
            if column.id.index() != pos {
                return Err(SchemaError::OrdinalMismatch {
                    table: self.name.clone(),
                    column: column.id,
                });
            }
        }
        for group in &self.groups {
            if let Some(unknown) = group.columns.iter().find(|c| self.column(**c).is_none()) {
                return Err(SchemaError::UnknownGroupColumn {
                    group: group.id,
                    column: *unknown,
                });
            }
        }
        for column in &self.columns {
            let count = self.groups.iter().filter(|g| g.columns.contains(&column.id)).count();
            if count != 1 {
                return Err(SchemaError::ColumnPlacement { column: column.id, count });
            }
        }
        Ok(())
    }

    /// Verifies every key column of `index` exists on this table.
    pub fn check_index(&self, index: &SecondaryIndex) -> Result<(), SchemaError> {
        match index.key_columns.iter().find(|c| self.column(**c).is_none()) {
            Some(column) => Err(SchemaError::UnknownIndexColumn {
                index: index.name.clone(),
                column: *column,
                table: self.name.clone(),
            }),
            None => Ok(()),
        }
    }

    /// The clustered groups that must be read to rebuild the keys of `index`,
    /// in group order.
    pub fn coverage_groups(&self, index: &SecondaryIndex) -> Result<Vec<&ClusteredGroup>, SchemaError> {
        self.check_index(index)?;
        let required: BTreeSet<ColumnId> = index.key_columns.iter().copied().collect();
        Ok(self.groups.iter().filter(|g| g.columns.iter().any(|c| required.contains(c))).collect())
    }
}
