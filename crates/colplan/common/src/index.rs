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
use std::fmt;

use crate::ids::{ColumnId, StorageId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    Unclustered,
    /// Zero-key bitmap index marking tombstoned rows. One per table.
    Deletion,
}

/// One field of a bitmap index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayloadField {
    Key(ColumnId),
    StartRid,
    BitmapDescriptor,
    BitmapSegment,
}

impl fmt::Display for PayloadField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadField::Key(c) => write!(f, "{c}"),
            PayloadField::StartRid => write!(f, "srid"),
            PayloadField::BitmapDescriptor => write!(f, "segdesc"),
            PayloadField::BitmapSegment => write!(f, "seg"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecondaryIndex {
    pub id: StorageId,
    pub name: String,
    pub key_columns: Vec<ColumnId>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default = "default_kind")]
    pub kind: IndexKind,
}

fn default_kind() -> IndexKind {
    IndexKind::Unclustered
}

impl SecondaryIndex {
    pub fn unclustered(id: StorageId, name: &str, key_columns: Vec<ColumnId>, unique: bool) -> Self {
        Self {
            id,
            name: name.to_string(),
            key_columns,
            unique,
            kind: IndexKind::Unclustered,
        }
    }

    pub fn deletion(id: StorageId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            key_columns: Vec::new(),
            unique: false,
            kind: IndexKind::Deletion,
        }
    }

    pub fn is_deletion(&self) -> bool {
        self.kind == IndexKind::Deletion
    }

    pub fn key_len(&self) -> usize {
        self.key_columns.len()
    }

    pub fn key_column(&self, pos: usize) -> Option<ColumnId> {
        self.key_columns.get(pos).copied()
    }

    pub fn key_position(&self, column: ColumnId) -> Option<usize> {
        self.key_columns.iter().position(|c| *c == column)
    }

    /// `[key…, startRID, bitmapDescriptor, bitmapSegment]`
    pub fn payload_shape(&self) -> Vec<PayloadField> {
        let mut shape: Vec<PayloadField> = self.key_columns.iter().map(|c| PayloadField::Key(*c)).collect();
        shape.extend([PayloadField::StartRid, PayloadField::BitmapDescriptor, PayloadField::BitmapSegment]);
        shape
    }
}

impl fmt::Display for SecondaryIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_shape() {
        let index = SecondaryIndex::unclustered(StorageId(3), "ib", vec![ColumnId(1), ColumnId(2)], false);
        assert_eq!(
            index.payload_shape(),
            vec![
                PayloadField::Key(ColumnId(1)),
                PayloadField::Key(ColumnId(2)),
                PayloadField::StartRid,
                PayloadField::BitmapDescriptor,
                PayloadField::BitmapSegment,
            ]
        );
        assert_eq!(index.key_position(ColumnId(2)), Some(1));
        assert_eq!(index.key_column(2), None);
    }

    #[test]
    fn test_deletion_index_has_no_keys() {
        let index = SecondaryIndex::deletion(StorageId(9), "del");
        assert!(index.is_deletion());
        assert_eq!(index.payload_shape().len(), 3);
    }

    #[test]
    fn test_kind_defaults_when_absent() {
        let index: SecondaryIndex = serde_json::from_str(r#"{"id": 4, "name": "ia", "key_columns": [0]}"#).unwrap();
        assert_eq!(index.kind, IndexKind::Unclustered);
        assert!(!index.unique);
    }
}
