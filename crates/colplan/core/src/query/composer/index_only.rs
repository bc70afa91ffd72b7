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

use colplan_common::{ColumnFilter, TableSchema};
use tracing::trace;

use crate::graph::Projected;
use crate::query::planner::CandidateIndex;

/// Positions within the index key of each projected column, when the scan
/// can be answered from `candidates[0]` alone.
///
/// Normalized index output cannot be filtered again by column position, so
/// the access index must be the only one and every filter must be absorbed
/// by it. Multi-valued columns are stored decomposed in the index and never
/// qualify.
pub fn index_only_projection(
    schema: &TableSchema,
    candidates: &[CandidateIndex],
    residual: &[ColumnFilter],
    has_residual_predicate: bool,
    projection: &[Projected],
) -> Option<Vec<usize>> {
    let [candidate] = candidates else {
        return None;
    };
    if !residual.is_empty() || has_residual_predicate || projection.is_empty() {
        return None;
    }

    let mut fields = Vec::with_capacity(projection.len());
    for projected in projection {
        let Projected::Column(column) = projected else {
            trace!("Index-only access to {} rejected: RID projected", candidate.index);
            return None;
        };
        let multi_valued = schema.column(*column).is_none_or(|c| c.ty.is_multi_valued());
        match candidate.index.key_position(*column) {
            Some(pos) if !multi_valued => fields.push(pos),
            _ => {
                trace!("Index-only access to {} rejected: {} not covered", candidate.index, column);
                return None;
            }
        }
    }
    Some(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use colplan_common::{ClusteredGroup, Column, ColumnId, ColumnType, Datum, SargSequence, SecondaryIndex, StorageId, TableId};

    fn schema() -> TableSchema {
        TableSchema {
            id: TableId(1),
            name: "t".into(),
            columns: vec![
                Column {
                    id: ColumnId(0),
                    name: "a".into(),
                    ty: ColumnType::Integer,
                    nullable: false,
                },
                Column {
                    id: ColumnId(1),
                    name: "tags".into(),
                    ty: ColumnType::Multi(3),
                    nullable: true,
                },
                Column {
                    id: ColumnId(2),
                    name: "c".into(),
                    ty: ColumnType::Integer,
                    nullable: true,
                },
            ],
            groups: vec![ClusteredGroup {
                id: StorageId(1),
                name: "g".into(),
                columns: vec![ColumnId(0), ColumnId(1), ColumnId(2)],
            }],
        }
    }

    fn candidate() -> CandidateIndex {
        let index = SecondaryIndex::unclustered(StorageId(7), "iab", vec![ColumnId(0), ColumnId(1)], false);
        CandidateIndex::new(index, vec![ColumnFilter::new(ColumnId(0), SargSequence::point(Datum::Int(1)))])
    }

    #[test]
    fn test_covered_projection() {
        let fields = index_only_projection(&schema(), &[candidate()], &[], false, &[Projected::Column(ColumnId(0))]);
        assert_eq!(fields, Some(vec![0]));
    }

    #[test]
    fn test_rejections() {
        let s = schema();
        assert!(index_only_projection(&s, &[candidate()], &[], false, &[Projected::Column(ColumnId(2))]).is_none());
        assert!(index_only_projection(&s, &[candidate()], &[], false, &[Projected::Column(ColumnId(1))]).is_none());
        assert!(index_only_projection(&s, &[candidate()], &[], false, &[Projected::Rid]).is_none());
        assert!(index_only_projection(&s, &[candidate()], &[], true, &[Projected::Column(ColumnId(0))]).is_none());
        assert!(index_only_projection(&s, &[candidate(), candidate()], &[], false, &[Projected::Column(ColumnId(0))]).is_none());
    }
}
