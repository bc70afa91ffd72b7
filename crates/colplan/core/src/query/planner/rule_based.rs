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

use colplan_common::{ColumnId, FilterLists, SecondaryIndex};
use std::collections::BTreeSet;
use tracing::debug;

use super::assignment::Assignment;

/// Longest-match index selection for when costing is impossible.
///
/// Shorter indexes are tried first. Each round picks the index matching the
/// most leading point columns (plus at most one trailing interval column);
/// the remaining interval filters then go to the shortest index whose first
/// key column carries one.
pub fn select_by_rule(indexes: &[SecondaryIndex], filters: &FilterLists) -> Assignment {
    let mut points: BTreeSet<ColumnId> = filters.points.iter().map(|f| f.column).collect();
    let mut intervals: BTreeSet<ColumnId> = filters.intervals.iter().map(|f| f.column).collect();

    let mut remaining: Vec<&SecondaryIndex> = indexes.iter().filter(|i| !i.is_deletion() && i.key_len() > 0).collect();
    remaining.sort_by_key(|i| (i.key_len(), i.id));

    let mut assignment = Assignment::empty();

    while !points.is_empty() {
        let mut best: Option<(usize, usize)> = None;
        for (slot, index) in remaining.iter().enumerate() {
            let mut matched = 0;
            while index.key_column(matched).is_some_and(|c| points.contains(&c)) {
                matched += 1;
            }
            if index.key_column(matched).is_some_and(|c| intervals.contains(&c)) {
                matched += 1;
            }
            if matched > best.map(|(_, m)| m).unwrap_or(0) {
                best = Some((slot, matched));
            }
        }

        let Some((slot, matched)) = best else {
            break;
        };
        let index = remaining.remove(slot);
        for column in index.key_columns.iter().take(matched) {
            if !points.remove(column) {
                intervals.remove(column);
            }
            assignment = assignment.with_extension(index, *column);
        }
    }

    remaining.retain(|index| {
        match index.key_column(0) {
            Some(first) if intervals.remove(&first) => {
                assignment = assignment.with_extension(index, first);
                false
            }
            _ => true,
        }
    });

    debug!("Rule-based index selection chose {}", assignment);
    assignment
}

#[cfg(test)]
mod tests {
    use super::*;
    use colplan_common::{ColumnFilter, Datum, Endpoint, SargInterval, SargSequence, StorageId};

    fn point(c: u32) -> ColumnFilter {
        ColumnFilter::new(ColumnId(c), SargSequence::point(Datum::Int(1)))
    }

    fn range(c: u32) -> ColumnFilter {
        ColumnFilter::new(ColumnId(c), SargSequence::interval(SargInterval::new(Endpoint::open(Datum::Int(1)), Endpoint::unbounded())))
    }

    #[test]
    fn test_longest_match_wins() {
        let indexes = vec![
            SecondaryIndex::unclustered(StorageId(1), "ia", vec![ColumnId(0)], false),
            SecondaryIndex::unclustered(StorageId(2), "iab", vec![ColumnId(0), ColumnId(1)], false),
        ];
        let filters = FilterLists::partition(&[point(0), point(1)]);
        let assignment = select_by_rule(&indexes, &filters);
        assert_eq!(assignment.matched_len(StorageId(2)), 2);
        assert_eq!(assignment.matched_len(StorageId(1)), 0);
    }

    #[test]
    fn test_interval_goes_to_shortest_index() {
        let indexes = vec![
            SecondaryIndex::unclustered(StorageId(1), "ia", vec![ColumnId(0)], false),
            SecondaryIndex::unclustered(StorageId(2), "ibc", vec![ColumnId(1), ColumnId(2)], false),
            SecondaryIndex::unclustered(StorageId(3), "ib", vec![ColumnId(1)], false),
        ];
        let filters = FilterLists::partition(&[point(0), range(1)]);
        let assignment = select_by_rule(&indexes, &filters);
        assert_eq!(assignment.matched_len(StorageId(1)), 1);
        assert_eq!(assignment.index_for(ColumnId(1)), Some(StorageId(3)));
        assert_eq!(assignment.matched_len(StorageId(2)), 0);
    }

    #[test]
    fn test_no_match_is_empty() {
        let indexes = vec![SecondaryIndex::unclustered(StorageId(1), "ia", vec![ColumnId(0)], false)];
        let filters = FilterLists::partition(&[point(5)]);
        assert!(select_by_rule(&indexes, &filters).is_empty());
    }
}
