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

//! Filter to index assignments and the candidate indexes derived from them.

use colplan_common::{ColumnFilter, ColumnId, FilterLists, SargSequence, SecondaryIndex, StorageId};
use std::collections::BTreeMap;
use std::fmt;

use super::SelectorError;

/// Maps filters (by column) to indexes and indexes to their matched key
/// prefix length. Values are immutable; extending returns a new assignment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assignment {
    filter_to_index: BTreeMap<ColumnId, StorageId>,
    matched: BTreeMap<StorageId, usize>,
}

impl Assignment {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds an assignment from raw maps, e.g. one produced outside the
    /// selector. Call [`Assignment::validate`] before using it.
    pub fn from_parts(filter_to_index: BTreeMap<ColumnId, StorageId>, matched: BTreeMap<StorageId, usize>) -> Self {
        Self { filter_to_index, matched }
    }

    pub fn is_empty(&self) -> bool {
        self.matched.is_empty()
    }

    pub fn index_count(&self) -> usize {
        self.matched.len()
    }

    pub fn matched_len(&self, index: StorageId) -> usize {
        self.matched.get(&index).copied().unwrap_or(0)
    }

    pub fn index_for(&self, column: ColumnId) -> Option<StorageId> {
        self.filter_to_index.get(&column).copied()
    }

    /// `(index, matched length)` pairs in index id order.
    pub fn matched(&self) -> impl Iterator<Item = (StorageId, usize)> + '_ {
        self.matched.iter().map(|(id, len)| (*id, *len))
    }

    pub fn assigned_columns(&self) -> impl Iterator<Item = ColumnId> + '_ {
        self.filter_to_index.keys().copied()
    }

    /// Assigns the filter on `column` to the next unmatched key position of
    /// `index`.
    pub fn with_extension(&self, index: &SecondaryIndex, column: ColumnId) -> Assignment {
        let position = self.matched_len(index.id);
        assert_eq!(
            index.key_column(position),
            Some(column),
            "column {column} is not key position {position} of index {index}"
        );
        assert!(!self.filter_to_index.contains_key(&column), "column {column} is already assigned");

        let mut next = self.clone();
        next.filter_to_index.insert(column, index.id);
        next.matched.insert(index.id, position + 1);
        next
    }

    /// Point filters no index absorbs.
    pub fn unresolved_points(&self, filters: &FilterLists) -> usize {
        filters.points.iter().filter(|f| !self.filter_to_index.contains_key(&f.column)).count()
    }

    /// Deterministic ordering key used to break cost ties.
    pub fn tie_key(&self) -> Vec<(StorageId, usize)> {
        self.matched().collect()
    }

    /// Checks an assignment built outside the selector: every referenced
    /// index and filter exists, every matched prefix is gap-free and only its
    /// last position may hold a range filter.
    pub fn validate(&self, indexes: &[SecondaryIndex], filters: &FilterLists) -> Result<(), SelectorError> {
        for (id, len) in self.matched() {
            let index = indexes
                .iter()
                .find(|i| i.id == id)
                .ok_or_else(|| SelectorError::MalformedAssignment(format!("unknown index {id}")))?;
            if len == 0 || len > index.key_len() {
                return Err(SelectorError::MalformedAssignment(format!("index {index} matched to length {len}")));
            }
            for pos in 0..len {
                let column = index.key_columns[pos];
                if self.index_for(column) != Some(id) {
                    return Err(SelectorError::MalformedAssignment(format!("index {index} has no filter at key position {pos}")));
                }
                let filter = filters
                    .get(column)
                    .ok_or_else(|| SelectorError::MalformedAssignment(format!("no filter on column {column}")))?;
                if pos + 1 < len && !filter.is_point() {
                    return Err(SelectorError::MalformedAssignment(format!("range filter on {column} before the last matched position of {index}")));
                }
            }
        }
        for (column, id) in &self.filter_to_index {
            let index = indexes
                .iter()
                .find(|i| i.id == *id)
                .ok_or_else(|| SelectorError::MalformedAssignment(format!("unknown index {id}")))?;
            match index.key_position(*column) {
                Some(pos) if pos < self.matched_len(*id) => {}
                _ => return Err(SelectorError::MalformedAssignment(format!("filter on {column} is outside the matched prefix of {index}"))),
            }
        }
        Ok(())
    }

    /// The selected indexes with their matched sargs, in index id order.
    pub fn candidate_indexes(&self, indexes: &[SecondaryIndex], filters: &FilterLists) -> Result<Vec<CandidateIndex>, SelectorError> {
        let mut candidates = Vec::with_capacity(self.matched.len());
        for (id, len) in self.matched() {
            let index = indexes
                .iter()
                .find(|i| i.id == id)
                .ok_or_else(|| SelectorError::MalformedAssignment(format!("unknown index {id}")))?;
            let mut matched = Vec::with_capacity(len);
            for column in index.key_columns.iter().take(len) {
                let filter = filters
                    .get(*column)
                    .ok_or_else(|| SelectorError::MalformedAssignment(format!("no filter on column {column}")))?;
                matched.push(filter.clone());
            }
            candidates.push(CandidateIndex::new(index.clone(), matched));
        }
        Ok(candidates)
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "{{}}");
        }
        let parts: Vec<String> = self
            .matched()
            .map(|(id, len)| {
                let cols: Vec<String> = self.filter_to_index.iter().filter(|(_, i)| **i == id).map(|(c, _)| c.to_string()).collect();
                format!("{id}[{}]:{len}", cols.join(","))
            })
            .collect();
        write!(f, "{{{}}}", parts.join(" "))
    }
}

/// One index the plan will search, with the filters on its matched key prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateIndex {
    pub index: SecondaryIndex,
    pub matched_len: usize,
    pub filters: Vec<ColumnFilter>,
}

impl CandidateIndex {
    /// Panics unless `filters[p]` is on key column `p` for every position.
    pub fn new(index: SecondaryIndex, filters: Vec<ColumnFilter>) -> Self {
        assert!(!filters.is_empty(), "candidate index {index} has no matched key columns");
        assert!(filters.len() <= index.key_len(), "candidate index {index} matched beyond its key");
        for (pos, filter) in filters.iter().enumerate() {
            assert_eq!(
                index.key_columns[pos], filter.column,
                "filter on {} does not match key position {pos} of {index}",
                filter.column
            );
        }
        Self {
            matched_len: filters.len(),
            index,
            filters,
        }
    }

    pub fn sargs(&self) -> impl Iterator<Item = &SargSequence> {
        self.filters.iter().map(|f| &f.sarg)
    }

    pub fn last(&self) -> &ColumnFilter {
        &self.filters[self.matched_len - 1]
    }

    pub fn is_full_match(&self) -> bool {
        self.matched_len == self.index.key_len()
    }

    pub fn is_point_match(&self) -> bool {
        self.filters.iter().all(ColumnFilter::is_point)
    }

    /// Distinct search key tuples or ranges the search is driven by.
    pub fn search_key_count(&self) -> usize {
        self.filters.iter().map(|f| f.sarg.intervals().len()).product()
    }

    /// True when the search can return more than one bitmap per RID range, so
    /// fragments must be chopped, sorted and merged back into RID order.
    pub fn requires_merge(&self) -> bool {
        let last = self.last();
        last.sarg.is_range() || !self.is_full_match() || self.search_key_count() > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colplan_common::{Datum, Endpoint, SargInterval};

    fn index_bc() -> SecondaryIndex {
        SecondaryIndex::unclustered(StorageId(3), "ib", vec![ColumnId(1), ColumnId(2)], false)
    }

    fn filters() -> FilterLists {
        FilterLists::partition(&[
            ColumnFilter::new(ColumnId(1), SargSequence::point(Datum::Int(7))),
            ColumnFilter::new(ColumnId(2), SargSequence::interval(SargInterval::new(Endpoint::open(Datum::Int(1)), Endpoint::unbounded()))),
        ])
    }

    #[test]
    fn test_extension_is_persistent() {
        let empty = Assignment::empty();
        let one = empty.with_extension(&index_bc(), ColumnId(1));
        let two = one.with_extension(&index_bc(), ColumnId(2));

        assert!(empty.is_empty());
        assert_eq!(one.matched_len(StorageId(3)), 1);
        assert_eq!(two.matched_len(StorageId(3)), 2);
        assert_eq!(two.index_for(ColumnId(2)), Some(StorageId(3)));
        assert!(two.validate(&[index_bc()], &filters()).is_ok());
        assert_eq!(two.to_string(), "{#3[$1,$2]:2}");
    }

    #[test]
    #[should_panic]
    fn test_extension_rejects_gap() {
        Assignment::empty().with_extension(&index_bc(), ColumnId(2));
    }

    #[test]
    fn test_validate_rejects_gap() {
        let mut filter_to_index = BTreeMap::new();
        filter_to_index.insert(ColumnId(2), StorageId(3));
        let mut matched = BTreeMap::new();
        matched.insert(StorageId(3), 2);
        let assignment = Assignment::from_parts(filter_to_index, matched);
        assert!(matches!(assignment.validate(&[index_bc()], &filters()), Err(SelectorError::MalformedAssignment(_))));
    }

    #[test]
    fn test_requires_merge() {
        let lists = filters();
        let full_range = CandidateIndex::new(index_bc(), vec![lists.points[0].clone(), lists.intervals[0].clone()]);
        assert!(full_range.requires_merge());

        let partial_point = CandidateIndex::new(index_bc(), vec![lists.points[0].clone()]);
        assert!(partial_point.requires_merge());

        let single = SecondaryIndex::unclustered(StorageId(4), "ia", vec![ColumnId(1)], false);
        let full_point = CandidateIndex::new(single.clone(), vec![lists.points[0].clone()]);
        assert!(!full_point.requires_merge());

        let in_list = ColumnFilter::new(ColumnId(1), SargSequence::points(vec![Datum::Int(1), Datum::Int(2)]));
        assert!(CandidateIndex::new(single, vec![in_list]).requires_merge());
    }

    #[test]
    #[should_panic]
    fn test_candidate_asserts_prefix() {
        let lists = filters();
        CandidateIndex::new(index_bc(), vec![lists.intervals[0].clone()]);
    }
}
