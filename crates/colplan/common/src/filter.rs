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

use crate::ids::ColumnId;
use crate::sarg::SargSequence;

/// A sargable predicate on a single column. The planner caches the
/// selectivity reported by the statistics facade here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnFilter {
    pub column: ColumnId,
    pub sarg: SargSequence,
    #[serde(default)]
    pub selectivity: Option<f64>,
}

impl ColumnFilter {
    pub fn new(column: ColumnId, sarg: SargSequence) -> Self {
        Self {
            column,
            sarg,
            selectivity: None,
        }
    }

    pub fn with_selectivity(mut self, selectivity: f64) -> Self {
        self.selectivity = Some(selectivity);
        self
    }

    pub fn is_point(&self) -> bool {
        self.sarg.is_point()
    }
}

impl fmt::Display for ColumnFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.column, self.sarg)
    }
}

/// Column filters partitioned into exact-match and range filters, each list
/// ordered by column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterLists {
    pub points: Vec<ColumnFilter>,
    pub intervals: Vec<ColumnFilter>,
}

/// Intersects filters naming the same column, so every column carries a
/// single conjunct. A merged filter drops its cached selectivity.
pub fn merge_by_column(filters: &[ColumnFilter]) -> Vec<ColumnFilter> {
    let mut merged: Vec<ColumnFilter> = Vec::with_capacity(filters.len());
    for filter in filters {
        match merged.iter_mut().find(|f| f.column == filter.column) {
            Some(existing) => {
                existing.sarg = existing.sarg.intersect(&filter.sarg);
                existing.selectivity = None;
            }
            None => merged.push(filter.clone()),
        }
    }
    merged
}

impl FilterLists {
    pub fn partition(filters: &[ColumnFilter]) -> Self {
        let (mut points, mut intervals): (Vec<ColumnFilter>, Vec<ColumnFilter>) = merge_by_column(filters).into_iter().partition(ColumnFilter::is_point);
        points.sort_by_key(|f| f.column);
        intervals.sort_by_key(|f| f.column);
        Self { points, intervals }
    }

    pub fn len(&self) -> usize {
        self.points.len() + self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.intervals.is_empty()
    }

    pub fn get(&self, column: ColumnId) -> Option<&ColumnFilter> {
        self.points.iter().chain(self.intervals.iter()).find(|f| f.column == column)
    }

    pub fn all(&self) -> impl Iterator<Item = &ColumnFilter> {
        self.points.iter().chain(self.intervals.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::Datum;
    use crate::sarg::{Endpoint, SargInterval};

    #[test]
    fn test_partition() {
        let filters = vec![
            ColumnFilter::new(ColumnId(2), SargSequence::interval(SargInterval::new(Endpoint::open(Datum::Int(1)), Endpoint::unbounded()))),
            ColumnFilter::new(ColumnId(1), SargSequence::point(Datum::Int(5))),
            ColumnFilter::new(ColumnId(0), SargSequence::points(vec![Datum::Int(1), Datum::Int(2)])),
        ];
        let lists = FilterLists::partition(&filters);
        assert_eq!(lists.points.iter().map(|f| f.column).collect::<Vec<_>>(), vec![ColumnId(0), ColumnId(1)]);
        assert_eq!(lists.intervals.len(), 1);
        assert_eq!(lists.get(ColumnId(2)).map(|f| f.column), Some(ColumnId(2)));
        assert_eq!(lists.len(), 3);
    }

    #[test]
    fn test_partition_merges_filters_on_one_column() {
        let filters = vec![
            ColumnFilter::new(ColumnId(0), SargSequence::points(vec![Datum::Int(5), Datum::Int(6)])).with_selectivity(0.2),
            ColumnFilter::new(ColumnId(1), SargSequence::point(Datum::Int(1))),
            ColumnFilter::new(ColumnId(0), SargSequence::point(Datum::Int(5))),
        ];
        let lists = FilterLists::partition(&filters);
        assert_eq!(lists.len(), 2);
        let a = lists.get(ColumnId(0)).unwrap();
        assert_eq!(a.sarg, SargSequence::point(Datum::Int(5)));
        assert_eq!(a.selectivity, None);
    }

    #[test]
    fn test_contradictory_filters_merge_to_empty() {
        let filters = vec![
            ColumnFilter::new(ColumnId(0), SargSequence::point(Datum::Int(5))),
            ColumnFilter::new(ColumnId(0), SargSequence::point(Datum::Int(6))),
        ];
        let merged = merge_by_column(&filters);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].sarg.is_empty());
    }
}
