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

use colplan_common::filter::merge_by_column;
use colplan_common::{ColumnFilter, FilterLists, SecondaryIndex, TableId, TableSchema};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, trace, warn};

use super::assignment::{Assignment, CandidateIndex};
use super::cost_model::{CostBreakdown, CostModel};
use super::rule_based::select_by_rule;
use super::{SelectorError, SelectorResult};
use crate::cancel::{Cancellation, NeverCancel};
use crate::config::PlannerConfig;
use crate::statistics::StatisticsFacade;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionMethod {
    /// No filters or no usable indexes; nothing to choose.
    Trivial,
    /// Table below the small-table threshold; indexes are not considered.
    SmallTable,
    CostBased,
    /// Statistics were missing, indexes chosen by longest key match.
    RuleBased,
}

#[derive(Debug, Clone)]
pub struct SelectionResult {
    pub assignment: Assignment,
    /// Usable unclustered indexes, in id order.
    pub indexes: Vec<SecondaryIndex>,
    /// Filters with their cached selectivities.
    pub filters: FilterLists,
    pub cost: Option<CostBreakdown>,
    pub method: SelectionMethod,
    pub nodes_visited: usize,
    pub budget_exhausted: bool,
}

impl SelectionResult {
    pub fn candidates(&self) -> SelectorResult<Vec<CandidateIndex>> {
        self.assignment.candidate_indexes(&self.indexes, &self.filters)
    }

    /// Filters not absorbed by any selected index.
    pub fn residual_filters(&self) -> Vec<ColumnFilter> {
        self.filters.all().filter(|f| self.assignment.index_for(f.column).is_none()).cloned().collect()
    }
}

struct Scored {
    assignment: Assignment,
    cost: CostBreakdown,
    unresolved_points: usize,
}

impl Scored {
    /// Lower cost wins; ties go to fewer unresolved point filters, then to
    /// the lexicographically smaller `(index id, matched length)` list.
    fn beats(&self, other: &Scored) -> bool {
        match self.cost.total.total_cmp(&other.cost.total) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => (self.unresolved_points, self.assignment.tie_key()) < (other.unresolved_points, other.assignment.tie_key()),
        }
    }
}

#[derive(Default)]
struct SearchOutcome {
    best: Option<Scored>,
    visited: usize,
    exhausted: bool,
}

struct SearchSpace<'s> {
    indexes: &'s [SecondaryIndex],
    filters: &'s FilterLists,
    model: &'s CostModel<'s>,
}

/// Cost-based index selector.
pub struct IndexSelector<'a> {
    facade: &'a dyn StatisticsFacade,
    config: &'a PlannerConfig,
    cancel: &'a dyn Cancellation,
}

impl<'a> IndexSelector<'a> {
    pub fn new(facade: &'a dyn StatisticsFacade, config: &'a PlannerConfig) -> Self {
        Self {
            facade,
            config,
            cancel: &NeverCancel,
        }
    }

    pub fn with_cancellation(mut self, cancel: &'a dyn Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    /// Unclustered indexes on the table, in id order. An index naming a column
    /// the table does not have is a metadata inconsistency.
    pub fn usable_indexes(&self, schema: &TableSchema) -> SelectorResult<Vec<SecondaryIndex>> {
        let mut indexes: Vec<SecondaryIndex> = self.facade.indexes(schema.id).into_iter().filter(|i| !i.is_deletion() && i.key_len() > 0).collect();
        for index in &indexes {
            schema.check_index(index).map_err(|e| SelectorError::MissingMetadata(e.to_string()))?;
        }
        indexes.sort_by_key(|i| i.id);
        indexes.dedup_by_key(|i| i.id);
        Ok(indexes)
    }

    /// Fills in missing cached selectivities from the statistics facade.
    pub fn prepare_filters(&self, table: TableId, filters: &[ColumnFilter]) -> Vec<ColumnFilter> {
        filters
            .iter()
            .map(|filter| {
                let mut filter = filter.clone();
                if filter.selectivity.is_none() {
                    filter.selectivity = self.facade.column_stats(table, filter.column, Some(&filter.sarg)).and_then(|s| s.selectivity);
                }
                filter
            })
            .collect()
    }

    pub fn select(&self, schema: &TableSchema, filters: &[ColumnFilter]) -> SelectorResult<SelectionResult> {
        let indexes = self.usable_indexes(schema)?;
        let filters = FilterLists::partition(&self.prepare_filters(schema.id, &merge_by_column(filters)));

        let mut result = SelectionResult {
            assignment: Assignment::empty(),
            indexes,
            filters,
            cost: None,
            method: SelectionMethod::Trivial,
            nodes_visited: 0,
            budget_exhausted: false,
        };

        if result.indexes.is_empty() || result.filters.is_empty() {
            debug!("No index candidates for table {}", schema.name);
            return Ok(result);
        }

        if let Some(rows) = self.facade.row_count(schema.id)
            && rows < self.config.small_table_row_count
        {
            debug!("Table {} has {} rows, skipping index analysis", schema.name, rows);
            result.method = SelectionMethod::SmallTable;
            return Ok(result);
        }

        let Some(model) = CostModel::new(self.facade, schema, &self.config.cost) else {
            warn!("Statistics missing for table {}, falling back to rule-based index selection", schema.name);
            return Ok(self.rule_based(result));
        };

        let space = SearchSpace {
            indexes: &result.indexes,
            filters: &result.filters,
            model: &model,
        };
        let outcome = self.visit(&space, 0, Assignment::empty(), SearchOutcome::default())?;

        if outcome.exhausted {
            warn!(
                "Index search for table {} stopped after {} nodes, keeping best assignment so far",
                schema.name, outcome.visited
            );
        }
        result.nodes_visited = outcome.visited;
        result.budget_exhausted = outcome.exhausted;

        match outcome.best {
            Some(best) => {
                debug!("Selected assignment {} for table {} at cost {}", best.assignment, schema.name, best.cost.total);
                result.assignment = best.assignment;
                result.cost = Some(best.cost);
                result.method = SelectionMethod::CostBased;
                Ok(result)
            }
            None => {
                warn!("No costable assignment for table {}, falling back to rule-based index selection", schema.name);
                Ok(self.rule_based(result))
            }
        }
    }

    fn rule_based(&self, mut result: SelectionResult) -> SelectionResult {
        result.assignment = select_by_rule(&result.indexes, &result.filters);
        result.method = SelectionMethod::RuleBased;
        result
    }

    /// Visits index `cursor`: either leave it unused or match it to a prefix
    /// of one or more point filters, optionally closed by one interval
    /// filter. Every complete choice is costed.
    fn visit(&self, space: &SearchSpace<'_>, cursor: usize, partial: Assignment, outcome: SearchOutcome) -> SelectorResult<SearchOutcome> {
        if self.cancel.is_cancelled() {
            return Err(SelectorError::Cancelled);
        }
        let mut outcome = outcome;
        if outcome.visited >= self.config.max_search_nodes {
            outcome.exhausted = true;
            return Ok(outcome);
        }
        outcome.visited += 1;

        let Some(index) = space.indexes.get(cursor) else {
            return Ok(Self::consider(space, partial, outcome));
        };

        outcome = self.visit(space, cursor + 1, partial.clone(), outcome)?;

        let mut extended = partial;
        for column in &index.key_columns {
            if extended.index_for(*column).is_some() {
                break;
            }
            let Some(filter) = space.filters.get(*column) else {
                break;
            };
            extended = extended.with_extension(index, *column);
            outcome = self.visit(space, cursor + 1, extended.clone(), outcome)?;
            if !filter.is_point() {
                break;
            }
        }
        Ok(outcome)
    }

    fn consider(space: &SearchSpace<'_>, assignment: Assignment, mut outcome: SearchOutcome) -> SearchOutcome {
        let Some(cost) = space.model.assignment_cost(&assignment, space.indexes, space.filters) else {
            trace!("Assignment {} is uncostable, skipping", assignment);
            return outcome;
        };
        let candidate = Scored {
            unresolved_points: assignment.unresolved_points(space.filters),
            assignment,
            cost,
        };
        let better = match &outcome.best {
            Some(best) => candidate.beats(best),
            None => true,
        };
        if better {
            outcome.best = Some(candidate);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelFlag;
    use crate::statistics::{ColumnStats, MockStatisticsFacade};
    use colplan_common::{ClusteredGroup, Column, ColumnId, ColumnType, Datum, Endpoint, SargInterval, SargSequence, StorageId};

    fn schema() -> TableSchema {
        TableSchema {
            id: TableId(1),
            name: "t".into(),
            columns: (0..3)
                .map(|i| Column {
                    id: ColumnId(i),
                    name: ["a", "b", "c"][i as usize].into(),
                    ty: ColumnType::Integer,
                    nullable: true,
                })
                .collect(),
            groups: vec![ClusteredGroup {
                id: StorageId(1),
                name: "g".into(),
                columns: vec![ColumnId(0), ColumnId(1), ColumnId(2)],
            }],
        }
    }

    fn indexes() -> Vec<SecondaryIndex> {
        vec![
            SecondaryIndex::unclustered(StorageId(10), "ia", vec![ColumnId(0)], false),
            SecondaryIndex::unclustered(StorageId(11), "ibc", vec![ColumnId(1), ColumnId(2)], false),
        ]
    }

    fn filters() -> Vec<ColumnFilter> {
        vec![
            ColumnFilter::new(ColumnId(0), SargSequence::point(Datum::Int(5))),
            ColumnFilter::new(
                ColumnId(1),
                SargSequence::interval(SargInterval::new(Endpoint::open(Datum::Int(10)), Endpoint::open(Datum::Int(20)))),
            ),
        ]
    }

    fn mock(with_row_count: bool) -> MockStatisticsFacade {
        let mut facade = MockStatisticsFacade::new();
        facade.expect_indexes().returning(|_| indexes());
        facade.expect_deletion_index().returning(|_| Some(SecondaryIndex::deletion(StorageId(2), "del")));
        facade.expect_row_count().returning(move |_| if with_row_count { Some(1_000_000.0) } else { None });
        facade.expect_page_count().returning(|storage| match storage {
            StorageId(1) => Some(10_000),
            StorageId(2) => Some(1),
            _ => Some(100),
        });
        facade.expect_column_stats().returning(|_, column, sarg| {
            let cardinality = match (column, sarg.is_some()) {
                (ColumnId(1), true) => 10.0,
                (ColumnId(2), _) => 1.5,
                _ => 1000.0,
            };
            let selectivity = match (column, sarg.is_some()) {
                (_, false) => 1.0,
                (ColumnId(0), true) => 0.001,
                _ => 0.01,
            };
            Some(ColumnStats {
                cardinality: Some(cardinality),
                selectivity: Some(selectivity),
            })
        });
        facade
    }

    #[test]
    fn test_prefers_cheaper_single_index() {
        let facade = mock(true);
        let config = PlannerConfig::default();
        let result = IndexSelector::new(&facade, &config).select(&schema(), &filters()).unwrap();

        // The range on b reads ten bitmaps; intersecting them costs more
        // than evaluating b as a residual on the rows a = 5 leaves.
        assert_eq!(result.method, SelectionMethod::CostBased);
        assert_eq!(result.assignment.matched_len(StorageId(10)), 1);
        assert_eq!(result.assignment.matched_len(StorageId(11)), 0);
        assert_eq!(result.residual_filters().len(), 1);
        assert_eq!(result.residual_filters()[0].column, ColumnId(1));
        assert_eq!(result.filters.get(ColumnId(0)).and_then(|f| f.selectivity), Some(0.001));

        let cost = result.cost.unwrap();
        assert!(cost.total < 100.0, "unexpected cost {cost:?}");
        assert!(result.nodes_visited > 0);
        assert!(!result.budget_exhausted);
    }

    #[test]
    fn test_candidates_follow_assignment() {
        let facade = mock(true);
        let config = PlannerConfig::default();
        let result = IndexSelector::new(&facade, &config).select(&schema(), &filters()).unwrap();
        let candidates = result.candidates().unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].index.name, "ia");
        assert!(candidates[0].is_point_match());
    }

    #[test]
    fn test_missing_row_count_uses_rules() {
        let facade = mock(false);
        let config = PlannerConfig::default();
        let result = IndexSelector::new(&facade, &config).select(&schema(), &filters()).unwrap();

        assert_eq!(result.method, SelectionMethod::RuleBased);
        assert_eq!(result.assignment.matched_len(StorageId(10)), 1);
        assert_eq!(result.assignment.index_for(ColumnId(1)), Some(StorageId(11)));
    }

    #[test]
    fn test_uncostable_filters_are_not_fatal() {
        let mut facade = MockStatisticsFacade::new();
        facade.expect_indexes().returning(|_| indexes());
        facade.expect_deletion_index().returning(|_| None);
        facade.expect_row_count().returning(|_| Some(1_000_000.0));
        facade.expect_page_count().returning(|_| Some(100));
        facade.expect_column_stats().returning(|_, _, _| None);

        let config = PlannerConfig::default();
        let result = IndexSelector::new(&facade, &config).select(&schema(), &filters()).unwrap();
        assert_eq!(result.method, SelectionMethod::RuleBased);
        assert!(result.cost.is_none());
    }

    #[test]
    fn test_small_table_skips_indexes() {
        let mut facade = MockStatisticsFacade::new();
        facade.expect_indexes().returning(|_| indexes());
        facade.expect_row_count().returning(|_| Some(5.0));
        facade.expect_column_stats().returning(|_, _, _| None);

        let config = PlannerConfig::default();
        let result = IndexSelector::new(&facade, &config).select(&schema(), &filters()).unwrap();
        assert_eq!(result.method, SelectionMethod::SmallTable);
        assert!(result.assignment.is_empty());
    }

    #[test]
    fn test_cancellation() {
        let facade = mock(true);
        let config = PlannerConfig::default();
        let flag = CancelFlag::new();
        flag.cancel();
        let result = IndexSelector::new(&facade, &config).with_cancellation(&flag).select(&schema(), &filters());
        assert_eq!(result.unwrap_err(), SelectorError::Cancelled);
    }

    #[test]
    fn test_budget_keeps_best_so_far() {
        let facade = mock(true);
        let config = PlannerConfig {
            max_search_nodes: 3,
            ..PlannerConfig::default()
        };
        let result = IndexSelector::new(&facade, &config).select(&schema(), &filters()).unwrap();
        assert!(result.budget_exhausted);
        assert_eq!(result.nodes_visited, 3);
        assert_eq!(result.method, SelectionMethod::CostBased);
        assert!(result.assignment.is_empty());
    }

    #[test]
    fn test_equal_cost_prefers_lower_index_id() {
        let mut facade = MockStatisticsFacade::new();
        facade.expect_indexes().returning(|_| {
            vec![
                SecondaryIndex::unclustered(StorageId(12), "ia_copy", vec![ColumnId(0)], false),
                SecondaryIndex::unclustered(StorageId(10), "ia", vec![ColumnId(0)], false),
            ]
        });
        facade.expect_deletion_index().returning(|_| Some(SecondaryIndex::deletion(StorageId(2), "del")));
        facade.expect_row_count().returning(|_| Some(1_000_000.0));
        facade.expect_page_count().returning(|storage| match storage {
            StorageId(1) => Some(10_000),
            StorageId(2) => Some(1),
            _ => Some(100),
        });
        facade.expect_column_stats().returning(|_, _, sarg| {
            Some(ColumnStats {
                cardinality: Some(1000.0),
                selectivity: Some(if sarg.is_some() { 0.001 } else { 1.0 }),
            })
        });

        let config = PlannerConfig::default();
        let filters = vec![ColumnFilter::new(ColumnId(0), SargSequence::point(Datum::Int(5)))];
        let result = IndexSelector::new(&facade, &config).select(&schema(), &filters).unwrap();

        assert_eq!(result.method, SelectionMethod::CostBased);
        assert_eq!(result.assignment.index_for(ColumnId(0)), Some(StorageId(10)));
        assert_eq!(result.assignment.matched_len(StorageId(12)), 0);
    }

    #[test]
    fn test_equal_cost_prefers_resolved_points() {
        let filters = FilterLists::partition(&[ColumnFilter::new(ColumnId(0), SargSequence::point(Datum::Int(5)))]);
        let cost = CostBreakdown {
            index: 1.0,
            residual: 2.0,
            total: 3.0,
        };
        let scored = |assignment: Assignment| Scored {
            unresolved_points: assignment.unresolved_points(&filters),
            assignment,
            cost,
        };

        let index = SecondaryIndex::unclustered(StorageId(10), "ia", vec![ColumnId(0)], false);
        let resolved = scored(Assignment::empty().with_extension(&index, ColumnId(0)));
        let unresolved = scored(Assignment::empty());
        assert_eq!(resolved.unresolved_points, 0);
        assert_eq!(unresolved.unresolved_points, 1);
        assert!(resolved.beats(&unresolved));
        assert!(!unresolved.beats(&resolved));

        // Unresolved points only break ties; a cheaper assignment still wins.
        let cheaper = Scored {
            cost: CostBreakdown { total: 2.5, ..cost },
            ..scored(Assignment::empty())
        };
        assert!(cheaper.beats(&resolved));
    }

    #[test]
    fn test_unknown_index_column_is_missing_metadata() {
        let mut facade = MockStatisticsFacade::new();
        facade
            .expect_indexes()
            .returning(|_| vec![SecondaryIndex::unclustered(StorageId(12), "ix", vec![ColumnId(9)], false)]);
        let config = PlannerConfig::default();
        let result = IndexSelector::new(&facade, &config).select(&schema(), &filters());
        assert!(matches!(result, Err(SelectorError::MissingMetadata(_))));
    }
}
