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

//! Bitmap Plan Composition
//!
//! Replaces a full clustered scan with a bitmap access path built from the
//! selector's assignment. The plan shape only ever moves forward:
//! `FullScan` to `IndexFiltered` once an index is usable, and on to
//! `IndexOnly` when that index alone answers the projection. A fatal
//! planning error yields a full scan with every filter applied as a
//! residual.

pub mod index_only;
pub mod plan_generator;
pub mod residual;
pub mod search;

use colplan_common::filter::merge_by_column;
use colplan_common::{ColumnFilter, SecondaryIndex, TableId, TableSchema};
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub use crate::graph::Projected;
pub use index_only::index_only_projection;
pub use plan_generator::{PlanInputs, assemble};
pub use residual::order_residuals;
pub use search::{FlowParams, search_keys};

use crate::cancel::{Cancellation, NeverCancel};
use crate::config::PlannerConfig;
use crate::graph::{GraphError, OperatorGraph};
use crate::query::planner::{IndexSelector, SelectionResult, SelectorError};
use crate::statistics::StatisticsFacade;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ComposeError {
    #[error("Table {0} has no deletion index")]
    MissingDeletionIndex(TableId),
    #[error("Unknown index column: {0}")]
    UnknownIndexColumn(String),
    #[error("Malformed assignment: {0}")]
    MalformedAssignment(String),
    #[error("Plan composition cancelled")]
    Cancelled,
    #[error(transparent)]
    CyclicGraph(#[from] GraphError),
}

impl From<SelectorError> for ComposeError {
    fn from(error: SelectorError) -> Self {
        match error {
            SelectorError::Cancelled => ComposeError::Cancelled,
            SelectorError::MissingMetadata(msg) => ComposeError::UnknownIndexColumn(msg),
            SelectorError::MalformedAssignment(msg) => ComposeError::MalformedAssignment(msg),
        }
    }
}

pub type ComposeResult<T> = Result<T, ComposeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PlanShape {
    FullScan,
    IndexFiltered,
    IndexOnly,
}

impl PlanShape {
    /// Moves to `next` if it is further along; never moves back.
    pub fn advance(self, next: PlanShape) -> PlanShape {
        if next > self {
            debug!("Plan shape {:?} -> {:?}", self, next);
            next
        } else {
            self
        }
    }
}

/// A row scan to be replaced by a bitmap access path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub schema: TableSchema,
    pub filters: Vec<ColumnFilter>,
    pub projection: Vec<Projected>,
    /// Set when a non-sargable predicate is still evaluated above the scan.
    #[serde(default)]
    pub has_residual_predicate: bool,
    /// Set when the caller knows the statement cannot observe deleted rows.
    #[serde(default)]
    pub deletion_free: bool,
}

impl ScanRequest {
    pub fn new(schema: TableSchema, filters: Vec<ColumnFilter>, projection: Vec<Projected>) -> Self {
        Self {
            schema,
            filters,
            projection,
            has_residual_predicate: false,
            deletion_free: false,
        }
    }

    pub fn with_residual_predicate(mut self) -> Self {
        self.has_residual_predicate = true;
        self
    }

    pub fn deletion_free(mut self) -> Self {
        self.deletion_free = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ComposedPlan {
    pub graph: OperatorGraph,
    pub root: NodeIndex,
    pub shape: PlanShape,
    /// `None` for a fallback plan.
    pub selection: Option<SelectionResult>,
    /// Filters the scan applies, in evaluation order.
    pub residual: Vec<ColumnFilter>,
    /// The planning error a fallback plan replaced.
    pub fallback: Option<ComposeError>,
}

pub struct BitmapPlanComposer<'a> {
    facade: &'a dyn StatisticsFacade,
    config: &'a PlannerConfig,
    cancel: &'a dyn Cancellation,
}

impl<'a> BitmapPlanComposer<'a> {
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

    fn selector(&self) -> IndexSelector<'a> {
        IndexSelector::new(self.facade, self.config).with_cancellation(self.cancel)
    }

    /// Selects indexes for the request and composes the plan. Only
    /// cancellation is an error; other planning failures produce a full-scan
    /// fallback.
    pub fn compose(&self, request: &ScanRequest) -> ComposeResult<ComposedPlan> {
        if self.cancel.is_cancelled() {
            return Err(ComposeError::Cancelled);
        }
        let attempt = self
            .selector()
            .select(&request.schema, &request.filters)
            .map_err(ComposeError::from)
            .and_then(|selection| self.compose_selection(request, selection));
        self.recover(request, attempt)
    }

    /// Composes a plan for a selection made elsewhere.
    pub fn compose_with(&self, request: &ScanRequest, selection: SelectionResult) -> ComposeResult<ComposedPlan> {
        let attempt = self.compose_selection(request, selection);
        self.recover(request, attempt)
    }

    fn recover(&self, request: &ScanRequest, attempt: ComposeResult<ComposedPlan>) -> ComposeResult<ComposedPlan> {
        match attempt {
            Err(ComposeError::Cancelled) => Err(ComposeError::Cancelled),
            Err(error) => {
                warn!("Planning for table {} failed ({}), falling back to a full scan", request.schema.name, error);
                self.full_scan_fallback(request, error)
            }
            ok => ok,
        }
    }

    /// The deletion index to subtract, or `None` when no deleted row can be
    /// observed.
    fn deletion_source(&self, request: &ScanRequest) -> ComposeResult<Option<SecondaryIndex>> {
        if request.deletion_free || self.facade.deleted_row_count(request.schema.id) == Some(0) {
            return Ok(None);
        }
        match self.facade.deletion_index(request.schema.id) {
            Some(deletion) => Ok(Some(deletion)),
            None => Err(ComposeError::MissingDeletionIndex(request.schema.id)),
        }
    }

    fn compose_selection(&self, request: &ScanRequest, selection: SelectionResult) -> ComposeResult<ComposedPlan> {
        let deletion = self.deletion_source(request)?;
        selection.assignment.validate(&selection.indexes, &selection.filters)?;
        let candidates = selection.candidates()?;
        for candidate in &candidates {
            request
                .schema
                .check_index(&candidate.index)
                .map_err(|e| ComposeError::UnknownIndexColumn(e.to_string()))?;
        }
        let residual = order_residuals(selection.residual_filters());

        let mut shape = PlanShape::FullScan;
        if !candidates.is_empty() {
            shape = shape.advance(PlanShape::IndexFiltered);
        }
        let index_fields = match shape {
            PlanShape::IndexFiltered => index_only_projection(&request.schema, &candidates, &residual, request.has_residual_predicate, &request.projection),
            _ => None,
        };
        if index_fields.is_some() {
            shape = shape.advance(PlanShape::IndexOnly);
        }

        let inputs = PlanInputs {
            schema: &request.schema,
            projection: &request.projection,
            candidates: &candidates,
            residual: &residual,
            deletion: deletion.as_ref(),
            index_fields: index_fields.as_deref(),
            chopper_row_limit: self.config.chopper_row_limit,
        };
        let (graph, root) = assemble(shape, &inputs, self.cancel)?;
        graph.finish()?;

        Ok(ComposedPlan {
            graph,
            root,
            shape,
            selection: Some(selection),
            residual,
            fallback: None,
        })
    }

    fn full_scan_fallback(&self, request: &ScanRequest, error: ComposeError) -> ComposeResult<ComposedPlan> {
        let residual = order_residuals(self.selector().prepare_filters(request.schema.id, &merge_by_column(&request.filters)));
        let deletion = if request.deletion_free {
            None
        } else {
            self.facade.deletion_index(request.schema.id)
        };

        let inputs = PlanInputs {
            schema: &request.schema,
            projection: &request.projection,
            candidates: &[],
            residual: &residual,
            deletion: deletion.as_ref(),
            index_fields: None,
            chopper_row_limit: self.config.chopper_row_limit,
        };
        let (graph, root) = assemble(PlanShape::FullScan, &inputs, self.cancel)?;
        graph.finish()?;

        Ok(ComposedPlan {
            graph,
            root,
            shape: PlanShape::FullScan,
            selection: None,
            residual,
            fallback: Some(error),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{OperatorKind, ScanMode};
    use crate::query::planner::{Assignment, SelectionMethod};
    use crate::statistics::{ColumnProfile, StatisticsCollector};
    use colplan_common::{ClusteredGroup, Column, ColumnId, ColumnType, Datum, FilterLists, SargSequence, StorageId};
    use std::collections::BTreeMap;

    fn schema() -> TableSchema {
        TableSchema {
            id: TableId(1),
            name: "t".into(),
            columns: (0..3)
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
                columns: vec![ColumnId(0), ColumnId(1), ColumnId(2)],
            }],
        }
    }

    fn stats() -> StatisticsCollector {
        let stats = StatisticsCollector::new();
        stats.set_row_count(TableId(1), 1_000_000.0);
        stats.set_page_count(StorageId(1), 10_000);
        stats.register_index(TableId(1), SecondaryIndex::deletion(StorageId(2), "del"));
        stats.set_page_count(StorageId(2), 1);
        stats.register_index(TableId(1), SecondaryIndex::unclustered(StorageId(10), "ia", vec![ColumnId(0)], false));
        stats.set_page_count(StorageId(10), 100);
        stats.analyze_column(TableId(1), ColumnProfile::new(ColumnId(0), 100_000.0));
        stats.analyze_column(TableId(1), ColumnProfile::new(ColumnId(1), 50.0));
        stats
    }

    fn a_equals_5() -> ColumnFilter {
        ColumnFilter::new(ColumnId(0), SargSequence::point(Datum::Int(5)))
    }

    #[test]
    fn test_shape_never_moves_back() {
        assert_eq!(PlanShape::IndexOnly.advance(PlanShape::FullScan), PlanShape::IndexOnly);
        assert_eq!(PlanShape::FullScan.advance(PlanShape::IndexFiltered), PlanShape::IndexFiltered);
    }

    #[test]
    fn test_index_filtered_plan() {
        let stats = stats();
        let config = PlannerConfig::default();
        let request = ScanRequest::new(schema(), vec![a_equals_5()], vec![Projected::Column(ColumnId(1))]);
        let plan = BitmapPlanComposer::new(&stats, &config).compose(&request).unwrap();

        assert_eq!(plan.shape, PlanShape::IndexFiltered);
        assert!(plan.fallback.is_none());
        assert_eq!(plan.graph.count(|k| matches!(k, OperatorKind::Minus)), 1);
        assert!(matches!(
            plan.graph.node(plan.root).kind,
            OperatorKind::Scan {
                mode: ScanMode::FetchRids,
                ..
            }
        ));
    }

    #[test]
    fn test_index_only_when_projection_covered() {
        let stats = stats();
        let config = PlannerConfig::default();
        let request = ScanRequest::new(schema(), vec![a_equals_5()], vec![Projected::Column(ColumnId(0))]);
        let plan = BitmapPlanComposer::new(&stats, &config).compose(&request).unwrap();
        assert_eq!(plan.shape, PlanShape::IndexOnly);

        let blocked = request.with_residual_predicate();
        let plan = BitmapPlanComposer::new(&stats, &config).compose(&blocked).unwrap();
        assert_eq!(plan.shape, PlanShape::IndexFiltered);
    }

    #[test]
    fn test_no_deleted_rows_skips_minus() {
        let stats = stats();
        stats.set_deleted_row_count(TableId(1), 0);
        let config = PlannerConfig::default();
        let request = ScanRequest::new(schema(), vec![a_equals_5()], vec![Projected::Column(ColumnId(1))]);
        let plan = BitmapPlanComposer::new(&stats, &config).compose(&request).unwrap();
        assert_eq!(plan.graph.count(|k| matches!(k, OperatorKind::Minus)), 0);
    }

    #[test]
    fn test_malformed_assignment_falls_back() {
        let stats = stats();
        let config = PlannerConfig::default();
        let request = ScanRequest::new(schema(), vec![a_equals_5()], vec![Projected::Column(ColumnId(1))]);

        let mut matched = BTreeMap::new();
        matched.insert(StorageId(10), 1);
        let selection = SelectionResult {
            assignment: Assignment::from_parts(BTreeMap::new(), matched),
            indexes: stats.indexes(TableId(1)),
            filters: FilterLists::partition(&request.filters),
            cost: None,
            method: SelectionMethod::CostBased,
            nodes_visited: 0,
            budget_exhausted: false,
        };
        let plan = BitmapPlanComposer::new(&stats, &config).compose_with(&request, selection).unwrap();

        assert_eq!(plan.shape, PlanShape::FullScan);
        assert!(matches!(plan.fallback, Some(ComposeError::MalformedAssignment(_))));
        assert_eq!(plan.residual.len(), 1);
        assert_eq!(plan.graph.count(|k| matches!(k, OperatorKind::Search { .. })), 1);
    }

    #[test]
    fn test_missing_deletion_index_falls_back() {
        let stats = StatisticsCollector::new();
        let config = PlannerConfig::default();
        let request = ScanRequest::new(schema(), vec![a_equals_5()], vec![Projected::Column(ColumnId(1))]);
        let plan = BitmapPlanComposer::new(&stats, &config).compose(&request).unwrap();

        assert_eq!(plan.fallback, Some(ComposeError::MissingDeletionIndex(TableId(1))));
        assert!(matches!(
            plan.graph.node(plan.root).kind,
            OperatorKind::Scan {
                mode: ScanMode::Full,
                ..
            }
        ));
    }
}
