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

//! # Mutation pipelines
//!
//! Insert, delete and upsert operator graphs that keep clustered groups,
//! secondary bitmap indexes and the deletion index consistent.
//!
//! A uniqueness violation does not abort the statement. The offending RID is
//! spliced into the deletion index and counted; the caller decides whether
//! the count is acceptable via [`MutationOutcome::accept`].

pub mod delete;
pub mod insert;
pub mod upsert;

use colplan_common::{SchemaError, SecondaryIndex, TableId, TableSchema};
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cancel::{Cancellation, NeverCancel};
use crate::config::PlannerConfig;
use crate::graph::ParamId;
use crate::statistics::StatisticsFacade;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MutationError {
    #[error("Table {0} has no deletion index")]
    MissingDeletionIndex(TableId),
    #[error("Unknown index column: {0}")]
    UnknownIndexColumn(String),
    #[error("Invalid table layout: {0}")]
    Schema(#[from] SchemaError),
    #[error("Upsert on table {0} has neither an update nor an insert clause")]
    EmptyUpsert(TableId),
    #[error("{violations} uniqueness violations exceed the {allowed} allowed")]
    TooManyViolations { violations: u64, allowed: u64 },
    #[error("Pipeline assembly cancelled")]
    Cancelled,
}

pub type MutationResult<T> = Result<T, MutationError>;

/// Caller-visible result of a mutation statement. Violations travel through
/// the same channel as the affected row count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MutationOutcome {
    pub rows_affected: u64,
    /// Rows redirected to the deletion index by uniqueness conflicts.
    pub violations: u64,
}

impl MutationOutcome {
    pub fn new(rows_affected: u64, violations: u64) -> Self {
        Self { rows_affected, violations }
    }

    pub fn is_clean(&self) -> bool {
        self.violations == 0
    }

    pub fn accept(self, allowed: u64) -> MutationResult<Self> {
        if self.violations > allowed {
            return Err(MutationError::TooManyViolations {
                violations: self.violations,
                allowed,
            });
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertRequest {
    pub schema: TableSchema,
    /// The statement also reads the target table.
    #[serde(default)]
    pub target_is_source: bool,
    #[serde(default)]
    pub estimated_rows: Option<f64>,
}

impl InsertRequest {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            target_is_source: false,
            estimated_rows: None,
        }
    }

    pub fn reading_target(mut self) -> Self {
        self.target_is_source = true;
        self
    }

    pub fn with_estimated_rows(mut self, rows: f64) -> Self {
        self.estimated_rows = Some(rows);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub table: TableId,
    /// Input RIDs already arrive in ascending order.
    #[serde(default)]
    pub rid_ordered: bool,
}

impl DeleteRequest {
    pub fn new(table: TableId) -> Self {
        Self { table, rid_ordered: false }
    }

    pub fn rid_ordered(mut self) -> Self {
        self.rid_ordered = true;
        self
    }
}

/// Input rows carry the target RID for updates and no RID for inserts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertRequest {
    pub schema: TableSchema,
    pub has_update: bool,
    pub has_insert: bool,
    #[serde(default)]
    pub estimated_rows: Option<f64>,
}

impl UpsertRequest {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            has_update: true,
            has_insert: true,
            estimated_rows: None,
        }
    }

    pub fn update_only(mut self) -> Self {
        self.has_insert = false;
        self
    }

    pub fn insert_only(mut self) -> Self {
        self.has_update = false;
        self
    }
}

/// A pipeline appended to a graph.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationPipeline {
    /// The barrier releasing the statement's result.
    pub root: NodeIndex,
    /// Parameter carrying the affected row count.
    pub row_count: ParamId,
    pub unique_indexes: usize,
    /// Expected uniqueness violations, when unique indexes exist and the
    /// input size is known.
    pub estimated_violations: Option<f64>,
}

pub struct MutationPipelineBuilder<'a> {
    facade: &'a dyn StatisticsFacade,
    config: &'a PlannerConfig,
    cancel: &'a dyn Cancellation,
}

impl<'a> MutationPipelineBuilder<'a> {
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

    fn check_cancelled(&self) -> MutationResult<()> {
        if self.cancel.is_cancelled() {
            return Err(MutationError::Cancelled);
        }
        Ok(())
    }

    fn deletion_index(&self, table: TableId) -> MutationResult<SecondaryIndex> {
        self.facade.deletion_index(table).ok_or(MutationError::MissingDeletionIndex(table))
    }

    /// Secondary indexes of the target, in id order, checked against its layout.
    fn secondary_indexes(&self, schema: &TableSchema) -> MutationResult<Vec<SecondaryIndex>> {
        let mut indexes: Vec<SecondaryIndex> = self.facade.indexes(schema.id).into_iter().filter(|i| !i.is_deletion()).collect();
        indexes.sort_by_key(|i| i.id);
        for index in &indexes {
            schema.check_index(index).map_err(|e| MutationError::UnknownIndexColumn(e.to_string()))?;
        }
        Ok(indexes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_accept() {
        let outcome = MutationOutcome::new(2, 1);
        assert!(!outcome.is_clean());
        assert_eq!(outcome.accept(1), Ok(outcome));
        assert_eq!(
            outcome.accept(0),
            Err(MutationError::TooManyViolations {
                violations: 1,
                allowed: 0
            })
        );
    }
}
