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

//! # Column-store access path and mutation pipeline planner
//!
//! Given a table's physical layout (clustered column groups, unclustered
//! bitmap indexes and the per-table deletion index) this crate decides how a
//! scan should use the indexes and assembles the resulting operator graph.
//!
//! ## Modules
//!
//! - `statistics`: the statistics facade and an in-memory collector
//! - `predicate`: turns filter expressions into column filters plus a residual
//! - `query::planner`: cost model, cost-based and rule-based index selection, semi-join probing
//! - `query::composer`: bitmap plan composition (search, intersect, minus, merge, normalize)
//! - `mutation`: insert, delete and upsert pipelines
//! - `graph`: the operator graph handed to the execution engine
//! - `reference`: an in-memory evaluator for operator graphs, used by tests and the CLI
//!
//! ## Flow
//!
//! 1. **Extract**: split a filter into sargable column filters and a residual
//! 2. **Select**: choose indexes and matched key prefixes by estimated cost
//! 3. **Compose**: build the bitmap operator graph for the chosen shape

pub mod cancel;
pub mod config;
pub mod error;
pub mod graph;
pub mod mutation;
pub mod predicate;
pub mod query;
pub mod reference;
pub mod statistics;

pub use cancel::{CancelFlag, Cancellation, NeverCancel};
pub use config::{ConfigError, CostConfig, PlannerConfig};
pub use error::{Error, Result};
pub use graph::{Edge, GraphError, OperatorGraph, OperatorKind, OperatorNode, ParamId, TupleShape};
pub use mutation::{DeleteRequest, InsertRequest, MutationError, MutationOutcome, MutationPipelineBuilder, UpsertRequest};
pub use predicate::{ConjunctiveExtractor, Extracted, FilterExpr, PredicateExtractor};
pub use query::composer::{BitmapPlanComposer, ComposeError, ComposedPlan, PlanShape, Projected, ScanRequest};
pub use query::planner::{Assignment, CandidateIndex, IndexSelector, SelectionResult, SelectorError};
pub use statistics::{ColumnStats, StatisticsCollector, StatisticsFacade, StatisticsSnapshot};
