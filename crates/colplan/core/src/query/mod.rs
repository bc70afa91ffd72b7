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

//! # Read path planning
//!
//! ## Modules
//!
//! - `planner`: index selection by cost, with rule-based and semi-join variants
//! - `composer`: turns a selection into a bitmap operator graph
//!
//! ## Architecture
//!
//! 1. **Selection**: map column filters onto index key prefixes
//! 2. **Composition**: emit search, intersect, minus and merge operators
//! 3. **Hand-off**: the finished graph goes to the execution engine

pub mod composer;
pub mod planner;

pub use composer::{BitmapPlanComposer, ComposeError, ComposedPlan, PlanShape, ScanRequest};
pub use planner::{
    assignment::{Assignment, CandidateIndex},
    cost_model::{CostBreakdown, CostModel, TableCostStats},
    index_selector::{IndexSelector, SelectionMethod, SelectionResult},
    semi_join::{SemiJoinInput, SemiJoinMatch, find_semi_join_index, find_semi_join_index_by_cost, pick_min_pages},
};
