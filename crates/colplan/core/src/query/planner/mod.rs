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

//! Index Selection
//!
//! Maps column filters onto the key prefixes of secondary bitmap indexes.
//! The cost-based selector searches every assignment that respects the
//! prefix invariant; when table statistics are missing a longest-match rule
//! is used instead. Semi-join probing has its own greedy and cost-based
//! variants.

pub mod assignment;
pub mod cost_model;
pub mod index_selector;
pub mod rule_based;
pub mod semi_join;

use thiserror::Error;

pub use assignment::{Assignment, CandidateIndex};
pub use cost_model::{CostBreakdown, CostModel, TableCostStats};
pub use index_selector::{IndexSelector, SelectionMethod, SelectionResult};
pub use rule_based::select_by_rule;
pub use semi_join::{SemiJoinInput, SemiJoinMatch, find_semi_join_index, find_semi_join_index_by_cost, pick_min_pages};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SelectorError {
    #[error("Index selection cancelled")]
    Cancelled,
    #[error("Missing metadata: {0}")]
    MissingMetadata(String),
    #[error("Malformed assignment: {0}")]
    MalformedAssignment(String),
}

pub type SelectorResult<T> = Result<T, SelectorError>;
