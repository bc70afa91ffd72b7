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

//! Shared data model for the column-store planner.
//!
//! Everything in this crate is a read-only snapshot handed to the planner for a
//! single planning attempt: table schemas with their clustered column groups,
//! secondary bitmap indexes (including the per-table deletion index), sarg
//! interval predicates and the column filters built from them.

pub mod datum;
pub mod filter;
pub mod ids;
pub mod index;
pub mod sarg;
pub mod schema;

pub use datum::Datum;
pub use filter::{ColumnFilter, FilterLists};
pub use ids::{ColumnId, Rid, StorageId, TableId};
pub use index::{IndexKind, PayloadField, SecondaryIndex};
pub use sarg::{Directive, Endpoint, SargInterval, SargSequence};
pub use schema::{ClusteredGroup, Column, ColumnType, SchemaError, TableSchema};
