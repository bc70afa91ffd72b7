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

//! In-memory reference evaluator.
//!
//! Runs operator graphs against a [`MemoryTable`] so planned access paths and
//! mutation pipelines can be checked end to end. It favours clarity over
//! speed: flow-control parameters other than row counts are ignored and
//! every stream is fully materialized.

pub mod interpreter;
pub mod store;

use colplan_common::{ColumnId, Datum, Rid, SargSequence, StorageId};
use roaring::RoaringTreemap;
use thiserror::Error;

use crate::graph::{GraphError, Row, SearchKeys};

pub use interpreter::{Counters, Evaluator};
pub use store::{DeletionIndexHandle, MemoryTable};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("Node {node}: expected {expected} input")]
    UnexpectedInput { node: usize, expected: &'static str },
    #[error("Node {0} has no input")]
    MissingInput(usize),
    #[error("Unknown storage {0}")]
    UnknownStorage(StorageId),
    #[error("Unknown column {0}")]
    UnknownColumn(ColumnId),
    #[error("Row has {actual} values, table has {expected} columns")]
    RowWidth { expected: usize, actual: usize },
}

pub type EvalResult<T> = Result<T, EvalError>;

/// Materialized output of one operator.
#[derive(Debug, Clone, PartialEq)]
pub enum Stream {
    Keys(SearchKeys),
    Interval { column: ColumnId, sarg: SargSequence },
    Bitmap(RoaringTreemap),
    /// Bitmap entries that kept their index keys.
    Entries(Vec<(Vec<Datum>, RoaringTreemap)>),
    Rows(Vec<Row>),
    IndexEntries(Vec<(Vec<Datum>, Rid)>),
    Count(u64),
    Violations(Vec<Rid>),
}

impl Stream {
    pub fn kind(&self) -> &'static str {
        match self {
            Stream::Keys(_) => "keys",
            Stream::Interval { .. } => "interval",
            Stream::Bitmap(_) => "bitmap",
            Stream::Entries(_) => "entries",
            Stream::Rows(_) => "rows",
            Stream::IndexEntries(_) => "index entries",
            Stream::Count(_) => "count",
            Stream::Violations(_) => "violations",
        }
    }
}
