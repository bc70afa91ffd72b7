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

//! Operator vocabulary shared by the read path and the mutation pipelines.

use colplan_common::{ColumnId, Datum, Directive, Rid, SargSequence, StorageId, TableId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dynamic flow-control parameter passed from a consumer back to a producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParamId(pub u32);

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?p{}", self.0)
    }
}

/// Shape of the tuples flowing over an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TupleShape {
    /// Search key tuples, exact or with per-bound directives.
    SearchKey { width: usize },
    /// A residual filter relation of intervals on one column.
    Interval,
    /// `[key…, startRID, bitmapDescriptor, bitmapSegment]`
    Bitmap { keys: usize },
    Row { width: usize, rid: bool },
    /// `[key…, RID]` produced when rebuilding index keys.
    IndexEntry { keys: usize },
    RowCount,
    /// `[RID, error payload]`
    Violation,
}

impl fmt::Display for TupleShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TupleShape::SearchKey { width } => write!(f, "key({width})"),
            TupleShape::Interval => write!(f, "interval"),
            TupleShape::Bitmap { keys } => write!(f, "bitmap({keys})"),
            TupleShape::Row { width, rid } => write!(f, "row({width}{})", if *rid { "+rid" } else { "" }),
            TupleShape::IndexEntry { keys } => write!(f, "entry({keys})"),
            TupleShape::RowCount => write!(f, "count"),
            TupleShape::Violation => write!(f, "violation"),
        }
    }
}

/// A row flowing through a pipeline. `rid` is the target row for updates and
/// deletes, or the row a scan read it from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Row {
    #[serde(default)]
    pub rid: Option<Rid>,
    pub values: Vec<Datum>,
}

impl Row {
    pub fn new(values: Vec<Datum>) -> Self {
        Self { rid: None, values }
    }

    pub fn with_rid(rid: Rid, values: Vec<Datum>) -> Self {
        Self { rid: Some(rid), values }
    }
}

/// One bound of a key range. `key` may be shorter than the index key; it is
/// compared against the same-length prefix of each entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchBound {
    pub directive: Directive,
    pub key: Vec<Datum>,
}

impl fmt::Display for SearchBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key: Vec<String> = self.key.iter().map(|d| d.to_string()).collect();
        match self.directive {
            Directive::Unbounded => write!(f, "*"),
            Directive::Closed => write!(f, "={}", key.join(",")),
            Directive::Open => write!(f, "~{}", key.join(",")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyRange {
    pub lower: SearchBound,
    pub upper: SearchBound,
}

/// Keys driving an index search.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchKeys {
    /// Full-width prefix tuples compared for equality.
    Exact(Vec<Vec<Datum>>),
    Bounded(Vec<KeyRange>),
}

impl SearchKeys {
    pub fn width(&self) -> usize {
        match self {
            SearchKeys::Exact(tuples) => tuples.first().map(Vec::len).unwrap_or(0),
            SearchKeys::Bounded(ranges) => ranges.iter().map(|r| r.lower.key.len().max(r.upper.key.len())).max().unwrap_or(0),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SearchKeys::Exact(tuples) => tuples.len(),
            SearchKeys::Bounded(ranges) => ranges.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_bounded(&self) -> bool {
        matches!(self, SearchKeys::Bounded(_))
    }
}

impl fmt::Display for SearchKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchKeys::Exact(tuples) => {
                let rendered: Vec<String> = tuples
                    .iter()
                    .map(|t| format!("({})", t.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ")))
                    .collect();
                write!(f, "exact {}", rendered.join(" "))
            }
            SearchKeys::Bounded(ranges) => {
                let rendered: Vec<String> = ranges.iter().map(|r| format!("[{} .. {}]", r.lower, r.upper)).collect();
                write!(f, "bounded {}", rendered.join(" "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValuesRelation {
    Keys(SearchKeys),
    Interval { column: ColumnId, sarg: SargSequence },
    Rows(Vec<Row>),
}

/// Where a search takes its keys from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchInput {
    /// Keys come from the upstream values relation.
    Keys,
    /// Whole index, lower bound unbounded.
    FullScan,
    /// Whole index from a lower bound `Closed` on the start-RID parameter.
    FromStartRid(ParamId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanMode {
    /// Every row; nothing to skip.
    Full,
    /// Every row except those in the first (deletion bitmap) input.
    SkipDeleted,
    /// Only rows in the first (filtered bitmap) input.
    FetchRids,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Projected {
    Column(ColumnId),
    Rid,
}

impl fmt::Display for Projected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Projected::Column(c) => write!(f, "{c}"),
            Projected::Rid => write!(f, "rid"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeMode {
    /// Coalesces RID-ordered bitmap fragments of one index.
    Bitmap,
    /// Emits inputs one after another, in input order.
    Sequential,
    /// Unordered union of row streams.
    Union,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortKey {
    Rid,
    /// Index key columns, then RID.
    KeyThenRid(Vec<ColumnId>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarrierMode {
    /// Waits for every input and forwards the first one's result.
    ReturnAny,
    /// Waits for every input and forwards all results.
    ReturnAll,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowFilter {
    RidNotNull,
    RidNull,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperatorKind {
    Values(ValuesRelation),
    Scan {
        table: TableId,
        groups: Vec<StorageId>,
        mode: ScanMode,
        projection: Vec<Projected>,
        residual: Vec<ColumnId>,
    },
    Search {
        index: StorageId,
        input: SearchInput,
        output_keys: bool,
    },
    Intersect,
    /// First input minus every subsequent input.
    Minus,
    Merge(MergeMode),
    Sort(SortKey),
    Chopper {
        row_limit: u64,
    },
    Normalizer,
    Splitter,
    Barrier(BarrierMode),
    Splicer {
        index: StorageId,
        unique: bool,
        ignore_duplicates: bool,
    },
    Project {
        fields: Vec<usize>,
        keep_rid: bool,
    },
    Buffer,
    Append {
        group: StorageId,
        columns: Vec<ColumnId>,
    },
    Generator {
        index: StorageId,
        key_columns: Vec<ColumnId>,
        groups: Vec<StorageId>,
    },
    Filter(RowFilter),
    Distinct,
}

impl OperatorKind {
    pub fn name(&self) -> &'static str {
        match self {
            OperatorKind::Values(_) => "Values",
            OperatorKind::Scan { .. } => "Scan",
            OperatorKind::Search { .. } => "Search",
            OperatorKind::Intersect => "Intersect",
            OperatorKind::Minus => "Minus",
            OperatorKind::Merge(_) => "Merge",
            OperatorKind::Sort(_) => "Sort",
            OperatorKind::Chopper { .. } => "Chopper",
            OperatorKind::Normalizer => "Normalizer",
            OperatorKind::Splitter => "Splitter",
            OperatorKind::Barrier(_) => "Barrier",
            OperatorKind::Splicer { .. } => "Splicer",
            OperatorKind::Project { .. } => "Project",
            OperatorKind::Buffer => "Buffer",
            OperatorKind::Append { .. } => "Append",
            OperatorKind::Generator { .. } => "Generator",
            OperatorKind::Filter(_) => "Filter",
            OperatorKind::Distinct => "Distinct",
        }
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatorKind::Values(ValuesRelation::Keys(keys)) => write!(f, "Values {keys}"),
            OperatorKind::Values(ValuesRelation::Interval { column, sarg }) => write!(f, "Values {column} in {sarg}"),
            OperatorKind::Values(ValuesRelation::Rows(rows)) => write!(f, "Values rows={}", rows.len()),
            OperatorKind::Scan {
                table,
                groups,
                mode,
                projection,
                residual,
            } => {
                write!(f, "Scan {table} groups=[{}] mode={mode:?} proj=[{}]", join(groups), join(projection))?;
                if !residual.is_empty() {
                    write!(f, " residual=[{}]", join(residual))?;
                }
                Ok(())
            }
            OperatorKind::Search { index, input, output_keys } => {
                write!(f, "Search {index}")?;
                match input {
                    SearchInput::Keys => {}
                    SearchInput::FullScan => write!(f, " lower=(-inf")?,
                    SearchInput::FromStartRid(p) => write!(f, " lower=[{p}")?,
                }
                if *output_keys {
                    write!(f, " keys")?;
                }
                Ok(())
            }
            OperatorKind::Merge(mode) => write!(f, "Merge {mode:?}"),
            OperatorKind::Sort(SortKey::Rid) => write!(f, "Sort rid"),
            OperatorKind::Sort(SortKey::KeyThenRid(cols)) => write!(f, "Sort [{}], rid", join(cols)),
            OperatorKind::Chopper { row_limit } => write!(f, "Chopper limit={row_limit}"),
            OperatorKind::Barrier(mode) => write!(f, "Barrier {mode:?}"),
            OperatorKind::Splicer {
                index,
                unique,
                ignore_duplicates,
            } => {
                write!(f, "Splicer {index}")?;
                if *unique {
                    write!(f, " unique")?;
                }
                if *ignore_duplicates {
                    write!(f, " ignore-dups")?;
                }
                Ok(())
            }
            OperatorKind::Project { fields, keep_rid } => write!(f, "Project [{}]{}", join(fields), if *keep_rid { " +rid" } else { "" }),
            OperatorKind::Append { group, .. } => write!(f, "Append {group}"),
            OperatorKind::Generator { index, groups, .. } => write!(f, "Generator {index} from [{}]", join(groups)),
            OperatorKind::Filter(filter) => write!(f, "Filter {filter:?}"),
            other => write!(f, "{}", other.name()),
        }
    }
}

/// A node of the operator graph. `inputs` is filled in as producers are
/// connected, in connection order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorNode {
    pub kind: OperatorKind,
    pub inputs: Vec<TupleShape>,
    pub output: TupleShape,
    pub reads: Vec<ParamId>,
    pub writes: Vec<ParamId>,
}

impl OperatorNode {
    pub fn new(kind: OperatorKind, output: TupleShape) -> Self {
        Self {
            kind,
            inputs: Vec::new(),
            output,
            reads: Vec::new(),
            writes: Vec::new(),
        }
    }

    pub fn reading(mut self, params: impl IntoIterator<Item = ParamId>) -> Self {
        self.reads.extend(params);
        self
    }

    pub fn writing(mut self, params: impl IntoIterator<Item = ParamId>) -> Self {
        self.writes.extend(params);
        self
    }
}

impl fmt::Display for OperatorNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.kind, self.output)?;
        if !self.reads.is_empty() {
            write!(f, " reads[{}]", join(&self.reads))?;
        }
        if !self.writes.is_empty() {
            write!(f, " writes[{}]", join(&self.writes))?;
        }
        Ok(())
    }
}
