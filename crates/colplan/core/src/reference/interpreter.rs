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

use colplan_common::{Datum, Directive, Rid, StorageId};
use petgraph::graph::NodeIndex;
use roaring::RoaringTreemap;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use tracing::trace;

use super::store::MemoryTable;
use super::{EvalError, EvalResult, Stream};
use crate::graph::{
    BarrierMode, Edge, MergeMode, OperatorGraph, OperatorKind, OperatorNode, ParamId, Projected, Row, RowFilter, ScanMode, SearchBound, SearchInput, SearchKeys,
    SortKey, TupleShape, ValuesRelation,
};
use crate::mutation::{MutationOutcome, MutationPipeline};

/// Rows touched while evaluating one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counters {
    pub appended: u64,
    /// Rows tombstoned because they violated a unique index.
    pub violations: u64,
    /// Rows tombstoned by delete splicers.
    pub deleted: u64,
}

/// Evaluates operator graphs against one [`MemoryTable`].
pub struct Evaluator<'t> {
    table: &'t mut MemoryTable,
    outputs: HashMap<NodeIndex, Stream>,
    violations: HashMap<NodeIndex, Vec<Rid>>,
    params: HashMap<ParamId, u64>,
    appended: HashMap<NodeIndex, Vec<Rid>>,
    last_appended: Vec<Rid>,
    counters: Counters,
}

fn prefix_cmp(key: &[Datum], bound: &SearchBound) -> Ordering {
    let len = bound.key.len().min(key.len());
    key[..len].cmp(&bound.key[..len])
}

fn above_lower(key: &[Datum], bound: &SearchBound) -> bool {
    match bound.directive {
        Directive::Unbounded => true,
        Directive::Closed => prefix_cmp(key, bound) != Ordering::Less,
        Directive::Open => prefix_cmp(key, bound) == Ordering::Greater,
    }
}

fn below_upper(key: &[Datum], bound: &SearchBound) -> bool {
    match bound.directive {
        Directive::Unbounded => true,
        Directive::Closed => prefix_cmp(key, bound) != Ordering::Greater,
        Directive::Open => prefix_cmp(key, bound) == Ordering::Less,
    }
}

fn key_matches(key: &[Datum], keys: &SearchKeys) -> bool {
    match keys {
        SearchKeys::Exact(tuples) => tuples.iter().any(|t| key.len() >= t.len() && key[..t.len()] == t[..]),
        SearchKeys::Bounded(ranges) => ranges.iter().any(|r| above_lower(key, &r.lower) && below_upper(key, &r.upper)),
    }
}

impl<'t> Evaluator<'t> {
    pub fn new(table: &'t mut MemoryTable) -> Self {
        Self {
            table,
            outputs: HashMap::new(),
            violations: HashMap::new(),
            params: HashMap::new(),
            appended: HashMap::new(),
            last_appended: Vec::new(),
            counters: Counters::default(),
        }
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn param(&self, param: ParamId) -> Option<u64> {
        self.params.get(&param).copied()
    }

    pub fn output(&self, idx: NodeIndex) -> Option<&Stream> {
        self.outputs.get(&idx)
    }

    pub fn rows(&self, idx: NodeIndex) -> EvalResult<&[Row]> {
        match self.outputs.get(&idx) {
            Some(Stream::Rows(rows)) => Ok(rows),
            _ => Err(EvalError::UnexpectedInput {
                node: idx.index(),
                expected: "rows",
            }),
        }
    }

    pub fn outcome(&self, pipeline: &MutationPipeline) -> MutationOutcome {
        MutationOutcome::new(self.param(pipeline.row_count).unwrap_or(0), self.counters.violations)
    }

    /// Ready nodes run lowest index first, so independent branches execute
    /// in construction order.
    fn schedule(graph: &OperatorGraph) -> EvalResult<Vec<NodeIndex>> {
        graph.finish()?;
        let mut pending: HashMap<NodeIndex, usize> = graph.nodes().map(|(idx, _)| (idx, graph.inputs(idx).len())).collect();
        let mut ready: BinaryHeap<Reverse<NodeIndex>> = pending.iter().filter(|(_, n)| **n == 0).map(|(idx, _)| Reverse(*idx)).collect();
        let mut order = Vec::with_capacity(pending.len());
        while let Some(Reverse(idx)) = ready.pop() {
            order.push(idx);
            for (consumer, _) in graph.outputs(idx) {
                if let Some(count) = pending.get_mut(&consumer) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(Reverse(consumer));
                    }
                }
            }
        }
        Ok(order)
    }

    pub fn run(&mut self, graph: &OperatorGraph) -> EvalResult<()> {
        for idx in Self::schedule(graph)? {
            let node = graph.node(idx);
            let inputs = self.gather(graph, idx);
            let output = self.eval(idx, node, inputs)?;
            trace!("Evaluated #{} {} -> {}", idx.index(), node.kind, output.kind());
            for param in &node.writes {
                if let Stream::Count(n) = &output {
                    self.params.insert(*param, *n);
                }
            }
            self.outputs.insert(idx, output);
        }
        Ok(())
    }

    fn gather(&self, graph: &OperatorGraph, idx: NodeIndex) -> Vec<(NodeIndex, Stream)> {
        graph
            .inputs(idx)
            .into_iter()
            .filter_map(|(source, edge)| {
                let stream = match edge {
                    Edge::Data => self.outputs.get(&source).cloned(),
                    Edge::Violation => Some(Stream::Violations(self.violations.get(&source).cloned().unwrap_or_default())),
                };
                stream.map(|s| (source, s))
            })
            .collect()
    }

    fn eval(&mut self, idx: NodeIndex, node: &OperatorNode, inputs: Vec<(NodeIndex, Stream)>) -> EvalResult<Stream> {
        let at = idx.index();
        let unexpected = |expected| EvalError::UnexpectedInput { node: at, expected };
        let mut streams = inputs.into_iter();

        match &node.kind {
            OperatorKind::Values(ValuesRelation::Keys(keys)) => Ok(Stream::Keys(keys.clone())),
            OperatorKind::Values(ValuesRelation::Interval { column, sarg }) => Ok(Stream::Interval {
                column: *column,
                sarg: sarg.clone(),
            }),
            OperatorKind::Values(ValuesRelation::Rows(rows)) => Ok(Stream::Rows(rows.clone())),

            OperatorKind::Search { index, input, output_keys } => self.search(at, *index, *input, *output_keys, streams.next().map(|(_, s)| s)),

            OperatorKind::Intersect => {
                let mut acc: Option<RoaringTreemap> = None;
                for (_, stream) in streams {
                    let bitmap = Self::flatten(stream).ok_or_else(|| unexpected("bitmap"))?;
                    acc = Some(match acc {
                        Some(prev) => prev & bitmap,
                        None => bitmap,
                    });
                }
                Ok(Stream::Bitmap(acc.unwrap_or_default()))
            }
            OperatorKind::Minus => {
                let (_, first) = streams.next().ok_or(EvalError::MissingInput(at))?;
                let mut subtract = RoaringTreemap::new();
                for (_, stream) in streams {
                    subtract |= Self::flatten(stream).ok_or_else(|| unexpected("bitmap"))?;
                }
                match first {
                    Stream::Bitmap(bitmap) => Ok(Stream::Bitmap(bitmap - subtract)),
                    Stream::Entries(entries) => Ok(Stream::Entries(
                        entries
                            .into_iter()
                            .map(|(key, bitmap)| (key, bitmap - &subtract))
                            .filter(|(_, bitmap)| !bitmap.is_empty())
                            .collect(),
                    )),
                    _ => Err(unexpected("bitmap")),
                }
            }
            OperatorKind::Normalizer => match streams.next() {
                Some((_, Stream::Entries(entries))) => {
                    let mut rows: Vec<Row> = entries
                        .into_iter()
                        .flat_map(|(key, bitmap)| bitmap.into_iter().map(move |rid| Row::with_rid(Rid(rid), key.clone())))
                        .collect();
                    rows.sort_by_key(|r| r.rid);
                    Ok(Stream::Rows(rows))
                }
                _ => Err(unexpected("entries")),
            },
            OperatorKind::Project { fields, keep_rid } => match streams.next() {
                Some((_, Stream::Rows(rows))) => {
                    let mut projected = Vec::with_capacity(rows.len());
                    for row in rows {
                        let mut values = Vec::with_capacity(fields.len());
                        for field in fields {
                            values.push(row.values.get(*field).cloned().ok_or_else(|| unexpected("wider rows"))?);
                        }
                        projected.push(Row {
                            rid: if *keep_rid { row.rid } else { None },
                            values,
                        });
                    }
                    Ok(Stream::Rows(projected))
                }
                _ => Err(unexpected("rows")),
            },
            OperatorKind::Scan { mode, projection, .. } => self.scan(at, *mode, projection, streams.map(|(_, s)| s).collect()),

            OperatorKind::Sort(SortKey::Rid) => match streams.next().map(|(_, s)| s) {
                Some(Stream::Rows(mut rows)) => {
                    rows.sort_by_key(|r| r.rid);
                    Ok(Stream::Rows(rows))
                }
                Some(Stream::Violations(mut rids)) => {
                    rids.sort();
                    Ok(Stream::Violations(rids))
                }
                Some(Stream::Entries(mut entries)) => {
                    entries.sort_by_key(|(_, bitmap)| bitmap.min());
                    Ok(Stream::Entries(entries))
                }
                Some(bitmap @ Stream::Bitmap(_)) => Ok(bitmap),
                _ => Err(unexpected("rows, violations or bitmaps")),
            },
            OperatorKind::Sort(SortKey::KeyThenRid(_)) => match streams.next() {
                Some((_, Stream::IndexEntries(mut entries))) => {
                    entries.sort();
                    Ok(Stream::IndexEntries(entries))
                }
                _ => Err(unexpected("index entries")),
            },

            OperatorKind::Chopper { .. } | OperatorKind::Splitter | OperatorKind::Buffer => {
                streams.next().map(|(_, s)| s).ok_or(EvalError::MissingInput(at))
            }
            OperatorKind::Merge(MergeMode::Bitmap) => {
                let mut streams: Vec<Stream> = streams.map(|(_, s)| s).collect();
                if streams.len() == 1 {
                    return streams.pop().ok_or(EvalError::MissingInput(at));
                }
                let mut merged = RoaringTreemap::new();
                for stream in streams {
                    merged |= Self::flatten(stream).ok_or_else(|| unexpected("bitmap"))?;
                }
                Ok(Stream::Bitmap(merged))
            }
            OperatorKind::Merge(MergeMode::Sequential | MergeMode::Union) => {
                let mut rows = Vec::new();
                let mut rids = Vec::new();
                for (_, stream) in streams {
                    match stream {
                        Stream::Rows(r) => rows.extend(r),
                        Stream::Violations(v) => rids.extend(v),
                        _ => return Err(unexpected("rows or violations")),
                    }
                }
                if matches!(node.output, TupleShape::Violation) {
                    Ok(Stream::Violations(rids))
                } else {
                    Ok(Stream::Rows(rows))
                }
            }
            OperatorKind::Filter(filter) => match streams.next() {
                Some((_, Stream::Rows(rows))) => {
                    let keep_null = matches!(filter, RowFilter::RidNull);
                    Ok(Stream::Rows(rows.into_iter().filter(|r| r.rid.is_none() == keep_null).collect()))
                }
                _ => Err(unexpected("rows")),
            },
            OperatorKind::Distinct => match streams.next() {
                Some((_, Stream::Violations(mut rids))) => {
                    rids.dedup();
                    Ok(Stream::Violations(rids))
                }
                Some((_, Stream::Rows(mut rows))) => {
                    rows.dedup();
                    Ok(Stream::Rows(rows))
                }
                _ => Err(unexpected("violations or rows")),
            },

            OperatorKind::Append { .. } => {
                let (source, stream) = streams.next().ok_or(EvalError::MissingInput(at))?;
                let Stream::Rows(rows) = stream else {
                    return Err(unexpected("rows"));
                };
                self.append(source, rows)
            }
            OperatorKind::Generator { key_columns, .. } => {
                let mut entries = Vec::with_capacity(self.last_appended.len());
                for rid in &self.last_appended {
                    let mut key = Vec::with_capacity(key_columns.len());
                    for column in key_columns {
                        key.push(self.table.column_value(*rid, *column)?.cloned().unwrap_or(Datum::Null));
                    }
                    entries.push((key, *rid));
                }
                Ok(Stream::IndexEntries(entries))
            }
            OperatorKind::Splicer { index, ignore_duplicates, .. } => {
                let (_, stream) = streams.next().ok_or(EvalError::MissingInput(at))?;
                self.splice(idx, *index, *ignore_duplicates, stream)
            }
            OperatorKind::Barrier(mode) => {
                if let Some(param) = node.reads.first() {
                    return Ok(Stream::Count(self.param(*param).unwrap_or(0)));
                }
                let counts: Vec<u64> = streams
                    .filter_map(|(_, s)| match s {
                        Stream::Count(n) => Some(n),
                        _ => None,
                    })
                    .collect();
                Ok(Stream::Count(match mode {
                    BarrierMode::ReturnAny => counts.first().copied().unwrap_or(0),
                    BarrierMode::ReturnAll => counts.iter().sum(),
                }))
            }
        }
    }

    fn flatten(stream: Stream) -> Option<RoaringTreemap> {
        match stream {
            Stream::Bitmap(bitmap) => Some(bitmap),
            Stream::Entries(entries) => Some(entries.into_iter().fold(RoaringTreemap::new(), |acc, (_, b)| acc | b)),
            _ => None,
        }
    }

    fn search(&self, at: usize, index: StorageId, input: SearchInput, output_keys: bool, keys: Option<Stream>) -> EvalResult<Stream> {
        if index == self.table.deletion_index().id {
            return Ok(Stream::Bitmap(self.table.deletion_handle().snapshot()));
        }
        let entries = self.table.index_entries(index)?;
        let keys = match (input, keys) {
            (SearchInput::Keys, Some(Stream::Keys(keys))) => Some(keys),
            (SearchInput::Keys, _) => {
                return Err(EvalError::UnexpectedInput { node: at, expected: "search keys" });
            }
            _ => None,
        };
        let matching = entries.iter().filter(|(key, _)| keys.as_ref().is_none_or(|k| key_matches(key, k)));
        if output_keys {
            Ok(Stream::Entries(matching.map(|(k, b)| (k.clone(), b.clone())).collect()))
        } else {
            Ok(Stream::Bitmap(matching.fold(RoaringTreemap::new(), |acc, (_, b)| acc | b)))
        }
    }

    fn scan(&self, at: usize, mode: ScanMode, projection: &[Projected], inputs: Vec<Stream>) -> EvalResult<Stream> {
        let mut inputs = inputs.into_iter();
        let rid_filter = match mode {
            ScanMode::Full => None,
            ScanMode::SkipDeleted | ScanMode::FetchRids => {
                let first = inputs.next().ok_or(EvalError::MissingInput(at))?;
                Some(Self::flatten(first).ok_or(EvalError::UnexpectedInput { node: at, expected: "bitmap" })?)
            }
        };
        let mut residual = Vec::new();
        for stream in inputs {
            match stream {
                Stream::Interval { column, sarg } => residual.push((column, sarg)),
                _ => return Err(EvalError::UnexpectedInput { node: at, expected: "interval" }),
            }
        }
        for (column, _) in &residual {
            if self.table.schema().column(*column).is_none() {
                return Err(EvalError::UnknownColumn(*column));
            }
        }

        let with_rid = projection.contains(&Projected::Rid);
        let mut rows = Vec::new();
        for (rid, values) in self.table.rows() {
            let admitted = match (&rid_filter, mode) {
                (Some(bitmap), ScanMode::SkipDeleted) => !bitmap.contains(rid.0),
                (Some(bitmap), _) => bitmap.contains(rid.0),
                (None, _) => true,
            };
            if !admitted || !residual.iter().all(|(column, sarg)| sarg.contains(&values[column.index()])) {
                continue;
            }
            let mut projected = Vec::with_capacity(projection.len());
            for p in projection {
                if let Projected::Column(column) = p {
                    projected.push(values.get(column.index()).cloned().ok_or(EvalError::UnknownColumn(*column))?);
                }
            }
            rows.push(Row {
                rid: with_rid.then_some(rid),
                values: projected,
            });
        }
        Ok(Stream::Rows(rows))
    }

    /// Stores the rows once per statement; every append fed by the same
    /// producer shares the RIDs allocated for them.
    fn append(&mut self, source: NodeIndex, rows: Vec<Row>) -> EvalResult<Stream> {
        if let Some(rids) = self.appended.get(&source) {
            return Ok(Stream::Count(rids.len() as u64));
        }
        let mut rids = Vec::with_capacity(rows.len());
        for row in rows {
            rids.push(self.table.append(row.values)?);
        }
        self.counters.appended += rids.len() as u64;
        let count = rids.len() as u64;
        self.last_appended = rids.clone();
        self.appended.insert(source, rids);
        Ok(Stream::Count(count))
    }

    fn splice(&mut self, idx: NodeIndex, index: StorageId, ignore_duplicates: bool, stream: Stream) -> EvalResult<Stream> {
        if index == self.table.deletion_index().id {
            let (rids, from_violations): (Vec<Rid>, bool) = match stream {
                Stream::Rows(rows) => (rows.into_iter().filter_map(|r| r.rid).collect(), false),
                Stream::Violations(rids) => (rids, true),
                _ => {
                    return Err(EvalError::UnexpectedInput {
                        node: idx.index(),
                        expected: "rows or violations",
                    });
                }
            };
            let mut spliced = 0;
            for rid in rids {
                if self.table.delete(rid) {
                    spliced += 1;
                } else if !ignore_duplicates {
                    trace!("Splicer #{} found {} already deleted", idx.index(), rid);
                }
            }
            if from_violations {
                self.counters.violations += spliced;
            } else {
                self.counters.deleted += spliced;
            }
            return Ok(Stream::Count(spliced));
        }

        let Stream::IndexEntries(entries) = stream else {
            return Err(EvalError::UnexpectedInput {
                node: idx.index(),
                expected: "index entries",
            });
        };
        let mut spliced = 0;
        let mut violations = Vec::new();
        for (key, rid) in entries {
            if self.table.splice(index, key, rid)? {
                spliced += 1;
            } else {
                violations.push(rid);
            }
        }
        if !violations.is_empty() {
            trace!("Splicer #{} on {} rejected {} rows", idx.index(), index, violations.len());
        }
        self.violations.insert(idx, violations);
        Ok(Stream::Count(spliced))
    }
}
