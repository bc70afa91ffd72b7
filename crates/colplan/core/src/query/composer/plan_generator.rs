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

use colplan_common::{ColumnFilter, SecondaryIndex, StorageId, TableSchema};
use petgraph::graph::NodeIndex;
use tracing::debug;

use super::residual::build_residual_values;
use super::search::{FlowParams, build_deletion_search, build_index_search};
use super::{ComposeError, ComposeResult, PlanShape};
use crate::cancel::Cancellation;
use crate::graph::{OperatorGraph, OperatorKind, OperatorNode, Projected, ScanMode, TupleShape};
use crate::query::planner::CandidateIndex;

/// Everything the assembler needs once the plan shape is decided.
pub struct PlanInputs<'p> {
    pub schema: &'p TableSchema,
    pub projection: &'p [Projected],
    pub candidates: &'p [CandidateIndex],
    /// Residual filters in evaluation order.
    pub residual: &'p [ColumnFilter],
    /// `None` when deleted rows need not be subtracted.
    pub deletion: Option<&'p SecondaryIndex>,
    /// Index key positions to project for an index-only plan.
    pub index_fields: Option<&'p [usize]>,
    pub chopper_row_limit: u64,
}

/// Builds the operator graph for `shape`; returns the graph and its root.
pub fn assemble(shape: PlanShape, inputs: &PlanInputs<'_>, cancel: &dyn Cancellation) -> ComposeResult<(OperatorGraph, NodeIndex)> {
    let mut graph = OperatorGraph::new();
    let root = match shape {
        PlanShape::FullScan => full_scan(&mut graph, inputs),
        PlanShape::IndexFiltered => index_filtered(&mut graph, inputs, cancel)?,
        PlanShape::IndexOnly => index_only(&mut graph, inputs, cancel)?,
    };
    debug!("Assembled {:?} plan for table {} with {} operators", shape, inputs.schema.name, graph.node_count());
    Ok((graph, root))
}

fn row_shape(projection: &[Projected]) -> TupleShape {
    TupleShape::Row {
        width: projection.iter().filter(|p| matches!(p, Projected::Column(_))).count(),
        rid: projection.contains(&Projected::Rid),
    }
}

/// Clustered groups holding the projected and residual columns, in schema
/// order. A scan projecting nothing still reads the first group for row
/// existence.
fn scan_groups(schema: &TableSchema, projection: &[Projected], residual: &[ColumnFilter]) -> Vec<StorageId> {
    let needed: Vec<_> = projection
        .iter()
        .filter_map(|p| match p {
            Projected::Column(c) => Some(*c),
            Projected::Rid => None,
        })
        .chain(residual.iter().map(|f| f.column))
        .collect();

    let groups: Vec<StorageId> = schema.groups.iter().filter(|g| g.columns.iter().any(|c| needed.contains(c))).map(|g| g.id).collect();
    if groups.is_empty() {
        return schema.groups.iter().take(1).map(|g| g.id).collect();
    }
    groups
}

fn scan(graph: &mut OperatorGraph, inputs: &PlanInputs<'_>, mode: ScanMode, mut scan_inputs: Vec<NodeIndex>) -> NodeIndex {
    scan_inputs.extend(build_residual_values(graph, inputs.residual));
    let node = OperatorNode::new(
        OperatorKind::Scan {
            table: inputs.schema.id,
            groups: scan_groups(inputs.schema, inputs.projection, inputs.residual),
            mode,
            projection: inputs.projection.to_vec(),
            residual: inputs.residual.iter().map(|f| f.column).collect(),
        },
        row_shape(inputs.projection),
    );
    graph.add_with_inputs(node, &scan_inputs)
}

fn full_scan(graph: &mut OperatorGraph, inputs: &PlanInputs<'_>) -> NodeIndex {
    match inputs.deletion {
        Some(deletion) => {
            let deleted = build_deletion_search(graph, deletion, None);
            scan(graph, inputs, ScanMode::SkipDeleted, vec![deleted])
        }
        None => scan(graph, inputs, ScanMode::Full, Vec::new()),
    }
}

/// Searches every candidate, intersects them when there is more than one,
/// then subtracts the deletion index.
fn filtered_bitmap(graph: &mut OperatorGraph, inputs: &PlanInputs<'_>, output_keys: bool, cancel: &dyn Cancellation) -> ComposeResult<NodeIndex> {
    let minus_params = inputs.deletion.map(|_| FlowParams::allocate(graph));

    let combined = match inputs.candidates {
        [] => return Err(ComposeError::MalformedAssignment("no index selected for an index plan".to_string())),
        [single] => {
            if cancel.is_cancelled() {
                return Err(ComposeError::Cancelled);
            }
            build_index_search(graph, single, inputs.chopper_row_limit, output_keys, minus_params)
        }
        many => {
            let params = FlowParams::allocate(graph);
            let mut branches = Vec::with_capacity(many.len());
            for candidate in many {
                if cancel.is_cancelled() {
                    return Err(ComposeError::Cancelled);
                }
                branches.push(build_index_search(graph, candidate, inputs.chopper_row_limit, false, Some(params)));
            }
            let intersect = OperatorNode::new(OperatorKind::Intersect, TupleShape::Bitmap { keys: 0 })
                .writing(params.ids())
                .reading(minus_params.into_iter().flat_map(FlowParams::ids));
            graph.add_with_inputs(intersect, &branches)
        }
    };

    match (inputs.deletion, minus_params) {
        (Some(deletion), Some(params)) => {
            let deleted = build_deletion_search(graph, deletion, Some(params.start_rid));
            let shape = graph.node(combined).output;
            let minus = OperatorNode::new(OperatorKind::Minus, shape).writing(params.ids());
            Ok(graph.add_with_inputs(minus, &[combined, deleted]))
        }
        _ => Ok(combined),
    }
}

fn index_filtered(graph: &mut OperatorGraph, inputs: &PlanInputs<'_>, cancel: &dyn Cancellation) -> ComposeResult<NodeIndex> {
    let bitmap = filtered_bitmap(graph, inputs, false, cancel)?;
    Ok(scan(graph, inputs, ScanMode::FetchRids, vec![bitmap]))
}

fn index_only(graph: &mut OperatorGraph, inputs: &PlanInputs<'_>, cancel: &dyn Cancellation) -> ComposeResult<NodeIndex> {
    let (Some(fields), [candidate]) = (inputs.index_fields, inputs.candidates) else {
        return Err(ComposeError::MalformedAssignment("index-only plan needs exactly one covering index".to_string()));
    };
    let bitmap = filtered_bitmap(graph, inputs, true, cancel)?;
    let normalizer = graph.add_with_inputs(
        OperatorNode::new(
            OperatorKind::Normalizer,
            TupleShape::Row {
                width: candidate.index.key_len(),
                rid: false,
            },
        ),
        &[bitmap],
    );
    let project = OperatorNode::new(
        OperatorKind::Project {
            fields: fields.to_vec(),
            keep_rid: false,
        },
        TupleShape::Row {
            width: fields.len(),
            rid: false,
        },
    );
    Ok(graph.add_with_inputs(project, &[normalizer]))
}
