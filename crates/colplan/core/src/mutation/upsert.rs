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

use petgraph::graph::NodeIndex;
use tracing::debug;

use super::{DeleteRequest, InsertRequest, MutationError, MutationPipeline, MutationPipelineBuilder, MutationResult, UpsertRequest};
use crate::graph::{BarrierMode, MergeMode, OperatorGraph, OperatorKind, OperatorNode, RowFilter, TupleShape};

impl MutationPipelineBuilder<'_> {
    /// Appends an upsert pipeline. Rows with a RID update that row: the old
    /// RID is deleted and the new values inserted. Rows without a RID are
    /// plain inserts. All RID-carrying rows reach the split before any
    /// RID-less row.
    pub fn build_upsert(&self, graph: &mut OperatorGraph, input: NodeIndex, request: &UpsertRequest) -> MutationResult<MutationPipeline> {
        self.check_cancelled()?;
        let schema = &request.schema;
        if !request.has_update && !request.has_insert {
            return Err(MutationError::EmptyUpsert(schema.id));
        }
        let width = schema.column_count();
        let insert = InsertRequest {
            schema: schema.clone(),
            target_is_source: false,
            estimated_rows: request.estimated_rows,
        };

        let shape = graph.node(input).output;
        let buffered = graph.add_with_inputs(OperatorNode::new(OperatorKind::Buffer, shape), &[input]);

        if !request.has_update {
            debug!("Upsert into {} has no update clause, building insert only", schema.name);
            let rows = Self::project(graph, buffered, (0..width).collect(), false);
            return self.build_insert(graph, rows, &insert);
        }

        let updates = if request.has_insert {
            let splitter = graph.add_with_inputs(OperatorNode::new(OperatorKind::Splitter, shape), &[buffered]);
            let with_rid = graph.add_with_inputs(OperatorNode::new(OperatorKind::Filter(RowFilter::RidNotNull), shape), &[splitter]);
            let without_rid = graph.add_with_inputs(OperatorNode::new(OperatorKind::Filter(RowFilter::RidNull), shape), &[splitter]);
            let held = graph.add_with_inputs(OperatorNode::new(OperatorKind::Buffer, shape), &[without_rid]);
            graph.add_with_inputs(OperatorNode::new(OperatorKind::Merge(MergeMode::Sequential), shape), &[with_rid, held])
        } else {
            graph.add_with_inputs(OperatorNode::new(OperatorKind::Filter(RowFilter::RidNotNull), shape), &[buffered])
        };

        let splitter = graph.add_with_inputs(OperatorNode::new(OperatorKind::Splitter, shape), &[updates]);
        let old_rids = Self::project(graph, splitter, Vec::new(), true);
        let deleted = self.build_delete(graph, old_rids, &DeleteRequest::new(schema.id))?;
        let new_rows = Self::project(graph, splitter, (0..width).collect(), false);
        let inserted = self.build_insert(graph, new_rows, &insert)?;

        let barrier = OperatorNode::new(OperatorKind::Barrier(BarrierMode::ReturnAll), TupleShape::RowCount).reading([inserted.row_count]);
        let root = graph.add_with_inputs(barrier, &[deleted.root, inserted.root]);
        debug!(
            "Upsert into {} built with update{} clause",
            schema.name,
            if request.has_insert { " and insert" } else { " only" }
        );
        Ok(MutationPipeline { root, ..inserted })
    }

    fn project(graph: &mut OperatorGraph, input: NodeIndex, fields: Vec<usize>, keep_rid: bool) -> NodeIndex {
        let output = TupleShape::Row {
            width: fields.len(),
            rid: keep_rid,
        };
        graph.add_with_inputs(OperatorNode::new(OperatorKind::Project { fields, keep_rid }, output), &[input])
    }
}
