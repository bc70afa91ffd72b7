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

use colplan_common::SecondaryIndex;
use petgraph::graph::NodeIndex;
use tracing::debug;

use super::{InsertRequest, MutationError, MutationPipeline, MutationPipelineBuilder, MutationResult};
use crate::graph::{BarrierMode, MergeMode, OperatorGraph, OperatorKind, OperatorNode, ParamId, SortKey, TupleShape};

impl MutationPipelineBuilder<'_> {
    /// Appends an insert pipeline consuming the rows produced by `input`.
    ///
    /// Rows are appended to every clustered group; once all appends finish,
    /// index keys are regenerated from the groups, sorted and spliced into
    /// each secondary index. Violations raised by unique indexes are sorted
    /// by RID, deduplicated and spliced into the deletion index.
    pub fn build_insert(&self, graph: &mut OperatorGraph, input: NodeIndex, request: &InsertRequest) -> MutationResult<MutationPipeline> {
        let schema = &request.schema;
        schema.validate()?;
        let indexes = self.secondary_indexes(schema)?;
        let unique: Vec<&SecondaryIndex> = indexes.iter().filter(|i| i.unique).collect();
        let deletion = if unique.is_empty() { None } else { Some(self.deletion_index(schema.id)?) };

        let row_count = graph.allocate_param();
        let source = if request.target_is_source {
            let shape = graph.node(input).output;
            graph.add_with_inputs(OperatorNode::new(OperatorKind::Buffer, shape), &[input])
        } else {
            input
        };

        let appended = self.append_groups(graph, source, request, row_count);
        if indexes.is_empty() {
            graph.node_mut(appended).reads.push(row_count);
            debug!("Insert into {} appends to {} groups, no indexes", schema.name, schema.groups.len());
            return Ok(MutationPipeline {
                root: appended,
                row_count,
                unique_indexes: 0,
                estimated_violations: None,
            });
        }

        let splitter = graph.add_with_inputs(OperatorNode::new(OperatorKind::Splitter, TupleShape::RowCount), &[appended]);
        let mut splicers = Vec::with_capacity(indexes.len());
        for index in &indexes {
            self.check_cancelled()?;
            splicers.push(self.splice_index(graph, splitter, request, index)?);
        }
        let indexed = OperatorNode::new(OperatorKind::Barrier(BarrierMode::ReturnAny), TupleShape::RowCount);
        let indexed = graph.add_with_inputs(indexed, &splicers);

        let root = match deletion {
            None => {
                graph.node_mut(indexed).reads.push(row_count);
                indexed
            }
            Some(deletion) => {
                let unique_splicers: Vec<NodeIndex> = indexes.iter().zip(&splicers).filter(|(i, _)| i.unique).map(|(_, s)| *s).collect();
                let violations = Self::splice_violations(graph, &unique_splicers, &deletion);
                let barrier = OperatorNode::new(OperatorKind::Barrier(BarrierMode::ReturnAll), TupleShape::RowCount).reading([row_count]);
                graph.add_with_inputs(barrier, &[indexed, violations])
            }
        };

        let estimated_violations = match (unique.is_empty(), request.estimated_rows) {
            (false, Some(rows)) => Some((rows * self.config.violation_ratio).max(1.0)),
            _ => None,
        };
        debug!(
            "Insert into {} splices {} indexes ({} unique), expecting {:?} violations",
            schema.name,
            indexes.len(),
            unique.len(),
            estimated_violations
        );
        Ok(MutationPipeline {
            root,
            row_count,
            unique_indexes: unique.len(),
            estimated_violations,
        })
    }

    /// One append per clustered group behind a barrier. The first append
    /// reports the inserted row count.
    fn append_groups(&self, graph: &mut OperatorGraph, source: NodeIndex, request: &InsertRequest, row_count: ParamId) -> NodeIndex {
        let groups = &request.schema.groups;
        let feed = if groups.len() > 1 {
            let shape = graph.node(source).output;
            graph.add_with_inputs(OperatorNode::new(OperatorKind::Splitter, shape), &[source])
        } else {
            source
        };

        let mut appends = Vec::with_capacity(groups.len());
        for (pos, group) in groups.iter().enumerate() {
            let mut append = OperatorNode::new(
                OperatorKind::Append {
                    group: group.id,
                    columns: group.columns.clone(),
                },
                TupleShape::RowCount,
            );
            if pos == 0 {
                append = append.writing([row_count]);
            }
            appends.push(graph.add_with_inputs(append, &[feed]));
        }
        graph.add_with_inputs(OperatorNode::new(OperatorKind::Barrier(BarrierMode::ReturnAny), TupleShape::RowCount), &appends)
    }

    /// Generator, sort and splicer for one secondary index.
    fn splice_index(&self, graph: &mut OperatorGraph, splitter: NodeIndex, request: &InsertRequest, index: &SecondaryIndex) -> MutationResult<NodeIndex> {
        let groups = request
            .schema
            .coverage_groups(index)
            .map_err(|e| MutationError::UnknownIndexColumn(e.to_string()))?
            .into_iter()
            .map(|g| g.id)
            .collect();
        let entry = TupleShape::IndexEntry { keys: index.key_len() };
        let generator = OperatorNode::new(
            OperatorKind::Generator {
                index: index.id,
                key_columns: index.key_columns.clone(),
                groups,
            },
            entry,
        );
        let generator = graph.add_with_inputs(generator, &[splitter]);
        let sort = graph.add_with_inputs(OperatorNode::new(OperatorKind::Sort(SortKey::KeyThenRid(index.key_columns.clone())), entry), &[generator]);
        let splicer = OperatorNode::new(
            OperatorKind::Splicer {
                index: index.id,
                unique: index.unique,
                ignore_duplicates: false,
            },
            TupleShape::RowCount,
        );
        Ok(graph.add_with_inputs(splicer, &[sort]))
    }

    /// Violation substream: union (when several unique indexes can
    /// violate), sort by RID, dedupe, then splice into the deletion index.
    fn splice_violations(graph: &mut OperatorGraph, unique_splicers: &[NodeIndex], deletion: &SecondaryIndex) -> NodeIndex {
        let sort = graph.add(OperatorNode::new(OperatorKind::Sort(SortKey::Rid), TupleShape::Violation));
        let deduped = if let [single] = unique_splicers {
            graph.connect_violations(*single, sort);
            sort
        } else {
            let union = graph.add(OperatorNode::new(OperatorKind::Merge(MergeMode::Union), TupleShape::Violation));
            for splicer in unique_splicers {
                graph.connect_violations(*splicer, union);
            }
            graph.connect(union, sort);
            graph.add_with_inputs(OperatorNode::new(OperatorKind::Distinct, TupleShape::Violation), &[sort])
        };

        let splicer = OperatorNode::new(
            OperatorKind::Splicer {
                index: deletion.id,
                unique: false,
                ignore_duplicates: false,
            },
            TupleShape::RowCount,
        );
        graph.add_with_inputs(splicer, &[deduped])
    }
}
