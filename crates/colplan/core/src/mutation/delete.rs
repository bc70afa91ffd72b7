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

use super::{DeleteRequest, MutationPipeline, MutationPipelineBuilder, MutationResult};
use crate::graph::{BarrierMode, OperatorGraph, OperatorKind, OperatorNode, SortKey, TupleShape};

impl MutationPipelineBuilder<'_> {
    /// Appends a delete pipeline: the RIDs of the rows produced by `input`
    /// are spliced into the deletion index. Rows without a RID are skipped.
    pub fn build_delete(&self, graph: &mut OperatorGraph, input: NodeIndex, request: &DeleteRequest) -> MutationResult<MutationPipeline> {
        self.check_cancelled()?;
        let deletion = self.deletion_index(request.table)?;
        let row_count = graph.allocate_param();

        let shape = graph.node(input).output;
        let ordered = if request.rid_ordered {
            OperatorNode::new(OperatorKind::Buffer, shape)
        } else {
            OperatorNode::new(OperatorKind::Sort(SortKey::Rid), shape)
        };
        let ordered = graph.add_with_inputs(ordered, &[input]);

        let splicer = OperatorNode::new(
            OperatorKind::Splicer {
                index: deletion.id,
                unique: false,
                ignore_duplicates: true,
            },
            TupleShape::RowCount,
        )
        .writing([row_count]);
        let splicer = graph.add_with_inputs(splicer, &[ordered]);
        let barrier = OperatorNode::new(OperatorKind::Barrier(BarrierMode::ReturnAny), TupleShape::RowCount).reading([row_count]);
        let root = graph.add_with_inputs(barrier, &[splicer]);

        debug!("Delete from {} splices into {}{}", request.table, deletion, if request.rid_ordered { " (pre-ordered)" } else { "" });
        Ok(MutationPipeline {
            root,
            row_count,
            unique_indexes: 0,
            estimated_violations: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlannerConfig;
    use crate::graph::{Row, ValuesRelation};
    use crate::mutation::MutationError;
    use crate::statistics::StatisticsCollector;
    use colplan_common::{Rid, SecondaryIndex, StorageId, TableId};

    fn rids(graph: &mut OperatorGraph) -> NodeIndex {
        let rows = vec![Row::with_rid(Rid(4), Vec::new()), Row::with_rid(Rid(2), Vec::new())];
        graph.add(OperatorNode::new(OperatorKind::Values(ValuesRelation::Rows(rows)), TupleShape::Row { width: 0, rid: true }))
    }

    #[test]
    fn test_delete_sorts_unless_ordered() {
        let stats = StatisticsCollector::new();
        stats.register_index(TableId(1), SecondaryIndex::deletion(StorageId(9), "del"));
        let config = PlannerConfig::default();
        let builder = MutationPipelineBuilder::new(&stats, &config);

        let mut graph = OperatorGraph::new();
        let input = rids(&mut graph);
        let pipeline = builder.build_delete(&mut graph, input, &DeleteRequest::new(TableId(1))).unwrap();
        assert_eq!(graph.count(|k| matches!(k, OperatorKind::Sort(SortKey::Rid))), 1);
        assert_eq!(graph.node(pipeline.root).reads, vec![pipeline.row_count]);
        assert!(matches!(
            graph.node(graph.inputs(pipeline.root)[0].0).kind,
            OperatorKind::Splicer {
                ignore_duplicates: true,
                ..
            }
        ));

        let mut graph = OperatorGraph::new();
        let input = rids(&mut graph);
        builder.build_delete(&mut graph, input, &DeleteRequest::new(TableId(1)).rid_ordered()).unwrap();
        assert_eq!(graph.count(|k| matches!(k, OperatorKind::Sort(_))), 0);
        assert_eq!(graph.count(|k| matches!(k, OperatorKind::Buffer)), 1);
    }

    #[test]
    fn test_delete_requires_deletion_index() {
        let stats = StatisticsCollector::new();
        let config = PlannerConfig::default();
        let mut graph = OperatorGraph::new();
        let input = rids(&mut graph);
        let result = MutationPipelineBuilder::new(&stats, &config).build_delete(&mut graph, input, &DeleteRequest::new(TableId(3)));
        assert_eq!(result.unwrap_err(), MutationError::MissingDeletionIndex(TableId(3)));
    }
}
