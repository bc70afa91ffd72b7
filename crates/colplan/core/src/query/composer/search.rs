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

use colplan_common::{Datum, Directive, Endpoint, SecondaryIndex};
use petgraph::graph::NodeIndex;

use crate::graph::{KeyRange, MergeMode, OperatorGraph, OperatorKind, OperatorNode, ParamId, SearchBound, SearchInput, SearchKeys, SortKey, TupleShape, ValuesRelation};
use crate::query::planner::CandidateIndex;

/// Start-RID and row-limit parameters a consumer hands back to its producers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowParams {
    pub start_rid: ParamId,
    pub row_limit: ParamId,
}

impl FlowParams {
    pub fn allocate(graph: &mut OperatorGraph) -> Self {
        Self {
            start_rid: graph.allocate_param(),
            row_limit: graph.allocate_param(),
        }
    }

    pub fn ids(self) -> [ParamId; 2] {
        [self.start_rid, self.row_limit]
    }
}

fn cartesian(lists: &[Vec<Datum>]) -> Vec<Vec<Datum>> {
    lists.iter().fold(vec![Vec::new()], |acc, values| {
        acc.iter()
            .flat_map(|prefix| {
                values.iter().map(move |value| {
                    let mut tuple = prefix.clone();
                    tuple.push(value.clone());
                    tuple
                })
            })
            .collect()
    })
}

fn bound(prefix: &[Datum], endpoint: &Endpoint) -> SearchBound {
    match &endpoint.value {
        Some(value) if endpoint.directive != Directive::Unbounded => {
            let mut key = prefix.to_vec();
            key.push(value.clone());
            SearchBound {
                directive: endpoint.directive,
                key,
            }
        }
        _ if prefix.is_empty() => SearchBound {
            directive: Directive::Unbounded,
            key: Vec::new(),
        },
        _ => SearchBound {
            directive: Directive::Closed,
            key: prefix.to_vec(),
        },
    }
}

/// Key values a search on `candidate` is driven by. Exact tuples when every
/// matched sarg is a point; otherwise one range per combination of leading
/// point values and trailing interval.
pub fn search_keys(candidate: &CandidateIndex) -> SearchKeys {
    if candidate.is_point_match() {
        let lists: Vec<Vec<Datum>> = candidate.sargs().map(|sarg| sarg.point_values().into_iter().cloned().collect()).collect();
        return SearchKeys::Exact(cartesian(&lists));
    }

    let leading: Vec<Vec<Datum>> = candidate
        .filters
        .iter()
        .take(candidate.matched_len - 1)
        .map(|f| f.sarg.point_values().into_iter().cloned().collect())
        .collect();
    let last = &candidate.last().sarg;

    let mut ranges = Vec::new();
    for prefix in cartesian(&leading) {
        for interval in last.intervals() {
            ranges.push(KeyRange {
                lower: bound(&prefix, &interval.lower),
                upper: bound(&prefix, &interval.upper),
            });
        }
    }
    SearchKeys::Bounded(ranges)
}

/// Appends the search for one candidate index and returns the node producing
/// its RID-ordered bitmap. `reads` go to the last node of the chain.
pub fn build_index_search(graph: &mut OperatorGraph, candidate: &CandidateIndex, chopper_row_limit: u64, output_keys: bool, reads: Option<FlowParams>) -> NodeIndex {
    let keys = search_keys(candidate);
    let width = keys.width();
    let values = graph.add(OperatorNode::new(OperatorKind::Values(ValuesRelation::Keys(keys)), TupleShape::SearchKey { width }));

    let bitmap = TupleShape::Bitmap {
        keys: if output_keys { candidate.index.key_len() } else { 0 },
    };
    let merge = candidate.requires_merge();

    let mut search = OperatorNode::new(
        OperatorKind::Search {
            index: candidate.index.id,
            input: SearchInput::Keys,
            output_keys,
        },
        bitmap,
    );
    if !merge && let Some(params) = reads {
        search = search.reading(params.ids());
    }
    let search = graph.add_with_inputs(search, &[values]);
    if !merge {
        return search;
    }

    let chopper = graph.add_with_inputs(
        OperatorNode::new(
            OperatorKind::Chopper {
                row_limit: chopper_row_limit,
            },
            bitmap,
        ),
        &[search],
    );
    let sort = graph.add_with_inputs(OperatorNode::new(OperatorKind::Sort(SortKey::Rid), bitmap), &[chopper]);
    let mut merge = OperatorNode::new(OperatorKind::Merge(MergeMode::Bitmap), bitmap);
    if let Some(params) = reads {
        merge = merge.reading(params.ids());
    }
    graph.add_with_inputs(merge, &[sort])
}

/// Deletion index search. With a start-RID parameter it resumes from that
/// RID; without one it reads the whole index.
pub fn build_deletion_search(graph: &mut OperatorGraph, deletion: &SecondaryIndex, start_rid: Option<ParamId>) -> NodeIndex {
    let input = match start_rid {
        Some(param) => SearchInput::FromStartRid(param),
        None => SearchInput::FullScan,
    };
    let node = OperatorNode::new(
        OperatorKind::Search {
            index: deletion.id,
            input,
            output_keys: false,
        },
        TupleShape::Bitmap { keys: 0 },
    )
    .reading(start_rid);
    graph.add(node)
}
