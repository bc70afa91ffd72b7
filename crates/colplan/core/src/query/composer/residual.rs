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

use colplan_common::ColumnFilter;
use petgraph::graph::NodeIndex;
use std::cmp::Ordering;

use crate::graph::{OperatorGraph, OperatorKind, OperatorNode, TupleShape, ValuesRelation};

/// Most selective first. Filters with unknown selectivity go last; ties are
/// broken by column position.
pub fn order_residuals(mut filters: Vec<ColumnFilter>) -> Vec<ColumnFilter> {
    filters.sort_by(|a, b| {
        let by_selectivity = match (a.selectivity, b.selectivity) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_selectivity.then_with(|| a.column.cmp(&b.column))
    });
    filters
}

/// One interval relation per residual filter, in evaluation order.
pub fn build_residual_values(graph: &mut OperatorGraph, residual: &[ColumnFilter]) -> Vec<NodeIndex> {
    residual
        .iter()
        .map(|filter| {
            graph.add(OperatorNode::new(
                OperatorKind::Values(ValuesRelation::Interval {
                    column: filter.column,
                    sarg: filter.sarg.clone(),
                }),
                TupleShape::Interval,
            ))
        })
        .collect()
}
