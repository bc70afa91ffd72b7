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

//! Operator graph
//!
//! The planner's output is a directed acyclic dataflow graph of typed
//! operators. Edges run producer to consumer; a consumer reads its inputs in
//! the order they were connected. Node and edge indexes follow construction
//! order, so identical planning inputs always produce identical graphs.

pub mod node;

pub use node::{
    BarrierMode, KeyRange, MergeMode, OperatorKind, OperatorNode, ParamId, Projected, Row, RowFilter, ScanMode, SearchBound, SearchInput, SearchKeys, SortKey,
    TupleShape, ValuesRelation,
};

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphError {
    #[error("Operator graph has a cycle through node {0}")]
    Cycle(usize),
    #[error("Unknown operator node {0}")]
    UnknownNode(usize),
}

pub type GraphResult<T> = Result<T, GraphError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Edge {
    Data,
    /// Uniqueness violations diverted from a splicer.
    Violation,
}

#[derive(Debug, Clone, Default)]
pub struct OperatorGraph {
    graph: DiGraph<OperatorNode, Edge>,
    next_param: u32,
}

impl OperatorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: OperatorNode) -> NodeIndex {
        self.graph.add_node(node)
    }

    /// Adds `node` and connects each of `inputs` to it, in order.
    pub fn add_with_inputs(&mut self, node: OperatorNode, inputs: &[NodeIndex]) -> NodeIndex {
        let idx = self.add(node);
        for input in inputs {
            self.connect(*input, idx);
        }
        idx
    }

    pub fn connect(&mut self, from: NodeIndex, to: NodeIndex) -> EdgeIndex {
        self.connect_edge(from, to, Edge::Data)
    }

    pub fn connect_violations(&mut self, from: NodeIndex, to: NodeIndex) -> EdgeIndex {
        self.connect_edge(from, to, Edge::Violation)
    }

    fn connect_edge(&mut self, from: NodeIndex, to: NodeIndex, edge: Edge) -> EdgeIndex {
        let shape = match edge {
            Edge::Data => self.graph[from].output,
            Edge::Violation => TupleShape::Violation,
        };
        self.graph[to].inputs.push(shape);
        self.graph.add_edge(from, to, edge)
    }

    pub fn allocate_param(&mut self) -> ParamId {
        let id = ParamId(self.next_param);
        self.next_param += 1;
        id
    }

    pub fn node(&self, idx: NodeIndex) -> &OperatorNode {
        &self.graph[idx]
    }

    pub fn node_mut(&mut self, idx: NodeIndex) -> &mut OperatorNode {
        &mut self.graph[idx]
    }

    pub fn get(&self, idx: NodeIndex) -> GraphResult<&OperatorNode> {
        self.graph.node_weight(idx).ok_or(GraphError::UnknownNode(idx.index()))
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &OperatorNode)> {
        self.graph.node_indices().map(move |idx| (idx, &self.graph[idx]))
    }

    pub fn find(&self, pred: impl Fn(&OperatorKind) -> bool) -> Vec<NodeIndex> {
        self.graph.node_indices().filter(|idx| pred(&self.graph[*idx].kind)).collect()
    }

    pub fn count(&self, pred: impl Fn(&OperatorKind) -> bool) -> usize {
        self.find(pred).len()
    }

    /// Producers feeding `idx`, in connection order.
    pub fn inputs(&self, idx: NodeIndex) -> Vec<(NodeIndex, Edge)> {
        let mut edges: Vec<_> = self.graph.edges_directed(idx, Direction::Incoming).map(|e| (e.id(), e.source(), *e.weight())).collect();
        edges.sort_by_key(|(id, _, _)| *id);
        edges.into_iter().map(|(_, source, edge)| (source, edge)).collect()
    }

    /// Consumers of `idx`, in connection order.
    pub fn outputs(&self, idx: NodeIndex) -> Vec<(NodeIndex, Edge)> {
        let mut edges: Vec<_> = self.graph.edges_directed(idx, Direction::Outgoing).map(|e| (e.id(), e.target(), *e.weight())).collect();
        edges.sort_by_key(|(id, _, _)| *id);
        edges.into_iter().map(|(_, target, edge)| (target, edge)).collect()
    }

    /// Nodes nothing consumes from, in node order.
    pub fn sinks(&self) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|idx| self.graph.edges_directed(*idx, Direction::Outgoing).next().is_none())
            .collect()
    }

    /// Verifies the graph is acyclic and returns its execution order.
    pub fn finish(&self) -> GraphResult<Vec<NodeIndex>> {
        toposort(&self.graph, None).map_err(|cycle| GraphError::Cycle(cycle.node_id().index()))
    }

    /// Structural summary; equal for structurally identical graphs.
    pub fn fingerprint(&self) -> String {
        self.graph
            .node_indices()
            .map(|idx| {
                let inputs: Vec<String> = self
                    .inputs(idx)
                    .into_iter()
                    .map(|(src, edge)| match edge {
                        Edge::Data => src.index().to_string(),
                        Edge::Violation => format!("{}!", src.index()),
                    })
                    .collect();
                format!("{}:{}<[{}]", idx.index(), self.graph[idx], inputs.join(","))
            })
            .collect::<Vec<_>>()
            .join(";")
    }

    fn explain(&self, f: &mut fmt::Formatter<'_>, idx: NodeIndex, edge: Edge, depth: usize, seen: &mut HashSet<NodeIndex>) -> fmt::Result {
        let marker = if edge == Edge::Violation { "!" } else { "" };
        if !seen.insert(idx) {
            return writeln!(f, "{:indent$}{marker}-> #{}", "", idx.index(), indent = depth * 2);
        }
        writeln!(f, "{:indent$}{marker}#{} {}", "", idx.index(), self.graph[idx], indent = depth * 2)?;
        for (input, edge) in self.inputs(idx) {
            self.explain(f, input, edge, depth + 1, seen)?;
        }
        Ok(())
    }
}

impl fmt::Display for OperatorGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut seen = HashSet::new();
        for sink in self.sinks() {
            self.explain(f, sink, Edge::Data, 0, &mut seen)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colplan_common::StorageId;

    fn search(id: u64) -> OperatorNode {
        OperatorNode::new(
            OperatorKind::Search {
                index: StorageId(id),
                input: SearchInput::FullScan,
                output_keys: false,
            },
            TupleShape::Bitmap { keys: 0 },
        )
    }

    #[test]
    fn test_inputs_keep_connection_order() {
        let mut graph = OperatorGraph::new();
        let a = graph.add(search(1));
        let b = graph.add(search(2));
        let minus = graph.add_with_inputs(OperatorNode::new(OperatorKind::Minus, TupleShape::Bitmap { keys: 0 }), &[b, a]);

        assert_eq!(graph.inputs(minus), vec![(b, Edge::Data), (a, Edge::Data)]);
        assert_eq!(graph.node(minus).inputs.len(), 2);
        assert_eq!(graph.sinks(), vec![minus]);
        assert_eq!(graph.finish().unwrap().last(), Some(&minus));
    }

    #[test]
    fn test_cycle_detected() {
        let mut graph = OperatorGraph::new();
        let a = graph.add(OperatorNode::new(OperatorKind::Buffer, TupleShape::RowCount));
        let b = graph.add(OperatorNode::new(OperatorKind::Buffer, TupleShape::RowCount));
        graph.connect(a, b);
        graph.connect(b, a);
        assert!(matches!(graph.finish(), Err(GraphError::Cycle(_))));
    }

    #[test]
    fn test_fingerprint_is_structural() {
        let build = || {
            let mut graph = OperatorGraph::new();
            let a = graph.add(search(1));
            let b = graph.add(search(2));
            graph.add_with_inputs(OperatorNode::new(OperatorKind::Intersect, TupleShape::Bitmap { keys: 0 }), &[a, b]);
            graph
        };
        assert_eq!(build().fingerprint(), build().fingerprint());

        let text = build().to_string();
        assert!(text.starts_with("#2 Intersect"));
        assert!(text.contains("  #0 Search #1 lower=(-inf"));
    }

    #[test]
    fn test_params_allocated_sequentially() {
        let mut graph = OperatorGraph::new();
        assert_eq!(graph.allocate_param(), ParamId(0));
        assert_eq!(graph.allocate_param(), ParamId(1));
    }
}
