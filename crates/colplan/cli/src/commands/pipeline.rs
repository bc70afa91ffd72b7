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

use anyhow::{Context, Result};
use clap::ValueEnum;
use colplan_core::graph::{Row, TupleShape, ValuesRelation};
use colplan_core::reference::Evaluator;
use colplan_core::{DeleteRequest, InsertRequest, MutationPipelineBuilder, OperatorGraph, OperatorKind, OperatorNode, UpsertRequest};
use std::path::Path;

use super::{CommandContext, print_rows};
use crate::scenario::Scenario;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MutationKind {
    Insert,
    Delete,
    Upsert,
}

/// Builds the mutation pipeline for the scenario's input rows and prints it.
/// With `execute`, runs it against the sample table and reports the outcome.
pub fn pipeline(ctx: &CommandContext, path: &Path, kind: MutationKind, execute: bool) -> Result<()> {
    let scenario = Scenario::load(path)?;
    let stats = scenario.statistics()?;
    let builder = MutationPipelineBuilder::new(&stats, &ctx.config);
    let schema = scenario.schema.clone();

    let mut graph = OperatorGraph::new();
    let shape = TupleShape::Row {
        width: scenario.input.first().map(|r| r.values.len()).unwrap_or(schema.column_count()),
        rid: kind != MutationKind::Insert,
    };
    let input = graph.add(OperatorNode::new(OperatorKind::Values(ValuesRelation::Rows(scenario.input.clone())), shape));
    let estimated_rows = scenario.input.len() as f64;

    let pipeline = match kind {
        MutationKind::Insert => builder.build_insert(&mut graph, input, &InsertRequest::new(schema).with_estimated_rows(estimated_rows))?,
        MutationKind::Delete => builder.build_delete(&mut graph, input, &DeleteRequest::new(schema.id))?,
        MutationKind::Upsert => {
            let mut request = UpsertRequest::new(schema);
            request.estimated_rows = Some(estimated_rows);
            builder.build_upsert(&mut graph, input, &request)?
        }
    };
    graph.finish()?;

    println!("Pipeline: {kind:?} into {}", scenario.schema.name);
    println!("Unique indexes: {}", pipeline.unique_indexes);
    if let Some(violations) = pipeline.estimated_violations {
        println!("Estimated violations: {violations:.0}");
    }
    println!();
    print!("{graph}");

    if execute {
        let mut table = scenario.table()?;
        let outcome = {
            let mut eval = Evaluator::new(&mut table);
            eval.run(&graph).context("evaluating pipeline")?;
            eval.outcome(&pipeline)
        };
        println!();
        println!("Rows affected: {}", outcome.rows_affected);
        println!("Violations: {}", outcome.violations);
        let live: Vec<_> = table
            .rows()
            .filter(|(rid, _)| !table.is_deleted(*rid))
            .map(|(rid, values)| Row::with_rid(rid, values.to_vec()))
            .collect();
        print_rows(&live);
    }
    Ok(())
}
