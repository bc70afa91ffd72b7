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
use colplan_core::reference::Evaluator;
use colplan_core::{BitmapPlanComposer, ComposedPlan, ConjunctiveExtractor, IndexSelector, PredicateExtractor, ScanRequest};
use std::path::Path;
use tracing::info;

use super::{CommandContext, print_rows};
use crate::scenario::Scenario;

fn request(scenario: &Scenario) -> ScanRequest {
    let extracted = match &scenario.filter {
        Some(filter) => ConjunctiveExtractor::new().extract(filter),
        None => colplan_core::Extracted {
            filters: Vec::new(),
            residual: None,
        },
    };
    let mut request = ScanRequest::new(scenario.schema.clone(), extracted.filters, scenario.projection());
    if let Some(residual) = extracted.residual {
        info!("Residual predicate kept for the scan: {}", residual);
        request = request.with_residual_predicate();
    }
    request
}

fn print_plan(plan: &ComposedPlan) {
    println!("Plan shape: {:?}", plan.shape);
    if let Some(selection) = &plan.selection {
        println!("Selection: {:?} {}", selection.method, selection.assignment);
        if let Some(cost) = selection.cost {
            println!("Estimated cost: {:.3} (index {:.3}, residual {:.3})", cost.total, cost.index, cost.residual);
        }
    }
    if let Some(error) = &plan.fallback {
        println!("Fallback: {error}");
    }
    for filter in &plan.residual {
        println!("Residual: {filter}");
    }
    println!();
    print!("{}", plan.graph);
}

/// Plans the scenario's scan and prints the operator graph. With `execute`,
/// also runs it against the sample rows.
pub fn explain(ctx: &CommandContext, path: &Path, execute: bool) -> Result<()> {
    let scenario = Scenario::load(path)?;
    let stats = scenario.statistics()?;
    let plan = BitmapPlanComposer::new(&stats, &ctx.config).compose(&request(&scenario))?;
    print_plan(&plan);

    if execute {
        let mut table = scenario.table()?;
        let mut eval = Evaluator::new(&mut table);
        eval.run(&plan.graph).context("evaluating plan")?;
        println!();
        print_rows(eval.rows(plan.root)?);
    }
    Ok(())
}

/// Runs index selection only and prints every figure it produced.
pub fn select(ctx: &CommandContext, path: &Path) -> Result<()> {
    let scenario = Scenario::load(path)?;
    let stats = scenario.statistics()?;
    let request = request(&scenario);
    let selection = IndexSelector::new(&stats, &ctx.config).select(&request.schema, &request.filters)?;

    println!("Method: {:?}", selection.method);
    println!("Assignment: {}", selection.assignment);
    match selection.cost {
        Some(cost) => println!("Cost: {:.3}", cost.total),
        None => println!("Cost: unknown"),
    }
    println!("Nodes visited: {}{}", selection.nodes_visited, if selection.budget_exhausted { " (budget exhausted)" } else { "" });
    for candidate in selection.candidates()? {
        println!("Index {} matched to {} of {} key columns", candidate.index, candidate.matched_len, candidate.index.key_len());
    }
    for filter in selection.residual_filters() {
        println!("Residual: {filter}");
    }
    Ok(())
}
