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

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod scenario;

use crate::commands::CommandContext;
use crate::commands::pipeline::MutationKind;
use anyhow::Result;

/// Access path and mutation pipeline planner for column-store tables
#[derive(Parser, Debug)]
#[command(name = "colplan", about = "Plan scans and mutations over bitmap-indexed column groups")]
pub struct Cli {
    /// Planner configuration file (JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Plan the scenario's scan and print the operator graph
    Explain {
        /// Path to the scenario file
        scenario: PathBuf,
        /// Run the plan against the scenario's sample rows
        #[arg(long)]
        execute: bool,
    },

    /// Run index selection only and print the chosen assignment
    Select {
        /// Path to the scenario file
        scenario: PathBuf,
    },

    /// Build an insert, delete or upsert pipeline for the scenario's input rows
    Pipeline {
        /// Path to the scenario file
        scenario: PathBuf,
        #[arg(long, value_enum, default_value_t = MutationKind::Insert)]
        kind: MutationKind,
        /// Run the pipeline against the scenario's sample rows
        #[arg(long)]
        execute: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let ctx = CommandContext::new(cli.config.as_deref())?;

    match cli.command {
        Commands::Explain { scenario, execute } => {
            commands::explain::explain(&ctx, &scenario, execute)?;
        }
        Commands::Select { scenario } => {
            commands::explain::select(&ctx, &scenario)?;
        }
        Commands::Pipeline { scenario, kind, execute } => {
            commands::pipeline::pipeline(&ctx, &scenario, kind, execute)?;
        }
    }

    Ok(())
}
