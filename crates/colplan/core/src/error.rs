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

use colplan_common::SchemaError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::graph::GraphError;
use crate::mutation::MutationError;
use crate::query::composer::ComposeError;
use crate::query::planner::SelectorError;
use crate::reference::EvalError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Selector(#[from] SelectorError),
    #[error(transparent)]
    Compose(#[from] ComposeError),
    #[error(transparent)]
    Mutation(#[from] MutationError),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

pub type Result<T> = std::result::Result<T, Error>;
