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

//! Predicate extraction: splits a filter into column-keyed sarg filters and
//! the part that cannot be decomposed.

pub mod extractor;

pub use extractor::ConjunctiveExtractor;

use colplan_common::{ColumnFilter, ColumnId, Datum};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of extraction. `residual` is whatever the index path cannot evaluate.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted<E> {
    pub filters: Vec<ColumnFilter>,
    pub residual: Option<E>,
}

pub trait PredicateExtractor {
    type Expr;

    fn extract(&self, expr: &Self::Expr) -> Extracted<Self::Expr>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        };
        write!(f, "{s}")
    }
}

/// Boolean filter over one table's columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterExpr {
    And(Vec<FilterExpr>),
    Or(Vec<FilterExpr>),
    Compare { column: ColumnId, op: CompareOp, value: Datum },
    InList { column: ColumnId, values: Vec<Datum> },
    Between { column: ColumnId, low: Datum, high: Datum },
    IsNull(ColumnId),
    /// Anything the extractor cannot see into, kept verbatim.
    Opaque(String),
}

impl FilterExpr {
    pub fn compare(column: ColumnId, op: CompareOp, value: impl Into<Datum>) -> Self {
        FilterExpr::Compare {
            column,
            op,
            value: value.into(),
        }
    }

    pub fn and(conjuncts: Vec<FilterExpr>) -> Self {
        FilterExpr::And(conjuncts)
    }
}

impl fmt::Display for FilterExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterExpr::And(parts) | FilterExpr::Or(parts) => {
                let sep = if matches!(self, FilterExpr::And(_)) { " AND " } else { " OR " };
                let rendered: Vec<String> = parts.iter().map(|p| format!("({p})")).collect();
                write!(f, "{}", rendered.join(sep))
            }
            FilterExpr::Compare { column, op, value } => write!(f, "{column} {op} {value}"),
            FilterExpr::InList { column, values } => {
                let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "{column} IN ({})", rendered.join(", "))
            }
            FilterExpr::Between { column, low, high } => write!(f, "{column} BETWEEN {low} AND {high}"),
            FilterExpr::IsNull(column) => write!(f, "{column} IS NULL"),
            FilterExpr::Opaque(text) => write!(f, "{text}"),
        }
    }
}
