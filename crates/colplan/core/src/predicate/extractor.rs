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

use colplan_common::{ColumnFilter, ColumnId, Datum, Endpoint, SargInterval, SargSequence};
use std::collections::BTreeMap;
use tracing::trace;

use super::{CompareOp, Extracted, FilterExpr, PredicateExtractor};

/// Extracts sargable conjuncts from a top-level AND. Conjuncts on the same
/// column are intersected into a single filter; disjunctions, inequalities
/// and opaque expressions stay residual.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConjunctiveExtractor;

impl ConjunctiveExtractor {
    pub fn new() -> Self {
        Self
    }

    fn flatten<'a>(expr: &'a FilterExpr, out: &mut Vec<&'a FilterExpr>) {
        match expr {
            FilterExpr::And(parts) => parts.iter().for_each(|p| Self::flatten(p, out)),
            other => out.push(other),
        }
    }

    fn sarg_of(expr: &FilterExpr) -> Option<(ColumnId, SargSequence)> {
        match expr {
            FilterExpr::Compare { column, op, value } => {
                // Comparisons against NULL are never true.
                if value.is_null() {
                    return Some((*column, SargSequence::from_intervals(Vec::new())));
                }
                let interval = match op {
                    CompareOp::Eq => SargInterval::point(value.clone()),
                    CompareOp::Lt => SargInterval::new(Endpoint::open(Datum::Null), Endpoint::open(value.clone())),
                    CompareOp::Le => SargInterval::new(Endpoint::open(Datum::Null), Endpoint::closed(value.clone())),
                    CompareOp::Gt => SargInterval::new(Endpoint::open(value.clone()), Endpoint::unbounded()),
                    CompareOp::Ge => SargInterval::new(Endpoint::closed(value.clone()), Endpoint::unbounded()),
                    CompareOp::Ne => return None,
                };
                Some((*column, SargSequence::interval(interval)))
            }
            FilterExpr::InList { column, values } => {
                let values: Vec<Datum> = values.iter().filter(|v| !v.is_null()).cloned().collect();
                Some((*column, SargSequence::points(values)))
            }
            FilterExpr::Between { column, low, high } => {
                if low.is_null() || high.is_null() {
                    return Some((*column, SargSequence::from_intervals(Vec::new())));
                }
                Some((*column, SargSequence::interval(SargInterval::new(Endpoint::closed(low.clone()), Endpoint::closed(high.clone())))))
            }
            FilterExpr::IsNull(column) => Some((*column, SargSequence::point(Datum::Null))),
            FilterExpr::And(_) | FilterExpr::Or(_) | FilterExpr::Opaque(_) => None,
        }
    }
}

impl PredicateExtractor for ConjunctiveExtractor {
    type Expr = FilterExpr;

    fn extract(&self, expr: &FilterExpr) -> Extracted<FilterExpr> {
        let mut conjuncts = Vec::new();
        Self::flatten(expr, &mut conjuncts);

        let mut by_column: BTreeMap<ColumnId, SargSequence> = BTreeMap::new();
        let mut residual: Vec<FilterExpr> = Vec::new();

        for conjunct in conjuncts {
            match Self::sarg_of(conjunct) {
                Some((column, sarg)) => {
                    let merged = match by_column.remove(&column) {
                        Some(existing) => existing.intersect(&sarg),
                        None => sarg,
                    };
                    by_column.insert(column, merged);
                }
                None => {
                    trace!("Keeping non-sargable conjunct as residual: {}", conjunct);
                    residual.push(conjunct.clone());
                }
            }
        }

        let filters = by_column.into_iter().map(|(column, sarg)| ColumnFilter::new(column, sarg)).collect();
        let residual = match residual.len() {
            0 => None,
            1 => residual.pop(),
            _ => Some(FilterExpr::And(residual)),
        };
        Extracted { filters, residual }
    }
}
