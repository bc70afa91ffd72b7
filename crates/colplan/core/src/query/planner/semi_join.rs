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

//! Index choice for semi-join probes, where equality keys arrive from
//! another branch of the plan instead of from constant filters.

use colplan_common::{ColumnId, SecondaryIndex};
use std::cmp::Ordering;
use tracing::{debug, trace};

use super::cost_model::CostModel;
use crate::statistics::StatisticsFacade;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SemiJoinMatch {
    pub index: SecondaryIndex,
    /// Positions into the caller's key list, in index key order.
    pub key_order: Vec<usize>,
}

impl SemiJoinMatch {
    pub fn matched_len(&self) -> usize {
        self.key_order.len()
    }
}

/// What is known about the relation driving the probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SemiJoinInput {
    /// Distinct key tuples the driving side produces, if known.
    pub distinct_keys: Option<f64>,
    /// Fraction of the probed table expected to survive the semi-join.
    pub selectivity: f64,
}

/// Leading index key columns covered by `keys`, as positions into `keys`.
fn match_index_keys(index: &SecondaryIndex, keys: &[ColumnId]) -> Vec<usize> {
    let mut order = Vec::new();
    for column in &index.key_columns {
        let Some(pos) = keys.iter().position(|k| k == column) else {
            break;
        };
        order.push(pos);
        if order.len() == keys.len() {
            break;
        }
    }
    order
}

fn probe_order<'i>(indexes: &'i [SecondaryIndex]) -> Vec<&'i SecondaryIndex> {
    let mut ordered: Vec<&SecondaryIndex> = indexes.iter().filter(|i| !i.is_deletion()).collect();
    ordered.sort_by_key(|i| i.id);
    ordered
}

/// Greedy probe index choice: the index whose key prefix covers the most
/// keys, stopping at the first one covering all of them.
pub fn find_semi_join_index(indexes: &[SecondaryIndex], keys: &[ColumnId]) -> Option<SemiJoinMatch> {
    let mut best: Option<SemiJoinMatch> = None;
    for index in probe_order(indexes) {
        let key_order = match_index_keys(index, keys);
        if key_order.len() > best.as_ref().map_or(0, SemiJoinMatch::matched_len) {
            let full = key_order.len() == keys.len();
            best = Some(SemiJoinMatch {
                index: index.clone(),
                key_order,
            });
            if full {
                break;
            }
        }
    }
    best
}

/// Probe index choice by estimated cost: each matching index is searched once
/// per distinct driving key, then the surviving rows are fetched. Falls back
/// to [`find_semi_join_index`] when nothing can be costed.
pub fn find_semi_join_index_by_cost(model: Option<&CostModel<'_>>, indexes: &[SecondaryIndex], keys: &[ColumnId], input: SemiJoinInput) -> Option<SemiJoinMatch> {
    let mut best: Option<(f64, SemiJoinMatch)> = None;

    if let Some(model) = model
        && let Some(distinct_keys) = input.distinct_keys
    {
        for index in probe_order(indexes) {
            let key_order = match_index_keys(index, keys);
            if key_order.is_empty() {
                continue;
            }
            let Some(search) = model.index_search_cost(&[(index, key_order.len(), None)]) else {
                trace!("Semi-join probe through {} has no cost", index);
                continue;
            };
            let cost = search * distinct_keys + model.semi_join_scan_cost(input.selectivity);
            trace!("Semi-join probe through {} on {} keys costs {}", index, key_order.len(), cost);
            if best.as_ref().is_none_or(|(best_cost, _)| cost < *best_cost) {
                best = Some((
                    cost,
                    SemiJoinMatch {
                        index: index.clone(),
                        key_order,
                    },
                ));
            }
        }
    }

    match best {
        Some((cost, found)) => {
            debug!("Semi-join probe uses {} at cost {}", found.index, cost);
            Some(found)
        }
        None => find_semi_join_index(indexes, keys),
    }
}

/// The index with the fewest pages; unknown page counts sort last and ties
/// go to the alphabetically first name.
pub fn pick_min_pages<'i>(facade: &dyn StatisticsFacade, indexes: &'i [SecondaryIndex]) -> Option<&'i SecondaryIndex> {
    indexes
        .iter()
        .map(|index| (facade.page_count(index.id), index))
        .min_by(|(a_pages, a), (b_pages, b)| {
            let by_pages = match (a_pages, b_pages) {
                (Some(x), Some(y)) => x.cmp(y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            by_pages.then_with(|| a.name.cmp(&b.name))
        })
        .map(|(_, index)| index)
}
