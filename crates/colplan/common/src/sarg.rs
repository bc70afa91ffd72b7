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

//! Search-argument (sarg) intervals.
//!
//! A column predicate is expressed as an ordered sequence of disjoint
//! intervals. Each interval bound carries a [`Directive`]; the same directive
//! is what an index search consumes for its lower and upper search keys.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::datum::Datum;

/// Bound directive for one end of an interval or index search range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Directive {
    Open,
    Closed,
    Unbounded,
}

/// One end of an interval. `value` is `None` exactly when the directive is
/// [`Directive::Unbounded`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub directive: Directive,
    pub value: Option<Datum>,
}

impl Endpoint {
    pub fn unbounded() -> Self {
        Self {
            directive: Directive::Unbounded,
            value: None,
        }
    }

    pub fn closed(value: Datum) -> Self {
        Self {
            directive: Directive::Closed,
            value: Some(value),
        }
    }

    pub fn open(value: Datum) -> Self {
        Self {
            directive: Directive::Open,
            value: Some(value),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.directive == Directive::Unbounded
    }
}

/// Orders two lower bounds by how restrictive they are (greater = tighter).
fn cmp_lower(a: &Endpoint, b: &Endpoint) -> Ordering {
    match (&a.value, &b.value) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(y).then_with(|| match (a.directive, b.directive) {
            (Directive::Open, Directive::Closed) => Ordering::Greater,
            (Directive::Closed, Directive::Open) => Ordering::Less,
            _ => Ordering::Equal,
        }),
    }
}

/// Orders two upper bounds by position (greater = looser).
fn cmp_upper(a: &Endpoint, b: &Endpoint) -> Ordering {
    match (&a.value, &b.value) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => x.cmp(y).then_with(|| match (a.directive, b.directive) {
            (Directive::Open, Directive::Closed) => Ordering::Less,
            (Directive::Closed, Directive::Open) => Ordering::Greater,
            _ => Ordering::Equal,
        }),
    }
}

/// True when everything admitted by `upper` lies strictly before `lower`,
/// i.e. the two intervals neither overlap nor touch.
fn separated(upper: &Endpoint, lower: &Endpoint) -> bool {
    match (&upper.value, &lower.value) {
        (None, _) | (_, None) => false,
        (Some(u), Some(l)) => match u.cmp(l) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => upper.directive == Directive::Open && lower.directive == Directive::Open,
        },
    }
}

/// A single interval over one column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SargInterval {
    pub lower: Endpoint,
    pub upper: Endpoint,
}

impl SargInterval {
    pub fn new(lower: Endpoint, upper: Endpoint) -> Self {
        Self { lower, upper }
    }

    pub fn point(value: Datum) -> Self {
        Self {
            lower: Endpoint::closed(value.clone()),
            upper: Endpoint::closed(value),
        }
    }

    pub fn unbounded() -> Self {
        Self {
            lower: Endpoint::unbounded(),
            upper: Endpoint::unbounded(),
        }
    }

    pub fn is_point(&self) -> bool {
        self.lower.directive == Directive::Closed && self.upper.directive == Directive::Closed && self.lower.value == self.upper.value
    }

    pub fn is_unbounded(&self) -> bool {
        self.lower.is_unbounded() && self.upper.is_unbounded()
    }

    pub fn is_empty(&self) -> bool {
        match (&self.lower.value, &self.upper.value) {
            (Some(l), Some(u)) => match l.cmp(u) {
                Ordering::Greater => true,
                Ordering::Equal => self.lower.directive == Directive::Open || self.upper.directive == Directive::Open,
                Ordering::Less => false,
            },
            _ => false,
        }
    }

    pub fn contains(&self, value: &Datum) -> bool {
        let above_lower = match (&self.lower.directive, &self.lower.value) {
            (Directive::Unbounded, _) | (_, None) => true,
            (Directive::Closed, Some(l)) => value >= l,
            (Directive::Open, Some(l)) => value > l,
        };
        let below_upper = match (&self.upper.directive, &self.upper.value) {
            (Directive::Unbounded, _) | (_, None) => true,
            (Directive::Closed, Some(u)) => value <= u,
            (Directive::Open, Some(u)) => value < u,
        };
        above_lower && below_upper
    }

    pub fn intersect(&self, other: &SargInterval) -> SargInterval {
        let lower = if cmp_lower(&self.lower, &other.lower) == Ordering::Less {
            other.lower.clone()
        } else {
            self.lower.clone()
        };
        let upper = if cmp_upper(&self.upper, &other.upper) == Ordering::Greater {
            other.upper.clone()
        } else {
            self.upper.clone()
        };
        SargInterval { lower, upper }
    }
}

impl fmt::Display for SargInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_point()
            && let Some(v) = &self.lower.value
        {
            return write!(f, "[{v}]");
        }
        match (&self.lower.directive, &self.lower.value) {
            (Directive::Closed, Some(v)) => write!(f, "[{v}")?,
            (Directive::Open, Some(v)) => write!(f, "({v}")?,
            _ => write!(f, "(-inf")?,
        }
        match (&self.upper.directive, &self.upper.value) {
            (Directive::Closed, Some(v)) => write!(f, ", {v}]"),
            (Directive::Open, Some(v)) => write!(f, ", {v})"),
            _ => write!(f, ", +inf)"),
        }
    }
}

/// Ordered sequence of disjoint, non-empty intervals on one column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<SargInterval>", into = "Vec<SargInterval>")]
pub struct SargSequence {
    intervals: Vec<SargInterval>,
}

impl From<Vec<SargInterval>> for SargSequence {
    fn from(intervals: Vec<SargInterval>) -> Self {
        SargSequence::from_intervals(intervals)
    }
}

impl From<SargSequence> for Vec<SargInterval> {
    fn from(seq: SargSequence) -> Self {
        seq.intervals
    }
}

impl SargSequence {
    /// Normalizes arbitrary intervals: empties are dropped, the rest sorted by
    /// lower bound and coalesced where they overlap or touch.
    pub fn from_intervals(intervals: Vec<SargInterval>) -> Self {
        let mut live: Vec<SargInterval> = intervals.into_iter().filter(|i| !i.is_empty()).collect();
        live.sort_by(|a, b| cmp_lower(&a.lower, &b.lower).then_with(|| cmp_upper(&a.upper, &b.upper)));

        let mut merged: Vec<SargInterval> = Vec::with_capacity(live.len());
        for interval in live {
            match merged.last_mut() {
                Some(last) if !separated(&last.upper, &interval.lower) => {
                    if cmp_upper(&interval.upper, &last.upper) == Ordering::Greater {
                        last.upper = interval.upper;
                    }
                }
                _ => merged.push(interval),
            }
        }
        Self { intervals: merged }
    }

    pub fn point(value: Datum) -> Self {
        Self {
            intervals: vec![SargInterval::point(value)],
        }
    }

    pub fn points(values: impl IntoIterator<Item = Datum>) -> Self {
        Self::from_intervals(values.into_iter().map(SargInterval::point).collect())
    }

    pub fn interval(interval: SargInterval) -> Self {
        Self::from_intervals(vec![interval])
    }

    pub fn unbounded() -> Self {
        Self {
            intervals: vec![SargInterval::unbounded()],
        }
    }

    pub fn intervals(&self) -> &[SargInterval] {
        &self.intervals
    }

    /// Exact-match equality (one or more point values).
    pub fn is_point(&self) -> bool {
        !self.intervals.is_empty() && self.intervals.iter().all(SargInterval::is_point)
    }

    pub fn is_range(&self) -> bool {
        self.intervals.iter().any(|i| !i.is_point())
    }

    /// The sequence admits no value at all.
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn is_unconstrained(&self) -> bool {
        self.intervals.len() == 1 && self.intervals[0].is_unbounded()
    }

    /// The point values of an exact-match sequence, in ascending order.
    pub fn point_values(&self) -> Vec<&Datum> {
        self.intervals.iter().filter(|i| i.is_point()).filter_map(|i| i.lower.value.as_ref()).collect()
    }

    pub fn contains(&self, value: &Datum) -> bool {
        self.intervals.iter().any(|i| i.contains(value))
    }

    pub fn intersect(&self, other: &SargSequence) -> SargSequence {
        let mut out = Vec::new();
        for a in &self.intervals {
            for b in &other.intervals {
                let i = a.intersect(b);
                if !i.is_empty() {
                    out.push(i);
                }
            }
        }
        SargSequence::from_intervals(out)
    }
}

impl fmt::Display for SargSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.intervals.is_empty() {
            return write!(f, "{{}}");
        }
        let parts: Vec<String> = self.intervals.iter().map(|i| i.to_string()).collect();
        write!(f, "{}", parts.join(" ∪ "))
    }
}
