//! Greedy row packing of day ranges inside a visual window.
//!
//! Intervals are placed longest-first per start day into the lowest row
//! whose existing intervals they do not touch. This is first-fit interval
//! graph colouring; with the start-ascending order it uses the minimum
//! number of rows (the largest set of mutually overlapping intervals).

use chrono::NaiveDate;

use crate::dates::{inclusive_days, ranges_overlap};

/// Default number of rows rendered as bars before falling back to "+N more".
pub const DEFAULT_MAX_VISIBLE_ROWS: usize = 3;

/// Inclusive range of whole days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Interval {
    /// Build an interval, clamping an `end` before `start` to `start`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end: end.max(start),
        }
    }

    pub fn single(day: NaiveDate) -> Self {
        Self::new(day, day)
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        ranges_overlap(self.start, self.end, other.start, other.end)
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Inclusive length in days.
    pub fn days(&self) -> i64 {
        inclusive_days(self.start, self.end)
    }

    /// Truncate to the window. Does not check for overlap; callers filter
    /// with [`Interval::overlaps`] first.
    pub fn clamp_to(&self, window: &Interval) -> Interval {
        Interval {
            start: self.start.max(window.start),
            end: self.end.min(window.end),
        }
    }
}

/// Row assigned to one input interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Position of the interval in the caller's input slice.
    pub index: usize,
    /// Interval truncated to the window.
    pub clamped: Interval,
    pub row: usize,
}

/// Order used for packing: start ascending, then longer first.
///
/// The sort is stable, so equal keys keep arrival order.
pub fn packing_order(intervals: &[Interval]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..intervals.len()).collect();
    order.sort_by(|&a, &b| {
        let (a, b) = (&intervals[a], &intervals[b]);
        a.start.cmp(&b.start).then_with(|| b.days().cmp(&a.days()))
    });
    order
}

/// Assign a row to every interval, in packing order.
///
/// Sorting uses the unclamped ranges; overlap checks use the ranges clamped
/// to `window`.
pub fn pack_rows(intervals: &[Interval], window: &Interval) -> Vec<Placement> {
    let mut rows: Vec<Vec<Interval>> = Vec::new();
    let mut placements = Vec::with_capacity(intervals.len());

    for index in packing_order(intervals) {
        let clamped = intervals[index].clamp_to(window);

        let row = match rows
            .iter()
            .position(|placed| !placed.iter().any(|other| other.overlaps(&clamped)))
        {
            Some(row) => row,
            None => {
                rows.push(Vec::new());
                rows.len() - 1
            }
        };
        rows[row].push(clamped);

        placements.push(Placement {
            index,
            clamped,
            row,
        });
    }

    placements
}

/// Number of rows a packing uses.
pub fn row_count(placements: &[Placement]) -> usize {
    placements.iter().map(|p| p.row + 1).max().unwrap_or(0)
}
