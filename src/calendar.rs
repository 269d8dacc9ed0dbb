//! Month grid layout for the event calendar.
//!
//! The builder is pure: given a month, the event list and today's date it
//! returns renderable cells and week rows with packed event bars. Weeks
//! start on Sunday and always span seven days, including days of the
//! neighbouring months.

use std::fmt::Write as _;

use chrono::{Duration, NaiveDate};
use thiserror::Error;
use tracing::debug;

use crate::dates::{days_in_month, first_of_month, sunday_column};
use crate::models::{Event, EventSize};
use crate::packing::{DEFAULT_MAX_VISIBLE_ROWS, Interval, pack_rows, packing_order};

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalendarError {
    #[error("invalid month: {year}-{month}")]
    InvalidMonth { year: i32, month: u32 },
}

/// One cell of the month grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DayCell {
    /// Padding before the 1st or after the last day.
    Blank,
    Day(DayInfo),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayInfo {
    pub day: u32,
    pub date: NaiveDate,
    pub is_today: bool,
    /// Events touching this day, shown or not.
    pub event_count: usize,
    /// Events on this day whose bar row is beyond the display cap.
    pub overflow_count: usize,
}

/// Horizontal segment of an event inside one week row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBar {
    pub event_id: String,
    pub title: String,
    pub size: Option<EventSize>,
    pub confirmed: bool,
    /// First visible day, clamped to the week.
    pub start: NaiveDate,
    /// Last visible day, clamped to the week.
    pub end: NaiveDate,
    /// 0 = Sunday.
    pub start_column: u32,
    pub span_days: u32,
    pub row: usize,
    pub continues_from_previous: bool,
    pub continues_to_next: bool,
    pub show_title: bool,
}

impl EventBar {
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Whether the title is drawn in the cell for `date`.
    pub fn shows_title_on(&self, date: NaiveDate) -> bool {
        self.show_title && date == self.start
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekRow {
    pub index: usize,
    /// Sunday; may fall in the previous month.
    pub start: NaiveDate,
    /// Saturday; may fall in the next month.
    pub end: NaiveDate,
    /// Bars in rows below the cap, in packing order.
    pub bars: Vec<EventBar>,
}

impl WeekRow {
    pub fn window(&self) -> Interval {
        Interval::new(self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarMonth {
    pub year: i32,
    pub month: u32,
    /// Flat grid, a multiple of seven cells long.
    pub cells: Vec<DayCell>,
    pub weeks: Vec<WeekRow>,
}

impl CalendarMonth {
    pub fn day(&self, date: NaiveDate) -> Option<&DayInfo> {
        self.cells.iter().find_map(|cell| match cell {
            DayCell::Day(info) if info.date == date => Some(info),
            _ => None,
        })
    }

    /// Every bar segment drawn across the cell for `date`.
    pub fn bars_on(&self, date: NaiveDate) -> impl Iterator<Item = &EventBar> {
        self.weeks
            .iter()
            .flat_map(|week| week.bars.iter())
            .filter(move |bar| bar.covers(date))
    }

    /// Plain-text rendering for terminals.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let heading = first_of_month(self.year, self.month)
            .map(|first| first.format("%B %Y").to_string())
            .unwrap_or_default();
        let _ = writeln!(out, "{heading}");
        let _ = writeln!(out, "{}", WEEKDAYS.join("  "));

        for (week, cells) in self.weeks.iter().zip(self.cells.chunks(7)) {
            let line: Vec<String> = cells
                .iter()
                .map(|cell| match cell {
                    DayCell::Blank => "   ".to_string(),
                    DayCell::Day(info) if info.is_today => format!("{:>2}*", info.day),
                    DayCell::Day(info) => format!("{:>3}", info.day),
                })
                .collect();
            let _ = writeln!(out, "{}", line.join("  "));

            for bar in &week.bars {
                let from = if bar.continues_from_previous { "<" } else { " " };
                let to = if bar.continues_to_next { ">" } else { " " };
                let mark = if bar.confirmed { " *" } else { "" };
                let _ = writeln!(
                    out,
                    "  {from}{} - {}{to} row {}: {}{mark}",
                    WEEKDAYS[bar.start_column as usize],
                    WEEKDAYS[(bar.start_column + bar.span_days - 1) as usize],
                    bar.row,
                    bar.title,
                );
            }

            for cell in cells {
                if let DayCell::Day(info) = cell
                    && info.overflow_count > 0
                {
                    let _ = writeln!(out, "  +{} more on {}", info.overflow_count, info.day);
                }
            }
        }
        out
    }
}

/// Lays out a month of events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarBuilder {
    max_visible_rows: usize,
}

impl Default for CalendarBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_VISIBLE_ROWS)
    }
}

impl CalendarBuilder {
    pub fn new(max_visible_rows: usize) -> Self {
        Self { max_visible_rows }
    }

    pub fn max_visible_rows(&self) -> usize {
        self.max_visible_rows
    }

    /// Build the grid for `month` (1-12). Cancelled events are skipped.
    pub fn build(
        &self,
        year: i32,
        month: u32,
        events: &[Event],
        today: NaiveDate,
    ) -> Result<CalendarMonth, CalendarError> {
        let invalid = || CalendarError::InvalidMonth { year, month };
        let first = first_of_month(year, month).ok_or_else(invalid)?;
        let day_count = days_in_month(year, month).ok_or_else(invalid)?;

        let visible: Vec<&Event> = events.iter().filter(|e| !e.is_cancelled()).collect();
        let leading = sunday_column(first) as usize;
        let week_count = (leading + day_count as usize).div_ceil(7);
        let grid_start = first - Duration::days(leading as i64);

        let mut weeks = Vec::with_capacity(week_count);
        let mut hidden: Vec<(Interval, usize)> = Vec::new();
        for index in 0..week_count {
            let start = grid_start + Duration::weeks(index as i64);
            let window = Interval::new(start, start + Duration::days(6));
            let (bars, overflowing) = self.layout_week(&window, &visible);
            hidden.extend(overflowing.into_iter().map(|iv| (iv, index)));
            weeks.push(WeekRow {
                index,
                start: window.start,
                end: window.end,
                bars,
            });
        }

        let mut cells = Vec::with_capacity(week_count * 7);
        cells.extend(std::iter::repeat_n(DayCell::Blank, leading));
        for offset in 0..day_count {
            let date = first + Duration::days(i64::from(offset));
            let event_count = visible.iter().filter(|e| e.interval().contains(date)).count();
            let overflow_count = hidden.iter().filter(|(iv, _)| iv.contains(date)).count();
            cells.push(DayCell::Day(DayInfo {
                day: offset + 1,
                date,
                is_today: date == today,
                event_count,
                overflow_count,
            }));
        }
        cells.resize(week_count * 7, DayCell::Blank);

        debug!(
            year,
            month,
            events = visible.len(),
            weeks = week_count,
            hidden = hidden.len(),
            "Built calendar month"
        );

        Ok(CalendarMonth {
            year,
            month,
            cells,
            weeks,
        })
    }

    /// Pack the events touching one week. Returns the visible bars and the
    /// clamped ranges of events pushed past the row cap.
    fn layout_week(&self, window: &Interval, events: &[&Event]) -> (Vec<EventBar>, Vec<Interval>) {
        let in_week: Vec<&Event> = events
            .iter()
            .copied()
            .filter(|e| e.interval().overlaps(window))
            .collect();
        let intervals: Vec<Interval> = in_week.iter().map(|e| e.interval()).collect();

        let mut bars = Vec::new();
        let mut overflowing = Vec::new();
        for placement in pack_rows(&intervals, window) {
            if placement.row >= self.max_visible_rows {
                overflowing.push(placement.clamped);
                continue;
            }

            let event = in_week[placement.index];
            let full = intervals[placement.index];
            let start_column = sunday_column(placement.clamped.start);
            bars.push(EventBar {
                event_id: event.id.clone(),
                title: event.title(),
                size: event.size,
                confirmed: event.is_confirmed(),
                start: placement.clamped.start,
                end: placement.clamped.end,
                start_column,
                span_days: placement.clamped.days() as u32,
                row: placement.row,
                continues_from_previous: full.start < window.start,
                continues_to_next: full.end > window.end,
                show_title: full.start == placement.clamped.start || start_column == 0,
            });
        }
        (bars, overflowing)
    }
}

/// Every non-cancelled event touching `date`, in packing order.
pub fn events_on_day(events: &[Event], date: NaiveDate) -> Vec<&Event> {
    let touching: Vec<&Event> = events
        .iter()
        .filter(|e| !e.is_cancelled() && e.interval().contains(date))
        .collect();
    let intervals: Vec<Interval> = touching.iter().map(|e| e.interval()).collect();
    packing_order(&intervals)
        .into_iter()
        .map(|index| touching[index])
        .collect()
}
