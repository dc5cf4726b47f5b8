//! Month grid and month-navigation bounds shared by both calendars.
//!
//! The calendars differ only in which days they let the user click and in
//! how many dates a selection holds, so the gate is a trait and selection
//! lives in the calendar modules.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use tracing::debug;

use crate::clock::Clock;
use crate::datetime::{days_in_month, first_day_of_month, format_month_title, shift_months};
use crate::schedule::last_available_day;

/// Decides whether a calendar cell accepts clicks.
pub trait DayGate {
    fn is_selectable(&self, date: NaiveDate) -> bool;
}

impl<F> DayGate for F
where
    F: Fn(NaiveDate) -> bool,
{
    fn is_selectable(&self, date: NaiveDate) -> bool {
        self(date)
    }
}

/// The month a calendar shows, bounded to
/// `[month(clock), month(clock) + max_months_ahead]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonthCursor {
    display: NaiveDate,
    earliest: NaiveDate,
    latest: NaiveDate,
}

impl MonthCursor {
    pub fn new(clock: &Clock, max_months_ahead: u32) -> Self {
        let earliest = first_day_of_month(clock.today());
        let latest = first_day_of_month(last_available_day(clock, max_months_ahead));
        Self {
            display: earliest,
            earliest,
            latest,
        }
    }

    /// First day of the displayed month.
    pub fn display_month(&self) -> NaiveDate {
        self.display
    }

    pub fn title(&self) -> String {
        format_month_title(self.display)
    }

    pub fn can_go_previous(&self) -> bool {
        self.display > self.earliest
    }

    pub fn can_go_next(&self) -> bool {
        self.display < self.latest
    }

    pub fn previous(&mut self) -> bool {
        if !self.can_go_previous() {
            debug!(month = %self.display, "previous month outside window; ignored");
            return false;
        }
        self.display = shift_months(self.display, -1);
        true
    }

    pub fn next(&mut self) -> bool {
        if !self.can_go_next() {
            debug!(month = %self.display, "next month outside window; ignored");
            return false;
        }
        self.display = shift_months(self.display, 1);
        true
    }

    /// Shows the month containing `date` if it lies inside the bounds.
    pub fn show_month_of(&mut self, date: NaiveDate) -> bool {
        let month = first_day_of_month(date);
        if month < self.earliest || month > self.latest {
            debug!(month = %month, "requested month outside window; ignored");
            return false;
        }
        self.display = month;
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GridDay {
    pub date: NaiveDate,
    pub selectable: bool,
}

/// One month laid out Monday-first, with blank cells before the 1st.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthGrid {
    pub month: NaiveDate,
    pub leading_blanks: usize,
    pub days: Vec<GridDay>,
}

impl MonthGrid {
    pub fn build(month: NaiveDate, gate: &dyn DayGate) -> Self {
        let first = first_day_of_month(month);
        let leading_blanks = first.weekday().num_days_from_monday() as usize;
        let days = first
            .iter_days()
            .take(days_in_month(first) as usize)
            .map(|date| GridDay {
                date,
                selectable: gate.is_selectable(date),
            })
            .collect();

        Self {
            month: first,
            leading_blanks,
            days,
        }
    }

    /// Rows of seven cells; `None` pads before the 1st and after the last day.
    pub fn weeks(&self) -> Vec<Vec<Option<GridDay>>> {
        let mut cells: Vec<Option<GridDay>> = vec![None; self.leading_blanks];
        cells.extend(self.days.iter().copied().map(Some));
        while cells.len() % 7 != 0 {
            cells.push(None);
        }
        cells.chunks(7).map(<[Option<GridDay>]>::to_vec).collect()
    }

}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, NaiveDate};

    use super::{MonthCursor, MonthGrid};
    use crate::clock::Clock;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn september_2025_starts_on_monday() {
        let grid = MonthGrid::build(ymd(2025, 9, 17), &|_: NaiveDate| true);
        assert_eq!(grid.month, ymd(2025, 9, 1));
        assert_eq!(grid.leading_blanks, 0);
        assert_eq!(grid.days.len(), 30);
        assert_eq!(grid.weeks().len(), 5);
    }

    #[test]
    fn sunday_first_day_gets_six_blanks() {
        let not_first = |d: NaiveDate| d.day() != 1;
        let grid = MonthGrid::build(ymd(2025, 6, 1), &not_first);
        assert_eq!(grid.leading_blanks, 6);
        assert_eq!(grid.weeks()[0][6].map(|d| d.date), Some(ymd(2025, 6, 1)));
        assert_eq!(grid.days.iter().filter(|day| day.selectable).count(), 29);
    }

    #[test]
    fn cursor_is_bounded_by_window() {
        let clock = Clock::parse("2025-09-01T10:00").expect("clock");
        let mut cursor = MonthCursor::new(&clock, 6);
        assert!(!cursor.can_go_previous());
        assert!(!cursor.previous());
        assert_eq!(cursor.display_month(), ymd(2025, 9, 1));

        let mut moves = 0;
        while cursor.next() {
            moves += 1;
        }
        assert_eq!(moves, 6);
        assert_eq!(cursor.display_month(), ymd(2026, 3, 1));
        assert!(!cursor.can_go_next());
        assert!(cursor.previous());
        assert_eq!(cursor.title(), "Февраль 2026");
    }

    #[test]
    fn show_month_of_rejects_out_of_window() {
        let clock = Clock::parse("2025-09-01T10:00").expect("clock");
        let mut cursor = MonthCursor::new(&clock, 6);
        assert!(cursor.show_month_of(ymd(2025, 12, 25)));
        assert_eq!(cursor.display_month(), ymd(2025, 12, 1));
        assert!(!cursor.show_month_of(ymd(2026, 4, 1)));
        assert_eq!(cursor.display_month(), ymd(2025, 12, 1));
    }

    #[test]
    fn last_month_of_calendar_builds_fully() {
        let grid = MonthGrid::build(NaiveDate::MAX, &|_: NaiveDate| true);
        assert_eq!(grid.days.len(), 31);
        assert_eq!(grid.days.last().map(|day| day.date), Some(NaiveDate::MAX));

        let clock = Clock::new(NaiveDate::MAX.and_hms_opt(10, 0, 0).expect("time"));
        let mut cursor = MonthCursor::new(&clock, 6);
        assert_eq!(cursor.display_month(), ymd(NaiveDate::MAX.year(), 12, 1));
        assert!(!cursor.next());
    }
}
