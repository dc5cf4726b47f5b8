use std::cell::OnceCell;
use std::num::NonZeroU32;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::clock::Clock;
use crate::datetime::format_day_label;
use crate::program::{ProgramCalendar, ProgramDayKey};
use crate::schedule::first_deliverable_date;

/// Number of days the navigator can browse, starting at the first
/// deliverable date. Fewer near the end of the representable calendar.
pub const NAVIGATOR_HORIZON_DAYS: usize = 180;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayEntry {
    pub date: NaiveDate,
    pub display_text: String,
    pub program_day_index: u32,
}

impl DayEntry {
    pub fn program_day_key(&self) -> ProgramDayKey {
        ProgramDayKey::from_index(self.program_day_index)
    }
}

/// Day-by-day browser over the program menu.
///
/// Without a clock every operation is a logged no-op. The program anchor is
/// computed once and never recomputed; the day list is built on first use
/// and only rebuilt after [`DayNavigator::clear`].
#[derive(Debug)]
pub struct DayNavigator {
    clock: Option<Clock>,
    duration: Option<NonZeroU32>,
    anchor: OnceCell<NaiveDate>,
    days: OnceCell<Vec<DayEntry>>,
    current_index: usize,
}

impl DayNavigator {
    pub fn new(clock: Option<Clock>, duration: Option<NonZeroU32>) -> Self {
        Self {
            clock,
            duration,
            anchor: OnceCell::new(),
            days: OnceCell::new(),
            current_index: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.clock.is_some()
    }

    /// First deliverable date; the navigator's day 0 and the program start.
    pub fn anchor(&self) -> Option<NaiveDate> {
        let Some(clock) = self.clock.as_ref() else {
            error!("day navigator has no clock; date display disabled");
            return None;
        };
        if let Some(anchor) = self.anchor.get() {
            return Some(*anchor);
        }
        let Some(anchor) = first_deliverable_date(clock) else {
            error!(
                clock = %clock.now(),
                "no deliverable date after clock; date display disabled"
            );
            return None;
        };
        info!(
            anchor = %anchor,
            clock = %clock.now(),
            duration = ?self.duration.map(NonZeroU32::get),
            "program dates initialized"
        );
        Some(*self.anchor.get_or_init(|| anchor))
    }

    pub fn program(&self) -> Option<ProgramCalendar> {
        let anchor = self.anchor()?;
        self.duration
            .map(|duration| ProgramCalendar::new(anchor, duration))
    }

    pub fn days(&self) -> &[DayEntry] {
        let Some(anchor) = self.anchor() else {
            return &[];
        };
        self.days.get_or_init(|| self.build_days(anchor))
    }

    #[instrument(skip(self))]
    fn build_days(&self, anchor: NaiveDate) -> Vec<DayEntry> {
        let program = self.program();
        if program.is_none() {
            error!("program duration unknown; every day resolves to program day 0");
        }

        let days: Vec<DayEntry> = anchor
            .iter_days()
            .take(NAVIGATOR_HORIZON_DAYS)
            .map(|date| DayEntry {
                date,
                display_text: format_day_label(date),
                program_day_index: program.map(|p| p.day_index(date)).unwrap_or(0),
            })
            .collect();
        debug!(count = days.len(), first = %anchor, "built navigator days");
        days
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_day(&self) -> Option<&DayEntry> {
        let day = self.days().get(self.current_index);
        if day.is_none() && self.is_enabled() {
            error!(index = self.current_index, "current day index out of bounds");
        }
        day
    }

    pub fn go_to_previous_day(&mut self) -> bool {
        if !self.ensure_enabled() {
            return false;
        }
        if self.current_index > 0 {
            self.current_index -= 1;
            return true;
        }
        false
    }

    pub fn go_to_next_day(&mut self) -> bool {
        if !self.ensure_enabled() {
            return false;
        }
        if self.current_index + 1 < self.days().len() {
            self.current_index += 1;
            return true;
        }
        false
    }

    pub fn set_current_index(&mut self, index: usize) -> bool {
        if !self.ensure_enabled() {
            return false;
        }
        let horizon = self.days().len();
        if index >= horizon {
            warn!(index, horizon, "invalid day index; ignored");
            return false;
        }
        self.current_index = index;
        true
    }

    /// Position of `date` in the horizon; `None` past the last day.
    pub fn index_for_date(&self, date: NaiveDate) -> Option<usize> {
        let index = self.days().iter().position(|day| day.date == date);
        if index.is_none() {
            debug!(date = %date, "date outside navigator horizon");
        }
        index
    }

    pub fn current_program_day_key(&self) -> ProgramDayKey {
        self.current_day()
            .map(DayEntry::program_day_key)
            .unwrap_or_default()
    }

    pub fn current_display_text(&self) -> String {
        self.current_day()
            .map(|day| day.display_text.clone())
            .unwrap_or_default()
    }

    pub fn current_program_day_index(&self) -> u32 {
        self.current_day()
            .map(|day| day.program_day_index)
            .unwrap_or(0)
    }

    /// Drops the cached day list. The anchor stays as computed.
    pub fn clear(&mut self) {
        self.days = OnceCell::new();
    }

    fn ensure_enabled(&self) -> bool {
        if self.is_enabled() {
            return true;
        }
        error!("day navigator has no clock; navigation ignored");
        false
    }
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use chrono::NaiveDate;

    use super::{DayNavigator, NAVIGATOR_HORIZON_DAYS, is_weekend};
    use crate::clock::Clock;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn navigator(now: &str, duration: u32) -> DayNavigator {
        DayNavigator::new(
            Some(Clock::parse(now).expect("clock")),
            NonZeroU32::new(duration),
        )
    }

    #[test]
    fn builds_horizon_from_first_deliverable_date() {
        let nav = navigator("2025-09-01T10:00", 5);
        let days = nav.days();
        assert_eq!(days.len(), NAVIGATOR_HORIZON_DAYS);
        assert_eq!(days[0].date, ymd(2025, 9, 2));
        assert_eq!(days[0].display_text, "Вторник, 2 сентября");
        assert_eq!(days[179].date, ymd(2026, 2, 28));
        assert_eq!(days[7].program_day_index, 2);
        assert_eq!(days[7].program_day_key().to_string(), "day-3");
    }

    #[test]
    fn stops_at_both_ends() {
        let mut nav = navigator("2025-09-01T10:00", 5);
        assert!(!nav.go_to_previous_day());
        assert_eq!(nav.current_index(), 0);

        assert!(nav.set_current_index(NAVIGATOR_HORIZON_DAYS - 1));
        assert!(!nav.go_to_next_day());
        assert_eq!(nav.current_index(), NAVIGATOR_HORIZON_DAYS - 1);

        assert!(nav.go_to_previous_day());
        assert_eq!(nav.current_index(), NAVIGATOR_HORIZON_DAYS - 2);
    }

    #[test]
    fn rejects_out_of_range_index() {
        let mut nav = navigator("2025-09-01T10:00", 5);
        assert!(nav.set_current_index(10));
        assert!(!nav.set_current_index(NAVIGATOR_HORIZON_DAYS));
        assert_eq!(nav.current_index(), 10);
    }

    #[test]
    fn finds_dates_inside_horizon_only() {
        let nav = navigator("2025-09-01T15:00", 5);
        assert_eq!(nav.index_for_date(ymd(2025, 9, 3)), Some(0));
        assert_eq!(nav.index_for_date(ymd(2025, 9, 10)), Some(7));
        assert_eq!(nav.index_for_date(ymd(2025, 9, 2)), None);
        assert_eq!(nav.index_for_date(ymd(2026, 6, 1)), None);
    }

    #[test]
    fn current_day_accessors_follow_index() {
        let mut nav = navigator("2025-09-01T10:00", 5);
        assert_eq!(nav.current_program_day_key().to_string(), "day-1");
        assert!(nav.set_current_index(7));
        assert_eq!(nav.current_program_day_index(), 2);
        assert_eq!(nav.current_program_day_key().to_string(), "day-3");
        assert_eq!(nav.current_display_text(), "Вторник, 9 сентября");
    }

    #[test]
    fn missing_clock_disables_everything() {
        let mut nav = DayNavigator::new(None, NonZeroU32::new(5));
        assert!(nav.days().is_empty());
        assert!(nav.current_day().is_none());
        assert!(!nav.go_to_next_day());
        assert!(!nav.set_current_index(3));
        assert_eq!(nav.current_index(), 0);
        assert_eq!(nav.index_for_date(ymd(2025, 9, 2)), None);
        assert_eq!(nav.current_program_day_key().to_string(), "day-1");
        assert_eq!(nav.current_display_text(), "");
    }

    #[test]
    fn unknown_duration_degrades_to_day_zero() {
        let nav = DayNavigator::new(Some(Clock::parse("2025-09-01T10:00").expect("clock")), None);
        assert_eq!(nav.days().len(), NAVIGATOR_HORIZON_DAYS);
        assert!(nav.days().iter().all(|day| day.program_day_index == 0));
        assert!(nav.program().is_none());
    }

    #[test]
    fn clear_rebuilds_from_same_anchor() {
        let mut nav = navigator("2025-09-01T10:00", 5);
        let first = nav.days()[0].clone();
        nav.clear();
        assert_eq!(nav.days()[0], first);
    }

    #[test]
    fn horizon_ends_at_last_representable_day() {
        let eve = NaiveDate::MAX
            .pred_opt()
            .and_then(|day| day.and_hms_opt(10, 0, 0))
            .expect("time");
        let mut nav = DayNavigator::new(Some(Clock::new(eve)), NonZeroU32::new(5));
        assert_eq!(nav.anchor(), Some(NaiveDate::MAX));
        assert_eq!(nav.days().len(), 1);
        assert!(!nav.go_to_next_day());
        assert!(!nav.set_current_index(1));

        let end_of_time = NaiveDate::MAX.and_hms_opt(10, 0, 0).expect("time");
        let mut nav = DayNavigator::new(Some(Clock::new(end_of_time)), NonZeroU32::new(5));
        assert_eq!(nav.anchor(), None);
        assert!(nav.days().is_empty());
        assert!(!nav.set_current_index(0));
        assert_eq!(nav.index_for_date(NaiveDate::MAX), None);
    }

    #[test]
    fn weekends() {
        assert!(is_weekend(ymd(2025, 9, 6)));
        assert!(is_weekend(ymd(2025, 9, 7)));
        assert!(!is_weekend(ymd(2025, 9, 8)));
    }
}
