use std::fmt;
use std::str::FromStr;

use anyhow::{Context, anyhow};
use chrono::{Months, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize, Serializer};
use tracing::{trace, warn};

use crate::clock::Clock;
use crate::datetime::{checked_add_days, days_between, format_short_date};
use crate::month_grid::DayGate;

/// How far ahead either calendar lets a customer pick.
pub const MAX_MONTHS_AHEAD: u32 = 6;

const FALLBACK_SLOT_TEXT: &str = "с 06:00 до 07:00";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliverySchedule {
    #[default]
    EveryDay,
    EveryOtherDay,
}

impl DeliverySchedule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EveryDay => "every-day",
            Self::EveryOtherDay => "every-other-day",
        }
    }
}

impl fmt::Display for DeliverySchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliverySchedule {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "every-day" => Ok(Self::EveryDay),
            "every-other-day" => Ok(Self::EveryOtherDay),
            other => Err(anyhow!(
                "unknown delivery schedule: {other} (expected every-day or every-other-day)"
            )),
        }
    }
}

/// Time of day splitting "deliver tomorrow" from "deliver the day after".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CutoffPolicy {
    pub hour: u32,
    pub minute: u32,
}

impl CutoffPolicy {
    pub const STANDARD: Self = Self {
        hour: 13,
        minute: 30,
    };

    pub fn deadline(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or(NaiveTime::MIN)
    }

    /// Tomorrow when ordering strictly before the deadline, otherwise the
    /// day after tomorrow. `None` when that date is not representable.
    pub fn first_deliverable_date(&self, clock: &Clock) -> Option<NaiveDate> {
        let lead_days = if clock.time_of_day() < self.deadline() {
            1
        } else {
            2
        };
        let date = checked_add_days(clock.today(), lead_days);
        if date.is_none() {
            warn!(today = %clock.today(), "first deliverable date out of range");
        }
        date
    }
}

impl Default for CutoffPolicy {
    fn default() -> Self {
        Self::STANDARD
    }
}

pub fn first_deliverable_date(clock: &Clock) -> Option<NaiveDate> {
    CutoffPolicy::STANDARD.first_deliverable_date(clock)
}

/// Inclusive `[first deliverable date, clock date + N months]`. Empty when
/// there is no first deliverable date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AvailabilityWindow {
    pub first: NaiveDate,
    pub last: NaiveDate,
}

impl AvailabilityWindow {
    pub fn new(clock: &Clock, max_months_ahead: u32) -> Self {
        match first_available_day(clock) {
            Some(first) => Self {
                first,
                last: last_available_day(clock, max_months_ahead),
            },
            None => Self::EMPTY,
        }
    }

    const EMPTY: Self = Self {
        first: NaiveDate::MAX,
        last: NaiveDate::MIN,
    };

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.first && date <= self.last
    }
}

pub fn first_available_day(clock: &Clock) -> Option<NaiveDate> {
    first_deliverable_date(clock)
}

/// Saturates at `NaiveDate::MAX`.
pub fn last_available_day(clock: &Clock, max_months_ahead: u32) -> NaiveDate {
    clock
        .today()
        .checked_add_months(Months::new(max_months_ahead))
        .unwrap_or(NaiveDate::MAX)
}

/// Every-other-day cadence: deliveries fall on even offsets from the first
/// delivery day, which itself is offset 0.
pub fn is_delivery_day(date: NaiveDate, first_delivery_day: NaiveDate) -> bool {
    let offset = days_between(first_delivery_day, date);
    offset >= 0 && offset % 2 == 0
}

/// Whether the range calendar may select `date` as a delivery day.
pub fn is_available(
    date: NaiveDate,
    clock: &Clock,
    max_months_ahead: u32,
    schedule: DeliverySchedule,
) -> bool {
    DeliveryGate::new(clock, max_months_ahead, schedule).is_selectable(date)
}

/// Whether the single-date picker may preview `date`. Cadence is ignored on
/// purpose: the picker browses program days, not deliveries.
pub fn is_available_for_picker(date: NaiveDate, clock: &Clock, max_months_ahead: u32) -> bool {
    PreviewGate::new(clock, max_months_ahead).is_selectable(date)
}

/// Gate for the range calendar: window plus delivery cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryGate {
    window: AvailabilityWindow,
    schedule: DeliverySchedule,
}

impl DeliveryGate {
    pub fn new(clock: &Clock, max_months_ahead: u32, schedule: DeliverySchedule) -> Self {
        Self {
            window: AvailabilityWindow::new(clock, max_months_ahead),
            schedule,
        }
    }
}

impl DayGate for DeliveryGate {
    fn is_selectable(&self, date: NaiveDate) -> bool {
        if !self.window.contains(date) {
            trace!(date = %date, "outside availability window");
            return false;
        }
        match self.schedule {
            DeliverySchedule::EveryDay => true,
            DeliverySchedule::EveryOtherDay => is_delivery_day(date, self.window.first),
        }
    }
}

/// Gate for the single-date picker: window only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewGate {
    window: AvailabilityWindow,
}

impl PreviewGate {
    pub fn new(clock: &Clock, max_months_ahead: u32) -> Self {
        Self {
            window: AvailabilityWindow::new(clock, max_months_ahead),
        }
    }
}

impl DayGate for PreviewGate {
    fn is_selectable(&self, date: NaiveDate) -> bool {
        self.window.contains(date)
    }
}

/// A delivery time window such as `06:00-07:00`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliverySlot {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl fmt::Display for DeliverySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

impl FromStr for DeliverySlot {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| anyhow!("expected HH:MM-HH:MM, got: {s}"))?;
        let start = NaiveTime::parse_from_str(start.trim(), "%H:%M")
            .with_context(|| format!("invalid slot start in {s}"))?;
        let end = NaiveTime::parse_from_str(end.trim(), "%H:%M")
            .with_context(|| format!("invalid slot end in {s}"))?;
        if end <= start {
            return Err(anyhow!("delivery slot must end after it starts: {s}"));
        }
        Ok(Self { start, end })
    }
}

impl Serialize for DeliverySlot {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Parses a comma-separated slot list; blank entries are skipped.
pub fn parse_slots(raw: &str) -> anyhow::Result<Vec<DeliverySlot>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::parse)
        .collect()
}

/// `Ближайшая доставка 2 сентября с 06:00 до 07:00`
pub fn nearest_delivery_text(clock: &Clock, slots: &[DeliverySlot]) -> Option<String> {
    let date = format_short_date(first_deliverable_date(clock)?);
    let window = slots
        .first()
        .map(|slot| {
            format!(
                "с {} до {}",
                slot.start.format("%H:%M"),
                slot.end.format("%H:%M")
            )
        })
        .unwrap_or_else(|| FALLBACK_SLOT_TEXT.to_string());
    Some(format!("Ближайшая доставка {date} {window}"))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{
        AvailabilityWindow, CutoffPolicy, DeliverySchedule, DeliverySlot,
        first_deliverable_date, is_available, is_available_for_picker, is_delivery_day,
        nearest_delivery_text, parse_slots,
    };
    use crate::clock::Clock;
    use crate::datetime::days_between;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn clock(raw: &str) -> Clock {
        Clock::parse(raw).expect("clock")
    }

    #[test]
    fn cutoff_splits_at_half_past_one() {
        let cases = [
            ("2025-09-01T10:00", ymd(2025, 9, 2)),
            ("2025-09-01T13:29:59", ymd(2025, 9, 2)),
            ("2025-09-01T13:30", ymd(2025, 9, 3)),
            ("2025-09-01T15:00", ymd(2025, 9, 3)),
            ("2025-09-30T23:59", ymd(2025, 10, 2)),
        ];
        for (now, expected) in cases {
            assert_eq!(first_deliverable_date(&clock(now)), Some(expected), "{now}");
        }
    }

    #[test]
    fn custom_cutoff_moves_the_boundary() {
        let policy = CutoffPolicy { hour: 9, minute: 0 };
        assert_eq!(
            policy.first_deliverable_date(&clock("2025-09-01T10:00")),
            Some(ymd(2025, 9, 3))
        );
    }

    #[test]
    fn every_other_day_alternates_from_first_delivery() {
        let now = clock("2025-09-01T10:00");
        let schedule = DeliverySchedule::EveryOtherDay;
        assert!(is_available(ymd(2025, 9, 2), &now, 6, schedule));
        assert!(!is_available(ymd(2025, 9, 3), &now, 6, schedule));
        assert!(is_available(ymd(2025, 9, 4), &now, 6, schedule));
        assert!(is_available_for_picker(ymd(2025, 9, 3), &now, 6));
    }

    #[test]
    fn window_bounds_apply_to_both_variants() {
        let now = clock("2025-09-01T15:00");
        for schedule in [DeliverySchedule::EveryDay, DeliverySchedule::EveryOtherDay] {
            assert!(!is_available(ymd(2025, 9, 1), &now, 6, schedule));
            assert!(!is_available(ymd(2025, 9, 2), &now, 6, schedule));
            assert!(is_available(ymd(2025, 9, 3), &now, 6, schedule));
        }
        assert!(!is_available_for_picker(ymd(2025, 9, 2), &now, 6));

        let window = AvailabilityWindow::new(&now, 6);
        assert_eq!(window.last, ymd(2026, 3, 1));
        assert!(is_available_for_picker(ymd(2026, 3, 1), &now, 6));
        assert!(!is_available_for_picker(ymd(2026, 3, 2), &now, 6));
        assert!(is_available(ymd(2026, 3, 1), &now, 6, DeliverySchedule::EveryDay));
    }

    #[test]
    fn every_day_accepts_whole_window() {
        let now = clock("2025-09-01T10:00");
        let window = AvailabilityWindow::new(&now, 6);
        for day in window.first.iter_days().take_while(|day| *day <= window.last) {
            assert!(is_available(day, &now, 6, DeliverySchedule::EveryDay), "{day}");
        }
    }

    #[test]
    fn every_other_day_alternates_across_whole_window() {
        let now = clock("2025-09-01T10:00");
        let window = AvailabilityWindow::new(&now, 6);
        let schedule = DeliverySchedule::EveryOtherDay;
        let mut accepted = 0;
        for day in window.first.iter_days().take_while(|day| *day <= window.last) {
            let even = days_between(window.first, day) % 2 == 0;
            assert_eq!(is_available(day, &now, 6, schedule), even, "{day}");
            accepted += usize::from(even);
        }
        // 2025-09-02 ..= 2026-03-01 is 181 days.
        assert_eq!(accepted, 91);
    }

    #[test]
    fn last_representable_day_is_never_selectable() {
        let end_of_time = NaiveDate::MAX.and_hms_opt(10, 0, 0).expect("time");
        let now = Clock::new(end_of_time);
        assert_eq!(first_deliverable_date(&now), None);
        let window = AvailabilityWindow::new(&now, 6);
        assert!(window.first > window.last);
        for schedule in [DeliverySchedule::EveryDay, DeliverySchedule::EveryOtherDay] {
            assert!(!is_available(NaiveDate::MAX, &now, 6, schedule));
        }
        assert!(!is_available_for_picker(NaiveDate::MAX, &now, 6));
        assert_eq!(nearest_delivery_text(&now, &[]), None);

        // Tomorrow exists but the six-month bound saturates.
        let eve = Clock::new(
            NaiveDate::MAX
                .pred_opt()
                .and_then(|day| day.and_hms_opt(10, 0, 0))
                .expect("time"),
        );
        let window = AvailabilityWindow::new(&eve, 6);
        assert_eq!((window.first, window.last), (NaiveDate::MAX, NaiveDate::MAX));
        assert!(is_available(NaiveDate::MAX, &eve, 6, DeliverySchedule::EveryOtherDay));
    }

    #[test]
    fn delivery_day_parity_rejects_dates_before_anchor() {
        let first = ymd(2025, 9, 2);
        assert!(!is_delivery_day(ymd(2025, 8, 31), first));
        assert!(is_delivery_day(ymd(2025, 9, 30), first));
        assert!(!is_delivery_day(ymd(2025, 9, 29), first));
    }

    #[test]
    fn schedule_and_slot_parsing() {
        assert_eq!(
            "every-other-day".parse::<DeliverySchedule>().expect("parse"),
            DeliverySchedule::EveryOtherDay
        );
        assert_eq!(DeliverySchedule::default().to_string(), "every-day");
        assert!("weekly".parse::<DeliverySchedule>().is_err());

        let slots = parse_slots("06:00-07:00, 07:00 - 08:00,").expect("slots");
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[1].to_string(), "07:00-08:00");
        assert!("08:00-07:00".parse::<DeliverySlot>().is_err());
    }

    #[test]
    fn nearest_delivery_banner_uses_first_slot() {
        let now = clock("2025-09-01T10:00");
        let slots = parse_slots("07:00-08:00,08:00-09:00").expect("slots");
        assert_eq!(
            nearest_delivery_text(&now, &slots).as_deref(),
            Some("Ближайшая доставка 2 сентября с 07:00 до 08:00")
        );
        assert_eq!(
            nearest_delivery_text(&now, &[]).as_deref(),
            Some("Ближайшая доставка 2 сентября с 06:00 до 07:00")
        );
    }
}
