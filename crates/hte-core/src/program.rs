use std::fmt;
use std::num::NonZeroU32;

use chrono::NaiveDate;
use serde::{Serialize, Serializer};

use crate::datetime::days_between;

/// A meal program that repeats every `duration` days, starting at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgramCalendar {
    pub start: NaiveDate,
    pub duration: NonZeroU32,
}

impl ProgramCalendar {
    pub fn new(start: NaiveDate, duration: NonZeroU32) -> Self {
        Self { start, duration }
    }

    pub fn day_index(&self, date: NaiveDate) -> u32 {
        program_day_index(date, self.start, self.duration)
    }

    pub fn day_key(&self, date: NaiveDate) -> ProgramDayKey {
        ProgramDayKey::from_index(self.day_index(date))
    }
}

/// Zero-based position of `date` within a repeating program. Dates before
/// the start resolve to day 0.
pub fn program_day_index(date: NaiveDate, start: NaiveDate, duration: NonZeroU32) -> u32 {
    let diff = days_between(start, date);
    if diff < 0 {
        return 0;
    }
    let duration = i64::from(duration.get());
    let index = (diff % duration).min(duration - 1);
    u32::try_from(index).unwrap_or(0)
}

/// `day-<n>`, 1-based; the dish gallery looks menus up by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProgramDayKey(u32);

impl ProgramDayKey {
    pub fn from_index(index: u32) -> Self {
        Self(index.saturating_add(1))
    }

    pub fn day_number(&self) -> u32 {
        self.0
    }
}

impl Default for ProgramDayKey {
    fn default() -> Self {
        Self(1)
    }
}

impl fmt::Display for ProgramDayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "day-{}", self.0)
    }
}

impl Serialize for ProgramDayKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}
