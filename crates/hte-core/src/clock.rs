use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::datetime::parse_clock_expr;

/// The injected "current moment" every date computation derives from.
///
/// It is store-local wall time and never sourced from the system clock, so
/// the whole engine stays reproducible for a given configuration. Components
/// receive `Option<Clock>` and disable themselves when it is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Clock {
    now: NaiveDateTime,
}

impl Clock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self { now }
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        parse_clock_expr(raw).map(Self::new)
    }

    pub fn now(&self) -> NaiveDateTime {
        self.now
    }

    pub fn today(&self) -> NaiveDate {
        self.now.date()
    }

    pub fn time_of_day(&self) -> NaiveTime {
        self.now.time()
    }

    /// Days from the clock moment to `target` midnight, rounded up.
    pub fn days_until(&self, target: NaiveDate) -> i64 {
        let Some(midnight) = target.and_hms_opt(0, 0, 0) else {
            return 0;
        };
        let delta = midnight.signed_duration_since(self.now);
        let whole = delta.num_days();
        if delta > chrono::Duration::days(whole) {
            whole + 1
        } else {
            whole
        }
    }
}
