//! Two-endpoint delivery range picker with per-day exclusions.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::anyhow;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use crate::clock::Clock;
use crate::datetime::{days_between, format_input_date};
use crate::month_grid::{DayGate, MonthCursor, MonthGrid};
use crate::schedule::{DeliveryGate, DeliverySchedule};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputSide {
    #[default]
    Start,
    End,
}

impl fmt::Display for InputSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("start"),
            Self::End => f.write_str("end"),
        }
    }
}

impl FromStr for InputSide {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(Self::Start),
            "end" => Ok(Self::End),
            other => Err(anyhow!("expected start or end, got: {other}")),
        }
    }
}

/// Committed state of the range picker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RangeSelection {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub excluded_dates: BTreeSet<NaiveDate>,
    pub active_input_side: InputSide,
}

impl RangeSelection {
    /// `(min, max)` of the endpoints once both are chosen.
    pub fn bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        let (start, end) = (self.start_date?, self.end_date?);
        Some((start.min(end), start.max(end)))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.bounds()
            .is_some_and(|(min, max)| date >= min && date <= max)
    }

    pub fn is_excluded(&self, date: NaiveDate) -> bool {
        self.excluded_dates.contains(&date)
    }

    /// Inclusive span minus excluded days inside it; 0 while incomplete.
    pub fn day_count(&self) -> u32 {
        let Some((min, max)) = self.bounds() else {
            return 0;
        };
        let span = days_between(min, max) + 1;
        let excluded = self.excluded_dates.range(min..=max).count() as i64;
        u32::try_from(span - excluded).unwrap_or(0)
    }

    /// The dates that will actually be delivered.
    pub fn delivery_dates(&self) -> Vec<NaiveDate> {
        let Some((min, max)) = self.bounds() else {
            return Vec::new();
        };
        min.iter_days()
            .take_while(|day| *day <= max)
            .filter(|day| !self.is_excluded(*day))
            .collect()
    }
}

/// What the pricing and cart collaborators read after every change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RangeSummary {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub excluded_dates: Vec<NaiveDate>,
    pub day_count: u32,
    pub delivery_dates: Vec<NaiveDate>,
}

impl RangeSummary {
    pub fn from_selection(selection: &RangeSelection) -> Self {
        let Some((start, end)) = selection.bounds() else {
            return Self::default();
        };
        Self {
            start_date: Some(start),
            end_date: Some(end),
            excluded_dates: selection.excluded_dates.iter().copied().collect(),
            day_count: selection.day_count(),
            delivery_dates: selection.delivery_dates(),
        }
    }

    /// `Даты доставки: 05.09.2025 - 10.09.2025`
    pub fn cart_range_field(&self) -> Option<String> {
        let (start, end) = (self.start_date?, self.end_date?);
        Some(format!(
            "Даты доставки: {} - {}",
            format_input_date(start),
            format_input_date(end)
        ))
    }

    /// `Массив дат: ["05.09.2025", "06.09.2025"]`
    pub fn cart_dates_field(&self) -> Option<String> {
        if self.delivery_dates.is_empty() {
            return None;
        }
        let quoted = self
            .delivery_dates
            .iter()
            .map(|date| format!("\"{}\"", format_input_date(*date)))
            .collect::<Vec<_>>()
            .join(", ");
        Some(format!("Массив дат: [{quoted}]"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOutcome {
    /// No clock; the calendar accepts no interaction.
    Disabled,
    /// The date is not a selectable delivery day.
    Unavailable,
    ExclusionToggled { date: NaiveDate, excluded: bool },
    StartSelected(NaiveDate),
    /// The end side was set; the calendar should close after `close_after`.
    EndSelected { swapped: bool, close_after: Duration },
}

impl RangeOutcome {
    pub fn changed_selection(&self) -> bool {
        !matches!(self, Self::Disabled | Self::Unavailable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RangeCellMark {
    Unavailable,
    Available,
    Excluded,
    RangeStart,
    RangeEnd,
    RangeMiddle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RangeCell {
    pub date: NaiveDate,
    pub mark: RangeCellMark,
    pub preview: bool,
}

#[derive(Debug)]
pub struct RangeCalendar {
    gate: Option<DeliveryGate>,
    cursor: Option<MonthCursor>,
    selection: RangeSelection,
    hover: Option<NaiveDate>,
    open: bool,
    close_delay: Duration,
}

impl RangeCalendar {
    pub fn new(
        clock: Option<Clock>,
        schedule: DeliverySchedule,
        max_months_ahead: u32,
        close_delay: Duration,
    ) -> Self {
        if clock.is_none() {
            error!("range calendar has no clock; calendar disabled");
        }
        Self {
            gate: clock.map(|c| DeliveryGate::new(&c, max_months_ahead, schedule)),
            cursor: clock.map(|c| MonthCursor::new(&c, max_months_ahead)),
            selection: RangeSelection::default(),
            hover: None,
            open: false,
            close_delay,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.gate.is_some()
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn selection(&self) -> &RangeSelection {
        &self.selection
    }

    pub fn cursor(&self) -> Option<&MonthCursor> {
        self.cursor.as_ref()
    }

    pub fn is_selectable(&self, date: NaiveDate) -> bool {
        self.gate.is_some_and(|gate| gate.is_selectable(date))
    }

    /// Opens the calendar for editing the given input field.
    pub fn open(&mut self, side: InputSide) -> bool {
        if !self.ensure_enabled() {
            return false;
        }
        self.selection.active_input_side = side;
        self.open = true;
        debug!(side = %side, "range calendar opened");
        true
    }

    pub fn close(&mut self) {
        self.open = false;
        self.hover = None;
    }

    #[instrument(skip(self), fields(side = %self.selection.active_input_side))]
    pub fn select(&mut self, date: NaiveDate) -> RangeOutcome {
        if !self.ensure_enabled() {
            return RangeOutcome::Disabled;
        }
        if !self.is_selectable(date) {
            debug!("date not selectable; click ignored");
            return RangeOutcome::Unavailable;
        }

        if self.selection.start_date.is_some()
            && self.selection.end_date.is_some()
            && self.selection.contains(date)
        {
            return self.toggle_exclusion(date);
        }

        match self.selection.active_input_side {
            InputSide::Start => {
                self.selection.start_date = Some(date);
                if self.selection.end_date.is_some_and(|end| end < date) {
                    self.selection.end_date = None;
                }
                self.selection.excluded_dates.clear();
                self.selection.active_input_side = InputSide::End;
                info!(start = %date, "range start selected");
                RangeOutcome::StartSelected(date)
            }
            InputSide::End => {
                self.selection.end_date = Some(date);
                let swapped = match self.selection.start_date {
                    Some(start) if date < start => {
                        self.selection.start_date = Some(date);
                        self.selection.end_date = Some(start);
                        self.selection.excluded_dates.clear();
                        true
                    }
                    _ => false,
                };
                self.hover = None;
                info!(
                    start = ?self.selection.start_date,
                    end = ?self.selection.end_date,
                    swapped,
                    day_count = self.selection.day_count(),
                    "range end selected"
                );
                RangeOutcome::EndSelected {
                    swapped,
                    close_after: self.close_delay,
                }
            }
        }
    }

    fn toggle_exclusion(&mut self, date: NaiveDate) -> RangeOutcome {
        let excluded = if self.selection.excluded_dates.remove(&date) {
            false
        } else {
            self.selection.excluded_dates.insert(date);
            true
        };
        debug!(date = %date, excluded, day_count = self.selection.day_count(), "toggled exclusion");
        RangeOutcome::ExclusionToggled { date, excluded }
    }

    /// Previews the pending range while the end date is being chosen.
    /// Committed state is untouched.
    pub fn hover(&mut self, date: NaiveDate) -> bool {
        let previewing = self.selection.active_input_side == InputSide::End
            && self.selection.start_date.is_some()
            && self.selection.end_date.is_none()
            && self.is_selectable(date);
        self.hover = previewing.then_some(date);
        previewing
    }

    pub fn leave(&mut self) {
        self.hover = None;
    }

    /// Inclusive span highlighted by the hover preview.
    pub fn preview_span(&self) -> Option<(NaiveDate, NaiveDate)> {
        let hover = self.hover?;
        let start = self.selection.start_date?;
        Some((start.min(hover), start.max(hover)))
    }

    pub fn day_count(&self) -> u32 {
        self.selection.day_count()
    }

    pub fn summary(&self) -> RangeSummary {
        RangeSummary::from_selection(&self.selection)
    }

    pub fn reset(&mut self) {
        self.selection = RangeSelection::default();
        self.hover = None;
        debug!("range calendar reset");
    }

    pub fn previous_month(&mut self) -> bool {
        self.cursor.as_mut().is_some_and(MonthCursor::previous)
    }

    pub fn next_month(&mut self) -> bool {
        self.cursor.as_mut().is_some_and(MonthCursor::next)
    }

    pub fn grid(&self) -> Option<MonthGrid> {
        let (gate, cursor) = (self.gate.as_ref()?, self.cursor.as_ref()?);
        Some(MonthGrid::build(cursor.display_month(), gate))
    }

    pub fn mark_for(&self, date: NaiveDate) -> RangeCellMark {
        if !self.is_selectable(date) {
            return RangeCellMark::Unavailable;
        }
        if self.selection.is_excluded(date) {
            return RangeCellMark::Excluded;
        }
        if self.selection.start_date == Some(date) {
            RangeCellMark::RangeStart
        } else if self.selection.end_date == Some(date) {
            RangeCellMark::RangeEnd
        } else if self.selection.contains(date) {
            RangeCellMark::RangeMiddle
        } else {
            RangeCellMark::Available
        }
    }

    /// The displayed month as rows of marked cells.
    pub fn cells(&self) -> Vec<Vec<Option<RangeCell>>> {
        let Some(grid) = self.grid() else {
            return Vec::new();
        };
        let preview = self.preview_span();
        grid.weeks()
            .into_iter()
            .map(|week| {
                week.into_iter()
                    .map(|cell| {
                        cell.map(|day| RangeCell {
                            date: day.date,
                            mark: self.mark_for(day.date),
                            preview: preview
                                .is_some_and(|(min, max)| day.date >= min && day.date <= max),
                        })
                    })
                    .collect()
            })
            .collect()
    }

    fn ensure_enabled(&self) -> bool {
        if self.is_enabled() {
            return true;
        }
        error!("range calendar has no clock; interaction ignored");
        false
    }
}
