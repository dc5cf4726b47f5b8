use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, error, info, instrument};

use crate::clock::Clock;
use crate::month_grid::{DayGate, MonthCursor, MonthGrid};
use crate::navigator::DayNavigator;
use crate::schedule::PreviewGate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickOutcome {
    Disabled,
    Unavailable,
    /// The date was selected; `navigator_index` is where the navigator
    /// jumped, or `None` when the date lies past its horizon.
    Selected {
        date: NaiveDate,
        navigator_index: Option<usize>,
        close_after: Duration,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PickerCellMark {
    Unavailable,
    Available,
    Selected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PickerCell {
    pub date: NaiveDate,
    pub mark: PickerCellMark,
}

/// Single-date calendar used to jump the day navigator. Every in-window day
/// is selectable regardless of delivery cadence.
#[derive(Debug)]
pub struct DatePicker {
    gate: Option<PreviewGate>,
    cursor: Option<MonthCursor>,
    selected_date: Option<NaiveDate>,
    open: bool,
    close_delay: Duration,
}

impl DatePicker {
    pub fn new(clock: Option<Clock>, max_months_ahead: u32, close_delay: Duration) -> Self {
        if clock.is_none() {
            error!("date picker has no clock; picker disabled");
        }
        Self {
            gate: clock.map(|c| PreviewGate::new(&c, max_months_ahead)),
            cursor: clock.map(|c| MonthCursor::new(&c, max_months_ahead)),
            selected_date: None,
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

    pub fn selected_date(&self) -> Option<NaiveDate> {
        self.selected_date
    }

    pub fn cursor(&self) -> Option<&MonthCursor> {
        self.cursor.as_ref()
    }

    pub fn is_selectable(&self, date: NaiveDate) -> bool {
        self.gate.is_some_and(|gate| gate.is_selectable(date))
    }

    pub fn open(&mut self) -> bool {
        if !self.is_enabled() {
            error!("date picker has no clock; open ignored");
            return false;
        }
        // Reopening shows the month of the current selection.
        if let (Some(date), Some(cursor)) = (self.selected_date, self.cursor.as_mut()) {
            cursor.show_month_of(date);
        }
        self.open = true;
        true
    }

    pub fn close(&mut self) {
        self.open = false;
    }

    /// Selects `date` and repositions `navigator` on it when the date falls
    /// inside the navigator's horizon.
    #[instrument(skip(self, navigator))]
    pub fn select(&mut self, date: NaiveDate, navigator: &mut DayNavigator) -> PickOutcome {
        if !self.is_enabled() {
            error!("date picker has no clock; click ignored");
            return PickOutcome::Disabled;
        }
        if !self.is_selectable(date) {
            debug!("date outside picker window; click ignored");
            return PickOutcome::Unavailable;
        }

        self.selected_date = Some(date);
        let navigator_index = navigator.index_for_date(date);
        match navigator_index {
            Some(index) => {
                navigator.set_current_index(index);
                info!(index, "navigator moved to picked date");
            }
            None => debug!("picked date past navigator horizon; navigator unchanged"),
        }

        PickOutcome::Selected {
            date,
            navigator_index,
            close_after: self.close_delay,
        }
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

    pub fn mark_for(&self, date: NaiveDate) -> PickerCellMark {
        if !self.is_selectable(date) {
            PickerCellMark::Unavailable
        } else if self.selected_date == Some(date) {
            PickerCellMark::Selected
        } else {
            PickerCellMark::Available
        }
    }

    pub fn cells(&self) -> Vec<Vec<Option<PickerCell>>> {
        let Some(grid) = self.grid() else {
            return Vec::new();
        };
        grid.weeks()
            .into_iter()
            .map(|week| {
                week.into_iter()
                    .map(|cell| {
                        cell.map(|day| PickerCell {
                            date: day.date,
                            mark: self.mark_for(day.date),
                        })
                    })
                    .collect()
            })
            .collect()
    }
}
