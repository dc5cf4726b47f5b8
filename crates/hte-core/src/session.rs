//! One storefront visit: the single owner of every date component.
//!
//! Components never talk to each other directly. The session applies UI
//! events in order, relays the picker's date into the navigator, and
//! republishes the values downstream collaborators read (program-day key,
//! range summary, delivery slot) after every event.

use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::clock::Clock;
use crate::config::Config;
use crate::date_picker::{DatePicker, PickOutcome};
use crate::datetime::parse_date_arg;
use crate::navigator::DayNavigator;
use crate::program::ProgramDayKey;
use crate::range_calendar::{InputSide, RangeCalendar, RangeOutcome, RangeSummary};
use crate::schedule::{
    DeliverySchedule, DeliverySlot, MAX_MONTHS_AHEAD, first_deliverable_date,
    nearest_delivery_text, parse_slots,
};

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub clock: Option<Clock>,
    pub schedule: DeliverySchedule,
    pub program_duration: Option<NonZeroU32>,
    pub program_name: Option<String>,
    pub slots: Vec<DeliverySlot>,
    pub close_delay: Duration,
    pub max_months_ahead: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            clock: None,
            schedule: DeliverySchedule::EveryDay,
            program_duration: None,
            program_name: None,
            slots: Vec::new(),
            close_delay: Duration::from_millis(300),
            max_months_ahead: MAX_MONTHS_AHEAD,
        }
    }
}

impl SessionSettings {
    #[instrument(skip(cfg))]
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let clock = cfg
            .get("clock.now")
            .map(|raw| Clock::parse(&raw))
            .transpose()
            .context("invalid clock.now")?;

        let schedule = cfg
            .get_parsed::<DeliverySchedule>("delivery.schedule")?
            .unwrap_or_default();

        let program_duration = cfg
            .get_parsed::<u32>("program.duration")?
            .and_then(NonZeroU32::new);

        let slots = cfg
            .get("delivery.slots")
            .map(|raw| parse_slots(&raw))
            .transpose()
            .context("invalid delivery.slots")?
            .unwrap_or_default();

        let close_delay = cfg
            .get_parsed::<u64>("calendar.close_delay_ms")?
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(300));

        Ok(Self {
            clock,
            schedule,
            program_duration,
            program_name: cfg.get("program.name"),
            slots,
            close_delay,
            max_months_ahead: MAX_MONTHS_AHEAD,
        })
    }
}

/// A UI event, parsed from one line of a replay script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    RangeOpen(InputSide),
    RangeClick(NaiveDate),
    RangeHover(NaiveDate),
    RangeLeave,
    RangeClose,
    RangeReset,
    RangePreviousMonth,
    RangeNextMonth,
    PickerOpen,
    PickerClick(NaiveDate),
    PickerClose,
    PickerPreviousMonth,
    PickerNextMonth,
    NavPrevious,
    NavNext,
    NavIndex(usize),
    SelectSlot(DeliverySlot),
}

impl SessionEvent {
    /// Parses `verb [argument]`. Date arguments are resolved against
    /// `today`, the injected clock's date.
    pub fn parse(line: &str, today: NaiveDate) -> anyhow::Result<Self> {
        let mut parts = line.split_whitespace();
        let verb = parts
            .next()
            .ok_or_else(|| anyhow!("empty event"))?;
        let arg = parts.next();
        if let Some(extra) = parts.next() {
            return Err(anyhow!("unexpected trailing argument in event: {extra}"));
        }

        let date = |arg: Option<&str>| -> anyhow::Result<NaiveDate> {
            let raw = arg.ok_or_else(|| anyhow!("{verb} requires a date"))?;
            parse_date_arg(raw, today)
        };
        let bare = |event: Self| -> anyhow::Result<Self> {
            match arg {
                Some(extra) => Err(anyhow!("{verb} takes no argument, got: {extra}")),
                None => Ok(event),
            }
        };

        match verb {
            "range.open" => Ok(Self::RangeOpen(
                arg.map(str::parse::<InputSide>).transpose()?.unwrap_or_default(),
            )),
            "range.click" => Ok(Self::RangeClick(date(arg)?)),
            "range.hover" => Ok(Self::RangeHover(date(arg)?)),
            "range.leave" => bare(Self::RangeLeave),
            "range.close" => bare(Self::RangeClose),
            "range.reset" => bare(Self::RangeReset),
            "range.prev-month" => bare(Self::RangePreviousMonth),
            "range.next-month" => bare(Self::RangeNextMonth),
            "picker.open" => bare(Self::PickerOpen),
            "picker.click" => Ok(Self::PickerClick(date(arg)?)),
            "picker.close" => bare(Self::PickerClose),
            "picker.prev-month" => bare(Self::PickerPreviousMonth),
            "picker.next-month" => bare(Self::PickerNextMonth),
            "nav.prev" => bare(Self::NavPrevious),
            "nav.next" => bare(Self::NavNext),
            "nav.index" => {
                let raw = arg.ok_or_else(|| anyhow!("nav.index requires an index"))?;
                let index = raw
                    .parse::<usize>()
                    .with_context(|| format!("invalid navigator index: {raw}"))?;
                Ok(Self::NavIndex(index))
            }
            "slot" => {
                let raw = arg.ok_or_else(|| anyhow!("slot requires HH:MM-HH:MM"))?;
                Ok(Self::SelectSlot(raw.parse()?))
            }
            other => Err(anyhow!("unknown event: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Range(RangeOutcome),
    Pick(PickOutcome),
    /// Navigation, open/close, and slot events: whether anything moved.
    Applied(bool),
}

/// Values relayed to the collaborators outside the date core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Published {
    pub current_program_day_key: ProgramDayKey,
    pub current_day_text: String,
    pub range: RangeSummary,
    pub picked_date: Option<NaiveDate>,
    pub delivery_slot: Option<DeliverySlot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub clock: Option<Clock>,
    pub schedule: DeliverySchedule,
    pub first_deliverable_date: Option<NaiveDate>,
    pub nearest_delivery: Option<String>,
    pub navigator_index: usize,
    pub range_open: bool,
    pub range_side: InputSide,
    pub range_month: Option<NaiveDate>,
    pub picker_open: bool,
    pub picker_month: Option<NaiveDate>,
    pub published: Published,
}

#[derive(Debug)]
pub struct Session {
    settings: SessionSettings,
    navigator: DayNavigator,
    range: RangeCalendar,
    picker: DatePicker,
    selected_slot: Option<DeliverySlot>,
    published: Published,
}

impl Session {
    /// Builds every component from one settings value. This is the only
    /// readiness point: components exist fully configured or disabled.
    #[instrument(skip_all)]
    pub fn bootstrap(settings: SessionSettings) -> Self {
        match settings.clock {
            Some(clock) => info!(
                clock = %clock.now(),
                schedule = %settings.schedule,
                program = settings.program_name.as_deref().unwrap_or("-"),
                duration = ?settings.program_duration.map(NonZeroU32::get),
                "session ready"
            ),
            None => error!("clock.now is not set; date components disabled"),
        }

        let navigator = DayNavigator::new(settings.clock, settings.program_duration);
        let range = RangeCalendar::new(
            settings.clock,
            settings.schedule,
            settings.max_months_ahead,
            settings.close_delay,
        );
        let picker = DatePicker::new(
            settings.clock,
            settings.max_months_ahead,
            settings.close_delay,
        );
        let selected_slot = settings.slots.first().copied();

        let mut session = Self {
            settings,
            navigator,
            range,
            picker,
            selected_slot,
            published: Published::default(),
        };
        session.publish();
        session
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn navigator(&self) -> &DayNavigator {
        &self.navigator
    }

    pub fn range(&self) -> &RangeCalendar {
        &self.range
    }

    pub fn picker(&self) -> &DatePicker {
        &self.picker
    }

    pub fn published(&self) -> &Published {
        &self.published
    }

    /// Date relative expressions resolve against; the clock's date, or the
    /// epoch when no clock is injected (every component is disabled then).
    pub fn reference_date(&self) -> NaiveDate {
        self.settings
            .clock
            .map(|clock| clock.today())
            .unwrap_or_default()
    }

    pub fn parse_event(&self, line: &str) -> anyhow::Result<SessionEvent> {
        SessionEvent::parse(line, self.reference_date())
    }

    #[instrument(skip(self))]
    pub fn apply(&mut self, event: SessionEvent) -> EventOutcome {
        let outcome = match event {
            SessionEvent::RangeOpen(side) => EventOutcome::Applied(self.range.open(side)),
            SessionEvent::RangeClick(date) => {
                let outcome = self.range.select(date);
                if let RangeOutcome::EndSelected { close_after, .. } = outcome {
                    debug!(delay = ?close_after, "closing range calendar");
                    self.range.close();
                }
                EventOutcome::Range(outcome)
            }
            SessionEvent::RangeHover(date) => EventOutcome::Applied(self.range.hover(date)),
            SessionEvent::RangeLeave => {
                self.range.leave();
                EventOutcome::Applied(true)
            }
            SessionEvent::RangeClose => {
                self.range.close();
                EventOutcome::Applied(true)
            }
            SessionEvent::RangeReset => {
                self.range.reset();
                EventOutcome::Applied(true)
            }
            SessionEvent::RangePreviousMonth => EventOutcome::Applied(self.range.previous_month()),
            SessionEvent::RangeNextMonth => EventOutcome::Applied(self.range.next_month()),
            SessionEvent::PickerOpen => EventOutcome::Applied(self.picker.open()),
            SessionEvent::PickerClick(date) => {
                let outcome = self.picker.select(date, &mut self.navigator);
                if let PickOutcome::Selected { close_after, .. } = outcome {
                    debug!(delay = ?close_after, "closing date picker");
                    self.picker.close();
                }
                EventOutcome::Pick(outcome)
            }
            SessionEvent::PickerClose => {
                self.picker.close();
                EventOutcome::Applied(true)
            }
            SessionEvent::PickerPreviousMonth => {
                EventOutcome::Applied(self.picker.previous_month())
            }
            SessionEvent::PickerNextMonth => EventOutcome::Applied(self.picker.next_month()),
            SessionEvent::NavPrevious => EventOutcome::Applied(self.navigator.go_to_previous_day()),
            SessionEvent::NavNext => EventOutcome::Applied(self.navigator.go_to_next_day()),
            SessionEvent::NavIndex(index) => {
                EventOutcome::Applied(self.navigator.set_current_index(index))
            }
            SessionEvent::SelectSlot(slot) => EventOutcome::Applied(self.select_slot(slot)),
        };
        self.publish();
        outcome
    }

    fn select_slot(&mut self, slot: DeliverySlot) -> bool {
        if !self.settings.slots.contains(&slot) {
            warn!(slot = %slot, "delivery slot not offered; ignored");
            return false;
        }
        self.selected_slot = Some(slot);
        true
    }

    fn publish(&mut self) {
        let next = Published {
            current_program_day_key: self.navigator.current_program_day_key(),
            current_day_text: self.navigator.current_display_text(),
            range: self.range.summary(),
            picked_date: self.picker.selected_date(),
            delivery_slot: self.selected_slot,
        };
        if next != self.published {
            debug!(
                day_key = %next.current_program_day_key,
                day_count = next.range.day_count,
                "published values changed"
            );
            self.published = next;
        }
    }

    pub fn nearest_delivery(&self) -> Option<String> {
        self.settings
            .clock
            .and_then(|clock| nearest_delivery_text(&clock, &self.settings.slots))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            clock: self.settings.clock,
            schedule: self.settings.schedule,
            first_deliverable_date: self.settings.clock.and_then(|c| first_deliverable_date(&c)),
            nearest_delivery: self.nearest_delivery(),
            navigator_index: self.navigator.current_index(),
            range_open: self.range.is_open(),
            range_side: self.range.selection().active_input_side,
            range_month: self.range.cursor().map(|c| c.display_month()),
            picker_open: self.picker.is_open(),
            picker_month: self.picker.cursor().map(|c| c.display_month()),
            published: self.published.clone(),
        }
    }
}
