use std::fs;
use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, anyhow};
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::cli::Invocation;
use crate::clock::Clock;
use crate::config::Config;
use crate::date_picker::PickOutcome;
use crate::datetime::{format_short_date, parse_date_arg, parse_month_arg};
use crate::navigator::DayNavigator;
use crate::program::ProgramDayKey;
use crate::range_calendar::{InputSide, RangeSummary};
use crate::render::Renderer;
use crate::schedule::{
    AvailabilityWindow, first_available_day, is_available, is_available_for_picker,
    last_available_day,
};
use crate::session::{EventOutcome, Session, SessionEvent};

const DEFAULT_DAYS_LISTED: usize = 14;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "first-day",
        "check",
        "program-day",
        "day",
        "days",
        "month",
        "range",
        "pick",
        "replay",
        "_commands",
        "_show",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(session, cfg, renderer, inv))]
pub fn dispatch(
    session: &mut Session,
    cfg: &Config,
    renderer: &Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let command = inv.command.as_str();
    debug!(command, args = ?inv.command_args, "dispatching command");

    match command {
        "first-day" => cmd_first_day(session, renderer),
        "check" => cmd_check(session, renderer, &inv.command_args),
        "program-day" => cmd_program_day(session, renderer, &inv.command_args),
        "day" => cmd_day(session, renderer, &inv.command_args),
        "days" => cmd_days(session, renderer, &inv.command_args),
        "month" => cmd_month(session, renderer, &inv.command_args),
        "range" => cmd_range(session, renderer, &inv.command_args),
        "pick" => cmd_pick(session, renderer, &inv.command_args),
        "replay" => cmd_replay(session, renderer, &inv.command_args),
        "_commands" => cmd_commands(),
        "_show" => cmd_show(cfg),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

fn require_clock(session: &Session) -> anyhow::Result<Clock> {
    session
        .settings()
        .clock
        .ok_or_else(|| anyhow!("clock.now is not set; pass --now or set clock.now in the hterc"))
}

fn parse_dates(session: &Session, args: &[String]) -> anyhow::Result<Vec<NaiveDate>> {
    let today = session.reference_date();
    args.iter()
        .map(|arg| parse_date_arg(arg, today))
        .collect()
}

#[instrument(skip(session, renderer))]
fn cmd_first_day(session: &Session, renderer: &Renderer) -> anyhow::Result<()> {
    info!("command first-day");
    let clock = require_clock(session)?;
    let settings = session.settings();
    let first = first_available_day(&clock)
        .ok_or_else(|| anyhow!("no deliverable date after {}", clock.now()))?;
    let last = last_available_day(&clock, settings.max_months_ahead);

    renderer.print_pairs(&[
        ("clock", clock.now().format("%Y-%m-%d %H:%M").to_string()),
        ("schedule", settings.schedule.to_string()),
        (
            "first deliverable",
            format!("{} ({})", first, format_short_date(first)),
        ),
        ("last available", last.to_string()),
        ("days until first", clock.days_until(first).to_string()),
        ("banner", session.nearest_delivery().unwrap_or_default()),
    ])
}

#[instrument(skip(session, renderer, args))]
fn cmd_check(session: &Session, renderer: &Renderer, args: &[String]) -> anyhow::Result<()> {
    info!("command check");
    if args.is_empty() {
        return Err(anyhow!("check requires at least one date"));
    }
    let clock = require_clock(session)?;
    let settings = session.settings();
    let window = AvailabilityWindow::new(&clock, settings.max_months_ahead);

    let pairs: Vec<(&str, String)> = args
        .iter()
        .zip(parse_dates(session, args)?)
        .map(|(raw, date)| {
            let range = is_available(date, &clock, settings.max_months_ahead, settings.schedule);
            let picker = is_available_for_picker(date, &clock, settings.max_months_ahead);
            (
                raw.as_str(),
                format!(
                    "{date}  window={}  delivery={}  preview={}",
                    yes_no(window.contains(date)),
                    yes_no(range),
                    yes_no(picker)
                ),
            )
        })
        .collect();
    renderer.print_pairs(&pairs)
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

#[instrument(skip(session, renderer, args))]
fn cmd_program_day(session: &Session, renderer: &Renderer, args: &[String]) -> anyhow::Result<()> {
    info!("command program-day");
    require_clock(session)?;
    let dates = if args.is_empty() {
        vec![session.reference_date()]
    } else {
        parse_dates(session, args)?
    };

    let program = session.navigator().program();
    if program.is_none() {
        warn!("program.duration is not set; every date resolves to day-1");
    }

    let pairs: Vec<(String, String)> = dates
        .into_iter()
        .map(|date| {
            let (index, key) = match program {
                Some(program) => (program.day_index(date), program.day_key(date)),
                None => (0, ProgramDayKey::default()),
            };
            (date.to_string(), format!("index={index}  {key}"))
        })
        .collect();
    let borrowed: Vec<(&str, String)> = pairs
        .iter()
        .map(|(date, line)| (date.as_str(), line.clone()))
        .collect();
    renderer.print_pairs(&borrowed)
}

/// Applies `prev`, `next`, `<index>`, or `@<date>` moves in order.
#[instrument(skip(session, renderer, args))]
fn cmd_day(session: &mut Session, renderer: &Renderer, args: &[String]) -> anyhow::Result<()> {
    info!("command day");
    require_clock(session)?;

    for arg in args {
        let event = match arg.as_str() {
            "prev" | "previous" => SessionEvent::NavPrevious,
            "next" => SessionEvent::NavNext,
            other => {
                if let Some(raw_date) = other.strip_prefix('@') {
                    let date = parse_date_arg(raw_date, session.reference_date())?;
                    let index = session
                        .navigator()
                        .index_for_date(date)
                        .ok_or_else(|| anyhow!("{date} is outside the 180-day navigator horizon"))?;
                    SessionEvent::NavIndex(index)
                } else {
                    let index = other.parse::<usize>().with_context(|| {
                        format!("expected prev, next, an index or @date: {other}")
                    })?;
                    SessionEvent::NavIndex(index)
                }
            }
        };
        if session.apply(event) == EventOutcome::Applied(false) {
            debug!(arg = %arg, "navigator move had no effect");
        }
    }

    renderer.print_current_day(session.navigator())
}

#[instrument(skip(session, renderer, args))]
fn cmd_days(session: &Session, renderer: &Renderer, args: &[String]) -> anyhow::Result<()> {
    info!("command days");
    require_clock(session)?;
    let count = match args.first() {
        Some(raw) => raw
            .parse::<usize>()
            .with_context(|| format!("invalid day count: {raw}"))?,
        None => DEFAULT_DAYS_LISTED,
    };
    let navigator: &DayNavigator = session.navigator();
    let days = navigator.days();
    let shown = &days[..count.min(days.len())];
    renderer.print_day_table(shown, navigator.current_index())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MonthTarget {
    Range,
    Picker,
}

#[instrument(skip(session, renderer, args))]
fn cmd_month(session: &mut Session, renderer: &Renderer, args: &[String]) -> anyhow::Result<()> {
    info!("command month");
    require_clock(session)?;

    let mut target = MonthTarget::Range;
    let mut rest = args;
    if let Some(first) = args.first() {
        match first.as_str() {
            "range" => {
                rest = &args[1..];
            }
            "picker" => {
                target = MonthTarget::Picker;
                rest = &args[1..];
            }
            _ => {}
        }
    }

    if let Some(raw) = rest.first() {
        let steps = month_steps(session, raw)?;
        let (forward, backward) = match target {
            MonthTarget::Range => (SessionEvent::RangeNextMonth, SessionEvent::RangePreviousMonth),
            MonthTarget::Picker => {
                (SessionEvent::PickerNextMonth, SessionEvent::PickerPreviousMonth)
            }
        };
        let event = if steps >= 0 { forward } else { backward };
        for _ in 0..steps.unsigned_abs() {
            if session.apply(event) == EventOutcome::Applied(false) {
                debug!(steps, "month navigation stopped at window bound");
                break;
            }
        }
    }

    match target {
        MonthTarget::Range => renderer.print_range_month(session.range()),
        MonthTarget::Picker => renderer.print_picker_month(session.picker()),
    }
}

/// `+N`/`-N` relative steps, or a `YYYY-MM` month turned into steps from
/// the clock's month.
fn month_steps(session: &Session, raw: &str) -> anyhow::Result<i32> {
    if raw.starts_with('+') || raw.starts_with('-') {
        return raw
            .parse::<i32>()
            .with_context(|| format!("invalid month offset: {raw}"));
    }
    let month = parse_month_arg(raw)?;
    let today = session.reference_date();
    let years = i64::from(month.year()) - i64::from(today.year());
    let months = i64::from(month.month()) - i64::from(today.month());
    i32::try_from(years * 12 + months).with_context(|| format!("month out of range: {raw}"))
}

/// Output of the `range` command: what the pricing popup and cart read.
#[derive(Debug, Serialize)]
struct RangeReport {
    #[serde(flatten)]
    summary: RangeSummary,
    cart_range: Option<String>,
    cart_dates: Option<String>,
    delivery_slot: Option<String>,
}

#[instrument(skip(session, renderer, args))]
fn cmd_range(session: &mut Session, renderer: &Renderer, args: &[String]) -> anyhow::Result<()> {
    info!("command range");
    require_clock(session)?;
    if args.len() < 2 {
        return Err(anyhow!("range requires <start> <end> [excluded...]"));
    }
    let dates = parse_dates(session, args)?;

    session.apply(SessionEvent::RangeOpen(InputSide::Start));
    for (position, date) in dates.iter().copied().enumerate() {
        if position >= 2 && !session.range().selection().contains(date) {
            return Err(anyhow!("excluded date {date} lies outside the selected range"));
        }
        let outcome = session.apply(SessionEvent::RangeClick(date));
        if let EventOutcome::Range(result) = outcome
            && !result.changed_selection()
        {
            let role = match position {
                0 => "start",
                1 => "end",
                _ => "excluded",
            };
            return Err(anyhow!(
                "{role} date {date} is not available for {} delivery",
                session.settings().schedule
            ));
        }
        if position >= 2 && !session.range().selection().is_excluded(date) {
            warn!(date = %date, "date toggled back in; listed twice?");
        }
    }

    let published = session.published();
    let summary = published.range.clone();
    renderer.print_json(&RangeReport {
        cart_range: summary.cart_range_field(),
        cart_dates: summary.cart_dates_field(),
        delivery_slot: published.delivery_slot.map(|slot| slot.to_string()),
        summary,
    })
}

#[instrument(skip(session, renderer, args))]
fn cmd_pick(session: &mut Session, renderer: &Renderer, args: &[String]) -> anyhow::Result<()> {
    info!("command pick");
    require_clock(session)?;
    let raw = args
        .first()
        .ok_or_else(|| anyhow!("pick requires a date"))?;
    let date = parse_date_arg(raw, session.reference_date())?;

    session.apply(SessionEvent::PickerOpen);
    match session.apply(SessionEvent::PickerClick(date)) {
        EventOutcome::Pick(PickOutcome::Unavailable) => {
            return Err(anyhow!("{date} is outside the selectable window"));
        }
        EventOutcome::Pick(PickOutcome::Selected {
            navigator_index: None,
            ..
        }) => {
            warn!(date = %date, "date is past the navigator horizon; current day unchanged");
        }
        _ => {}
    }
    renderer.print_current_day(session.navigator())
}

#[instrument(skip(session, renderer, args))]
fn cmd_replay(session: &mut Session, renderer: &Renderer, args: &[String]) -> anyhow::Result<()> {
    info!("command replay");
    let script = match args.first().map(String::as_str) {
        Some("-") | None => {
            let mut stdin = String::new();
            io::stdin()
                .read_to_string(&mut stdin)
                .context("failed reading stdin")?;
            stdin
        }
        Some(path) => fs::read_to_string(Path::new(path))
            .with_context(|| format!("failed to read {path}"))?,
    };

    let applied = replay_script(session, &script)?;
    debug!(applied, "replay finished");
    renderer.print_json(&session.snapshot())
}

/// Applies one event per line; blank lines and `#` comments are skipped.
/// Returns the number of events applied.
pub fn replay_script(session: &mut Session, script: &str) -> anyhow::Result<usize> {
    let mut applied = 0;
    for (line_num, raw_line) in script.lines().enumerate() {
        let line = raw_line
            .split_once('#')
            .map_or(raw_line, |(before, _)| before)
            .trim();
        if line.is_empty() {
            continue;
        }
        let event = session
            .parse_event(line)
            .with_context(|| format!("replay line {}: {raw_line}", line_num + 1))?;
        let outcome = session.apply(event);
        debug!(line = line_num + 1, ?event, ?outcome, "applied event");
        applied += 1;
    }
    Ok(applied)
}

fn cmd_commands() -> anyhow::Result<()> {
    for command in known_command_names() {
        println!("{command}");
    }
    Ok(())
}

fn cmd_show(cfg: &Config) -> anyhow::Result<()> {
    for (k, v) in cfg.iter() {
        println!("{k}={v}");
    }
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "Commands: first-day, check <date>..., program-day [date...], \
         day [prev|next|<index>|@<date>]..., days [count], \
         month [range|picker] [YYYY-MM|+N|-N], range <start> <end> [excluded...], \
         pick <date>, replay [file|-], _commands, _show, help, version"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use super::{expand_command_abbrev, known_command_names, replay_script};
    use crate::clock::Clock;
    use crate::session::{Session, SessionSettings};

    #[test]
    fn abbreviations_resolve_when_unique() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("ra", &known), Some("range"));
        assert_eq!(expand_command_abbrev("re", &known), Some("replay"));
        assert_eq!(expand_command_abbrev("day", &known), Some("day"));
        assert_eq!(expand_command_abbrev("da", &known), None);
        assert_eq!(expand_command_abbrev("zzz", &known), None);
    }

    #[test]
    fn replay_skips_comments_and_reports_bad_lines() {
        let mut session = Session::bootstrap(SessionSettings {
            clock: Some(Clock::parse("2025-09-01T10:00").expect("clock")),
            program_duration: NonZeroU32::new(5),
            ..SessionSettings::default()
        });
        let script = "\
# week one
range.open start
range.click 2025-09-05 # friday

range.click 2025-09-10
range.click 2025-09-07
";
        assert_eq!(replay_script(&mut session, script).expect("replay"), 4);
        assert_eq!(session.published().range.day_count, 5);

        let err = replay_script(&mut session, "range.click whenever\n").expect_err("bad line");
        assert!(format!("{err:#}").contains("replay line 1"));
    }

    #[test]
    fn replay_rejects_offsets_past_the_calendar() {
        let mut session = Session::bootstrap(SessionSettings {
            clock: Some(Clock::parse("2025-09-01T10:00").expect("clock")),
            ..SessionSettings::default()
        });
        for script in [
            "range.open start\nrange.click +999999999999999d\n",
            "picker.open\npicker.click +9999999999999999w\n",
        ] {
            let err = replay_script(&mut session, script).expect_err(script);
            let message = format!("{err:#}");
            assert!(message.contains("replay line 2"), "{message}");
            assert!(message.contains("date offset out of range"), "{message}");
        }
        assert_eq!(session.published().range.start_date, None);
    }
}
