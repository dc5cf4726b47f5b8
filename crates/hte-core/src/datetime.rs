use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Months,
  NaiveDate,
  NaiveDateTime,
  TimeDelta,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "hte-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "HTE_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "HTE_TIME_CONFIG";
const DEFAULT_STORE_TIMEZONE: &str =
  "Europe/Moscow";

const WEEKDAY_NAMES: [&str; 7] = [
  "Понедельник",
  "Вторник",
  "Среда",
  "Четверг",
  "Пятница",
  "Суббота",
  "Воскресенье"
];

/// Column headers for a Monday-first
/// month grid.
pub const WEEKDAY_SHORT_LABELS: [&str;
  7] = [
  "Пн", "Вт", "Ср", "Чт", "Пт", "Сб",
  "Вс"
];

const MONTHS_GENITIVE: [&str; 12] = [
  "января",
  "февраля",
  "марта",
  "апреля",
  "мая",
  "июня",
  "июля",
  "августа",
  "сентября",
  "октября",
  "ноября",
  "декабря"
];

const MONTHS_NOMINATIVE: [&str; 12] = [
  "Январь",
  "Февраль",
  "Март",
  "Апрель",
  "Май",
  "Июнь",
  "Июль",
  "Август",
  "Сентябрь",
  "Октябрь",
  "Ноябрь",
  "Декабрь"
];

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Timezone the storefront operates
/// in. Offset-carrying clock values are
/// converted into it before any date
/// math happens.
pub fn store_timezone() -> &'static Tz {
  static STORE_TZ: OnceLock<Tz> =
    OnceLock::new();
  STORE_TZ.get_or_init(
    resolve_store_timezone
  )
}

fn resolve_store_timezone() -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    )
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  parse_timezone(
    DEFAULT_STORE_TIMEZONE,
    "DEFAULT_STORE_TIMEZONE"
  )
  .unwrap_or_else(|| {
    tracing::error!(
      "failed to parse fallback \
       timezone; using UTC"
    );
    chrono_tz::UTC
  })
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &PathBuf
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let timezone =
    match timezone_from_toml(&raw) {
      | Ok(timezone) => timezone,
      | Err(err) => {
        tracing::error!(
          file = %path.display(),
          error = %err,
          "failed parsing timezone config file"
        );
        return None;
      }
    };
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn timezone_from_toml(
  raw: &str
) -> anyhow::Result<Option<String>> {
  let parsed =
    toml::from_str::<TimezoneConfig>(
      raw
    )
    .context(
      "invalid timezone config"
    )?;
  Ok(parsed.timezone.or_else(|| {
    parsed
      .time
      .and_then(|section| {
        section.timezone
      })
  }))
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::debug!(
        source,
        timezone = %trimmed,
        "configured store timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

/// Parses the injected "current
/// moment". RFC 3339 values are moved
/// into the store timezone; naive forms
/// are taken as store-local wall time.
#[tracing::instrument(fields(input = input))]
pub fn parse_clock_expr(
  input: &str
) -> anyhow::Result<NaiveDateTime> {
  let token = input.trim();
  if token.is_empty() {
    return Err(anyhow!(
      "clock value cannot be empty"
    ));
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(
      dt.with_timezone(
        store_timezone()
      )
      .naive_local()
    );
  }

  for fmt in [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M"
  ] {
    if let Ok(ndt) =
      NaiveDateTime::parse_from_str(
        token, fmt
      )
    {
      return Ok(ndt);
    }
  }

  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return date
      .and_hms_opt(0, 0, 0)
      .ok_or_else(|| {
        anyhow!(
          "failed to construct \
           midnight for clock date"
        )
      });
  }

  Err(anyhow!(
    "unrecognized clock value: \
     {input}"
  ))
  .with_context(|| {
    "supported formats: RFC3339, \
     YYYY-MM-DDTHH:MM[:SS], \
     YYYY-MM-DD HH:MM[:SS], YYYY-MM-DD"
  })
}

/// Parses a calendar date argument.
/// Relative forms resolve against
/// `today`, which callers derive from
/// the injected clock.
#[tracing::instrument(skip(today), fields(input = input))]
pub fn parse_date_arg(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  match lower.as_str() {
    | "today" => return Ok(today),
    | "tomorrow" => {
      return offset_date(
        today, 1, input
      );
    }
    | "yesterday" => {
      return offset_date(
        today, -1, input
      );
    }
    | _ => {}
  }

  if let Some(target_weekday) =
    parse_weekday_name(&lower)
  {
    return offset_date(
      today,
      days_to_next_weekday(
        today,
        target_weekday
      ),
      input
    );
  }

  let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dw])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

  if let Some(caps) =
    rel_re.captures(&lower)
  {
    let sign = caps
      .name("sign")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative sign")
      })?;
    let num: i64 = caps
      .name("num")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!(
          "missing relative amount"
        )
      })?
      .parse()
      .context(
        "invalid relative number"
      )?;
    let unit = caps
      .name("unit")
      .map(|m| m.as_str())
      .ok_or_else(|| {
        anyhow!("missing relative unit")
      })?;

    let days = match unit {
      | "d" => num,
      | "w" => {
        num.checked_mul(7).ok_or_else(
          || {
            anyhow!(
              "date offset out of \
               range: {input}"
            )
          }
        )?
      }
      | _ => {
        return Err(anyhow!(
          "unknown relative unit: \
           {unit}"
        ));
      }
    };

    let signed = if sign == "-" {
      -days
    } else {
      days
    };
    return offset_date(
      today, signed, input
    );
  }

  for fmt in ["%Y-%m-%d", "%d.%m.%Y"] {
    if let Ok(date) =
      NaiveDate::parse_from_str(
        token, fmt
      )
    {
      return Ok(date);
    }
  }

  Err(anyhow!(
    "unrecognized date: {input}"
  ))
  .with_context(|| {
    "supported formats: \
     today/tomorrow/yesterday, \
     weekday names (e.g. friday), \
     +Nd/-Nd/+Nw, YYYY-MM-DD, \
     DD.MM.YYYY"
  })
}

/// Parses `YYYY-MM` into the first day
/// of that month.
pub fn parse_month_arg(
  input: &str
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  NaiveDate::parse_from_str(
    &format!("{token}-01"),
    "%Y-%m-%d"
  )
  .with_context(|| {
    format!(
      "expected YYYY-MM, got: {input}"
    )
  })
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

fn offset_date(
  today: NaiveDate,
  days: i64,
  input: &str
) -> anyhow::Result<NaiveDate> {
  checked_add_days(today, days)
    .ok_or_else(|| {
      anyhow!(
        "date offset out of range: \
         {input}"
      )
    })
}

fn days_to_next_weekday(
  from: NaiveDate,
  target: Weekday
) -> i64 {
  let from_idx = from
    .weekday()
    .num_days_from_monday()
    as i64;
  let target_idx = target
    .num_days_from_monday()
    as i64;
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  delta
}

/// `None` when the result falls outside
/// the representable date range.
pub fn checked_add_days(
  date: NaiveDate,
  days: i64
) -> Option<NaiveDate> {
  TimeDelta::try_days(days).and_then(
    |delta| {
      date.checked_add_signed(delta)
    }
  )
}

/// Month arithmetic clamps the day to
/// the end of the target month
/// (Aug 31 + 6 months = Feb 28/29).
pub fn shift_months(
  date: NaiveDate,
  months: i32
) -> NaiveDate {
  let magnitude =
    Months::new(months.unsigned_abs());
  let shifted = if months >= 0 {
    date.checked_add_months(magnitude)
  } else {
    date.checked_sub_months(magnitude)
  };
  shifted.unwrap_or(date)
}

pub fn first_day_of_month(
  date: NaiveDate
) -> NaiveDate {
  date.with_day(1).unwrap_or(date)
}

pub fn last_day_of_month(
  date: NaiveDate
) -> NaiveDate {
  first_day_of_month(date)
    .checked_add_months(Months::new(1))
    .and_then(|next| next.pred_opt())
    .unwrap_or(NaiveDate::MAX)
}

pub fn days_in_month(
  date: NaiveDate
) -> u32 {
  last_day_of_month(date).day()
}

/// Whole days from `from` to `to`;
/// negative when `to` is earlier.
pub fn days_between(
  from: NaiveDate,
  to: NaiveDate
) -> i64 {
  to.signed_duration_since(from)
    .num_days()
}

/// `Понедельник, 1 сентября`
pub fn format_day_label(
  date: NaiveDate
) -> String {
  let weekday = WEEKDAY_NAMES[date
    .weekday()
    .num_days_from_monday()
    as usize];
  format!(
    "{weekday}, {}",
    format_short_date(date)
  )
}

/// `1 сентября`
pub fn format_short_date(
  date: NaiveDate
) -> String {
  format!(
    "{} {}",
    date.day(),
    MONTHS_GENITIVE[date.month0()
      as usize]
  )
}

/// `01.09.2025`, the format of the
/// date input fields.
pub fn format_input_date(
  date: NaiveDate
) -> String {
  date.format("%d.%m.%Y").to_string()
}

/// `Сентябрь 2025`
pub fn format_month_title(
  date: NaiveDate
) -> String {
  format!(
    "{} {}",
    MONTHS_NOMINATIVE[date.month0()
      as usize],
    date.year()
  )
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    Timelike
  };

  use super::{
    checked_add_days,
    days_in_month,
    format_day_label,
    format_input_date,
    format_month_title,
    last_day_of_month,
    parse_clock_expr,
    parse_date_arg,
    parse_month_arg,
    shift_months,
    timezone_from_toml
  };

  fn ymd(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn parses_naive_clock_values() {
    let clock = parse_clock_expr(
      "2025-09-01T10:00"
    )
    .expect("parse clock");
    assert_eq!(
      clock.date(),
      ymd(2025, 9, 1)
    );
    assert_eq!(clock.hour(), 10);

    let midnight =
      parse_clock_expr("2025-09-01")
        .expect("parse date clock");
    assert_eq!(midnight.hour(), 0);
  }

  #[test]
  fn rejects_garbage_clock_values() {
    assert!(
      parse_clock_expr("soon").is_err()
    );
    assert!(
      parse_clock_expr("  ").is_err()
    );
  }

  #[test]
  fn parses_relative_dates_against_today()
   {
    let today = ymd(2025, 9, 1);
    assert_eq!(
      parse_date_arg("+7d", today)
        .expect("relative days"),
      ymd(2025, 9, 8)
    );
    assert_eq!(
      parse_date_arg("-1d", today)
        .expect("negative days"),
      ymd(2025, 8, 31)
    );
    assert_eq!(
      parse_date_arg("+2w", today)
        .expect("relative weeks"),
      ymd(2025, 9, 15)
    );
    assert_eq!(
      parse_date_arg("tomorrow", today)
        .expect("tomorrow"),
      ymd(2025, 9, 2)
    );
  }

  #[test]
  fn rejects_offsets_beyond_date_range()
   {
    let today = ymd(2025, 9, 1);
    for input in [
      "+999999999999999d",
      "-999999999999999d",
      "+9999999999999999w"
    ] {
      let err =
        parse_date_arg(input, today)
          .expect_err(input);
      assert!(
        err
          .to_string()
          .contains("out of range"),
        "{input}: {err}"
      );
    }
    assert!(
      parse_date_arg(
        "tomorrow",
        NaiveDate::MAX
      )
      .is_err()
    );
  }

  #[test]
  fn day_arithmetic_stops_at_bounds() {
    assert_eq!(
      checked_add_days(
        NaiveDate::MAX,
        1
      ),
      None
    );
    assert_eq!(
      checked_add_days(
        ymd(2025, 9, 1),
        i64::MAX
      ),
      None
    );
    assert_eq!(
      checked_add_days(
        NaiveDate::MIN,
        -1
      ),
      None
    );
    assert_eq!(
      checked_add_days(
        ymd(2025, 9, 1),
        -1
      ),
      Some(ymd(2025, 8, 31))
    );
    assert_eq!(
      last_day_of_month(NaiveDate::MAX),
      NaiveDate::MAX
    );
  }

  #[test]
  fn parses_weekday_and_dotted_dates() {
    let monday = ymd(2025, 9, 1);
    assert_eq!(
      parse_date_arg("monday", monday)
        .expect("weekday"),
      ymd(2025, 9, 8)
    );
    assert_eq!(
      parse_date_arg(
        "05.09.2025",
        monday
      )
      .expect("dotted"),
      ymd(2025, 9, 5)
    );
    assert!(
      parse_month_arg("2025-13")
        .is_err()
    );
    assert_eq!(
      parse_month_arg("2025-10")
        .expect("month"),
      ymd(2025, 10, 1)
    );
  }

  #[test]
  fn month_shift_clamps_to_month_end() {
    assert_eq!(
      shift_months(ymd(2025, 8, 31), 6),
      ymd(2026, 2, 28)
    );
    assert_eq!(
      shift_months(ymd(2025, 3, 31), -1),
      ymd(2025, 2, 28)
    );
    assert_eq!(
      days_in_month(ymd(2024, 2, 10)),
      29
    );
  }

  #[test]
  fn formats_russian_labels() {
    assert_eq!(
      format_day_label(ymd(2025, 9, 1)),
      "Понедельник, 1 сентября"
    );
    assert_eq!(
      format_input_date(ymd(2025, 9, 5)),
      "05.09.2025"
    );
    assert_eq!(
      format_month_title(ymd(
        2025, 12, 14
      )),
      "Декабрь 2025"
    );
  }

  #[test]
  fn reads_nested_timezone_table() {
    let tz = timezone_from_toml(
      "[time]\ntimezone = \"Asia/Yekaterinburg\"\n"
    )
    .expect("parse toml");
    assert_eq!(
      tz.as_deref(),
      Some("Asia/Yekaterinburg")
    );
  }
}
