use std::io::{self, IsTerminal, Write};

use anyhow::{Context, anyhow};
use chrono::Datelike;
use serde::Serialize;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::date_picker::{DatePicker, PickerCellMark};
use crate::datetime::{WEEKDAY_SHORT_LABELS, format_input_date};
use crate::month_grid::MonthCursor;
use crate::navigator::{DayEntry, DayNavigator, is_weekend};
use crate::range_calendar::{RangeCalendar, RangeCellMark};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, calendar))]
    pub fn print_range_month(&self, calendar: &RangeCalendar) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        for line in self.range_month_lines(calendar) {
            writeln!(out, "{line}")?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, picker))]
    pub fn print_picker_month(&self, picker: &DatePicker) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        for line in self.picker_month_lines(picker) {
            writeln!(out, "{line}")?;
        }
        Ok(())
    }

    /// Range calendar grid. Cell suffixes: `[` start, `]` end, `=` inside,
    /// `x` excluded, `~` hover preview, `.` unavailable.
    pub fn range_month_lines(&self, calendar: &RangeCalendar) -> Vec<String> {
        let Some(cursor) = calendar.cursor() else {
            return vec!["calendar disabled: no clock".to_string()];
        };
        let mut lines = self.month_header(cursor);
        for week in calendar.cells() {
            let row: Vec<String> = week
                .into_iter()
                .map(|cell| match cell {
                    None => "    ".to_string(),
                    Some(cell) => {
                        let (suffix, code) = match cell.mark {
                            RangeCellMark::Unavailable => ('.', "90"),
                            RangeCellMark::Excluded => ('x', "31"),
                            RangeCellMark::RangeStart => ('[', "1;32"),
                            RangeCellMark::RangeEnd => (']', "1;32"),
                            RangeCellMark::RangeMiddle => ('=', "32"),
                            RangeCellMark::Available if cell.preview => ('~', "36"),
                            RangeCellMark::Available => (' ', ""),
                        };
                        let text = format!(" {:>2}{suffix}", cell.date.day());
                        self.paint(&text, code)
                    }
                })
                .collect();
            lines.push(row.join(""));
        }
        lines
    }

    /// Picker grid: `*` selected, `.` unavailable.
    pub fn picker_month_lines(&self, picker: &DatePicker) -> Vec<String> {
        let Some(cursor) = picker.cursor() else {
            return vec!["picker disabled: no clock".to_string()];
        };
        let mut lines = self.month_header(cursor);
        for week in picker.cells() {
            let row: Vec<String> = week
                .into_iter()
                .map(|cell| match cell {
                    None => "    ".to_string(),
                    Some(cell) => {
                        let (suffix, code) = match cell.mark {
                            PickerCellMark::Unavailable => ('.', "90"),
                            PickerCellMark::Selected => ('*', "1;33"),
                            PickerCellMark::Available => (' ', ""),
                        };
                        self.paint(&format!(" {:>2}{suffix}", cell.date.day()), code)
                    }
                })
                .collect();
            lines.push(row.join(""));
        }
        lines
    }

    fn month_header(&self, cursor: &MonthCursor) -> Vec<String> {
        let prev = if cursor.can_go_previous() { "<" } else { " " };
        let next = if cursor.can_go_next() { ">" } else { " " };
        let title = cursor.title();
        // Seven four-column cells.
        let inner = 28usize.saturating_sub(4);
        let pad = inner.saturating_sub(UnicodeWidthStr::width(title.as_str()));
        let left = pad / 2;
        let header = format!(
            " {prev}{}{title}{}{next} ",
            " ".repeat(left),
            " ".repeat(pad - left)
        );
        let labels: String = WEEKDAY_SHORT_LABELS
            .iter()
            .map(|label| format!("  {label}"))
            .collect();
        vec![self.paint(&header, "1"), labels]
    }

    #[tracing::instrument(skip(self, days))]
    pub fn print_day_table(&self, days: &[DayEntry], current_index: usize) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let headers = vec![
            "#".to_string(),
            "Date".to_string(),
            "Day".to_string(),
            "Program".to_string(),
        ];
        let rows = days
            .iter()
            .enumerate()
            .map(|(index, day)| {
                let marker = if index == current_index { ">" } else { " " };
                let label = if is_weekend(day.date) {
                    self.paint(&day.display_text, "35")
                } else {
                    day.display_text.clone()
                };
                vec![
                    format!("{marker}{index}"),
                    format_input_date(day.date),
                    label,
                    day.program_day_key().to_string(),
                ]
            })
            .collect();
        write_table(&mut out, headers, rows)?;
        Ok(())
    }

    pub fn print_current_day(&self, navigator: &DayNavigator) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        match navigator.current_day() {
            Some(day) => writeln!(
                out,
                "{}  [{}/{}]  {}",
                self.paint(&day.display_text, "1"),
                navigator.current_index(),
                navigator.days().len().saturating_sub(1),
                day.program_day_key()
            )?,
            None => writeln!(out, "day navigator disabled: no clock")?,
        }
        Ok(())
    }

    pub fn print_pairs(&self, pairs: &[(&str, String)]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        let width = pairs
            .iter()
            .map(|(key, _)| UnicodeWidthStr::width(*key))
            .max()
            .unwrap_or(0);
        for (key, value) in pairs {
            writeln!(out, "{key:width$}  {value}")?;
        }
        Ok(())
    }

    pub fn print_json<T: Serialize>(&self, value: &T) -> anyhow::Result<()> {
        let text = serde_json::to_string_pretty(value).context("failed to encode JSON")?;
        println!("{text}");
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if code.is_empty() || !self.color || !io::stdout().is_terminal() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{Renderer, strip_ansi, write_table};
    use crate::clock::Clock;
    use crate::range_calendar::{InputSide, RangeCalendar};
    use crate::schedule::DeliverySchedule;

    #[test]
    fn range_grid_marks_selection() {
        let clock = Clock::parse("2025-09-01T10:00").expect("clock");
        let mut cal =
            RangeCalendar::new(Some(clock), DeliverySchedule::EveryDay, 6, Duration::ZERO);
        cal.open(InputSide::Start);
        cal.select(chrono::NaiveDate::from_ymd_opt(2025, 9, 2).expect("date"));
        cal.select(chrono::NaiveDate::from_ymd_opt(2025, 9, 4).expect("date"));

        let lines = Renderer::plain().range_month_lines(&cal);
        assert!(lines[0].contains("Сентябрь 2025"));
        assert!(lines[0].trim_end().ends_with('>'));
        assert_eq!(lines[1], "  Пн  Вт  Ср  Чт  Пт  Сб  Вс");
        assert_eq!(&lines[2][..16], "  1.  2[  3=  4]");
    }

    #[test]
    fn table_pads_by_visible_width() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["A".to_string(), "B".to_string()],
            vec![vec!["\x1b[31mwide\x1b[0m".to_string(), "x".to_string()]],
        )
        .expect("table");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "A    B ");
        assert_eq!(strip_ansi(lines[2]), "wide x ");
    }
}
