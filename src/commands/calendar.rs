//! Print the calendar windows of the current year.
//!
//! # Examples
//!
//! ```bash
//! versioner calendar
//! versioner calendar --date 2025-06-30 --format json
//! ```

use anyhow::{
    Context,
    Result,
};
use chrono::{
    Local,
    NaiveDate,
};
use clap::Parser;
use console::style;

use crate::calendar::TimeFrameCalendar;

/// Arguments for the `calendar` command.
#[derive(Parser, Debug, Clone)]
pub struct CalendarArgs {
    /// Date treated as today (`YYYY-MM-DD`). Defaults to the local date.
    #[arg(long)]
    pub date: Option<String>,

    /// Output format: `text` or `json`.
    #[arg(long, default_value = "text")]
    pub format: String,
}

fn parse_date(date: Option<&str>) -> Result<NaiveDate> {
    match date {
        Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", d)),
        None => Ok(Local::now().date_naive()),
    }
}

fn render(format: &str, calendar: &TimeFrameCalendar) -> Result<String> {
    match format {
        "json" => serde_json::to_string_pretty(calendar.windows())
            .context("Failed to serialize calendar"),
        "text" => Ok(calendar
            .windows()
            .iter()
            .map(|w| {
                format!(
                    "{:<8} {} .. {}  {}",
                    w.name,
                    w.date_start,
                    w.date_end,
                    style(format!("{}.{:02}", w.major, w.minor)).green()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")),
        other => anyhow::bail!("Invalid format: {}. Must be 'text' or 'json'", other),
    }
}

/// Print the windows generated for the given (or current) date.
pub fn calendar(args: CalendarArgs) -> Result<()> {
    let today = parse_date(args.date.as_deref())?;
    println!("{}", render(&args.format, &TimeFrameCalendar::generate(today))?);
    Ok(())
}
