//! Calendar buckets that map a commit date to a `Major.Minor` pair.
//!
//! Every month of the current year, up to and including the current month,
//! is one [`TimeFrameWindow`]. A window's major is the two-digit year and its
//! minor is the month number, so a commit made on 2025-03-14 falls into
//! window `2025-3` with version `25.3`.
//!
//! Lookup is total: a date outside every generated window (an older year, or
//! a month later than "today") still gets a synthesized window built from the
//! date itself.
//!
//! # Examples
//!
//! ```
//! use chrono::NaiveDate;
//! use versioner::calendar::TimeFrameCalendar;
//!
//! let today = NaiveDate::from_ymd_opt(2025, 3, 20).unwrap();
//! let calendar = TimeFrameCalendar::generate(today);
//! assert_eq!(calendar.windows().len(), 3);
//!
//! let window = calendar.lookup(NaiveDate::from_ymd_opt(2025, 2, 10).unwrap());
//! assert_eq!((window.major, window.minor), (25, 2));
//! ```

use chrono::{
    Datelike,
    Local,
    NaiveDate,
};
use serde::Serialize;

/// One calendar bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeFrameWindow {
    pub name: String,
    pub date_start: NaiveDate,
    pub date_end: NaiveDate,
    pub major: u32,
    pub minor: u32,
}

impl TimeFrameWindow {
    fn contains(&self, date: NaiveDate) -> bool {
        date >= self.date_start && date <= self.date_end
    }

    /// Window synthesized from the date when no generated window matches.
    fn synthesize(date: NaiveDate) -> Self {
        Self {
            name: format!("{:02}.{:02}", two_digit_year(date), date.month()),
            date_start: date,
            date_end: date,
            major: two_digit_year(date),
            minor: date.month(),
        }
    }
}

/// The set of windows for the current year.
#[derive(Debug, Clone, Default)]
pub struct TimeFrameCalendar {
    windows: Vec<TimeFrameWindow>,
}

impl TimeFrameCalendar {
    /// Build one window per month from January through `today`'s month.
    pub fn generate(today: NaiveDate) -> Self {
        let year = today.year();
        let windows = (1..=today.month())
            .filter_map(|month| {
                let start = NaiveDate::from_ymd_opt(year, month, 1)?;
                let end = last_day_of_month(start)?;
                Some(TimeFrameWindow {
                    name: format!("{}-{}", year, month),
                    date_start: start,
                    date_end: end,
                    major: two_digit_year(start),
                    minor: month,
                })
            })
            .collect();
        Self { windows }
    }

    /// Build the calendar from the local wall clock.
    pub fn for_today() -> Self {
        Self::generate(Local::now().date_naive())
    }

    pub fn windows(&self) -> &[TimeFrameWindow] {
        &self.windows
    }

    /// Find the window for `date`.
    ///
    /// When several windows match, the one with the latest start wins.
    /// Never fails: unmatched dates get a synthesized window.
    pub fn lookup(&self, date: NaiveDate) -> TimeFrameWindow {
        self.windows
            .iter()
            .filter(|w| w.contains(date))
            .max_by_key(|w| w.date_start)
            .cloned()
            .unwrap_or_else(|| TimeFrameWindow::synthesize(date))
    }
}

fn two_digit_year(date: NaiveDate) -> u32 {
    date.year().rem_euclid(100) as u32
}

fn last_day_of_month(first: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.pred_opt()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_generates_one_window_per_elapsed_month() {
        let calendar = TimeFrameCalendar::generate(date(2025, 10, 18));
        let windows = calendar.windows();
        assert_eq!(windows.len(), 10);
        assert_eq!(windows[0].name, "2025-1");
        assert_eq!(windows[0].date_start, date(2025, 1, 1));
        assert_eq!(windows[0].date_end, date(2025, 1, 31));
        assert_eq!(windows[1].date_end, date(2025, 2, 28));
        assert_eq!(windows[9].name, "2025-10");
        assert_eq!((windows[9].major, windows[9].minor), (25, 10));
    }

    #[test]
    fn test_december_window_ends_on_31st() {
        let calendar = TimeFrameCalendar::generate(date(2024, 12, 2));
        let last = calendar.windows().last().unwrap();
        assert_eq!(last.date_end, date(2024, 12, 31));
        assert_eq!(calendar.windows()[1].date_end, date(2024, 2, 29));
    }

    #[test]
    fn test_lookup_inside_window() {
        let calendar = TimeFrameCalendar::generate(date(2025, 6, 1));
        let window = calendar.lookup(date(2025, 4, 30));
        assert_eq!(window.name, "2025-4");
        assert_eq!((window.major, window.minor), (25, 4));
    }

    #[test]
    fn test_lookup_synthesizes_for_previous_year() {
        let calendar = TimeFrameCalendar::generate(date(2025, 2, 1));
        let window = calendar.lookup(date(2024, 11, 5));
        assert_eq!(window.name, "24.11");
        assert_eq!((window.major, window.minor), (24, 11));
    }

    #[test]
    fn test_lookup_synthesizes_for_future_month() {
        let calendar = TimeFrameCalendar::generate(date(2025, 2, 1));
        let window = calendar.lookup(date(2025, 7, 1));
        assert_eq!((window.major, window.minor), (25, 7));
    }

    #[test]
    fn test_lookup_on_empty_calendar() {
        let window = TimeFrameCalendar::default().lookup(date(2009, 1, 9));
        assert_eq!((window.major, window.minor), (9, 1));
    }

    proptest! {
        #[test]
        fn lookup_is_total(days in 0i64..(365 * 60), today_offset in 0i64..365) {
            let base = date(1990, 1, 1);
            let probe = base + chrono::Duration::days(days);
            let today = date(2025, 1, 1) + chrono::Duration::days(today_offset);
            let window = TimeFrameCalendar::generate(today).lookup(probe);
            prop_assert_eq!(window.minor, probe.month());
            prop_assert_eq!(window.major, (probe.year() % 100) as u32);
        }
    }
}
