use crate::error::{LedgerError, Result};
use crate::schema::{CalendarAttributes, CanonicalRecord, PayPeriod};
use crate::utils::{first_day_of_month, next_month_start, subtract_months};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

pub const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

pub const OVERVIEW_VIEW: &str = "Current Year (Overview)";
pub const TRAILING_VIEW: &str = "Last X Months";
pub const TRAILING_PRESETS: [u32; 4] = [3, 6, 9, 12];
pub const DEFAULT_TRAILING_MONTHS: u32 = 3;

/// Rank given to month strings that are not calendar months.
const UNKNOWN_MONTH_RANK: u32 = 99;

pub fn month_name(month: u32) -> &'static str {
    MONTH_NAMES
        .get(month.wrapping_sub(1) as usize)
        .copied()
        .unwrap_or("Unknown")
}

/// 1-based month number for a full or three-letter month name.
pub fn month_index(name: &str) -> Option<u32> {
    let name = name.trim().to_lowercase();
    if name.len() < 3 {
        return None;
    }

    MONTH_NAMES
        .iter()
        .position(|m| {
            let m = m.to_lowercase();
            m == name || (name.len() == 3 && m.starts_with(&name))
        })
        .map(|i| i as u32 + 1)
}

pub fn calendar_attributes(date: NaiveDate) -> CalendarAttributes {
    CalendarAttributes {
        year: date.year(),
        month: date.month(),
        month_name: month_name(date.month()).to_string(),
        day: date.day(),
        pay_period: PayPeriod::for_day(date.day()),
    }
}

pub fn index_record(record: &mut CanonicalRecord) {
    record.calendar = Some(calendar_attributes(record.occurred_at));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

/// Orders month names by calendar position. Unrecognised strings always
/// end up last, whichever the direction.
pub fn sort_month_names(names: &mut [String], direction: SortDirection) {
    names.sort_by_key(|name| {
        let rank = month_index(name).unwrap_or(UNKNOWN_MONTH_RANK);
        let known = rank != UNKNOWN_MONTH_RANK;
        let ordered = match direction {
            SortDirection::Ascending => rank as i64,
            SortDirection::Descending => -(rank as i64),
        };
        (!known, ordered)
    });
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WindowKind {
    Month { year: i32, month: u32 },
    FullYear { year: i32 },
    Trailing { months: u32 },
    AllMonthsInYear { year: i32 },
    AllTime,
    PayPeriod { year: i32, month: u32, half: PayPeriod },
}

/// A half-open date interval `[start, end)` with display metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Months used for monthly averages; 0 disables averaging.
    pub divisor: u32,
    pub kind: WindowKind,
}

impl WindowSpec {
    pub fn month(year: i32, month: u32) -> Result<Self> {
        let (start, end) = month_bounds(year, month)?;
        Ok(Self {
            label: format!("{} {}", month_name(month), year),
            start,
            end,
            divisor: 0,
            kind: WindowKind::Month { year, month },
        })
    }

    /// Calendar year. The divisor is the number of elapsed months when the
    /// year is the one `today` falls in.
    pub fn full_year(year: i32, today: NaiveDate) -> Result<Self> {
        let (start, end) = year_bounds(year)?;
        let divisor = if year == today.year() { today.month() } else { 12 };
        Ok(Self {
            label: year.to_string(),
            start,
            end,
            divisor,
            kind: WindowKind::FullYear { year },
        })
    }

    /// Rolling window starting `months` before today, not aligned to month
    /// starts. It has no upper bound: rows dated after today (post-dated
    /// payments, typos in the year) still count toward the trailing total.
    pub fn trailing_months(months: u32, today: NaiveDate) -> Self {
        Self {
            label: format!("Last {} Months", months),
            start: subtract_months(today, months),
            end: NaiveDate::MAX,
            divisor: months,
            kind: WindowKind::Trailing { months },
        }
    }

    pub fn all_months_in_year(year: i32) -> Result<Self> {
        let (start, end) = year_bounds(year)?;
        Ok(Self {
            label: format!("All months in {}", year),
            start,
            end,
            divisor: 0,
            kind: WindowKind::AllMonthsInYear { year },
        })
    }

    pub fn all_time() -> Self {
        Self {
            label: "All time".to_string(),
            start: NaiveDate::MIN,
            end: NaiveDate::MAX,
            divisor: 0,
            kind: WindowKind::AllTime,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    /// Splits a month window into its two pay periods. Other window kinds
    /// have no pay-period split.
    pub fn pay_periods(&self) -> Option<(WindowSpec, WindowSpec)> {
        let WindowKind::Month { year, month } = self.kind else {
            return None;
        };
        let mid = NaiveDate::from_ymd_opt(year, month, 16)?;

        let half = |half: PayPeriod, start: NaiveDate, end: NaiveDate| WindowSpec {
            label: format!("{} {} ({})", month_name(month), year, half.label()),
            start,
            end,
            divisor: 0,
            kind: WindowKind::PayPeriod { year, month, half },
        };

        Some((
            half(PayPeriod::FirstHalf, self.start, mid),
            half(PayPeriod::SecondHalf, mid, self.end),
        ))
    }
}

pub fn classify(record: &CanonicalRecord, window: &WindowSpec) -> bool {
    window.contains(record.occurred_at)
}

fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate)> {
    let start = first_day_of_month(year, month)
        .ok_or_else(|| LedgerError::DateError(format!("Invalid month {}-{}", year, month)))?;
    let end = next_month_start(year, month)
        .ok_or_else(|| LedgerError::DateError(format!("Month {}-{} has no successor", year, month)))?;
    Ok((start, end))
}

fn year_bounds(year: i32) -> Result<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1)
        .ok_or_else(|| LedgerError::DateError(format!("Invalid year {}", year)))?;
    let end = NaiveDate::from_ymd_opt(year + 1, 1, 1)
        .ok_or_else(|| LedgerError::DateError(format!("Year {} has no successor", year)))?;
    Ok((start, end))
}

/// A dashboard view choice, parsed from the strings the selector offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewSelection {
    /// Overview of the selected year with a year-over-year comparison
    YearOverview,
    LastMonths(u32),
    /// One month of the selected year, compared with the same month a year earlier
    Month(u32),
    /// Overview of an explicit year
    Year(i32),
}

impl FromStr for ViewSelection {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        let text = s.trim();
        let lower = text.to_lowercase();

        if lower.starts_with("current year") {
            return Ok(ViewSelection::YearOverview);
        }

        if let Some(rest) = lower.strip_prefix("last ") {
            let count = rest.trim_end_matches("months").trim_end_matches("month").trim();
            if count == "x" || count == "n" {
                return Ok(ViewSelection::LastMonths(DEFAULT_TRAILING_MONTHS));
            }
            return match count.parse::<u32>() {
                Ok(n) if n > 0 => Ok(ViewSelection::LastMonths(n)),
                _ => Err(LedgerError::UnknownView(text.to_string())),
            };
        }

        if let Some(month) = month_index(text) {
            return Ok(ViewSelection::Month(month));
        }

        if text.len() == 4 {
            if let Ok(year) = text.parse::<i32>() {
                return Ok(ViewSelection::Year(year));
            }
        }

        Err(LedgerError::UnknownView(text.to_string()))
    }
}

/// The window to aggregate plus an optional comparison window for deltas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedView {
    pub title: String,
    pub window: WindowSpec,
    pub comparison: Option<WindowSpec>,
}

impl ViewSelection {
    pub fn resolve(&self, selected_year: i32, today: NaiveDate) -> Result<ResolvedView> {
        match *self {
            ViewSelection::YearOverview => Self::overview(selected_year, today),
            ViewSelection::Year(year) => Self::overview(year, today),
            ViewSelection::LastMonths(months) => Ok(ResolvedView {
                title: format!("Income: Last {} Months", months),
                window: WindowSpec::trailing_months(months, today),
                comparison: None,
            }),
            ViewSelection::Month(month) => {
                let window = WindowSpec::month(selected_year, month)?;
                Ok(ResolvedView {
                    title: format!("Activity in {} {}", month_name(month), selected_year),
                    window,
                    comparison: Some(WindowSpec::month(selected_year - 1, month)?),
                })
            }
        }
    }

    fn overview(year: i32, today: NaiveDate) -> Result<ResolvedView> {
        Ok(ResolvedView {
            title: format!("Financial Overview: {}", year),
            window: WindowSpec::full_year(year, today)?,
            comparison: Some(WindowSpec::full_year(year - 1, today)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewOptions {
    pub options: Vec<String>,
    pub default_index: usize,
}

/// Overview and trailing entries, then the months that have records in
/// `selected_year`, most recent first. The current month is pre-selected
/// when it is on the list.
pub fn view_options(records: &[CanonicalRecord], selected_year: i32, today: NaiveDate) -> ViewOptions {
    let months: BTreeSet<u32> = records
        .iter()
        .filter(|r| r.occurred_at.year() == selected_year)
        .map(|r| r.occurred_at.month())
        .collect();

    let mut month_names: Vec<String> = months.iter().map(|m| month_name(*m).to_string()).collect();
    sort_month_names(&mut month_names, SortDirection::Descending);

    let mut options = vec![OVERVIEW_VIEW.to_string(), TRAILING_VIEW.to_string()];
    options.extend(month_names);

    let current = month_name(today.month());
    let default_index = options.iter().position(|o| o == current).unwrap_or(0);

    ViewOptions {
        options,
        default_index,
    }
}

/// Years that have at least one record, most recent first.
pub fn available_years(records: &[CanonicalRecord]) -> Vec<i32> {
    let years: BTreeSet<i32> = records.iter().map(|r| r.occurred_at.year()).collect();
    years.into_iter().rev().collect()
}

pub fn tax_year_options(today: NaiveDate) -> Vec<i32> {
    let year = today.year();
    vec![year, year - 1, year - 2]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RecordFamily;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record_on(date: NaiveDate) -> CanonicalRecord {
        CanonicalRecord {
            id: format!("t:{}", date),
            occurred_at: date,
            amount: 10.0,
            family: RecordFamily::Payment,
            descriptor: String::new(),
            group_key: None,
            source: "t".to_string(),
            layout: "test".to_string(),
            fee: None,
            tax_line: None,
            calendar: None,
        }
    }

    #[test]
    fn test_calendar_attributes() {
        let attrs = calendar_attributes(ymd(2024, 3, 15));
        assert_eq!(attrs.year, 2024);
        assert_eq!(attrs.month, 3);
        assert_eq!(attrs.month_name, "March");
        assert_eq!(attrs.pay_period, PayPeriod::FirstHalf);

        let attrs = calendar_attributes(ymd(2024, 2, 29));
        assert_eq!(attrs.pay_period, PayPeriod::SecondHalf);
    }

    #[test]
    fn test_month_index() {
        assert_eq!(month_index("January"), Some(1));
        assert_eq!(month_index(" december "), Some(12));
        assert_eq!(month_index("Sep"), Some(9));
        assert_eq!(month_index("Ju"), None);
        assert_eq!(month_index("Smarch"), None);
    }

    #[test]
    fn test_sort_month_names_descending_with_unknown_last() {
        let mut names: Vec<String> = ["March", "Smarch", "December", "January"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        sort_month_names(&mut names, SortDirection::Descending);
        assert_eq!(names, vec!["December", "March", "January", "Smarch"]);

        sort_month_names(&mut names, SortDirection::Ascending);
        assert_eq!(names, vec!["January", "March", "December", "Smarch"]);
    }

    #[test]
    fn test_month_window() {
        let w = WindowSpec::month(2024, 12).unwrap();
        assert_eq!(w.start, ymd(2024, 12, 1));
        assert_eq!(w.end, ymd(2025, 1, 1));
        assert_eq!(w.divisor, 0);
        assert!(w.contains(ymd(2024, 12, 31)));
        assert!(!w.contains(ymd(2025, 1, 1)));

        assert!(WindowSpec::month(2024, 13).is_err());
    }

    #[test]
    fn test_pay_period_split() {
        let w = WindowSpec::month(2024, 2).unwrap();
        let (first, second) = w.pay_periods().unwrap();
        assert!(first.contains(ymd(2024, 2, 15)));
        assert!(!first.contains(ymd(2024, 2, 16)));
        assert!(second.contains(ymd(2024, 2, 16)));
        assert!(second.contains(ymd(2024, 2, 29)));
        assert!(!second.contains(ymd(2024, 3, 1)));

        assert!(WindowSpec::all_time().pay_periods().is_none());
    }

    #[test]
    fn test_full_year_divisor() {
        let today = ymd(2026, 10, 19);
        assert_eq!(WindowSpec::full_year(2026, today).unwrap().divisor, 10);
        assert_eq!(WindowSpec::full_year(2025, today).unwrap().divisor, 12);
    }

    #[test]
    fn test_trailing_window_is_rolling() {
        let w = WindowSpec::trailing_months(3, ymd(2024, 5, 20));
        assert_eq!(w.start, ymd(2024, 2, 20));
        assert_eq!(w.divisor, 3);
        assert!(w.contains(ymd(2024, 2, 20)));
        assert!(!w.contains(ymd(2024, 2, 19)));
        assert!(w.contains(ymd(2024, 5, 20)));
        assert!(w.contains(ymd(2024, 7, 1)));
    }

    #[test]
    fn test_flat_windows_have_no_divisor() {
        assert_eq!(WindowSpec::all_time().divisor, 0);
        assert!(WindowSpec::all_time().contains(ymd(1999, 1, 1)));
        assert_eq!(WindowSpec::all_months_in_year(2024).unwrap().divisor, 0);
    }

    #[test]
    fn test_view_selection_parsing() {
        assert_eq!(OVERVIEW_VIEW.parse::<ViewSelection>().unwrap(), ViewSelection::YearOverview);
        assert_eq!(
            TRAILING_VIEW.parse::<ViewSelection>().unwrap(),
            ViewSelection::LastMonths(DEFAULT_TRAILING_MONTHS)
        );
        assert_eq!("Last 6 Months".parse::<ViewSelection>().unwrap(), ViewSelection::LastMonths(6));
        assert_eq!("March".parse::<ViewSelection>().unwrap(), ViewSelection::Month(3));
        assert_eq!("2023".parse::<ViewSelection>().unwrap(), ViewSelection::Year(2023));
        assert!("Last zero Months".parse::<ViewSelection>().is_err());
        assert!("Fortnight".parse::<ViewSelection>().is_err());

        for months in TRAILING_PRESETS {
            let label = format!("Last {} Months", months);
            assert_eq!(label.parse::<ViewSelection>().unwrap(), ViewSelection::LastMonths(months));
        }
    }

    #[test]
    fn test_resolve_month_view_compares_same_month_last_year() {
        let view = ViewSelection::Month(3).resolve(2024, ymd(2024, 10, 1)).unwrap();
        assert_eq!(view.title, "Activity in March 2024");
        let comparison = view.comparison.unwrap();
        assert_eq!(comparison.start, ymd(2023, 3, 1));
        assert_eq!(comparison.end, ymd(2023, 4, 1));
    }

    #[test]
    fn test_resolve_overview_and_trailing() {
        let today = ymd(2024, 10, 1);
        let view = ViewSelection::YearOverview.resolve(2024, today).unwrap();
        assert_eq!(view.window.divisor, 10);
        assert_eq!(view.comparison.unwrap().label, "2023");

        let view = ViewSelection::LastMonths(6).resolve(2024, today).unwrap();
        assert_eq!(view.title, "Income: Last 6 Months");
        assert!(view.comparison.is_none());
    }

    #[test]
    fn test_view_options_preselect_current_month() {
        let records = vec![
            record_on(ymd(2024, 1, 5)),
            record_on(ymd(2024, 10, 2)),
            record_on(ymd(2024, 3, 9)),
            record_on(ymd(2023, 11, 9)),
        ];

        let opts = view_options(&records, 2024, ymd(2024, 10, 19));
        assert_eq!(
            opts.options,
            vec![OVERVIEW_VIEW, TRAILING_VIEW, "October", "March", "January"]
        );
        assert_eq!(opts.default_index, 2);

        let opts = view_options(&records, 2024, ymd(2024, 7, 1));
        assert_eq!(opts.default_index, 0);
    }

    #[test]
    fn test_available_years_and_tax_years() {
        let records = vec![
            record_on(ymd(2022, 1, 5)),
            record_on(ymd(2024, 10, 2)),
            record_on(ymd(2024, 3, 9)),
        ];
        assert_eq!(available_years(&records), vec![2024, 2022]);
        assert!(available_years(&[]).is_empty());
        assert_eq!(tax_year_options(ymd(2026, 10, 19)), vec![2026, 2025, 2024]);
    }
}
