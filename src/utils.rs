use crate::schema::ParsedAmount;
use chrono::{Months, NaiveDate, NaiveDateTime};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How to read ambiguous slash dates such as `05/01/2024`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum DateOrder {
    /// `05/01/2024` is May 1st
    #[default]
    MonthFirst,
    /// `05/01/2024` is January 5th
    DayFirst,
}

const ISO_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

const ISO_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const MONTH_FIRST_DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%m-%d-%Y"];
const MONTH_FIRST_DATETIME_FORMATS: &[&str] = &["%m/%d/%Y %H:%M:%S", "%m/%d/%Y %H:%M"];
const DAY_FIRST_DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y"];
const DAY_FIRST_DATETIME_FORMATS: &[&str] = &["%d/%m/%Y %H:%M:%S", "%d/%m/%Y %H:%M"];

const LONG_DATE_FORMATS: &[&str] = &["%B %d, %Y", "%b %d, %Y", "%d %B %Y", "%d %b %Y"];

fn try_formats(text: &str, dates: &[&str], datetimes: &[&str]) -> Option<NaiveDate> {
    dates
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| {
            datetimes
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// Parses a spreadsheet date cell. The preferred slash order is tried
/// first and the other order is used as a fallback, so `25/12/2024` still
/// parses under `MonthFirst`.
pub fn parse_date(text: &str, order: DateOrder) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(date) = try_formats(text, ISO_DATE_FORMATS, ISO_DATETIME_FORMATS) {
        return Some(date);
    }

    let (preferred, fallback) = match order {
        DateOrder::MonthFirst => (
            (MONTH_FIRST_DATE_FORMATS, MONTH_FIRST_DATETIME_FORMATS),
            (DAY_FIRST_DATE_FORMATS, DAY_FIRST_DATETIME_FORMATS),
        ),
        DateOrder::DayFirst => (
            (DAY_FIRST_DATE_FORMATS, DAY_FIRST_DATETIME_FORMATS),
            (MONTH_FIRST_DATE_FORMATS, MONTH_FIRST_DATETIME_FORMATS),
        ),
    };

    try_formats(text, preferred.0, preferred.1)
        .or_else(|| try_formats(text, fallback.0, fallback.1))
        .or_else(|| try_formats(text, LONG_DATE_FORMATS, &[]))
}

/// Parses a currency cell such as `$1,234.50`.
///
/// Dollar signs, thousands separators and whitespace are stripped first.
/// Anything still not a finite number becomes `Unparseable`.
pub fn parse_currency(text: &str) -> ParsedAmount {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return ParsedAmount::Blank;
    }

    let cleaned: String = trimmed
        .chars()
        .filter(|c| !matches!(c, '$' | ',') && !c.is_whitespace())
        .collect();

    if cleaned.is_empty() || cleaned.chars().any(|c| c.is_alphabetic()) {
        return ParsedAmount::Unparseable(trimmed.to_string());
    }

    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => ParsedAmount::Value(v),
        _ => ParsedAmount::Unparseable(trimmed.to_string()),
    }
}

/// True for cells made only of digits and date/number punctuation,
/// e.g. `2024-05-02`, `45.00` or `10:00`.
pub fn looks_numeric(text: &str) -> bool {
    let text = text.trim();
    text.chars().any(|c| c.is_ascii_digit())
        && text
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '-' | '/' | '.' | ':' | ',' | '$' | ' '))
}

pub fn first_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// First day of the month after `year`-`month`.
pub fn next_month_start(year: i32, month: u32) -> Option<NaiveDate> {
    if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
}

/// Rolling subtraction: `2024-05-31` minus 3 months is `2024-02-29`.
pub fn subtract_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_sub_months(Months::new(months))
        .unwrap_or(NaiveDate::MIN)
}
