//! Row normalization.
//!
//! Raw spreadsheet rows have no fixed schema: headers drift between
//! deployments and the expense sheet mixes rows written before and after a
//! form migration. Each family has an ordered table of [`LayoutDetector`]s;
//! every row is matched against the table on its own, first match wins.

use crate::schema::{CanonicalRecord, ParsedAmount, RecordFamily};
use crate::source::RawSheet;
use crate::utils::{looks_numeric, parse_currency, parse_date, DateOrder};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Rows are padded with empty cells to at least this width before any
/// detector looks at them.
pub const MIN_ROW_WIDTH: usize = 6;

pub const ENCOUNTER_LAYOUT: &str = "encounter";
pub const PAYMENT_LAYOUT: &str = "payment";
pub const LEGACY_EXPENSE_LAYOUT: &str = "expense_legacy";
pub const FORM_EXPENSE_LAYOUT: &str = "expense_form";
pub const HEADER_LAYOUT: &str = "header";

/// Column positions of one known row arrangement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnLayout {
    pub name: String,
    pub date: usize,
    pub amount: Option<usize>,
    pub descriptor: Option<usize>,
    pub group: Option<usize>,
    /// Column that must be non-blank for the row to count
    pub identity: usize,
}

pub type LayoutPredicate = fn(&[String]) -> bool;

/// A named layout plus the test deciding whether a row was written in it.
#[derive(Clone)]
pub struct LayoutDetector {
    pub layout: ColumnLayout,
    pub matches: LayoutPredicate,
}

impl fmt::Debug for LayoutDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutDetector")
            .field("layout", &self.layout.name)
            .finish_non_exhaustive()
    }
}

fn any_row(_: &[String]) -> bool {
    true
}

impl LayoutDetector {
    pub fn always(layout: ColumnLayout) -> Self {
        Self {
            layout,
            matches: any_row,
        }
    }

    pub fn when(layout: ColumnLayout, matches: LayoutPredicate) -> Self {
        Self { layout, matches }
    }
}

/// Legacy expense rows are `[date, category, amount, description, method,
/// location]`; form rows are `[timestamp, date, category, amount, location,
/// receipt]`.
///
/// A row is legacy when the form's amount cell does not parse as currency
/// and the form's date cell holds label text rather than something
/// date-like. Best effort only: a numeric-looking category, or an empty
/// second cell, sends a legacy row down the form path.
pub fn is_legacy_expense_row(row: &[String]) -> bool {
    let form_amount = row.get(3).map(String::as_str).unwrap_or("");
    let form_date = row.get(1).map(String::as_str).unwrap_or("");

    !parse_currency(form_amount).is_value() && is_label_text(form_date)
}

fn is_label_text(cell: &str) -> bool {
    !cell.trim().is_empty() && !looks_numeric(cell)
}

/// Positional layouts known for each family, in detection order.
pub fn known_layouts(family: RecordFamily) -> Vec<LayoutDetector> {
    match family {
        RecordFamily::Encounter => vec![LayoutDetector::always(ColumnLayout {
            name: ENCOUNTER_LAYOUT.to_string(),
            date: 0,
            amount: None,
            descriptor: Some(2),
            group: Some(1),
            identity: 0,
        })],
        // Date, Sender, Amount, Doctor
        RecordFamily::Payment => vec![LayoutDetector::always(ColumnLayout {
            name: PAYMENT_LAYOUT.to_string(),
            date: 0,
            amount: Some(2),
            descriptor: Some(1),
            group: Some(3),
            identity: 0,
        })],
        RecordFamily::Expense => vec![
            LayoutDetector::when(
                ColumnLayout {
                    name: LEGACY_EXPENSE_LAYOUT.to_string(),
                    date: 0,
                    amount: Some(2),
                    descriptor: Some(1),
                    group: Some(5),
                    identity: 0,
                },
                is_legacy_expense_row,
            ),
            LayoutDetector::always(ColumnLayout {
                name: FORM_EXPENSE_LAYOUT.to_string(),
                date: 1,
                amount: Some(3),
                descriptor: Some(2),
                group: Some(4),
                identity: 1,
            }),
        ],
    }
}

struct HeaderKeywords {
    date: &'static [&'static str],
    amount: &'static [&'static str],
    descriptor: &'static [&'static str],
    group: &'static [&'static str],
    identity: &'static [&'static str],
}

fn header_keywords(family: RecordFamily) -> HeaderKeywords {
    const AMOUNT: &[&str] = &["amount", "fee", "paid", "total"];
    match family {
        RecordFamily::Encounter => HeaderKeywords {
            date: &["timestamp", "date"],
            amount: AMOUNT,
            descriptor: &["encounter", "consult"],
            group: &["provider", "doctor", "physician", "clinic", "location"],
            identity: &["patient", "name"],
        },
        RecordFamily::Payment => HeaderKeywords {
            date: &["date", "timestamp"],
            amount: AMOUNT,
            descriptor: &["sender", "payer", "from"],
            group: &["doctor", "provider", "physician"],
            identity: &[],
        },
        RecordFamily::Expense => HeaderKeywords {
            date: &["date", "timestamp"],
            amount: AMOUNT,
            descriptor: &["category"],
            group: &["location"],
            identity: &[],
        },
    }
}

/// Keywords are tried in priority order. Within a keyword a header equal to
/// it wins over the leftmost header merely containing it, so "Date" beats
/// "Last Updated".
fn find_column(headers: &[String], keywords: &[&str]) -> Option<usize> {
    keywords.iter().find_map(|k| {
        headers
            .iter()
            .position(|h| h == k)
            .or_else(|| headers.iter().position(|h| h.contains(k)))
    })
}

impl ColumnLayout {
    /// Resolves column positions from a header row by case-insensitive
    /// keyword containment. Returns `None` when a load-bearing column (the
    /// date, or the amount for payments and expenses) cannot be found.
    pub fn from_header(family: RecordFamily, header: &[String]) -> Option<Self> {
        let headers: Vec<String> = header.iter().map(|h| h.trim().to_lowercase()).collect();
        let keywords = header_keywords(family);

        let date = find_column(&headers, keywords.date)?;
        let amount = find_column(&headers, keywords.amount);
        if amount.is_none() && family != RecordFamily::Encounter {
            return None;
        }

        Some(Self {
            name: HEADER_LAYOUT.to_string(),
            date,
            amount,
            descriptor: find_column(&headers, keywords.descriptor),
            group: find_column(&headers, keywords.group),
            identity: find_column(&headers, keywords.identity).unwrap_or(date),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    Blank,
    HeaderRow,
    MissingIdentity,
    UnparseableDate { raw: String },
    MissingAmount,
    UnparseableAmount { raw: String },
    NegativeAmount { value: f64 },
    UnresolvedColumns,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    /// A record with `id` and `source` still unset
    Record(CanonicalRecord),
    Skip(SkipReason),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRow {
    /// 1-based row number as shown in the spreadsheet
    pub row_number: usize,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBatch {
    pub source: String,
    pub family: RecordFamily,
    pub records: Vec<CanonicalRecord>,
    pub skipped: Vec<SkippedRow>,
    pub layout_counts: BTreeMap<String, usize>,
}

impl NormalizedBatch {
    pub fn empty(source: &str, family: RecordFamily) -> Self {
        Self {
            source: source.to_string(),
            family,
            records: Vec::new(),
            skipped: Vec::new(),
            layout_counts: BTreeMap::new(),
        }
    }
}

fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(|c| c.trim()).unwrap_or("")
}

pub struct RowNormalizer {
    family: RecordFamily,
    date_order: DateOrder,
    detectors: Vec<LayoutDetector>,
}

impl RowNormalizer {
    pub fn new(family: RecordFamily, date_order: DateOrder) -> Self {
        Self::with_layouts(family, date_order, known_layouts(family))
    }

    pub fn with_layouts(
        family: RecordFamily,
        date_order: DateOrder,
        detectors: Vec<LayoutDetector>,
    ) -> Self {
        Self {
            family,
            date_order,
            detectors,
        }
    }

    pub fn family(&self) -> RecordFamily {
        self.family
    }

    pub fn detect(&self, row: &[String]) -> Option<&ColumnLayout> {
        self.detectors
            .iter()
            .find(|d| (d.matches)(row))
            .map(|d| &d.layout)
    }

    pub fn normalize_row(&self, raw: &[String]) -> RowOutcome {
        let mut row = raw.to_vec();
        if row.len() < MIN_ROW_WIDTH {
            row.resize(MIN_ROW_WIDTH, String::new());
        }

        if row.iter().all(|c| c.trim().is_empty()) {
            return RowOutcome::Skip(SkipReason::Blank);
        }

        let Some(layout) = self.detect(&row) else {
            return RowOutcome::Skip(SkipReason::UnresolvedColumns);
        };

        let date_text = cell(&row, layout.date);
        let lowered = date_text.to_lowercase();
        if lowered == "date" || lowered == "timestamp" {
            return RowOutcome::Skip(SkipReason::HeaderRow);
        }

        if cell(&row, layout.identity).is_empty() {
            return RowOutcome::Skip(SkipReason::MissingIdentity);
        }

        let Some(occurred_at) = parse_date(date_text, self.date_order) else {
            return RowOutcome::Skip(SkipReason::UnparseableDate {
                raw: date_text.to_string(),
            });
        };

        let parsed = layout
            .amount
            .map(|idx| parse_currency(cell(&row, idx)))
            .unwrap_or(ParsedAmount::Blank);

        let amount = match (self.family, parsed) {
            (RecordFamily::Encounter, ParsedAmount::Value(v)) => v,
            // Encounters are billed from the fee schedule later
            (RecordFamily::Encounter, _) => 0.0,
            (_, ParsedAmount::Value(v)) if v < 0.0 => {
                return RowOutcome::Skip(SkipReason::NegativeAmount { value: v });
            }
            (_, ParsedAmount::Value(v)) => v,
            (_, ParsedAmount::Blank) => return RowOutcome::Skip(SkipReason::MissingAmount),
            (_, ParsedAmount::Unparseable(raw)) => {
                return RowOutcome::Skip(SkipReason::UnparseableAmount { raw });
            }
        };

        let descriptor = layout
            .descriptor
            .map(|idx| cell(&row, idx).to_string())
            .unwrap_or_default();

        let group_key = layout
            .group
            .map(|idx| cell(&row, idx))
            .filter(|g| !g.is_empty())
            .map(str::to_string);

        RowOutcome::Record(CanonicalRecord {
            id: String::new(),
            occurred_at,
            amount,
            family: self.family,
            descriptor,
            group_key,
            source: String::new(),
            layout: layout.name.clone(),
            fee: None,
            tax_line: None,
            calendar: None,
        })
    }

    /// Normalizes every row, tagging records with `source` and an id built
    /// from the spreadsheet row number. `first_row_number` is the sheet row
    /// of `rows[0]` (2 when a header row precedes it).
    pub fn normalize_rows(
        &self,
        source: &str,
        rows: &[Vec<String>],
        first_row_number: usize,
    ) -> NormalizedBatch {
        let mut batch = NormalizedBatch::empty(source, self.family);

        for (offset, row) in rows.iter().enumerate() {
            let row_number = first_row_number + offset;
            match self.normalize_row(row) {
                RowOutcome::Record(mut record) => {
                    record.id = format!("{}:{}", source, row_number);
                    record.source = source.to_string();
                    *batch.layout_counts.entry(record.layout.clone()).or_insert(0) += 1;
                    batch.records.push(record);
                }
                RowOutcome::Skip(reason) => {
                    if !matches!(reason, SkipReason::Blank | SkipReason::HeaderRow) {
                        debug!("{} row {} skipped: {:?}", source, row_number, reason);
                    }
                    batch.skipped.push(SkippedRow { row_number, reason });
                }
            }
        }

        info!(
            "Normalized {} {} records from '{}' ({} rows skipped)",
            batch.records.len(),
            self.family,
            source,
            batch.skipped.len()
        );
        debug!("Layouts used for '{}': {:?}", source, batch.layout_counts);

        batch
    }
}

/// Normalizes a whole sheet. Sheets with a header row are resolved by
/// keyword; sheets without one use the family's positional layouts.
///
/// A family with more than one positional layout keeps per-row detection
/// even under a header, since old and new rows share the sheet and the
/// header only describes the newest arrangement.
pub fn normalize_sheet(
    family: RecordFamily,
    date_order: DateOrder,
    source: &str,
    sheet: &RawSheet,
) -> NormalizedBatch {
    let layouts = known_layouts(family);
    match &sheet.header {
        Some(header) if layouts.len() > 1 => {
            debug!(
                "Sheet '{}' mixes {} layouts; ignoring header {:?}",
                source,
                layouts.len(),
                header
            );
            RowNormalizer::with_layouts(family, date_order, layouts).normalize_rows(source, &sheet.rows, 2)
        }
        Some(header) => match ColumnLayout::from_header(family, header) {
            Some(layout) => {
                RowNormalizer::with_layouts(family, date_order, vec![LayoutDetector::always(layout)])
                    .normalize_rows(source, &sheet.rows, 2)
            }
            None => {
                warn!(
                    "Sheet '{}' has no recognisable {} columns in header {:?}",
                    source, family, header
                );
                let mut batch = NormalizedBatch::empty(source, family);
                batch.skipped = (0..sheet.rows.len())
                    .map(|i| SkippedRow {
                        row_number: i + 2,
                        reason: SkipReason::UnresolvedColumns,
                    })
                    .collect();
                batch
            }
        },
        None => RowNormalizer::with_layouts(family, date_order, layouts).normalize_rows(source, &sheet.rows, 1),
    }
}
