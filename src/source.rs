//! Raw sheet snapshots and the capability used to fetch them.
//!
//! The engine never opens a spreadsheet itself. Callers hand it a
//! [`SheetSource`]; whatever transport, credentials and caching sit behind
//! it are the caller's business.

use crate::error::{LedgerError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Worksheet address inside a spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
pub struct SheetRef {
    pub spreadsheet: String,
    pub worksheet: String,
}

impl SheetRef {
    pub fn new(spreadsheet: &str, worksheet: &str) -> Self {
        Self {
            spreadsheet: spreadsheet.to_string(),
            worksheet: worksheet.to_string(),
        }
    }
}

/// Rows of text cells exactly as the transport delivered them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSheet {
    /// Present when the first row was a stable header
    pub header: Option<Vec<String>>,
    pub rows: Vec<Vec<String>>,
}

impl RawSheet {
    pub fn positional(rows: Vec<Vec<String>>) -> Self {
        Self { header: None, rows }
    }

    /// Splits off the first row as the header, trimming each header cell.
    pub fn with_header_row(mut rows: Vec<Vec<String>>) -> Self {
        if rows.is_empty() {
            return Self::default();
        }
        let header = rows.remove(0).into_iter().map(|h| h.trim().to_string()).collect();
        Self {
            header: Some(header),
            rows,
        }
    }

    /// Builds a sheet from already-parsed header to value records. Missing
    /// keys become empty cells.
    pub fn from_records(records: &[BTreeMap<String, String>]) -> Self {
        let keys: BTreeSet<&String> = records.iter().flat_map(|r| r.keys()).collect();
        let header: Vec<String> = keys.into_iter().cloned().collect();

        let rows = records
            .iter()
            .map(|record| {
                header
                    .iter()
                    .map(|k| record.get(k).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();

        Self {
            header: Some(header),
            rows,
        }
    }

    /// Parses CSV text. Ragged rows are accepted.
    pub fn from_csv(text: &str, has_header: bool) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(|c| c.to_string()).collect::<Vec<_>>());
        }

        Ok(if has_header {
            Self::with_header_row(rows)
        } else {
            Self::positional(rows)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Anything that can hand over a snapshot of a worksheet.
pub trait SheetSource {
    fn fetch(&self, sheet: &SheetRef) -> Result<RawSheet>;
}

/// A source backed by sheets already held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    sheets: BTreeMap<SheetRef, RawSheet>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, sheet: SheetRef, data: RawSheet) -> &mut Self {
        self.sheets.insert(sheet, data);
        self
    }
}

impl SheetSource for InMemorySource {
    fn fetch(&self, sheet: &SheetRef) -> Result<RawSheet> {
        self.sheets
            .get(sheet)
            .cloned()
            .ok_or_else(|| LedgerError::SourceUnavailable {
                source_name: format!("{}/{}", sheet.spreadsheet, sheet.worksheet),
                details: "worksheet not found".to_string(),
            })
    }
}
