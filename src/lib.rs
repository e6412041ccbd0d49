//! # Practice Ledger
//!
//! A library for reconciling a clinic's loosely structured spreadsheet
//! exports (patient encounters, incoming payments and expenses) into one
//! canonical ledger, then aggregating it over calendar windows.
//!
//! ## Core Concepts
//!
//! - **Raw Sheets**: Rows of text cells whose column order drifted over the years
//! - **Canonical Records**: One typed record per row, tagged with the sheet it came from
//! - **Derived Fields**: Fees for encounters and CRA tax lines for expenses, computed from configurable tables
//! - **Windows**: Half-open date ranges (month, year, trailing months) used for every total and average
//! - **Ledger**: The merge of all sources, answering year-level tax questions
//!
//! ## Example
//!
//! ```rust,ignore
//! use practice_ledger::*;
//! use chrono::NaiveDate;
//!
//! let config = EngineConfig::default();
//! let mut source = InMemorySource::new();
//! source.insert(
//!     config.sources[0].sheet.clone(),
//!     RawSheet::with_header_row(vec![
//!         vec!["Date".into(), "Doctor".into(), "Type of Encounter".into()],
//!         vec!["01/03/2024".into(), "Dr. Tripic".into(), "New Consult".into()],
//!     ]),
//! );
//!
//! let ledger = process_ledger(&config, &source).unwrap();
//! let today = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
//! let window = WindowSpec::full_year(2024, today).unwrap();
//! let result = Aggregator::new(&config.entities)
//!     .income_only()
//!     .aggregate(ledger.records(), &window);
//! ```

pub mod aggregate;
pub mod calendar;
pub mod config;
pub mod derivation;
pub mod draft;
pub mod error;
pub mod export;
pub mod normalize;
pub mod reconcile;
pub mod schema;
pub mod source;
pub mod utils;

pub use aggregate::*;
pub use calendar::*;
pub use config::{EngineConfig, HeaderMode, SourceConfig};
pub use derivation::{derive_fields, FeeRule, FeeSchedule, TaxLineTable, EXPENSE_CATEGORIES, OTHER_EXPENSES_LINE};
pub use draft::ExpenseDraft;
pub use error::{LedgerError, Result};
pub use export::{LedgerRow, LedgerTable};
pub use normalize::{
    normalize_sheet, ColumnLayout, LayoutDetector, NormalizedBatch, RowNormalizer, RowOutcome,
    SkipReason, SkippedRow,
};
pub use reconcile::{Ledger, LocationSplit, TaxSummary, UnavailableSource};
pub use schema::*;
pub use source::{InMemorySource, RawSheet, SheetRef, SheetSource};
pub use utils::*;

use log::{debug, info, warn};

pub struct LedgerProcessor;

impl LedgerProcessor {
    /// Fetches every configured source and merges them into one ledger.
    ///
    /// A source that cannot be fetched is recorded as unavailable and the
    /// remaining sources are still processed.
    pub fn process(config: &EngineConfig, source: &dyn SheetSource) -> Result<Ledger> {
        config.validate()?;

        info!("Building ledger for practice: {}", config.practice_name);
        debug!(
            "Configuration contains {} sources, {} fee rules and {} known entities",
            config.sources.len(),
            config.fee_schedule.rules.len(),
            config.entities.len()
        );

        let mut ledger = Ledger::with_tax_lines(config.tax_lines.clone());

        for source_config in &config.sources {
            match source.fetch(&source_config.sheet) {
                Ok(sheet) => {
                    let batch = Self::process_sheet(source_config, &sheet, config);
                    ledger.push_batch(batch);
                }
                Err(e) => {
                    warn!("Source '{}' is unavailable: {}", source_config.name, e);
                    ledger.mark_unavailable(&source_config.name, &e.to_string());
                }
            }
        }

        info!(
            "Ledger holds {} records from {} sources ({} unavailable)",
            ledger.records().len(),
            ledger.source_names().len(),
            ledger.unavailable().len()
        );

        Ok(ledger)
    }

    /// Normalizes one sheet and fills in the derived and calendar fields of
    /// every record it yields.
    pub fn process_sheet(
        source_config: &SourceConfig,
        sheet: &RawSheet,
        config: &EngineConfig,
    ) -> NormalizedBatch {
        let prepared = match (source_config.header, &sheet.header) {
            (HeaderMode::Keywords, None) => RawSheet::with_header_row(sheet.rows.clone()),
            (HeaderMode::Positional, Some(header)) => {
                let mut rows = Vec::with_capacity(sheet.rows.len() + 1);
                rows.push(header.clone());
                rows.extend(sheet.rows.iter().cloned());
                RawSheet::positional(rows)
            }
            _ => sheet.clone(),
        };

        let mut batch = normalize_sheet(
            source_config.family,
            source_config.date_order,
            &source_config.name,
            &prepared,
        );

        for record in &mut batch.records {
            derive_fields(record, &config.fee_schedule, &config.tax_lines);
            index_record(record);
        }

        let unclassified = batch.records.iter().filter(|r| r.is_unclassified()).count();
        if unclassified > 0 {
            debug!(
                "'{}' has {} encounters with no matching fee rule",
                source_config.name, unclassified
            );
        }

        batch
    }

    /// Processes sheets that were already fetched, keyed by source name.
    /// Configured sources missing from `sheets` are marked unavailable.
    pub fn process_fetched(
        config: &EngineConfig,
        sheets: &[(String, RawSheet)],
    ) -> Result<Ledger> {
        config.validate()?;

        let mut ledger = Ledger::with_tax_lines(config.tax_lines.clone());
        for source_config in &config.sources {
            match sheets.iter().find(|(name, _)| name == &source_config.name) {
                Some((_, sheet)) => {
                    ledger.push_batch(Self::process_sheet(source_config, sheet, config));
                }
                None => {
                    warn!("No sheet supplied for source '{}'", source_config.name);
                    ledger.mark_unavailable(&source_config.name, "no sheet supplied");
                }
            }
        }

        Ok(ledger)
    }
}

pub fn process_ledger(config: &EngineConfig, source: &dyn SheetSource) -> Result<Ledger> {
    LedgerProcessor::process(config, source)
}
