//! Cross-source ledger and tax estimates.
//!
//! Every figure here is a pure function of the ledger contents, the year and
//! the tax rate.

use crate::aggregate::subtotals_by;
use crate::derivation::TaxLineTable;
use crate::normalize::{NormalizedBatch, SkippedRow};
use crate::schema::{CanonicalRecord, RecordFamily};
use chrono::Datelike;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnavailableSource {
    pub name: String,
    pub details: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    records: Vec<CanonicalRecord>,
    /// Source tags in merge order, with the family each one carries
    sources: Vec<(String, RecordFamily)>,
    skipped: BTreeMap<String, Vec<SkippedRow>>,
    unavailable: Vec<UnavailableSource>,
    /// Resolves expenses that reach the ledger without a tax line
    tax_lines: TaxLineTable,
}

impl Ledger {
    /// Merges independently normalized batches. Each record is tagged with
    /// the batch's source.
    pub fn merge(batches: Vec<NormalizedBatch>) -> Self {
        let mut ledger = Ledger::default();
        for batch in batches {
            ledger.push_batch(batch);
        }
        ledger
    }

    pub fn with_tax_lines(tax_lines: TaxLineTable) -> Self {
        Self {
            tax_lines,
            ..Self::default()
        }
    }

    pub fn push_batch(&mut self, batch: NormalizedBatch) {
        debug!(
            "Merging {} records from '{}' into ledger",
            batch.records.len(),
            batch.source
        );

        let source = batch.source;
        self.records.extend(batch.records.into_iter().map(|mut r| {
            r.source = source.clone();
            r
        }));
        if !batch.skipped.is_empty() {
            self.skipped.insert(source.clone(), batch.skipped);
        }
        self.sources.push((source, batch.family));
    }

    pub fn mark_unavailable(&mut self, name: &str, details: &str) {
        self.unavailable.push(UnavailableSource {
            name: name.to_string(),
            details: details.to_string(),
        });
    }

    pub fn records(&self) -> &[CanonicalRecord] {
        &self.records
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn skipped(&self) -> &BTreeMap<String, Vec<SkippedRow>> {
        &self.skipped
    }

    pub fn unavailable(&self) -> &[UnavailableSource] {
        &self.unavailable
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn of_family(&self, family: RecordFamily) -> Vec<CanonicalRecord> {
        self.records
            .iter()
            .filter(|r| r.family == family)
            .cloned()
            .collect()
    }

    pub fn from_source(&self, source: &str) -> Vec<CanonicalRecord> {
        self.records
            .iter()
            .filter(|r| r.source == source)
            .cloned()
            .collect()
    }

    pub fn income_records(&self) -> Vec<CanonicalRecord> {
        self.records
            .iter()
            .filter(|r| r.family.is_income())
            .cloned()
            .collect()
    }

    fn in_year(&self, year: i32) -> impl Iterator<Item = &CanonicalRecord> {
        self.records
            .iter()
            .filter(move |r| r.occurred_at.year() == year)
    }

    pub fn gross_income(&self, year: i32) -> f64 {
        self.in_year(year)
            .filter(|r| r.family.is_income())
            .map(|r| r.value())
            .sum()
    }

    pub fn total_expenses(&self, year: i32) -> f64 {
        self.in_year(year)
            .filter(|r| r.family == RecordFamily::Expense)
            .map(|r| r.value())
            .sum()
    }

    /// Income per source tag. Every income source appears, even with no
    /// records in the year.
    pub fn income_by_source(&self, year: i32) -> BTreeMap<String, f64> {
        let mut totals: BTreeMap<String, f64> = self
            .sources
            .iter()
            .filter(|(_, family)| family.is_income())
            .map(|(name, _)| (name.clone(), 0.0))
            .collect();

        for record in self.in_year(year).filter(|r| r.family.is_income()) {
            *totals.entry(record.source.clone()).or_insert(0.0) += record.value();
        }
        totals
    }

    /// Expense totals per CRA tax line.
    pub fn tax_line_summary(&self, year: i32) -> BTreeMap<String, f64> {
        let mut totals = BTreeMap::new();
        for record in self
            .in_year(year)
            .filter(|r| r.family == RecordFamily::Expense)
        {
            let line = match &record.tax_line {
                Some(line) => line.clone(),
                None => self.tax_lines.resolve(&record.descriptor).to_string(),
            };
            *totals.entry(line).or_insert(0.0) += record.value();
        }
        totals
    }

    /// Expense totals per category label, largest first.
    pub fn expenses_by_category(&self, year: i32) -> Vec<(String, f64)> {
        let expenses: Vec<&CanonicalRecord> = self
            .in_year(year)
            .filter(|r| r.family == RecordFamily::Expense)
            .collect();
        subtotals_by(&expenses, |r| r.descriptor.clone())
    }

    /// Splits expenses by the location they were logged against. Locations
    /// named after an income source match exactly; anything mentioning
    /// "general" counts as shared.
    pub fn expenses_by_location(&self, year: i32) -> LocationSplit {
        let mut split = LocationSplit {
            total: 0.0,
            by_location: self
                .sources
                .iter()
                .filter(|(_, family)| family.is_income())
                .map(|(name, _)| (name.clone(), 0.0))
                .collect(),
            general: 0.0,
        };

        for record in self
            .in_year(year)
            .filter(|r| r.family == RecordFamily::Expense)
        {
            let value = record.value();
            split.total += value;

            let Some(location) = record.group_key.as_deref() else {
                continue;
            };
            if let Some(total) = split.by_location.get_mut(location) {
                *total += value;
            } else if location.to_lowercase().contains("general") {
                split.general += value;
            }
        }
        split
    }

    pub fn tax_summary(&self, year: i32, tax_rate_percent: f64) -> TaxSummary {
        let gross_income = self.gross_income(year);
        let total_expenses = self.total_expenses(year);
        let net = net_income(gross_income, total_expenses);
        let tax = estimated_tax(net, tax_rate_percent);

        TaxSummary {
            year,
            tax_rate_percent,
            gross_income,
            total_expenses,
            net_income: net,
            estimated_tax: tax,
            safe_to_spend: safe_to_spend(net, tax),
            expense_ratio: expense_ratio(gross_income, total_expenses),
            income_by_source: self.income_by_source(year),
            tax_lines: self.tax_line_summary(year),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSplit {
    pub total: f64,
    pub by_location: BTreeMap<String, f64>,
    pub general: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxSummary {
    pub year: i32,
    pub tax_rate_percent: f64,
    pub gross_income: f64,
    pub total_expenses: f64,
    pub net_income: f64,
    pub estimated_tax: f64,
    pub safe_to_spend: f64,
    /// Expenses as a percentage of gross income; absent without income
    pub expense_ratio: Option<f64>,
    pub income_by_source: BTreeMap<String, f64>,
    pub tax_lines: BTreeMap<String, f64>,
}

pub fn net_income(gross: f64, expenses: f64) -> f64 {
    gross - expenses
}

/// `net × rate / 100`. The rate is used as given, including values outside
/// the range the dashboard offers.
pub fn estimated_tax(net: f64, tax_rate_percent: f64) -> f64 {
    net * (tax_rate_percent / 100.0)
}

pub fn safe_to_spend(net: f64, estimated_tax: f64) -> f64 {
    net - estimated_tax
}

pub fn expense_ratio(gross: f64, expenses: f64) -> Option<f64> {
    (gross > 0.0).then(|| expenses / gross * 100.0)
}
