use crate::aggregate::AggregateResult;
use crate::calendar::calendar_attributes;
use crate::error::Result;
use crate::reconcile::TaxSummary;
use crate::schema::{CanonicalRecord, FeeClass};
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One canonical record flattened for tables and CSV backups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LedgerRow {
    pub id: String,
    pub date: NaiveDate,
    pub year: i32,
    pub month: String,
    pub pay_period: String,
    pub source: String,
    pub family: String,
    pub descriptor: String,
    pub group: String,
    pub amount: f64,
    pub fee_class: String,
    pub tax_line: String,
}

impl From<&CanonicalRecord> for LedgerRow {
    fn from(record: &CanonicalRecord) -> Self {
        let calendar = record
            .calendar
            .clone()
            .unwrap_or_else(|| calendar_attributes(record.occurred_at));

        let fee_class = match record.fee.as_ref().map(|f| &f.class) {
            Some(FeeClass::Matched { keyword }) => keyword.clone(),
            Some(FeeClass::Unclassified) => "unclassified".to_string(),
            None => String::new(),
        };

        Self {
            id: record.id.clone(),
            date: record.occurred_at,
            year: calendar.year,
            month: calendar.month_name,
            pay_period: calendar.pay_period.label().to_string(),
            source: record.source.clone(),
            family: record.family.to_string(),
            descriptor: record.descriptor.clone(),
            group: record.group_key.clone().unwrap_or_default(),
            amount: record.value(),
            fee_class,
            tax_line: record.tax_line.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerTable {
    pub rows: Vec<LedgerRow>,
}

impl LedgerTable {
    /// Rows ordered newest first, as the dashboards show them.
    pub fn from_records<'r, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'r CanonicalRecord>,
    {
        let mut rows: Vec<LedgerRow> = records.into_iter().map(LedgerRow::from).collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));
        Self { rows }
    }

    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for row in &self.rows {
            writer.serialize(row)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.rows)?)
    }

    pub fn schema_as_json() -> Result<String> {
        let schema = schemars::schema_for!(LedgerRow);
        Ok(serde_json::to_string_pretty(&schema)?)
    }
}

impl TaxSummary {
    pub fn tax_lines_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["Tax Line", "Amount"])?;
        for (line, amount) in &self.tax_lines {
            writer.write_record([line.as_str(), &format!("{:.2}", amount)])?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("# Financials for {}\n\n", self.year));
        output.push_str(&format!("- **Gross Revenue:** ${:.2}\n", self.gross_income));
        output.push_str(&format!("- **Expenses:** ${:.2}\n", self.total_expenses));
        output.push_str(&format!("- **Net Income:** ${:.2}\n", self.net_income));
        output.push_str(&format!(
            "- **Est. Tax Due:** ${:.2} @ {}%\n",
            self.estimated_tax, self.tax_rate_percent
        ));
        output.push_str(&format!("- **Safe to Spend:** ${:.2}\n\n", self.safe_to_spend));

        output.push_str("## Revenue Source\n\n");
        for (source, amount) in &self.income_by_source {
            output.push_str(&format!("- {}: ${:.2}\n", source, amount));
        }
        output.push('\n');

        output.push_str("## CRA Expense Categories (T2125)\n\n");
        if self.tax_lines.is_empty() {
            output.push_str("No expenses to categorize yet.\n");
        }
        for (line, amount) in &self.tax_lines {
            output.push_str(&format!("- {}: ${:.2}\n", line, amount));
        }

        output
    }
}

impl AggregateResult {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
