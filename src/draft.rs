use crate::error::{LedgerError, Result};
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const PAYMENT_METHODS: &[&str] = &["Credit Card", "Debit", "Cash", "E-Transfer"];
pub const EXPENSE_LOCATIONS: &[&str] = &["General / Both", "London", "Kitchener"];

/// A new expense entry that has not been written to the sheet yet.
///
/// This is the value a form, or a receipt classifier filling the JSON
/// schema below, hands to the engine. It is passed around explicitly and
/// never held as session state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExpenseDraft {
    #[schemars(description = "Date of the expense in YYYY-MM-DD format")]
    pub date: NaiveDate,

    #[schemars(description = "One of the fixed expense category labels, e.g. '🚗 Travel/Parking' or 'Other'")]
    pub category: String,

    #[schemars(description = "Amount paid in dollars. Must be greater than zero.")]
    pub amount: f64,

    #[serde(default)]
    #[schemars(description = "Short free-text note, e.g. 'Parking at Hospital'")]
    pub description: String,

    #[serde(default = "default_payment_method")]
    #[schemars(description = "One of: Credit Card, Debit, Cash, E-Transfer")]
    pub payment_method: String,

    #[serde(default = "default_location")]
    #[schemars(description = "One of: General / Both, London, Kitchener")]
    pub location: String,
}

fn default_payment_method() -> String {
    PAYMENT_METHODS[0].to_string()
}

fn default_location() -> String {
    EXPENSE_LOCATIONS[0].to_string()
}

impl ExpenseDraft {
    pub fn new(date: NaiveDate, category: &str, amount: f64) -> Self {
        Self {
            date,
            category: category.to_string(),
            amount,
            description: String::new(),
            payment_method: default_payment_method(),
            location: default_location(),
        }
    }

    pub fn from_json(input: &str) -> Result<Self> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(LedgerError::InvalidDraft(format!(
                "amount must be greater than $0, got {}",
                self.amount
            )));
        }
        if self.category.trim().is_empty() {
            return Err(LedgerError::InvalidDraft("category is required".to_string()));
        }
        Ok(())
    }

    /// The row appended to the expense sheet, in the legacy column order
    /// `[date, category, amount, description, method, location]`.
    pub fn to_row(&self) -> Result<Vec<String>> {
        self.validate()?;
        Ok(vec![
            self.date.format("%Y-%m-%d").to_string(),
            self.category.clone(),
            format!("{:.2}", self.amount),
            self.description.clone(),
            self.payment_method.clone(),
            self.location.clone(),
        ])
    }

    pub fn schema_as_json() -> Result<String> {
        let schema = schemars::schema_for!(ExpenseDraft);
        Ok(serde_json::to_string_pretty(&schema)?)
    }
}
