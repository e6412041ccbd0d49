use crate::error::LedgerError;
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum RecordFamily {
    #[schemars(description = "A billed patient encounter. The amount is derived from the encounter type.")]
    Encounter,

    #[schemars(description = "A payment received from a clinic or payer. Counted as income.")]
    Payment,

    #[schemars(description = "A business expense. Tracked separately from income and mapped to a tax line.")]
    Expense,
}

impl RecordFamily {
    pub fn is_income(&self) -> bool {
        matches!(self, RecordFamily::Encounter | RecordFamily::Payment)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordFamily::Encounter => "Encounter",
            RecordFamily::Payment => "Payment",
            RecordFamily::Expense => "Expense",
        }
    }
}

impl fmt::Display for RecordFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordFamily {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "encounter" | "encounters" => Ok(RecordFamily::Encounter),
            "payment" | "payments" => Ok(RecordFamily::Payment),
            "expense" | "expenses" => Ok(RecordFamily::Expense),
            _ => Err(LedgerError::UnknownFamily(s.to_string())),
        }
    }
}

/// Result of parsing a currency cell.
///
/// `Unparseable` keeps the original text so a bad cell is never mistaken
/// for a genuine zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParsedAmount {
    Value(f64),
    Blank,
    Unparseable(String),
}

impl ParsedAmount {
    pub fn value(&self) -> Option<f64> {
        match self {
            ParsedAmount::Value(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_value(&self) -> bool {
        matches!(self, ParsedAmount::Value(_))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PayPeriod {
    #[schemars(description = "Days 1 through 15 of the month")]
    FirstHalf,
    #[schemars(description = "Day 16 through the last day of the month")]
    SecondHalf,
}

impl PayPeriod {
    pub fn for_day(day: u32) -> Self {
        if day <= 15 {
            PayPeriod::FirstHalf
        } else {
            PayPeriod::SecondHalf
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PayPeriod::FirstHalf => "1st-15th",
            PayPeriod::SecondHalf => "16th-End",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CalendarAttributes {
    pub year: i32,
    /// 1-based calendar month, used for ordering
    pub month: u32,
    /// Display name only. Never sort on this.
    pub month_name: String,
    pub day: u32,
    pub pay_period: PayPeriod,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum FeeClass {
    #[schemars(description = "The encounter type matched a fee keyword")]
    Matched { keyword: String },

    #[schemars(description = "No fee keyword matched. The fee is zero but the encounter was not billed as a zero-fee type.")]
    Unclassified,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FeeAssessment {
    pub fee: f64,
    pub class: FeeClass,
}

impl FeeAssessment {
    pub fn is_unclassified(&self) -> bool {
        self.class == FeeClass::Unclassified
    }
}

/// One normalized transaction, independent of the row layout it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CanonicalRecord {
    #[schemars(description = "Opaque identity built from the source tag and row index. Not stable across reloads.")]
    pub id: String,

    pub occurred_at: NaiveDate,

    #[schemars(description = "Parsed amount. Zero for encounters until the fee is derived.")]
    pub amount: f64,

    pub family: RecordFamily,

    #[schemars(description = "Free text used for derivation: encounter type, payer or expense category")]
    pub descriptor: String,

    #[schemars(description = "Provider, doctor or location used for subtotals")]
    pub group_key: Option<String>,

    #[schemars(description = "Tag of the ledger this record came from, e.g. 'London'")]
    pub source: String,

    #[schemars(description = "Name of the column layout detected for the raw row")]
    pub layout: String,

    #[serde(default)]
    pub fee: Option<FeeAssessment>,

    #[serde(default)]
    pub tax_line: Option<String>,

    #[serde(default)]
    pub calendar: Option<CalendarAttributes>,
}

impl CanonicalRecord {
    /// The amount that counts toward totals: the derived fee for encounters,
    /// the parsed amount otherwise.
    pub fn value(&self) -> f64 {
        match self.family {
            RecordFamily::Encounter => self.fee.as_ref().map(|f| f.fee).unwrap_or(0.0),
            _ => self.amount,
        }
    }

    pub fn is_unclassified(&self) -> bool {
        self.family == RecordFamily::Encounter
            && self.fee.as_ref().map_or(true, |f| f.is_unclassified())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encounter(fee: Option<FeeAssessment>) -> CanonicalRecord {
        CanonicalRecord {
            id: "London:1".to_string(),
            occurred_at: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            amount: 0.0,
            family: RecordFamily::Encounter,
            descriptor: "New Consult".to_string(),
            group_key: None,
            source: "London".to_string(),
            layout: "encounter".to_string(),
            fee,
            tax_line: None,
            calendar: None,
        }
    }

    #[test]
    fn test_family_from_str() {
        assert_eq!("Encounter".parse::<RecordFamily>().unwrap(), RecordFamily::Encounter);
        assert_eq!(" payments ".parse::<RecordFamily>().unwrap(), RecordFamily::Payment);
        assert_eq!("EXPENSE".parse::<RecordFamily>().unwrap(), RecordFamily::Expense);

        let err = "refund".parse::<RecordFamily>().unwrap_err();
        assert!(matches!(err, LedgerError::UnknownFamily(ref f) if f == "refund"));
    }

    #[test]
    fn test_pay_period_boundary() {
        assert_eq!(PayPeriod::for_day(1), PayPeriod::FirstHalf);
        assert_eq!(PayPeriod::for_day(15), PayPeriod::FirstHalf);
        assert_eq!(PayPeriod::for_day(16), PayPeriod::SecondHalf);
        assert_eq!(PayPeriod::for_day(31), PayPeriod::SecondHalf);
    }

    #[test]
    fn test_encounter_value_uses_fee() {
        let billed = encounter(Some(FeeAssessment {
            fee: 85.0,
            class: FeeClass::Matched {
                keyword: "new consult".to_string(),
            },
        }));
        assert_eq!(billed.value(), 85.0);
        assert!(!billed.is_unclassified());

        let pending = encounter(None);
        assert_eq!(pending.value(), 0.0);
        assert!(pending.is_unclassified());
    }

    #[test]
    fn test_record_serialization() {
        let record = encounter(Some(FeeAssessment {
            fee: 0.0,
            class: FeeClass::Unclassified,
        }));
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"family\":\"Encounter\""));
        assert!(json.contains("\"class\":\"unclassified\""));

        let back: CanonicalRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
