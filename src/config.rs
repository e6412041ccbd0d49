use crate::derivation::{FeeSchedule, TaxLineTable};
use crate::error::{LedgerError, Result};
use crate::schema::RecordFamily;
use crate::source::SheetRef;
use crate::utils::DateOrder;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum HeaderMode {
    /// First row is a header; columns are found by keyword
    Keywords,
    /// No trusted header; rows go through the family's positional layouts
    #[default]
    Positional,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct SourceConfig {
    #[schemars(description = "Tag attached to every record from this sheet, e.g. 'London'")]
    pub name: String,

    pub family: RecordFamily,

    pub sheet: SheetRef,

    #[serde(default)]
    pub date_order: DateOrder,

    #[serde(default)]
    pub header: HeaderMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct EngineConfig {
    pub practice_name: String,

    pub sources: Vec<SourceConfig>,

    #[serde(default)]
    #[schemars(description = "Known provider or location names; group subtotals match these by case-insensitive containment")]
    pub entities: Vec<String>,

    #[serde(default)]
    pub fee_schedule: FeeSchedule,

    #[serde(default)]
    pub tax_lines: TaxLineTable,

    #[serde(default)]
    pub monthly_goal: f64,

    #[serde(default = "default_tax_rate")]
    #[schemars(description = "Estimated tax rate in percent. The dashboard offers 15 to 50.")]
    pub tax_rate_percent: f64,
}

fn default_tax_rate() -> f64 {
    30.0
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            practice_name: "EMG Practice".to_string(),
            sources: vec![
                SourceConfig {
                    name: "London".to_string(),
                    family: RecordFamily::Encounter,
                    sheet: SheetRef::new("Tugolov combined questionnaire(Responses)", "Form Responses 1"),
                    date_order: DateOrder::DayFirst,
                    header: HeaderMode::Keywords,
                },
                SourceConfig {
                    name: "Kitchener".to_string(),
                    family: RecordFamily::Payment,
                    sheet: SheetRef::new("EMG Payments Kitchener", "Payments"),
                    date_order: DateOrder::DayFirst,
                    header: HeaderMode::Keywords,
                },
                SourceConfig {
                    name: "Expenses".to_string(),
                    family: RecordFamily::Expense,
                    sheet: SheetRef::new("EMG Payments Kitchener", "Expenses_Form"),
                    date_order: DateOrder::MonthFirst,
                    header: HeaderMode::Positional,
                },
            ],
            entities: vec!["Tripic".to_string(), "Cartagena".to_string()],
            fee_schedule: FeeSchedule::default(),
            tax_lines: TaxLineTable::default(),
            monthly_goal: 10_000.0,
            tax_rate_percent: default_tax_rate(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(input: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn schema_as_json() -> Result<String> {
        let schema = schemars::schema_for!(EngineConfig);
        Ok(serde_json::to_string_pretty(&schema)?)
    }

    /// Rejects configurations that indicate a setup mistake. The tax rate is
    /// left alone; bounding it is the input layer's job.
    pub fn validate(&self) -> Result<()> {
        let mut names = BTreeSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(LedgerError::InvalidConfig(
                    "source name must not be empty".to_string(),
                ));
            }
            if !names.insert(source.name.as_str()) {
                return Err(LedgerError::InvalidConfig(format!(
                    "duplicate source name '{}'",
                    source.name
                )));
            }
        }

        for (idx, rule) in self.fee_schedule.rules.iter().enumerate() {
            if rule.keyword.trim().is_empty() {
                return Err(LedgerError::InvalidConfig(format!(
                    "fee rule #{} has an empty keyword",
                    idx
                )));
            }
            if rule.keyword != rule.keyword.to_lowercase() {
                return Err(LedgerError::InvalidConfig(format!(
                    "fee rule keyword '{}' must be lower case",
                    rule.keyword
                )));
            }
            if !rule.fee.is_finite() || rule.fee < 0.0 {
                return Err(LedgerError::InvalidConfig(format!(
                    "fee rule '{}' has invalid fee {}",
                    rule.keyword, rule.fee
                )));
            }
        }

        if !self.monthly_goal.is_finite() || self.monthly_goal < 0.0 {
            return Err(LedgerError::InvalidConfig(format!(
                "monthly goal {} must be a non-negative amount",
                self.monthly_goal
            )));
        }

        Ok(())
    }

    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sources.len(), 3);
        assert_eq!(config.source("Kitchener").unwrap().family, RecordFamily::Payment);
    }

    #[test]
    fn test_json_round_trip_with_defaults() {
        let json = r#"{
            "practice_name": "Test Clinic",
            "sources": [
                {
                    "name": "London",
                    "family": "Encounter",
                    "sheet": { "spreadsheet": "Responses", "worksheet": "Sheet1" },
                    "date_order": "day_first",
                    "header": "keywords"
                }
            ]
        }"#;

        let config = EngineConfig::from_json(json).unwrap();
        assert_eq!(config.sources[0].date_order, DateOrder::DayFirst);
        assert_eq!(config.tax_rate_percent, 30.0);
        assert_eq!(config.fee_schedule, FeeSchedule::default());
        assert!(config.entities.is_empty());

        let again = EngineConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(again, config);
    }

    #[test]
    fn test_unknown_family_fails_loudly() {
        let json = r#"{
            "practice_name": "Test Clinic",
            "sources": [
                { "name": "X", "family": "Refund", "sheet": { "spreadsheet": "a", "worksheet": "b" } }
            ]
        }"#;
        assert!(matches!(
            EngineConfig::from_json(json),
            Err(LedgerError::SerializationError(_))
        ));
    }

    #[test]
    fn test_validation_rejects_setup_mistakes() {
        let mut config = EngineConfig::default();
        config.sources[1].name = "London".to_string();
        assert!(matches!(config.validate(), Err(LedgerError::InvalidConfig(_))));

        let mut config = EngineConfig::default();
        config.fee_schedule.append("", 10.0);
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.fee_schedule.rules[0].keyword = "New Consult".to_string();
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.monthly_goal = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tax_rate_is_not_bounded_here() {
        let mut config = EngineConfig::default();
        config.tax_rate_percent = 95.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_schema_generation() {
        let schema = EngineConfig::schema_as_json().unwrap();
        assert!(schema.contains("practice_name"));
        assert!(schema.contains("fee_schedule"));
    }
}
