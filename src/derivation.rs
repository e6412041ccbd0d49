//! Fee and tax-line derivation.
//!
//! Both derivations are table driven: the priority of fee keywords and the
//! category to tax-line mapping are plain data, so adding a rule never
//! touches control flow.

use crate::schema::{CanonicalRecord, FeeAssessment, FeeClass, RecordFamily};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const OTHER_EXPENSES_LINE: &str = "Line 9270 - Other expenses";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FeeRule {
    #[schemars(description = "Lower-case phrase searched for in the encounter type")]
    pub keyword: String,
    pub fee: f64,
}

impl FeeRule {
    pub fn new(keyword: &str, fee: f64) -> Self {
        Self {
            keyword: keyword.to_lowercase(),
            fee,
        }
    }
}

/// Ordered encounter fee rules. The first keyword found in the descriptor
/// wins. New keywords go at the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct FeeSchedule {
    pub rules: Vec<FeeRule>,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            rules: vec![
                FeeRule::new("new consult", 85.00),
                FeeRule::new("non cts", 65.00),
                FeeRule::new("follow up", 65.00),
            ],
        }
    }
}

impl FeeSchedule {
    pub fn append(&mut self, keyword: &str, fee: f64) {
        self.rules.push(FeeRule::new(keyword, fee));
    }

    pub fn assess(&self, descriptor: &str) -> FeeAssessment {
        let text = descriptor.to_lowercase();

        self.rules
            .iter()
            .find(|rule| text.contains(rule.keyword.as_str()))
            .map(|rule| FeeAssessment {
                fee: rule.fee,
                class: FeeClass::Matched {
                    keyword: rule.keyword.clone(),
                },
            })
            .unwrap_or(FeeAssessment {
                fee: 0.0,
                class: FeeClass::Unclassified,
            })
    }
}

/// Exact category label to CRA tax line lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TaxLineTable {
    pub lines: BTreeMap<String, String>,
    #[serde(default = "default_fallback_line")]
    pub fallback: String,
}

fn default_fallback_line() -> String {
    OTHER_EXPENSES_LINE.to_string()
}

/// Category labels offered on the expense form, in display order.
pub const EXPENSE_CATEGORIES: &[&str] = &[
    "🚗 Travel/Parking",
    "🏥 Medical Supplies",
    "📜 Professional Fees/Licenses",
    "🎓 Continuing Education",
    "💻 Software/Office",
    "🥣 Meals/Entertainment",
    "Other",
];

impl Default for TaxLineTable {
    fn default() -> Self {
        let pairs = [
            ("🚗 Travel/Parking", "Line 9281 - Motor vehicle expenses"),
            ("🏥 Medical Supplies", "Line 8810 - Office stationery and supplies"),
            (
                "📜 Professional Fees/Licenses",
                "Line 8760 - Business taxes, licences and memberships",
            ),
            ("🎓 Continuing Education", "Line 8710 - Seminars/Conventions (or Tuition)"),
            ("💻 Software/Office", "Line 8810 - Office stationery and supplies"),
            ("🥣 Meals/Entertainment", "Line 8523 - Meals and entertainment (50%)"),
            ("Other", OTHER_EXPENSES_LINE),
        ];

        let mut lines = BTreeMap::new();
        for (label, line) in pairs {
            lines.insert(label.to_string(), line.to_string());
            // Older rows were typed without the emoji prefix
            if let Some((_, plain)) = label.split_once(' ') {
                lines.insert(plain.to_string(), line.to_string());
            }
        }

        Self {
            lines,
            fallback: default_fallback_line(),
        }
    }
}

impl TaxLineTable {
    pub fn resolve(&self, category: &str) -> &str {
        self.lines
            .get(category.trim())
            .map(String::as_str)
            .unwrap_or(self.fallback.as_str())
    }
}

/// Attaches the family-specific derived field to a freshly normalized
/// record. Payments carry nothing derived.
pub fn derive_fields(record: &mut CanonicalRecord, fees: &FeeSchedule, tax_lines: &TaxLineTable) {
    match record.family {
        RecordFamily::Encounter => {
            record.fee = Some(fees.assess(&record.descriptor));
        }
        RecordFamily::Expense => {
            record.tax_line = Some(tax_lines.resolve(&record.descriptor).to_string());
        }
        RecordFamily::Payment => {}
    }
}
