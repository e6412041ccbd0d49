use crate::calendar::{classify, ResolvedView, WindowSpec};
use crate::schema::CanonicalRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const NO_DATA_LABEL: &str = "-";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "delta", rename_all = "snake_case")]
pub enum PeriodDelta {
    Change {
        value: f64,
        percent: f64,
        against: String,
    },
    NoPriorData {
        against: String,
    },
}

impl PeriodDelta {
    pub fn label(&self) -> String {
        match self {
            PeriodDelta::Change {
                percent, against, ..
            } => format!("{:.1}% vs {}", percent, against),
            PeriodDelta::NoPriorData { .. } => "No prior data".to_string(),
        }
    }
}

/// Percentage change is only defined when the prior total is strictly
/// positive.
pub fn period_delta(current: f64, prior: f64, against: &str) -> PeriodDelta {
    if prior > 0.0 {
        let value = current - prior;
        PeriodDelta::Change {
            value,
            percent: value / prior * 100.0,
            against: against.to_string(),
        }
    } else {
        PeriodDelta::NoPriorData {
            against: against.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub first: NaiveDate,
    pub last: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSubtotal {
    pub total: f64,
    pub count: usize,
    pub average_per_month: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub label: String,
    pub total: f64,
    pub count: usize,
    /// Encounters whose type matched no fee keyword
    pub unclassified_count: usize,
    pub groups: BTreeMap<String, GroupSubtotal>,
    pub average_per_record: Option<f64>,
    pub average_per_month: Option<f64>,
    pub date_range: Option<DateRange>,
    pub delta: Option<PeriodDelta>,
}

impl AggregateResult {
    pub fn date_range_label(&self) -> String {
        match self.date_range {
            Some(range) => format!("{} to {}", range.first, range.last),
            None => NO_DATA_LABEL.to_string(),
        }
    }

    pub fn average_per_record_label(&self) -> String {
        match self.average_per_record {
            Some(avg) => format!("${:.2}", avg),
            None => "—".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayPeriodSplit {
    pub first_half: AggregateResult,
    pub second_half: AggregateResult,
}

/// Records falling inside `window`, in input order.
pub fn filter_window<'r>(records: &'r [CanonicalRecord], window: &WindowSpec) -> Vec<&'r CanonicalRecord> {
    records.iter().filter(|r| classify(r, window)).collect()
}

/// Subtotals keyed by exact value of `key`, largest first.
pub fn subtotals_by<'r, F>(records: &[&'r CanonicalRecord], key: F) -> Vec<(String, f64)>
where
    F: Fn(&'r CanonicalRecord) -> String,
{
    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    for record in records {
        *totals.entry(key(*record)).or_insert(0.0) += record.value();
    }

    let mut sorted: Vec<(String, f64)> = totals.into_iter().collect();
    sorted.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    sorted
}

/// Records sorted for display, most recent first.
pub fn newest_first<'r>(records: &[&'r CanonicalRecord]) -> Vec<&'r CanonicalRecord> {
    let mut sorted = records.to_vec();
    sorted.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at).then_with(|| a.id.cmp(&b.id)));
    sorted
}

/// Reduces canonical records into window summaries. Holds the known entity
/// names used for group subtotals.
pub struct Aggregator<'a> {
    entities: &'a [String],
    income_only: bool,
}

impl<'a> Aggregator<'a> {
    pub fn new(entities: &'a [String]) -> Self {
        Self {
            entities,
            income_only: false,
        }
    }

    /// Restricts every total to Encounter and Payment records, so a mixed
    /// ledger can be passed in without expenses counting as income.
    pub fn income_only(mut self) -> Self {
        self.income_only = true;
        self
    }

    fn select<'r>(&self, records: &'r [CanonicalRecord], window: &WindowSpec) -> Vec<&'r CanonicalRecord> {
        filter_window(records, window)
            .into_iter()
            .filter(|r| !self.income_only || r.family.is_income())
            .collect()
    }

    pub fn aggregate(&self, records: &[CanonicalRecord], window: &WindowSpec) -> AggregateResult {
        let selected = self.select(records, window);
        self.reduce(&window.label, &selected, window.divisor)
    }

    pub fn aggregate_with_comparison(
        &self,
        records: &[CanonicalRecord],
        window: &WindowSpec,
        comparison: Option<&WindowSpec>,
    ) -> AggregateResult {
        let mut result = self.aggregate(records, window);
        if let Some(prior_window) = comparison {
            let prior: f64 = self
                .select(records, prior_window)
                .iter()
                .map(|r| r.value())
                .sum();
            result.delta = Some(period_delta(result.total, prior, &prior_window.label));
        }
        result
    }

    pub fn aggregate_view(&self, records: &[CanonicalRecord], view: &ResolvedView) -> AggregateResult {
        let mut result = self.aggregate_with_comparison(records, &view.window, view.comparison.as_ref());
        result.label = view.title.clone();
        result
    }

    /// First-half and second-half totals for a month window.
    pub fn pay_period_split(&self, records: &[CanonicalRecord], window: &WindowSpec) -> Option<PayPeriodSplit> {
        let (first, second) = window.pay_periods()?;
        Some(PayPeriodSplit {
            first_half: self.aggregate(records, &first),
            second_half: self.aggregate(records, &second),
        })
    }

    fn reduce(&self, label: &str, records: &[&CanonicalRecord], divisor: u32) -> AggregateResult {
        let total: f64 = records.iter().map(|r| r.value()).sum();
        let count = records.len();
        let per_month = |amount: f64| (divisor > 0).then(|| amount / divisor as f64);

        let mut groups: BTreeMap<String, GroupSubtotal> = BTreeMap::new();
        for entity in self.entities {
            let needle = entity.to_lowercase();
            let members: Vec<&&CanonicalRecord> = records
                .iter()
                .filter(|r| {
                    r.group_key
                        .as_ref()
                        .is_some_and(|g| g.to_lowercase().contains(&needle))
                })
                .collect();

            if members.is_empty() {
                continue;
            }

            let subtotal: f64 = members.iter().map(|r| r.value()).sum();
            groups.insert(
                entity.clone(),
                GroupSubtotal {
                    total: subtotal,
                    count: members.len(),
                    average_per_month: per_month(subtotal),
                },
            );
        }

        let date_range = match (
            records.iter().map(|r| r.occurred_at).min(),
            records.iter().map(|r| r.occurred_at).max(),
        ) {
            (Some(first), Some(last)) => Some(DateRange { first, last }),
            _ => None,
        };

        AggregateResult {
            label: label.to_string(),
            total,
            count,
            unclassified_count: records.iter().filter(|r| r.is_unclassified()).count(),
            groups,
            average_per_record: (count > 0).then(|| total / count as f64),
            average_per_month: per_month(total),
            date_range,
            delta: None,
        }
    }
}

/// Progress toward a monthly income goal over a number of months.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalProgress {
    pub target: f64,
    pub actual: f64,
    pub percent: f64,
    /// True only when actual exceeded the target and the percent was clamped
    pub capped: bool,
    pub remaining: f64,
}

impl GoalProgress {
    pub fn compute(actual: f64, monthly_goal: f64, months: u32) -> Self {
        let target = monthly_goal * months.max(1) as f64;
        let raw = if target > 0.0 { actual / target * 100.0 } else { 0.0 };
        let capped = target > 0.0 && actual > target;

        Self {
            target,
            actual,
            percent: if capped { 100.0 } else { raw },
            capped,
            remaining: (target - actual).max(0.0),
        }
    }

    /// Uses the window's divisor as the month count; windows without a
    /// divisor count as a single month.
    pub fn for_window(actual: f64, monthly_goal: f64, window: &WindowSpec) -> Self {
        Self::compute(actual, monthly_goal, window.divisor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FeeAssessment, FeeClass, RecordFamily};

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn payment(date: NaiveDate, amount: f64, doctor: &str) -> CanonicalRecord {
        CanonicalRecord {
            id: format!("k:{}:{}", date, amount),
            occurred_at: date,
            amount,
            family: RecordFamily::Payment,
            descriptor: "Clinic".to_string(),
            group_key: Some(doctor.to_string()),
            source: "Kitchener".to_string(),
            layout: "payment".to_string(),
            fee: None,
            tax_line: None,
            calendar: None,
        }
    }

    fn entities() -> Vec<String> {
        vec!["Tripic".to_string(), "Cartagena".to_string()]
    }

    #[test]
    fn test_empty_records_degrade_to_zero() {
        let names = entities();
        let aggregator = Aggregator::new(&names);

        for window in [
            WindowSpec::month(2024, 3).unwrap(),
            WindowSpec::full_year(2024, ymd(2024, 6, 1)).unwrap(),
            WindowSpec::trailing_months(3, ymd(2024, 6, 1)),
            WindowSpec::all_time(),
        ] {
            let result = aggregator.aggregate(&[], &window);
            assert_eq!(result.total, 0.0);
            assert_eq!(result.count, 0);
            assert_eq!(result.unclassified_count, 0);
            assert!(result.groups.is_empty());
            assert_eq!(result.average_per_record, None);
            assert_eq!(result.average_per_record_label(), "—");
            assert_eq!(result.date_range, None);
            assert_eq!(result.date_range_label(), NO_DATA_LABEL);
            if window.divisor > 0 {
                assert_eq!(result.average_per_month, Some(0.0));
            } else {
                assert_eq!(result.average_per_month, None);
            }
        }
    }

    #[test]
    fn test_group_subtotals_use_case_insensitive_containment() {
        let records = vec![
            payment(ymd(2024, 2, 1), 1000.0, "Dr. Tripic"),
            payment(ymd(2024, 2, 2), 500.0, "TRIPIC"),
            payment(ymd(2024, 2, 3), 250.0, "cartagena, m."),
            payment(ymd(2024, 2, 4), 99.0, "Locum"),
        ];
        let names = entities();
        let result = Aggregator::new(&names).aggregate(&records, &WindowSpec::all_time());

        assert_eq!(result.total, 1849.0);
        assert_eq!(result.groups["Tripic"].total, 1500.0);
        assert_eq!(result.groups["Tripic"].count, 2);
        assert_eq!(result.groups["Cartagena"].total, 250.0);
        assert_eq!(result.groups.len(), 2);
    }

    #[test]
    fn test_averages_respect_divisor() {
        let records = vec![
            payment(ymd(2024, 1, 10), 3000.0, "Tripic"),
            payment(ymd(2024, 2, 10), 3000.0, "Tripic"),
        ];
        let names = entities();
        let aggregator = Aggregator::new(&names);

        let year = WindowSpec::full_year(2024, ymd(2024, 3, 1)).unwrap();
        let result = aggregator.aggregate(&records, &year);
        assert_eq!(result.average_per_month, Some(2000.0));
        assert_eq!(result.groups["Tripic"].average_per_month, Some(2000.0));
        assert_eq!(result.average_per_record, Some(3000.0));

        let month = WindowSpec::month(2024, 1).unwrap();
        let result = aggregator.aggregate(&records, &month);
        assert_eq!(result.average_per_month, None);
        assert_eq!(result.date_range_label(), "2024-01-10 to 2024-01-10");
    }

    #[test]
    fn test_delta_without_prior_data() {
        assert_eq!(
            period_delta(500.0, 0.0, "2023"),
            PeriodDelta::NoPriorData {
                against: "2023".to_string()
            }
        );
        assert_eq!(period_delta(500.0, 0.0, "2023").label(), "No prior data");
        assert!(matches!(period_delta(500.0, -10.0, "2023"), PeriodDelta::NoPriorData { .. }));
    }

    #[test]
    fn test_delta_percentage() {
        match period_delta(150.0, 100.0, "2023") {
            PeriodDelta::Change { value, percent, .. } => {
                assert_eq!(value, 50.0);
                assert_eq!(percent, 50.0);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(period_delta(75.0, 100.0, "March 2023").label(), "-25.0% vs March 2023");
    }

    #[test]
    fn test_year_over_year_comparison() {
        let records = vec![payment(ymd(2024, 4, 1), 500.0, "Tripic")];
        let names = entities();
        let aggregator = Aggregator::new(&names);
        let today = ymd(2024, 6, 1);

        let result = aggregator.aggregate_with_comparison(
            &records,
            &WindowSpec::full_year(2024, today).unwrap(),
            Some(&WindowSpec::full_year(2023, today).unwrap()),
        );
        assert_eq!(result.total, 500.0);
        assert!(matches!(result.delta, Some(PeriodDelta::NoPriorData { .. })));
    }

    #[test]
    fn test_income_only_ignores_expenses() {
        let mut expense = payment(ymd(2024, 4, 2), 100.0, "Tripic");
        expense.family = RecordFamily::Expense;
        let records = vec![payment(ymd(2024, 4, 1), 300.0, "Tripic"), expense];
        let names = entities();
        let year = WindowSpec::full_year(2024, ymd(2024, 6, 1)).unwrap();

        let mixed = Aggregator::new(&names).aggregate(&records, &year);
        assert_eq!(mixed.total, 400.0);

        let income = Aggregator::new(&names).income_only();
        let result = income.aggregate(&records, &year);
        assert_eq!(result.total, 300.0);
        assert_eq!(result.count, 1);
        assert_eq!(result.groups["Tripic"].total, 300.0);

        let prior_expense = {
            let mut r = records[1].clone();
            r.occurred_at = ymd(2023, 4, 2);
            r
        };
        let with_prior = vec![records[0].clone(), prior_expense];
        let compared = income.aggregate_with_comparison(
            &with_prior,
            &year,
            Some(&WindowSpec::full_year(2023, ymd(2024, 6, 1)).unwrap()),
        );
        assert!(matches!(compared.delta, Some(PeriodDelta::NoPriorData { .. })));
    }

    #[test]
    fn test_unclassified_encounters_are_counted() {
        let mut consult = payment(ymd(2024, 3, 1), 0.0, "Dr. A");
        consult.family = RecordFamily::Encounter;
        consult.fee = Some(FeeAssessment {
            fee: 85.0,
            class: FeeClass::Matched {
                keyword: "new consult".to_string(),
            },
        });
        let mut phone = consult.clone();
        phone.fee = Some(FeeAssessment {
            fee: 0.0,
            class: FeeClass::Unclassified,
        });

        let result = Aggregator::new(&[]).aggregate(&[consult, phone], &WindowSpec::all_time());
        assert_eq!(result.total, 85.0);
        assert_eq!(result.count, 2);
        assert_eq!(result.unclassified_count, 1);
    }

    #[test]
    fn test_pay_period_split_only_for_months() {
        let records = vec![
            payment(ymd(2024, 3, 15), 100.0, "Tripic"),
            payment(ymd(2024, 3, 16), 40.0, "Tripic"),
        ];
        let aggregator = Aggregator::new(&[]);
        let split = aggregator
            .pay_period_split(&records, &WindowSpec::month(2024, 3).unwrap())
            .unwrap();
        assert_eq!(split.first_half.total, 100.0);
        assert_eq!(split.second_half.total, 40.0);

        assert!(aggregator
            .pay_period_split(&records, &WindowSpec::all_time())
            .is_none());
    }

    #[test]
    fn test_subtotals_by_category_sorted_descending() {
        let mut a = payment(ymd(2024, 3, 1), 20.0, "");
        a.descriptor = "Travel".to_string();
        let mut b = payment(ymd(2024, 3, 2), 80.0, "");
        b.descriptor = "Supplies".to_string();
        let mut c = payment(ymd(2024, 3, 3), 30.0, "");
        c.descriptor = "Travel".to_string();

        let records = [a, b, c];
        let refs: Vec<&CanonicalRecord> = records.iter().collect();
        let totals = subtotals_by(&refs, |r| r.descriptor.clone());
        assert_eq!(
            totals,
            vec![("Supplies".to_string(), 80.0), ("Travel".to_string(), 50.0)]
        );

        let ordered = newest_first(&refs);
        assert_eq!(ordered[0].occurred_at, ymd(2024, 3, 3));
    }

    #[test]
    fn test_trailing_window_counts_post_dated_rows() {
        let today = ymd(2024, 6, 1);
        let records = vec![
            payment(ymd(2024, 2, 28), 50.0, "Tripic"),
            payment(ymd(2024, 5, 1), 100.0, "Tripic"),
            payment(ymd(2024, 6, 20), 200.0, "Tripic"),
        ];
        let names = entities();
        let result = Aggregator::new(&names).aggregate(&records, &WindowSpec::trailing_months(3, today));
        assert_eq!(result.total, 300.0);
        assert_eq!(result.average_per_month, Some(100.0));
    }

    #[test]
    fn test_goal_progress_caps_only_above_target() {
        let trailing = WindowSpec::trailing_months(3, ymd(2024, 6, 1));

        let progress = GoalProgress::for_window(24_000.0, 10_000.0, &trailing);
        assert_eq!(progress.target, 30_000.0);
        assert!((progress.percent - 80.0).abs() < 1e-9);
        assert!(!progress.capped);
        assert_eq!(progress.remaining, 6_000.0);

        let progress = GoalProgress::for_window(36_000.0, 10_000.0, &trailing);
        assert_eq!(progress.percent, 100.0);
        assert!(progress.capped);
        assert_eq!(progress.remaining, 0.0);

        let progress = GoalProgress::compute(30_000.0, 10_000.0, 3);
        assert_eq!(progress.percent, 100.0);
        assert!(!progress.capped);
    }

    #[test]
    fn test_goal_progress_without_goal() {
        let progress = GoalProgress::compute(500.0, 0.0, 0);
        assert_eq!(progress.percent, 0.0);
        assert!(!progress.capped);
    }
}
