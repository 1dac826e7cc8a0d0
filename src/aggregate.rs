use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, Duration, NaiveDate};

use crate::models::{AggregatedBucket, ChartRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Granularity {
    Daily,
    Weekly,
    #[default]
    Monthly,
    Quarterly,
    Yearly,
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Granularity::Daily => "daily",
            Granularity::Weekly => "weekly",
            Granularity::Monthly => "monthly",
            Granularity::Quarterly => "quarterly",
            Granularity::Yearly => "yearly",
        };
        f.write_str(name)
    }
}

/// Returns `(sort_key, label)` for the bucket containing `date`.
pub fn bucket_for(date: NaiveDate, granularity: Granularity) -> (String, String) {
    match granularity {
        Granularity::Daily => {
            let key = date.format("%Y-%m-%d").to_string();
            (key.clone(), key)
        }
        Granularity::Weekly => {
            let start = week_start(date);
            (
                start.format("%Y-%m-%d").to_string(),
                start.format("Week of %b %d, %Y").to_string(),
            )
        }
        Granularity::Monthly => (
            date.format("%Y-%m").to_string(),
            date.format("%b %Y").to_string(),
        ),
        Granularity::Quarterly => {
            let quarter = (date.month() - 1) / 3 + 1;
            (
                format!("{}-Q{}", date.year(), quarter),
                format!("Q{} {}", quarter, date.year()),
            )
        }
        Granularity::Yearly => {
            let key = date.year().to_string();
            (key.clone(), key)
        }
    }
}

pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

#[derive(Default)]
struct PositiveSum {
    total: f64,
    count: usize,
}

impl PositiveSum {
    fn add(&mut self, value: Option<f64>) {
        if let Some(value) = value.filter(|value| *value > 0.0) {
            self.total += value;
            self.count += 1;
        }
    }

    fn finish(&self) -> Option<f64> {
        (self.count > 0).then_some(self.total)
    }
}

#[derive(Default)]
struct BucketAccumulator {
    label: String,
    actual: PositiveSum,
    baseline: PositiveSum,
    predicted: PositiveSum,
    events: BTreeMap<String, f64>,
}

/// Folds daily chart rows into buckets ordered by sort key.
///
/// Only strictly positive actual/baseline/predicted values are summed, and a
/// bucket with no contributors reports `None` rather than zero. Event impacts
/// are summed as-is, negatives included.
pub fn aggregate(rows: &[ChartRow], granularity: Granularity) -> Vec<AggregatedBucket> {
    if granularity == Granularity::Daily {
        return rows.iter().map(daily_bucket).collect();
    }

    let mut groups: BTreeMap<String, BucketAccumulator> = BTreeMap::new();

    for row in rows {
        let (sort_key, label) = bucket_for(row.date, granularity);
        let entry = groups.entry(sort_key).or_insert_with(|| BucketAccumulator {
            label,
            ..Default::default()
        });

        entry.actual.add(row.actual);
        entry.baseline.add(row.baseline);
        entry.predicted.add(row.predicted);

        for (key, impact) in &row.event_impacts {
            *entry.events.entry(key.clone()).or_insert(0.0) += impact;
        }
    }

    tracing::debug!(
        rows = rows.len(),
        buckets = groups.len(),
        %granularity,
        "aggregated series"
    );

    groups
        .into_iter()
        .map(|(sort_key, acc)| AggregatedBucket {
            bucket_label: acc.label,
            sort_key,
            actual_sum: acc.actual.finish(),
            baseline_sum: acc.baseline.finish(),
            predicted_sum: acc.predicted.finish(),
            per_event_sum: acc.events,
        })
        .collect()
}

fn daily_bucket(row: &ChartRow) -> AggregatedBucket {
    let (sort_key, bucket_label) = bucket_for(row.date, Granularity::Daily);
    AggregatedBucket {
        bucket_label,
        sort_key,
        actual_sum: row.actual,
        baseline_sum: row.baseline,
        predicted_sum: row.predicted,
        per_event_sum: row.event_impacts.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DailyRecord;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn row(date: NaiveDate, actual: Option<f64>, baseline: Option<f64>) -> ChartRow {
        ChartRow::from_record(&DailyRecord {
            date,
            actual,
            baseline,
        })
    }

    #[test]
    fn daily_granularity_is_identity() {
        let rows = vec![
            row(date(2025, 3, 2), Some(-5.0), None),
            row(date(2025, 3, 1), Some(12.0), None),
            row(date(2025, 3, 3), None, Some(40.0)),
        ];
        let buckets = aggregate(&rows, Granularity::Daily);
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0].sort_key, "2025-03-02");
        assert_eq!(buckets[0].actual_sum, Some(-5.0));
        assert_eq!(buckets[1].actual_sum, Some(12.0));
        assert_eq!(buckets[2].baseline_sum, Some(40.0));
        assert_eq!(buckets[2].actual_sum, None);
    }

    #[test]
    fn monthly_march_baselines_fold_into_one_bucket() {
        let rows = vec![
            row(date(2025, 3, 1), None, Some(100.0)),
            row(date(2025, 3, 2), None, Some(110.0)),
            row(date(2025, 3, 3), None, Some(120.0)),
        ];
        let buckets = aggregate(&rows, Granularity::Monthly);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].bucket_label, "Mar 2025");
        assert_eq!(buckets[0].baseline_sum, Some(330.0));
        assert_eq!(buckets[0].actual_sum, None);
    }

    #[test]
    fn negative_actuals_are_excluded() {
        let rows = vec![
            row(date(2025, 3, 1), Some(-5.0), None),
            row(date(2025, 3, 2), Some(20.0), None),
        ];
        let buckets = aggregate(&rows, Granularity::Monthly);
        assert_eq!(buckets[0].actual_sum, Some(20.0));

        let only_negative = vec![row(date(2025, 4, 1), Some(-5.0), None)];
        let buckets = aggregate(&only_negative, Granularity::Monthly);
        assert_eq!(buckets[0].actual_sum, None);
    }

    #[test]
    fn positive_actual_sum_is_preserved_across_granularities() {
        let mut rows = Vec::new();
        let mut expected = 0.0;
        let mut current = date(2024, 11, 20);
        for i in 0..120 {
            let value = (i % 7) as f64 * 3.5 - 4.0;
            if value > 0.0 {
                expected += value;
            }
            rows.push(row(current, Some(value), None));
            current += Duration::days(1);
        }

        for granularity in [
            Granularity::Weekly,
            Granularity::Monthly,
            Granularity::Quarterly,
            Granularity::Yearly,
        ] {
            let total: f64 = aggregate(&rows, granularity)
                .iter()
                .filter_map(|bucket| bucket.actual_sum)
                .sum();
            assert!((total - expected).abs() < 1e-9, "{granularity}");
        }
    }

    #[test]
    fn buckets_sort_chronologically_not_by_label() {
        let rows = vec![
            row(date(2025, 2, 10), Some(1.0), None),
            row(date(2024, 12, 10), Some(1.0), None),
            row(date(2025, 1, 10), Some(1.0), None),
        ];
        let labels: Vec<String> = aggregate(&rows, Granularity::Monthly)
            .into_iter()
            .map(|bucket| bucket.bucket_label)
            .collect();
        assert_eq!(labels, vec!["Dec 2024", "Jan 2025", "Feb 2025"]);
    }

    #[test]
    fn event_impacts_accumulate_without_filter() {
        let mut first = row(date(2025, 6, 2), None, None);
        first.event_impacts.insert("Rain_a".to_string(), -4.0);
        let mut second = row(date(2025, 6, 3), None, Some(50.0));
        second.event_impacts.insert("Rain_a".to_string(), 0.0);
        second.event_impacts.insert("Promo_b".to_string(), 6.0);

        let buckets = aggregate(&[first, second], Granularity::Weekly);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].sort_key, "2025-06-02");
        assert_eq!(buckets[0].bucket_label, "Week of Jun 02, 2025");
        assert_eq!(buckets[0].per_event_sum["Rain_a"], -4.0);
        assert_eq!(buckets[0].per_event_sum["Promo_b"], 6.0);
        assert_eq!(buckets[0].baseline_sum, Some(50.0));
    }

    #[test]
    fn quarter_and_year_keys() {
        assert_eq!(
            bucket_for(date(2025, 8, 15), Granularity::Quarterly),
            ("2025-Q3".to_string(), "Q3 2025".to_string())
        );
        assert_eq!(
            bucket_for(date(2025, 8, 15), Granularity::Yearly),
            ("2025".to_string(), "2025".to_string())
        );
        assert_eq!(week_start(date(2025, 6, 8)), date(2025, 6, 2));
    }

    #[test]
    fn empty_input_yields_no_buckets() {
        assert!(aggregate(&[], Granularity::Quarterly).is_empty());
        assert!(aggregate(&[], Granularity::Daily).is_empty());
    }
}
