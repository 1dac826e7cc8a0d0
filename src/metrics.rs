use crate::models::{AggregatedBucket, ChartRow, SalesMetrics, SalesSummary};

/// MAE, RMSE and MAPE of `predicted` against `actual`.
///
/// MAPE divides by `max(actual, 1e-9)` so zero-sales days do not blow up.
pub fn forecast_accuracy(actual: &[f64], predicted: &[f64]) -> Option<SalesMetrics> {
    if actual.is_empty() || actual.len() != predicted.len() {
        return None;
    }

    let n = actual.len() as f64;
    let mut abs_sum = 0.0;
    let mut sq_sum = 0.0;
    let mut pct_sum = 0.0;

    for (y, y_hat) in actual.iter().zip(predicted) {
        let err = y - y_hat;
        abs_sum += err.abs();
        sq_sum += err * err;
        pct_sum += (err / y.max(1e-9)).abs();
    }

    Some(SalesMetrics {
        mae: abs_sum / n,
        rmse: (sq_sum / n).sqrt(),
        mape: pct_sum / n * 100.0,
    })
}

/// Accuracy over the days that have both an actual and a prediction.
pub fn accuracy_for_rows(rows: &[ChartRow]) -> Option<SalesMetrics> {
    let (actual, predicted): (Vec<f64>, Vec<f64>) = rows
        .iter()
        .filter_map(|row| Some((row.actual?, row.predicted?)))
        .unzip();
    forecast_accuracy(&actual, &predicted)
}

pub fn summarize(rows: &[ChartRow], buckets: &[AggregatedBucket]) -> SalesSummary {
    let positive = |value: Option<f64>| value.filter(|v| *v > 0.0).unwrap_or(0.0);

    let total_actual: f64 = rows.iter().map(|row| positive(row.actual)).sum();
    let total_baseline: f64 = rows.iter().map(|row| positive(row.baseline)).sum();
    let total_predicted: f64 = rows.iter().map(|row| positive(row.predicted)).sum();
    let total_event_impact: f64 = rows
        .iter()
        .flat_map(|row| row.event_impacts.values())
        .sum();

    let peak = buckets
        .iter()
        .filter_map(|bucket| {
            let value = bucket.predicted_sum.or(bucket.actual_sum)?;
            Some((bucket.bucket_label.clone(), value))
        })
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    SalesSummary {
        total_actual,
        total_baseline,
        total_predicted,
        total_event_impact,
        peak_bucket: peak.as_ref().map(|(label, _)| label.clone()),
        peak_value: peak.map(|(_, value)| value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{aggregate, Granularity};
    use crate::models::DailyRecord;
    use chrono::NaiveDate;

    #[test]
    fn accuracy_matches_hand_computation() {
        let metrics = forecast_accuracy(&[100.0, 200.0], &[110.0, 180.0]).unwrap();
        assert!((metrics.mae - 15.0).abs() < 1e-9);
        assert!((metrics.rmse - 250.0_f64.sqrt()).abs() < 1e-9);
        assert!((metrics.mape - 10.0).abs() < 1e-9);
    }

    #[test]
    fn accuracy_needs_aligned_input() {
        assert!(forecast_accuracy(&[], &[]).is_none());
        assert!(forecast_accuracy(&[1.0], &[1.0, 2.0]).is_none());
    }

    #[test]
    fn zero_actuals_do_not_divide_by_zero() {
        let metrics = forecast_accuracy(&[0.0], &[0.0]).unwrap();
        assert_eq!(metrics.mape, 0.0);
    }

    #[test]
    fn row_accuracy_uses_days_with_both_values() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let mut backtest = ChartRow::from_record(&DailyRecord {
            date,
            actual: Some(100.0),
            baseline: Some(90.0),
        });
        backtest.predicted = Some(90.0);
        let history = ChartRow::from_record(&DailyRecord {
            date: date.succ_opt().unwrap(),
            actual: Some(40.0),
            baseline: None,
        });
        let metrics = accuracy_for_rows(&[backtest, history]).unwrap();
        assert!((metrics.mae - 10.0).abs() < 1e-9);
    }

    #[test]
    fn summary_picks_the_peak_bucket() {
        let date = |m, d| NaiveDate::from_ymd_opt(2025, m, d).unwrap();
        let mut rows: Vec<ChartRow> = vec![
            DailyRecord {
                date: date(1,
                5),
                actual: Some(50.0),
                baseline: None,
            },
            DailyRecord {
                date: date(2,
                5),
                actual: None,
                baseline: Some(80.0),
            },
            DailyRecord {
                date: date(2,
                6),
                actual: None,
                baseline: Some(-3.0),
            },
        ]
        .iter()
        .map(ChartRow::from_record)
        .collect();
        rows[1].predicted = Some(88.0);
        rows[1].event_impacts.insert("Promo_x".to_string(), 8.0);

        let buckets = aggregate(&rows, Granularity::Monthly);
        let summary = summarize(&rows, &buckets);
        assert_eq!(summary.total_actual, 50.0);
        assert_eq!(summary.total_baseline, 80.0);
        assert_eq!(summary.total_predicted, 88.0);
        assert_eq!(summary.total_event_impact, 8.0);
        assert_eq!(summary.peak_bucket.as_deref(), Some("Feb 2025"));
        assert_eq!(summary.peak_value, Some(88.0));
    }
}
