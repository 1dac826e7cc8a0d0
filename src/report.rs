use std::fmt::Write;

use crate::aggregate::Granularity;
use crate::models::{
    AggregatedBucket, CausalEvent, ChartRow, ForecastHorizon, SalesMetrics, SalesSummary,
};

pub struct ReportInput<'a> {
    pub granularity: Granularity,
    pub horizon: Option<ForecastHorizon>,
    pub summary: &'a SalesSummary,
    pub accuracy: Option<SalesMetrics>,
    pub events: &'a [CausalEvent],
    pub buckets: &'a [AggregatedBucket],
    pub rows: &'a [ChartRow],
}

fn cell(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.1}"))
}

/// Markdown table of forecast days with the adjusted value and its band.
pub fn forecast_band_table(rows: &[ChartRow]) -> String {
    let mut output = String::new();
    let forecast_days: Vec<&ChartRow> = rows
        .iter()
        .filter(|row| row.predicted.is_some())
        .collect();

    if forecast_days.is_empty() {
        let _ = writeln!(output, "No forecast days.");
        return output;
    }

    let _ = writeln!(output, "| Date | Baseline | Adjusted | Lower | Upper |");
    let _ = writeln!(output, "| --- | ---: | ---: | ---: | ---: |");
    for row in forecast_days {
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {} |",
            row.date,
            cell(row.baseline),
            cell(row.predicted),
            cell(row.lower),
            cell(row.upper)
        );
    }
    output
}

pub fn build_report(input: &ReportInput<'_>) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Sales Forecast Report");
    match input.horizon {
        Some(horizon) => {
            let _ = writeln!(
                output,
                "{} view, forecast horizon {} to {}",
                input.granularity, horizon.first, horizon.last
            );
        }
        None => {
            let _ = writeln!(output, "{} view, no forecast horizon", input.granularity);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let summary = input.summary;
    let _ = writeln!(output, "- Actual sales: {:.2}", summary.total_actual);
    let _ = writeln!(output, "- Baseline forecast: {:.2}", summary.total_baseline);
    let _ = writeln!(output, "- Adjusted forecast: {:.2}", summary.total_predicted);
    let _ = writeln!(output, "- Net event impact: {:+.2}", summary.total_event_impact);
    if let (Some(label), Some(value)) = (&summary.peak_bucket, summary.peak_value) {
        let _ = writeln!(output, "- Peak period: {label} ({value:.2})");
    }

    if let Some(metrics) = input.accuracy {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Forecast Accuracy");
        let _ = writeln!(
            output,
            "MAE {:.2}, RMSE {:.2}, MAPE {:.1}%",
            metrics.mae, metrics.rmse, metrics.mape
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Causal Events");
    if input.events.is_empty() {
        let _ = writeln!(output, "No causal events declared.");
    } else {
        let mut events = input.events.to_vec();
        events.sort_by(|a, b| a.start_date.cmp(&b.start_date));
        for event in &events {
            let _ = writeln!(
                output,
                "- {} {} to {}: {:+.1}%",
                event.type_label, event.start_date, event.end_date, event.impact_percent
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Periods");
    if input.buckets.is_empty() {
        let _ = writeln!(output, "No data for this view.");
    } else {
        let _ = writeln!(output, "| Period | Actual | Baseline | Adjusted | Event impact |");
        let _ = writeln!(output, "| --- | ---: | ---: | ---: | ---: |");
        for bucket in input.buckets {
            let impact: f64 = bucket.per_event_sum.values().sum();
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} | {:+.1} |",
                bucket.bucket_label,
                cell(bucket.actual_sum),
                cell(bucket.baseline_sum),
                cell(bucket.predicted_sum),
                impact
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Daily Forecast Band");
    output.push_str(&forecast_band_table(input.rows));

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DailyRecord;
    use crate::overlay::{apply_events, BandConfig};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn summary() -> SalesSummary {
        SalesSummary {
            total_actual: 0.0,
            total_baseline: 330.0,
            total_predicted: 363.0,
            total_event_impact: 33.0,
            peak_bucket: Some("Mar 2025".to_string()),
            peak_value: Some(363.0),
        }
    }

    #[test]
    fn renders_buckets_and_events() {
        let event = CausalEvent {
            id: Uuid::new_v4(),
            type_label: "Fiesta".to_string(),
            start_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            impact_percent: 10.0,
        };
        let mut per_event_sum = BTreeMap::new();
        per_event_sum.insert(event.key(), 33.0);
        let buckets = vec![AggregatedBucket {
            bucket_label: "Mar 2025".to_string(),
            sort_key: "2025-03".to_string(),
            actual_sum: None,
            baseline_sum: Some(330.0),
            predicted_sum: Some(363.0),
            per_event_sum,
        }];
        let summary = summary();
        let report = build_report(&ReportInput {
            granularity: Granularity::Monthly,
            horizon: None,
            summary: &summary,
            accuracy: None,
            events: std::slice::from_ref(&event),
            buckets: &buckets,
            rows: &[],
        });

        assert!(report.contains("monthly view"));
        assert!(report.contains("- Fiesta 2025-03-01 to 2025-03-03: +10.0%"));
        assert!(report.contains("| Mar 2025 | - | 330.0 | 363.0 | +33.0 |"));
        assert!(report.contains("Peak period: Mar 2025"));
        assert!(!report.contains("Forecast Accuracy"));
    }

    #[test]
    fn empty_report_says_so() {
        let summary = summary();
        let report = build_report(&ReportInput {
            granularity: Granularity::Weekly,
            horizon: None,
            summary: &summary,
            accuracy: Some(SalesMetrics {
                mae: 1.0,
                rmse: 2.0,
                mape: 3.0,
            }),
            events: &[],
            buckets: &[],
            rows: &[],
        });
        assert!(report.contains("No causal events declared."));
        assert!(report.contains("No data for this view."));
        assert!(report.contains("MAE 1.00, RMSE 2.00, MAPE 3.0%"));
        assert!(report.contains("No forecast days."));
    }

    #[test]
    fn band_table_lists_adjusted_forecast_with_bounds() {
        let date = |d| NaiveDate::from_ymd_opt(2025, 6, d).unwrap();
        let event = CausalEvent {
            id: Uuid::new_v4(),
            type_label: "Hot Weather".to_string(),
            start_date: date(2),
            end_date: date(2),
            impact_percent: 30.0,
        };
        let records = vec![
            DailyRecord {
                date: date(1),
                actual: Some(90.0),
                baseline: None,
            },
            DailyRecord {
                date: date(2),
                actual: None,
                baseline: Some(100.0),
            },
        ];
        let rows = apply_events(&records, &[event], BandConfig::default());
        let summary = summary();
        let report = build_report(&ReportInput {
            granularity: Granularity::Daily,
            horizon: None,
            summary: &summary,
            accuracy: None,
            events: &[],
            buckets: &[],
            rows: &rows,
        });

        assert!(report.contains("## Daily Forecast Band"));
        assert!(report.contains("| 2025-06-02 | 100.0 | 130.0 | 110.5 | 149.5 |"));
        assert!(!report.contains("| 2025-06-01 |"));
    }
}
