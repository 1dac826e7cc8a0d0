use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One day of sales data. Historical days carry `actual`, forecast days carry `baseline`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub actual: Option<f64>,
    pub baseline: Option<f64>,
}

/// A user-declared factor that shifts demand by a percentage over a date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CausalEvent {
    pub id: Uuid,
    pub type_label: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub impact_percent: f64,
}

impl CausalEvent {
    /// Breakdown key, unique per event even when two share a type.
    pub fn key(&self) -> String {
        format!("{}_{}", self.type_label, self.id)
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        start <= self.end_date && end >= self.start_date
    }
}

/// Unvalidated event input, as typed by a user or read from a stored blob.
#[derive(Debug, Clone, Default)]
pub struct EventDraft {
    pub type_label: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub impact_percent: f64,
}

/// Per-day chart row after causal events are applied to the baseline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartRow {
    pub date: NaiveDate,
    pub actual: Option<f64>,
    pub baseline: Option<f64>,
    pub predicted: Option<f64>,
    pub upper: Option<f64>,
    pub lower: Option<f64>,
    pub event_impacts: BTreeMap<String, f64>,
}

impl ChartRow {
    pub fn from_record(record: &DailyRecord) -> Self {
        Self {
            date: record.date,
            actual: record.actual,
            baseline: record.baseline,
            predicted: None,
            upper: None,
            lower: None,
            event_impacts: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedBucket {
    pub bucket_label: String,
    pub sort_key: String,
    pub actual_sum: Option<f64>,
    pub baseline_sum: Option<f64>,
    pub predicted_sum: Option<f64>,
    pub per_event_sum: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForecastHorizon {
    pub first: NaiveDate,
    pub last: NaiveDate,
}

impl ForecastHorizon {
    /// First and last dates carrying a baseline; `None` when nothing is forecast.
    pub fn from_records(records: &[DailyRecord]) -> Option<Self> {
        let mut dates = records
            .iter()
            .filter(|record| record.baseline.is_some())
            .map(|record| record.date);
        let first = dates.next()?;
        let (first, last) = dates.fold((first, first), |(lo, hi), date| {
            (lo.min(date), hi.max(date))
        });
        Some(Self { first, last })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.first <= date && date <= self.last
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SalesMetrics {
    pub mae: f64,
    pub rmse: f64,
    pub mape: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesSummary {
    pub total_actual: f64,
    pub total_baseline: f64,
    pub total_predicted: f64,
    pub total_event_impact: f64,
    pub peak_bucket: Option<String>,
    pub peak_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryDay {
    pub day: u32,
    pub stock: i64,
    pub demand: i64,
    pub unmet: i64,
    pub pending_orders: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioImpact {
    pub demand: i64,
    pub cost: i64,
    pub efficiency: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    pub scenario: String,
    pub final_stock: i64,
    pub shortages: i64,
    pub service_level: f64,
    pub history: Vec<InventoryDay>,
    pub impact: ScenarioImpact,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    #[test]
    fn horizon_spans_baseline_dates_only() {
        let records = vec![
            DailyRecord {
                date: day(1),
                actual: Some(10.0),
                baseline: None,
            },
            DailyRecord {
                date: day(3),
                actual: None,
                baseline: Some(5.0),
            },
            DailyRecord {
                date: day(9),
                actual: None,
                baseline: Some(7.0),
            },
        ];
        let horizon = ForecastHorizon::from_records(&records).unwrap();
        assert_eq!(horizon.first, day(3));
        assert_eq!(horizon.last, day(9));
        assert!(!horizon.contains(day(1)));
    }

    #[test]
    fn horizon_missing_without_baseline() {
        let records = vec![DailyRecord {
            date: day(1),
            actual: Some(1.0),
            baseline: None,
        }];
        assert!(ForecastHorizon::from_records(&records).is_none());
    }

    #[test]
    fn chart_rows_serialize_their_band() {
        let mut row = ChartRow::from_record(&DailyRecord {
            date: day(2),
            actual: None,
            baseline: Some(100.0),
        });
        row.predicted = Some(100.0);
        row.upper = Some(115.0);
        row.lower = Some(85.0);

        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["date"], "2025-06-02");
        assert_eq!(value["upper"], 115.0);
        assert_eq!(value["lower"], 85.0);
        assert!(value["actual"].is_null());
    }

    #[test]
    fn overlap_is_inclusive_on_both_ends() {
        let event = CausalEvent {
            id: Uuid::new_v4(),
            type_label: "Holiday".to_string(),
            start_date: day(5),
            end_date: day(10),
            impact_percent: 5.0,
        };
        assert!(event.overlaps(day(1), day(5)));
        assert!(event.overlaps(day(10), day(12)));
        assert!(!event.overlaps(day(11), day(12)));
        assert!(event.covers(day(10)));
    }
}
