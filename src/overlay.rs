use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::models::{CausalEvent, ChartRow, DailyRecord};

/// Multipliers for the band drawn around an adjusted forecast.
///
/// The defaults are a fixed ±15% heuristic, not a statistical interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandConfig {
    pub upper: f64,
    pub lower: f64,
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            upper: 1.15,
            lower: 0.85,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayOverlay {
    pub total_impact: f64,
    pub breakdown: BTreeMap<String, f64>,
    pub adjusted: f64,
    pub upper: f64,
    pub lower: f64,
}

pub fn overlay_day(
    baseline: f64,
    date: NaiveDate,
    events: &[CausalEvent],
    band: BandConfig,
) -> DayOverlay {
    let mut total_impact = 0.0;
    let mut breakdown = BTreeMap::new();

    for event in events.iter().filter(|event| event.covers(date)) {
        let impact = baseline * (event.impact_percent / 100.0);
        total_impact += impact;
        *breakdown.entry(event.key()).or_insert(0.0) += impact;
    }

    let adjusted = (baseline + total_impact).max(0.0);

    DayOverlay {
        total_impact,
        breakdown,
        adjusted,
        upper: adjusted * band.upper,
        lower: adjusted * band.lower,
    }
}

/// Builds per-day chart rows, applying events to every forecast day.
pub fn apply_events(
    records: &[DailyRecord],
    events: &[CausalEvent],
    band: BandConfig,
) -> Vec<ChartRow> {
    let rows: Vec<ChartRow> = records
        .iter()
        .map(|record| {
            let mut row = ChartRow::from_record(record);
            if let Some(baseline) = record.baseline {
                let overlay = overlay_day(baseline, record.date, events, band);
                row.predicted = Some(overlay.adjusted);
                row.upper = Some(overlay.upper);
                row.lower = Some(overlay.lower);
                row.event_impacts = overlay.breakdown;
            }
            row
        })
        .collect();

    tracing::debug!(days = rows.len(), events = events.len(), "applied causal events");
    rows
}
