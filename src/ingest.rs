use std::collections::{BTreeMap, HashSet};
use std::io::Read;
use std::path::Path;

use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{CausalEvent, DailyRecord, SalesMetrics};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{source_name} row {index}: unparseable date '{value}'")]
    InvalidDate {
        source_name: &'static str,
        index: usize,
        value: String,
    },
    #[error("{source_name} row {index}: {field} must be a finite number")]
    InvalidNumber {
        source_name: &'static str,
        index: usize,
        field: &'static str,
    },
    #[error("event {index}: missing {field}")]
    MissingField { index: usize, field: &'static str },
    #[error("event {index}: end date {end} is before start date {start}")]
    InvertedRange {
        index: usize,
        start: NaiveDate,
        end: NaiveDate,
    },
    #[error("event {index}: id {id} is already used by another event")]
    DuplicateId { index: usize, id: Uuid },
}

/// Response body of the forecasting service. Only the fields we consume are typed.
#[derive(Debug, Deserialize)]
pub struct ForecastResponse {
    #[serde(default)]
    pub historical: Vec<HistoricalPoint>,
    #[serde(default)]
    pub forecast: Vec<ForecastPoint>,
    #[serde(default)]
    pub metrics: Option<serde_json::Value>,
    #[serde(default)]
    pub monthly_total: Option<f64>,
    #[serde(default)]
    pub regressors: Vec<String>,
}

impl ForecastResponse {
    /// Training-fit metrics reported by the service; it sends `{}` when it could not compute them.
    pub fn metrics(&self) -> Option<SalesMetrics> {
        self.metrics
            .clone()
            .and_then(|value| serde_json::from_value(value).ok())
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoricalPoint {
    pub ds: String,
    pub y: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct ForecastPoint {
    pub ds: String,
    pub yhat: Option<f64>,
}

/// Accepts `YYYY-MM-DD`, optionally followed by a `T` or space separated time.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .map(|datetime| datetime.date())
}

fn checked(
    value: Option<f64>,
    source_name: &'static str,
    index: usize,
    field: &'static str,
) -> Result<Option<f64>, IngestError> {
    match value {
        Some(number) if !number.is_finite() => Err(IngestError::InvalidNumber {
            source_name,
            index,
            field,
        }),
        other => Ok(other),
    }
}

/// Merges records by date, later fields overriding earlier ones, sorted by date.
fn merge_by_date(records: impl IntoIterator<Item = DailyRecord>) -> Vec<DailyRecord> {
    let mut by_date: BTreeMap<NaiveDate, DailyRecord> = BTreeMap::new();
    for record in records {
        let entry = by_date.entry(record.date).or_insert(DailyRecord {
            date: record.date,
            actual: None,
            baseline: None,
        });
        if record.actual.is_some() {
            entry.actual = record.actual;
        }
        if record.baseline.is_some() {
            entry.baseline = record.baseline;
        }
    }
    by_date.into_values().collect()
}

pub fn records_from_forecast(response: &ForecastResponse) -> Result<Vec<DailyRecord>, IngestError> {
    let mut records = Vec::with_capacity(response.historical.len() + response.forecast.len());

    for (index, point) in response.historical.iter().enumerate() {
        let date = parse_date(&point.ds).ok_or_else(|| IngestError::InvalidDate {
            source_name: "historical",
            index,
            value: point.ds.clone(),
        })?;
        records.push(DailyRecord {
            date,
            actual: checked(point.y, "historical", index, "y")?,
            baseline: None,
        });
    }

    for (index, point) in response.forecast.iter().enumerate() {
        let date = parse_date(&point.ds).ok_or_else(|| IngestError::InvalidDate {
            source_name: "forecast",
            index,
            value: point.ds.clone(),
        })?;
        records.push(DailyRecord {
            date,
            actual: None,
            baseline: checked(point.yhat, "forecast", index, "yhat")?,
        });
    }

    Ok(merge_by_date(records))
}

pub fn parse_forecast_json(body: &str) -> anyhow::Result<(ForecastResponse, Vec<DailyRecord>)> {
    let response: ForecastResponse =
        serde_json::from_str(body).context("forecast payload is not valid JSON")?;
    let records = records_from_forecast(&response)?;
    tracing::info!(
        historical = response.historical.len(),
        forecast = response.forecast.len(),
        "loaded forecast payload"
    );
    Ok((response, records))
}

pub fn load_forecast_file(path: &Path) -> anyhow::Result<(ForecastResponse, Vec<DailyRecord>)> {
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read forecast file {}", path.display()))?;
    parse_forecast_json(&body)
}

/// Reads `date,actual,baseline` rows; blank cells become nulls.
pub fn read_records_csv<R: Read>(reader: R) -> anyhow::Result<Vec<DailyRecord>> {
    #[derive(Deserialize)]
    struct CsvRow {
        date: String,
        actual: Option<f64>,
        baseline: Option<f64>,
    }

    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut records = Vec::new();

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("csv row {index} is malformed"))?;
        let date = parse_date(&row.date).ok_or_else(|| IngestError::InvalidDate {
            source_name: "csv",
            index,
            value: row.date.clone(),
        })?;
        records.push(DailyRecord {
            date,
            actual: checked(row.actual, "csv", index, "actual")?,
            baseline: checked(row.baseline, "csv", index, "baseline")?,
        });
    }

    tracing::info!(rows = records.len(), "loaded csv records");
    Ok(merge_by_date(records))
}

pub fn load_records_csv(path: &Path) -> anyhow::Result<Vec<DailyRecord>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open csv {}", path.display()))?;
    read_records_csv(file)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredEvent {
    id: Option<Uuid>,
    type_label: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    impact_percent: Option<f64>,
}

/// Converts a stored event blob into typed events, rejecting the whole list on the first bad entry.
pub fn events_from_value(value: serde_json::Value) -> anyhow::Result<Vec<CausalEvent>> {
    let stored: Vec<StoredEvent> =
        serde_json::from_value(value).context("event list must be a JSON array of events")?;
    let mut events = Vec::with_capacity(stored.len());
    let mut seen_ids = HashSet::new();

    for (index, raw) in stored.into_iter().enumerate() {
        let type_label = raw
            .type_label
            .filter(|label| !label.trim().is_empty())
            .ok_or(IngestError::MissingField {
                index,
                field: "typeLabel",
            })?;
        let start_raw = raw.start_date.ok_or(IngestError::MissingField {
            index,
            field: "startDate",
        })?;
        let start_date = parse_date(&start_raw).ok_or_else(|| IngestError::InvalidDate {
            source_name: "events",
            index,
            value: start_raw.clone(),
        })?;
        let end_date = match raw.end_date.filter(|value| !value.trim().is_empty()) {
            Some(end_raw) => parse_date(&end_raw).ok_or(IngestError::InvalidDate {
                source_name: "events",
                index,
                value: end_raw.clone(),
            })?,
            None => start_date,
        };
        if end_date < start_date {
            return Err(IngestError::InvertedRange {
                index,
                start: start_date,
                end: end_date,
            }
            .into());
        }
        let impact_percent = checked(raw.impact_percent, "events", index, "impactPercent")?
            .ok_or(IngestError::MissingField {
                index,
                field: "impactPercent",
            })?;

        let id = raw.id.unwrap_or_else(Uuid::new_v4);
        if !seen_ids.insert(id) {
            return Err(IngestError::DuplicateId { index, id }.into());
        }

        events.push(CausalEvent {
            id,
            type_label: type_label.trim().to_string(),
            start_date,
            end_date,
            impact_percent,
        });
    }

    Ok(events)
}

/// Missing file means an empty list.
pub fn load_events_file(path: &Path) -> anyhow::Result<Vec<CausalEvent>> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no event file yet");
        return Ok(Vec::new());
    }
    let body = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read events file {}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_str(&body).context("events file is not valid JSON")?;
    events_from_value(value)
}

pub fn write_events_file(path: &Path, events: &[CausalEvent]) -> anyhow::Result<()> {
    let body = serde_json::to_string_pretty(events)?;
    std::fs::write(path, body)
        .with_context(|| format!("failed to write events file {}", path.display()))?;
    Ok(())
}
