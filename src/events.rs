use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{CausalEvent, EventDraft, ForecastHorizon};

/// Every validation failure surfaces as this one error with a user-facing reason.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("event rejected: {0}")]
pub struct EventRejected(pub String);

fn reject(reason: impl Into<String>) -> EventRejected {
    EventRejected(reason.into())
}

/// In-memory list of causal events for one session.
#[derive(Debug, Clone, Default)]
pub struct EventBook {
    events: Vec<CausalEvent>,
}

impl EventBook {
    pub fn new(events: Vec<CausalEvent>) -> Self {
        Self { events }
    }

    pub fn events(&self) -> &[CausalEvent] {
        &self.events
    }

    pub fn add(
        &mut self,
        draft: &EventDraft,
        horizon: Option<ForecastHorizon>,
    ) -> Result<CausalEvent, EventRejected> {
        let (start, end) = self.validate(draft, horizon, None)?;
        let event = CausalEvent {
            id: Uuid::new_v4(),
            type_label: draft.type_label.trim().to_string(),
            start_date: start,
            end_date: end,
            impact_percent: draft.impact_percent,
        };
        tracing::info!(key = %event.key(), %start, %end, "event added");
        self.events.push(event.clone());
        Ok(event)
    }

    pub fn update(
        &mut self,
        id: Uuid,
        draft: &EventDraft,
        horizon: Option<ForecastHorizon>,
    ) -> Result<CausalEvent, EventRejected> {
        let position = self
            .events
            .iter()
            .position(|event| event.id == id)
            .ok_or_else(|| reject(format!("no event with id {id}")))?;
        let (start, end) = self.validate(draft, horizon, Some(id))?;

        let event = &mut self.events[position];
        event.type_label = draft.type_label.trim().to_string();
        event.start_date = start;
        event.end_date = end;
        event.impact_percent = draft.impact_percent;
        tracing::info!(key = %event.key(), "event updated");
        Ok(event.clone())
    }

    pub fn remove(&mut self, id: Uuid) -> Result<CausalEvent, EventRejected> {
        let position = self
            .events
            .iter()
            .position(|event| event.id == id)
            .ok_or_else(|| reject(format!("no event with id {id}")))?;
        let removed = self.events.remove(position);
        tracing::info!(key = %removed.key(), "event removed");
        Ok(removed)
    }

    fn validate(
        &self,
        draft: &EventDraft,
        horizon: Option<ForecastHorizon>,
        replacing: Option<Uuid>,
    ) -> Result<(NaiveDate, NaiveDate), EventRejected> {
        let type_label = draft.type_label.trim();
        if type_label.is_empty() {
            return Err(reject("event type is required"));
        }
        if !draft.impact_percent.is_finite() {
            return Err(reject("impact percent must be a number"));
        }

        let start = draft
            .start_date
            .ok_or_else(|| reject("start date is required"))?;
        let end = draft.end_date.unwrap_or(start);
        if end < start {
            return Err(reject(format!(
                "end date {end} is before start date {start}"
            )));
        }

        let horizon =
            horizon.ok_or_else(|| reject("no forecast loaded; events need a forecast horizon"))?;
        if !horizon.contains(start) {
            return Err(reject(format!(
                "start date {start} is outside the forecast range {} to {}",
                horizon.first, horizon.last
            )));
        }
        if !horizon.contains(end) {
            return Err(reject(format!(
                "end date {end} is outside the forecast range {} to {}",
                horizon.first, horizon.last
            )));
        }

        let clash = self.events.iter().find(|existing| {
            Some(existing.id) != replacing
                && existing.type_label == type_label
                && existing.overlaps(start, end)
        });
        if let Some(existing) = clash {
            return Err(reject(format!(
                "a {} event already covers {} to {}",
                existing.type_label, existing.start_date, existing.end_date
            )));
        }

        Ok((start, end))
    }
}
