use anyhow::Context;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::ingest;
use crate::models::{CausalEvent, DailyRecord};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

async fn upsert_session(pool: &PgPool, name: &str) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO forecast_overlay.sessions (id, name)
        VALUES ($1, $2)
        ON CONFLICT (name) DO UPDATE
        SET updated_at = now()
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .fetch_one(pool)
    .await?
    .get("id");

    Ok(id)
}

async fn find_session(pool: &PgPool, name: &str) -> anyhow::Result<Uuid> {
    let row = sqlx::query("SELECT id FROM forecast_overlay.sessions WHERE name = $1")
        .bind(name)
        .fetch_optional(pool)
        .await?
        .with_context(|| format!("no saved session named '{name}'"))?;
    Ok(row.get("id"))
}

pub async fn save_events(
    pool: &PgPool,
    session: &str,
    events: &[CausalEvent],
) -> anyhow::Result<()> {
    let session_id = upsert_session(pool, session).await?;
    let blob = serde_json::to_value(events)?;

    sqlx::query(
        r#"
        INSERT INTO forecast_overlay.event_lists (session_id, events)
        VALUES ($1, $2)
        ON CONFLICT (session_id) DO UPDATE
        SET events = EXCLUDED.events, updated_at = now()
        "#,
    )
    .bind(session_id)
    .bind(blob)
    .execute(pool)
    .await?;

    tracing::info!(session, count = events.len(), "saved event list");
    Ok(())
}

/// Stored blobs are re-validated on the way out; a session with no list yields no events.
pub async fn load_events(pool: &PgPool, session: &str) -> anyhow::Result<Vec<CausalEvent>> {
    let session_id = find_session(pool, session).await?;
    let row = sqlx::query("SELECT events FROM forecast_overlay.event_lists WHERE session_id = $1")
        .bind(session_id)
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => {
            let blob: serde_json::Value = row.get("events");
            ingest::events_from_value(blob)
                .with_context(|| format!("stored events for '{session}' are invalid"))
        }
        None => Ok(Vec::new()),
    }
}

pub async fn save_forecast(
    pool: &PgPool,
    session: &str,
    payload: &serde_json::Value,
) -> anyhow::Result<()> {
    let session_id = upsert_session(pool, session).await?;

    sqlx::query(
        r#"
        INSERT INTO forecast_overlay.forecasts (session_id, payload)
        VALUES ($1, $2)
        ON CONFLICT (session_id) DO UPDATE
        SET payload = EXCLUDED.payload, updated_at = now()
        "#,
    )
    .bind(session_id)
    .bind(payload)
    .execute(pool)
    .await?;

    tracing::info!(session, "saved forecast payload");
    Ok(())
}

pub async fn load_forecast(
    pool: &PgPool,
    session: &str,
) -> anyhow::Result<(serde_json::Value, Vec<DailyRecord>)> {
    let session_id = find_session(pool, session).await?;
    let payload: serde_json::Value =
        sqlx::query("SELECT payload FROM forecast_overlay.forecasts WHERE session_id = $1")
            .bind(session_id)
            .fetch_optional(pool)
            .await?
            .with_context(|| format!("session '{session}' has no saved forecast"))?
            .get("payload");

    let (_, records) = ingest::parse_forecast_json(&payload.to_string())
        .with_context(|| format!("stored forecast for '{session}' is invalid"))?;
    Ok((payload, records))
}
