use chrono::Utc;
use sqlx::SqlitePool;

use crate::queue::store::format_utc;
use crate::types::{IngestOutcome, LedgerEvent};

#[derive(Debug)]
pub enum StoreError {
    Db(sqlx::Error),
    NotFound(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err)
    }
}

pub async fn record_if_new(
    pool: &SqlitePool,
    event_id: &str,
    event_type: &str,
    payload: &str,
) -> Result<IngestOutcome, StoreError> {
    let received_at = format_utc(Utc::now());

    let inserted = sqlx::query(
        r#"
        INSERT INTO webhook_events (
            event_id,
            event_type,
            payload,
            received_at,
            processed
        )
        VALUES (?, ?, ?, ?, 0)
        ON CONFLICT(event_id) DO NOTHING
        "#,
    )
    .bind(event_id)
    .bind(event_type)
    .bind(payload)
    .bind(&received_at)
    .execute(pool)
    .await?;

    if inserted.rows_affected() > 0 {
        return Ok(IngestOutcome {
            is_new: true,
            event: LedgerEvent {
                event_id: event_id.to_string(),
                event_type: event_type.to_string(),
                payload: payload.to_string(),
                received_at,
                processed: false,
            },
        });
    }

    let event = get_event(pool, event_id).await?;
    Ok(IngestOutcome {
        is_new: false,
        event,
    })
}

pub async fn mark_processed(pool: &SqlitePool, event_id: &str) -> Result<(), StoreError> {
    let updated = sqlx::query(
        r#"
        UPDATE webhook_events
        SET processed = 1
        WHERE event_id = ?
        "#,
    )
    .bind(event_id)
    .execute(pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(StoreError::NotFound("event not found".to_string()));
    }

    Ok(())
}

pub async fn get_event(pool: &SqlitePool, event_id: &str) -> Result<LedgerEvent, StoreError> {
    let row: Option<EventRow> = sqlx::query_as(
        r#"
        SELECT event_id, event_type, payload, received_at, processed
        FROM webhook_events
        WHERE event_id = ?
        "#,
    )
    .bind(event_id)
    .fetch_optional(pool)
    .await?;

    let row = row.ok_or_else(|| StoreError::NotFound("event not found".to_string()))?;
    Ok(LedgerEvent {
        event_id: row.event_id,
        event_type: row.event_type,
        payload: row.payload,
        received_at: row.received_at,
        processed: row.processed != 0,
    })
}

#[derive(sqlx::FromRow)]
struct EventRow {
    event_id: String,
    event_type: String,
    payload: String,
    received_at: String,
    processed: i64,
}
