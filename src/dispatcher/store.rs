use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::queue::store::format_utc;
use crate::types::{
    CreateSubscriberRequest, DeliveryAttempt, DeliveryOutcome, Subscriber,
};

#[derive(Debug)]
pub enum StoreError {
    Db(sqlx::Error),
    NotFound(String),
    Parse(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err)
    }
}

pub async fn insert_subscriber(
    pool: &SqlitePool,
    req: &CreateSubscriberRequest,
) -> Result<Subscriber, StoreError> {
    let id = Uuid::new_v4();
    let created_at = format_utc(Utc::now());
    let active = req.active.unwrap_or(true);
    let event_types = serde_json::to_string(&req.event_types)
        .map_err(|err| StoreError::Parse(format!("invalid event_types JSON: {err}")))?;

    sqlx::query(
        r#"
        INSERT INTO webhook_subscribers (
            id,
            url,
            secret,
            event_types,
            active,
            created_at
        )
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(&req.url)
    .bind(&req.secret)
    .bind(&event_types)
    .bind(i64::from(active))
    .bind(&created_at)
    .execute(pool)
    .await?;

    Ok(Subscriber {
        id,
        url: req.url.clone(),
        secret: req.secret.clone(),
        event_types: req.event_types.clone(),
        active,
        created_at,
    })
}

pub async fn list_subscribers(pool: &SqlitePool) -> Result<Vec<Subscriber>, StoreError> {
    let rows: Vec<SubscriberRow> = sqlx::query_as(
        r#"
        SELECT id, url, secret, event_types, active, created_at
        FROM webhook_subscribers
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(SubscriberRow::try_into).collect()
}

pub async fn list_active_by_event(
    pool: &SqlitePool,
    event_type: &str,
) -> Result<Vec<Subscriber>, StoreError> {
    let rows: Vec<SubscriberRow> = sqlx::query_as(
        r#"
        SELECT id, url, secret, event_types, active, created_at
        FROM webhook_subscribers
        WHERE active = 1
        ORDER BY created_at ASC, id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut subscribers = Vec::new();
    for row in rows {
        let subscriber: Subscriber = row.try_into()?;
        if subscriber
            .event_types
            .iter()
            .any(|t| t == "*" || t == event_type)
        {
            subscribers.push(subscriber);
        }
    }

    Ok(subscribers)
}

#[allow(clippy::too_many_arguments)]
pub async fn record_attempt(
    pool: &SqlitePool,
    subscriber_id: Uuid,
    job_id: &str,
    attempt_number: i64,
    http_status: Option<i64>,
    duration_ms: i64,
    outcome: DeliveryOutcome,
    error_message: Option<&str>,
) -> Result<DeliveryAttempt, StoreError> {
    let id = Uuid::new_v4();
    let created_at = format_utc(Utc::now());

    sqlx::query(
        r#"
        INSERT INTO webhook_delivery_log (
            id,
            subscriber_id,
            job_id,
            attempt_number,
            http_status,
            duration_ms,
            outcome,
            error_message,
            created_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(subscriber_id.to_string())
    .bind(job_id)
    .bind(attempt_number)
    .bind(http_status)
    .bind(duration_ms)
    .bind(outcome_to_str(outcome))
    .bind(error_message)
    .bind(&created_at)
    .execute(pool)
    .await?;

    Ok(DeliveryAttempt {
        id,
        subscriber_id,
        job_id: job_id.to_string(),
        attempt_number,
        http_status,
        duration_ms,
        outcome,
        error_message: error_message.map(str::to_string),
        created_at,
    })
}

pub async fn list_attempts_for_job(
    pool: &SqlitePool,
    job_id: &str,
) -> Result<Vec<DeliveryAttempt>, StoreError> {
    let rows: Vec<AttemptRow> = sqlx::query_as(
        r#"
        SELECT
            id,
            subscriber_id,
            job_id,
            attempt_number,
            http_status,
            duration_ms,
            outcome,
            error_message,
            created_at
        FROM webhook_delivery_log
        WHERE job_id = ?
        ORDER BY attempt_number ASC, created_at ASC
        "#,
    )
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(AttemptRow::try_into).collect()
}

#[derive(sqlx::FromRow)]
struct SubscriberRow {
    id: String,
    url: String,
    secret: String,
    event_types: String,
    active: i64,
    created_at: String,
}

impl TryFrom<SubscriberRow> for Subscriber {
    type Error = StoreError;

    fn try_from(row: SubscriberRow) -> Result<Self, Self::Error> {
        let event_types: Vec<String> = serde_json::from_str(&row.event_types)
            .map_err(|err| StoreError::Parse(format!("invalid event_types JSON: {err}")))?;

        Ok(Subscriber {
            id: Uuid::parse_str(&row.id)
                .map_err(|err| StoreError::Parse(format!("invalid subscriber id: {err}")))?,
            url: row.url,
            secret: row.secret,
            event_types,
            active: row.active != 0,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AttemptRow {
    id: String,
    subscriber_id: String,
    job_id: String,
    attempt_number: i64,
    http_status: Option<i64>,
    duration_ms: i64,
    outcome: String,
    error_message: Option<String>,
    created_at: String,
}

impl TryFrom<AttemptRow> for DeliveryAttempt {
    type Error = StoreError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        Ok(DeliveryAttempt {
            id: Uuid::parse_str(&row.id)
                .map_err(|err| StoreError::Parse(format!("invalid attempt id: {err}")))?,
            subscriber_id: Uuid::parse_str(&row.subscriber_id)
                .map_err(|err| StoreError::Parse(format!("invalid subscriber id: {err}")))?,
            job_id: row.job_id,
            attempt_number: row.attempt_number,
            http_status: row.http_status,
            duration_ms: row.duration_ms,
            outcome: parse_outcome(&row.outcome)?,
            error_message: row.error_message,
            created_at: row.created_at,
        })
    }
}

fn outcome_to_str(outcome: DeliveryOutcome) -> &'static str {
    match outcome {
        DeliveryOutcome::Success => "success",
        DeliveryOutcome::Failure => "failure",
    }
}

fn parse_outcome(outcome: &str) -> Result<DeliveryOutcome, StoreError> {
    match outcome {
        "success" => Ok(DeliveryOutcome::Success),
        "failure" => Ok(DeliveryOutcome::Failure),
        other => Err(StoreError::Parse(format!("unknown outcome: {other}"))),
    }
}
