use chrono::{Duration, SecondsFormat, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::dlq;
use crate::queue::QueueConfig;
use crate::types::{Job, JobStatus, QueueStats};

#[derive(Debug)]
pub enum StoreError {
    Db(sqlx::Error),
    Conflict(String),
    NotFound(String),
    Parse(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err)
    }
}

#[derive(Debug)]
pub enum FailOutcome {
    Retried { job: Job },
    DeadLettered { entry_id: Uuid },
}

pub async fn enqueue(
    pool: &SqlitePool,
    job_type: &str,
    payload: &serde_json::Value,
    max_attempts: i64,
    delay_secs: i64,
) -> Result<Job, StoreError> {
    let now = Utc::now();
    let now_str = format_utc(now);
    let scheduled_at = format_utc(now + Duration::seconds(delay_secs.max(0)));
    let id = Uuid::new_v4().to_string();
    let payload = serde_json::to_string(payload)
        .map_err(|err| StoreError::Parse(format!("invalid job payload JSON: {err}")))?;

    sqlx::query(
        r#"
        INSERT INTO jobs (
            id,
            job_type,
            payload,
            status,
            attempts,
            max_attempts,
            scheduled_at,
            created_at,
            updated_at,
            claimed_by,
            result,
            error
        )
        VALUES (?, ?, ?, 'pending', 0, ?, ?, ?, ?, NULL, NULL, NULL)
        "#,
    )
    .bind(&id)
    .bind(job_type)
    .bind(&payload)
    .bind(max_attempts.max(1))
    .bind(&scheduled_at)
    .bind(&now_str)
    .bind(&now_str)
    .execute(pool)
    .await?;

    Ok(Job {
        id,
        job_type: job_type.to_string(),
        payload,
        status: JobStatus::Pending,
        attempts: 0,
        max_attempts: max_attempts.max(1),
        scheduled_at,
        created_at: now_str.clone(),
        updated_at: now_str,
        claimed_by: None,
        result: None,
        error: None,
    })
}

pub async fn claim(
    pool: &SqlitePool,
    config: &QueueConfig,
    worker_id: &str,
) -> Result<Option<Job>, StoreError> {
    let now = Utc::now();
    let now_str = format_utc(now);

    let mut tx = pool.begin().await?;

    reap_in_tx(&mut tx, config, now).await?;

    let claimed_id: Option<String> = sqlx::query_scalar(
        r#"
        WITH eligible AS (
            SELECT id
            FROM jobs
            WHERE status = 'pending'
              AND scheduled_at <= ?
            ORDER BY scheduled_at ASC, created_at ASC
            LIMIT 1
        )
        UPDATE jobs
        SET status = 'running',
            claimed_by = ?,
            updated_at = ?
        WHERE id IN (SELECT id FROM eligible)
          AND status = 'pending'
        RETURNING id
        "#,
    )
    .bind(&now_str)
    .bind(worker_id)
    .bind(&now_str)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(claimed_id) = claimed_id else {
        tx.commit().await?;
        return Ok(None);
    };

    let row: JobRow = sqlx::query_as(JOB_COLUMNS_QUERY)
        .bind(&claimed_id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(Some(row.try_into()?))
}

pub async fn complete(
    pool: &SqlitePool,
    job_id: &str,
    result: &serde_json::Value,
) -> Result<Job, StoreError> {
    let now_str = format_utc(Utc::now());
    let result = serde_json::to_string(result)
        .map_err(|err| StoreError::Parse(format!("invalid job result JSON: {err}")))?;

    let mut tx = pool.begin().await?;

    let updated = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'completed',
            result = ?,
            claimed_by = NULL,
            updated_at = ?
        WHERE id = ?
          AND status = 'running'
        "#,
    )
    .bind(&result)
    .bind(&now_str)
    .bind(job_id)
    .execute(&mut *tx)
    .await?;

    if updated.rows_affected() == 0 {
        let exists: Option<String> = sqlx::query_scalar("SELECT status FROM jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await?;
        return match exists {
            Some(status) => Err(StoreError::Conflict(format!(
                "job is not running (status: {status})"
            ))),
            None => Err(StoreError::NotFound("job not found".to_string())),
        };
    }

    let row: JobRow = sqlx::query_as(JOB_COLUMNS_QUERY)
        .bind(job_id)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    Ok(row.try_into()?)
}

pub async fn fail(
    pool: &SqlitePool,
    config: &QueueConfig,
    job_id: &str,
    error: &str,
) -> Result<FailOutcome, StoreError> {
    let now = Utc::now();
    let now_str = format_utc(now);

    let mut tx = pool.begin().await?;

    let row = sqlx::query_as::<_, FailRow>(
        r#"
        SELECT job_type, payload, status, attempts, max_attempts
        FROM jobs
        WHERE id = ?
        "#,
    )
    .bind(job_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| StoreError::NotFound("job not found".to_string()))?;

    if row.status != "running" {
        return Err(StoreError::Conflict(format!(
            "job is not running (status: {})",
            row.status
        )));
    }

    let attempt_no = row.attempts + 1;

    if attempt_no < row.max_attempts {
        let scheduled_at = format_utc(now + Duration::seconds(backoff_delay_secs(config, attempt_no)));

        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending',
                attempts = ?,
                scheduled_at = ?,
                claimed_by = NULL,
                error = ?,
                updated_at = ?
            WHERE id = ?
              AND status = 'running'
            "#,
        )
        .bind(attempt_no)
        .bind(&scheduled_at)
        .bind(error)
        .bind(&now_str)
        .bind(job_id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::Conflict("job is not running".to_string()));
        }

        let job_row: JobRow = sqlx::query_as(JOB_COLUMNS_QUERY)
            .bind(job_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        return Ok(FailOutcome::Retried {
            job: job_row.try_into()?,
        });
    }

    let updated = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'failed',
            attempts = ?,
            claimed_by = NULL,
            error = ?,
            updated_at = ?
        WHERE id = ?
          AND status = 'running'
        "#,
    )
    .bind(attempt_no)
    .bind(error)
    .bind(&now_str)
    .bind(job_id)
    .execute(&mut *tx)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(StoreError::Conflict("job is not running".to_string()));
    }

    let entry_id = dlq::store::insert_entry(
        &mut tx,
        job_id,
        &row.job_type,
        &row.payload,
        attempt_no,
        Some(error),
        &now_str,
    )
    .await?;

    tx.commit().await?;

    Ok(FailOutcome::DeadLettered { entry_id })
}

pub async fn cancel(pool: &SqlitePool, job_id: &str) -> Result<bool, StoreError> {
    let now_str = format_utc(Utc::now());

    let exists: Option<String> = sqlx::query_scalar("SELECT status FROM jobs WHERE id = ?")
        .bind(job_id)
        .fetch_optional(pool)
        .await?;
    if exists.is_none() {
        return Err(StoreError::NotFound("job not found".to_string()));
    }

    let updated = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'cancelled',
            updated_at = ?
        WHERE id = ?
          AND status = 'pending'
        "#,
    )
    .bind(&now_str)
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(updated.rows_affected() > 0)
}

pub async fn get_job(pool: &SqlitePool, job_id: &str) -> Result<Option<Job>, StoreError> {
    let row: Option<JobRow> = sqlx::query_as(JOB_COLUMNS_QUERY)
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    row.map(JobRow::try_into).transpose()
}

pub async fn stats(pool: &SqlitePool) -> Result<QueueStats, StoreError> {
    let rows: Vec<StatusCountRow> = sqlx::query_as(
        r#"
        SELECT status, COUNT(*) AS count
        FROM jobs
        GROUP BY status
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut stats = QueueStats::default();
    for row in rows {
        match row.status.as_str() {
            "pending" => stats.pending = row.count,
            "running" => stats.running = row.count,
            "completed" => stats.completed = row.count,
            "failed" => stats.failed = row.count,
            "cancelled" => stats.cancelled = row.count,
            other => return Err(StoreError::Parse(format!("unknown status: {other}"))),
        }
    }

    Ok(stats)
}

/// A reaped attempt counts as a failure; a job at its limit is dead-lettered.
pub async fn reap_stuck(pool: &SqlitePool, config: &QueueConfig) -> Result<Vec<String>, StoreError> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;
    let reaped = reap_in_tx(&mut tx, config, now).await?;
    tx.commit().await?;
    Ok(reaped)
}

async fn reap_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    config: &QueueConfig,
    now: chrono::DateTime<Utc>,
) -> Result<Vec<String>, StoreError> {
    let now_str = format_utc(now);
    let cutoff = format_utc(now - Duration::seconds(config.visibility_timeout_secs));

    let mut reaped: Vec<String> = sqlx::query_scalar(
        r#"
        UPDATE jobs
        SET status = 'pending',
            attempts = attempts + 1,
            claimed_by = NULL,
            error = 'visibility timeout exceeded',
            updated_at = ?
        WHERE status = 'running'
          AND updated_at <= ?
          AND attempts + 1 < max_attempts
        RETURNING id
        "#,
    )
    .bind(&now_str)
    .bind(&cutoff)
    .fetch_all(&mut **tx)
    .await?;

    let exhausted: Vec<ReapedRow> = sqlx::query_as(
        r#"
        UPDATE jobs
        SET status = 'failed',
            attempts = attempts + 1,
            claimed_by = NULL,
            error = 'visibility timeout exceeded',
            updated_at = ?
        WHERE status = 'running'
          AND updated_at <= ?
        RETURNING id, job_type, payload, attempts
        "#,
    )
    .bind(&now_str)
    .bind(&cutoff)
    .fetch_all(&mut **tx)
    .await?;

    for row in exhausted {
        dlq::store::insert_entry(
            tx,
            &row.id,
            &row.job_type,
            &row.payload,
            row.attempts,
            Some("visibility timeout exceeded"),
            &now_str,
        )
        .await?;
        reaped.push(row.id);
    }

    Ok(reaped)
}

pub(crate) fn backoff_delay_secs(config: &QueueConfig, attempt_no: i64) -> i64 {
    let exponent = attempt_no.clamp(0, 31) as u32;
    let delay = config
        .backoff_base_secs
        .saturating_mul(1_i64 << exponent.min(31));
    delay.min(config.backoff_cap_secs)
}

const JOB_COLUMNS_QUERY: &str = "SELECT \
    id, \
    job_type, \
    payload, \
    status, \
    attempts, \
    max_attempts, \
    scheduled_at, \
    created_at, \
    updated_at, \
    claimed_by, \
    result, \
    error \
FROM jobs \
WHERE id = ?";

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    job_type: String,
    payload: String,
    status: String,
    attempts: i64,
    max_attempts: i64,
    scheduled_at: String,
    created_at: String,
    updated_at: String,
    claimed_by: Option<String>,
    result: Option<String>,
    error: Option<String>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: row.id,
            job_type: row.job_type,
            payload: row.payload,
            status: parse_status(&row.status)?,
            attempts: row.attempts,
            max_attempts: row.max_attempts,
            scheduled_at: row.scheduled_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            claimed_by: row.claimed_by,
            result: row.result,
            error: row.error,
        })
    }
}

#[derive(sqlx::FromRow)]
struct FailRow {
    job_type: String,
    payload: String,
    status: String,
    attempts: i64,
    max_attempts: i64,
}

#[derive(sqlx::FromRow)]
struct ReapedRow {
    id: String,
    job_type: String,
    payload: String,
    attempts: i64,
}

#[derive(sqlx::FromRow)]
struct StatusCountRow {
    status: String,
    count: i64,
}

fn parse_status(status: &str) -> Result<JobStatus, StoreError> {
    match status {
        "pending" => Ok(JobStatus::Pending),
        "running" => Ok(JobStatus::Running),
        "completed" => Ok(JobStatus::Completed),
        "failed" => Ok(JobStatus::Failed),
        "cancelled" => Ok(JobStatus::Cancelled),
        other => Err(StoreError::Parse(format!("unknown status: {other}"))),
    }
}

pub(crate) fn format_utc(dt: chrono::DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}
