use chrono::Utc;
use sqlx::{QueryBuilder, SqlitePool};
use uuid::Uuid;

use crate::queue::store::format_utc;
use crate::types::{DeadLetterEntry, Job, JobStatus};

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

#[derive(Debug, Clone)]
pub struct DlqCursor {
    pub moved_at: String,
    pub id: Uuid,
}

#[derive(Debug, Clone)]
pub struct ListEntriesParams {
    pub limit: i64,
    pub before: Option<DlqCursor>,
    pub resolved: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ListEntriesResult {
    pub entries: Vec<DeadLetterEntry>,
    pub next_before: Option<DlqCursor>,
}

pub(crate) async fn insert_entry(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    original_job_id: &str,
    job_type: &str,
    payload: &str,
    attempts: i64,
    last_error: Option<&str>,
    moved_at: &str,
) -> Result<Uuid, sqlx::Error> {
    let id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO dead_letter_queue (
            id,
            original_job_id,
            job_type,
            payload,
            attempts,
            last_error,
            moved_at,
            resolved,
            requeued_job_id
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, 0, NULL)
        "#,
    )
    .bind(id.to_string())
    .bind(original_job_id)
    .bind(job_type)
    .bind(payload)
    .bind(attempts)
    .bind(last_error)
    .bind(moved_at)
    .execute(&mut **tx)
    .await?;

    Ok(id)
}

pub async fn list_entries(
    pool: &SqlitePool,
    params: &ListEntriesParams,
) -> Result<ListEntriesResult, StoreError> {
    let mut query = QueryBuilder::new(
        "SELECT \
            id, \
            original_job_id, \
            job_type, \
            payload, \
            attempts, \
            last_error, \
            moved_at, \
            resolved, \
            requeued_job_id \
        FROM dead_letter_queue \
        WHERE 1 = 1",
    );

    if let Some(resolved) = params.resolved {
        query.push(" AND resolved = ");
        query.push_bind(i64::from(resolved));
    }

    if let Some(cursor) = &params.before {
        query.push(" AND (moved_at < ");
        query.push_bind(&cursor.moved_at);
        query.push(" OR (moved_at = ");
        query.push_bind(&cursor.moved_at);
        query.push(" AND id < ");
        query.push_bind(cursor.id.to_string());
        query.push("))");
    }

    query.push(" ORDER BY moved_at DESC, id DESC LIMIT ");
    query.push_bind(params.limit + 1);

    let rows: Vec<EntryRow> = query.build_query_as().fetch_all(pool).await?;

    let has_more = rows.len() > params.limit as usize;
    let take_count = if has_more {
        params.limit as usize
    } else {
        rows.len()
    };

    let mut entries = Vec::with_capacity(take_count);
    let mut last_cursor = None;

    for row in rows.into_iter().take(take_count) {
        let entry: DeadLetterEntry = row.try_into()?;
        last_cursor = Some(DlqCursor {
            moved_at: entry.moved_at.clone(),
            id: entry.id,
        });
        entries.push(entry);
    }

    let next_before = if has_more { last_cursor } else { None };

    Ok(ListEntriesResult {
        entries,
        next_before,
    })
}

pub async fn get_entry(pool: &SqlitePool, entry_id: Uuid) -> Result<DeadLetterEntry, StoreError> {
    let row: Option<EntryRow> = sqlx::query_as(
        r#"
        SELECT
            id,
            original_job_id,
            job_type,
            payload,
            attempts,
            last_error,
            moved_at,
            resolved,
            requeued_job_id
        FROM dead_letter_queue
        WHERE id = ?
        "#,
    )
    .bind(entry_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.ok_or_else(|| StoreError::NotFound("dead letter entry not found".to_string()))?
        .try_into()
}

/// The entry is kept for the audit trail and stamped with the new job id.
pub async fn requeue(pool: &SqlitePool, entry_id: Uuid) -> Result<Job, StoreError> {
    let now = Utc::now();
    let now_str = format_utc(now);

    let mut tx = pool.begin().await?;

    let row: Option<RequeueSourceRow> = sqlx::query_as(
        r#"
        SELECT original_job_id, job_type, payload
        FROM dead_letter_queue
        WHERE id = ?
        "#,
    )
    .bind(entry_id.to_string())
    .fetch_optional(&mut *tx)
    .await?;
    let row = row.ok_or_else(|| StoreError::NotFound("dead letter entry not found".to_string()))?;

    let max_attempts: i64 = sqlx::query_scalar("SELECT max_attempts FROM jobs WHERE id = ?")
        .bind(&row.original_job_id)
        .fetch_optional(&mut *tx)
        .await?
        .unwrap_or(3);

    let new_job_id = Uuid::new_v4().to_string();
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
    .bind(&new_job_id)
    .bind(&row.job_type)
    .bind(&row.payload)
    .bind(max_attempts)
    .bind(&now_str)
    .bind(&now_str)
    .bind(&now_str)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        UPDATE dead_letter_queue
        SET requeued_job_id = ?
        WHERE id = ?
        "#,
    )
    .bind(&new_job_id)
    .bind(entry_id.to_string())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Job {
        id: new_job_id,
        job_type: row.job_type,
        payload: row.payload,
        status: JobStatus::Pending,
        attempts: 0,
        max_attempts,
        scheduled_at: now_str.clone(),
        created_at: now_str.clone(),
        updated_at: now_str,
        claimed_by: None,
        result: None,
        error: None,
    })
}

pub async fn resolve(pool: &SqlitePool, entry_id: Uuid) -> Result<DeadLetterEntry, StoreError> {
    let updated = sqlx::query(
        r#"
        UPDATE dead_letter_queue
        SET resolved = 1
        WHERE id = ?
        "#,
    )
    .bind(entry_id.to_string())
    .execute(pool)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(StoreError::NotFound("dead letter entry not found".to_string()));
    }

    get_entry(pool, entry_id).await
}

#[derive(sqlx::FromRow)]
struct EntryRow {
    id: String,
    original_job_id: String,
    job_type: String,
    payload: String,
    attempts: i64,
    last_error: Option<String>,
    moved_at: String,
    resolved: i64,
    requeued_job_id: Option<String>,
}

#[derive(sqlx::FromRow)]
struct RequeueSourceRow {
    original_job_id: String,
    job_type: String,
    payload: String,
}

impl TryFrom<EntryRow> for DeadLetterEntry {
    type Error = StoreError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        Ok(DeadLetterEntry {
            id: Uuid::parse_str(&row.id)
                .map_err(|err| StoreError::Parse(format!("invalid entry id: {err}")))?,
            original_job_id: row.original_job_id,
            job_type: row.job_type,
            payload: row.payload,
            attempts: row.attempts,
            last_error: row.last_error,
            moved_at: row.moved_at,
            resolved: row.resolved != 0,
            requeued_job_id: row.requeued_job_id,
        })
    }
}
