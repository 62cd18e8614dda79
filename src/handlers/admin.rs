use axum::{
    Json,
    extract::{Path, Query, State},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    dispatcher, dlq,
    dlq::{DlqCursor, ListEntriesParams},
    error::ApiError,
    queue,
    state::AppState,
    types::{
        CancelResponse, CreateSubscriberRequest, Job, ListDeadLettersResponse,
        ListDeliveryAttemptsResponse, ListSubscribersResponse, QueueStats, RequeueResponse,
        Subscriber,
    },
};

pub async fn queue_stats_handler(
    State(state): State<AppState>,
) -> Result<Json<QueueStats>, ApiError> {
    let stats = queue::stats(&state.pool).await.map_err(map_queue_error)?;
    Ok(Json(stats))
}

pub async fn get_job_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    let job = queue::get_job(&state.pool, &job_id)
        .await
        .map_err(map_queue_error)?
        .ok_or_else(|| ApiError::NotFound("job not found".to_string()))?;
    Ok(Json(job))
}

pub async fn cancel_job_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    let cancelled = queue::cancel(&state.pool, &job_id)
        .await
        .map_err(map_queue_error)?;
    Ok(Json(CancelResponse { cancelled }))
}

pub async fn list_job_attempts_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<ListDeliveryAttemptsResponse>, ApiError> {
    let attempts = dispatcher::list_attempts_for_job(&state.pool, &job_id)
        .await
        .map_err(map_dispatcher_error)?;
    Ok(Json(ListDeliveryAttemptsResponse { attempts }))
}

#[derive(Debug, Deserialize)]
pub struct ListDlqQuery {
    limit: Option<i64>,
    before: Option<String>,
    resolved: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CursorPayload {
    moved_at: String,
    id: String,
}

pub async fn list_dlq_handler(
    State(state): State<AppState>,
    Query(query): Query<ListDlqQuery>,
) -> Result<Json<ListDeadLettersResponse>, ApiError> {
    let limit = parse_limit(query.limit)?;
    let before = match query.before {
        Some(raw) => Some(decode_cursor(&raw)?),
        None => None,
    };

    let params = ListEntriesParams {
        limit,
        before,
        resolved: query.resolved,
    };

    let result = dlq::list_entries(&state.pool, &params)
        .await
        .map_err(map_dlq_error)?;
    let next_before = match result.next_before {
        Some(cursor) => Some(encode_cursor(&cursor)?),
        None => None,
    };

    Ok(Json(ListDeadLettersResponse {
        entries: result.entries,
        next_before,
    }))
}

pub async fn requeue_dlq_handler(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
) -> Result<Json<RequeueResponse>, ApiError> {
    let entry_id = parse_uuid("entry_id", &entry_id)?;
    let job = dlq::requeue(&state.pool, entry_id)
        .await
        .map_err(map_dlq_error)?;
    Ok(Json(RequeueResponse {
        entry_id,
        new_job_id: job.id,
    }))
}

pub async fn resolve_dlq_handler(
    State(state): State<AppState>,
    Path(entry_id): Path<String>,
) -> Result<Json<crate::types::DeadLetterEntry>, ApiError> {
    let entry_id = parse_uuid("entry_id", &entry_id)?;
    let entry = dlq::resolve(&state.pool, entry_id)
        .await
        .map_err(map_dlq_error)?;
    Ok(Json(entry))
}

pub async fn create_subscriber_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateSubscriberRequest>,
) -> Result<Json<Subscriber>, ApiError> {
    if req.url.trim().is_empty() {
        return Err(ApiError::BadRequest("url is required".to_string()));
    }
    if req.secret.trim().is_empty() {
        return Err(ApiError::BadRequest("secret is required".to_string()));
    }
    if req.event_types.is_empty() {
        return Err(ApiError::BadRequest(
            "event_types must be non-empty".to_string(),
        ));
    }

    let subscriber = dispatcher::insert_subscriber(&state.pool, &req)
        .await
        .map_err(map_dispatcher_error)?;
    Ok(Json(subscriber))
}

pub async fn list_subscribers_handler(
    State(state): State<AppState>,
) -> Result<Json<ListSubscribersResponse>, ApiError> {
    let subscribers = dispatcher::list_subscribers(&state.pool)
        .await
        .map_err(map_dispatcher_error)?;
    Ok(Json(ListSubscribersResponse { subscribers }))
}

fn parse_limit(limit: Option<i64>) -> Result<i64, ApiError> {
    let limit = limit.unwrap_or(50);
    if !(1..=200).contains(&limit) {
        return Err(ApiError::BadRequest(
            "limit must be between 1 and 200".to_string(),
        ));
    }
    Ok(limit)
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(value).map_err(|_| ApiError::BadRequest(format!("{field} must be a UUID")))
}

fn decode_cursor(raw: &str) -> Result<DlqCursor, ApiError> {
    let decoded = URL_SAFE_NO_PAD
        .decode(raw)
        .map_err(|_| ApiError::BadRequest("before must be a valid cursor".to_string()))?;
    let payload: CursorPayload = serde_json::from_slice(&decoded)
        .map_err(|_| ApiError::BadRequest("before must be a valid cursor".to_string()))?;
    DateTime::parse_from_rfc3339(&payload.moved_at)
        .map_err(|_| ApiError::BadRequest("before must be a valid cursor".to_string()))?;
    let id = Uuid::parse_str(&payload.id)
        .map_err(|_| ApiError::BadRequest("before must be a valid cursor".to_string()))?;
    Ok(DlqCursor {
        moved_at: payload.moved_at,
        id,
    })
}

fn encode_cursor(cursor: &DlqCursor) -> Result<String, ApiError> {
    let payload = CursorPayload {
        moved_at: cursor.moved_at.clone(),
        id: cursor.id.to_string(),
    };
    let encoded = serde_json::to_vec(&payload)
        .map_err(|_| ApiError::Internal("failed to encode cursor".to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(encoded))
}

fn map_queue_error(err: queue::StoreError) -> ApiError {
    match err {
        queue::StoreError::Db(db) => ApiError::Db(db),
        queue::StoreError::Conflict(message) => ApiError::Conflict(message),
        queue::StoreError::NotFound(message) => ApiError::NotFound(message),
        queue::StoreError::Parse(message) => ApiError::Internal(message),
    }
}

fn map_dlq_error(err: dlq::StoreError) -> ApiError {
    match err {
        dlq::StoreError::Db(db) => ApiError::Db(db),
        dlq::StoreError::Conflict(message) => ApiError::Conflict(message),
        dlq::StoreError::NotFound(message) => ApiError::NotFound(message),
        dlq::StoreError::Parse(message) => ApiError::Internal(message),
    }
}

fn map_dispatcher_error(err: dispatcher::StoreError) -> ApiError {
    match err {
        dispatcher::StoreError::Db(db) => ApiError::Db(db),
        dispatcher::StoreError::NotFound(message) => ApiError::NotFound(message),
        dispatcher::StoreError::Parse(message) => ApiError::Internal(message),
    }
}
