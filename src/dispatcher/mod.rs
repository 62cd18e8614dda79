mod hooks;
pub mod store;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, error};
use uuid::Uuid;

pub use hooks::{HookError, TransformRegistry};
pub use store::{
    StoreError, insert_subscriber, list_active_by_event, list_attempts_for_job, list_subscribers,
    record_attempt,
};

use crate::queue::{self, QueueBackend};
use crate::types::DispatchResult;

pub const WEBHOOK_DELIVERY_JOB: &str = "webhook_delivery";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryJob {
    pub subscriber_id: Uuid,
    pub url: String,
    pub secret: String,
    pub event_type: String,
    pub data: serde_json::Value,
}

#[derive(Debug)]
pub enum DispatchError {
    Hook(HookError),
    Store(StoreError),
    Queue(queue::StoreError),
}

impl From<HookError> for DispatchError {
    fn from(err: HookError) -> Self {
        Self::Hook(err)
    }
}

impl From<StoreError> for DispatchError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<queue::StoreError> for DispatchError {
    fn from(err: queue::StoreError) -> Self {
        Self::Queue(err)
    }
}

pub async fn dispatch(
    pool: &SqlitePool,
    queue: &dyn QueueBackend,
    hooks: &TransformRegistry,
    max_attempts: i64,
    event_type: &str,
    data: serde_json::Value,
) -> Result<DispatchResult, DispatchError> {
    let payload = hooks.apply(event_type, data).map_err(|err| {
        error!(event_type, %err, "transform hook aborted dispatch");
        err
    })?;

    let subscribers = store::list_active_by_event(pool, event_type).await?;
    if subscribers.is_empty() {
        debug!(event_type, "no subscribers for event");
        return Ok(DispatchResult {
            jobs_created: 0,
            job_ids: Vec::new(),
        });
    }

    let mut job_ids = Vec::with_capacity(subscribers.len());
    for subscriber in subscribers {
        let job = DeliveryJob {
            subscriber_id: subscriber.id,
            url: subscriber.url,
            secret: subscriber.secret,
            event_type: event_type.to_string(),
            data: payload.clone(),
        };
        let job_payload = serde_json::to_value(&job).map_err(|err| {
            DispatchError::Queue(queue::StoreError::Parse(format!(
                "invalid delivery job payload: {err}"
            )))
        })?;

        let job_id = queue
            .enqueue(WEBHOOK_DELIVERY_JOB, &job_payload, max_attempts, 0)
            .await?;
        debug!(event_type, subscriber_id = %job.subscriber_id, job_id, "delivery job enqueued");
        job_ids.push(job_id);
    }

    Ok(DispatchResult {
        jobs_created: job_ids.len() as i64,
        job_ids,
    })
}
