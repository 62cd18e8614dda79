use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::time::{Instant, sleep};

use crate::queue::store::{self, StoreError};
use crate::queue::QueueConfig;
use crate::types::Job;

#[async_trait]
pub trait QueueBackend: Send + Sync {
    async fn enqueue(
        &self,
        job_type: &str,
        payload: &serde_json::Value,
        max_attempts: i64,
        delay_secs: i64,
    ) -> Result<String, StoreError>;

    async fn get_job_status(&self, job_id: &str) -> Result<Option<Job>, StoreError>;

    async fn dequeue(&self, timeout_secs: u64) -> Result<Option<Job>, StoreError>;
}

#[derive(Clone)]
pub struct SqliteQueue {
    pool: SqlitePool,
    config: QueueConfig,
    consumer_id: String,
}

impl SqliteQueue {
    pub fn new(pool: SqlitePool, config: QueueConfig, consumer_id: impl Into<String>) -> Self {
        Self {
            pool,
            config,
            consumer_id: consumer_id.into(),
        }
    }
}

#[async_trait]
impl QueueBackend for SqliteQueue {
    async fn enqueue(
        &self,
        job_type: &str,
        payload: &serde_json::Value,
        max_attempts: i64,
        delay_secs: i64,
    ) -> Result<String, StoreError> {
        let job = store::enqueue(&self.pool, job_type, payload, max_attempts, delay_secs).await?;
        Ok(job.id)
    }

    async fn get_job_status(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        store::get_job(&self.pool, job_id).await
    }

    async fn dequeue(&self, timeout_secs: u64) -> Result<Option<Job>, StoreError> {
        let deadline = Instant::now() + Duration::from_secs(timeout_secs);

        loop {
            if let Some(job) = store::claim(&self.pool, &self.config, &self.consumer_id).await? {
                return Ok(Some(job));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
        }
    }
}
