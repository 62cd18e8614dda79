mod delivery;
mod ingest;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

pub use delivery::DeliveryHandler;
pub use ingest::InboundEventHandler;

use crate::dispatcher::TransformRegistry;
use crate::queue::{self, FailOutcome, QueueConfig, SqliteQueue};
use crate::types::Job;

#[derive(Clone)]
pub struct JobContext {
    pub pool: SqlitePool,
    pub http: reqwest::Client,
    pub queue: Arc<SqliteQueue>,
    pub hooks: Arc<TransformRegistry>,
    pub config: QueueConfig,
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, ctx: &JobContext, job: &Job) -> anyhow::Result<serde_json::Value>;
}

#[derive(Default)]
pub struct JobRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(job_type.into(), handler);
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }
}

pub fn default_registry() -> JobRegistry {
    let mut registry = JobRegistry::new();
    registry.register(
        crate::gateway::INBOUND_EVENT_JOB,
        Arc::new(InboundEventHandler),
    );
    registry.register(
        crate::dispatcher::WEBHOOK_DELIVERY_JOB,
        Arc::new(DeliveryHandler),
    );
    registry
}

pub struct Worker {
    ctx: JobContext,
    registry: Arc<JobRegistry>,
    worker_id: String,
}

impl Worker {
    pub fn new(ctx: JobContext, registry: Arc<JobRegistry>, worker_id: impl Into<String>) -> Self {
        Self {
            ctx,
            registry,
            worker_id: worker_id.into(),
        }
    }

    pub async fn run(&self) {
        let idle = Duration::from_millis(self.ctx.config.poll_interval_ms);

        loop {
            match self.run_next().await {
                Ok(true) => {}
                Ok(false) => sleep(idle).await,
                Err(err) => {
                    error!(worker = %self.worker_id, error = ?err, "worker iteration failed");
                    sleep(idle).await;
                }
            }
        }
    }

    async fn run_next(&self) -> Result<bool, queue::StoreError> {
        let Some(job) = queue::claim(&self.ctx.pool, &self.ctx.config, &self.worker_id).await?
        else {
            return Ok(false);
        };

        debug!(worker = %self.worker_id, job_id = %job.id, job_type = %job.job_type, "job claimed");

        let result = match self.registry.get(&job.job_type) {
            Some(handler) => handler.run(&self.ctx, &job).await,
            None => Err(anyhow::anyhow!("unknown job type: {}", job.job_type)),
        };

        match result {
            Ok(value) => {
                queue::complete(&self.ctx.pool, &job.id, &value).await?;
                debug!(job_id = %job.id, "job completed");
            }
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "job handler failed");
                match queue::fail(&self.ctx.pool, &self.ctx.config, &job.id, &err.to_string())
                    .await?
                {
                    FailOutcome::Retried { job } => {
                        debug!(job_id = %job.id, scheduled_at = %job.scheduled_at, "job scheduled for retry");
                    }
                    FailOutcome::DeadLettered { entry_id } => {
                        warn!(job_id = %job.id, %entry_id, "job exhausted retries, dead-lettered");
                    }
                }
            }
        }

        Ok(true)
    }
}

pub fn spawn_workers(
    ctx: &JobContext,
    registry: Arc<JobRegistry>,
    count: usize,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::with_capacity(count);
    for i in 1..=count {
        let name = format!("worker-{i}");
        info!(worker = %name, "starting worker");
        let worker = Worker::new(ctx.clone(), registry.clone(), name);
        handles.push(tokio::spawn(async move { worker.run().await }));
    }
    handles
}

pub fn spawn_reaper(pool: SqlitePool, config: QueueConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = Duration::from_secs(config.reaper_interval_secs);
        loop {
            sleep(interval).await;
            match queue::reap_stuck(&pool, &config).await {
                Ok(reaped) if !reaped.is_empty() => {
                    warn!(count = reaped.len(), "reaped stuck jobs");
                }
                Ok(_) => {}
                Err(err) => error!(error = ?err, "reaper sweep failed"),
            }
        }
    })
}
