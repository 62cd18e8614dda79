use anyhow::{Context as _, anyhow};
use async_trait::async_trait;
use serde_json::json;

use crate::dispatcher;
use crate::gateway::{self, InboundEventJob};
use crate::types::Job;
use crate::worker::{JobContext, JobHandler};

pub struct InboundEventHandler;

#[async_trait]
impl JobHandler for InboundEventHandler {
    async fn run(&self, ctx: &JobContext, job: &Job) -> anyhow::Result<serde_json::Value> {
        let event: InboundEventJob =
            serde_json::from_str(&job.payload).context("malformed inbound event payload")?;

        let result = dispatcher::dispatch(
            &ctx.pool,
            ctx.queue.as_ref(),
            &ctx.hooks,
            ctx.config.default_max_attempts,
            &event.event_type,
            event.data,
        )
        .await
        .map_err(|err| anyhow!("dispatch failed: {err:?}"))?;

        gateway::mark_processed(&ctx.pool, &event.event_id)
            .await
            .map_err(|err| anyhow!("mark event processed: {err:?}"))?;

        Ok(json!({
            "jobs_created": result.jobs_created,
            "job_ids": result.job_ids,
        }))
    }
}
