use std::time::{Duration, Instant};

use anyhow::{Context as _, anyhow, bail};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use crate::dispatcher::{self, DeliveryJob};
use crate::gateway;
use crate::types::{DeliveryOutcome, Job};
use crate::worker::{JobContext, JobHandler};

pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
pub const TIMESTAMP_HEADER: &str = "X-Webhook-Timestamp";

/// Delivery is at-least-once; subscribers must tolerate duplicates after a
/// crash mid-request.
pub struct DeliveryHandler;

#[async_trait]
impl JobHandler for DeliveryHandler {
    async fn run(&self, ctx: &JobContext, job: &Job) -> anyhow::Result<serde_json::Value> {
        let delivery: DeliveryJob =
            serde_json::from_str(&job.payload).context("malformed delivery job payload")?;

        let body = serde_json::to_vec(&delivery.data).context("serialize delivery body")?;
        let signature = gateway::compute_signature(&delivery.secret, &body);
        let timestamp = Utc::now().timestamp().to_string();
        let attempt_number = job.attempts + 1;

        let started = Instant::now();
        let response = ctx
            .http
            .post(&delivery.url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, &signature)
            .header(TIMESTAMP_HEADER, &timestamp)
            .timeout(Duration::from_secs(ctx.config.delivery_timeout_secs))
            .body(body)
            .send()
            .await;
        let duration_ms = started.elapsed().as_millis() as i64;

        match response {
            Ok(response) => {
                let status = i64::from(response.status().as_u16());
                if response.status().is_success() {
                    dispatcher::record_attempt(
                        &ctx.pool,
                        delivery.subscriber_id,
                        &job.id,
                        attempt_number,
                        Some(status),
                        duration_ms,
                        DeliveryOutcome::Success,
                        None,
                    )
                    .await
                    .map_err(|err| anyhow!("record delivery attempt: {err:?}"))?;

                    Ok(json!({
                        "http_status": status,
                        "duration_ms": duration_ms,
                    }))
                } else {
                    let message = format!("subscriber returned {status}");
                    dispatcher::record_attempt(
                        &ctx.pool,
                        delivery.subscriber_id,
                        &job.id,
                        attempt_number,
                        Some(status),
                        duration_ms,
                        DeliveryOutcome::Failure,
                        Some(&message),
                    )
                    .await
                    .map_err(|err| anyhow!("record delivery attempt: {err:?}"))?;

                    bail!(message)
                }
            }
            Err(err) => {
                let message = format!("delivery request failed: {err}");
                dispatcher::record_attempt(
                    &ctx.pool,
                    delivery.subscriber_id,
                    &job.id,
                    attempt_number,
                    None,
                    duration_ms,
                    DeliveryOutcome::Failure,
                    Some(&message),
                )
                .await
                .map_err(|err| anyhow!("record delivery attempt: {err:?}"))?;

                bail!(message)
            }
        }
    }
}
