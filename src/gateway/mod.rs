mod config;
pub mod ledger;
pub mod security;

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, warn};
use uuid::Uuid;

pub use config::GatewayConfig;
pub use ledger::{get_event, mark_processed, record_if_new};
pub use security::{
    compute_signature, validate_all, validate_ip_allowlist, validate_signature, validate_timestamp,
};

use crate::queue::{self, QueueConfig};
use crate::types::{InboundOutcome, ValidationFailure};

pub const INBOUND_EVENT_JOB: &str = "inbound_event";

#[derive(Debug)]
pub enum GatewayError {
    Ledger(ledger::StoreError),
    Queue(queue::StoreError),
}

impl From<ledger::StoreError> for GatewayError {
    fn from(err: ledger::StoreError) -> Self {
        Self::Ledger(err)
    }
}

impl From<queue::StoreError> for GatewayError {
    fn from(err: queue::StoreError) -> Self {
        Self::Queue(err)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEventJob {
    pub event_id: String,
    pub event_type: String,
    pub data: serde_json::Value,
}

pub async fn process_inbound(
    pool: &SqlitePool,
    gateway: &GatewayConfig,
    queue_config: &QueueConfig,
    raw_body: &[u8],
    signature_header: Option<&str>,
    client_ip: IpAddr,
) -> Result<InboundOutcome, GatewayError> {
    if !security::validate_ip_allowlist(client_ip, &gateway.ip_allowlist) {
        warn!(%client_ip, "inbound webhook from disallowed ip");
        return Ok(rejected("ip_not_allowed"));
    }

    let Ok(body) = serde_json::from_slice::<serde_json::Value>(raw_body) else {
        return Ok(rejected("invalid_json"));
    };

    let Some(event_type) = string_field(&body, &["event_type", "type"]) else {
        return Ok(rejected("missing_event_type"));
    };
    let event_id = string_field(&body, &["event_id", "id"])
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let timestamp = body.get("timestamp").and_then(serde_json::Value::as_i64);
    let data = body.get("data").cloned().unwrap_or_else(|| body.clone());

    let report = security::validate_all(gateway, client_ip, timestamp, signature_header, raw_body);
    if !report.valid {
        let reason = report
            .failures
            .first()
            .map_or("rejected", failure_reason);
        warn!(%client_ip, event_type, reason, "inbound webhook rejected");
        return Ok(rejected(reason));
    }

    let payload = String::from_utf8_lossy(raw_body);
    let outcome = ledger::record_if_new(pool, &event_id, &event_type, &payload).await?;

    if !outcome.is_new {
        debug!(event_id, "duplicate inbound event ignored");
        return Ok(InboundOutcome {
            accepted: true,
            duplicate: true,
            reason: None,
            event_id: Some(event_id),
            job_id: None,
        });
    }

    let job_payload = serde_json::to_value(InboundEventJob {
        event_id: event_id.clone(),
        event_type: event_type.clone(),
        data,
    })
    .map_err(|err| {
        GatewayError::Queue(queue::StoreError::Parse(format!(
            "invalid inbound job payload: {err}"
        )))
    })?;

    let job = queue::enqueue(
        pool,
        INBOUND_EVENT_JOB,
        &job_payload,
        queue_config.default_max_attempts,
        0,
    )
    .await?;

    debug!(event_id, event_type, job_id = %job.id, "inbound event accepted");

    Ok(InboundOutcome {
        accepted: true,
        duplicate: false,
        reason: None,
        event_id: Some(event_id),
        job_id: Some(job.id),
    })
}

fn rejected(reason: &str) -> InboundOutcome {
    InboundOutcome {
        accepted: false,
        duplicate: false,
        reason: Some(reason.to_string()),
        event_id: None,
        job_id: None,
    }
}

fn failure_reason(failure: &ValidationFailure) -> &'static str {
    match failure {
        ValidationFailure::IpNotAllowed => "ip_not_allowed",
        ValidationFailure::StaleTimestamp => "stale_timestamp",
        ValidationFailure::MissingSignature => "missing_signature",
        ValidationFailure::InvalidSignature => "invalid_signature",
        ValidationFailure::MissingSecret => "missing_secret",
    }
}

fn string_field(body: &serde_json::Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        body.get(key)
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
    })
}
