use serde::{Deserialize, Serialize};
use specta::Type;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct DeliveryAttempt {
    pub id: Uuid,
    pub subscriber_id: Uuid,
    pub job_id: String,
    pub attempt_number: i64,

    pub http_status: Option<i64>,
    pub duration_ms: i64,
    pub outcome: DeliveryOutcome,
    pub error_message: Option<String>,

    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct ListDeliveryAttemptsResponse {
    pub attempts: Vec<DeliveryAttempt>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct DispatchResult {
    pub jobs_created: i64,
    pub job_ids: Vec<String>,
}
