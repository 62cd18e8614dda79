use serde::{Deserialize, Serialize};
use specta::Type;

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct Job {
    pub id: String,
    pub job_type: String,
    pub payload: String,

    pub status: JobStatus,
    pub attempts: i64,
    pub max_attempts: i64,

    pub scheduled_at: String,
    pub created_at: String,
    pub updated_at: String,

    pub claimed_by: Option<String>,
    pub result: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Type, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type)]
pub struct CancelResponse {
    pub cancelled: bool,
}
