use serde::{Deserialize, Serialize};
use specta::Type;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct DeadLetterEntry {
    pub id: Uuid,
    pub original_job_id: String,
    pub job_type: String,
    pub payload: String,

    pub attempts: i64,
    pub last_error: Option<String>,
    pub moved_at: String,

    pub resolved: bool,
    pub requeued_job_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct ListDeadLettersResponse {
    pub entries: Vec<DeadLetterEntry>,
    pub next_before: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct RequeueResponse {
    pub entry_id: Uuid,
    pub new_job_id: String,
}
