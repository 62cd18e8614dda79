use serde::{Deserialize, Serialize};
use specta::Type;

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct LedgerEvent {
    pub event_id: String,
    pub event_type: String,
    pub payload: String,
    pub received_at: String,
    pub processed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct IngestOutcome {
    pub is_new: bool,
    pub event: LedgerEvent,
}
