use serde::{Deserialize, Serialize};
use specta::Type;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValidationFailure {
    IpNotAllowed,
    StaleTimestamp,
    MissingSignature,
    InvalidSignature,
    MissingSecret,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct ValidationReport {
    pub valid: bool,
    pub failures: Vec<ValidationFailure>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct InboundOutcome {
    pub accepted: bool,
    pub duplicate: bool,
    pub reason: Option<String>,
    pub event_id: Option<String>,
    pub job_id: Option<String>,
}
