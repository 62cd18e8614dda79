mod backend;
mod config;
pub mod store;

pub use backend::{QueueBackend, SqliteQueue};
pub use config::QueueConfig;
pub use store::{FailOutcome, StoreError, cancel, claim, complete, enqueue, fail, get_job, reap_stuck, stats};
