pub mod job;
pub mod dead_letter;
pub mod ledger;
pub mod subscriber;
pub mod delivery;
pub mod gateway;

#[allow(unused_imports)]
pub use job::{CancelResponse, Job, JobStatus, QueueStats};
#[allow(unused_imports)]
pub use dead_letter::{DeadLetterEntry, ListDeadLettersResponse, RequeueResponse};
#[allow(unused_imports)]
pub use ledger::{IngestOutcome, LedgerEvent};
#[allow(unused_imports)]
pub use subscriber::{CreateSubscriberRequest, ListSubscribersResponse, Subscriber};
#[allow(unused_imports)]
pub use delivery::{DeliveryAttempt, DeliveryOutcome, DispatchResult, ListDeliveryAttemptsResponse};
#[allow(unused_imports)]
pub use gateway::{InboundOutcome, ValidationFailure, ValidationReport};
