use sqlx::SqlitePool;

use crate::gateway::GatewayConfig;
use crate::queue::QueueConfig;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub gateway: GatewayConfig,
    pub queue: QueueConfig,
}
