#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub default_max_attempts: i64,
    pub backoff_base_secs: i64,
    pub backoff_cap_secs: i64,
    pub visibility_timeout_secs: i64,
    pub worker_count: usize,
    pub poll_interval_ms: u64,
    pub reaper_interval_secs: u64,
    pub delivery_timeout_secs: u64,
}

impl QueueConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("HOOKRELAY_MAX_ATTEMPTS")
            && let Ok(parsed) = value.parse::<i64>()
        {
            config.default_max_attempts = parsed.max(1);
        }
        if let Ok(value) = std::env::var("HOOKRELAY_BACKOFF_BASE_SECS")
            && let Ok(parsed) = value.parse::<i64>()
        {
            config.backoff_base_secs = parsed.max(1);
        }
        if let Ok(value) = std::env::var("HOOKRELAY_BACKOFF_CAP_SECS")
            && let Ok(parsed) = value.parse::<i64>()
        {
            config.backoff_cap_secs = parsed.max(1);
        }
        if let Ok(value) = std::env::var("HOOKRELAY_VISIBILITY_TIMEOUT_SECS")
            && let Ok(parsed) = value.parse::<i64>()
        {
            config.visibility_timeout_secs = parsed.max(1);
        }
        if let Ok(value) = std::env::var("HOOKRELAY_WORKER_COUNT")
            && let Ok(parsed) = value.parse::<usize>()
        {
            config.worker_count = parsed.max(1);
        }
        if let Ok(value) = std::env::var("HOOKRELAY_POLL_INTERVAL_MS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.poll_interval_ms = parsed.max(1);
        }
        if let Ok(value) = std::env::var("HOOKRELAY_REAPER_INTERVAL_SECS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.reaper_interval_secs = parsed.max(1);
        }
        if let Ok(value) = std::env::var("HOOKRELAY_DELIVERY_TIMEOUT_SECS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.delivery_timeout_secs = parsed.max(1);
        }

        config
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_max_attempts: 3,
            backoff_base_secs: 1,
            backoff_cap_secs: 1800,
            visibility_timeout_secs: 300,
            worker_count: 4,
            poll_interval_ms: 500,
            reaper_interval_secs: 30,
            delivery_timeout_secs: 30,
        }
    }
}
