#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub secret: Option<String>,
    pub validate_signature: bool,
    pub timestamp_tolerance_secs: i64,
    pub ip_allowlist: Vec<String>,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("HOOKRELAY_GATEWAY_SECRET")
            && !value.trim().is_empty()
        {
            config.secret = Some(value);
        }
        if let Ok(value) = std::env::var("HOOKRELAY_VALIDATE_SIGNATURE") {
            config.validate_signature = value != "false" && value != "0";
        }
        if let Ok(value) = std::env::var("HOOKRELAY_TIMESTAMP_TOLERANCE_SECS")
            && let Ok(parsed) = value.parse::<i64>()
        {
            config.timestamp_tolerance_secs = parsed.max(0);
        }
        if let Ok(value) = std::env::var("HOOKRELAY_IP_ALLOWLIST") {
            config.ip_allowlist = value
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_string)
                .collect();
        }

        config
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            secret: None,
            validate_signature: true,
            timestamp_tolerance_secs: 300,
            ip_allowlist: Vec::new(),
        }
    }
}
