//! Per-endpoint operational metadata published by `/service/status`.
//!
//! Declared next to the route, in the same short string forms operators write in
//! gateway config: payload sizes `512KB` / `2MB` / `1GB`, timeouts `250ms` / `30s`,
//! rate limits `<policy>:<count>:<n><s|m|h>`.

use serde::Serialize;

pub const DEFAULT_MAX_PAYLOAD_SIZE: &str = "1MB";
pub const DEFAULT_TIMEOUT: &str = "30s";
pub const DEFAULT_ACCEPTS: &str = "application/json";

pub const RATE_LIMIT_POLICIES: [&str; 3] = ["max_globally", "max_per_session", "max_per_ip"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    #[error("the payload size {0} is not valid")]
    PayloadSize(String),
    #[error("the timeout {0} is not valid")]
    Timeout(String),
    #[error("the rate limit policy {0} is not valid")]
    RateLimit(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitPolicy {
    pub policy: String,
    pub count: u32,
    /// Window length in seconds.
    pub duration: u64,
}

impl RateLimitPolicy {
    pub fn parse(raw: &str) -> Result<Self, MetadataError> {
        let invalid = || MetadataError::RateLimit(raw.to_string());

        let mut parts = raw.split(':');
        let (Some(policy), Some(count), Some(window), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        if !RATE_LIMIT_POLICIES.contains(&policy) {
            return Err(invalid());
        }
        let count: u32 = count.parse().map_err(|_| invalid())?;

        let (value, unit) = window.split_at(window.len().saturating_sub(1));
        let coefficient = match unit {
            "s" => 1,
            "m" => 60,
            "h" => 3600,
            _ => return Err(invalid()),
        };
        let value: u64 = value.parse().map_err(|_| invalid())?;

        Ok(Self {
            policy: policy.to_string(),
            count,
            duration: value * coefficient,
        })
    }
}

/// Size in bytes.
pub fn parse_payload_size(raw: &str) -> Result<u64, MetadataError> {
    let invalid = || MetadataError::PayloadSize(raw.to_string());
    if raw.len() <= 2 || !raw.is_char_boundary(raw.len() - 2) {
        return Err(invalid());
    }

    let (value, unit) = raw.split_at(raw.len() - 2);
    let unit: u64 = match unit {
        "KB" => 1024,
        "MB" => 1024 * 1024,
        "GB" => 1024 * 1024 * 1024,
        _ => return Err(invalid()),
    };
    let value: u64 = value.parse().map_err(|_| invalid())?;
    Ok(value * unit)
}

/// Timeout in milliseconds.
pub fn parse_timeout(raw: &str) -> Result<u64, MetadataError> {
    let invalid = || MetadataError::Timeout(raw.to_string());

    let (value, coefficient) = if let Some(v) = raw.strip_suffix("ms") {
        (v, 1)
    } else if let Some(v) = raw.strip_suffix('s') {
        (v, 1000)
    } else {
        return Err(invalid());
    };

    if value.is_empty() {
        return Err(invalid());
    }
    let value: u64 = value.parse().map_err(|_| invalid())?;
    Ok(value * coefficient)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointMetadata {
    pub exposed_through_gateway: bool,
    pub max_payload_size: u64,
    pub timeout_ms: u64,
    pub maintenance_mode: String,
    pub rate_limiting_policy: Vec<RateLimitPolicy>,
    pub accepts: Vec<String>,
}

impl Default for EndpointMetadata {
    fn default() -> Self {
        Self {
            exposed_through_gateway: true,
            max_payload_size: 1024 * 1024,
            timeout_ms: 30_000,
            maintenance_mode: String::new(),
            rate_limiting_policy: Vec::new(),
            accepts: vec![DEFAULT_ACCEPTS.to_string()],
        }
    }
}

impl EndpointMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reachable only from inside the fleet (the gateway does not route to it).
    pub fn internal(mut self) -> Self {
        self.exposed_through_gateway = false;
        self
    }

    pub fn max_payload_size(mut self, raw: &str) -> Result<Self, MetadataError> {
        self.max_payload_size = parse_payload_size(raw)?;
        Ok(self)
    }

    pub fn timeout(mut self, raw: &str) -> Result<Self, MetadataError> {
        self.timeout_ms = parse_timeout(raw)?;
        Ok(self)
    }

    pub fn rate_limit(mut self, raw: &str) -> Result<Self, MetadataError> {
        self.rate_limiting_policy.push(RateLimitPolicy::parse(raw)?);
        Ok(self)
    }

    pub fn maintenance_mode(mut self, mode: impl Into<String>) -> Self {
        self.maintenance_mode = mode.into();
        self
    }

    pub fn accepts(mut self, content_types: &[&str]) -> Self {
        self.accepts = content_types.iter().map(|c| c.to_string()).collect();
        self
    }
}
