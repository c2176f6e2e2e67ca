/*
 * Responsibility
 * - /service 配下の response DTO
 */
use std::collections::BTreeMap;

use serde::Serialize;

use crate::api::envelope::BodyType;
use crate::services::endpoints::{EndpointAuthorizationEntry, RateLimitPolicy};

#[derive(Debug, Serialize)]
pub struct EndpointInfoResponse {
    pub url: String,
    pub method: String,
    pub exposed_through_gateway: bool,
    pub expected_authorization: String,
    /// bytes
    pub max_payload_size: u64,
    /// milliseconds
    pub timeout: u64,
    pub rate_limiting_policy: Vec<RateLimitPolicy>,
    pub maintenance_mode: String,
    pub accepts: Vec<String>,
}

impl From<&EndpointAuthorizationEntry> for EndpointInfoResponse {
    fn from(e: &EndpointAuthorizationEntry) -> Self {
        Self {
            url: e.pattern.as_str().to_string(),
            method: e.method.as_str().to_string(),
            exposed_through_gateway: e.metadata.exposed_through_gateway,
            expected_authorization: e.predicate.requirement().to_string(),
            max_payload_size: e.metadata.max_payload_size,
            timeout: e.metadata.timeout_ms,
            rate_limiting_policy: e.metadata.rate_limiting_policy.clone(),
            maintenance_mode: e.metadata.maintenance_mode.clone(),
            accepts: e.metadata.accepts.clone(),
        }
    }
}

impl BodyType for EndpointInfoResponse {
    fn body_type() -> &'static str {
        "service_endpoint_info"
    }
}

#[derive(Debug, Serialize)]
pub struct ServiceStatusResponse {
    pub service_name: String,
    pub version_hash: String,
    pub version: String,
    pub status: String,
    pub endpoints: Vec<EndpointInfoResponse>,
    pub extra: BTreeMap<String, String>,
}

impl BodyType for ServiceStatusResponse {
    fn body_type() -> &'static str {
        "service_status"
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

impl BodyType for HealthResponse {
    fn body_type() -> &'static str {
        "service_health"
    }
}
