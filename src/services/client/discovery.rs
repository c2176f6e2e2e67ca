//! Service discovery through the infrastructure service.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use super::{AuthorityMode, ServiceClient};
use crate::api::envelope::BodyType;

pub const GET_SERVICE_INFO_PATH: &str = "/infrastructure/get-service-info";

#[derive(Debug, Clone, Serialize)]
pub struct ServiceConnectionDetailsRequest {
    pub service_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConnectionDetails {
    pub service: String,
    pub port: u16,
    pub ip: String,
    pub host: String,
}

impl ServiceConnectionDetails {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl BodyType for ServiceConnectionDetails {
    fn body_type() -> &'static str {
        "service_connection_details"
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unable to get the base url for service ({service}): {status} {message}")]
pub struct DiscoveryError {
    pub service: String,
    pub status: u16,
    pub message: String,
}

/// Base URL (`http://host:port`) of `service_name`, as known by the discovery server.
pub async fn resolve_service_url(
    client: &ServiceClient,
    discovery_url: &str,
    service_name: &str,
) -> Result<String, DiscoveryError> {
    let request = ServiceConnectionDetailsRequest {
        service_name: service_name.to_string(),
    };

    let response = client
        .post_with_authority::<_, ServiceConnectionDetails>(
            discovery_url,
            GET_SERVICE_INFO_PATH,
            &request,
            &AuthorityMode::ServiceCall,
            StatusCode::OK,
            None,
        )
        .await;

    match response.body {
        Some(details) if response.header.status_code == StatusCode::OK.as_u16() => {
            tracing::debug!(service = service_name, url = %details.base_url(), "service resolved");
            Ok(details.base_url())
        }
        _ => Err(DiscoveryError {
            service: service_name.to_string(),
            status: response.header.status_code,
            message: response.header.message,
        }),
    }
}
