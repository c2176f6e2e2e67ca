/*
 * Responsibility
 * - このサービス自身が公開する URL 構造と、endpoint ごとの authorization requirement
 * - route と registry entry は ServiceRoutes で同時に登録する
 */
use uuid::Uuid;

use crate::api::routing::{RegistrationError, ServiceRoutes};
use crate::api::v1::handlers::{
    caller::{check_authority, whoami},
    service::{health, list_endpoints, status},
};
use crate::services::endpoints::EndpointMetadata;

pub const INSPECT_ENDPOINTS_AUTHORITY: &str = "service_authority::guard.inspect_endpoints";
const INSPECT_ENDPOINTS_AUTHORITY_ID: Uuid = Uuid::from_u128(0x5c3a_9e1f_6d2b_4a8e_9f10_2b7c_4d6e_8a01);

pub fn routes() -> Result<ServiceRoutes, RegistrationError> {
    Ok(ServiceRoutes::new()
        .route("GET", "/service/status", "@allow_all", status)?
        .route_with(
            "GET",
            "/service/health",
            "@allow_all",
            EndpointMetadata::new().internal(),
            health,
        )?
        .route_with(
            "GET",
            "/service/endpoints",
            INSPECT_ENDPOINTS_AUTHORITY,
            EndpointMetadata::new().internal(),
            list_endpoints,
        )?
        .route("GET", "/caller", "@signed_in", whoami)?
        .route("POST", "/caller/authority", "@signed_in", check_authority)?
        .declare_authority(
            INSPECT_ENDPOINTS_AUTHORITY_ID,
            INSPECT_ENDPOINTS_AUTHORITY,
            "Inspect registered endpoints",
            1,
        ))
}
