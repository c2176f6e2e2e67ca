/*
 * Responsibility
 * - GET /service/status : サービス名/version/hash と公開 endpoint 一覧 (@allow_all)
 * - GET /service/health : 疎通用 (@allow_all)
 * - GET /service/endpoints : endpoint 一覧のみ (service authority 必須)
 */
use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, response::Response};

use crate::api::v1::dto::service::{EndpointInfoResponse, HealthResponse, ServiceStatusResponse};
use crate::services::request_log::RequestLog;
use crate::state::AppState;

pub const STATUS_HEALTHY: &str = "healthy";

fn endpoints(state: &AppState) -> Vec<EndpointInfoResponse> {
    state
        .registry
        .entries()
        .iter()
        .map(EndpointInfoResponse::from)
        .collect()
}

pub async fn status(State(state): State<AppState>, log: RequestLog) -> Response {
    let body = ServiceStatusResponse {
        service_name: state.service.name.clone(),
        version_hash: state.service.version_hash.clone(),
        version: state.service.version.clone(),
        status: STATUS_HEALTHY.to_string(),
        endpoints: endpoints(&state),
        extra: BTreeMap::from([
            ("app_env".to_string(), state.app_env.as_str().to_string()),
            (
                "behind_gateway".to_string(),
                state.trust.is_behind_gateway.to_string(),
            ),
        ]),
    };

    log.respond(StatusCode::OK, &body)
}

pub async fn health(log: RequestLog) -> Response {
    log.respond(StatusCode::OK, &HealthResponse { status: "ok" })
}

pub async fn list_endpoints(State(state): State<AppState>, log: RequestLog) -> Response {
    let list = endpoints(&state);
    log.info(format!("Listing {} registered endpoints.", list.len()));
    log.respond(StatusCode::OK, &list)
}
