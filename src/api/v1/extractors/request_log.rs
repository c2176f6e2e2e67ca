/*
 * Responsibility
 * - request_log boundary が extensions に入れた RequestLog を handler に渡す
 */
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::ApiError;
use crate::services::request_log::RequestLog;
use crate::state::AppState;

impl FromRequestParts<AppState> for RequestLog {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestLog>()
            .cloned()
            .ok_or_else(|| ApiError::internal("request log is missing from the request"))
    }
}
