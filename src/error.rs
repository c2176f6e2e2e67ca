/*
 * Responsibility
 * - アプリ共通の ApiError 定義 (status / code / message / request ids / custom body)
 * - IntoResponse 実装 ({header, body} envelope)
 * - token verification failure などを統一的に変換
 */
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::api::envelope::{
    ApiResponse, BODY_API_FAILURE, BODY_FAILURE_INFO, BodyType, RequestValidationFailure,
    ResponseHeader,
};
use crate::services::auth::VerificationFailure;

pub mod codes {
    pub const API_INTERNAL_ERROR: &str = "err_api_internal_error";
    pub const EXPIRED_AUTHORIZATION_TOKEN: &str = "err_authorization_token_expired";
    pub const INVALID_AUTHORIZATION_TOKEN: &str = "err_auth_invalid_authorization_token";
    pub const API_RESOURCE_NOT_FOUND: &str = "err_api_resource_not_found";
    pub const API_METHOD_NOT_ALLOWED: &str = "err_method_not_allowed";
    pub const INVALID_DATA: &str = "err_api_invalid_data";
    pub const API_INVALID_ENTITY_STATE: &str = "err_api_invalid_entity_state";
    pub const UNPARSEABLE_INPUT: &str = "err_unparseable_input";
    pub const UNABLE_PARSE_SERVICE_RESPONSE: &str = "err_unable_parse_service_response";
    pub const CONNECTION_FAILURE: &str = "err_connection_failure";
}

pub const PRODUCTION_PANIC_MESSAGE: &str = "An unexpected error happened during API execution";

/// A failure that renders as a structured API error response.
///
/// Request ids are filled in by the request boundary (`correlate`) if the
/// code that produced the error did not have them at hand.
#[derive(Debug, Clone, Error)]
#[error("{status}: {code}: {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub body_type: Option<String>,
    pub body: Option<Value>,
    pub request_id: Option<Uuid>,
    pub parent_request_id: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            body_type: None,
            body: None,
            request_id: None,
            parent_request_id: None,
        }
    }

    pub fn with_body_type(mut self, body_type: &str) -> Self {
        self.body_type = Some(body_type.to_string());
        self
    }

    /// Attach a custom body; the body type travels with it.
    pub fn with_body<B: Serialize + BodyType>(mut self, body: &B) -> Self {
        match serde_json::to_value(body) {
            Ok(v) => {
                self.body = Some(v);
                self.body_type = Some(B::body_type().to_string());
            }
            Err(e) => tracing::error!(error = %e, "failed to serialize error body"),
        }
        self
    }

    pub fn correlate(mut self, request_id: Uuid, parent_request_id: Option<&str>) -> Self {
        self.request_id.get_or_insert(request_id);
        if self.parent_request_id.is_none() {
            self.parent_request_id = parent_request_id.map(str::to_string);
        }
        self
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, codes::API_INTERNAL_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::INVALID_DATA, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            codes::API_INVALID_ENTITY_STATE,
            message,
        )
    }

    pub fn invalid_input(message: impl Into<String>, failure: &RequestValidationFailure) -> Self {
        Self::bad_request(message).with_body(failure)
    }

    pub fn not_found(path: &str) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            codes::API_RESOURCE_NOT_FOUND,
            format!("Unable to find resource at path {path}"),
        )
        .with_body_type(BODY_FAILURE_INFO)
    }

    pub fn method_not_allowed(method: &str, path: &str) -> Self {
        Self::new(
            StatusCode::METHOD_NOT_ALLOWED,
            codes::API_METHOD_NOT_ALLOWED,
            format!("Unable to find resource at path {method} {path}"),
        )
        .with_body_type(BODY_FAILURE_INFO)
    }

    /// Predicate denial. `message` overrides the generic per-path text.
    pub fn forbidden_for_path(path: &str, message: Option<String>) -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            codes::INVALID_AUTHORIZATION_TOKEN,
            message.unwrap_or_else(|| format!("The authorization token is invalid for path {path}")),
        )
        .with_body_type(BODY_FAILURE_INFO)
    }

    /// Panic / unhandled failure. Production never leaks the detail.
    pub fn unexpected(detail: &str, production: bool) -> Self {
        let message = if production {
            PRODUCTION_PANIC_MESSAGE
        } else {
            detail
        };
        Self::internal(message).with_body_type(BODY_API_FAILURE)
    }

    pub fn envelope(&self) -> ApiResponse<Value> {
        ApiResponse {
            header: ResponseHeader {
                body_type: self.body_type.clone(),
                status_code: self.status.as_u16(),
                code: self.code.to_string(),
                message: self.message.clone(),
                request_id: self.request_id,
                parent_request_id: self.parent_request_id.clone(),
            },
            body: self.body.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.envelope())).into_response();

        // request_log boundary が拾って request id 付きで描画し直す
        response.extensions_mut().insert(self);
        response
    }
}

impl From<VerificationFailure> for ApiError {
    fn from(e: VerificationFailure) -> Self {
        ApiError::new(e.status(), e.code(), e.message()).with_body_type(BODY_API_FAILURE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::envelope::FieldFailure;

    #[test]
    fn correlate_keeps_existing_ids() {
        let first = Uuid::new_v4();
        let err = ApiError::bad_request("x")
            .correlate(first, Some("svc_parent"))
            .correlate(Uuid::new_v4(), None);

        assert_eq!(err.request_id, Some(first));
        assert_eq!(err.parent_request_id.as_deref(), Some("svc_parent"));
    }

    #[test]
    fn custom_body_sets_its_body_type() {
        let mut failure = RequestValidationFailure::default();
        failure.push(FieldFailure::body("name", "must not be empty"));

        let env = ApiError::invalid_input("bad", &failure).envelope();
        assert_eq!(env.header.body_type.as_deref(), Some("request_error_info"));
        assert_eq!(env.header.status_code, 400);
        assert!(env.body.is_some());
    }

    #[test]
    fn production_hides_panic_detail() {
        assert_eq!(
            ApiError::unexpected("index out of bounds", true).message,
            PRODUCTION_PANIC_MESSAGE
        );
        assert_eq!(
            ApiError::unexpected("index out of bounds", false).message,
            "index out of bounds"
        );
    }

    #[test]
    fn verification_failures_keep_their_status() {
        let err: ApiError = VerificationFailure::Expired.into();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.code, codes::EXPIRED_AUTHORIZATION_TOKEN);
    }
}
