/*
 * Responsibility
 * - JSON body を DTO に decode し、DTO 側の validate() を通す
 * - decode 失敗: 400 err_unparseable_input
 * - validate 失敗: 400 err_api_invalid_data + request_error_info body
 * - どちらも request log に残す
 */
use axum::Json;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use serde::de::DeserializeOwned;

use crate::api::envelope::RequestValidationFailure;
use crate::error::{ApiError, codes};
use crate::services::request_log::RequestLog;
use crate::state::AppState;

pub const UNPARSEABLE_INPUT_MESSAGE: &str = "The request input is not a valid JSON.";
pub const INVALID_INPUT_MESSAGE: &str = "The request input is invalid, refer to body for details.";

/// Field-level checks for an inbound DTO. An empty failure means valid.
pub trait Validate {
    fn validate(&self) -> RequestValidationFailure;
}

pub struct ValidatedJson<T>(pub T);

impl<T> FromRequest<AppState> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + Send,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let log = req.extensions().get::<RequestLog>().cloned();

        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|rejection| {
            if let Some(log) = &log {
                log.warning(format!("Unparseable request body: {}", rejection.body_text()));
            }
            ApiError::new(StatusCode::BAD_REQUEST, codes::UNPARSEABLE_INPUT, UNPARSEABLE_INPUT_MESSAGE)
        })?;

        let failure = value.validate();
        if !failure.is_empty() {
            if let Some(log) = &log {
                log.warning(format!("Request input failed validation on {} field(s).", failure.errors.len()));
            }
            return Err(ApiError::invalid_input(INVALID_INPUT_MESSAGE, &failure));
        }

        Ok(Self(value))
    }
}
