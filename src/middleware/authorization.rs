//! Endpoint authorization.
//!
//! 1. resolve path + method in the registry (404 / 405)
//! 2. verify the `Authorization` header if one was sent; any failure rejects,
//!    whatever the endpoint requires
//! 3. evaluate the endpoint predicate (403 on denial)
//! 4. hand an [`AuthCtx`] to the handler via the extensions

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::api::v1::extractors::AuthCtx;
use crate::error::ApiError;
use crate::services::auth::{Decision, VerificationFailure, VerifiedToken};
use crate::services::endpoints::Resolution;
use crate::services::request_log::RequestLog;
use crate::state::AppState;

pub async fn authorize(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let path = req.uri().path().to_string();
    let log = req.extensions().get::<RequestLog>().cloned();

    let entry = match state.registry.resolution(&path, req.method()) {
        Resolution::Matched(entry) => entry,
        Resolution::MethodNotAllowed => {
            return Err(ApiError::method_not_allowed(req.method().as_str(), &path));
        }
        Resolution::NotFound => return Err(ApiError::not_found(&path)),
    };

    let credential_presented = req.headers().contains_key(header::AUTHORIZATION);
    let token = match verify_header(&state, &req) {
        Ok(token) => token,
        Err(failure) => {
            if failure == VerificationFailure::InvalidSignature {
                tracing::warn!(audit = true, path = %path, "authorization token with an invalid signature");
            }
            if let Some(log) = &log {
                log.warning(format!("Authorization token rejected: {}", failure.message()));
            }
            return Err(failure.into());
        }
    };

    match entry.predicate.evaluate(token.as_ref(), credential_presented) {
        Decision::Allow => {}
        Decision::Deny(message) => {
            if let Some(log) = &log {
                log.warning(format!(
                    "Access denied to {} {path}, requires {}.",
                    req.method(),
                    entry.predicate
                ));
            }
            return Err(ApiError::forbidden_for_path(&path, message));
        }
    }

    req.extensions_mut()
        .insert(AuthCtx::new(token, credential_presented));

    Ok(next.run(req).await)
}

fn verify_header(state: &AppState, req: &Request) -> Result<Option<VerifiedToken>, VerificationFailure> {
    let Some(value) = req.headers().get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let value = value
        .to_str()
        .map_err(|_| VerificationFailure::Malformed("authorization header is not valid text".into()))?;

    state.verifier.inspect(value)
}
