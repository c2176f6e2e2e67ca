/*
 * Responsibility
 * - GET  /caller          : token の主体を返す (@signed_in)
 * - POST /caller/authority : caller の token が authority を持つか (@signed_in)
 */
use axum::{http::StatusCode, response::Response};

use crate::api::envelope::AtomicValue;
use crate::api::v1::dto::caller::{AuthorityCheckRequest, CallerResponse};
use crate::api::v1::extractors::{AuthCtxExtractor, ValidatedJson};
use crate::services::request_log::RequestLog;

pub async fn whoami(AuthCtxExtractor(ctx): AuthCtxExtractor, log: RequestLog) -> Response {
    let token = ctx.token.as_ref();

    let body = CallerResponse {
        subject: ctx.subject().map(str::to_string),
        issuer: token.map(|t| t.issuer.clone()),
        is_inter_service_call: ctx.is_service_call(),
        authorities: token
            .map(|t| t.authorities.iter().cloned().collect())
            .unwrap_or_default(),
        expires_at: token.map(|t| t.expires_at.timestamp()),
    };

    log.respond(StatusCode::OK, &body)
}

pub async fn check_authority(
    AuthCtxExtractor(ctx): AuthCtxExtractor,
    log: RequestLog,
    ValidatedJson(req): ValidatedJson<AuthorityCheckRequest>,
) -> Response {
    log.set_parameters(&[&req]);
    if req.reason.is_some() {
        log.debug("Caller attached a reason to the authority check.");
    }

    let authority = req.authority.trim();
    let granted = ctx.token.as_ref().is_some_and(|t| t.has_authority(authority));
    log.info(format!("Authority {authority} granted: {granted}"));

    log.respond(StatusCode::OK, &AtomicValue { value: granted })
}
