/*
 * Responsibility
 * - Gateway trust boundary: 起動時に決まる 2 モード
 *   - behind gateway: gateway が注入する mandatory header が全部揃っていること (欠けていれば 502)
 *   - direct exposure: reserved header を持ち込ませない (400) / Authorization があれば独立に検証 (403)
 * - 判定だけを行い、レスポンス描画は request_log boundary に任せる
 */
use axum::http::{HeaderMap, StatusCode, header};

use crate::api::envelope::{BODY_FAILURE_INFO, FieldFailure, RequestValidationFailure};
use crate::error::{ApiError, codes};
use crate::services::auth::{TokenVerifier, VerificationFailure};

// Lower-case so they can be used directly as `HeaderMap` keys.
pub const REQUEST_ID_HEADER: &str = "x-convergence-request-id";
pub const PARENT_REQUEST_ID_HEADER: &str = "x-convergence-parent-request-id";
pub const CALLER_SERVICE_HEADER: &str = "x-convergence-caller-service";
pub const CALLER_SERVICE_HASH_HEADER: &str = "x-convergence-caller-service-hash";
pub const CALLER_SERVICE_VERSION_HEADER: &str = "x-convergence-caller-service-version";

pub const RESERVED_HEADERS: [&str; 5] = [
    REQUEST_ID_HEADER,
    PARENT_REQUEST_ID_HEADER,
    CALLER_SERVICE_HEADER,
    CALLER_SERVICE_HASH_HEADER,
    CALLER_SERVICE_VERSION_HEADER,
];

pub const MISSING_HEADERS_MESSAGE: &str =
    "The request input was invalid, missing the mandatory API gateway headers.";
pub const RESERVED_HEADERS_MESSAGE: &str =
    "The request input was invalid, including reserved API gateway headers.";
pub const UNEXPECTED_REQUEST_ID_MESSAGE: &str = "The request has unexpected request ID header.";
pub const UNVERIFIABLE_TOKEN_MESSAGE: &str =
    "Unable to verify the validity of the Authorization token provided.";

#[derive(Debug, Clone)]
pub struct GatewayTrustConfig {
    pub is_behind_gateway: bool,
    pub mandatory_headers: Vec<&'static str>,
    pub optional_headers: Vec<&'static str>,
    pub request_id_prefix: String,
}

impl GatewayTrustConfig {
    pub fn new(is_behind_gateway: bool, request_id_prefix: impl Into<String>) -> Self {
        Self {
            is_behind_gateway,
            mandatory_headers: vec![
                REQUEST_ID_HEADER,
                CALLER_SERVICE_HEADER,
                CALLER_SERVICE_HASH_HEADER,
                CALLER_SERVICE_VERSION_HEADER,
            ],
            optional_headers: vec![PARENT_REQUEST_ID_HEADER],
            request_id_prefix: request_id_prefix.into(),
        }
    }

    /// `Ok(())` means the request may continue to authorization.
    pub fn check(&self, headers: &HeaderMap, verifier: &TokenVerifier) -> Result<(), ApiError> {
        if self.is_behind_gateway {
            // No token validation here; the authorization stage does it.
            let missing = self.missing_mandatory(headers);
            if missing.is_empty() {
                return Ok(());
            }
            return Err(missing_headers_error(&missing));
        }

        let reserved = self.present_mandatory(headers);
        if !reserved.is_empty() {
            return Err(reserved_headers_error(&reserved));
        }

        match headers.get(header::AUTHORIZATION) {
            None => Ok(()),
            Some(value) => {
                let valid = value
                    .to_str()
                    .map(|v| authorization_is_verifiable(verifier, v))
                    .unwrap_or(false);
                if valid {
                    Ok(())
                } else {
                    Err(unverifiable_token_error())
                }
            }
        }
    }

    pub fn missing_mandatory(&self, headers: &HeaderMap) -> Vec<&'static str> {
        self.mandatory_headers
            .iter()
            .copied()
            .filter(|name| !has_header(headers, name))
            .collect()
    }

    pub fn present_mandatory(&self, headers: &HeaderMap) -> Vec<&'static str> {
        self.mandatory_headers
            .iter()
            .copied()
            .filter(|name| has_header(headers, name))
            .collect()
    }
}

fn has_header(headers: &HeaderMap, name: &str) -> bool {
    headers
        .keys()
        .any(|k| k.as_str().eq_ignore_ascii_case(name))
}

/// Direct-exposure hook: the scheme and signature must check out. Expiry is left to
/// the authorization stage so it can answer 401 instead of 403.
fn authorization_is_verifiable(verifier: &TokenVerifier, value: &str) -> bool {
    match verifier.inspect(value) {
        Ok(_) | Err(VerificationFailure::Expired) => true,
        Err(failure) => {
            if failure == VerificationFailure::InvalidSignature {
                tracing::warn!(audit = true, "direct request carried a token with an invalid signature");
            }
            false
        }
    }
}

fn header_failures(names: &[&str], message: &str) -> RequestValidationFailure {
    RequestValidationFailure {
        errors: names
            .iter()
            .map(|n| FieldFailure::header(&n.to_ascii_uppercase(), message))
            .collect(),
    }
}

fn missing_headers_error(missing: &[&str]) -> ApiError {
    ApiError::new(StatusCode::BAD_GATEWAY, codes::INVALID_DATA, MISSING_HEADERS_MESSAGE)
        .with_body(&header_failures(missing, "Request is missing header."))
}

fn reserved_headers_error(present: &[&str]) -> ApiError {
    let message = if present.contains(&REQUEST_ID_HEADER) {
        UNEXPECTED_REQUEST_ID_MESSAGE
    } else {
        RESERVED_HEADERS_MESSAGE
    };

    ApiError::new(StatusCode::BAD_REQUEST, codes::INVALID_DATA, message)
        .with_body(&header_failures(present, "Request includes reserved header."))
}

fn unverifiable_token_error() -> ApiError {
    ApiError::new(
        StatusCode::FORBIDDEN,
        codes::INVALID_AUTHORIZATION_TOKEN,
        UNVERIFIABLE_TOKEN_MESSAGE,
    )
    .with_body_type(BODY_FAILURE_INFO)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::HeaderValue;
    use chrono::Utc;

    use super::*;
    use crate::services::auth::{ServiceClaims, ServiceKeys, TokenIssuer};

    fn verifier_and_issuer() -> (TokenVerifier, TokenIssuer) {
        let (keys, _) = ServiceKeys::generate().unwrap();
        let keys = Arc::new(keys);
        (
            TokenVerifier::new(keys.clone(), false),
            TokenIssuer::new("gw-test", keys),
        )
    }

    fn gateway_headers() -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(
            REQUEST_ID_HEADER,
            HeaderValue::from_static("6f1c3c1e-3a55-4c55-9d43-9a3b3f1d8e10"),
        );
        h.insert(CALLER_SERVICE_HEADER, HeaderValue::from_static("billing"));
        h.insert(CALLER_SERVICE_HASH_HEADER, HeaderValue::from_static("f00d"));
        h.insert(CALLER_SERVICE_VERSION_HEADER, HeaderValue::from_static("1.0.0"));
        h
    }

    fn field_names(err: &ApiError) -> Vec<String> {
        err.body.as_ref().unwrap()["errors"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["field"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn behind_gateway_with_all_headers_proceeds() {
        let (verifier, _) = verifier_and_issuer();
        let trust = GatewayTrustConfig::new(true, "ord");
        assert!(trust.check(&gateway_headers(), &verifier).is_ok());
    }

    #[test]
    fn behind_gateway_lists_exactly_the_missing_header() {
        let (verifier, _) = verifier_and_issuer();
        let trust = GatewayTrustConfig::new(true, "ord");

        for name in trust.mandatory_headers.clone() {
            let mut h = gateway_headers();
            h.remove(name);

            let err = trust.check(&h, &verifier).unwrap_err();
            assert_eq!(err.status, StatusCode::BAD_GATEWAY);
            assert_eq!(err.body_type.as_deref(), Some("request_error_info"));
            assert_eq!(field_names(&err), vec![name.to_ascii_uppercase()]);
        }
    }

    #[test]
    fn behind_gateway_does_not_look_at_tokens() {
        let (verifier, _) = verifier_and_issuer();
        let trust = GatewayTrustConfig::new(true, "ord");
        let mut h = gateway_headers();
        h.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic Zm9v"));

        assert!(trust.check(&h, &verifier).is_ok());
    }

    #[test]
    fn direct_mode_rejects_forged_caller_header() {
        let (verifier, _) = verifier_and_issuer();
        let trust = GatewayTrustConfig::new(false, "ord");
        let mut h = HeaderMap::new();
        h.insert(CALLER_SERVICE_HEADER, HeaderValue::from_static("billing"));

        let err = trust.check(&h, &verifier).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, RESERVED_HEADERS_MESSAGE);
        assert_eq!(field_names(&err), vec!["X-CONVERGENCE-CALLER-SERVICE"]);
    }

    #[test]
    fn direct_mode_rejects_client_supplied_request_id() {
        let (verifier, _) = verifier_and_issuer();
        let trust = GatewayTrustConfig::new(false, "ord");
        let mut h = HeaderMap::new();
        h.insert(REQUEST_ID_HEADER, HeaderValue::from_static("abc"));

        let err = trust.check(&h, &verifier).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, UNEXPECTED_REQUEST_ID_MESSAGE);
    }

    #[test]
    fn direct_mode_allows_anonymous_requests() {
        let (verifier, _) = verifier_and_issuer();
        let trust = GatewayTrustConfig::new(false, "ord");
        assert!(trust.check(&HeaderMap::new(), &verifier).is_ok());
    }

    #[test]
    fn direct_mode_validates_the_authorization_header() {
        let (verifier, issuer) = verifier_and_issuer();
        let (_, foreign) = verifier_and_issuer();
        let trust = GatewayTrustConfig::new(false, "ord");

        let check = |value: String| {
            let mut h = HeaderMap::new();
            h.insert(header::AUTHORIZATION, HeaderValue::from_str(&value).unwrap());
            trust.check(&h, &verifier)
        };

        let good = issuer.mint(None, false).unwrap();
        assert!(check(format!("Bearer {good}")).is_ok());

        // expiry is reported later, by the authorization stage
        let expired = issuer
            .sign(&ServiceClaims {
                exp: Utc::now().timestamp() - 30,
                ..issuer.claims_for(None, false)
            })
            .unwrap();
        assert!(check(format!("Bearer {expired}")).is_ok());

        let forged = foreign.mint(None, false).unwrap();
        let err = check(format!("Bearer {forged}")).unwrap_err();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
        assert_eq!(err.message, UNVERIFIABLE_TOKEN_MESSAGE);

        assert!(check("Token nope".to_string()).is_err());
    }
}
