use std::collections::BTreeSet;
use std::sync::Arc;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use josekit::JoseError;
use josekit::jwt;

use crate::error::codes;

use super::claims::{ClaimsDecodeError, ServiceClaims};
use super::keys::ServiceKeys;

pub const BEARER_PREFIX: &str = "Bearer ";
pub const API_KEY_PREFIX: &str = "API-Key ";

/// Why a presented credential was rejected.
///
/// Each kind maps to a fixed (status, code, message) triple; see [`VerificationFailure::status`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationFailure {
    #[error("authorization scheme is not supported")]
    UnsupportedScheme,
    #[error("token is expired")]
    Expired,
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token could not be verified: {0}")]
    Malformed(String),
}

impl VerificationFailure {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnsupportedScheme | Self::Expired => StatusCode::UNAUTHORIZED,
            Self::InvalidSignature | Self::Malformed(_) => StatusCode::FORBIDDEN,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedScheme | Self::InvalidSignature => codes::INVALID_AUTHORIZATION_TOKEN,
            Self::Expired => codes::EXPIRED_AUTHORIZATION_TOKEN,
            Self::Malformed(_) => codes::API_INTERNAL_ERROR,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::UnsupportedScheme => "Service expects an authorization token in Bearer format.",
            Self::Expired => {
                "Authorization token is expired, please refresh the token or get a new one."
            }
            Self::InvalidSignature => {
                "Authorization token is invalid, this incident will be reported."
            }
            Self::Malformed(_) => "Authorization token verification failed due to unknown error.",
        }
    }
}

impl From<ClaimsDecodeError> for VerificationFailure {
    fn from(e: ClaimsDecodeError) -> Self {
        Self::Malformed(e.to_string())
    }
}

fn classify(e: JoseError) -> VerificationFailure {
    match e {
        JoseError::InvalidSignature(_) => VerificationFailure::InvalidSignature,
        other => VerificationFailure::Malformed(other.to_string()),
    }
}

/// 検証済みトークンから取り出した、アプリ側で使う値
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub subject: String,
    pub issuer: String,
    pub expires_at: DateTime<Utc>,
    pub authorities: BTreeSet<String>,
    pub is_inter_service_call: bool,
}

impl VerifiedToken {
    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities.contains(authority)
    }
}

/// ES512 bearer-token verifier.
///
/// Signature first, then claim decoding, then expiry. A token that fails the
/// signature check is never reported as expired.
#[derive(Clone)]
pub struct TokenVerifier {
    keys: Arc<ServiceKeys>,
    accept_api_key: bool,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("accept_api_key", &self.accept_api_key)
            .finish()
    }
}

impl TokenVerifier {
    pub fn new(keys: Arc<ServiceKeys>, accept_api_key: bool) -> Self {
        Self {
            keys,
            accept_api_key,
        }
    }

    /// Verify a full `Authorization` value (`Bearer <jwt>`).
    pub fn verify(&self, authorization: &str) -> Result<VerifiedToken, VerificationFailure> {
        self.verify_at(authorization, Utc::now())
    }

    pub fn verify_at(
        &self,
        authorization: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifiedToken, VerificationFailure> {
        let token = authorization
            .strip_prefix(BEARER_PREFIX)
            .ok_or(VerificationFailure::UnsupportedScheme)?;

        let (payload, _header) =
            jwt::decode_with_verifier(token, self.keys.verifier()).map_err(classify)?;

        let claims = ServiceClaims::from_payload(&payload)?;

        if now.timestamp() > claims.exp {
            return Err(VerificationFailure::Expired);
        }

        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| VerificationFailure::Malformed("exp out of range".into()))?;

        Ok(VerifiedToken {
            subject: claims.sub,
            issuer: claims.iss,
            expires_at,
            authorities: claims.authorities.unwrap_or_default().into_iter().collect(),
            is_inter_service_call: claims.is_inter_service_call.unwrap_or(false),
        })
    }

    /// Like [`verify`](Self::verify), but an `API-Key` credential is accepted without a
    /// token when the service is configured for it (`Ok(None)`).
    pub fn inspect(&self, authorization: &str) -> Result<Option<VerifiedToken>, VerificationFailure> {
        if self.accept_api_key && authorization.starts_with(API_KEY_PREFIX) {
            return Ok(None);
        }

        self.verify(authorization).map(Some)
    }
}
