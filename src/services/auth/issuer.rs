/*
 * Responsibility
 * - 自サービス名で短命の ES512 トークンを発行する (service-to-service 呼び出し用)
 * - iss = sub = service name, exp = now + ttl
 */
use std::sync::Arc;

use chrono::{Duration, Utc};
use josekit::JoseError;
use josekit::jws::JwsHeader;
use josekit::jwt;

use super::claims::ServiceClaims;
use super::keys::ServiceKeys;

pub const INTERNAL_TOKEN_TTL_SECONDS: i64 = 60;

#[derive(Debug, thiserror::Error)]
#[error("failed to sign service token: {0}")]
pub struct IssueError(#[from] JoseError);

#[derive(Clone)]
pub struct TokenIssuer {
    service_name: String,
    keys: Arc<ServiceKeys>,
    ttl: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("service_name", &self.service_name)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl TokenIssuer {
    pub fn new(service_name: impl Into<String>, keys: Arc<ServiceKeys>) -> Self {
        Self {
            service_name: service_name.into(),
            keys,
            ttl: Duration::seconds(INTERNAL_TOKEN_TTL_SECONDS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn claims_for(&self, authority: Option<&str>, inter_service: bool) -> ServiceClaims {
        ServiceClaims {
            iss: self.service_name.clone(),
            sub: self.service_name.clone(),
            exp: (Utc::now() + self.ttl).timestamp(),
            authorities: authority.map(|a| vec![a.to_string()]),
            is_inter_service_call: inter_service.then_some(true),
        }
    }

    /// Mint a token for one outbound call.
    pub fn mint(&self, authority: Option<&str>, inter_service: bool) -> Result<String, IssueError> {
        self.sign(&self.claims_for(authority, inter_service))
    }

    pub fn sign(&self, claims: &ServiceClaims) -> Result<String, IssueError> {
        let mut header = JwsHeader::new();
        header.set_token_type("JWT");

        let payload = claims.to_payload()?;
        let token = jwt::encode_with_signer(&payload, &header, self.keys.signer())?;
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::auth::verifier::TokenVerifier;

    #[test]
    fn minted_token_names_the_service_and_authority() {
        let (keys, _) = ServiceKeys::generate().unwrap();
        let keys = Arc::new(keys);
        let issuer = TokenIssuer::new("ledger", keys.clone());
        let verifier = TokenVerifier::new(keys, false);

        let token = issuer
            .mint(Some("service_authority::ledger.sync"), true)
            .unwrap();
        let verified = verifier.verify(&format!("Bearer {token}")).unwrap();

        assert_eq!(verified.issuer, "ledger");
        assert_eq!(verified.subject, "ledger");
        assert!(verified.is_inter_service_call);
        assert_eq!(
            verified.authorities.iter().collect::<Vec<_>>(),
            vec!["service_authority::ledger.sync"]
        );
    }

    #[test]
    fn default_ttl_is_one_minute() {
        let (keys, _) = ServiceKeys::generate().unwrap();
        let issuer = TokenIssuer::new("ledger", Arc::new(keys));

        let before = Utc::now().timestamp();
        let claims = issuer.claims_for(None, false);
        assert!(claims.exp >= before + INTERNAL_TOKEN_TTL_SECONDS);
        assert!(claims.exp <= Utc::now().timestamp() + INTERNAL_TOKEN_TTL_SECONDS);
        assert_eq!(claims.authorities, None);
        assert_eq!(claims.is_inter_service_call, None);
    }
}
