/// Factory: build the verifier / issuer pair from application `Config`.
use std::sync::Arc;

use crate::config::Config;
use crate::services::auth::keys::{KeyError, ServiceKeys};
use crate::services::auth::{TokenIssuer, TokenVerifier};

pub fn build_auth(config: &Config) -> Result<(Arc<TokenVerifier>, Arc<TokenIssuer>), KeyError> {
    let keys = Arc::new(ServiceKeys::from_private_pem(&config.signing_key_pem)?);

    let verifier = TokenVerifier::new(keys.clone(), config.accept_api_key_scheme);
    let issuer = TokenIssuer::new(config.service.name.clone(), keys);

    Ok((Arc::new(verifier), Arc::new(issuer)))
}
