/*
 * Responsibility
 * - サービスが宣言した authority を authentication-service に登録する (起動時)
 * - 1 件でも失敗したら Err (起動を止めるかどうかは呼び出し側が決める)
 */
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::discovery::{DiscoveryError, resolve_service_url};
use super::{AuthorityMode, ServiceClient};
use crate::api::envelope::AtomicValue;

pub const AUTHENTICATION_SERVICE: &str = "authentication-service";
pub const REGISTER_AUTHORITY_PATH: &str = "/authentication/internal-services/register-authority";

/// One authority a service hands out, e.g. `service_authority::orders.refund`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityDeclaration {
    pub uuid: Uuid,
    pub authority: String,
    pub display_name: String,
    pub tier: i32,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthorityRegistrationError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error("unable to register service authority {authority}: {status} {message}")]
    Rejected {
        authority: String,
        status: u16,
        message: String,
    },
}

pub async fn register_authority(
    client: &ServiceClient,
    authentication_url: &str,
    declaration: &AuthorityDeclaration,
) -> Result<(), AuthorityRegistrationError> {
    let response = client
        .post_with_authority::<_, AtomicValue<bool>>(
            authentication_url,
            REGISTER_AUTHORITY_PATH,
            declaration,
            &AuthorityMode::ServiceCall,
            StatusCode::OK,
            None,
        )
        .await;

    let accepted = response.is_successful() && response.body.as_ref().is_some_and(|b| b.value);
    if accepted {
        return Ok(());
    }

    Err(AuthorityRegistrationError::Rejected {
        authority: declaration.authority.clone(),
        status: response.header.status_code,
        message: response.header.message,
    })
}

/// Resolve the authentication service once, then register every declaration in order.
pub async fn register_all(
    client: &ServiceClient,
    discovery_url: &str,
    declarations: &[AuthorityDeclaration],
) -> Result<usize, AuthorityRegistrationError> {
    if declarations.is_empty() {
        return Ok(0);
    }

    let authentication_url = resolve_service_url(client, discovery_url, AUTHENTICATION_SERVICE).await?;

    for declaration in declarations {
        register_authority(client, &authentication_url, declaration).await?;
        tracing::info!(
            authority = %declaration.authority,
            tier = declaration.tier,
            "service authority registered"
        );
    }

    Ok(declarations.len())
}
