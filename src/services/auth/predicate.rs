//! Per-endpoint authorization checks.
//!
//! Requirements are declared as strings when a route is registered:
//!
//! | requirement               | predicate                     |
//! |---------------------------|-------------------------------|
//! | `@allow_all`              | [`AuthorizationPredicate::AllowAll`]    |
//! | `@signed_in`              | [`AuthorizationPredicate::SignedIn`]    |
//! | `@not_signed_in`          | [`AuthorizationPredicate::NotSignedIn`] |
//! | `@service_call`           | [`AuthorizationPredicate::ServiceCall`] |
//! | `authority::<name>`       | [`AuthorizationPredicate::HasAuthority`] |
//! | `service_authority::<name>` | [`AuthorizationPredicate::HasAuthority`] |
//!
//! The authority string is kept whole (prefix included), since that is what tokens carry.

use std::fmt;
use std::str::FromStr;

use super::verifier::VerifiedToken;

pub const ALLOW_ALL: &str = "@allow_all";
pub const SIGNED_IN: &str = "@signed_in";
pub const NOT_SIGNED_IN: &str = "@not_signed_in";
pub const SERVICE_CALL: &str = "@service_call";
pub const AUTHORITY_PREFIX: &str = "authority::";
pub const SERVICE_AUTHORITY_PREFIX: &str = "service_authority::";

pub const ANONYMOUS_ONLY_MESSAGE: &str = "Endpoint is available for anonymous users only.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationPredicate {
    AllowAll,
    SignedIn,
    NotSignedIn,
    ServiceCall,
    HasAuthority(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// `None` means "use the generic denial message for the path".
    Deny(Option<String>),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

impl AuthorizationPredicate {
    pub fn evaluate(&self, token: Option<&VerifiedToken>, credential_presented: bool) -> Decision {
        let verified = if credential_presented { token } else { None };

        let allowed = match self {
            Self::AllowAll => true,
            Self::NotSignedIn => {
                if credential_presented {
                    return Decision::Deny(Some(ANONYMOUS_ONLY_MESSAGE.to_string()));
                }
                true
            }
            Self::SignedIn => verified.is_some(),
            Self::ServiceCall => verified.is_some_and(|t| t.is_inter_service_call),
            Self::HasAuthority(name) => verified.is_some_and(|t| t.has_authority(name)),
        };

        if allowed {
            Decision::Allow
        } else {
            Decision::Deny(None)
        }
    }

    pub fn requirement(&self) -> &str {
        match self {
            Self::AllowAll => ALLOW_ALL,
            Self::SignedIn => SIGNED_IN,
            Self::NotSignedIn => NOT_SIGNED_IN,
            Self::ServiceCall => SERVICE_CALL,
            Self::HasAuthority(name) => name,
        }
    }
}

impl fmt::Display for AuthorizationPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.requirement())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported type of authorization: {0}")]
pub struct UnknownRequirement(pub String);

impl FromStr for AuthorizationPredicate {
    type Err = UnknownRequirement;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ALLOW_ALL => Ok(Self::AllowAll),
            SIGNED_IN => Ok(Self::SignedIn),
            NOT_SIGNED_IN => Ok(Self::NotSignedIn),
            SERVICE_CALL => Ok(Self::ServiceCall),
            _ if has_authority_prefix(s) => Ok(Self::HasAuthority(s.to_string())),
            _ => Err(UnknownRequirement(s.to_string())),
        }
    }
}

fn has_authority_prefix(s: &str) -> bool {
    [AUTHORITY_PREFIX, SERVICE_AUTHORITY_PREFIX]
        .iter()
        .any(|prefix| s.len() > prefix.len() && s.starts_with(prefix))
}
