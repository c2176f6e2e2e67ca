pub mod claims;
pub mod factory;
pub mod issuer;
pub mod keys;
pub mod predicate;
pub mod verifier;

pub use claims::{ClaimsDecodeError, ServiceClaims};
pub use factory::build_auth;
pub use issuer::{IssueError, TokenIssuer};
pub use keys::{KeyError, ServiceKeys};
pub use predicate::{AuthorizationPredicate, Decision};
pub use verifier::{TokenVerifier, VerificationFailure, VerifiedToken};
