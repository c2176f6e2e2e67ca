/*
 * Responsibility
 * - axum の route 登録と EndpointRegistry への登録を 1 回の呼び出しで行う facade
 *   (片方だけ登録されて 404/405 判定とずれる、を防ぐ)
 * - authority の宣言 (起動時に authentication-service へ登録する分) を集める
 * - 不正な method / requirement は panic ではなく RegistrationError
 */
use axum::Router;
use axum::handler::Handler;
use axum::routing::{MethodRouter, delete, get, patch, post, put};
use uuid::Uuid;

use crate::services::auth::AuthorizationPredicate;
use crate::services::auth::predicate::UnknownRequirement;
use crate::services::client::authority::AuthorityDeclaration;
use crate::services::endpoints::registry::UnsupportedMethod;
use crate::services::endpoints::{EndpointMetadata, EndpointRegistry, HttpMethod, MetadataError, UrlPattern};
use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Method(#[from] UnsupportedMethod),
    #[error(transparent)]
    Requirement(#[from] UnknownRequirement),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error("{method} {pattern} is registered more than once")]
    Duplicate { method: HttpMethod, pattern: String },
    #[error("{pattern}: segment `{segment}` is not supported (only whole-segment `{{name}}` placeholders)")]
    Pattern { pattern: String, segment: String },
    #[error("{pattern}: placeholder `{{{name}}}` conflicts with `{{{existing}}}` in {other}")]
    PlaceholderConflict {
        pattern: String,
        name: String,
        other: String,
        existing: String,
    },
}

#[derive(Default)]
pub struct ServiceRoutes {
    router: Router<AppState>,
    registry: EndpointRegistry,
    authorities: Vec<AuthorityDeclaration>,
}

impl ServiceRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `method pattern`, guarded by `requirement`
    /// (`@allow_all`, `@signed_in`, `@not_signed_in`, `@service_call`,
    /// `authority::…`, `service_authority::…`), with default endpoint metadata.
    pub fn route<H, T>(
        self,
        method: &str,
        pattern: &str,
        requirement: &str,
        handler: H,
    ) -> Result<Self, RegistrationError>
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        self.route_with(method, pattern, requirement, EndpointMetadata::default(), handler)
    }

    pub fn route_with<H, T>(
        mut self,
        method: &str,
        pattern: &str,
        requirement: &str,
        metadata: EndpointMetadata,
        handler: H,
    ) -> Result<Self, RegistrationError>
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        let method: HttpMethod = method.parse()?;
        let predicate: AuthorizationPredicate = requirement.parse()?;

        // axum panics on these; fail registration instead
        self.check_pattern(method, pattern)?;

        self.registry
            .register_with(pattern, method, predicate, metadata);
        self.router = self.router.route(pattern, method_router(method, handler));
        Ok(self)
    }

    fn check_pattern(&self, method: HttpMethod, pattern: &str) -> Result<(), RegistrationError> {
        let parsed = UrlPattern::parse(pattern);

        if !pattern.starts_with('/') {
            return Err(RegistrationError::Pattern {
                pattern: pattern.to_string(),
                segment: pattern.split('/').next().unwrap_or_default().to_string(),
            });
        }
        if let Some(segment) = parsed.unsupported_segment() {
            return Err(RegistrationError::Pattern {
                pattern: pattern.to_string(),
                segment: segment.to_string(),
            });
        }

        for entry in self.registry.entries() {
            if entry.method == method && entry.pattern.as_str() == pattern {
                return Err(RegistrationError::Duplicate {
                    method,
                    pattern: pattern.to_string(),
                });
            }
            if let Some((name, existing)) = parsed.placeholder_conflict(&entry.pattern) {
                return Err(RegistrationError::PlaceholderConflict {
                    pattern: pattern.to_string(),
                    name: name.to_string(),
                    other: entry.pattern.as_str().to_string(),
                    existing: existing.to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn declare_authority(
        mut self,
        uuid: Uuid,
        authority: &str,
        display_name: &str,
        tier: i32,
    ) -> Self {
        self.authorities.push(AuthorityDeclaration {
            uuid,
            authority: authority.to_string(),
            display_name: display_name.to_string(),
            tier,
        });
        self
    }

    /// Mount another set of routes. Registry order follows call order.
    pub fn merge(mut self, other: ServiceRoutes) -> Result<Self, RegistrationError> {
        for entry in other.registry.entries() {
            self.check_pattern(entry.method, entry.pattern.as_str())?;
            self.registry.register_with(
                entry.pattern.as_str(),
                entry.method,
                entry.predicate.clone(),
                entry.metadata.clone(),
            );
        }

        self.router = self.router.merge(other.router);
        self.authorities.extend(other.authorities);
        Ok(self)
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    pub fn authorities(&self) -> &[AuthorityDeclaration] {
        &self.authorities
    }

    pub fn into_parts(self) -> (Router<AppState>, EndpointRegistry, Vec<AuthorityDeclaration>) {
        (self.router, self.registry, self.authorities)
    }
}

fn method_router<H, T>(method: HttpMethod, handler: H) -> MethodRouter<AppState>
where
    H: Handler<T, AppState>,
    T: 'static,
{
    match method {
        HttpMethod::Get => get(handler),
        HttpMethod::Post => post(handler),
        HttpMethod::Put => put(handler),
        HttpMethod::Patch => patch(handler),
        HttpMethod::Delete => delete(handler),
    }
}
