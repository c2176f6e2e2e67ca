/*
 * Responsibility
 * - Ordered (pattern, method, predicate, metadata) entries, filled once while routes are registered
 * - Resolve an inbound (path, method) to an entry, keeping "path matched" separate from
 *   "method matched" so callers can answer 405 instead of 404
 */
use std::fmt;
use std::str::FromStr;

use axum::http::Method;

use super::metadata::EndpointMetadata;
use super::pattern::UrlPattern;
use crate::services::auth::predicate::AuthorizationPredicate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn from_http(method: &Method) -> Option<Self> {
        match *method {
            Method::GET => Some(Self::Get),
            Method::POST => Some(Self::Post),
            Method::PUT => Some(Self::Put),
            Method::PATCH => Some(Self::Patch),
            Method::DELETE => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("the method {0} is not supported")]
pub struct UnsupportedMethod(pub String);

impl FromStr for HttpMethod {
    type Err = UnsupportedMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            other => Err(UnsupportedMethod(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EndpointAuthorizationEntry {
    pub pattern: UrlPattern,
    pub method: HttpMethod,
    pub predicate: AuthorizationPredicate,
    pub metadata: EndpointMetadata,
}

#[derive(Debug, Clone, Copy)]
pub enum Resolution<'a> {
    Matched(&'a EndpointAuthorizationEntry),
    MethodNotAllowed,
    NotFound,
}

#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    entries: Vec<EndpointAuthorizationEntry>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, pattern: &str, method: HttpMethod, predicate: AuthorizationPredicate) {
        self.register_with(pattern, method, predicate, EndpointMetadata::default());
    }

    pub fn register_with(
        &mut self,
        pattern: &str,
        method: HttpMethod,
        predicate: AuthorizationPredicate,
        metadata: EndpointMetadata,
    ) {
        self.entries.push(EndpointAuthorizationEntry {
            pattern: UrlPattern::parse(pattern),
            method,
            predicate,
            metadata,
        });
    }

    pub fn entries(&self) -> &[EndpointAuthorizationEntry] {
        &self.entries
    }

    /// Returns the first entry matching both path and method, plus whether any entry
    /// matched the path at all (independent of method).
    ///
    /// `method` is `None` for verbs no entry can carry (HEAD, OPTIONS, ...).
    pub fn resolve(
        &self,
        path: &str,
        method: Option<HttpMethod>,
    ) -> (Option<&EndpointAuthorizationEntry>, bool) {
        let mut path_matched = false;

        for entry in &self.entries {
            if !entry.pattern.matches(path) {
                continue;
            }
            path_matched = true;

            if Some(entry.method) == method {
                return (Some(entry), true);
            }
        }

        (None, path_matched)
    }

    pub fn resolution(&self, path: &str, method: &Method) -> Resolution<'_> {
        match self.resolve(path, HttpMethod::from_http(method)) {
            (Some(entry), _) => Resolution::Matched(entry),
            (None, true) => Resolution::MethodNotAllowed,
            (None, false) => Resolution::NotFound,
        }
    }
}
