pub mod metadata;
pub mod pattern;
pub mod registry;

pub use metadata::{EndpointMetadata, MetadataError, RateLimitPolicy};
pub use pattern::UrlPattern;
pub use registry::{EndpointAuthorizationEntry, EndpointRegistry, HttpMethod, Resolution};
