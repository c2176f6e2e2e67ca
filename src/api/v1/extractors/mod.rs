/*
 * Responsibility
 * - v1 handler 用 extractor の公開口
 */
pub mod auth_ctx;
mod request_log;
pub mod validated_json;

pub use auth_ctx::{AuthCtx, AuthCtxExtractor};
pub use validated_json::{Validate, ValidatedJson};
