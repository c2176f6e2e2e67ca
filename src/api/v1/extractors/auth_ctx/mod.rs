/*!
 * Caller context extractor
 *
 * - authorization middleware が残した AuthCtx (検証済み token + credential の有無) を handler に渡す
 * - 型は types、axum 依存の extractor は core
 */

mod core;
mod types;

pub use core::AuthCtxExtractor;
pub use types::AuthCtx;
