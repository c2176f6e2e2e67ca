/*
 * Responsibility
 * - middleware の公開インターフェース
 * - 適用順 (外側 → 内側): http → request_log boundary → gateway trust → authorization → handler
 */
pub mod authorization;
pub mod gateway;
pub mod http;
pub mod request_log;

use axum::{Router, http::Uri, middleware};

use crate::error::ApiError;
use crate::state::AppState;

/// Wrap the service routes with the trust / authorization / correlation stack.
pub fn apply(router: Router<AppState>, state: AppState) -> Router<AppState> {
    request_log::install_backtrace_hook();

    // axum 0.8 の from_fn は State extractor を受け取れないため、`from_fn_with_state` で明示的に state を渡す
    // fallback も layer の内側に置く (unknown path も record / 404 envelope を通す)
    router
        .fallback(unmatched)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            authorization::authorize,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            gateway::gateway_trust,
        ))
        .layer(middleware::from_fn_with_state(
            state,
            request_log::request_boundary,
        ))
}

async fn unmatched(uri: Uri) -> ApiError {
    ApiError::not_found(uri.path())
}
