/*
 * Responsibility
 * - GatewayTrustConfig::check を request ごとに適用する
 * - 拒否した理由は request log にも残す
 */
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::error::ApiError;
use crate::services::request_log::RequestLog;
use crate::state::AppState;

pub async fn gateway_trust(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Err(err) = state.trust.check(req.headers(), &state.verifier) {
        if let Some(log) = req.extensions().get::<RequestLog>() {
            log.warning(format!("Gateway trust check failed: {}", err.message));
        }
        tracing::warn!(
            status = err.status.as_u16(),
            behind_gateway = state.trust.is_behind_gateway,
            "request rejected at the gateway trust boundary"
        );
        return Err(err);
    }

    Ok(next.run(req).await)
}
