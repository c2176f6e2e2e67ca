/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 *   - trust config / verifier / endpoint registry / record sink / outbound client
 * - 起動時に 1 度だけ組み立て、以降は read-only (lazy init しない)
 * - Clone 前提で持つ (内部は Arc/Clone cheap)
 */
use std::sync::Arc;

use crate::config::{AppEnv, ServiceIdentity};
use crate::services::auth::TokenVerifier;
use crate::services::client::ServiceClient;
use crate::services::endpoints::EndpointRegistry;
use crate::services::gateway::GatewayTrustConfig;
use crate::services::request_log::RecordSink;

#[derive(Clone)]
pub struct AppState {
    pub app_env: AppEnv,
    pub service: Arc<ServiceIdentity>,
    pub trust: Arc<GatewayTrustConfig>,
    pub verifier: Arc<TokenVerifier>,
    pub registry: Arc<EndpointRegistry>,
    pub sink: Arc<dyn RecordSink>,
    pub client: Arc<ServiceClient>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("app_env", &self.app_env)
            .field("service", &self.service)
            .field("trust", &self.trust)
            .field("endpoints", &self.registry.entries().len())
            .finish()
    }
}
