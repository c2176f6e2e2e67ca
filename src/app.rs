/*
 * Responsibility
 * - Config読み込み → 依存生成 (keys / verifier / issuer / registry / sink / client) → Router 組み立て
 * - Middleware の適用 (http → request log → gateway trust → authorization)
 * - production では宣言した authority を authentication-service に登録してから起動
 * - axum::serve() で起動
 */
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::routing::{RegistrationError, ServiceRoutes};
use crate::config::{Config, ConfigError};
use crate::services::auth::{KeyError, build_auth};
use crate::services::client::authority::{AuthorityDeclaration, AuthorityRegistrationError, register_all};
use crate::services::client::{ClientMode, ReqwestTransport, ServiceClient, TransportError};
use crate::services::endpoints::EndpointRegistry;
use crate::services::gateway::GatewayTrustConfig;
use crate::services::request_log::{FileRecordSink, RecordSink, SinkError};
use crate::{api, middleware, state::AppState};

#[derive(Debug, thiserror::Error)]
pub enum BootError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Keys(#[from] KeyError),
    #[error(transparent)]
    Routes(#[from] RegistrationError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("service authorities are declared but DISCOVERY_SERVER_URL is not set")]
    MissingDiscoveryServer,
    #[error(transparent)]
    Authorities(#[from] AuthorityRegistrationError),
}

pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));

    // try_init: tests may call this more than once
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Panics are recovered by the request boundary; the hook only makes sure they reach the log.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();
        tracing::error!(panic = %info, location = %location, "panic");
    }));
}

pub fn build_state(
    config: &Config,
    registry: EndpointRegistry,
    sink: Arc<dyn RecordSink>,
) -> Result<AppState, BootError> {
    let (verifier, issuer) = build_auth(config)?;

    let transport = Arc::new(ReqwestTransport::new(config.outbound_timeout)?);
    let client = ServiceClient::new(
        transport,
        issuer,
        config.service.clone(),
        ClientMode::Internal,
    );

    Ok(AppState {
        app_env: config.app_env,
        service: Arc::new(config.service.clone()),
        trust: Arc::new(GatewayTrustConfig::new(
            config.is_behind_gateway,
            config.request_id_prefix.clone(),
        )),
        verifier,
        registry: Arc::new(registry),
        sink,
        client: Arc::new(client),
    })
}

pub fn build_router(routes: Router<AppState>, state: AppState) -> Router {
    let router = middleware::apply(routes, state.clone()).with_state(state);
    middleware::http::apply(router)
}

/// production: 宣言された authority を登録 (失敗したら起動しない)
/// それ以外: 一覧をログに出すだけ
pub async fn register_authorities(
    config: &Config,
    state: &AppState,
    declarations: &[AuthorityDeclaration],
) -> Result<(), BootError> {
    if !config.app_env.is_production() {
        for d in declarations {
            tracing::info!(authority = %d.authority, tier = d.tier, "service authority declared");
        }
        return Ok(());
    }

    if declarations.is_empty() {
        return Ok(());
    }

    let discovery = config
        .discovery_server_url
        .as_deref()
        .ok_or(BootError::MissingDiscoveryServer)?;

    let n = register_all(&state.client, discovery, declarations).await?;
    tracing::info!(count = n, "service authorities registered");
    Ok(())
}

pub fn service_routes() -> Result<ServiceRoutes, RegistrationError> {
    api::v1::routes()
}

pub async fn run() -> Result<()> {
    init_tracing();
    install_panic_hook();

    let config = Config::from_env()?;
    tracing::info!(
        service = %config.service.name,
        version = %config.service.version,
        hash = %config.service.version_hash,
        app_env = config.app_env.as_str(),
        behind_gateway = config.is_behind_gateway,
        "launching service"
    );

    let (routes, registry, declarations) = service_routes()?.into_parts();
    let sink: Arc<dyn RecordSink> = Arc::new(FileRecordSink::new(&config.observability_path)?);
    let state = build_state(&config, registry, sink)?;

    register_authorities(&config, &state, &declarations).await?;

    let app = build_router(routes, state);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %config.addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
