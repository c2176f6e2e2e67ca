#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use convergence_guard::api::routing::ServiceRoutes;
use convergence_guard::app::{build_router, build_state};
use convergence_guard::config::{AppEnv, Config, ServiceIdentity};
use convergence_guard::services::auth::{ServiceKeys, TokenIssuer};
use convergence_guard::services::request_log::MemoryRecordSink;
use serde_json::Value;
use tower::ServiceExt;

pub const PREFIX: &str = "grd";

pub struct TestApp {
    pub router: Router,
    pub sink: Arc<MemoryRecordSink>,
    /// Signs with the service's own key.
    pub issuer: TokenIssuer,
    /// Signs with an unrelated key.
    pub foreign: TokenIssuer,
}

#[derive(Default)]
pub struct Options {
    pub behind_gateway: bool,
    pub production: bool,
}

fn config(opts: &Options, pem: String) -> Config {
    Config {
        addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        app_env: if opts.production {
            AppEnv::Production
        } else {
            AppEnv::Development
        },
        service: ServiceIdentity {
            name: "guard-test".into(),
            version: "0.1.0".into(),
            version_hash: "testhash".into(),
        },
        is_behind_gateway: opts.behind_gateway,
        accept_api_key_scheme: false,
        request_id_prefix: PREFIX.into(),
        signing_key_pem: pem,
        observability_path: PathBuf::from("./unused"),
        discovery_server_url: None,
        outbound_timeout: Duration::from_secs(1),
    }
}

pub fn app(opts: Options) -> TestApp {
    app_with(opts, |routes| routes)
}

/// Service routes plus whatever `extra` adds (test-only handlers).
pub fn app_with(opts: Options, extra: impl FnOnce(ServiceRoutes) -> ServiceRoutes) -> TestApp {
    let (keys, pem) = ServiceKeys::generate().unwrap();
    let (foreign_keys, _) = ServiceKeys::generate().unwrap();

    let routes = extra(convergence_guard::app::service_routes().unwrap());
    let (routes, registry, _) = routes.into_parts();

    let sink = Arc::new(MemoryRecordSink::new());
    let state = build_state(&config(&opts, pem), registry, sink.clone()).unwrap();

    TestApp {
        router: build_router(routes, state),
        sink,
        issuer: TokenIssuer::new("caller-svc", Arc::new(keys)),
        foreign: TokenIssuer::new("caller-svc", Arc::new(foreign_keys)),
    }
}

pub async fn send(app: &TestApp, req: Request<Body>) -> (StatusCode, Value, Response<Body>) {
    let res = app.router.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let (parts, body) = res.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json, Response::from_parts(parts, Body::empty()))
}

pub fn get(path: &str) -> axum::http::request::Builder {
    Request::builder().method("GET").uri(path)
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// The single persisted record of the request, looked up by the id in the response.
pub fn record_for(app: &TestApp, body: &Value) -> Value {
    let raw = body["header"]["request_id"].as_str().unwrap();
    let mut found = app.sink.find(&format!("{PREFIX}_{raw}"));
    assert_eq!(found.len(), 1, "expected exactly one persisted record");
    found.remove(0)
}
