mod common;

use axum::body::Body;
use axum::http::StatusCode;
use common::{Options, app_with, get, record_for, send};
use convergence_guard::api::routing::ServiceRoutes;

async fn boom() -> StatusCode {
    panic!("inventory lookup exploded")
}

fn with_boom(routes: ServiceRoutes) -> ServiceRoutes {
    routes.route("GET", "/boom", "@allow_all", boom).unwrap()
}

#[tokio::test]
async fn panic_becomes_500_and_one_record() {
    let app = app_with(Options::default(), with_boom);

    let (status, body, _) = send(&app, get("/boom").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["header"]["code"], "err_api_internal_error");
    assert_eq!(body["header"]["body_type"], "api_failure");
    assert_eq!(body["header"]["message"], "inventory lookup exploded");
    assert!(body["header"]["request_id"].is_string());

    let record = record_for(&app, &body);
    assert_eq!(app.sink.records().len(), 1);

    let entries = record["log_entries"].as_array().unwrap();
    let exception = entries
        .iter()
        .find(|e| e["type"] == "exception_entry")
        .expect("exception entry");
    assert_eq!(exception["level"], "exception");
    assert_eq!(exception["named_arguments"]["message"], "inventory lookup exploded");
    assert_eq!(exception["named_arguments"]["format"], "rust: panic");
    let trace = exception["named_arguments"]["stack_trace"]
        .as_str()
        .expect("stack trace");
    assert!(!trace.trim().is_empty());

    assert_eq!(record["response"]["header"]["status_code"], 500);
    assert!(record["end_timestamp"].as_i64().unwrap() >= record["start_timestamp"].as_i64().unwrap());
}

#[tokio::test]
async fn production_hides_panic_detail() {
    let app = app_with(
        Options {
            production: true,
            ..Options::default()
        },
        with_boom,
    );

    let (status, body, _) = send(&app, get("/boom").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body["header"]["message"],
        "An unexpected error happened during API execution"
    );

    // the record keeps the real cause
    let record = record_for(&app, &body);
    let logged = serde_json::to_string(&record["log_entries"]).unwrap();
    assert!(logged.contains("inventory lookup exploded"));
}

#[tokio::test]
async fn service_keeps_serving_after_a_panic() {
    let app = app_with(Options::default(), with_boom);

    let _ = send(&app, get("/boom").body(Body::empty()).unwrap()).await;
    let (status, _, _) = send(&app, get("/service/health").body(Body::empty()).unwrap()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.sink.records().len(), 2);
}
