//! Outermost request boundary.
//!
//! - creates the [`RequestLog`] for the request and puts it in the extensions
//! - catches panics from everything below and turns them into a 500; the record
//!   gets an exception entry with the panic message and the stack trace
//! - re-renders `ApiError` responses with the request ids and records them
//! - persists the record exactly once (explicitly, or via the drop guard if the
//!   future is cancelled)

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Once;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures::FutureExt;
use serde_json::Value;

use crate::api::envelope::{ApiResponse, ResponseHeader};
use crate::error::ApiError;
use crate::services::request_log::record::SERVICE_LANGUAGE;
use crate::services::request_log::{RequestLog, RequestRecord};
use crate::state::AppState;

pub const PANIC_MESSAGE: &str = "A panic occurred while executing the request.";

thread_local! {
    // Written by the panic hook, read by the boundary that catches the unwind on the same thread.
    static PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static TRACE_HOOK: Once = Once::new();

/// Chain a panic hook that keeps the backtrace of the last panic on this thread.
/// The hook that was installed before keeps running after it.
pub fn install_backtrace_hook() {
    TRACE_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let trace = Backtrace::force_capture().to_string();
            PANIC_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

fn take_backtrace() -> String {
    PANIC_TRACE
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(|| Backtrace::force_capture().to_string())
}

pub async fn request_boundary(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let record = RequestRecord::from_request(req.headers(), req.uri(), &state.trust, &state.service);
    let log = RequestLog::new(record, state.sink.clone());
    let guard = log.persist_guard();

    req.extensions_mut().insert(log.clone());

    let response = match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            let stack_trace = take_backtrace();
            log.error(PANIC_MESSAGE);
            log.exception(
                message.clone(),
                BTreeMap::from([
                    ("format".to_string(), Value::from(format!("{SERVICE_LANGUAGE}: panic"))),
                    ("message".to_string(), Value::from(message.clone())),
                    ("stack_trace".to_string(), Value::from(stack_trace)),
                ]),
            );
            ApiError::unexpected(&message, state.app_env.is_production()).into_response()
        }
    };

    let response = finalize(&log, response);

    if let Err(e) = log.finish() {
        tracing::error!(request_id = log.request_id(), error = %e, "failed to persist request record");
    }
    drop(guard);

    response
}

fn finalize(log: &RequestLog, response: Response) -> Response {
    if let Some(err) = response.extensions().get::<ApiError>().cloned() {
        let err = log.correlate(err);
        log.record_response(&err.envelope());
        return err.into_response();
    }

    // Handlers that answer through `RequestLog::respond` have recorded already.
    if !log.has_response() {
        let status_only: ApiResponse<Value> = ApiResponse {
            header: ResponseHeader {
                body_type: None,
                status_code: response.status().as_u16(),
                code: String::new(),
                message: String::new(),
                request_id: Some(log.raw_request_id()),
                parent_request_id: log.parent_request_id().map(str::to_string),
            },
            body: None,
        };
        log.record_response(&status_only);
    }

    response
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}
