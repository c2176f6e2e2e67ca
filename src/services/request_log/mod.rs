//! Request correlation record handle.
//!
//! One [`RequestLog`] exists per inbound request (or queue operation). Clones share
//! the same record. Log calls append in order and are mirrored to `tracing`.
//! [`RequestLog::finish`] persists the record at most once; [`PersistGuard`] calls it
//! on drop so panics and cancelled futures still produce exactly one record.

pub mod record;
pub mod redact;
pub mod sink;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::api::envelope::{ApiResponse, BodyType, ResponseHeader, body_type_for};
use crate::error::ApiError;

pub use record::{EntryType, LogEntry, LogLevel, RequestRecord, ServiceInfo, now_millis};
pub use redact::{LogObject, Loggable, REDACTION_MARKER};
pub use sink::{FileRecordSink, MemoryRecordSink, RecordSink, SinkError};

struct Inner {
    record: Mutex<RequestRecord>,
    persisted: AtomicBool,
    sink: Arc<dyn RecordSink>,
    request_id: String,
    raw_request_id: Uuid,
    parent_request_id: Option<String>,
}

#[derive(Clone)]
pub struct RequestLog {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RequestLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestLog")
            .field("request_id", &self.inner.request_id)
            .field("parent_request_id", &self.inner.parent_request_id)
            .finish()
    }
}

impl RequestLog {
    pub fn new(record: RequestRecord, sink: Arc<dyn RecordSink>) -> Self {
        let inner = Inner {
            request_id: record.request_identifier.clone(),
            raw_request_id: record.raw_request_id(),
            parent_request_id: record.parent_request_identifier.clone(),
            record: Mutex::new(record),
            persisted: AtomicBool::new(false),
            sink,
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    fn record(&self) -> MutexGuard<'_, RequestRecord> {
        self.inner
            .record
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// `<prefix>_<uuid>`
    pub fn request_id(&self) -> &str {
        &self.inner.request_id
    }

    pub fn raw_request_id(&self) -> Uuid {
        self.inner.raw_request_id
    }

    pub fn parent_request_id(&self) -> Option<&str> {
        self.inner.parent_request_id.as_deref()
    }

    pub fn snapshot(&self) -> RequestRecord {
        self.record().clone()
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message, &[]);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message, &[]);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message, &[]);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message, &[]);
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>, arguments: &[&dyn Loggable]) {
        let entry = LogEntry {
            timestamp: now_millis(),
            level,
            message: message.into(),
            entry_type: EntryType::LogEntry,
            arguments: arguments.iter().map(|a| a.to_log_value()).collect(),
            named_arguments: None,
        };
        self.append(entry);
    }

    /// Exception entry; `details` lands in `named_arguments`.
    pub fn exception(&self, message: impl Into<String>, details: BTreeMap<String, Value>) {
        let entry = LogEntry {
            timestamp: now_millis(),
            level: LogLevel::Exception,
            message: message.into(),
            entry_type: EntryType::ExceptionEntry,
            arguments: Vec::new(),
            named_arguments: Some(details),
        };
        self.append(entry);
    }

    fn append(&self, entry: LogEntry) {
        let request_id = self.request_id();
        let message = entry.message.as_str();

        match entry.level {
            LogLevel::Debug => tracing::debug!(request_id, "{message}"),
            LogLevel::Info => tracing::info!(request_id, "{message}"),
            LogLevel::Warning => tracing::warn!(request_id, "{message}"),
            LogLevel::Error => tracing::error!(request_id, "{message}"),
            LogLevel::Exception => {
                tracing::error!(request_id, details = ?entry.named_arguments, "{message}")
            }
        }

        self.record().log_entries.push(entry);
    }

    /// Handler arguments worth keeping in the record.
    pub fn set_parameters(&self, parameters: &[&dyn Loggable]) {
        self.record().parameters = parameters.iter().map(|p| p.to_log_value()).collect();
    }

    pub fn has_response(&self) -> bool {
        self.record().response.is_some()
    }

    pub fn record_response<T: Serialize>(&self, response: &ApiResponse<T>) {
        match serde_json::to_value(response) {
            Ok(v) => self.record().response = Some(v),
            Err(e) => tracing::error!(request_id = self.request_id(), error = %e, "failed to capture response"),
        }
    }

    fn header(&self, status: StatusCode, body_type: String) -> ResponseHeader {
        ResponseHeader {
            body_type: Some(body_type),
            status_code: status.as_u16(),
            code: String::new(),
            message: String::new(),
            request_id: Some(self.raw_request_id()),
            parent_request_id: self.inner.parent_request_id.clone(),
        }
    }

    /// Success envelope, captured into the record.
    pub fn respond<T: Serialize + BodyType>(&self, status: StatusCode, body: &T) -> Response {
        let body = match serde_json::to_value(body) {
            Ok(v) => v,
            Err(e) => {
                return self
                    .internal_error(format!("Unable to serialize response body: {e}"))
                    .into_response();
            }
        };

        let response = ApiResponse {
            header: self.header(status, body_type_for(&body, T::body_type())),
            body: (!body.is_null()).then_some(body),
        };

        self.record_response(&response);
        (status, Json(response)).into_response()
    }

    pub fn respond_empty(&self, status: StatusCode) -> Response {
        let response: ApiResponse<Value> = ApiResponse {
            header: self.header(status, body_type_for(&Value::Null, "")),
            body: None,
        };

        self.record_response(&response);
        (status, Json(response)).into_response()
    }

    pub fn correlate(&self, err: ApiError) -> ApiError {
        err.correlate(self.raw_request_id(), self.parent_request_id())
    }

    /// Logs `message` and returns a generic 500.
    pub fn internal_error(&self, message: impl Into<String>) -> ApiError {
        self.error(message);
        self.correlate(ApiError::internal(
            "An unexpected error occurred while processing the request, please see logs for more info.",
        ))
    }

    pub fn bad_request(&self, message: impl Into<String>) -> ApiError {
        let message = message.into();
        self.error(message.clone());
        self.correlate(ApiError::bad_request(message))
    }

    pub fn unprocessable(&self, message: impl Into<String>) -> ApiError {
        let message = message.into();
        self.error(message.clone());
        self.correlate(ApiError::unprocessable(message))
    }

    /// Fix the end timestamp and persist. Returns `Ok(false)` if already persisted.
    pub fn finish(&self) -> Result<bool, SinkError> {
        if self.inner.persisted.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }

        let (key, document) = {
            let mut record = self.record();
            record.end_timestamp = now_millis().max(record.start_timestamp);
            (record.storage_key(), serde_json::to_value(record.persisted())?)
        };

        self.inner.sink.persist(&key, &document)?;
        Ok(true)
    }

    pub fn is_finished(&self) -> bool {
        self.inner.persisted.load(Ordering::Acquire)
    }

    pub fn persist_guard(&self) -> PersistGuard {
        PersistGuard(self.clone())
    }
}

/// Persists the record when dropped, unless it already was.
pub struct PersistGuard(RequestLog);

impl Drop for PersistGuard {
    fn drop(&mut self) {
        if let Err(e) = self.0.finish() {
            tracing::error!(request_id = self.0.request_id(), error = %e, "failed to persist request record");
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::ServiceIdentity;

    fn log_with_sink() -> (RequestLog, Arc<MemoryRecordSink>) {
        let sink = Arc::new(MemoryRecordSink::new());
        let record = RequestRecord::for_queue(
            "job",
            Uuid::new_v4(),
            Some("api_parent".into()),
            "emails",
            &ServiceIdentity::default(),
        );
        (RequestLog::new(record, sink.clone()), sink)
    }

    #[test]
    fn entries_keep_insertion_order() {
        let (log, _) = log_with_sink();
        log.info("first");
        log.warning("second");
        log.log(LogLevel::Debug, "third", &[&"arg", &42i64]);

        let entries = log.snapshot().log_entries;
        let messages: Vec<_> = entries.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["first", "second", "third"]);
        assert_eq!(entries[2].arguments, vec![json!("arg"), json!(42)]);
    }

    #[test]
    fn finish_persists_exactly_once() {
        let (log, sink) = log_with_sink();
        {
            let _guard = log.persist_guard();
            assert!(log.finish().unwrap());
            assert!(!log.finish().unwrap());
        }

        let key = format!("job_{}", log.raw_request_id());
        let stored = sink.find(&key);
        assert_eq!(stored.len(), 1);
        assert!(stored[0]["end_timestamp"].as_i64() >= stored[0]["start_timestamp"].as_i64());
    }

    #[test]
    fn guard_persists_when_nothing_else_did() {
        let (log, sink) = log_with_sink();
        drop(log.persist_guard());

        assert!(log.is_finished());
        assert_eq!(sink.records().len(), 1);
    }

    #[test]
    fn error_helpers_log_and_correlate() {
        let (log, _) = log_with_sink();
        let err = log.unprocessable("order is already shipped");

        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.request_id, Some(log.raw_request_id()));
        assert_eq!(err.parent_request_id.as_deref(), Some("api_parent"));

        let entry = log.snapshot().log_entries.pop().unwrap();
        assert_eq!(entry.level, LogLevel::Error);
        assert_eq!(entry.message, "order is already shipped");
    }
}
