/*
 * Responsibility
 * - 1 リクエスト (or queue operation) 分の correlation record
 * - request id の決定 (gateway mode: header の UUID / direct mode: 新規採番)
 * - header の正規化 (lower-case, reserved header 除去, Authorization の署名部分を伏せる)
 */
use std::collections::BTreeMap;

use axum::http::{HeaderMap, Uri, header};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::redact::redact_bearer;
use crate::config::ServiceIdentity;
use crate::services::gateway::{
    CALLER_SERVICE_HASH_HEADER, CALLER_SERVICE_HEADER, CALLER_SERVICE_VERSION_HEADER,
    GatewayTrustConfig, PARENT_REQUEST_ID_HEADER, REQUEST_ID_HEADER, RESERVED_HEADERS,
};

pub const SERVICE_LANGUAGE: &str = "rust";
pub const TEMPLATE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    #[serde(rename = "hash")]
    pub version_hash: String,
}

impl From<&ServiceIdentity> for ServiceInfo {
    fn from(s: &ServiceIdentity) -> Self {
        Self {
            name: s.name.clone(),
            version: s.version.clone(),
            version_hash: s.version_hash.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Exception,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    LogEntry,
    ExceptionEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub timestamp: i64,
    pub level: LogLevel,
    pub message: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub arguments: Vec<Value>,
    pub named_arguments: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestRecord {
    pub request_identifier: String,
    pub parent_request_identifier: Option<String>,
    pub caller_service: Option<ServiceInfo>,
    pub receiver_service: Option<ServiceInfo>,
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    pub headers: BTreeMap<String, String>,
    pub url: String,
    pub parameters: Vec<Value>,
    pub log_entries: Vec<LogEntry>,
    pub response: Option<Value>,

    #[serde(skip)]
    raw_request_id: Uuid,
    #[serde(skip)]
    prefix: String,
}

/// What actually gets written: the record plus two fixed metadata tags.
#[derive(Debug, Serialize)]
pub struct PersistedRecord<'a> {
    #[serde(flatten)]
    pub record: &'a RequestRecord,
    pub service_language: &'static str,
    pub template_version: &'static str,
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn format_request_id(prefix: &str, id: &Uuid) -> String {
    format!("{}_{}", prefix.to_lowercase(), id)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// First value of every header, keyed by lower-cased name.
fn normalize_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();

    for (name, value) in headers {
        let key = name.as_str().to_ascii_lowercase();
        if out.contains_key(&key) {
            continue;
        }
        out.insert(key, String::from_utf8_lossy(value.as_bytes()).into_owned());
    }

    for reserved in RESERVED_HEADERS {
        out.remove(reserved);
    }

    if let Some(auth) = out.get_mut(header::AUTHORIZATION.as_str()) {
        *auth = redact_bearer(auth);
    }

    out
}

impl RequestRecord {
    /// Record for an inbound HTTP request.
    ///
    /// Behind a gateway the request id header is trusted; otherwise (or when it is
    /// missing / not a UUID) a fresh id is minted. Rejecting forged headers is the
    /// gateway filter's job, not this constructor's.
    pub fn from_request(
        headers: &HeaderMap,
        uri: &Uri,
        trust: &GatewayTrustConfig,
        receiver: &ServiceIdentity,
    ) -> Self {
        let raw_request_id = trust
            .is_behind_gateway
            .then(|| header_str(headers, REQUEST_ID_HEADER))
            .flatten()
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .unwrap_or_else(Uuid::new_v4);

        let caller = ServiceInfo {
            name: header_str(headers, CALLER_SERVICE_HEADER)
                .unwrap_or_default()
                .to_string(),
            version: header_str(headers, CALLER_SERVICE_VERSION_HEADER)
                .unwrap_or_default()
                .to_string(),
            version_hash: header_str(headers, CALLER_SERVICE_HASH_HEADER)
                .unwrap_or_default()
                .to_string(),
        };

        let url = uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| uri.path().to_string());

        Self {
            request_identifier: format_request_id(&trust.request_id_prefix, &raw_request_id),
            parent_request_identifier: header_str(headers, PARENT_REQUEST_ID_HEADER)
                .map(str::to_string),
            caller_service: Some(caller),
            receiver_service: Some(ServiceInfo::from(receiver)),
            start_timestamp: now_millis(),
            end_timestamp: 0,
            headers: normalize_headers(headers),
            url,
            parameters: Vec::new(),
            log_entries: Vec::new(),
            response: None,
            raw_request_id,
            prefix: trust.request_id_prefix.clone(),
        }
    }

    /// Record for one operation pulled off a processing queue.
    pub fn for_queue(
        prefix: &str,
        request_id: Uuid,
        parent_request_id: Option<String>,
        queue_name: &str,
        service: &ServiceIdentity,
    ) -> Self {
        let queue = ServiceInfo {
            name: queue_name.to_string(),
            version: service.version.clone(),
            version_hash: service.version_hash.clone(),
        };

        Self {
            request_identifier: format_request_id(prefix, &request_id),
            parent_request_identifier: parent_request_id,
            caller_service: Some(ServiceInfo::from(service)),
            receiver_service: Some(queue),
            start_timestamp: now_millis(),
            end_timestamp: 0,
            headers: BTreeMap::new(),
            url: String::new(),
            parameters: Vec::new(),
            log_entries: Vec::new(),
            response: None,
            raw_request_id: request_id,
            prefix: prefix.to_string(),
        }
    }

    pub fn raw_request_id(&self) -> Uuid {
        self.raw_request_id
    }

    /// Storage key, `<lower(prefix)>_<uuid>`.
    pub fn storage_key(&self) -> String {
        format_request_id(&self.prefix, &self.raw_request_id)
    }

    pub fn persisted(&self) -> PersistedRecord<'_> {
        PersistedRecord {
            record: self,
            service_language: SERVICE_LANGUAGE,
            template_version: TEMPLATE_VERSION,
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn identity() -> ServiceIdentity {
        ServiceIdentity {
            name: "orders".into(),
            version: "1.2.0".into(),
            version_hash: "abc123".into(),
        }
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.append(*k, HeaderValue::from_str(v).unwrap());
        }
        h
    }

    #[test]
    fn gateway_mode_trusts_the_inbound_request_id() {
        let id = Uuid::new_v4();
        let trust = GatewayTrustConfig::new(true, "ORD");
        let h = headers(&[
            (REQUEST_ID_HEADER, &id.to_string()),
            (CALLER_SERVICE_HEADER, "billing"),
            (CALLER_SERVICE_VERSION_HEADER, "3.0.1"),
            (CALLER_SERVICE_HASH_HEADER, "f00d"),
            (PARENT_REQUEST_ID_HEADER, "bil_parent"),
        ]);

        let r = RequestRecord::from_request(&h, &"/orders/1?x=2".parse().unwrap(), &trust, &identity());

        assert_eq!(r.raw_request_id(), id);
        assert_eq!(r.request_identifier, format!("ord_{id}"));
        assert_eq!(r.parent_request_identifier.as_deref(), Some("bil_parent"));
        assert_eq!(r.caller_service.as_ref().map(|c| c.name.as_str()), Some("billing"));
        assert_eq!(r.url, "/orders/1?x=2");
        // reserved headers never reach the stored header map
        assert!(r.headers.keys().all(|k| !k.starts_with("x-convergence-")));
    }

    #[test]
    fn direct_mode_mints_a_fresh_id() {
        let supplied = Uuid::new_v4();
        let trust = GatewayTrustConfig::new(false, "ord");
        let h = headers(&[(REQUEST_ID_HEADER, &supplied.to_string())]);

        let r = RequestRecord::from_request(&h, &"/".parse().unwrap(), &trust, &identity());
        assert_ne!(r.raw_request_id(), supplied);
        assert!(r.request_identifier.starts_with("ord_"));
    }

    #[test]
    fn headers_are_lowercased_first_value_and_redacted() {
        let trust = GatewayTrustConfig::new(false, "ord");
        let h = headers(&[
            ("accept", "application/json"),
            ("accept", "text/plain"),
            ("authorization", "Bearer abc.def.ghi"),
        ]);

        let r = RequestRecord::from_request(&h, &"/".parse().unwrap(), &trust, &identity());
        assert_eq!(r.headers["accept"], "application/json");
        assert_eq!(r.headers["authorization"], "Bearer abc.def.***********");
    }

    #[test]
    fn persisted_form_carries_metadata_tags() {
        let r = RequestRecord::for_queue("Q", Uuid::new_v4(), None, "invoice-queue", &identity());
        let v = serde_json::to_value(r.persisted()).unwrap();

        assert_eq!(v["service_language"], "rust");
        assert_eq!(v["template_version"], TEMPLATE_VERSION);
        assert_eq!(v["receiver_service"]["name"], "invoice-queue");
        assert_eq!(v["caller_service"]["hash"], "abc123");
        assert!(v.get("raw_request_id").is_none());
        assert!(r.storage_key().starts_with("q_"));
    }
}
