/*
 * Responsibility
 * - 他サービスへの outbound 呼び出し (JSON POST/PUT/PATCH/DELETE)
 * - authority mode に応じた JWT の発行 (呼び出しごとに発行、キャッシュしない)
 * - Internal mode: correlation header (新しい request id + parent) の付与
 * - post_with_authority: 期待 status が返るまで最大 10 回 / 500ms 間隔で retry
 *   transport error は呼び出し元に漏らさず、合成した 500 に畳む
 */
pub mod authority;
pub mod discovery;
pub mod transport;

use std::convert::Infallible;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::api::envelope::{ApiResponse, BODY_API_FAILURE, BODY_FAILURE_INFO, NO_RESPONSE_STATUS};
use crate::config::ServiceIdentity;
use crate::error::codes;
use crate::services::auth::predicate::{ALLOW_ALL, NOT_SIGNED_IN, SERVICE_CALL, SIGNED_IN};
use crate::services::auth::{IssueError, TokenIssuer};
use crate::services::gateway::{
    CALLER_SERVICE_HASH_HEADER, CALLER_SERVICE_HEADER, CALLER_SERVICE_VERSION_HEADER,
    PARENT_REQUEST_ID_HEADER, REQUEST_ID_HEADER,
};
use crate::services::request_log::RequestLog;

pub use transport::{
    HttpTransport, OutboundRequest, OutboundResponse, ReqwestTransport, TransportError,
};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(500);

/// Which credential an outbound call carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorityMode {
    /// `@allow_all` / `@not_signed_in`: no `Authorization` header at all.
    Anonymous,
    SignedIn,
    ServiceCall,
    Authority(String),
}

impl FromStr for AuthorityMode {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            ALLOW_ALL | NOT_SIGNED_IN => Self::Anonymous,
            SIGNED_IN => Self::SignedIn,
            SERVICE_CALL => Self::ServiceCall,
            other => Self::Authority(other.to_string()),
        })
    }
}

impl AuthorityMode {
    /// Mint the bearer token for this mode; `None` for anonymous calls.
    pub fn token(&self, issuer: &TokenIssuer) -> Result<Option<String>, IssueError> {
        let token = match self {
            Self::Anonymous => return Ok(None),
            Self::SignedIn => issuer.mint(None, false)?,
            Self::ServiceCall => issuer.mint(None, true)?,
            Self::Authority(name) => issuer.mint(Some(name), false)?,
        };
        Ok(Some(token))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMode {
    /// Fleet-internal target: correlation headers are forwarded.
    Internal,
    External,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

#[derive(Clone)]
pub struct ServiceClient {
    transport: Arc<dyn HttpTransport>,
    issuer: Arc<TokenIssuer>,
    caller: ServiceIdentity,
    mode: ClientMode,
    retry: RetryPolicy,
}

impl std::fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("caller", &self.caller.name)
            .field("mode", &self.mode)
            .field("retry", &self.retry)
            .finish()
    }
}

impl ServiceClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        issuer: Arc<TokenIssuer>,
        caller: ServiceIdentity,
        mode: ClientMode,
    ) -> Self {
        Self {
            transport,
            issuer,
            caller,
            mode,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn mode(&self) -> ClientMode {
        self.mode
    }

    fn headers(&self, token: Option<&str>, log: Option<&RequestLog>) -> HeaderMap {
        let mut headers = transport::json_headers();

        if let Some(value) = token.and_then(|t| HeaderValue::from_str(&format!("Bearer {t}")).ok()) {
            headers.insert(header::AUTHORIZATION, value);
        }

        if self.mode == ClientMode::Internal {
            let pairs = [
                (REQUEST_ID_HEADER, Uuid::new_v4().to_string()),
                (
                    PARENT_REQUEST_ID_HEADER,
                    log.map(|l| l.request_id().to_string()).unwrap_or_default(),
                ),
                (CALLER_SERVICE_HEADER, self.caller.name.clone()),
                (CALLER_SERVICE_HASH_HEADER, self.caller.version_hash.clone()),
                (CALLER_SERVICE_VERSION_HEADER, self.caller.version.clone()),
            ];

            for (name, value) in pairs {
                if value.is_empty() {
                    continue;
                }
                if let Ok(v) = HeaderValue::from_str(&value) {
                    headers.insert(name, v);
                }
            }
        }

        headers
    }

    /// One request, no retry. Never fails: transport and parse problems come back
    /// as a failure envelope.
    pub async fn call<B: Serialize + ?Sized>(
        &self,
        method: Method,
        base_url: &str,
        path: &str,
        payload: &B,
        authority: &AuthorityMode,
        log: Option<&RequestLog>,
    ) -> ApiResponse<Value> {
        let token = match authority.token(&self.issuer) {
            Ok(t) => t,
            Err(e) => return connection_failure(e),
        };

        let body = match serde_json::to_vec(payload) {
            Ok(b) => b,
            Err(e) => return connection_failure(e),
        };

        self.send_once(method, format!("{base_url}{path}"), token.as_deref(), body, log)
            .await
            .unwrap_or_else(|failure| failure)
    }

    async fn send_once(
        &self,
        method: Method,
        url: String,
        token: Option<&str>,
        body: Vec<u8>,
        log: Option<&RequestLog>,
    ) -> Result<ApiResponse<Value>, ApiResponse<Value>> {
        let request = OutboundRequest {
            method,
            url,
            headers: self.headers(token, log),
            body,
        };

        match self.transport.send(request).await {
            Ok(response) => parse_response(&response),
            Err(e) => Err(connection_failure(e)),
        }
    }

    /// POST until the service answers `expected`, at most `max_attempts` times.
    ///
    /// The token is minted once for the whole retry loop. When the attempts run
    /// out the result is a synthetic 500, whatever the last attempt returned.
    pub async fn post_with_authority<B, T>(
        &self,
        host: &str,
        path: &str,
        payload: &B,
        authority: &AuthorityMode,
        expected: StatusCode,
        log: Option<&RequestLog>,
    ) -> ApiResponse<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{host}{path}");
        let token = match authority.token(&self.issuer) {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(error = %e, url = %url, "failed to mint outbound token");
                return retries_exhausted(self.retry.max_attempts);
            }
        };
        let body = match serde_json::to_vec(payload) {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(error = %e, url = %url, "failed to serialize outbound payload");
                return retries_exhausted(self.retry.max_attempts);
            }
        };

        for attempt in 1..=self.retry.max_attempts {
            let response = match self
                .send_once(Method::POST, url.clone(), token.as_deref(), body.clone(), log)
                .await
            {
                Ok(response) => response,
                Err(failure) => {
                    // no usable envelope, whatever the HTTP status was
                    tracing::warn!(
                        url = %url,
                        attempt,
                        status = failure.header.status_code,
                        code = %failure.header.code,
                        "outbound call failed"
                    );
                    if attempt < self.retry.max_attempts {
                        tokio::time::sleep(self.retry.backoff).await;
                    }
                    continue;
                }
            };

            if response.header.status_code == expected.as_u16() {
                match response.into_typed::<T>() {
                    Ok(typed) => return typed,
                    Err(e) => {
                        tracing::warn!(error = %e, url = %url, attempt, "response body did not match the expected type");
                    }
                }
            } else {
                tracing::warn!(
                    url = %url,
                    attempt,
                    status = response.header.status_code,
                    code = %response.header.code,
                    "outbound call did not return the expected status"
                );
            }

            if attempt < self.retry.max_attempts {
                tokio::time::sleep(self.retry.backoff).await;
            }
        }

        if let Some(log) = log {
            log.error(format!("Unable to reach {url} after {} attempts.", self.retry.max_attempts));
        }
        retries_exhausted(self.retry.max_attempts)
    }
}

fn connection_failure(e: impl std::fmt::Display) -> ApiResponse<Value> {
    ApiResponse::failure(
        NO_RESPONSE_STATUS,
        codes::CONNECTION_FAILURE,
        e.to_string(),
        BODY_API_FAILURE,
    )
}

/// `Err` carries a locally built failure envelope (status of the HTTP response).
fn parse_response(response: &OutboundResponse) -> Result<ApiResponse<Value>, ApiResponse<Value>> {
    serde_json::from_slice::<ApiResponse<Value>>(&response.body).map_err(|e| {
        ApiResponse::failure(
            response.status.as_u16(),
            codes::UNABLE_PARSE_SERVICE_RESPONSE,
            format!("The response got from the service is not valid JSON and can not be parsed: {e}"),
            BODY_API_FAILURE,
        )
    })
}

fn retries_exhausted<T>(attempts: u32) -> ApiResponse<T> {
    ApiResponse::failure(
        StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
        codes::API_INTERNAL_ERROR,
        format!("Unable to connect to the service after {attempts} attempts."),
        BODY_FAILURE_INFO,
    )
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    /// Replays scripted results; once the script runs out the last entry repeats.
    pub struct ScriptedTransport {
        script: Mutex<VecDeque<Result<OutboundResponse, TransportError>>>,
        last: Mutex<Option<OutboundResponse>>,
        pub seen: Mutex<Vec<(OutboundRequest, tokio::time::Instant)>>,
    }

    impl ScriptedTransport {
        pub fn new(script: Vec<Result<OutboundResponse, TransportError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                last: Mutex::new(None),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub fn requests(&self) -> Vec<OutboundRequest> {
            self.seen.lock().unwrap().iter().map(|(r, _)| r.clone()).collect()
        }

        pub fn instants(&self) -> Vec<tokio::time::Instant> {
            self.seen.lock().unwrap().iter().map(|(_, t)| *t).collect()
        }
    }

    pub fn json_response(status: StatusCode, body: Value) -> Result<OutboundResponse, TransportError> {
        Ok(OutboundResponse {
            status,
            body: serde_json::to_vec(&body).unwrap(),
        })
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn send(&self, request: OutboundRequest) -> Result<OutboundResponse, TransportError> {
            self.seen
                .lock()
                .unwrap()
                .push((request, tokio::time::Instant::now()));

            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Ok(resp)) => {
                    *self.last.lock().unwrap() = Some(resp.clone());
                    Ok(resp)
                }
                Some(Err(e)) => Err(e),
                None => match self.last.lock().unwrap().clone() {
                    Some(resp) => Ok(resp),
                    None => Err(TransportError::Connect("connection refused".into())),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::testing::{ScriptedTransport, json_response};
    use super::*;
    use crate::api::envelope::AtomicValue;
    use crate::services::auth::{ServiceKeys, TokenVerifier};
    use crate::services::request_log::{MemoryRecordSink, RequestRecord};

    fn identity() -> ServiceIdentity {
        ServiceIdentity {
            name: "orders".into(),
            version: "1.2.0".into(),
            version_hash: "abc123".into(),
        }
    }

    fn client(transport: Arc<ScriptedTransport>, mode: ClientMode) -> (ServiceClient, TokenVerifier) {
        let (keys, _) = ServiceKeys::generate().unwrap();
        let keys = Arc::new(keys);
        let issuer = Arc::new(TokenIssuer::new("orders", keys.clone()));
        (
            ServiceClient::new(transport, issuer, identity(), mode),
            TokenVerifier::new(keys, false),
        )
    }

    fn ok_envelope(value: bool) -> Value {
        json!({
            "header": {"body_type": "atomic_value", "status_code": 200, "code": "", "message": ""},
            "body": {"value": value}
        })
    }

    #[test]
    fn authority_mode_from_requirement_strings() {
        assert_eq!("@allow_all".parse::<AuthorityMode>(), Ok(AuthorityMode::Anonymous));
        assert_eq!("@not_signed_in".parse::<AuthorityMode>(), Ok(AuthorityMode::Anonymous));
        assert_eq!("@signed_in".parse::<AuthorityMode>(), Ok(AuthorityMode::SignedIn));
        assert_eq!("@service_call".parse::<AuthorityMode>(), Ok(AuthorityMode::ServiceCall));
        assert_eq!(
            "authority::orders.read".parse::<AuthorityMode>(),
            Ok(AuthorityMode::Authority("authority::orders.read".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_ten_attempts_with_synthetic_500() {
        let transport = Arc::new(ScriptedTransport::new(vec![Err(TransportError::Connect(
            "connection refused".into(),
        ))]));
        let (client, _) = client(transport.clone(), ClientMode::External);

        let started = tokio::time::Instant::now();
        let response: ApiResponse<AtomicValue<bool>> = client
            .post_with_authority(
                "http://auth.local",
                "/x",
                &json!({}),
                &AuthorityMode::ServiceCall,
                StatusCode::OK,
                None,
            )
            .await;

        assert_eq!(response.header.status_code, 500);
        assert_eq!(response.header.code, codes::API_INTERNAL_ERROR);
        assert_eq!(response.header.body_type.as_deref(), Some("failure_info"));
        assert!(response.body.is_none());

        let instants = transport.instants();
        assert_eq!(instants.len(), 10);
        for pair in instants.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(500));
        }
        assert!(started.elapsed() >= Duration::from_millis(4500));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_the_expected_status_arrives() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            json_response(
                StatusCode::SERVICE_UNAVAILABLE,
                json!({"header": {"body_type": "api_failure", "status_code": 503, "code": "x", "message": "down"}}),
            ),
            Err(TransportError::Timeout),
            json_response(StatusCode::OK, ok_envelope(true)),
        ]));
        let (client, verifier) = client(transport.clone(), ClientMode::External);

        let response: ApiResponse<AtomicValue<bool>> = client
            .post_with_authority(
                "http://auth.local",
                "/register",
                &json!({"a": 1}),
                &AuthorityMode::ServiceCall,
                StatusCode::OK,
                None,
            )
            .await;

        assert!(response.is_successful());
        assert_eq!(response.body, Some(AtomicValue { value: true }));

        let requests = transport.requests();
        assert_eq!(requests.len(), 3);

        // one token for the whole loop
        let auth: Vec<_> = requests
            .iter()
            .map(|r| r.headers[header::AUTHORIZATION].to_str().unwrap().to_string())
            .collect();
        assert!(auth.windows(2).all(|w| w[0] == w[1]));

        let token = verifier.verify(&auth[0]).unwrap();
        assert!(token.is_inter_service_call);
        assert_eq!(token.subject, "orders");
        assert_eq!(requests[0].url, "http://auth.local/register");
        assert_eq!(requests[0].headers[header::CONTENT_TYPE], "application/json");
    }

    #[tokio::test(start_paused = true)]
    async fn unparseable_success_is_retried_not_returned() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(OutboundResponse {
            status: StatusCode::OK,
            body: b"OK".to_vec(),
        })]));
        let (client, _) = client(transport.clone(), ClientMode::External);

        let response: ApiResponse<AtomicValue<bool>> = client
            .post_with_authority(
                "http://auth.local",
                "/register",
                &json!({}),
                &AuthorityMode::ServiceCall,
                StatusCode::OK,
                None,
            )
            .await;

        assert_eq!(transport.requests().len(), 10);
        assert!(!response.is_successful());
        assert_eq!(response.header.status_code, 500);
        assert_eq!(response.header.code, codes::API_INTERNAL_ERROR);
    }

    #[tokio::test(start_paused = true)]
    async fn unparseable_success_then_real_envelope() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(OutboundResponse {
                status: StatusCode::OK,
                body: b"<html>maintenance</html>".to_vec(),
            }),
            json_response(StatusCode::OK, ok_envelope(true)),
        ]));
        let (client, _) = client(transport.clone(), ClientMode::External);

        let response: ApiResponse<AtomicValue<bool>> = client
            .post_with_authority(
                "http://auth.local",
                "/register",
                &json!({}),
                &AuthorityMode::ServiceCall,
                StatusCode::OK,
                None,
            )
            .await;

        assert_eq!(transport.requests().len(), 2);
        assert_eq!(response.body, Some(AtomicValue { value: true }));
    }

    #[tokio::test]
    async fn anonymous_calls_carry_no_authorization() {
        let transport = Arc::new(ScriptedTransport::new(vec![json_response(
            StatusCode::OK,
            ok_envelope(false),
        )]));
        let (client, _) = client(transport.clone(), ClientMode::External);

        client
            .call(Method::POST, "http://svc", "/a", &json!({}), &AuthorityMode::Anonymous, None)
            .await;

        let sent = &transport.requests()[0];
        assert!(sent.headers.get(header::AUTHORIZATION).is_none());
        assert!(sent.headers.get(REQUEST_ID_HEADER).is_none());
    }

    #[tokio::test]
    async fn internal_mode_forwards_correlation_headers() {
        let transport = Arc::new(ScriptedTransport::new(vec![json_response(
            StatusCode::OK,
            ok_envelope(true),
        )]));
        let (client, verifier) = client(transport.clone(), ClientMode::Internal);

        let record = RequestRecord::for_queue("ord", Uuid::new_v4(), None, "q", &identity());
        let log = RequestLog::new(record, Arc::new(MemoryRecordSink::new()));

        client
            .call(
                Method::PUT,
                "http://svc",
                "/b",
                &json!({}),
                &AuthorityMode::Authority("authority::billing.write".into()),
                Some(&log),
            )
            .await;

        let sent = &transport.requests()[0];
        assert_eq!(sent.method, Method::PUT);
        assert_eq!(sent.headers[PARENT_REQUEST_ID_HEADER], log.request_id());
        assert_eq!(sent.headers[CALLER_SERVICE_HEADER], "orders");
        assert_eq!(sent.headers[CALLER_SERVICE_HASH_HEADER], "abc123");
        assert_eq!(sent.headers[CALLER_SERVICE_VERSION_HEADER], "1.2.0");

        let fresh = sent.headers[REQUEST_ID_HEADER].to_str().unwrap();
        assert!(Uuid::parse_str(fresh).is_ok());
        assert_ne!(fresh, log.raw_request_id().to_string());

        let auth = sent.headers[header::AUTHORIZATION].to_str().unwrap();
        let token = verifier.verify(auth).unwrap();
        assert!(token.has_authority("authority::billing.write"));
        assert!(!token.is_inter_service_call);
    }

    #[tokio::test]
    async fn transport_and_parse_failures_become_envelopes() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Err(TransportError::Connect("refused".into())),
            Ok(OutboundResponse {
                status: StatusCode::BAD_GATEWAY,
                body: b"<html>bad gateway</html>".to_vec(),
            }),
        ]));
        let (client, _) = client(transport, ClientMode::External);

        let first = client
            .call(Method::POST, "http://svc", "/", &json!({}), &AuthorityMode::Anonymous, None)
            .await;
        assert_eq!(first.header.status_code, NO_RESPONSE_STATUS);
        assert_eq!(first.header.code, codes::CONNECTION_FAILURE);

        let second = client
            .call(Method::POST, "http://svc", "/", &json!({}), &AuthorityMode::Anonymous, None)
            .await;
        assert_eq!(second.header.status_code, 502);
        assert_eq!(second.header.code, codes::UNABLE_PARSE_SERVICE_RESPONSE);
        assert!(second.header.message.starts_with("The response got from the service is not valid JSON"));
    }
}
