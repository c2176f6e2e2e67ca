/*
 * Responsibility
 * - 呼び出し元 (token の主体) に関する request/response DTO
 * - validate() は request_error_info 形式で field ごとの失敗を返す
 */
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::envelope::{BodyType, FieldFailure, RequestValidationFailure};
use crate::api::v1::extractors::Validate;
use crate::services::auth::predicate::{AUTHORITY_PREFIX, SERVICE_AUTHORITY_PREFIX};
use crate::services::request_log::{LogObject, Loggable};

pub const AUTHORITY_MAX_LEN: usize = 256;

#[derive(Debug, Serialize)]
pub struct CallerResponse {
    pub subject: Option<String>,
    pub issuer: Option<String>,
    pub is_inter_service_call: bool,
    pub authorities: Vec<String>,
    pub expires_at: Option<i64>,
}

impl BodyType for CallerResponse {
    fn body_type() -> &'static str {
        "caller_info"
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthorityCheckRequest {
    pub authority: String,
    /// Free-form note from the caller; never written to the request record.
    #[serde(default)]
    pub reason: Option<String>,
}

impl Validate for AuthorityCheckRequest {
    fn validate(&self) -> RequestValidationFailure {
        let mut failure = RequestValidationFailure::default();
        let authority = self.authority.trim();

        if authority.is_empty() {
            failure.push(FieldFailure::body("authority", "The field is required."));
        } else if !authority.starts_with(AUTHORITY_PREFIX)
            && !authority.starts_with(SERVICE_AUTHORITY_PREFIX)
        {
            failure.push(FieldFailure::body(
                "authority",
                "The authority must start with authority:: or service_authority::.",
            ));
        }

        if authority.len() > AUTHORITY_MAX_LEN {
            failure.push(FieldFailure::body(
                "authority",
                "The field must be at most 256 characters long.",
            ));
        }

        failure
    }
}

impl Loggable for AuthorityCheckRequest {
    fn to_log_value(&self) -> Value {
        LogObject::new()
            .field("authority", &self.authority)
            .sensitive("reason")
            .build()
    }
}
