//! `{header, body}` envelope shared by every response this service sends
//! and every response it reads back from other services.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const BODY_API_FAILURE: &str = "api_failure";
pub const BODY_FAILURE_INFO: &str = "failure_info";
pub const BODY_REQUEST_ERROR_INFO: &str = "request_error_info";
pub const BODY_EMPTY: &str = "empty";

/// Status code used in the header when no HTTP response was received at all.
pub const NO_RESPONSE_STATUS: u16 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHeader {
    pub body_type: Option<String>,
    pub status_code: u16,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub request_id: Option<Uuid>,
    #[serde(default)]
    pub parent_request_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub header: ResponseHeader,
    pub body: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn is_successful(&self) -> bool {
        (200..300).contains(&self.header.status_code)
    }

    /// Header-only response (no body), e.g. a synthesized client-side failure.
    pub fn failure(status_code: u16, code: &str, message: impl Into<String>, body_type: &str) -> Self {
        Self {
            header: ResponseHeader {
                body_type: Some(body_type.to_string()),
                status_code,
                code: code.to_string(),
                message: message.into(),
                request_id: None,
                parent_request_id: None,
            },
            body: None,
        }
    }
}

impl ApiResponse<Value> {
    /// Re-read the untyped body as `T`. A missing body stays `None`.
    pub fn into_typed<T: serde::de::DeserializeOwned>(self) -> Result<ApiResponse<T>, serde_json::Error> {
        let body = match self.body {
            None | Some(Value::Null) => None,
            Some(v) => Some(serde_json::from_value(v)?),
        };

        Ok(ApiResponse {
            header: self.header,
            body,
        })
    }
}

/// DTOs name their body type so clients can pick a decoder.
pub trait BodyType {
    fn body_type() -> &'static str;
}

impl<T: BodyType> BodyType for Vec<T> {
    fn body_type() -> &'static str {
        T::body_type()
    }
}

/// `list[<type>]` for arrays, `empty` for no body.
pub fn body_type_for(value: &Value, base: &str) -> String {
    match value {
        Value::Null => BODY_EMPTY.to_string(),
        Value::Array(_) => format!("list[{base}]"),
        _ => base.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtomicValue<T> {
    pub value: T,
}

impl<T> BodyType for AtomicValue<T> {
    fn body_type() -> &'static str {
        "atomic_value"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFailure {
    pub field: String,
    pub location: String,
    #[serde(rename = "error_messages")]
    pub messages: Vec<String>,
}

impl FieldFailure {
    pub fn header(name: &str, message: &str) -> Self {
        Self {
            field: name.to_string(),
            location: "header".to_string(),
            messages: vec![message.to_string()],
        }
    }

    pub fn body(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            location: "body".to_string(),
            messages: vec![message.to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestValidationFailure {
    pub errors: Vec<FieldFailure>,
}

impl RequestValidationFailure {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn push(&mut self, failure: FieldFailure) {
        self.errors.push(failure);
    }
}

impl BodyType for RequestValidationFailure {
    fn body_type() -> &'static str {
        BODY_REQUEST_ERROR_INFO
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn body_type_reflects_shape() {
        assert_eq!(body_type_for(&json!([1, 2]), "widget"), "list[widget]");
        assert_eq!(body_type_for(&Value::Null, "widget"), "empty");
        assert_eq!(body_type_for(&json!({"a": 1}), "widget"), "widget");
    }

    #[test]
    fn missing_body_and_ids_deserialize_as_none() {
        let raw = r#"{"header":{"body_type":"empty","status_code":200,"code":"","message":""}}"#;
        let parsed: ApiResponse<Value> = serde_json::from_str(raw).unwrap();
        assert!(parsed.is_successful());
        assert_eq!(parsed.body, None);
        assert_eq!(parsed.header.request_id, None);
    }

    #[test]
    fn validation_failure_uses_error_messages_key() {
        let mut failure = RequestValidationFailure::default();
        failure.push(FieldFailure::header("X-A", "Request is missing header."));

        let v = serde_json::to_value(&failure).unwrap();
        assert_eq!(
            v,
            json!({"errors": [{"field": "X-A", "location": "header", "error_messages": ["Request is missing header."]}]})
        );
    }
}
