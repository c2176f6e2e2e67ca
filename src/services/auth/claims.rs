use josekit::JoseError;
use josekit::jwt::JwtPayload;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Claims carried by every token minted inside the fleet.
///
/// `authorities` and `is_inter_service_call` are omitted from the payload when absent,
/// and treated as empty / false when a token does not carry them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceClaims {
    pub iss: String,
    pub sub: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorities: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_inter_service_call: Option<bool>,
}

#[derive(Debug, thiserror::Error)]
#[error("token claims could not be decoded: {0}")]
pub struct ClaimsDecodeError(#[from] serde_json::Error);

impl ServiceClaims {
    pub fn from_payload(payload: &JwtPayload) -> Result<Self, ClaimsDecodeError> {
        let claims = serde_json::from_value(Value::Object(payload.claims_set().clone()))?;
        Ok(claims)
    }

    pub fn to_payload(&self) -> Result<JwtPayload, JoseError> {
        let mut map = Map::new();
        map.insert("iss".into(), Value::String(self.iss.clone()));
        map.insert("sub".into(), Value::String(self.sub.clone()));
        map.insert("exp".into(), Value::from(self.exp));

        if let Some(authorities) = &self.authorities {
            map.insert(
                "authorities".into(),
                Value::Array(authorities.iter().cloned().map(Value::String).collect()),
            );
        }
        if let Some(flag) = self.is_inter_service_call {
            map.insert("is_inter_service_call".into(), Value::Bool(flag));
        }

        JwtPayload::from_map(map)
    }
}
