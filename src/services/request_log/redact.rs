//! Explicit log serialization with sensitive-field redaction.
//!
//! Types that end up in a request record implement [`Loggable`] by hand and
//! declare which fields are sensitive. Redaction applies at every nesting
//! level because nested values are rendered through their own `Loggable` impl.

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};
use uuid::Uuid;

pub const REDACTION_MARKER: &str = "***********";

pub trait Loggable {
    fn to_log_value(&self) -> Value;
}

/// Builder for the object form of a [`Loggable`].
///
/// ```ignore
/// impl Loggable for LoginRequest {
///     fn to_log_value(&self) -> Value {
///         LogObject::new()
///             .field("username", &self.username)
///             .sensitive("password")
///             .build()
///     }
/// }
/// ```
#[derive(Debug, Default)]
pub struct LogObject {
    map: Map<String, Value>,
}

impl LogObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field<T: Loggable + ?Sized>(mut self, name: &str, value: &T) -> Self {
        self.map.insert(name.to_string(), value.to_log_value());
        self
    }

    pub fn sensitive(mut self, name: &str) -> Self {
        self.map
            .insert(name.to_string(), Value::String(REDACTION_MARKER.to_string()));
        self
    }

    pub fn build(self) -> Value {
        Value::Object(self.map)
    }
}

/// Keep everything up to and including the last `.` of a bearer value
/// (header + payload of a JWT) and replace the signature with the marker.
pub fn redact_bearer(value: &str) -> String {
    let keep = value.rfind('.').map(|i| i + 1).unwrap_or(0);
    format!("{}{}", &value[..keep], REDACTION_MARKER)
}

impl Loggable for Value {
    fn to_log_value(&self) -> Value {
        self.clone()
    }
}

impl Loggable for str {
    fn to_log_value(&self) -> Value {
        Value::String(self.to_string())
    }
}

impl Loggable for String {
    fn to_log_value(&self) -> Value {
        Value::String(self.clone())
    }
}

impl Loggable for Uuid {
    fn to_log_value(&self) -> Value {
        Value::String(self.to_string())
    }
}

impl Loggable for bool {
    fn to_log_value(&self) -> Value {
        Value::Bool(*self)
    }
}

macro_rules! loggable_number {
    ($($t:ty),*) => {
        $(impl Loggable for $t {
            fn to_log_value(&self) -> Value {
                Value::from(*self)
            }
        })*
    };
}

loggable_number!(i32, i64, u16, u32, u64, usize, f64);

impl<T: Loggable> Loggable for Option<T> {
    fn to_log_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, Loggable::to_log_value)
    }
}

impl<T: Loggable> Loggable for [T] {
    fn to_log_value(&self) -> Value {
        Value::Array(self.iter().map(Loggable::to_log_value).collect())
    }
}

impl<T: Loggable> Loggable for Vec<T> {
    fn to_log_value(&self) -> Value {
        self.as_slice().to_log_value()
    }
}

impl<T: Loggable> Loggable for BTreeMap<String, T> {
    fn to_log_value(&self) -> Value {
        Value::Object(
            self.iter()
                .map(|(k, v)| (k.clone(), v.to_log_value()))
                .collect(),
        )
    }
}

impl<T: Loggable> Loggable for HashMap<String, T> {
    fn to_log_value(&self) -> Value {
        Value::Object(
            self.iter()
                .map(|(k, v)| (k.clone(), v.to_log_value()))
                .collect(),
        )
    }
}

impl<T: Loggable + ?Sized> Loggable for &T {
    fn to_log_value(&self) -> Value {
        (**self).to_log_value()
    }
}
