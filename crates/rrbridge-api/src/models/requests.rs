//! Incoming bodies. Every field is optional so presence checks happen in the
//! handlers and produce the envelope error instead of a rejection.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InitRequest {
    #[serde(default, deserialize_with = "lenient_string")]
    pub user_id: Option<String>,
    /// Account credentials object
    #[serde(alias = "credentials")]
    pub rriot: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandRequestBody {
    #[serde(default, deserialize_with = "lenient_string")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub device_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub local_key: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub command: Option<String>,
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DisconnectRequest {
    #[serde(default, deserialize_with = "lenient_string")]
    pub user_id: Option<String>,
}

/// Identifier fields take strings or numbers; any other JSON type reads as
/// absent so the handler reports it as missing.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// A present, non-empty string field.
pub(crate) fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

/// A present value that is not null, empty or `false`.
pub(crate) fn truthy(value: &Option<Value>) -> Option<&Value> {
    value.as_ref().filter(|v| match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Number(_) => true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_ids_are_accepted() {
        let body: DisconnectRequest = serde_json::from_value(json!({"user_id": 42})).unwrap();
        assert_eq!(body.user_id.as_deref(), Some("42"));
    }

    #[test]
    fn test_other_types_read_as_absent() {
        let body: CommandRequestBody = serde_json::from_value(json!({
            "user_id": {"nested": true},
            "device_id": null,
            "command": ["app_start"],
        }))
        .unwrap();
        assert!(body.user_id.is_none());
        assert!(body.device_id.is_none());
        assert!(body.local_key.is_none());
        assert!(body.command.is_none());
    }
}
