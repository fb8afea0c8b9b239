//! Settings document published by the database through `config.get()`.

use crate::error::{GatewayError, GatewayResult};

use serde_json::{Map, Value};

/// Key/value settings loaded once from the database.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteSettings {
    values: Map<String, Value>,
}

impl RemoteSettings {
    /// Statement returning the settings document.
    pub const STATEMENT: &'static str = "select config.get()";

    /// Wrap the document returned by [`Self::STATEMENT`].
    ///
    /// `null` is treated as an empty document; anything other than an object
    /// is rejected.
    pub fn from_value(value: Value) -> GatewayResult<Self> {
        match value {
            Value::Object(values) => Ok(Self { values }),
            Value::Null => Ok(Self::default()),
            other => Err(GatewayError::decode(format!(
                "settings document must be an object, got {other}"
            ))),
        }
    }

    /// Raw value for `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// String form of `key`: strings as-is, anything else as compact JSON.
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            Value::String(s) => Some(s.clone()),
            other => serde_json::to_string(other).ok(),
        }
    }

    /// Number of top-level keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the document had no keys.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_string_stringifies_non_strings() {
        let settings = RemoteSettings::from_value(json!({
            "jwtIssuer": "novakey",
            "tokenTtl": 3600,
            "features": {"projects": true}
        }))
        .unwrap();

        assert_eq!(settings.get_string("jwtIssuer").as_deref(), Some("novakey"));
        assert_eq!(settings.get_string("tokenTtl").as_deref(), Some("3600"));
        assert_eq!(settings.get_string("features").as_deref(), Some(r#"{"projects":true}"#));
        assert_eq!(settings.get_string("missing"), None);
        assert_eq!(settings.len(), 3);
    }

    #[test]
    fn test_rejects_non_object_documents() {
        assert!(RemoteSettings::from_value(Value::Null).unwrap().is_empty());
        let err = RemoteSettings::from_value(json!([1, 2])).unwrap_err();
        assert!(matches!(err, GatewayError::Decode { .. }));
    }
}
