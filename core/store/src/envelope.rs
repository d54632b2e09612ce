//! Record envelope: the body of every record file.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use drivekv_common::{Error, Result};

/// `{"name": <key>, "value": <payload>}` as stored in one remote file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Record key.
    pub name: String,
    /// Record payload.
    pub value: Value,
}

impl Envelope {
    /// Wrap a record.
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Decode a downloaded file body.
    ///
    /// Unknown fields are ignored; `value` may be `null` but must be present.
    ///
    /// # Errors
    /// - [`Error::Parse`] if the body is not an object with a string `name`
    ///   and a `value`
    pub fn from_value(content: Value) -> Result<Self> {
        let Value::Object(mut fields) = content else {
            return Err(Error::Parse("Record file is not a JSON object".to_string()));
        };

        let name = match fields.remove("name") {
            Some(Value::String(name)) => name,
            Some(_) => return Err(Error::Parse("Record name must be a string".to_string())),
            None => return Err(Error::Parse("Record file has no name".to_string())),
        };
        let value = fields
            .remove("value")
            .ok_or_else(|| Error::Parse(format!("Record '{}' has no value", name)))?;

        Ok(Self { name, value })
    }

    /// Serialize to the file body.
    pub fn to_body(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::Parse(format!("Failed to serialize record '{}': {}", self.name, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_body_has_exactly_two_keys() {
        let body = Envelope::new("theme", json!("dark")).to_body().unwrap();
        assert_eq!(body, r#"{"name":"theme","value":"dark"}"#);
    }

    #[test]
    fn test_null_value_is_kept() {
        let envelope = Envelope::from_value(json!({"name": "k", "value": null})).unwrap();
        assert_eq!(envelope.value, Value::Null);
    }

    #[test]
    fn test_malformed_envelopes() {
        for content in [
            json!([1, 2]),
            json!({"value": 1}),
            json!({"name": 7, "value": 1}),
            json!({"name": "k"}),
        ] {
            assert!(matches!(Envelope::from_value(content), Err(Error::Parse(_))));
        }
    }
}
