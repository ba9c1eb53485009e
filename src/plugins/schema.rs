//! Plugin configuration schema
//!
//! Plugins describe their configuration keys with [`ConfDescription`]. The
//! registry validates supplied values against those descriptions, fills in
//! defaults, and keeps track of which keys are secret so that every read-back
//! goes through [`PluginConfig::redacted`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Replaces secret values in any read-back of a plugin's configuration
pub const SECRET_SENTINEL: &str = "********";

/// Declared type of a configuration value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl DataType {
    /// Whether `value` has this type
    #[must_use]
    pub const fn matches(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Self::String, Value::String(_))
                | (Self::Number, Value::Number(_))
                | (Self::Boolean, Value::Bool(_))
                | (Self::Object, Value::Object(_))
                | (Self::Array, Value::Array(_))
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

/// Description of one configuration key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfDescription {
    pub key: String,
    /// Human-readable label
    pub name: String,
    pub data_type: DataType,
    /// `null` marks the key as required
    #[serde(default)]
    pub default_value: Value,
    #[serde(default)]
    pub secret_value: bool,
}

impl ConfDescription {
    /// A required key with no default
    #[must_use]
    pub fn new(key: impl Into<String>, name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            data_type,
            default_value: Value::Null,
            secret_value: false,
        }
    }

    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = value.into();
        self
    }

    #[must_use]
    pub const fn secret(mut self) -> Self {
        self.secret_value = true;
        self
    }

    #[must_use]
    pub fn is_required(&self) -> bool {
        self.default_value.is_null()
    }
}

/// A plugin's effective configuration
#[derive(Clone, Default)]
pub struct PluginConfig {
    values: Map<String, Value>,
    secrets: HashSet<String>,
}

impl PluginConfig {
    /// Wrap supplied values as-is, for plugins that declare no schema
    #[must_use]
    pub fn unvalidated(values: Map<String, Value>) -> Self {
        Self {
            values,
            secrets: HashSet::new(),
        }
    }

    /// Validate `supplied` against `descriptions` and merge in defaults
    ///
    /// Keys that are supplied but not declared are passed through untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigValidation`] if a required key is missing or a
    /// value does not have its declared type
    pub fn validate_and_merge(
        plugin: &str,
        descriptions: &[ConfDescription],
        supplied: &Map<String, Value>,
    ) -> Result<Self> {
        let mut values = supplied.clone();
        let mut secrets = HashSet::new();

        for desc in descriptions {
            let invalid = |reason: String| Error::ConfigValidation {
                plugin: plugin.to_string(),
                key: desc.key.clone(),
                reason,
            };

            match supplied.get(&desc.key).filter(|v| !v.is_null()) {
                Some(value) if !desc.data_type.matches(value) => {
                    return Err(invalid(format!(
                        "expected {}, got {}",
                        desc.data_type.as_str(),
                        json_type_name(value)
                    )));
                }
                Some(_) => {}
                None if desc.is_required() => {
                    return Err(invalid("is required".to_string()));
                }
                None => {
                    if !desc.data_type.matches(&desc.default_value) {
                        return Err(invalid(format!(
                            "default is not a {}",
                            desc.data_type.as_str()
                        )));
                    }
                    values.insert(desc.key.clone(), desc.default_value.clone());
                }
            }

            if desc.secret_value {
                secrets.insert(desc.key.clone());
            }
        }

        Ok(Self { values, secrets })
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    #[must_use]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(Value::as_bool)
    }

    #[must_use]
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.values.get(key).and_then(Value::as_i64)
    }

    #[must_use]
    pub fn is_secret(&self, key: &str) -> bool {
        self.secrets.contains(key)
    }

    /// Configuration safe to show outside the plugin
    #[must_use]
    pub fn redacted(&self) -> Map<String, Value> {
        self.values
            .iter()
            .map(|(k, v)| {
                let shown = if self.secrets.contains(k) {
                    Value::String(SECRET_SENTINEL.to_string())
                } else {
                    v.clone()
                };
                (k.clone(), shown)
            })
            .collect()
    }
}

impl std::fmt::Debug for PluginConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.redacted()).finish()
    }
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn descriptions() -> Vec<ConfDescription> {
        vec![
            ConfDescription::new("greeting", "Greeting", DataType::String).default_value("Hi"),
            ConfDescription::new("apiKey", "API key", DataType::String).secret(),
            ConfDescription::new("retries", "Retries", DataType::Number).default_value(3),
        ]
    }

    fn supplied(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn merges_defaults() {
        let config =
            PluginConfig::validate_and_merge("p", &descriptions(), &supplied(json!({"apiKey": "xyz"})))
                .unwrap();
        assert_eq!(config.get_str("greeting"), Some("Hi"));
        assert_eq!(config.get_i64("retries"), Some(3));
        assert_eq!(config.get_str("apiKey"), Some("xyz"));
    }

    #[test]
    fn missing_required_key() {
        let err = PluginConfig::validate_and_merge("p", &descriptions(), &Map::new()).unwrap_err();
        match err {
            Error::ConfigValidation { plugin, key, .. } => {
                assert_eq!(plugin, "p");
                assert_eq!(key, "apiKey");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn type_mismatch() {
        let err = PluginConfig::validate_and_merge(
            "p",
            &descriptions(),
            &supplied(json!({"apiKey": "xyz", "retries": "three"})),
        )
        .unwrap_err();
        assert!(err.to_string().contains("expected number, got string"));
    }

    #[test]
    fn secrets_are_redacted() {
        let config =
            PluginConfig::validate_and_merge("p", &descriptions(), &supplied(json!({"apiKey": "xyz"})))
                .unwrap();
        let shown = config.redacted();
        assert_eq!(shown["apiKey"], SECRET_SENTINEL);
        assert_eq!(shown["greeting"], "Hi");
        assert!(config.is_secret("apiKey"));
        assert!(!format!("{config:?}").contains("xyz"));
    }

    #[test]
    fn undeclared_keys_pass_through() {
        let config = PluginConfig::validate_and_merge(
            "p",
            &descriptions(),
            &supplied(json!({"apiKey": "k", "extra": true})),
        )
        .unwrap();
        assert_eq!(config.get_bool("extra"), Some(true));
    }

    #[test]
    fn description_wire_format() {
        let desc: ConfDescription = serde_json::from_value(json!({
            "key": "token",
            "name": "Token",
            "dataType": "string",
            "secretValue": true
        }))
        .unwrap();
        assert!(desc.is_required());
        assert!(desc.secret_value);
        assert_eq!(desc.data_type, DataType::String);
    }
}
