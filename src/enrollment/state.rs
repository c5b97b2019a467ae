use crate::mfa::config::{truthy, ServerConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const ATTRIBUTES_KEY: &str = "Attributes";
pub const SERVER_CONFIG_KEY: &str = "privacyidea:serverconfig";
pub const TOKEN_ENROLLMENT_KEY: &str = "privacyidea:tokenEnrollment";
pub const CHECK_TOKEN_TYPE_KEY: &str = "privacyidea:privacyidea:checkTokenType";

/// Per-request state of the SSO pipeline.
///
/// Owned by the pipeline and lent to the enrollment filter for one request.
/// Attributes are multi-valued (`Attributes[<name>]` is a list of strings).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SsoState(Map<String, Value>);

impl SsoState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a JSON value; anything but an object is rejected.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// First value of attribute `name`.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        match self.get(ATTRIBUTES_KEY)?.get(name)? {
            Value::Array(values) => values.first().and_then(Value::as_str),
            Value::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn set_attribute(&mut self, name: &str, values: Vec<String>) {
        let attributes = self
            .0
            .entry(ATTRIBUTES_KEY)
            .or_insert_with(|| Value::Object(Map::new()));

        if !attributes.is_object() {
            *attributes = Value::Object(Map::new());
        }

        if let Value::Object(attributes) = attributes {
            attributes.insert(
                name.to_string(),
                Value::Array(values.into_iter().map(Value::String).collect()),
            );
        }
    }

    /// Server settings an upstream stage left for us, empty when absent.
    #[must_use]
    pub fn server_config(&self) -> ServerConfig {
        match self.get(SERVER_CONFIG_KEY) {
            Some(Value::Object(map)) => ServerConfig::from_map(map),
            _ => ServerConfig::default(),
        }
    }

    /// Value of `state[path][key][0]` read as a flag, `None` when absent or null.
    #[must_use]
    pub fn flag(&self, path: &str, key: &str) -> Option<bool> {
        let value = match self.get(path)?.get(key)? {
            Value::Array(values) => values.first()?,
            scalar => scalar,
        };

        if value.is_null() {
            return None;
        }

        Some(truthy(value))
    }

    /// Merge `entries` into the object at `state[key]`, creating it (or
    /// replacing a non-object) first.
    pub fn merge_section<I>(&mut self, key: &str, entries: I)
    where
        I: IntoIterator<Item = (&'static str, Value)>,
    {
        let section = self
            .0
            .entry(key)
            .or_insert_with(|| Value::Object(Map::new()));

        if !section.is_object() {
            *section = Value::Object(Map::new());
        }

        if let Value::Object(section) = section {
            for (name, value) in entries {
                section.insert(name.to_string(), value);
            }
        }
    }
}
