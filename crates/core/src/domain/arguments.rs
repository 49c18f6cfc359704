// Bound call arguments

use crate::error::ServiceError;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Arguments of one call, already validated against the method's parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments(Map<String, Value>);

impl Arguments {
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn get_raw(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Typed access to a single argument (absent reads as `null`)
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T, ServiceError> {
        let value = self.0.get(name).cloned().unwrap_or(Value::Null);
        serde_json::from_value(value)
            .map_err(|e| ServiceError::InvalidParams(format!("parameter '{}': {}", name, e)))
    }

    /// Decode all arguments into one typed request struct
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ServiceError> {
        serde_json::from_value(Value::Object(self.0.clone()))
            .map_err(|e| ServiceError::InvalidParams(e.to_string()))
    }

    /// Render for call logs, leaving out the named fields
    pub fn render(&self, skip: &BTreeSet<String>) -> String {
        let visible: Map<String, Value> = self
            .0
            .iter()
            .filter(|(name, _)| !skip.contains(name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Value::Object(visible).to_string()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}
