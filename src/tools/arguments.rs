//! Typed access to tool call arguments.

use serde_json::{Map, Value};

use crate::error::KeelError;

/// Validated tool call input with typed extraction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArguments {
    value: Map<String, Value>,
}

impl ToolArguments {
    pub fn new(value: Map<String, Value>) -> Self {
        Self { value }
    }

    /// Build from any JSON value; non-objects become an empty map.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self { value: map },
            _ => Self::default(),
        }
    }

    /// Get the raw input map.
    pub fn raw(&self) -> &Map<String, Value> {
        &self.value
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.value
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.value.get(key)
    }

    /// Get a string argument by key.
    pub fn get_str(&self, key: &str) -> Result<&str, KeelError> {
        self.value
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| KeelError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    /// Get an optional string argument.
    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    pub fn get_i64(&self, key: &str) -> Result<i64, KeelError> {
        self.value
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| KeelError::InvalidArgument(format!("Missing integer argument: {key}")))
    }

    /// Get a numeric argument; integers are widened.
    pub fn get_f64(&self, key: &str) -> Result<f64, KeelError> {
        self.value
            .get(key)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| KeelError::InvalidArgument(format!("Missing number argument: {key}")))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, KeelError> {
        self.value
            .get(key)
            .and_then(|v| v.as_bool())
            .ok_or_else(|| KeelError::InvalidArgument(format!("Missing boolean argument: {key}")))
    }

    pub fn get_object(&self, key: &str) -> Result<&Map<String, Value>, KeelError> {
        self.value
            .get(key)
            .and_then(|v| v.as_object())
            .ok_or_else(|| KeelError::InvalidArgument(format!("Missing object argument: {key}")))
    }

    pub fn get_array(&self, key: &str) -> Result<&Vec<Value>, KeelError> {
        self.value
            .get(key)
            .and_then(|v| v.as_array())
            .ok_or_else(|| KeelError::InvalidArgument(format!("Missing array argument: {key}")))
    }

    /// Deserialize the whole input into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, KeelError> {
        serde_json::from_value(Value::Object(self.value.clone())).map_err(|e| {
            KeelError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
        })
    }
}

impl From<Map<String, Value>> for ToolArguments {
    fn from(value: Map<String, Value>) -> Self {
        Self::new(value)
    }
}
