//! The parameter map passed into and returned from operations

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::ops::{Deref, DerefMut};

use crate::errors::{RcError, Result};

/// Key-sorted map of parameter names to JSON values
///
/// Used both for decoded request input and for operation output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(Map<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Fetch a raw value, failing with `ParamNotFound` if absent
    pub fn get_value(&self, key: &str) -> Result<&Value> {
        self.0
            .get(key)
            .ok_or_else(|| RcError::ParamNotFound(key.to_string()))
    }

    /// Fetch a string parameter
    pub fn get_string(&self, key: &str) -> Result<String> {
        match self.get_value(key)? {
            Value::String(s) => Ok(s.clone()),
            other => Err(invalid(key, "string", other)),
        }
    }

    /// Fetch an integer parameter, accepting numeric strings
    pub fn get_i64(&self, key: &str) -> Result<i64> {
        let value = self.get_value(key)?;
        match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
                .ok_or_else(|| invalid(key, "int64", value)),
            Value::String(s) => s.trim().parse().map_err(|_| invalid(key, "int64", value)),
            other => Err(invalid(key, "int64", other)),
        }
    }

    /// Fetch a boolean parameter
    ///
    /// Accepts JSON booleans, numbers (non-zero is true) and the strings
    /// `1 t T TRUE true True` / `0 f F FALSE false False`.
    pub fn get_bool(&self, key: &str) -> Result<bool> {
        let value = self.get_value(key)?;
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Number(n) => Ok(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
            Value::String(s) => match s.as_str() {
                "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
                "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
                _ => Err(invalid(key, "bool", value)),
            },
            other => Err(invalid(key, "bool", other)),
        }
    }

    /// Convert any serializable struct into a parameter map
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self> {
        match serde_json::to_value(value)? {
            Value::Object(map) => Ok(Self(map)),
            other => Err(RcError::Operation(format!(
                "expecting an object to convert to params, got {}",
                other
            ))),
        }
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

fn invalid(key: &str, kind: &str, value: &Value) -> RcError {
    RcError::ParamInvalid(format!(
        "expecting {} value for key {:?} (was {})",
        kind, key, value
    ))
}

impl Deref for Params {
    type Target = Map<String, Value>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Params {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
