//! Incoming readings and numeric coercion at the boundary.
//!
//! A reading is an open JSON object. Keys naming a configured metric must
//! hold a JSON number or a numeric string that parses to a finite float;
//! every other key is carried through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::InvalidReadingError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Reading(Map<String, Value>);

impl Reading {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Coerce the value stored under `metric`; `Ok(None)` when the key is absent.
    pub fn metric_value(&self, metric: &str) -> Result<Option<f64>, InvalidReadingError> {
        self.0
            .get(metric)
            .map(|raw| coerce_value(metric, raw))
            .transpose()
    }
}

impl From<Map<String, Value>> for Reading {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Reading {
    type Error = Value;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(other),
        }
    }
}

/// Numbers are taken as-is, strings are trimmed and parsed. Anything that
/// does not end up as a finite float is rejected.
pub fn coerce_value(metric: &str, raw: &Value) -> Result<f64, InvalidReadingError> {
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(InvalidReadingError::new(metric, raw_repr(raw))),
    }
}

fn raw_repr(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numbers_and_numeric_strings() {
        assert_eq!(coerce_value("temperature", &json!(21.5)).unwrap(), 21.5);
        assert_eq!(coerce_value("light", &json!(512)).unwrap(), 512.0);
        assert_eq!(coerce_value("humidity", &json!(" 48.25 ")).unwrap(), 48.25);
        assert_eq!(coerce_value("humidity", &json!("-3e1")).unwrap(), -30.0);
    }

    #[test]
    fn test_garbage_is_rejected_with_context() {
        let err = coerce_value("temperature", &json!("ERR")).unwrap_err();
        assert_eq!(err.metric, "temperature");
        assert_eq!(err.raw, "ERR");

        for bad in [json!("nan"), json!("inf"), json!(""), json!(null), json!(true), json!([1])] {
            assert!(coerce_value("light", &bad).is_err(), "accepted {bad}");
        }
    }

    #[test]
    fn test_metric_value_absent_vs_present() {
        let reading = Reading::new().with("temperature", "22.0").with("device", "esp32-01");
        assert_eq!(reading.metric_value("temperature").unwrap(), Some(22.0));
        assert_eq!(reading.metric_value("humidity").unwrap(), None);
        assert!(reading.metric_value("device").is_err());
    }

    #[test]
    fn test_reading_deserializes_from_object_only() {
        let reading: Reading = serde_json::from_value(json!({"light": 300})).unwrap();
        assert_eq!(reading.len(), 1);
        assert!(Reading::try_from(json!([1, 2])).is_err());
    }
}
