//! Telemetry response shapes and their normalization.
//!
//! The remote platform does not answer telemetry reads with one fixed shape.
//! Depending on deployment and API version a key's value arrives as a bare
//! scalar, as a list of timestamped entries (most recent first) or as a map
//! of key to such a list. All three normalize through one routine to a plain
//! string; absence and parse failure mean "no value", not an error.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One timestamped telemetry entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryPoint {
    pub ts: i64,
    pub value: Value,
}

/// A telemetry value in any of the remote platform's response shapes.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TelemetryValue {
    /// `[{"ts": ..., "value": ...}, ...]`
    Series(Vec<TelemetryPoint>),
    /// `{"key": [{"ts": ..., "value": ...}, ...]}`
    Nested(HashMap<String, Vec<TelemetryPoint>>),
    /// A bare scalar (or any residual JSON value)
    Scalar(Value),
}

impl TelemetryValue {
    /// Normalize to a plain string, taking the most recent entry of list
    /// shapes. Returns `None` when no usable value is present.
    pub fn as_scalar_string(&self) -> Option<String> {
        match self {
            Self::Series(points) => points.first().and_then(|p| scalar_to_string(&p.value)),
            Self::Nested(map) => map
                .values()
                .next()
                .and_then(|points| points.first())
                .and_then(|p| scalar_to_string(&p.value)),
            Self::Scalar(Value::Array(items)) => items.first().and_then(scalar_to_string),
            Self::Scalar(value) => scalar_to_string(value),
        }
    }
}

/// Stringify a JSON scalar the way it is cached in device properties:
/// strings unquoted, numbers and booleans in their canonical form, null as
/// "no value". Compound residuals keep their compact JSON rendering.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => serde_json::to_string(other).ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> TelemetryValue {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn all_three_shapes_normalize_to_the_same_string() {
        let scalar = parse(json!(21.5));
        let series = parse(json!([{"ts": 1, "value": 21.5}, {"ts": 0, "value": 20.0}]));
        let nested = parse(json!({"temperature": [{"ts": 1, "value": 21.5}]}));

        assert_eq!(scalar.as_scalar_string().as_deref(), Some("21.5"));
        assert_eq!(series.as_scalar_string().as_deref(), Some("21.5"));
        assert_eq!(nested.as_scalar_string().as_deref(), Some("21.5"));
    }

    #[test]
    fn string_values_are_unquoted() {
        let series = parse(json!([{"ts": 7, "value": "heat"}]));
        assert_eq!(series.as_scalar_string().as_deref(), Some("heat"));
    }

    #[test]
    fn null_and_empty_mean_no_value() {
        assert_eq!(parse(json!(null)).as_scalar_string(), None);
        assert_eq!(parse(json!([])).as_scalar_string(), None);
        assert_eq!(
            parse(json!([{"ts": 1, "value": null}])).as_scalar_string(),
            None
        );
    }

    #[test]
    fn bare_value_lists_take_the_first_entry() {
        let list = parse(json!([3, 4, 5]));
        assert_eq!(list.as_scalar_string().as_deref(), Some("3"));
    }

    #[test]
    fn booleans_and_integers_keep_canonical_form() {
        assert_eq!(parse(json!(true)).as_scalar_string().as_deref(), Some("true"));
        assert_eq!(parse(json!(42)).as_scalar_string().as_deref(), Some("42"));
    }
}
