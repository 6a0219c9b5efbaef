//! Canonical property value encoding
//!
//! Property values are a closed tagged variant over the JSON data model. Every
//! value is stored as RFC 8785 (JCS) text: object members sorted, no
//! insignificant whitespace, ECMAScript number formatting. Equal values always
//! produce identical text, so value-equality lookups reduce to text equality
//! on `raw_value`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::error::{DecodeError, EncodeError};

/// A JSON number normalized so that numerically equal values compare equal.
///
/// Finite floats with no fractional part that fit in `i64` are stored as
/// integers; the canonical text writes `2.0` as `2`, and decoding must yield
/// the same variant that was encoded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Number(Repr);

#[derive(Debug, Clone, Copy, PartialEq)]
enum Repr {
    Int(i64),
    Float(f64),
}

impl Number {
    /// Build from a float. Returns `None` for NaN and infinities.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        if value.fract() == 0.0 && value >= i64::MIN as f64 && value < i64::MAX as f64 {
            return Some(Self(Repr::Int(value as i64)));
        }
        Some(Self(Repr::Float(value)))
    }

    /// Integer view, if the number is integral
    pub fn as_i64(&self) -> Option<i64> {
        match self.0 {
            Repr::Int(i) => Some(i),
            Repr::Float(_) => None,
        }
    }

    /// Float view (lossy for large integers)
    pub fn as_f64(&self) -> f64 {
        match self.0 {
            Repr::Int(i) => i as f64,
            Repr::Float(f) => f,
        }
    }

    fn to_json(self) -> serde_json::Number {
        match self.0 {
            Repr::Int(i) => serde_json::Number::from(i),
            // Finite by construction.
            Repr::Float(f) => serde_json::Number::from_f64(f).unwrap_or_else(|| 0.into()),
        }
    }

    fn from_json(number: &serde_json::Number) -> Option<Self> {
        match number.as_i64() {
            Some(i) => Some(Self(Repr::Int(i))),
            None => number.as_f64().and_then(Self::from_f64),
        }
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Self(Repr::Int(value))
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Repr::Int(i) => write!(f, "{i}"),
            Repr::Float(v) => write!(f, "{v}"),
        }
    }
}

/// Dynamically typed property value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PropertyValue {
    /// JSON null
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// Normalized number
    Number(Number),
    /// UTF-8 string
    String(String),
    /// Ordered sequence
    Sequence(Vec<PropertyValue>),
    /// String-keyed mapping
    Mapping(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    /// Borrow as a string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow as a sequence
    pub fn as_sequence(&self) -> Option<&[PropertyValue]> {
        match self {
            PropertyValue::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Integer view
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    /// True for `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }

    /// Human-facing text: strings verbatim, everything else in canonical form.
    ///
    /// Used to derive names such as placeholder usernames from external ids.
    pub fn to_display_text(&self) -> Result<String, EncodeError> {
        match self {
            PropertyValue::String(s) => Ok(s.clone()),
            PropertyValue::Number(n) => Ok(n.to_string()),
            other => encode(other),
        }
    }

    /// Convert into a `serde_json::Value`
    pub fn to_json(&self) -> Value {
        match self {
            PropertyValue::Null => Value::Null,
            PropertyValue::Bool(b) => Value::Bool(*b),
            PropertyValue::Number(n) => Value::Number(n.to_json()),
            PropertyValue::String(s) => Value::String(s.clone()),
            PropertyValue::Sequence(items) => {
                Value::Array(items.iter().map(PropertyValue::to_json).collect())
            }
            PropertyValue::Mapping(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Convert from a `serde_json::Value`
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => PropertyValue::Null,
            Value::Bool(b) => PropertyValue::Bool(*b),
            Value::Number(n) => Number::from_json(n)
                .map(PropertyValue::Number)
                .unwrap_or(PropertyValue::Null),
            Value::String(s) => PropertyValue::String(s.clone()),
            Value::Array(items) => {
                PropertyValue::Sequence(items.iter().map(PropertyValue::from_json).collect())
            }
            Value::Object(map) => PropertyValue::Mapping(
                map.iter()
                    .map(|(k, v)| (k.clone(), PropertyValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

/// Encode a value into its canonical text form.
pub fn encode(value: &PropertyValue) -> Result<String, EncodeError> {
    Ok(serde_jcs::to_string(&value.to_json())?)
}

/// Decode stored text. Any valid JSON document is accepted; anything else
/// (including trailing garbage) is a `DecodeError`.
pub fn decode(raw: &str) -> Result<PropertyValue, DecodeError> {
    let value: Value = serde_json::from_str(raw).map_err(|source| DecodeError {
        raw: raw.to_string(),
        source,
    })?;
    Ok(PropertyValue::from_json(&value))
}

impl Serialize for PropertyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PropertyValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(PropertyValue::from_json(&value))
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Number(Number::from(value))
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Number(Number::from(i64::from(value)))
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Number::from_f64(value)
            .map(PropertyValue::Number)
            .unwrap_or(PropertyValue::Null)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl<T: Into<PropertyValue>> From<Vec<T>> for PropertyValue {
    fn from(items: Vec<T>) -> Self {
        PropertyValue::Sequence(items.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, PropertyValue>> for PropertyValue {
    fn from(map: BTreeMap<String, PropertyValue>) -> Self {
        PropertyValue::Mapping(map)
    }
}

impl<T: Into<PropertyValue>> From<Option<T>> for PropertyValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(PropertyValue::Null)
    }
}

impl From<&Value> for PropertyValue {
    fn from(value: &Value) -> Self {
        PropertyValue::from_json(value)
    }
}
