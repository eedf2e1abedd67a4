//! Core record and value types flowing through the pipeline.
//!
//! A [`Record`] is one timestamped, labeled unit of telemetry. Its payload is a
//! [`RecordValue`], an explicit tagged variant instead of a loosely typed value,
//! so every stage matches on the cases it understands.

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Ordered label set; insertion order drives default output column order
pub type Labels = IndexMap<String, String>;

/// Free-form metadata (provenance, extracted fields, aggregation summaries)
pub type Metadata = IndexMap<String, Value>;

/// Metadata key holding the typed fields produced by extraction
pub const EXTRACTED_FIELDS_KEY: &str = "extractedFields";

/// A single aggregated statistic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Number(f64),
    Text(String),
}

impl Scalar {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            Scalar::Text(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Scalar::Number(n) => number_to_json(*n),
            Scalar::Text(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Number(n) => write!(f, "{}", format_number(*n)),
            Scalar::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<Scalar> for RecordValue {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Number(n) => RecordValue::Number(n),
            Scalar::Text(s) => RecordValue::Text(s),
        }
    }
}

/// Primary payload of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub enum RecordValue {
    /// A metric sample
    Number(f64),
    /// A raw log line (possibly JSON text)
    Text(String),
    /// An already-parsed payload
    Structured(Value),
    /// Metric name -> statistic, produced by multi-metric aggregation
    Metrics(IndexMap<String, Scalar>),
}

impl RecordValue {
    /// Build a value from JSON. Objects and arrays stay structured.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Number(n) => RecordValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => RecordValue::Text(s),
            other => RecordValue::Structured(other),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            RecordValue::Number(n) => number_to_json(*n),
            RecordValue::Text(s) => Value::String(s.clone()),
            RecordValue::Structured(v) => v.clone(),
            RecordValue::Metrics(metrics) => Value::Object(
                metrics
                    .iter()
                    .map(|(name, scalar)| (name.clone(), scalar.to_json()))
                    .collect(),
            ),
        }
    }

    /// Numeric coercion: numbers as-is, strings parsed, anything else NaN
    pub fn as_number(&self) -> f64 {
        match self {
            RecordValue::Number(n) => *n,
            RecordValue::Text(s) => parse_number(s),
            RecordValue::Structured(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
            RecordValue::Structured(Value::String(s)) => parse_number(s),
            RecordValue::Structured(_) | RecordValue::Metrics(_) => f64::NAN,
        }
    }

    /// True for mappings and sequences, which never become metric values
    pub fn is_composite(&self) -> bool {
        match self {
            RecordValue::Structured(v) => v.is_object() || v.is_array(),
            RecordValue::Metrics(_) => true,
            RecordValue::Number(_) | RecordValue::Text(_) => false,
        }
    }

    /// JSON null carried in a structured payload
    pub fn is_null(&self) -> bool {
        matches!(self, RecordValue::Structured(Value::Null))
    }

    /// String form used for matching and for label values
    pub fn to_text(&self) -> String {
        match self {
            RecordValue::Number(n) => format_number(*n),
            RecordValue::Text(s) => s.clone(),
            RecordValue::Structured(v) => json_to_text(v),
            RecordValue::Metrics(_) => self.to_json().to_string(),
        }
    }
}

impl From<Value> for RecordValue {
    fn from(value: Value) -> Self {
        RecordValue::from_json(value)
    }
}

impl From<RecordValue> for Value {
    fn from(value: RecordValue) -> Self {
        value.to_json()
    }
}

impl From<f64> for RecordValue {
    fn from(n: f64) -> Self {
        RecordValue::Number(n)
    }
}

impl From<&str> for RecordValue {
    fn from(s: &str) -> Self {
        RecordValue::Text(s.to_string())
    }
}

impl fmt::Display for RecordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_text())
    }
}

/// Value produced by field extraction and formatting
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Date(DateTime<Utc>),
    Json(Value),
}

impl FieldValue {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(*b),
            Value::Number(n) => FieldValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => FieldValue::Text(s.clone()),
            Value::Array(_) | Value::Object(_) => FieldValue::Json(value.clone()),
        }
    }

    pub fn from_record_value(value: &RecordValue) -> Self {
        match value {
            RecordValue::Number(n) => FieldValue::Number(*n),
            RecordValue::Text(s) => FieldValue::Text(s.clone()),
            RecordValue::Structured(v) => FieldValue::from_json(v),
            RecordValue::Metrics(_) => FieldValue::Json(value.to_json()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Number(n) => number_to_json(*n),
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Date(d) => Value::String(format_date(d)),
            FieldValue::Json(v) => v.clone(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "null"),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Number(n) => write!(f, "{}", format_number(*n)),
            FieldValue::Text(s) => write!(f, "{}", s),
            FieldValue::Date(d) => write!(f, "{}", format_date(d)),
            FieldValue::Json(v) => write!(f, "{}", v),
        }
    }
}

/// One timestamped, labeled unit of data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub value: RecordValue,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Record {
    pub fn new(timestamp: i64, value: impl Into<RecordValue>) -> Self {
        Self {
            timestamp,
            value: value.into(),
            labels: Labels::new(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Fields recorded by extraction, if any
    pub fn extracted_fields(&self) -> Option<&serde_json::Map<String, Value>> {
        self.metadata
            .get(EXTRACTED_FIELDS_KEY)
            .and_then(|v| v.as_object())
    }

    /// JSON view of the whole record, used for dotted column resolution
    pub fn to_json(&self) -> Value {
        let labels = self
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        let metadata = self
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut object = serde_json::Map::new();
        object.insert("timestamp".to_string(), Value::from(self.timestamp));
        object.insert("value".to_string(), self.value.to_json());
        object.insert("labels".to_string(), Value::Object(labels));
        object.insert("metadata".to_string(), Value::Object(metadata));
        Value::Object(object)
    }
}

/// Render a number the way telemetry tooling displays it: integral values
/// without a fractional part, non-finite values by name.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let name = if n > 0.0 { "Infinity" } else { "-Infinity" };
        name.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Parse a plain decimal or exponent literal.
///
/// Anything else is NaN: blank text, `inf`/`infinity`/`nan` spellings, and
/// literals that overflow to an infinite value.
pub fn parse_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty()
        || trimmed
            .bytes()
            .any(|b| b.is_ascii_alphabetic() && b != b'e' && b != b'E')
    {
        return f64::NAN;
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() => n,
        _ => f64::NAN,
    }
}

/// JSON cannot carry NaN or infinities; those become null
pub fn number_to_json(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.007_199_254_740_992e15 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// ISO-8601 with millisecond precision and a `Z` suffix
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Text form of a JSON value: strings unquoted, everything else compact JSON
pub fn json_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n
            .as_f64()
            .map(format_number)
            .unwrap_or_else(|| n.to_string()),
        other => other.to_string(),
    }
}
