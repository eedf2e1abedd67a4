//! Pure value formatting applied to each extracted field.
//!
//! Steps run in a fixed order, each optional: transform, format, then type
//! coercion. None of them fail; a step that cannot apply leaves the value as
//! it found it.

use serde::{Deserialize, Serialize};

use crate::dates::{date_from_epoch, format_with_pattern, parse_date_literal};
use crate::pipeline::extractor::FieldExtraction;
use crate::record::{parse_number, FieldValue};

/// Value transform applied before formatting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    Uppercase,
    Lowercase,
    Trim,
    /// Epoch number or date literal to a date
    Date,
}

/// Target type for the final coercion step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Number,
    String,
    Boolean,
}

const TRUTHY: &[&str] = &["true", "1", "yes", "on"];

/// Format a resolved value according to an extraction rule
pub fn format(value: FieldValue, rule: &FieldExtraction) -> FieldValue {
    if value.is_null() {
        return value;
    }

    let value = match rule.transform {
        Some(transform) => apply_transform(value, transform),
        None => value,
    };
    let value = match rule.format.as_deref() {
        Some(pattern) => apply_format(value, pattern),
        None => value,
    };
    match rule.field_type {
        Some(field_type) => coerce(value, field_type),
        None => value,
    }
}

pub fn apply_transform(value: FieldValue, transform: Transform) -> FieldValue {
    match transform {
        Transform::Uppercase => FieldValue::Text(value.to_string().to_uppercase()),
        Transform::Lowercase => FieldValue::Text(value.to_string().to_lowercase()),
        Transform::Trim => FieldValue::Text(value.to_string().trim().to_string()),
        Transform::Date => match value {
            FieldValue::Number(n) => date_from_epoch(n)
                .map(FieldValue::Date)
                .unwrap_or(FieldValue::Number(n)),
            FieldValue::Text(s) => match parse_date_literal(&s) {
                Some(date) => FieldValue::Date(date),
                None => FieldValue::Text(s),
            },
            other => other,
        },
    }
}

/// Dates render through a date pattern; numbers round to the decimals
/// written after the `.` of the format (`0.00` keeps two).
pub fn apply_format(value: FieldValue, pattern: &str) -> FieldValue {
    match value {
        FieldValue::Date(date) => match format_with_pattern(&date, pattern) {
            Ok(rendered) => FieldValue::Text(rendered),
            Err(err) => {
                tracing::debug!("Leaving date unformatted: {}", err);
                FieldValue::Date(date)
            }
        },
        FieldValue::Number(n) => match pattern.split_once('.') {
            Some((_, decimals)) if n.is_finite() => {
                FieldValue::Text(format!("{:.*}", decimals.chars().count(), n))
            }
            _ => FieldValue::Number(n),
        },
        other => other,
    }
}

pub fn coerce(value: FieldValue, field_type: FieldType) -> FieldValue {
    match field_type {
        FieldType::Number => FieldValue::Number(to_number(&value)),
        FieldType::String => FieldValue::Text(value.to_string()),
        FieldType::Boolean => FieldValue::Bool(to_bool(&value)),
    }
}

fn to_number(value: &FieldValue) -> f64 {
    match value {
        FieldValue::Null => f64::NAN,
        FieldValue::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        FieldValue::Number(n) => *n,
        FieldValue::Text(s) => parse_number(s),
        FieldValue::Date(d) => d.timestamp_millis() as f64,
        FieldValue::Json(_) => f64::NAN,
    }
}

fn to_bool(value: &FieldValue) -> bool {
    match value {
        FieldValue::Null => false,
        FieldValue::Bool(b) => *b,
        FieldValue::Number(n) => *n != 0.0 && !n.is_nan(),
        FieldValue::Text(s) => {
            let lowered = s.to_lowercase();
            TRUTHY.contains(&lowered.as_str())
        }
        FieldValue::Date(_) | FieldValue::Json(_) => true,
    }
}
