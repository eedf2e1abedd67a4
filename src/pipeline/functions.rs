//! Aggregation functions shared by grouped and global aggregation.
//!
//! Numeric functions coerce their inputs, drop anything that is not a number
//! and fall back to `0` when nothing numeric is left. `first`/`last` pick the
//! chronologically boundary sample and return its raw value.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;
use crate::record::{RecordValue, Scalar};

/// Percentile used when none is configured
pub const DEFAULT_PERCENTILE: f64 = 95.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationFunction {
    Sum,
    Avg,
    Min,
    Max,
    Count,
    Percentile,
    First,
    Last,
}

impl AggregationFunction {
    pub const ALL: [AggregationFunction; 8] = [
        AggregationFunction::Sum,
        AggregationFunction::Avg,
        AggregationFunction::Min,
        AggregationFunction::Max,
        AggregationFunction::Count,
        AggregationFunction::Percentile,
        AggregationFunction::First,
        AggregationFunction::Last,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AggregationFunction::Sum => "sum",
            AggregationFunction::Avg => "avg",
            AggregationFunction::Min => "min",
            AggregationFunction::Max => "max",
            AggregationFunction::Count => "count",
            AggregationFunction::Percentile => "percentile",
            AggregationFunction::First => "first",
            AggregationFunction::Last => "last",
        }
    }

    /// Apply the function to a set of samples
    pub fn apply(&self, samples: &[Sample<'_>], percentile: Option<f64>) -> Scalar {
        match self {
            AggregationFunction::Sum => Scalar::Number(numeric(samples).iter().sum()),
            AggregationFunction::Avg => {
                let values = numeric(samples);
                if values.is_empty() {
                    Scalar::Number(0.0)
                } else {
                    Scalar::Number(values.iter().sum::<f64>() / values.len() as f64)
                }
            }
            AggregationFunction::Min => {
                Scalar::Number(numeric(samples).into_iter().reduce(f64::min).unwrap_or(0.0))
            }
            AggregationFunction::Max => {
                Scalar::Number(numeric(samples).into_iter().reduce(f64::max).unwrap_or(0.0))
            }
            AggregationFunction::Count => Scalar::Number(numeric(samples).len() as f64),
            AggregationFunction::Percentile => {
                let mut values = numeric(samples);
                values.sort_by(f64::total_cmp);
                Scalar::Number(percentile_of_sorted(
                    &values,
                    percentile.unwrap_or(DEFAULT_PERCENTILE),
                ))
            }
            AggregationFunction::First => samples
                .iter()
                .min_by_key(|s| s.timestamp)
                .map(|s| boundary_value(&s.value))
                .unwrap_or_else(|| Scalar::Text(String::new())),
            AggregationFunction::Last => samples
                .iter()
                .max_by_key(|s| s.timestamp)
                .map(|s| boundary_value(&s.value))
                .unwrap_or_else(|| Scalar::Text(String::new())),
        }
    }
}

impl FromStr for AggregationFunction {
    type Err = PipelineError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        AggregationFunction::ALL
            .iter()
            .copied()
            .find(|f| f.name() == name)
            .ok_or_else(|| PipelineError::config(format!("Unknown aggregation function: {}", name)))
    }
}

impl fmt::Display for AggregationFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One input to an aggregation function
#[derive(Debug, Clone)]
pub struct Sample<'a> {
    pub timestamp: i64,
    pub value: Cow<'a, RecordValue>,
}

impl<'a> Sample<'a> {
    pub fn borrowed(timestamp: i64, value: &'a RecordValue) -> Self {
        Self {
            timestamp,
            value: Cow::Borrowed(value),
        }
    }
}

fn numeric(samples: &[Sample<'_>]) -> Vec<f64> {
    samples
        .iter()
        .map(|s| s.value.as_number())
        .filter(|n| !n.is_nan())
        .collect()
}

/// Linear-interpolated percentile over ascending values; `0` when empty
pub fn percentile_of_sorted(values: &[f64], percentile: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let last = (values.len() - 1) as f64;
    let rank = (percentile / 100.0 * last).clamp(0.0, last);
    let lower = rank.floor();
    let upper = rank.ceil();
    if lower == upper {
        return values[rank as usize];
    }
    let (lo, hi) = (values[lower as usize], values[upper as usize]);
    lo + (hi - lo) * (rank - lower)
}

/// Composite values never become metric values
fn boundary_value(value: &RecordValue) -> Scalar {
    if value.is_composite() {
        return Scalar::Text(String::new());
    }
    match value {
        RecordValue::Number(n) => Scalar::Number(*n),
        RecordValue::Text(s) => Scalar::Text(s.clone()),
        RecordValue::Structured(serde_json::Value::Number(n)) => {
            Scalar::Number(n.as_f64().unwrap_or(f64::NAN))
        }
        RecordValue::Structured(_) | RecordValue::Metrics(_) => Scalar::Text(value.to_text()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn numbers(values: &[f64]) -> Vec<RecordValue> {
        values.iter().map(|v| RecordValue::Number(*v)).collect()
    }

    fn samples(values: &[RecordValue]) -> Vec<Sample<'_>> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Sample::borrowed(i as i64, v))
            .collect()
    }

    #[test]
    fn test_parse_function_names() {
        assert_eq!("avg".parse::<AggregationFunction>().unwrap(), AggregationFunction::Avg);
        assert_eq!(
            "percentile".parse::<AggregationFunction>().unwrap(),
            AggregationFunction::Percentile
        );
        let err = "median".parse::<AggregationFunction>().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn test_numeric_functions() {
        let values = numbers(&[4.0, 1.0, 7.0]);
        let s = samples(&values);
        assert_eq!(AggregationFunction::Sum.apply(&s, None), Scalar::Number(12.0));
        assert_eq!(AggregationFunction::Avg.apply(&s, None), Scalar::Number(4.0));
        assert_eq!(AggregationFunction::Min.apply(&s, None), Scalar::Number(1.0));
        assert_eq!(AggregationFunction::Max.apply(&s, None), Scalar::Number(7.0));
        assert_eq!(AggregationFunction::Count.apply(&s, None), Scalar::Number(3.0));
    }

    #[test]
    fn test_non_numeric_inputs_are_dropped() {
        let values = vec![
            RecordValue::Text("10".to_string()),
            RecordValue::Text("oops".to_string()),
            RecordValue::Structured(json!({"nested": 1})),
            RecordValue::Number(5.0),
        ];
        let s = samples(&values);
        assert_eq!(AggregationFunction::Sum.apply(&s, None), Scalar::Number(15.0));
        assert_eq!(AggregationFunction::Count.apply(&s, None), Scalar::Number(2.0));
    }

    #[test]
    fn test_empty_numeric_input_is_zero() {
        let values = vec![RecordValue::Text("n/a".to_string())];
        let s = samples(&values);
        for function in [
            AggregationFunction::Sum,
            AggregationFunction::Avg,
            AggregationFunction::Min,
            AggregationFunction::Max,
            AggregationFunction::Count,
            AggregationFunction::Percentile,
        ] {
            assert_eq!(function.apply(&s, None), Scalar::Number(0.0), "{}", function);
        }
    }

    #[test]
    fn test_percentile_interpolation() {
        let values = numbers(&[200.0, 75.0, 150.0, 100.0]);
        let s = samples(&values);
        assert_eq!(
            AggregationFunction::Percentile.apply(&s, Some(50.0)),
            Scalar::Number(125.0)
        );
        let p95 = AggregationFunction::Percentile.apply(&s, None).as_f64().unwrap();
        assert!(p95 > 190.0);
        assert!((p95 - 192.5).abs() < 1e-9);
        assert_eq!(percentile_of_sorted(&[75.0, 100.0, 150.0], 50.0), 100.0);
        assert_eq!(percentile_of_sorted(&[1.0, 2.0], 100.0), 2.0);
        assert_eq!(percentile_of_sorted(&[], 50.0), 0.0);
    }

    #[test]
    fn test_first_last_follow_timestamps() {
        let values = [
            RecordValue::Text("middle".to_string()),
            RecordValue::Text("earliest".to_string()),
            RecordValue::Text("latest".to_string()),
        ];
        let s = vec![
            Sample::borrowed(20, &values[0]),
            Sample::borrowed(10, &values[1]),
            Sample::borrowed(30, &values[2]),
        ];
        assert_eq!(
            AggregationFunction::First.apply(&s, None),
            Scalar::Text("earliest".to_string())
        );
        assert_eq!(
            AggregationFunction::Last.apply(&s, None),
            Scalar::Text("latest".to_string())
        );
    }

    #[test]
    fn test_first_of_composite_is_empty_string() {
        let values = [RecordValue::Structured(json!({"count": 3}))];
        let s = samples(&values);
        assert_eq!(
            AggregationFunction::First.apply(&s, None),
            Scalar::Text(String::new())
        );
    }
}
