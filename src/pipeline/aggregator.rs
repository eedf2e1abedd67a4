//! Grouping and multi-metric aggregation.
//!
//! Records are bucketed by a composite group key built from the configured
//! `groupBy` fields, in first-seen order. Each bucket collapses into a single
//! output record shaped like the inputs, so aggregated output can be filtered
//! or aggregated again.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;

use crate::dates::{date_from_epoch, format_with_pattern, parse_date_literal};
use crate::error::{PipelineError, Result};
use crate::pipeline::functions::{AggregationFunction, Sample};
use crate::record::{parse_number, Labels, Metadata, Record, RecordValue, Scalar};

/// Label naming the function on function-only output
pub const AGGREGATION_LABEL: &str = "aggregation";

/// Metadata keys carried over from the first member of a group
const PROVENANCE_KEYS: [&str; 2] = ["source", "type"];

/// One `groupBy` entry: a bare field name, or a field bucketed by date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupBy {
    Field(String),
    Dated {
        field: String,
        #[serde(rename = "dateFormat")]
        date_format: String,
    },
}

impl GroupBy {
    pub fn field(&self) -> &str {
        match self {
            GroupBy::Field(field) | GroupBy::Dated { field, .. } => field,
        }
    }

    pub fn date_format(&self) -> Option<&str> {
        match self {
            GroupBy::Field(_) => None,
            GroupBy::Dated { date_format, .. } => Some(date_format),
        }
    }
}

impl From<&str> for GroupBy {
    fn from(field: &str) -> Self {
        GroupBy::Field(field.to_string())
    }
}

/// A named statistic computed per group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSpec {
    pub name: String,
    /// Field to summarize; the records' own values when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub function: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentile: Option<f64>,
}

impl MetricSpec {
    pub fn new(name: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field: None,
            function: function.into(),
            percentile: None,
        }
    }

    pub fn on_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_percentile(mut self, percentile: f64) -> Self {
        self.percentile = Some(percentile);
        self
    }
}

/// How records are grouped and summarized
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<GroupBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<Vec<MetricSpec>>,
    /// Used when no metric list is given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentile: Option<f64>,
}

impl AggregationConfig {
    pub fn with_function(function: impl Into<String>) -> Self {
        Self {
            function: Some(function.into()),
            ..Self::default()
        }
    }

    pub fn group_by<G: Into<GroupBy>>(mut self, entries: impl IntoIterator<Item = G>) -> Self {
        self.group_by = entries.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metrics(mut self, metrics: Vec<MetricSpec>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

#[derive(Debug, Clone)]
struct CompiledMetric {
    name: String,
    field: Option<String>,
    function: AggregationFunction,
    percentile: Option<f64>,
}

#[derive(Debug, Clone)]
enum Summary {
    Single {
        function: AggregationFunction,
        percentile: Option<f64>,
    },
    Metrics(Vec<CompiledMetric>),
}

impl Summary {
    fn compile(config: &AggregationConfig) -> Result<Self> {
        if let Some(metrics) = &config.metrics {
            let compiled = metrics
                .iter()
                .map(|metric| -> Result<CompiledMetric> {
                    Ok(CompiledMetric {
                        name: metric.name.clone(),
                        field: metric.field.clone(),
                        function: metric.function.parse()?,
                        percentile: metric.percentile,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            return Ok(Summary::Metrics(compiled));
        }

        let function = config.function.as_deref().ok_or_else(|| {
            PipelineError::config("Aggregation requires either 'function' or 'metrics'")
        })?;
        Ok(Summary::Single {
            function: function.parse()?,
            percentile: config.percentile,
        })
    }
}

/// Aggregates batches with a fixed configuration
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    config: Option<AggregationConfig>,
}

impl Aggregator {
    pub fn new(config: Option<AggregationConfig>) -> Self {
        Self { config }
    }

    pub fn aggregate(&self, records: Vec<Record>) -> Result<Vec<Record>> {
        aggregate(records, self.config.as_ref())
    }
}

/// Aggregate `records` according to `config`.
///
/// Without a config, or with neither `groupBy` nor `function`, the records
/// are returned unchanged. Unknown function names are a configuration error.
pub fn aggregate(records: Vec<Record>, config: Option<&AggregationConfig>) -> Result<Vec<Record>> {
    let config = match config {
        Some(config) => config,
        None => return Ok(records),
    };

    if !config.group_by.is_empty() {
        let summary = Summary::compile(config)?;
        let buckets = bucket_records(records, &config.group_by);
        tracing::debug!("Aggregating {} groups", buckets.len());

        buckets
            .into_values()
            .map(|bucket| summarize(&bucket, &config.group_by, &summary))
            .collect()
    } else if config.function.is_some() {
        let summary = Summary::compile(config)?;
        if records.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![summarize(&records, &[], &summary)?])
    } else {
        Ok(records)
    }
}

/// Bucket records by group key, keeping first-seen bucket order
fn bucket_records(records: Vec<Record>, group_by: &[GroupBy]) -> IndexMap<String, Vec<Record>> {
    let mut buckets: IndexMap<String, Vec<Record>> = IndexMap::new();
    for record in records {
        let key = group_key(&record, group_by);
        buckets.entry(key).or_default().push(record);
    }
    buckets
}

/// Composite key: `field:value` segments joined by `|`, in groupBy order
pub fn group_key(record: &Record, group_by: &[GroupBy]) -> String {
    group_by
        .iter()
        .map(|entry| {
            let resolved = match entry.date_format() {
                Some(pattern) => format_group_date(record, entry.field(), pattern),
                None => lookup_field(record, entry.field()).map(|v| v.to_text()),
            };
            format!("{}:{}", entry.field(), resolved.unwrap_or_default())
        })
        .collect::<Vec<_>>()
        .join("|")
}

/// Look a name up in labels, metadata, extracted fields, then `value`/`timestamp`
pub fn lookup_field<'a>(record: &'a Record, field: &str) -> Option<Cow<'a, RecordValue>> {
    if let Some(label) = record.labels.get(field) {
        return Some(Cow::Owned(RecordValue::Text(label.clone())));
    }
    if let Some(value) = record.metadata.get(field).filter(|v| !v.is_null()) {
        return Some(Cow::Owned(RecordValue::from_json(value.clone())));
    }
    if let Some(value) = record
        .extracted_fields()
        .and_then(|fields| fields.get(field))
        .filter(|v| !v.is_null())
    {
        return Some(Cow::Owned(RecordValue::from_json(value.clone())));
    }
    match field {
        "value" if !record.value.is_null() => Some(Cow::Borrowed(&record.value)),
        "timestamp" => Some(Cow::Owned(RecordValue::Number(record.timestamp as f64))),
        _ => None,
    }
}

fn format_group_date(record: &Record, field: &str, pattern: &str) -> Option<String> {
    let value = lookup_field(record, field)?;
    let date = match &*value {
        RecordValue::Number(n) => date_from_epoch(*n),
        RecordValue::Text(s) => {
            parse_date_literal(s).or_else(|| date_from_epoch(parse_number(s)))
        }
        RecordValue::Structured(_) | RecordValue::Metrics(_) => None,
    };
    match date.map(|d| format_with_pattern(&d, pattern)) {
        Some(Ok(rendered)) => Some(rendered),
        Some(Err(err)) => {
            tracing::debug!("Grouping on unformatted '{}': {}", field, err);
            Some(value.to_text())
        }
        None => Some(value.to_text()),
    }
}

/// Resolved group-by labels of a bucket, taken from its first member
fn group_labels(first: &Record, group_by: &[GroupBy]) -> Vec<(String, String)> {
    let mut labels = Vec::new();
    for entry in group_by {
        let field = entry.field();
        if let Some(value) = lookup_field(first, field) {
            labels.push((field.to_string(), value.to_text()));
        }
        if let Some(pattern) = entry.date_format() {
            if let Some(formatted) = format_group_date(first, field, pattern) {
                labels.push((format!("{}_formatted", field), formatted));
            }
        }
    }
    labels
}

fn summarize(bucket: &[Record], group_by: &[GroupBy], summary: &Summary) -> Result<Record> {
    let first = bucket
        .first()
        .ok_or_else(|| PipelineError::processing("Cannot summarize an empty group"))?;

    let mut labels: Labels = first.labels.clone();
    for (key, value) in group_labels(first, group_by) {
        labels.insert(key, value);
    }

    let min_timestamp = bucket.iter().map(|r| r.timestamp).min().unwrap_or(first.timestamp);
    let max_timestamp = bucket.iter().map(|r| r.timestamp).max().unwrap_or(first.timestamp);

    let mut metadata = Metadata::new();
    for key in PROVENANCE_KEYS {
        if let Some(value) = first.metadata.get(key) {
            metadata.insert(key.to_string(), value.clone());
        }
    }
    metadata.insert("count".to_string(), Value::from(bucket.len()));
    metadata.insert("minTimestamp".to_string(), Value::from(min_timestamp));
    metadata.insert("maxTimestamp".to_string(), Value::from(max_timestamp));

    let value = match summary {
        Summary::Single {
            function,
            percentile,
        } => {
            let samples: Vec<Sample<'_>> = bucket
                .iter()
                .map(|r| Sample::borrowed(r.timestamp, &r.value))
                .collect();
            labels.insert(AGGREGATION_LABEL.to_string(), function.name().to_string());
            RecordValue::from(function.apply(&samples, *percentile))
        }
        Summary::Metrics(metrics) => {
            let computed: IndexMap<String, Scalar> = metrics
                .iter()
                .map(|metric| (metric.name.clone(), compute_metric(bucket, metric)))
                .collect();
            let mirror = computed
                .iter()
                .map(|(name, scalar)| (name.clone(), scalar.to_json()))
                .collect();
            metadata.insert("metrics".to_string(), Value::Object(mirror));
            RecordValue::Metrics(computed)
        }
    };

    Ok(Record {
        timestamp: min_timestamp,
        value,
        labels,
        metadata,
    })
}

fn compute_metric(bucket: &[Record], metric: &CompiledMetric) -> Scalar {
    let field = match &metric.field {
        Some(field) => field,
        None => {
            let samples: Vec<Sample<'_>> = bucket
                .iter()
                .map(|r| Sample::borrowed(r.timestamp, &r.value))
                .collect();
            return metric.function.apply(&samples, metric.percentile);
        }
    };

    let samples: Vec<Sample<'_>> = bucket
        .iter()
        .filter_map(|r| {
            lookup_field(r, field).map(|value| Sample {
                timestamp: r.timestamp,
                value,
            })
        })
        .collect();

    match metric.function {
        AggregationFunction::Count => Scalar::Number(samples.len() as f64),
        function => function.apply(&samples, metric.percentile),
    }
}
