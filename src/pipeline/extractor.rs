//! Field extraction from record payloads.
//!
//! Each [`FieldExtraction`] rule names a destination key and a path into the
//! record. Raw text payloads are parsed as JSON first; payloads that fail to
//! parse can still feed `labels.*`, `value` and `timestamp` rules.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;

use crate::path::FieldPath;
use crate::pipeline::formatter::{self, FieldType, Transform};
use crate::record::{
    number_to_json, FieldValue, Labels, Record, RecordValue, EXTRACTED_FIELDS_KEY,
};

const LABELS_PREFIX: &str = "labels.";

/// Rule describing how to pull one named value out of a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldExtraction {
    /// Destination key in labels and `extractedFields`
    pub name: String,
    /// Dotted path: `labels.<key>`, `value`, `timestamp`, or a payload path
    pub path: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub field_type: Option<FieldType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
}

impl FieldExtraction {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            field_type: None,
            format: None,
            transform: None,
        }
    }

    pub fn with_type(mut self, field_type: FieldType) -> Self {
        self.field_type = Some(field_type);
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

/// Where a rule reads its value from
#[derive(Debug, Clone)]
enum Source {
    Label(String),
    Value,
    Timestamp,
    Payload(FieldPath),
}

impl Source {
    fn parse(path: &str) -> Self {
        if let Some(key) = path.strip_prefix(LABELS_PREFIX) {
            return Source::Label(key.to_string());
        }
        match path {
            "value" => Source::Value,
            "timestamp" => Source::Timestamp,
            other => Source::Payload(FieldPath::from_dotted(other)),
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: FieldExtraction,
    source: Source,
}

/// A record payload after the JSON parse attempt
struct Payload<'a> {
    json: Cow<'a, Value>,
    parsed: bool,
}

impl<'a> Payload<'a> {
    fn from_value(value: &'a RecordValue) -> Self {
        match value {
            RecordValue::Text(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(json) => Payload {
                    json: Cow::Owned(json),
                    parsed: true,
                },
                Err(_) => Payload {
                    json: Cow::Owned(Value::String(raw.clone())),
                    parsed: false,
                },
            },
            RecordValue::Number(n) => Payload {
                json: Cow::Owned(number_to_json(*n)),
                parsed: true,
            },
            RecordValue::Structured(json) => Payload {
                json: Cow::Borrowed(json),
                parsed: true,
            },
            RecordValue::Metrics(_) => Payload {
                json: Cow::Owned(value.to_json()),
                parsed: true,
            },
        }
    }
}

/// Applies a fixed list of extraction rules to records
#[derive(Debug, Clone, Default)]
pub struct FieldExtractor {
    rules: Vec<CompiledRule>,
}

impl FieldExtractor {
    pub fn new(rules: Vec<FieldExtraction>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| CompiledRule {
                source: Source::parse(&rule.path),
                rule,
            })
            .collect();
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Extract all configured fields from a raw value.
    ///
    /// Rules whose path does not resolve are left out of the result; a
    /// missing key means "not available", never null. A `timestamp` rule
    /// reads the payload's own `timestamp` member only.
    pub fn extract(
        &self,
        raw: Option<&RecordValue>,
        labels: &Labels,
    ) -> IndexMap<String, FieldValue> {
        let mut fields = IndexMap::new();
        let raw = match raw {
            Some(raw) if !self.is_empty() => raw,
            _ => return fields,
        };
        let payload = Payload::from_value(raw);

        for compiled in &self.rules {
            let resolved = match &compiled.source {
                Source::Label(key) => labels.get(key).map(|v| FieldValue::Text(v.clone())),
                Source::Value => {
                    let inner = payload.json.as_object().and_then(|obj| obj.get("value"));
                    Some(FieldValue::from_json(inner.unwrap_or(&*payload.json)))
                }
                Source::Timestamp => payload
                    .json
                    .as_object()
                    .and_then(|obj| obj.get("timestamp"))
                    .map(FieldValue::from_json),
                Source::Payload(path) if payload.parsed => {
                    path.resolve(&*payload.json).map(FieldValue::from_json)
                }
                Source::Payload(_) => None,
            };

            let value = match resolved {
                Some(value) if !value.is_null() => formatter::format(value, &compiled.rule),
                _ => continue,
            };
            if !value.is_null() {
                fields.insert(compiled.rule.name.clone(), value);
            }
        }

        fields
    }

    /// Extract fields from a record and merge them into a new record.
    ///
    /// Returns `Cow::Borrowed` with the input untouched when nothing was
    /// extracted, so callers can tell the two cases apart without comparing.
    pub fn apply_to_record<'a>(&self, record: &'a Record) -> Cow<'a, Record> {
        let fields = self.extract(Some(&record.value), &record.labels);
        if fields.is_empty() {
            return Cow::Borrowed(record);
        }

        let mut enriched = record.clone();
        let mut extracted = serde_json::Map::new();
        for (name, value) in fields {
            enriched.labels.insert(name.clone(), value.to_string());
            extracted.insert(name, value.to_json());
        }
        enriched
            .metadata
            .insert(EXTRACTED_FIELDS_KEY.to_string(), Value::Object(extracted));

        Cow::Owned(enriched)
    }

    /// Apply extraction to every record of a batch
    pub fn apply_all(&self, records: Vec<Record>) -> Vec<Record> {
        if self.is_empty() {
            return records;
        }

        let mut enriched_count = 0usize;
        let output: Vec<Record> = records
            .into_iter()
            .map(|record| {
                let enriched = match self.apply_to_record(&record) {
                    Cow::Owned(enriched) => Some(enriched),
                    Cow::Borrowed(_) => None,
                };
                match enriched {
                    Some(enriched) => {
                        enriched_count += 1;
                        enriched
                    }
                    None => record,
                }
            })
            .collect();

        tracing::debug!(
            "Extracted fields on {} of {} records",
            enriched_count,
            output.len()
        );
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn log_record(line: &str) -> Record {
        Record::new(1_700_000_000_000, RecordValue::Text(line.to_string()))
            .with_label("job", "api")
    }

    #[test]
    fn test_no_rules_is_empty() {
        let extractor = FieldExtractor::new(vec![]);
        let record = log_record("{\"a\": 1}");
        assert!(extractor.extract(Some(&record.value), &record.labels).is_empty());
    }

    #[test]
    fn test_extract_none_is_empty() {
        let extractor = FieldExtractor::new(vec![FieldExtraction::new("job", "labels.job")]);
        let mut labels = Labels::new();
        labels.insert("job".to_string(), "api".to_string());
        assert!(extractor.extract(None, &labels).is_empty());
    }

    #[test]
    fn test_extract_nested_json_paths() {
        let extractor = FieldExtractor::new(vec![
            FieldExtraction::new("method", "request.method").with_transform(Transform::Lowercase),
            FieldExtraction::new("status", "response.status").with_type(FieldType::String),
            FieldExtraction::new("first_tag", "tags.0"),
            FieldExtraction::new("missing", "request.nothing"),
        ]);
        let payload = json!({
            "request": {"method": "POST"},
            "response": {"status": 503},
            "tags": ["edge", "eu"]
        });
        let record = log_record(&payload.to_string());

        let fields = extractor.extract(Some(&record.value), &record.labels);
        assert_eq!(fields.get("method"), Some(&FieldValue::Text("post".to_string())));
        assert_eq!(fields.get("status"), Some(&FieldValue::Text("503".to_string())));
        assert_eq!(fields.get("first_tag"), Some(&FieldValue::Text("edge".to_string())));
        assert!(!fields.contains_key("missing"));
    }

    #[test]
    fn test_malformed_json_still_serves_labels_and_value() {
        let extractor = FieldExtractor::new(vec![
            FieldExtraction::new("service", "labels.job").with_transform(Transform::Uppercase),
            FieldExtraction::new("line", "value"),
            FieldExtraction::new("level", "level"),
        ]);
        let record = log_record("{not json at all");

        let fields = extractor.extract(Some(&record.value), &record.labels);
        assert_eq!(fields.get("service"), Some(&FieldValue::Text("API".to_string())));
        assert_eq!(
            fields.get("line"),
            Some(&FieldValue::Text("{not json at all".to_string()))
        );
        assert!(!fields.contains_key("level"));
    }

    #[test]
    fn test_value_path_prefers_value_member() {
        let extractor = FieldExtractor::new(vec![FieldExtraction::new("v", "value")]);
        let record = Record::new(0, RecordValue::Structured(json!({"value": 7, "unit": "ms"})));
        let fields = extractor.extract(Some(&record.value), &record.labels);
        assert_eq!(fields.get("v"), Some(&FieldValue::Number(7.0)));
    }

    #[test]
    fn test_timestamp_path() {
        let extractor = FieldExtractor::new(vec![FieldExtraction::new("ts", "timestamp")
            .with_transform(Transform::Date)
            .with_format("yyyy-MM-dd")]);

        let with_member = log_record(r#"{"timestamp": 1700000000}"#);
        let fields = extractor.extract(Some(&with_member.value), &with_member.labels);
        assert_eq!(fields.get("ts"), Some(&FieldValue::Text("2023-11-14".to_string())));

        let enriched = extractor.apply_to_record(&with_member);
        assert_eq!(enriched.labels.get("ts"), Some(&"2023-11-14".to_string()));

        // the record's own timestamp is not a payload member
        let without_member = log_record(r#"{"message": "no timestamp"}"#);
        assert!(extractor
            .extract(Some(&without_member.value), &without_member.labels)
            .is_empty());
        assert!(matches!(
            extractor.apply_to_record(&without_member),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn test_apply_to_record_merges_labels_and_metadata() {
        let extractor = FieldExtractor::new(vec![
            FieldExtraction::new("job", "service"),
            FieldExtraction::new("duration", "duration_ms").with_type(FieldType::Number),
        ]);
        let record = log_record(r#"{"service": "billing", "duration_ms": "12.5"}"#)
            .with_label("env", "prod");

        let enriched = extractor.apply_to_record(&record);
        assert!(matches!(enriched, Cow::Owned(_)));

        let keys: Vec<&String> = enriched.labels.keys().collect();
        assert_eq!(keys, vec!["job", "env", "duration"]);
        assert_eq!(enriched.labels.get("job"), Some(&"billing".to_string()));
        assert_eq!(enriched.labels.get("duration"), Some(&"12.5".to_string()));
        assert_eq!(
            enriched.metadata.get(EXTRACTED_FIELDS_KEY),
            Some(&json!({"job": "billing", "duration": 12.5}))
        );

        // input untouched
        assert_eq!(record.labels.get("job"), Some(&"api".to_string()));
        assert!(record.metadata.get(EXTRACTED_FIELDS_KEY).is_none());
    }

    #[test]
    fn test_apply_to_record_identity_when_nothing_extracted() {
        let extractor = FieldExtractor::new(vec![FieldExtraction::new("user", "user.id")]);
        let record = log_record(r#"{"other": true}"#);

        match extractor.apply_to_record(&record) {
            Cow::Borrowed(same) => assert!(std::ptr::eq(same, &record)),
            Cow::Owned(_) => panic!("expected the input record back"),
        }
    }

    #[test]
    fn test_null_values_are_not_synthesized() {
        let extractor = FieldExtractor::new(vec![FieldExtraction::new("user", "user")]);
        let record = log_record(r#"{"user": null}"#);
        assert!(extractor.extract(Some(&record.value), &record.labels).is_empty());
    }

    #[test]
    fn test_apply_all_keeps_order() {
        let extractor = FieldExtractor::new(vec![FieldExtraction::new("level", "level")]);
        let records = vec![
            log_record(r#"{"level": "info"}"#),
            log_record("unstructured"),
            log_record(r#"{"level": "error"}"#),
        ];

        let output = extractor.apply_all(records);
        assert_eq!(output.len(), 3);
        assert_eq!(output[0].labels.get("level"), Some(&"info".to_string()));
        assert_eq!(output[1].labels.get("level"), None);
        assert_eq!(output[2].labels.get("level"), Some(&"error".to_string()));
    }
}
