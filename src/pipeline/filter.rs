//! Record filtering by include/exclude rules.
//!
//! Every rule must pass for a record to survive. Rules are compiled once when
//! the engine is built; a regex that does not compile is reported with a
//! warning and then simply never matches.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::path::FieldPath;
use crate::record::{json_to_text, Record, RecordValue};

/// Whether a matching record is kept or dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[default]
    Include,
    Exclude,
}

/// How the pattern is compared to the field value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchType {
    #[default]
    Exact,
    Contains,
    StartsWith,
    EndsWith,
    Regex,
}

/// One filter rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataFilter {
    /// `value`, `timestamp`, `labels.<key>`, `metadata.<path>` or a payload path
    pub field: String,
    pub pattern: String,
    #[serde(default)]
    pub mode: FilterMode,
    #[serde(default, rename = "type")]
    pub match_type: MatchType,
    #[serde(default)]
    pub case_sensitive: bool,
}

impl DataFilter {
    pub fn new(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            pattern: pattern.into(),
            mode: FilterMode::Include,
            match_type: MatchType::Exact,
            case_sensitive: false,
        }
    }

    pub fn with_mode(mut self, mode: FilterMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_match_type(mut self, match_type: MatchType) -> Self {
        self.match_type = match_type;
        self
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }
}

#[derive(Debug, Clone)]
enum FieldRef {
    Value,
    Timestamp,
    Label(String),
    Metadata(FieldPath),
    Payload(FieldPath),
}

impl FieldRef {
    fn parse(field: &str) -> Self {
        if let Some(key) = field.strip_prefix("labels.") {
            return FieldRef::Label(key.to_string());
        }
        if let Some(path) = field.strip_prefix("metadata.") {
            return FieldRef::Metadata(FieldPath::from_dotted(path));
        }
        match field {
            "value" => FieldRef::Value,
            "timestamp" => FieldRef::Timestamp,
            other => FieldRef::Payload(FieldPath::from_dotted(other)),
        }
    }

    /// Text of the referenced field, or `None` when absent or null
    fn resolve(&self, record: &Record) -> Option<String> {
        match self {
            FieldRef::Value if record.value.is_null() => None,
            FieldRef::Value => Some(record.value.to_text()),
            FieldRef::Timestamp => Some(record.timestamp.to_string()),
            FieldRef::Label(key) => record.labels.get(key).cloned(),
            FieldRef::Metadata(path) => path
                .resolve_in(&record.metadata)
                .filter(|v| !v.is_null())
                .map(json_to_text),
            FieldRef::Payload(path) => match &record.value {
                RecordValue::Structured(json) => {
                    path.resolve(json).filter(|v| !v.is_null()).map(json_to_text)
                }
                RecordValue::Metrics(_) => {
                    let json = record.value.to_json();
                    path.resolve(&json).filter(|v| !v.is_null()).map(json_to_text)
                }
                RecordValue::Number(_) | RecordValue::Text(_) => None,
            },
        }
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Exact(String),
    Contains(String),
    StartsWith(String),
    EndsWith(String),
    Regex(Regex),
    Never,
}

#[derive(Debug, Clone)]
struct CompiledFilter {
    field: FieldRef,
    matcher: Matcher,
    mode: FilterMode,
    case_sensitive: bool,
}

impl CompiledFilter {
    fn compile(rule: &DataFilter) -> Self {
        let pattern = if rule.case_sensitive {
            rule.pattern.clone()
        } else {
            rule.pattern.to_lowercase()
        };

        let matcher = match rule.match_type {
            MatchType::Exact => Matcher::Exact(pattern),
            MatchType::Contains => Matcher::Contains(pattern),
            MatchType::StartsWith => Matcher::StartsWith(pattern),
            MatchType::EndsWith => Matcher::EndsWith(pattern),
            MatchType::Regex => match RegexBuilder::new(&rule.pattern)
                .case_insensitive(!rule.case_sensitive)
                .build()
            {
                Ok(regex) => Matcher::Regex(regex),
                Err(err) => {
                    tracing::warn!(
                        "Invalid regex pattern '{}' for filter on '{}': {}",
                        rule.pattern,
                        rule.field,
                        err
                    );
                    Matcher::Never
                }
            },
        };

        Self {
            field: FieldRef::parse(&rule.field),
            matcher,
            mode: rule.mode,
            case_sensitive: rule.case_sensitive,
        }
    }

    fn is_match(&self, text: &str) -> bool {
        let folded;
        let candidate = if self.case_sensitive {
            text
        } else {
            folded = text.to_lowercase();
            folded.as_str()
        };

        match &self.matcher {
            Matcher::Exact(p) => candidate == p.as_str(),
            Matcher::Contains(p) => candidate.contains(p.as_str()),
            Matcher::StartsWith(p) => candidate.starts_with(p.as_str()),
            Matcher::EndsWith(p) => candidate.ends_with(p.as_str()),
            Matcher::Regex(regex) => regex.is_match(text),
            Matcher::Never => false,
        }
    }

    fn passes(&self, record: &Record) -> bool {
        let text = match self.field.resolve(record) {
            Some(text) => text,
            None => return false,
        };
        let matched = self.is_match(&text);
        match self.mode {
            FilterMode::Include => matched,
            FilterMode::Exclude => !matched,
        }
    }
}

/// Summary of one filtering pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterStats {
    pub original: usize,
    pub filtered: usize,
    pub excluded: usize,
    /// One decimal place, or `"0"` for an empty input
    pub excluded_percentage: String,
}

/// Applies an ordered list of filter rules (logical AND)
#[derive(Debug, Clone, Default)]
pub struct FilterEngine {
    filters: Vec<CompiledFilter>,
}

impl FilterEngine {
    pub fn new(rules: &[DataFilter]) -> Self {
        Self {
            filters: rules.iter().map(CompiledFilter::compile).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// True when the record satisfies every rule
    pub fn matches(&self, record: &Record) -> bool {
        self.filters.iter().all(|filter| filter.passes(record))
    }

    /// Keep the records that satisfy every rule, preserving order
    pub fn filter_all(&self, records: Vec<Record>) -> Vec<Record> {
        if self.is_empty() {
            return records;
        }

        let original = records.len();
        let kept: Vec<Record> = records.into_iter().filter(|r| self.matches(r)).collect();
        tracing::debug!(
            "Filtering kept {} of {} records ({} rules)",
            kept.len(),
            original,
            self.filters.len()
        );
        kept
    }

    pub fn stats(original: usize, filtered: usize) -> FilterStats {
        let excluded = original.saturating_sub(filtered);
        let excluded_percentage = if original == 0 {
            "0".to_string()
        } else {
            format!("{:.1}", excluded as f64 / original as f64 * 100.0)
        };

        FilterStats {
            original,
            filtered,
            excluded,
            excluded_percentage,
        }
    }
}
