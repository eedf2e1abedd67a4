//! Pipeline configuration loader.
//!
//! Loads extraction, filter, aggregation and output settings from YAML (JSON
//! files work too) and validates rule shapes before any record is touched.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::output::OutputFormat;
use crate::pipeline::aggregator::AggregationConfig;
use crate::pipeline::extractor::FieldExtraction;
use crate::pipeline::filter::DataFilter;
use crate::pipeline::functions::AggregationFunction;

/// Complete configuration for one pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Extraction rules, applied per record
    #[serde(default)]
    pub extract: Vec<FieldExtraction>,

    /// Filter rules, all of which must pass
    #[serde(default)]
    pub filters: Vec<DataFilter>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<AggregationConfig>,

    #[serde(default)]
    pub output: OutputConfig,
}

/// How results are written
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,

    /// Dotted column paths; whole records are written when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file.
    ///
    /// # Errors
    /// Returns a filesystem error if the file cannot be read, a config error
    /// if it does not parse, and a validation error for bad rule shapes.
    ///
    /// # Example
    /// ```ignore
    /// use telepipe::PipelineConfig;
    ///
    /// let config = PipelineConfig::load_from_file("config/pipeline.yaml")?;
    /// println!("{} filters", config.filters.len());
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let contents = fs::read_to_string(path).map_err(|e| {
            PipelineError::filesystem(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config = Self::from_yaml_str(&contents)?;
        tracing::debug!(
            "Loaded pipeline config from {}: {} extraction rules, {} filters",
            path.display(),
            config.extract.len(),
            config.filters.len()
        );
        Ok(config)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check rule shapes.
    ///
    /// Checks:
    /// - Extraction rules have a name and a path, names are unique
    /// - Filter rules name a field
    /// - Group-by fields are non-empty
    /// - Metric names are non-empty and unique
    /// - Function names are known and percentiles lie within 0..=100
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for rule in &self.extract {
            if rule.name.trim().is_empty() {
                return Err(PipelineError::validation("Extraction rule name cannot be empty"));
            }
            if rule.path.trim().is_empty() {
                return Err(PipelineError::validation(format!(
                    "Extraction rule '{}' has an empty path",
                    rule.name
                )));
            }
            if !names.insert(rule.name.as_str()) {
                return Err(PipelineError::validation(format!(
                    "Duplicate extraction rule name '{}'",
                    rule.name
                )));
            }
        }

        for filter in &self.filters {
            if filter.field.trim().is_empty() {
                return Err(PipelineError::validation(format!(
                    "Filter with pattern '{}' has an empty field",
                    filter.pattern
                )));
            }
        }

        if let Some(aggregation) = &self.aggregation {
            validate_aggregation(aggregation)?;
        }

        if let Some(columns) = &self.output.columns {
            if columns.iter().any(|c| c.trim().is_empty()) {
                return Err(PipelineError::validation("Output column paths cannot be empty"));
            }
        }

        Ok(())
    }
}

fn validate_aggregation(config: &AggregationConfig) -> Result<()> {
    if config.group_by.iter().any(|g| g.field().trim().is_empty()) {
        return Err(PipelineError::validation("groupBy fields cannot be empty"));
    }
    if !config.group_by.is_empty() && config.function.is_none() && config.metrics.is_none() {
        return Err(PipelineError::validation(
            "groupBy requires either 'function' or 'metrics'",
        ));
    }

    if let Some(function) = &config.function {
        function.parse::<AggregationFunction>()?;
    }
    validate_percentile(config.percentile, "aggregation")?;

    let mut names = HashSet::new();
    for metric in config.metrics.iter().flatten() {
        if metric.name.trim().is_empty() {
            return Err(PipelineError::validation("Metric name cannot be empty"));
        }
        if !names.insert(metric.name.as_str()) {
            return Err(PipelineError::validation(format!(
                "Duplicate metric name '{}'",
                metric.name
            )));
        }
        metric.function.parse::<AggregationFunction>()?;
        validate_percentile(metric.percentile, &metric.name)?;
    }

    Ok(())
}

fn validate_percentile(percentile: Option<f64>, owner: &str) -> Result<()> {
    match percentile {
        Some(p) if !(0.0..=100.0).contains(&p) => Err(PipelineError::validation(format!(
            "Percentile for '{}' must be between 0 and 100, got {}",
            owner, p
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::pipeline::aggregator::GroupBy;
    use crate::pipeline::filter::{FilterMode, MatchType};
    use crate::pipeline::formatter::{FieldType, Transform};
    use std::io::Write;
    use tempfile::TempDir;

    const FULL_CONFIG: &str = r#"
extract:
  - name: level
    path: level
    transform: lowercase
  - name: duration
    path: http.duration_ms
    type: number
    format: "0.00"
filters:
  - field: labels.level
    pattern: debug
    mode: exclude
    type: exact
  - field: labels.path
    pattern: "^/api/"
    type: regex
    caseSensitive: true
aggregation:
  groupBy:
    - service
    - field: timestamp
      dateFormat: yyyy-MM-dd
  metrics:
    - name: requests
      function: count
    - name: p99_duration
      field: duration
      function: percentile
      percentile: 99
output:
  format: json
  columns: [labels.service, value.requests]
"#;

    fn write_config(dir: &Path, contents: &str) -> std::path::PathBuf {
        let file_path = dir.join("pipeline.yaml");
        let mut file = fs::File::create(&file_path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file_path
    }

    #[test]
    fn test_load_full_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(temp_dir.path(), FULL_CONFIG);

        let config = PipelineConfig::load_from_file(&path).unwrap();

        assert_eq!(config.extract.len(), 2);
        assert_eq!(config.extract[0].transform, Some(Transform::Lowercase));
        assert_eq!(config.extract[1].field_type, Some(FieldType::Number));
        assert_eq!(config.extract[1].format.as_deref(), Some("0.00"));

        assert_eq!(config.filters[0].mode, FilterMode::Exclude);
        assert_eq!(config.filters[1].match_type, MatchType::Regex);
        assert!(config.filters[1].case_sensitive);

        let aggregation = config.aggregation.unwrap();
        assert_eq!(aggregation.group_by[0], GroupBy::Field("service".to_string()));
        assert_eq!(aggregation.group_by[1].date_format(), Some("yyyy-MM-dd"));
        let metrics = aggregation.metrics.unwrap();
        assert_eq!(metrics[1].percentile, Some(99.0));
        assert_eq!(metrics[1].field.as_deref(), Some("duration"));

        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.output.columns.unwrap().len(), 2);
    }

    #[test]
    fn test_json_config_is_accepted() {
        let config = PipelineConfig::from_yaml_str(
            r#"{"filters": [{"field": "labels.level", "pattern": "error"}],
                "aggregation": {"function": "count"}}"#,
        )
        .unwrap();
        assert_eq!(config.filters[0].mode, FilterMode::Include);
        assert_eq!(config.filters[0].match_type, MatchType::Exact);
        assert_eq!(config.output.format, OutputFormat::Ndjson);
    }

    #[test]
    fn test_missing_file() {
        let err = PipelineConfig::load_from_file("/nonexistent/pipeline.yaml").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Filesystem);
    }

    #[test]
    fn test_malformed_yaml_is_config_error() {
        let err = PipelineConfig::from_yaml_str("filters: [unclosed").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_unknown_enum_value_rejected() {
        let result = PipelineConfig::from_yaml_str(
            "filters:\n  - field: value\n    pattern: x\n    type: fuzzy\n",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_errors() {
        let cases = [
            "extract:\n  - name: a\n    path: x\n  - name: a\n    path: y\n",
            "extract:\n  - name: ''\n    path: x\n",
            "filters:\n  - field: ''\n    pattern: x\n",
            "aggregation:\n  groupBy: [service]\n",
            "aggregation:\n  function: percentile\n  percentile: 150\n",
            concat!(
                "aggregation:\n  metrics:\n",
                "    - name: a\n      function: sum\n",
                "    - name: a\n      function: max\n",
            ),
        ];
        for case in cases {
            let err = PipelineConfig::from_yaml_str(case).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "case: {}", case);
        }
    }

    #[test]
    fn test_unknown_function_rejected_at_load() {
        let err = PipelineConfig::from_yaml_str("aggregation:\n  function: median\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
