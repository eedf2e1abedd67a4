//! # Telepipe: Telemetry Record Transformation Library
//!
//! Telepipe enriches, filters and condenses time-stamped telemetry records
//! (log lines, metric samples) gathered from heterogeneous backends into
//! grouped summary statistics ready for tabular export.
//!
//! ## Features
//!
//! - **Field extraction**: pull typed, transformed values out of JSON payloads into labels
//! - **Filtering**: include/exclude rules over any record path, with exact, substring
//!   and regex matching
//! - **Aggregation**: composite-key grouping with sum, avg, min, max, count,
//!   percentile, first and last
//! - **Composable records**: every stage emits records shaped like its input
//!
//! ## Example: pipeline config
//!
//! ```yaml
//! extract:
//!   - name: level
//!     path: level
//!     transform: lowercase
//!   - name: duration
//!     path: http.duration_ms
//!     type: number
//! filters:
//!   - field: labels.level
//!     pattern: debug
//!     mode: exclude
//!     type: exact
//! aggregation:
//!   groupBy:
//!     - service
//!     - field: timestamp
//!       dateFormat: yyyy-MM-dd
//!   metrics:
//!     - name: requests
//!       function: count
//!     - name: p95_duration
//!       field: duration
//!       function: percentile
//!       percentile: 95
//! ```
//!
//! ## Example: library use
//!
//! ```
//! use telepipe::{aggregate, AggregationConfig, Record, RecordValue};
//!
//! let records = vec![
//!     Record::new(1_000, 100.0).with_label("service", "api"),
//!     Record::new(2_000, 150.0).with_label("service", "api"),
//!     Record::new(3_000, 75.0).with_label("service", "web"),
//! ];
//! let config = AggregationConfig::with_function("sum").group_by(["service"]);
//!
//! let groups = aggregate(records, Some(&config)).unwrap();
//! assert_eq!(groups.len(), 2);
//! assert_eq!(groups[0].value, RecordValue::Number(250.0));
//! ```

// Core modules
pub mod dates;
pub mod error;
pub mod output;
pub mod path;
pub mod record;

// Extraction, filtering and aggregation stages
pub mod pipeline;

// Re-export key types
pub use error::{ErrorKind, PipelineError, Result};
pub use path::{resolve, FieldPath, PathSegment};
pub use record::{FieldValue, Labels, Metadata, Record, RecordValue, Scalar};

pub use pipeline::{
    aggregate, AggregationConfig, AggregationFunction, Aggregator, DataFilter, FieldExtraction,
    FieldExtractor, FieldType, FilterEngine, FilterMode, FilterStats, GroupBy, MatchType,
    MetricSpec, OutputConfig, Pipeline, PipelineConfig, PipelineOutput, Transform,
};

pub use output::{default_columns, project_row, write_records, OutputFormat, OutputWriter};
