//! In-memory transformation pipeline.
//!
//! Stages run leaf-first: field extraction per record, filtering over the
//! batch, then aggregation into grouped summaries.

pub mod aggregator;
pub mod config;
pub mod extractor;
pub mod filter;
pub mod formatter;
pub mod functions;
pub mod runner;

// Re-export key types
pub use aggregator::{aggregate, AggregationConfig, Aggregator, GroupBy, MetricSpec};
pub use config::{OutputConfig, PipelineConfig};
pub use extractor::{FieldExtraction, FieldExtractor};
pub use filter::{DataFilter, FilterEngine, FilterMode, FilterStats, MatchType};
pub use formatter::{FieldType, Transform};
pub use functions::{AggregationFunction, DEFAULT_PERCENTILE};
pub use runner::{Pipeline, PipelineOutput};
