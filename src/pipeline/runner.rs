//! Pipeline runner composing extraction, filtering and aggregation.
//!
//! A [`Pipeline`] is built once from a [`PipelineConfig`] and can then run any
//! number of unrelated batches; it holds no per-batch state.

use serde::Serialize;

use crate::error::Result;
use crate::pipeline::aggregator::Aggregator;
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::extractor::FieldExtractor;
use crate::pipeline::filter::{FilterEngine, FilterStats};
use crate::record::Record;

/// Result of running one batch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutput {
    pub records: Vec<Record>,
    pub filter_stats: FilterStats,
}

/// Extract → filter → aggregate over in-memory batches
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    extractor: FieldExtractor,
    filter: FilterEngine,
    aggregator: Aggregator,
}

impl Pipeline {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            extractor: FieldExtractor::new(config.extract.clone()),
            filter: FilterEngine::new(&config.filters),
            aggregator: Aggregator::new(config.aggregation.clone()),
        }
    }

    /// Run one batch through every stage.
    ///
    /// # Errors
    /// Only aggregation can fail, on an unknown function name.
    pub fn run(&self, records: Vec<Record>) -> Result<PipelineOutput> {
        let extracted = self.extractor.apply_all(records);
        let original = extracted.len();

        let filtered = self.filter.filter_all(extracted);
        let filter_stats = FilterEngine::stats(original, filtered.len());

        let records = self.aggregator.aggregate(filtered)?;
        tracing::info!(
            "Pipeline processed {} records: {} kept ({}% excluded), {} output",
            filter_stats.original,
            filter_stats.filtered,
            filter_stats.excluded_percentage,
            records.len()
        );

        Ok(PipelineOutput {
            records,
            filter_stats,
        })
    }

    /// Run independent batches; a failing batch does not stop the others
    pub fn run_batches(&self, batches: Vec<Vec<Record>>) -> Vec<Result<PipelineOutput>> {
        batches
            .into_iter()
            .enumerate()
            .map(|(index, batch)| {
                let result = self.run(batch);
                if let Err(err) = &result {
                    tracing::error!("Batch {} failed: {}", index, err);
                }
                result
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::record::{RecordValue, Scalar};

    fn log_line(ts: i64, service: &str, body: &str) -> Record {
        Record::new(ts, RecordValue::Text(body.to_string())).with_label("service", service)
    }

    fn config() -> PipelineConfig {
        PipelineConfig::from_yaml_str(
            r#"
extract:
  - name: level
    path: level
  - name: latency
    path: latency_ms
    type: number
filters:
  - field: labels.level
    pattern: debug
    mode: exclude
aggregation:
  groupBy: [service]
  metrics:
    - name: lines
      field: level
      function: count
    - name: avg_latency
      field: latency
      function: avg
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_run_composes_stages() {
        let pipeline = Pipeline::new(&config());
        let output = pipeline
            .run(vec![
                log_line(1, "api", r#"{"level": "info", "latency_ms": 10}"#),
                log_line(2, "api", r#"{"level": "debug", "latency_ms": 1000}"#),
                log_line(3, "api", r#"{"level": "error", "latency_ms": 30}"#),
                log_line(4, "web", r#"{"level": "info", "latency_ms": "7"}"#),
                log_line(5, "web", "not json"),
            ])
            .unwrap();

        // "not json" has no level label, so the exclude rule drops it too
        assert_eq!(output.filter_stats.original, 5);
        assert_eq!(output.filter_stats.filtered, 3);
        assert_eq!(output.filter_stats.excluded_percentage, "40.0");

        assert_eq!(output.records.len(), 2);
        match &output.records[0].value {
            RecordValue::Metrics(metrics) => {
                assert_eq!(metrics["lines"], Scalar::Number(2.0));
                assert_eq!(metrics["avg_latency"], Scalar::Number(20.0));
            }
            other => panic!("expected metrics, got {:?}", other),
        }
        assert_eq!(output.records[1].labels["service"], "web");
    }

    #[test]
    fn test_run_batches_reports_each_batch() {
        let mut bad = config();
        if let Some(aggregation) = bad.aggregation.as_mut() {
            aggregation.metrics = None;
            aggregation.function = Some("median".to_string());
        }
        let pipeline = Pipeline::new(&bad);
        let results = pipeline.run_batches(vec![vec![log_line(1, "api", "{}")], vec![]]);

        // the function name is checked per batch, even an empty one
        assert_eq!(results.len(), 2);
        for result in &results {
            assert_eq!(result.as_ref().unwrap_err().kind(), ErrorKind::Config);
        }

        let good = Pipeline::new(&config());
        let results = good.run_batches(vec![
            vec![log_line(1, "api", r#"{"level": "info"}"#)],
            vec![log_line(2, "web", r#"{"level": "warn"}"#)],
        ]);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(results[1].as_ref().unwrap().records[0].labels["service"], "web");
    }

    #[test]
    fn test_pipeline_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Pipeline>();
    }
}
