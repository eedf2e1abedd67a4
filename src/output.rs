//! Writing pipeline results.
//!
//! Records are written whole, or projected onto dotted column paths the way a
//! tabular exporter would read them.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

use crate::error::{PipelineError, Result};
use crate::path::FieldPath;
use crate::record::{json_to_text, Record};

/// Output encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One JSON document per line
    #[default]
    Ndjson,
    /// A single JSON array
    Json,
}

impl FromStr for OutputFormat {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ndjson" => Ok(OutputFormat::Ndjson),
            "json" => Ok(OutputFormat::Json),
            other => Err(PipelineError::validation(format!(
                "Unknown output format '{}', expected ndjson or json",
                other
            ))),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Ndjson => write!(f, "ndjson"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Streams serializable items in the chosen format
pub struct OutputWriter<W: Write> {
    writer: W,
    format: OutputFormat,
    written: usize,
}

impl<W: Write> OutputWriter<W> {
    /// Create a writer; JSON output opens its array immediately
    pub fn new(mut writer: W, format: OutputFormat) -> Result<Self> {
        if format == OutputFormat::Json {
            write!(writer, "[")?;
        }
        Ok(Self {
            writer,
            format,
            written: 0,
        })
    }

    pub fn write<T: Serialize>(&mut self, item: &T) -> Result<()> {
        let json = serde_json::to_string(item)?;
        match self.format {
            OutputFormat::Ndjson => writeln!(self.writer, "{}", json)?,
            OutputFormat::Json => {
                if self.written > 0 {
                    write!(self.writer, ",")?;
                }
                write!(self.writer, "{}", json)?;
            }
        }
        self.written += 1;
        Ok(())
    }

    pub fn write_all<T: Serialize>(&mut self, items: &[T]) -> Result<()> {
        for item in items {
            self.write(item)?;
        }
        Ok(())
    }

    /// Close the array (JSON) and flush; returns the number of items written
    pub fn finish(mut self) -> Result<usize> {
        if self.format == OutputFormat::Json {
            write!(self.writer, "]")?;
        }
        self.writer.flush()?;
        Ok(self.written)
    }
}

/// `timestamp`, `value`, then every label key in first-seen order
pub fn default_columns(records: &[Record]) -> Vec<String> {
    let mut columns = vec!["timestamp".to_string(), "value".to_string()];
    let keys: IndexSet<&str> = records
        .iter()
        .flat_map(|record| record.labels.keys().map(String::as_str))
        .collect();
    columns.extend(keys.iter().map(|key| format!("labels.{}", key)));
    columns
}

/// Render one cell: scalars plainly, composites as compact JSON, absent as empty
pub fn render_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(value) => json_to_text(value),
    }
}

/// Resolve each column path against the record
pub fn project_row(record: &Record, columns: &[String]) -> IndexMap<String, String> {
    let view = record.to_json();
    columns
        .iter()
        .map(|column| {
            let cell = render_cell(FieldPath::from_dotted(column).resolve(&view));
            (column.clone(), cell)
        })
        .collect()
}

/// Write records whole, or projected onto `columns` when given
pub fn write_records<W: Write>(
    writer: W,
    records: &[Record],
    format: OutputFormat,
    columns: Option<&[String]>,
) -> Result<usize> {
    let mut out = OutputWriter::new(writer, format)?;
    match columns {
        Some(columns) => {
            for record in records {
                out.write(&project_row(record, columns))?;
            }
        }
        None => out.write_all(records)?,
    }
    out.finish()
}
