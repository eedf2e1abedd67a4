//! telepipe CLI - run extraction, filtering and aggregation over record files
//!
//! Reads records as NDJSON (or a JSON array), runs them through a pipeline
//! described by a YAML config, and writes the results.

use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

use telepipe::{
    default_columns, write_records, OutputFormat, Pipeline, PipelineConfig, PipelineError,
    Record, Result,
};

#[derive(Parser)]
#[command(name = "telepipe")]
#[command(version, about = "Extract, filter and aggregate telemetry records", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline over a file of records
    Run {
        /// Path to the pipeline configuration (YAML or JSON)
        #[arg(short, long, default_value = "pipeline.yaml")]
        config: PathBuf,

        /// Input records as NDJSON or a JSON array
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format (ndjson, json) - overrides config file
        #[arg(short, long)]
        format: Option<OutputFormat>,

        /// Comma-separated dotted column paths - overrides config file
        #[arg(long, value_delimiter = ',')]
        columns: Option<Vec<String>>,

        /// Project onto timestamp, value and every label
        #[arg(long, conflicts_with = "columns")]
        default_columns: bool,
    },

    /// Validate a pipeline configuration without processing records
    Validate {
        /// Path to the pipeline configuration (YAML or JSON)
        #[arg(short, long, default_value = "pipeline.yaml")]
        config: PathBuf,
    },
}

fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            config,
            input,
            output,
            format,
            columns,
            default_columns,
        } => run(&config, &input, output.as_deref(), format, columns, default_columns),
        Commands::Validate { config } => validate(&config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(
    config_path: &Path,
    input: &Path,
    output: Option<&Path>,
    format: Option<OutputFormat>,
    columns: Option<Vec<String>>,
    use_default_columns: bool,
) -> Result<()> {
    let config = PipelineConfig::load_from_file(config_path)?;
    let records = read_records(input)?;
    tracing::info!("Read {} records from {}", records.len(), input.display());

    let pipeline = Pipeline::new(&config);
    let result = pipeline.run(records)?;

    let format = format.unwrap_or(config.output.format);
    let columns = if use_default_columns {
        Some(default_columns(&result.records))
    } else {
        columns.or(config.output.columns)
    };

    let written = match output {
        Some(path) => {
            let file = fs::File::create(path).map_err(|e| {
                PipelineError::filesystem(format!("Failed to create {}: {}", path.display(), e))
            })?;
            write_records(BufWriter::new(file), &result.records, format, columns.as_deref())?
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            let written = write_records(&mut handle, &result.records, format, columns.as_deref())?;
            if format == OutputFormat::Json {
                writeln!(handle)?;
            }
            written
        }
    };

    tracing::info!("Wrote {} records as {}", written, format);
    Ok(())
}

fn validate(config_path: &Path) -> Result<()> {
    let config = PipelineConfig::load_from_file(config_path)?;
    println!("✓ {} is valid", config_path.display());
    println!("  {} extraction rules", config.extract.len());
    println!("  {} filters", config.filters.len());
    match &config.aggregation {
        Some(aggregation) => println!(
            "  aggregation: {} group-by fields, {} metrics",
            aggregation.group_by.len(),
            aggregation.metrics.as_ref().map_or(0, Vec::len)
        ),
        None => println!("  no aggregation"),
    }
    Ok(())
}

/// Read records from NDJSON, or from a JSON array when the file starts with `[`
fn read_records(path: &Path) -> Result<Vec<Record>> {
    let contents = fs::read_to_string(path).map_err(|e| {
        PipelineError::filesystem(format!("Failed to read input {}: {}", path.display(), e))
    })?;

    if contents.trim_start().starts_with('[') {
        return serde_json::from_str(&contents).map_err(|e| {
            PipelineError::processing(format!("Invalid record array in {}: {}", path.display(), e))
        });
    }

    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(line_num, line)| {
            serde_json::from_str(line).map_err(|e| {
                PipelineError::processing(format!(
                    "Invalid record on line {} of {}: {}",
                    line_num + 1,
                    path.display(),
                    e
                ))
            })
        })
        .collect()
}
