mod utils {
    pub mod errors;
    pub mod logger;
    pub mod output_path;
}

mod aggregator;
mod config;
mod pipeline;
mod record_parser;
mod series;
mod writers;

use clap::Parser;
use config::{DEFAULT_TIMESTAMP_FORMAT, RowPolicy, TraceConfig};
use log::{error, info};
use pipeline::Pipeline;
use std::path::PathBuf;
use std::process::ExitCode;
use utils::output_path::{DEFAULT_FINAL_SEGMENT, DEFAULT_RAW_SEGMENT, OutputLayout};

/// Convert raw nvidia-smi GPU logs into per-metric and average time series
#[derive(Parser, Debug)]
#[command(name = "emt_trace", version)]
struct Cli {
    /// Raw nvidia-smi CSV log
    #[arg(value_name = "RAW_FILE")]
    raw_file: PathBuf,

    /// Directory segment of the input path to replace for outputs
    #[arg(long, default_value = DEFAULT_RAW_SEGMENT)]
    raw_segment: PathBuf,

    /// Replacement for --raw-segment
    #[arg(long, default_value = DEFAULT_FINAL_SEGMENT)]
    final_segment: PathBuf,

    /// Write all outputs into this directory instead of mirroring the input path
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Timestamp format of the first column, chrono syntax
    #[arg(long, default_value = DEFAULT_TIMESTAMP_FORMAT)]
    timestamp_format: String,

    /// Drop logical rows with missing or out-of-order GPU indices
    #[arg(long)]
    strict_rows: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn trace_config(&self) -> TraceConfig {
        let layout = match &self.output_dir {
            Some(dir) => OutputLayout::directory(dir),
            None => OutputLayout::mirror(&self.raw_segment, &self.final_segment),
        };
        let row_policy = if self.strict_rows {
            RowPolicy::Strict
        } else {
            RowPolicy::Lenient
        };

        TraceConfig::default()
            .with_timestamp_format(&self.timestamp_format)
            .with_row_policy(row_policy)
            .with_layout(layout)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    utils::logger::setup_logger(cli.verbose);

    let pipeline = Pipeline::new(cli.trace_config());
    info!("Output layout: {:?}", pipeline.config().layout);

    match pipeline.run(&cli.raw_file) {
        Ok(report) => {
            info!("{} file(s) written", report.outputs.len());
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    // Missing positional argument is a usage error
    fn test_cli_requires_raw_file() {
        let err = Cli::try_parse_from(["emt_trace"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    // Flags map onto the trace configuration
    fn test_cli_trace_config() {
        let cli = Cli::try_parse_from([
            "emt_trace",
            "data/raw/node1.log",
            "--strict-rows",
            "--output-dir",
            "/tmp/out",
        ])
        .unwrap();
        let config = cli.trace_config();
        assert_eq!(config.row_policy, RowPolicy::Strict);
        assert_eq!(config.layout, OutputLayout::directory("/tmp/out"));
        assert_eq!(config.timestamp_format, DEFAULT_TIMESTAMP_FORMAT);

        let cli = Cli::try_parse_from(["emt_trace", "x.log"]).unwrap();
        assert_eq!(cli.trace_config().layout, OutputLayout::default());
    }
}
