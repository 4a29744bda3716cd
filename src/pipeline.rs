use crate::aggregator::average;
use crate::config::TraceConfig;
use crate::record_parser::parse_raw_trace;
use crate::utils::errors::TraceError;
use crate::writers::{CsvTraceWriter, JsonTraceWriter, TraceWriter};
use log::{debug, info, trace, warn};
use std::fs;
use std::path::{Path, PathBuf};

const AVERAGE_SUFFIX: &str = ".avg";

/// Summary of one conversion run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub gpu_count: usize,
    /// Logical rows per series after tail validation
    pub rows: usize,
    pub samples: usize,
    pub skipped_lines: usize,
    pub dropped_rows: usize,
    /// Rows removed by the tail validator, summed over all five series
    pub trimmed_rows: usize,
    pub outputs: Vec<PathBuf>,
}

/// parse -> validate -> write per-metric CSV/JSON -> average -> write average CSV
pub struct Pipeline {
    config: TraceConfig,
    writers: Vec<Box<dyn TraceWriter>>,
    average_writer: Box<dyn TraceWriter>,
}

impl Pipeline {
    /// Pipeline writing CSV and JSON for every metric and a CSV average
    pub fn new(config: TraceConfig) -> Self {
        Self::with_writers(
            config,
            vec![Box::new(CsvTraceWriter), Box::new(JsonTraceWriter)],
            Box::new(CsvTraceWriter),
        )
    }

    pub fn with_writers(
        config: TraceConfig,
        writers: Vec<Box<dyn TraceWriter>>,
        average_writer: Box<dyn TraceWriter>,
    ) -> Self {
        Self {
            config,
            writers,
            average_writer,
        }
    }

    pub fn config(&self) -> &TraceConfig {
        &self.config
    }

    /// Convert one raw log. Bad lines are logged and skipped; I/O failures
    /// and a log without a single usable sample are fatal.
    pub fn run(&self, input: &Path) -> Result<RunReport, TraceError> {
        info!("Parsing {}", input.display());
        let text = fs::read_to_string(input).map_err(|e| TraceError::io(input, e))?;

        let mut parsed = parse_raw_trace(&text, &self.config);
        for skipped in &parsed.skipped {
            warn!(
                "Skipping line {}: {}\n{}",
                skipped.line_number, skipped.reason, skipped.line
            );
        }
        if parsed.samples == 0 || parsed.series.gpu.is_empty() {
            return Err(TraceError::EmptyTrace(input.to_path_buf()));
        }

        // the last cycle of a capture is often cut short
        let mut trimmed_rows = 0;
        for (metric, trimmed) in parsed.series.validate_tails() {
            if trimmed > 0 {
                debug!("Trimmed {} trailing row(s) from {} series", trimmed, metric);
            }
            trimmed_rows += trimmed;
        }

        let mut outputs = Vec::new();
        for series in parsed.series.iter() {
            if !series.is_rectangular() {
                warn!(
                    "{} series has irregular rows before its tail, output is padded to {} GPU column(s)",
                    series.metric(),
                    series.gpu_count()
                );
            }
            trace!("{} series:\n{}", series.metric(), series.to_lines().join("\n"));
            let mut frame = series.to_frame()?;
            for writer in &self.writers {
                let suffix = format!("{}{}", series.metric().suffix(), writer.extension());
                let path = self.config.layout.resolve(input, &suffix);
                writer.write(&mut frame, &path)?;
                info!("Wrote {} {}", series.metric(), path.display());
                outputs.push(path);
            }
        }

        let averages = average(&parsed.series.gpu, &parsed.series.mem);
        trace!("averages:\n{}", averages.to_lines().join("\n"));
        let suffix = format!("{}{}", AVERAGE_SUFFIX, self.average_writer.extension());
        let path = self.config.layout.resolve(input, &suffix);
        self.average_writer.write(&mut averages.to_frame()?, &path)?;
        info!("Wrote {} average row(s) {}", averages.len(), path.display());
        outputs.push(path);

        let report = RunReport {
            gpu_count: parsed.series.gpu.gpu_count(),
            rows: parsed.series.gpu.len(),
            samples: parsed.samples,
            skipped_lines: parsed.skipped.len(),
            dropped_rows: parsed.dropped_rows,
            trimmed_rows,
            outputs,
        };
        info!(
            "Converted {} sample(s) into {} row(s) for {} GPU(s), {} line(s) skipped, {} row(s) dropped, {} tail row(s) trimmed",
            report.samples,
            report.rows,
            report.gpu_count,
            report.skipped_lines,
            report.dropped_rows,
            report.trimmed_rows
        );
        Ok(report)
    }
}
