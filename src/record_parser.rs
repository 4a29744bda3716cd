//! Record Parser
//!
//! Turns raw nvidia-smi CSV logs (`--query-gpu=timestamp,index,name,utilization.gpu,
//! utilization.memory,power.draw,pstate,temperature.gpu --format=csv`) into five
//! parallel per-metric series keyed by elapsed seconds.
//!
//! Parsing is best effort: a bad line yields a [`SkipReason`] and the caller
//! decides what to do with it. Samples that parse are fed into a
//! [`RowAssembler`], which groups per-GPU samples into logical rows.

use crate::config::{RowPolicy, TraceConfig};
use crate::series::{Measurement, Metric, MetricSeries, MetricSet, SeriesRow};
use chrono::NaiveDateTime;
use itertools::multiunzip;
use log::warn;
use thiserror::Error;

/// One parsed input line
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: NaiveDateTime,
    pub gpu_index: usize,
    pub utilization_gpu: Measurement,
    pub utilization_mem: Measurement,
    pub power_draw: Measurement,
    pub perf_state: Measurement,
    pub temperature: Measurement,
}

/// Why a line was left out of the output
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SkipReason {
    #[error("expected 8 fields, found {0}")]
    FieldCount(usize),
    #[error("unparsable timestamp {0:?}")]
    Timestamp(String),
    #[error("unparsable GPU index {0:?}")]
    GpuIndex(String),
    #[error("unparsable {field} value {value:?}")]
    Number { field: &'static str, value: String },
    #[error("performance state {0:?} has no P prefix")]
    PerfState(String),
}

/// A skipped input line, kept for diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedLine {
    /// 1-based, header included
    pub line_number: usize,
    pub line: String,
    pub reason: SkipReason,
}

/// Parse one data line. Exactly eight fields are expected: timestamp, index,
/// name, utilization.gpu, utilization.memory, power.draw, pstate, temperature.gpu.
pub fn parse_line(line: &str, timestamp_format: &str) -> Result<Sample, SkipReason> {
    let fields: Vec<&str> = line.split(',').collect();
    let [timestamp, index, _name, util_gpu, util_mem, power, perf_state, temperature] =
        fields.as_slice()
    else {
        return Err(SkipReason::FieldCount(fields.len()));
    };

    let timestamp = timestamp.trim();
    if !has_fraction(timestamp, timestamp_format) {
        return Err(SkipReason::Timestamp(timestamp.to_string()));
    }
    let timestamp = NaiveDateTime::parse_from_str(timestamp, timestamp_format)
        .map_err(|_| SkipReason::Timestamp(timestamp.to_string()))?;
    let gpu_index = index
        .trim()
        .parse::<usize>()
        .map_err(|_| SkipReason::GpuIndex(index.trim().to_string()))?;

    Ok(Sample {
        timestamp,
        gpu_index,
        utilization_gpu: leading_number(util_gpu, "utilization.gpu")?,
        utilization_mem: leading_number(util_mem, "utilization.memory")?,
        power_draw: leading_number(power, "power.draw")?,
        perf_state: parse_perf_state(perf_state)?,
        temperature: leading_number(temperature, "temperature.gpu")?,
    })
}

/// A `%.f` in the format must match one to six fractional digits.
/// chrono also accepts a missing fraction there, nvidia-smi never writes one.
fn has_fraction(timestamp: &str, timestamp_format: &str) -> bool {
    if !timestamp_format.contains("%.f") {
        return true;
    }
    timestamp.rsplit_once('.').is_some_and(|(_, fraction)| {
        (1..=6).contains(&fraction.len()) && fraction.bytes().all(|b| b.is_ascii_digit())
    })
}

/// First whitespace-delimited token of the field, e.g. `45` out of ` 45 %`
fn leading_number(field: &str, name: &'static str) -> Result<Measurement, SkipReason> {
    field
        .split_whitespace()
        .next()
        .and_then(Measurement::parse)
        .ok_or_else(|| SkipReason::Number {
            field: name,
            value: field.trim().to_string(),
        })
}

/// `P0` -> `0`. Everything up to and including the first `P` is dropped.
fn parse_perf_state(field: &str) -> Result<Measurement, SkipReason> {
    let trimmed = field.trim();
    let (_, rest) = trimmed
        .split_once('P')
        .ok_or_else(|| SkipReason::PerfState(trimmed.to_string()))?;
    let digits = rest.split('P').next().unwrap_or_default();
    let state = digits.parse::<u32>().map_err(|_| SkipReason::Number {
        field: "pstate",
        value: trimmed.to_string(),
    })?;
    Ok(Measurement::new(digits, f64::from(state)))
}

/// Seconds between `time0` and `timestamp`, rounded to 0.1 s.
///
/// Rounding works on the binary value of the float seconds, so a delta of
/// 0.45 s (stored as 0.4500000000000000111) goes up to 0.5 while an exact
/// tie such as 1.25 s goes to the even tenth.
pub fn elapsed_seconds(time0: NaiveDateTime, timestamp: NaiveDateTime) -> f64 {
    let delta = timestamp - time0;
    let micros = delta
        .num_microseconds()
        .unwrap_or_else(|| delta.num_milliseconds().saturating_mul(1_000));

    let seconds = micros as f64 / 1e6;
    format!("{seconds:.1}").parse().unwrap_or(seconds)
}

/// The per-GPU values of one sample
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub utilization_gpu: Measurement,
    pub utilization_mem: Measurement,
    pub power_draw: Measurement,
    pub perf_state: Measurement,
    pub temperature: Measurement,
}

impl From<&Sample> for Reading {
    fn from(sample: &Sample) -> Self {
        Self {
            utilization_gpu: sample.utilization_gpu.clone(),
            utilization_mem: sample.utilization_mem.clone(),
            power_draw: sample.power_draw.clone(),
            perf_state: sample.perf_state.clone(),
            temperature: sample.temperature.clone(),
        }
    }
}

/// One timestamp's worth of readings, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub struct LogicalRow {
    pub elapsed: f64,
    pub readings: Vec<Reading>,
}

#[derive(Debug)]
struct PartialRow {
    elapsed: f64,
    readings: Vec<Reading>,
    /// Index the next sample should carry
    next_index: usize,
    /// Opened by index 0 and every index arrived in sequence
    regular: bool,
}

/// Groups samples into logical rows.
///
/// State: the epoch, the row being filled and the index expected next.
/// The first sample opens row zero whatever its index; afterwards every
/// sample with index 0 closes the current row and opens a new one.
#[derive(Debug)]
pub struct RowAssembler {
    policy: RowPolicy,
    time0: Option<NaiveDateTime>,
    current: Option<PartialRow>,
    /// Width of the first regular row, fixed once it closes
    width: Option<usize>,
    rows: Vec<LogicalRow>,
    dropped: usize,
}

impl RowAssembler {
    pub fn new(policy: RowPolicy) -> Self {
        Self {
            policy,
            time0: None,
            current: None,
            width: None,
            rows: Vec::new(),
            dropped: 0,
        }
    }

    pub fn push(&mut self, sample: &Sample) {
        let Some(time0) = self.time0 else {
            self.time0 = Some(sample.timestamp);
            self.open_row(0.0, sample);
            return;
        };

        if sample.gpu_index == 0 {
            self.close_row();
            self.open_row(elapsed_seconds(time0, sample.timestamp), sample);
            return;
        }

        if let Some(row) = self.current.as_mut() {
            if sample.gpu_index != row.next_index {
                warn!(
                    "GPU index {} arrived at {}s, expected {}",
                    sample.gpu_index, row.elapsed, row.next_index
                );
                row.regular = false;
            }
            row.readings.push(Reading::from(sample));
            row.next_index = sample.gpu_index + 1;
        }
    }

    /// Close the open row and hand back the assembled rows
    pub fn finish(mut self) -> (Vec<LogicalRow>, usize) {
        self.close_row();
        (self.rows, self.dropped)
    }

    fn open_row(&mut self, elapsed: f64, sample: &Sample) {
        self.current = Some(PartialRow {
            elapsed,
            readings: vec![Reading::from(sample)],
            next_index: sample.gpu_index + 1,
            regular: sample.gpu_index == 0,
        });
    }

    fn close_row(&mut self) {
        let Some(row) = self.current.take() else {
            return;
        };

        if row.regular && self.width.is_none() {
            self.width = Some(row.readings.len());
        }

        if self.policy == RowPolicy::Strict {
            let width_matches = self.width == Some(row.readings.len());
            if !row.regular || !width_matches {
                warn!(
                    "Dropping irregular row at {}s with {} GPU reading(s)",
                    row.elapsed,
                    row.readings.len()
                );
                self.dropped += 1;
                return;
            }
        }

        self.rows.push(LogicalRow {
            elapsed: row.elapsed,
            readings: row.readings,
        });
    }
}

/// Result of parsing a whole raw log
#[derive(Debug, Clone)]
pub struct ParsedTrace {
    pub series: MetricSet,
    /// Lines that became samples
    pub samples: usize,
    pub skipped: Vec<SkippedLine>,
    /// Rows discarded by [`RowPolicy::Strict`]
    pub dropped_rows: usize,
}

/// Parse raw log text. The first line is a header and is discarded;
/// blank lines are ignored.
pub fn parse_raw_trace(text: &str, config: &TraceConfig) -> ParsedTrace {
    let mut assembler = RowAssembler::new(config.row_policy);
    let mut samples = 0;
    let mut skipped = Vec::new();

    for (idx, line) in text.lines().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(line, &config.timestamp_format) {
            Ok(sample) => {
                assembler.push(&sample);
                samples += 1;
            }
            Err(reason) => skipped.push(SkippedLine {
                line_number: idx + 1,
                line: line.to_string(),
                reason,
            }),
        }
    }

    let (rows, dropped_rows) = assembler.finish();
    ParsedTrace {
        series: split_metrics(rows),
        samples,
        skipped,
        dropped_rows,
    }
}

/// Fan logical rows out into the five per-metric series
fn split_metrics(rows: Vec<LogicalRow>) -> MetricSet {
    let mut gpu = Vec::with_capacity(rows.len());
    let mut mem = Vec::with_capacity(rows.len());
    let mut power = Vec::with_capacity(rows.len());
    let mut perf_state = Vec::with_capacity(rows.len());
    let mut temperature = Vec::with_capacity(rows.len());

    for row in rows {
        let (g, m, p, s, t): (Vec<_>, Vec<_>, Vec<_>, Vec<_>, Vec<_>) =
            multiunzip(row.readings.into_iter().map(|r| {
                (
                    r.utilization_gpu,
                    r.utilization_mem,
                    r.power_draw,
                    r.perf_state,
                    r.temperature,
                )
            }));
        gpu.push(SeriesRow::new(row.elapsed, g));
        mem.push(SeriesRow::new(row.elapsed, m));
        power.push(SeriesRow::new(row.elapsed, p));
        perf_state.push(SeriesRow::new(row.elapsed, s));
        temperature.push(SeriesRow::new(row.elapsed, t));
    }

    MetricSet {
        gpu: MetricSeries::new(Metric::GpuUtilization, gpu),
        mem: MetricSeries::new(Metric::MemUtilization, mem),
        power: MetricSeries::new(Metric::Power, power),
        perf_state: MetricSeries::new(Metric::PerfState, perf_state),
        temperature: MetricSeries::new(Metric::Temperature, temperature),
    }
}
