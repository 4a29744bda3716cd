use crate::utils::errors::TraceError;
use itertools::Itertools;
use log::warn;
use polars::prelude::*;
use std::fmt;

pub const TIME_COLUMN: &str = "time_sec";

/// The five per-GPU metrics extracted from every sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    GpuUtilization,
    MemUtilization,
    Power,
    PerfState,
    Temperature,
}

impl Metric {
    pub const ALL: [Metric; 5] = [
        Metric::GpuUtilization,
        Metric::MemUtilization,
        Metric::Power,
        Metric::PerfState,
        Metric::Temperature,
    ];

    /// File name suffix, before the `.csv` / `.json` extension.
    /// `perf` and `temp` carry no leading dot, downstream tooling expects those names.
    pub fn suffix(&self) -> &'static str {
        match self {
            Metric::GpuUtilization => ".gpu",
            Metric::MemUtilization => ".mem",
            Metric::Power => ".pow",
            Metric::PerfState => "perf",
            Metric::Temperature => "temp",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::GpuUtilization => "gpu utilization",
            Metric::MemUtilization => "memory utilization",
            Metric::Power => "power draw",
            Metric::PerfState => "performance state",
            Metric::Temperature => "temperature",
        };
        f.write_str(name)
    }
}

/// A logged value: the token exactly as nvidia-smi printed it, and its reading
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    text: String,
    value: f64,
}

impl Measurement {
    pub fn new(text: impl Into<String>, value: f64) -> Self {
        Self {
            text: text.into(),
            value,
        }
    }

    /// `Some` when the token reads as a finite number; the text is kept as is
    pub fn parse(token: &str) -> Option<Self> {
        match token.parse::<f64>() {
            Ok(value) if value.is_finite() => Some(Self::new(token, value)),
            _ => None,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

/// One logical row: elapsed seconds followed by one value per GPU
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRow {
    pub elapsed: f64,
    pub values: Vec<Measurement>,
}

impl SeriesRow {
    pub fn new(elapsed: f64, values: Vec<Measurement>) -> Self {
        Self { elapsed, values }
    }

    /// Number of comma separated fields, time column included
    pub fn field_count(&self) -> usize {
        self.values.len() + 1
    }

    pub fn numbers(&self) -> Vec<f64> {
        self.values.iter().map(Measurement::value).collect()
    }

    /// Row text, e.g. `1.2,30,40.50`
    pub fn to_line(&self) -> String {
        std::iter::once(format_elapsed(self.elapsed))
            .chain(self.values.iter().map(|m| m.text().to_string()))
            .join(",")
    }
}

#[cfg(test)]
impl SeriesRow {
    pub(crate) fn from_tokens(elapsed: f64, tokens: &[&str]) -> Self {
        let values = tokens.iter().map(|t| Measurement::parse(t).unwrap()).collect();
        Self::new(elapsed, values)
    }
}

/// Time series of a single metric, one column per GPU
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSeries {
    metric: Metric,
    rows: Vec<SeriesRow>,
}

impl MetricSeries {
    pub fn new(metric: Metric, rows: Vec<SeriesRow>) -> Self {
        Self { metric, rows }
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn rows(&self) -> &[SeriesRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// GPU count as fixed by the first row
    pub fn gpu_count(&self) -> usize {
        self.rows.first().map(|row| row.values.len()).unwrap_or(0)
    }

    /// Trim trailing rows whose field count differs from the first row.
    ///
    /// Stops once the last row matches; never removes the first row, so a
    /// single-row or empty series comes back unchanged. Returns the number
    /// of rows removed.
    pub fn validate_tail(&mut self) -> usize {
        let Some(expected) = self.rows.first().map(SeriesRow::field_count) else {
            return 0;
        };

        let mut trimmed = 0;
        while self.rows.len() > 1 {
            match self.rows.last() {
                Some(last) if last.field_count() != expected => {
                    self.rows.pop();
                    trimmed += 1;
                }
                _ => break,
            }
        }
        trimmed
    }

    /// True when every row has the same field count
    pub fn is_rectangular(&self) -> bool {
        self.rows.iter().map(SeriesRow::field_count).all_equal()
    }

    /// `time_sec, gpu0, gpu1, ...`
    pub fn header(&self) -> Vec<String> {
        std::iter::once(TIME_COLUMN.to_string())
            .chain((0..self.gpu_count()).map(|gpu| format!("gpu{gpu}")))
            .collect()
    }

    /// Row text without header, one entry per logical row
    pub fn to_lines(&self) -> Vec<String> {
        self.rows.iter().map(SeriesRow::to_line).collect()
    }

    /// Build the string-typed frame handed to the writers.
    ///
    /// The header width comes from the first row. Narrower rows are padded
    /// with nulls, wider rows lose their extra columns.
    pub fn to_frame(&self) -> Result<DataFrame, TraceError> {
        let width = self.gpu_count();

        let overflowing = self.rows.iter().filter(|row| row.values.len() > width).count();
        if overflowing > 0 {
            warn!(
                "{} series: {} row(s) wider than {} GPU column(s), extra values dropped",
                self.metric, overflowing, width
            );
        }

        let header = self.header();
        let mut columns = Vec::with_capacity(header.len());
        columns.push(Column::new(
            header[0].as_str().into(),
            self.rows
                .iter()
                .map(|row| format_elapsed(row.elapsed))
                .collect::<Vec<_>>(),
        ));
        for (gpu, name) in header.iter().skip(1).enumerate() {
            let values: Vec<Option<String>> = self
                .rows
                .iter()
                .map(|row| row.values.get(gpu).map(|m| m.text().to_string()))
                .collect();
            columns.push(Column::new(name.as_str().into(), values));
        }

        DataFrame::new(columns).map_err(|e| {
            TraceError::Serialization(format!("Failed to build {} frame: {}", self.metric, e))
        })
    }
}

/// The five parallel series produced by one parse
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSet {
    pub gpu: MetricSeries,
    pub mem: MetricSeries,
    pub power: MetricSeries,
    pub perf_state: MetricSeries,
    pub temperature: MetricSeries,
}

impl MetricSet {
    pub fn get(&self, metric: Metric) -> &MetricSeries {
        match metric {
            Metric::GpuUtilization => &self.gpu,
            Metric::MemUtilization => &self.mem,
            Metric::Power => &self.power,
            Metric::PerfState => &self.perf_state,
            Metric::Temperature => &self.temperature,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricSeries> {
        Metric::ALL.into_iter().map(move |metric| self.get(metric))
    }

    /// Run the tail validator on every series, returning rows trimmed per metric
    pub fn validate_tails(&mut self) -> Vec<(Metric, usize)> {
        [
            &mut self.gpu,
            &mut self.mem,
            &mut self.power,
            &mut self.perf_state,
            &mut self.temperature,
        ]
        .into_iter()
        .map(|series| (series.metric(), series.validate_tail()))
        .collect()
    }
}

/// Elapsed seconds the way C's `%g` prints them: six significant digits,
/// trailing zeros dropped, exponent form outside `1e-4..1e6`
pub fn format_elapsed(seconds: f64) -> String {
    // collapse -0 so a rounded negative jitter prints as 0
    if seconds == 0.0 {
        return "0".to_string();
    }

    let scientific = format!("{seconds:.5e}");
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return scientific;
    };

    if (-4..6).contains(&exponent) {
        let precision = (5 - exponent) as usize;
        trim_fraction(&format!("{seconds:.precision$}")).to_string()
    } else {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exponent.abs())
    }
}

fn trim_fraction(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(rows: &[(f64, &[&str])]) -> MetricSeries {
        MetricSeries::new(
            Metric::GpuUtilization,
            rows.iter()
                .map(|(elapsed, tokens)| SeriesRow::from_tokens(*elapsed, tokens))
                .collect(),
        )
    }

    #[test]
    // Truncated trailing rows are removed until the last row matches
    fn test_validate_tail_trims_truncated_rows() {
        let mut s = series(&[
            (0.0, &["1", "2", "3"]),
            (1.0, &["4", "5", "6"]),
            (2.0, &["7", "8"]),
            (3.0, &["9"]),
        ]);
        assert_eq!(s.validate_tail(), 2);
        assert_eq!(s.len(), 2);
        assert!(s.is_rectangular());
    }

    #[test]
    // A mismatching row in the middle is left alone once the tail matches
    fn test_validate_tail_only_touches_tail() {
        let mut s = series(&[(0.0, &["1", "2"]), (1.0, &["3"]), (2.0, &["4", "5"])]);
        assert_eq!(s.validate_tail(), 0);
        assert_eq!(s.len(), 3);
        assert!(!s.is_rectangular());
    }

    #[test]
    // Single-row and empty series are returned unchanged
    fn test_validate_tail_degenerate() {
        let mut single = series(&[(0.0, &["1", "2"])]);
        assert_eq!(single.validate_tail(), 0);
        assert_eq!(single.len(), 1);

        let mut empty = series(&[]);
        assert_eq!(empty.validate_tail(), 0);
        assert!(empty.is_empty());
    }

    #[test]
    // Values keep the logged token text, elapsed time is rendered like %g
    fn test_to_lines() {
        let s = series(&[(0.0, &["10", "20"]), (1.2, &["30.00", "40.50"])]);
        assert_eq!(s.to_lines(), vec!["0,10,20", "1.2,30.00,40.50"]);
        assert_eq!(s.rows()[1].numbers(), vec![30.0, 40.5]);
    }

    #[test]
    // Header width follows the first row
    fn test_header() {
        let s = series(&[(0.0, &["1", "2", "3"])]);
        assert_eq!(s.header(), vec!["time_sec", "gpu0", "gpu1", "gpu2"]);
        assert_eq!(series(&[]).header(), vec!["time_sec"]);
    }

    #[test]
    // Frames pad narrow rows with nulls and keep the header width
    fn test_to_frame_pads_narrow_rows() {
        let s = series(&[(0.0, &["1", "2"]), (0.5, &["3"])]);
        let df = s.to_frame().unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 3);
        let gpu1 = df.column("gpu1").unwrap().str().unwrap();
        assert_eq!(gpu1.get(0), Some("2"));
        assert_eq!(gpu1.get(1), None);
        let time = df.column("time_sec").unwrap().str().unwrap();
        assert_eq!(time.get(1), Some("0.5"));
    }

    #[test]
    // Six significant digits, trailing zeros dropped, negative zero collapsed
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(-0.0), "0");
        assert_eq!(format_elapsed(0.1), "0.1");
        assert_eq!(format_elapsed(1.2), "1.2");
        assert_eq!(format_elapsed(60.0), "60");
        assert_eq!(format_elapsed(12345.6), "12345.6");
        assert_eq!(format_elapsed(123456.7), "123457");
        assert_eq!(format_elapsed(1234567.8), "1.23457e+06");
        assert_eq!(format_elapsed(1000000.0), "1e+06");
    }

    #[test]
    // Only finite numbers are accepted, the token text is preserved
    fn test_measurement_parse() {
        let m = Measurement::parse("40.50").unwrap();
        assert_eq!(m.text(), "40.50");
        assert_eq!(m.value(), 40.5);
        assert!(Measurement::parse("[N/A]").is_none());
        assert!(Measurement::parse("inf").is_none());
    }

    #[test]
    // Suffixes match the established output file names
    fn test_metric_suffixes() {
        let suffixes: Vec<&str> = Metric::ALL.iter().map(Metric::suffix).collect();
        assert_eq!(suffixes, vec![".gpu", ".mem", ".pow", "perf", "temp"]);
    }
}
