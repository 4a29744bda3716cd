use crate::series::{MetricSeries, TIME_COLUMN, format_elapsed};
use crate::utils::errors::TraceError;
use log::warn;
use polars::prelude::*;

pub const GPU_MEAN_COLUMN: &str = "GPU";
pub const MEMORY_MEAN_COLUMN: &str = "MEMORY";

/// Arithmetic mean; an empty slice averages to 0.0
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Cross-GPU means for one logical row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AverageRow {
    pub elapsed: f64,
    pub gpu: f64,
    pub memory: f64,
}

impl AverageRow {
    /// Row text, e.g. `1.2,35.0,7.0`
    pub fn to_line(&self) -> String {
        format!(
            "{},{:.1},{:.1}",
            format_elapsed(self.elapsed),
            self.gpu,
            self.memory
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AverageSeries {
    rows: Vec<AverageRow>,
}

impl AverageSeries {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn to_lines(&self) -> Vec<String> {
        self.rows.iter().map(AverageRow::to_line).collect()
    }

    /// DataFrame: time_sec | GPU | MEMORY, means rendered with one decimal
    pub fn to_frame(&self) -> Result<DataFrame, TraceError> {
        let elapsed: Vec<String> = self.rows.iter().map(|r| format_elapsed(r.elapsed)).collect();
        let gpu: Vec<String> = self.rows.iter().map(|r| format!("{:.1}", r.gpu)).collect();
        let memory: Vec<String> = self.rows.iter().map(|r| format!("{:.1}", r.memory)).collect();

        DataFrame::new(vec![
            Column::new(TIME_COLUMN.into(), elapsed),
            Column::new(GPU_MEAN_COLUMN.into(), gpu),
            Column::new(MEMORY_MEAN_COLUMN.into(), memory),
        ])
        .map_err(|e| TraceError::Serialization(format!("Failed to build average frame: {}", e)))
    }
}

/// Pair utilization and memory series row by row and average across GPUs.
///
/// Pairing is positional and the timestamp is taken from the utilization
/// series. Mismatched lengths are logged and cut to the shorter series.
pub fn average(utilization: &MetricSeries, memory: &MetricSeries) -> AverageSeries {
    if utilization.len() != memory.len() {
        warn!(
            "Averaging series of unequal length ({} vs {} rows), extra rows ignored",
            utilization.len(),
            memory.len()
        );
    }

    let rows = utilization
        .rows()
        .iter()
        .zip(memory.rows())
        .map(|(util_row, mem_row)| AverageRow {
            elapsed: util_row.elapsed,
            gpu: mean(&util_row.numbers()),
            memory: mean(&mem_row.numbers()),
        })
        .collect();

    AverageSeries { rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::{Metric, SeriesRow};

    fn series(metric: Metric, rows: &[(f64, &[&str])]) -> MetricSeries {
        MetricSeries::new(
            metric,
            rows.iter()
                .map(|(elapsed, tokens)| SeriesRow::from_tokens(*elapsed, tokens))
                .collect(),
        )
    }

    #[test]
    // Mean over four GPUs
    fn test_mean() {
        assert_eq!(mean(&[100.0, 0.0, 40.0, 0.0]), 35.0);
        assert_eq!(mean(&[8.0, 0.0, 20.0, 0.0]), 7.0);
    }

    #[test]
    // An empty row averages to zero instead of failing
    fn test_mean_empty() {
        assert_eq!(mean(&[]), 0.0);
    }

    #[test]
    // Rows are paired by position and rendered with one decimal
    fn test_average_rows() {
        let util = series(
            Metric::GpuUtilization,
            &[(0.0, &["100", "0", "40", "0"]), (1.2, &["30", "40", "0", "0"])],
        );
        let mem = series(
            Metric::MemUtilization,
            &[(0.0, &["8", "0", "20", "0"]), (1.2, &["1", "2", "3", "4"])],
        );
        let avg = average(&util, &mem);
        assert_eq!(avg.to_lines(), vec!["0,35.0,7.0", "1.2,17.5,2.5"]);
    }

    #[test]
    // Two GPUs with utilizations [10, 20] then [30, 40]
    fn test_average_two_gpus() {
        let util = series(Metric::GpuUtilization, &[(0.0, &["10", "20"]), (1.2, &["30", "40"])]);
        let mem = series(Metric::MemUtilization, &[(0.0, &["1", "3"]), (1.2, &["5", "7"])]);
        let avg = average(&util, &mem);
        assert_eq!(avg.to_lines(), vec!["0,15.0,2.0", "1.2,35.0,6.0"]);
    }

    #[test]
    // Unequal lengths never panic, the shorter series wins
    fn test_average_unequal_lengths() {
        let util = series(Metric::GpuUtilization, &[(0.0, &["1"]), (1.0, &["2"])]);
        let mem = series(Metric::MemUtilization, &[(0.0, &["3"])]);
        assert_eq!(average(&util, &mem).len(), 1);
    }

    #[test]
    // Average frame carries the fixed header
    fn test_average_frame() {
        let util = series(Metric::GpuUtilization, &[(0.0, &["10", "20"])]);
        let mem = series(Metric::MemUtilization, &[(0.0, &["1", "3"])]);
        let df = average(&util, &mem).to_frame().unwrap();
        let names: Vec<String> = df.get_column_names().iter().map(|n| n.to_string()).collect();
        assert_eq!(names, vec!["time_sec", "GPU", "MEMORY"]);
        assert_eq!(df.column("GPU").unwrap().str().unwrap().get(0), Some("15.0"));
    }
}
