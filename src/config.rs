use crate::utils::output_path::OutputLayout;

/// chrono spelling of `YYYY/MM/DD HH:MM:SS.ffffff` as written by nvidia-smi
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.f";

/// How the row assembler treats logical rows whose GPU count differs from the first row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowPolicy {
    /// Keep every row; only the trailing rows are trimmed later by the tail validator
    #[default]
    Lenient,
    /// Drop any closed row whose width differs from the first closed row
    Strict,
}

/// Configuration for one trace conversion run
#[derive(Debug, Clone)]
pub struct TraceConfig {
    /// Timestamp format of the first field, chrono syntax
    pub timestamp_format: String,
    /// Row assembly policy
    pub row_policy: RowPolicy,
    /// Where output files go
    pub layout: OutputLayout,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
            row_policy: RowPolicy::Lenient,
            layout: OutputLayout::default(),
        }
    }
}

impl TraceConfig {
    pub fn with_timestamp_format(mut self, format: impl Into<String>) -> Self {
        self.timestamp_format = format.into();
        self
    }

    pub fn with_row_policy(mut self, row_policy: RowPolicy) -> Self {
        self.row_policy = row_policy;
        self
    }

    pub fn with_layout(mut self, layout: OutputLayout) -> Self {
        self.layout = layout;
        self
    }
}
