pub mod csv;
pub mod json;

pub use csv::CsvTraceWriter;
pub use json::JsonTraceWriter;

use crate::utils::errors::TraceError;
use polars::prelude::DataFrame;
use std::fs::{self, File};
use std::path::Path;

/// Serializes a finished series frame to disk
pub trait TraceWriter {
    /// Extension appended after the metric suffix, dot included
    fn extension(&self) -> &'static str;

    /// Write `frame` to `path`, replacing any existing file
    fn write(&self, frame: &mut DataFrame, path: &Path) -> Result<(), TraceError>;
}

/// Create `path` for writing, creating missing parent directories
pub(crate) fn create_output(path: &Path) -> Result<File, TraceError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| TraceError::io(parent, e))?;
    }
    File::create(path).map_err(|e| TraceError::io(path, e))
}
