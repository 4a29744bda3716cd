use super::{TraceWriter, create_output};
use crate::utils::errors::TraceError;
use log::debug;
use polars::prelude::*;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Header row plus one comma separated row per logical timestamp
#[derive(Debug, Default, Clone, Copy)]
pub struct CsvTraceWriter;

impl TraceWriter for CsvTraceWriter {
    fn extension(&self) -> &'static str {
        ".csv"
    }

    fn write(&self, frame: &mut DataFrame, path: &Path) -> Result<(), TraceError> {
        debug!("Writing {} CSV rows to {}", frame.height(), path.display());
        let mut out = BufWriter::new(create_output(path)?);

        CsvWriter::new(&mut out)
            .include_header(true)
            .with_separator(b',')
            .finish(frame)
            .map_err(|e| {
                TraceError::Serialization(format!("Failed to write CSV {}: {}", path.display(), e))
            })?;

        out.flush().map_err(|e| TraceError::io(path, e))
    }
}
