use super::{TraceWriter, create_output};
use crate::utils::errors::TraceError;
use log::debug;
use polars::prelude::*;
use std::io::{BufWriter, Write};
use std::path::Path;

/// JSON array with one `{column: value}` object per row
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonTraceWriter;

impl TraceWriter for JsonTraceWriter {
    fn extension(&self) -> &'static str {
        ".json"
    }

    fn write(&self, frame: &mut DataFrame, path: &Path) -> Result<(), TraceError> {
        debug!("Writing {} JSON rows to {}", frame.height(), path.display());
        let mut out = BufWriter::new(create_output(path)?);

        JsonWriter::new(&mut out)
            .with_json_format(JsonFormat::Json)
            .finish(frame)
            .map_err(|e| {
                TraceError::Serialization(format!("Failed to write JSON {}: {}", path.display(), e))
            })?;

        out.flush().map_err(|e| TraceError::io(path, e))
    }
}
