use super::{WriteError, Writer};
use crate::model::Report;
use std::io::Write;
use tracing::debug;

/// Pretty-printed JSON of the whole report, followed by a newline.
///
/// Keys follow declaration order and empty collections are omitted.
pub struct JsonWriter<W> {
    output: W,
}

impl<W: Write> JsonWriter<W> {
    pub fn new(output: W) -> Self {
        Self { output }
    }
}

impl<W: Write> Writer for JsonWriter<W> {
    fn write(&mut self, report: &Report) -> Result<(), WriteError> {
        let mut json = serde_json::to_vec_pretty(report).map_err(WriteError::Json)?;
        json.push(b'\n');
        debug!(bytes = json.len(), "writing json");

        let io_err = |source| WriteError::Io { stage: "json", source };
        self.output.write_all(&json).map_err(io_err)?;
        self.output.flush().map_err(io_err)
    }
}
