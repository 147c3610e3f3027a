//! Output writers for scan reports.
//!
//! | Format | Writer | Notes |
//! |--------|--------|-------|
//! | `table` | [`TableWriter`] | Per-target tables, severity filter, light mode |
//! | `json` | [`JsonWriter`] | Faithful structural dump of the [`Report`] |
//! | `template` | [`TemplateWriter`] | User template applied to the report |
//!
//! [`write`] picks a writer by format name and runs it once.
//!
//! # Example
//!
//! ```
//! use vulnreport::{output, Report, ScanResult};
//!
//! let report = Report::new("img:v1", vec![ScanResult::new("go.sum")]);
//! let mut out = Vec::new();
//! output::write("template", &mut out, &[], &report, "{{ .ArtifactID }}", false).unwrap();
//! assert_eq!(out, b"img:v1");
//! ```

mod json;
mod table;
mod template;

pub use json::JsonWriter;
pub use table::TableWriter;
pub use template::TemplateWriter;

use crate::model::{Report, Severity};
use crate::template::TemplateError;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Renders a [`Report`] to the writer's output.
pub trait Writer {
    /// Writes the whole report. Bytes already written stay written on error.
    fn write(&mut self, report: &Report) -> Result<(), WriteError>;
}

/// Failure inside a single writer, either while building it or while writing.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to write {stage}")]
    Io {
        stage: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("failed to marshal json")]
    Json(#[source] serde_json::Error),

    #[error("failed to read template file {path}")]
    ReadTemplate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse template")]
    CompileTemplate(#[source] TemplateError),

    #[error("failed to execute template")]
    Template(#[source] TemplateError),
}

/// Failure of a [`write`] call.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("unknown format: {0}")]
    UnknownFormat(String),

    #[error("failed to initialize template writer")]
    InitTemplate(#[source] WriteError),

    #[error("failed to write results")]
    WriteResults(#[source] WriteError),
}

/// Output format for scan reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Human-readable tables, one per target
    Table,
    /// JSON for programmatic use
    Json,
    /// User-supplied template
    Template,
}

impl Format {
    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Table => "table",
            Format::Json => "json",
            Format::Template => "template",
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "table" => Ok(Format::Table),
            "json" => Ok(Format::Json),
            "template" => Ok(Format::Template),
            _ => Err(ReportError::UnknownFormat(s.to_string())),
        }
    }
}

/// Writes `report` to `output` in the named format.
///
/// `severities` and `light` only affect the table format; `template` is
/// only read for the template format. Nothing is written when the format
/// is unknown or the template fails to compile.
pub fn write<'a, W: io::Write + 'a>(
    format: &str,
    output: W,
    severities: &[Severity],
    report: &Report,
    template: &str,
    light: bool,
) -> Result<(), ReportError> {
    let format = Format::from_str(format)?;
    debug!(%format, results = report.results.len(), "writing report");

    let mut writer: Box<dyn Writer + 'a> = match format {
        Format::Table => Box::new(TableWriter::new(output, light, severities.to_vec())),
        Format::Json => Box::new(JsonWriter::new(output)),
        Format::Template => Box::new(TemplateWriter::new(output, template).map_err(ReportError::InitTemplate)?),
    };

    writer.write(report).map_err(ReportError::WriteResults)
}
