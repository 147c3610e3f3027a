use super::{WriteError, Writer};
use crate::model::Report;
use crate::template::{Template, TemplateError};
use serde_json::{json, Map, Value};
use std::io::Write;
use std::path::PathBuf;
use tracing::debug;

/// Name used for the compiled template in error messages.
const TEMPLATE_NAME: &str = "output template";

/// Empty value a field takes when the JSON form omitted it.
#[derive(Clone, Copy)]
enum Empty {
    Str,
    Int,
    List,
    Layer,
    Null,
}

impl Empty {
    fn value(self) -> Value {
        match self {
            Empty::Str => Value::String(String::new()),
            Empty::Int => json!(0),
            Empty::List => Value::Array(Vec::new()),
            Empty::Layer => fill(json!({}), LAYER_FIELDS),
            Empty::Null => Value::Null,
        }
    }
}

const REPORT_FIELDS: &[(&str, Empty)] = &[
    ("ArtifactID", Empty::Str),
    ("RepoTags", Empty::List),
    ("RepoDigests", Empty::List),
    ("Results", Empty::List),
];

const RESULT_FIELDS: &[(&str, Empty)] = &[
    ("Target", Empty::Str),
    ("Type", Empty::Str),
    ("Packages", Empty::List),
    ("Vulnerabilities", Empty::List),
];

const PACKAGE_FIELDS: &[(&str, Empty)] = &[
    ("Name", Empty::Str),
    ("Version", Empty::Str),
    ("Release", Empty::Str),
    ("Epoch", Empty::Int),
    ("Arch", Empty::Str),
    ("SrcName", Empty::Str),
    ("SrcVersion", Empty::Str),
    ("License", Empty::Str),
    ("Layer", Empty::Layer),
];

const VULNERABILITY_FIELDS: &[(&str, Empty)] = &[
    ("VulnerabilityID", Empty::Str),
    ("PkgName", Empty::Str),
    ("InstalledVersion", Empty::Str),
    ("FixedVersion", Empty::Str),
    ("Layer", Empty::Layer),
    ("SeveritySource", Empty::Str),
    ("PrimaryURL", Empty::Str),
    ("Title", Empty::Str),
    ("Description", Empty::Str),
    ("Severity", Empty::Str),
    ("CweIDs", Empty::List),
    ("References", Empty::List),
    ("PublishedDate", Empty::Null),
    ("LastModifiedDate", Empty::Null),
];

const LAYER_FIELDS: &[(&str, Empty)] = &[("Digest", Empty::Str), ("DiffID", Empty::Str)];

/// Applies a user template to the report.
///
/// The template sees every report field, including ones the JSON output
/// omits when empty, and `.Results.Failed`.
pub struct TemplateWriter<W> {
    output: W,
    template: Template,
}

impl<W: Write> TemplateWriter<W> {
    /// Compiles `source`. A source of the form `@path` is read from that file.
    pub fn new(output: W, source: &str) -> Result<Self, WriteError> {
        let text = match source.strip_prefix('@') {
            Some(path) => std::fs::read_to_string(path).map_err(|source| WriteError::ReadTemplate {
                path: PathBuf::from(path),
                source,
            })?,
            None => source.to_string(),
        };

        let template = Template::parse(TEMPLATE_NAME, &text)
            .map_err(WriteError::CompileTemplate)?
            .with_method("Results", "Failed", failed);
        Ok(Self { output, template })
    }
}

impl<W: Write> Writer for TemplateWriter<W> {
    fn write(&mut self, report: &Report) -> Result<(), WriteError> {
        let data = template_data(report).map_err(WriteError::Json)?;
        debug!(template = self.template.name(), "rendering template");

        self.template
            .render(&data, &mut self.output)
            .map_err(|e| match e {
                TemplateError::Io(source) => WriteError::Io {
                    stage: "template output",
                    source,
                },
                other => WriteError::Template(other),
            })?;
        self.output.flush().map_err(|source| WriteError::Io {
            stage: "template output",
            source,
        })
    }
}

/// `.Results.Failed`: true when any result has vulnerabilities.
fn failed(value: &Value) -> Option<Value> {
    let results = value.as_array()?;
    if !results.iter().all(Value::is_object) {
        return None;
    }
    let any = results.iter().any(|r| {
        r.get("Vulnerabilities")
            .and_then(Value::as_array)
            .is_some_and(|v| !v.is_empty())
    });
    Some(Value::Bool(any))
}

/// The report as a value tree with every known field present.
fn template_data(report: &Report) -> serde_json::Result<Value> {
    let mut data = fill(serde_json::to_value(report)?, REPORT_FIELDS);

    if let Some(results) = data.get_mut("Results").and_then(Value::as_array_mut) {
        for result in results.iter_mut() {
            *result = fill(result.take(), RESULT_FIELDS);
            fill_each(result, "Packages", PACKAGE_FIELDS);
            fill_each(result, "Vulnerabilities", VULNERABILITY_FIELDS);
        }
    }
    Ok(data)
}

fn fill_each(parent: &mut Value, key: &str, fields: &[(&str, Empty)]) {
    if let Some(items) = parent.get_mut(key).and_then(Value::as_array_mut) {
        for item in items.iter_mut() {
            *item = fill(item.take(), fields);
            if let Some(layer) = item.get_mut("Layer") {
                *layer = fill(layer.take(), LAYER_FIELDS);
            }
        }
    }
}

/// Rebuilds an object with `fields` first, in order, then any other keys.
fn fill(value: Value, fields: &[(&str, Empty)]) -> Value {
    let Value::Object(mut map) = value else {
        return value;
    };
    let mut out = Map::new();
    for (key, empty) in fields {
        let v = map.remove(*key).unwrap_or_else(|| empty.value());
        out.insert(key.to_string(), v);
    }
    out.extend(map);
    Value::Object(out)
}
