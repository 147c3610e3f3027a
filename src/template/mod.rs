//! A compiler and evaluator for report templates.
//!
//! Templates use the `{{ }}` action syntax familiar from Go's
//! `text/template`, evaluated against a [`serde_json::Value`]:
//!
//! | Construct | Example |
//! |-----------|---------|
//! | Field access | `{{ .ArtifactID }}`, `{{ $r.Target }}` |
//! | Conditionals | `{{ if .Results.Failed }}...{{ else }}...{{ end }}` |
//! | Loops | `{{ range $i, $r := .Results }}...{{ end }}` |
//! | Scoping | `{{ with .RepoTags }}...{{ end }}` |
//! | Pipelines | `{{ .RepoTags \| join ", " }}` |
//! | Variables | `{{ $count := len .Results }}` |
//! | Whitespace trim | `{{- ... -}}` |
//! | Comments | `{{/* ignored */}}` |
//!
//! Compilation rejects malformed source before anything is rendered.
//! Rendering streams straight into the output; output written before an
//! evaluation error stays written.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use vulnreport::template::Template;
//!
//! let tmpl = Template::parse("summary", "{{ range .Items }}[{{ . }}]{{ end }}").unwrap();
//! let out = tmpl.render_to_string(&json!({"Items": ["a", "b"]})).unwrap();
//! assert_eq!(out, "[a][b]");
//! ```

mod exec;
mod funcs;
mod lexer;
mod parse;

use serde_json::Value;
use std::io::Write;
use thiserror::Error;

/// A computed field, given the value it is called on.
///
/// Returns `None` when the method does not apply to the value.
pub type Method = fn(&Value) -> Option<Value>;

/// A method attached to values read from one field name.
#[derive(Debug, Clone)]
pub(crate) struct MethodEntry {
    pub(crate) owner: &'static str,
    pub(crate) name: &'static str,
    pub(crate) method: Method,
}

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template: {name}:{line}: {message}")]
    Parse {
        name: String,
        line: usize,
        message: String,
    },

    #[error("template: {name}:{line}: executing: {message}")]
    Exec {
        name: String,
        line: usize,
        message: String,
    },

    #[error("failed to write template output")]
    Io(#[from] std::io::Error),
}

/// A compiled template.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    nodes: Vec<parse::Node>,
    methods: Vec<MethodEntry>,
}

impl Template {
    /// Compiles `source`. `name` only appears in error messages.
    pub fn parse(name: impl Into<String>, source: &str) -> Result<Self, TemplateError> {
        let name = name.into();
        let items = lexer::lex(&name, source)?;
        let nodes = parse::parse(&name, items)?;
        Ok(Self {
            name,
            nodes,
            methods: Vec::new(),
        })
    }

    /// Registers a computed field `name` on values read from field `owner`,
    /// such as `Failed` on `.Results`. Keys present in the data win.
    pub fn with_method(mut self, owner: &'static str, name: &'static str, method: Method) -> Self {
        self.methods.push(MethodEntry { owner, name, method });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn render<W: Write>(&self, data: &Value, out: &mut W) -> Result<(), TemplateError> {
        exec::Exec::new(&self.name, out, &self.methods, data).walk(&self.nodes, data, None)
    }

    pub fn render_to_string(&self, data: &Value) -> Result<String, TemplateError> {
        let mut buf = Vec::new();
        self.render(data, &mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(src: &str, data: Value) -> String {
        Template::parse("test", src)
            .unwrap()
            .render_to_string(&data)
            .unwrap()
    }

    fn render_err(src: &str, data: Value) -> TemplateError {
        Template::parse("test", src)
            .unwrap()
            .render_to_string(&data)
            .unwrap_err()
    }

    #[test]
    fn test_plain_field() {
        assert_eq!(render("{{ .ArtifactID }}", json!({"ArtifactID": "img:v1"})), "img:v1");
    }

    #[test]
    fn test_no_html_escaping() {
        assert_eq!(render("{{ .X }}", json!({"X": "<b>&</b>"})), "<b>&</b>");
    }

    #[test]
    fn test_nested_fields_and_dot() {
        let data = json!({"Layer": {"Digest": "sha256:1"}});
        assert_eq!(render("{{ .Layer.Digest }}", data.clone()), "sha256:1");
        assert_eq!(render("{{ with .Layer }}{{ .Digest }}{{ end }}", data), "sha256:1");
    }

    #[test]
    fn test_if_else_chain() {
        let src = "{{ if eq .S \"HIGH\" }}h{{ else if eq .S \"LOW\" }}l{{ else }}?{{ end }}";
        assert_eq!(render(src, json!({"S": "HIGH"})), "h");
        assert_eq!(render(src, json!({"S": "LOW"})), "l");
        assert_eq!(render(src, json!({"S": "MEDIUM"})), "?");
    }

    #[test]
    fn test_range_with_index_and_else() {
        let src = "{{ range $i, $t := .Tags }}{{ if $i }},{{ end }}{{ $t }}{{ else }}none{{ end }}";
        assert_eq!(render(src, json!({"Tags": ["a", "b", "c"]})), "a,b,c");
        assert_eq!(render(src, json!({"Tags": []})), "none");
    }

    #[test]
    fn test_range_over_map_sorted() {
        let src = "{{ range $k, $v := . }}{{ $k }}={{ $v }};{{ end }}";
        assert_eq!(render(src, json!({"b": 2, "a": 1})), "a=1;b=2;");
    }

    #[test]
    fn test_root_variable_inside_range() {
        let src = "{{ range .Results }}{{ $.ArtifactID }}/{{ .Target }} {{ end }}";
        let data = json!({"ArtifactID": "img", "Results": [{"Target": "a"}, {"Target": "b"}]});
        assert_eq!(render(src, data), "img/a img/b ");
    }

    #[test]
    fn test_variables_and_assignment() {
        let src = "{{ $n := 0 }}{{ range .Xs }}{{ $n = . }}{{ end }}{{ $n }}";
        assert_eq!(render(src, json!({"Xs": [1, 2, 3]})), "3");
    }

    #[test]
    fn test_variable_scope_ends_with_block() {
        let err = render_err("{{ if true }}{{ $x := 1 }}{{ end }}{{ $x }}", json!({}));
        assert!(err.to_string().contains("undefined variable: $x"));
    }

    #[test]
    fn test_pipeline_and_parens() {
        let data = json!({"RepoTags": ["a:1", "a:2"], "Results": [{"Target": "t0"}]});
        assert_eq!(render(r#"{{ .RepoTags | join ", " }}"#, data.clone()), "a:1, a:2");
        assert_eq!(render("{{ (index .Results 0).Target | upper }}", data.clone()), "T0");
        assert_eq!(render("{{ len .Results | printf \"%d targets\" }}", data), "1 targets");
    }

    #[test]
    fn test_trim_markers() {
        let src = "[\n  {{- range .Xs }}\n  {{ . }}\n  {{- end }}\n]";
        assert_eq!(render(src, json!({"Xs": [1, 2]})), "[\n  1\n  2\n]");
    }

    #[test]
    fn test_method_lookup() {
        fn count(value: &Value) -> Option<Value> {
            value.as_array().map(|a| Value::from(a.len()))
        }
        let tmpl = Template::parse("m", "{{ .Items.Count }}|{{ with .Items }}{{ .Count }}{{ end }}|{{ $i := .Items }}{{ $i.Count }}")
            .unwrap()
            .with_method("Items", "Count", count);
        let out = tmpl.render_to_string(&json!({"Items": [1, 2, 3]})).unwrap();
        assert_eq!(out, "3|3|3");
    }

    #[test]
    fn test_method_only_on_its_field() {
        fn count(value: &Value) -> Option<Value> {
            value.as_array().map(|a| Value::from(a.len()))
        }
        let tmpl = Template::parse("m", "{{ .Other.Count }}")
            .unwrap()
            .with_method("Items", "Count", count);
        let err = tmpl.render_to_string(&json!({"Items": [], "Other": []})).unwrap_err();
        assert!(err.to_string().contains("can't evaluate field Count in type list"));
    }

    #[test]
    fn test_chain_continues_past_method_result() {
        fn summary(value: &Value) -> Option<Value> {
            value.as_array().map(|a| json!({"Count": a.len()}))
        }
        let tmpl = Template::parse("m", "{{ .Items.Summary.Count }}")
            .unwrap()
            .with_method("Items", "Summary", summary);
        let out = tmpl.render_to_string(&json!({"Items": [1, 2]})).unwrap();
        assert_eq!(out, "2");
    }

    #[test]
    fn test_root_lookup_in_large_range() {
        let vulns: Vec<Value> = (0..5000)
            .map(|i| json!({"VulnerabilityID": format!("CVE-{}", i)}))
            .collect();
        let data = json!({
            "ArtifactID": "img",
            "Results": [{"Vulnerabilities": vulns}],
        });
        let src = "{{ range .Results }}{{ range .Vulnerabilities }}{{ $.ArtifactID }}{{ end }}{{ end }}";
        let out = render(src, data);
        assert_eq!(out.len(), 5000 * "img".len());
    }

    #[test]
    fn test_bare_root_variable() {
        assert_eq!(render("{{ with .A }}{{ $.B }}{{ end }}", json!({"A": 1, "B": "b"})), "b");
        let err = render_err("{{ $nope }}", json!({}));
        assert!(err.to_string().contains("undefined variable: $nope"));
    }

    #[test]
    fn test_undefined_field_is_exec_error() {
        let err = render_err("ok\n{{ .Missing }}", json!({"Present": 1}));
        assert!(matches!(err, TemplateError::Exec { line: 2, .. }));
        assert_eq!(
            err.to_string(),
            "template: test:2: executing: can't evaluate field Missing in type map"
        );
    }

    #[test]
    fn test_partial_output_kept_on_error() {
        let tmpl = Template::parse("p", "before {{ .Nope }} after").unwrap();
        let mut out = Vec::new();
        assert!(tmpl.render(&json!({}), &mut out).is_err());
        assert_eq!(out, b"before ");
    }

    #[test]
    fn test_argument_to_non_function() {
        let err = render_err("{{ .A | .B }}", json!({"A": 1, "B": 2}));
        assert!(err.to_string().contains("can't give argument to non-function"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Template::parse("bad", "{{ .ArtifactID "),
            Err(TemplateError::Parse { .. })
        ));
        assert!(Template::parse("bad", "{{ range .X }}").is_err());
        assert!(Template::parse("bad", "{{ nosuchfunc }}").is_err());
    }
}
