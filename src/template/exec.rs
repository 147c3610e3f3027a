//! Evaluates a parsed template against a JSON value tree.
//!
//! Alongside each value the evaluator keeps the name of the field it was
//! read from, so methods can be attached to one field (`.Results.Failed`)
//! rather than to every value of the same shape.

use super::funcs::{self, kind};
use super::parse::{Arg, Command, Node, Pipeline};
use super::{MethodEntry, TemplateError};
use serde_json::Value;
use std::borrow::Cow;
use std::io::Write;

/// Truth in `if`, `with`, `and`, `or` and `not`.
pub(crate) fn is_true(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Printed form of a value. Lists and maps print as `[a b]` and `map[k:v]`.
pub(crate) fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(to_text).collect();
            format!("[{}]", parts.join(" "))
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", k, to_text(&map[k])))
                .collect();
            format!("map[{}]", parts.join(" "))
        }
    }
}

struct Var {
    name: String,
    value: Value,
    /// Field the value was read from, if any.
    field: Option<String>,
}

pub(crate) struct Exec<'a, W> {
    name: &'a str,
    out: &'a mut W,
    methods: &'a [MethodEntry],
    root: &'a Value,
    vars: Vec<Var>,
}

impl<'a, W: Write> Exec<'a, W> {
    pub(crate) fn new(name: &'a str, out: &'a mut W, methods: &'a [MethodEntry], root: &'a Value) -> Self {
        Self {
            name,
            out,
            methods,
            root,
            vars: Vec::new(),
        }
    }

    fn error(&self, line: usize, message: impl Into<String>) -> TemplateError {
        TemplateError::Exec {
            name: self.name.to_string(),
            line,
            message: message.into(),
        }
    }

    /// Runs `nodes` with `dot` as `.`; `dot_field` names the field `dot` came from.
    pub(crate) fn walk(&mut self, nodes: &[Node], dot: &Value, dot_field: Option<&str>) -> Result<(), TemplateError> {
        for node in nodes {
            match node {
                Node::Text(text) => self.out.write_all(text.as_bytes())?,
                Node::Action { line, pipe } => {
                    let value = self.pipeline(pipe, dot, dot_field, *line)?;
                    if pipe.vars.is_empty() {
                        self.out.write_all(to_text(&value).as_bytes())?;
                    } else {
                        let field = self.source_field(pipe, dot_field);
                        self.bind(pipe, value, field, *line)?;
                    }
                }
                Node::If {
                    line,
                    pipe,
                    then,
                    otherwise,
                } => {
                    let mark = self.vars.len();
                    let value = self.pipeline(pipe, dot, dot_field, *line)?;
                    let truth = is_true(&value);
                    let field = self.source_field(pipe, dot_field);
                    self.bind(pipe, value, field, *line)?;
                    self.walk(if truth { then } else { otherwise }, dot, dot_field)?;
                    self.vars.truncate(mark);
                }
                Node::With {
                    line,
                    pipe,
                    then,
                    otherwise,
                } => {
                    let mark = self.vars.len();
                    let value = self.pipeline(pipe, dot, dot_field, *line)?;
                    let field = self.source_field(pipe, dot_field);
                    self.bind(pipe, value.clone(), field.clone(), *line)?;
                    if is_true(&value) {
                        self.walk(then, &value, field.as_deref())?;
                    } else {
                        self.walk(otherwise, dot, dot_field)?;
                    }
                    self.vars.truncate(mark);
                }
                Node::Range {
                    line,
                    pipe,
                    body,
                    otherwise,
                } => self.range(pipe, body, otherwise, dot, dot_field, *line)?,
            }
        }
        Ok(())
    }

    fn range(
        &mut self,
        pipe: &Pipeline,
        body: &[Node],
        otherwise: &[Node],
        dot: &Value,
        dot_field: Option<&str>,
        line: usize,
    ) -> Result<(), TemplateError> {
        let value = self.pipeline(pipe, dot, dot_field, line)?;
        let entries: Vec<(Value, Value)> = match value {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (Value::from(i), item))
                .collect(),
            Value::Object(map) => {
                let mut entries: Vec<(Value, Value)> =
                    map.into_iter().map(|(k, v)| (Value::String(k), v)).collect();
                entries.sort_by(|a, b| to_text(&a.0).cmp(&to_text(&b.0)));
                entries
            }
            Value::Null => Vec::new(),
            other => return Err(self.error(line, format!("range can't iterate over {}", kind(&other)))),
        };

        if entries.is_empty() {
            return self.walk(otherwise, dot, dot_field);
        }

        for (key, item) in entries {
            let mark = self.vars.len();
            match pipe.vars.as_slice() {
                [] => {}
                [elem] => self.declare_or_assign(elem, item.clone(), None, pipe.assign, line)?,
                [index, elem, ..] => {
                    self.declare_or_assign(index, key, None, pipe.assign, line)?;
                    self.declare_or_assign(elem, item.clone(), None, pipe.assign, line)?;
                }
            }
            self.walk(body, &item, None)?;
            self.vars.truncate(mark);
        }
        Ok(())
    }

    fn bind(&mut self, pipe: &Pipeline, value: Value, field: Option<String>, line: usize) -> Result<(), TemplateError> {
        if let Some(name) = pipe.vars.first() {
            self.declare_or_assign(name, value, field, pipe.assign, line)?;
        }
        Ok(())
    }

    fn declare_or_assign(
        &mut self,
        name: &str,
        value: Value,
        field: Option<String>,
        assign: bool,
        line: usize,
    ) -> Result<(), TemplateError> {
        if !assign {
            self.vars.push(Var {
                name: name.to_string(),
                value,
                field,
            });
            return Ok(());
        }
        match self.vars.iter_mut().rev().find(|v| v.name == name) {
            Some(var) => {
                var.value = value;
                var.field = field;
                Ok(())
            }
            None => Err(self.error(line, format!("undefined variable: ${}", name))),
        }
    }

    /// `$` is the root data; other names are declared variables.
    fn lookup(&self, name: &str, line: usize) -> Result<(&Value, Option<&str>), TemplateError> {
        if name.is_empty() {
            return Ok((self.root, None));
        }
        self.vars
            .iter()
            .rev()
            .find(|v| v.name == name)
            .map(|v| (&v.value, v.field.as_deref()))
            .ok_or_else(|| self.error(line, format!("undefined variable: ${}", name)))
    }

    /// Field a pipeline's result was read from, when it is a plain field chain.
    fn source_field(&self, pipe: &Pipeline, dot_field: Option<&str>) -> Option<String> {
        let [cmd] = pipe.cmds.as_slice() else {
            return None;
        };
        match cmd.args.as_slice() {
            [Arg::Dot] => dot_field.map(str::to_string),
            [Arg::Field(chain)] => chain.last().cloned(),
            [Arg::Variable(name, chain)] => match chain.last() {
                Some(last) => Some(last.clone()),
                None => self
                    .vars
                    .iter()
                    .rev()
                    .find(|v| v.name == *name)
                    .and_then(|v| v.field.clone()),
            },
            [Arg::Pipe(inner, chain)] => match chain.last() {
                Some(last) => Some(last.clone()),
                None => self.source_field(inner, dot_field),
            },
            _ => None,
        }
    }

    fn pipeline(&self, pipe: &Pipeline, dot: &Value, dot_field: Option<&str>, line: usize) -> Result<Value, TemplateError> {
        let mut piped = None;
        for cmd in &pipe.cmds {
            piped = Some(self.command(cmd, dot, dot_field, piped, line)?);
        }
        Ok(piped.unwrap_or(Value::Null))
    }

    fn command(
        &self,
        cmd: &Command,
        dot: &Value,
        dot_field: Option<&str>,
        piped: Option<Value>,
        line: usize,
    ) -> Result<Value, TemplateError> {
        let (first, rest) = cmd
            .args
            .split_first()
            .ok_or_else(|| self.error(line, "empty command"))?;

        if let Arg::Function(name) = first {
            let mut args = rest
                .iter()
                .map(|arg| self.arg(arg, dot, dot_field, line))
                .collect::<Result<Vec<_>, _>>()?;
            args.extend(piped);
            return funcs::call(name, args).map_err(|e| self.error(line, e));
        }

        if !rest.is_empty() || piped.is_some() {
            return Err(self.error(line, "can't give argument to non-function"));
        }
        self.arg(first, dot, dot_field, line)
    }

    fn arg(&self, arg: &Arg, dot: &Value, dot_field: Option<&str>, line: usize) -> Result<Value, TemplateError> {
        match arg {
            Arg::Dot => Ok(dot.clone()),
            Arg::Field(chain) => self.fields(dot, dot_field, chain, line),
            Arg::Variable(name, chain) => {
                let (base, field) = self.lookup(name, line)?;
                self.fields(base, field, chain, line)
            }
            Arg::Function(name) => funcs::call(name, Vec::new()).map_err(|e| self.error(line, e)),
            Arg::Str(s) => Ok(Value::String(s.clone())),
            Arg::Int(n) => Ok(Value::from(*n)),
            Arg::Float(f) => Ok(Value::from(*f)),
            Arg::Bool(b) => Ok(Value::Bool(*b)),
            Arg::Nil => Ok(Value::Null),
            Arg::Pipe(pipe, chain) => {
                let value = self.pipeline(pipe, dot, dot_field, line)?;
                let field = self.source_field(pipe, dot_field);
                self.fields(&value, field.as_deref(), chain, line)
            }
        }
    }

    /// Follows `chain` from `base`, copying only the value it ends on.
    fn fields(&self, base: &Value, base_field: Option<&str>, chain: &[String], line: usize) -> Result<Value, TemplateError> {
        let mut current = Cow::Borrowed(base);
        let mut owner = base_field;
        for name in chain {
            current = match current {
                Cow::Borrowed(value) => self.field(value, owner, name, line)?,
                Cow::Owned(value) => Cow::Owned(self.field(&value, owner, name, line)?.into_owned()),
            };
            owner = Some(name.as_str());
        }
        Ok(current.into_owned())
    }

    fn field<'v>(
        &self,
        value: &'v Value,
        owner: Option<&str>,
        name: &str,
        line: usize,
    ) -> Result<Cow<'v, Value>, TemplateError> {
        if let Value::Object(map) = value {
            if let Some(found) = map.get(name) {
                return Ok(Cow::Borrowed(found));
            }
        }
        if let Some(result) = self
            .methods
            .iter()
            .filter(|m| owner == Some(m.owner) && m.name == name)
            .find_map(|m| (m.method)(value))
        {
            return Ok(Cow::Owned(result));
        }

        let message = match value {
            Value::Null => format!("nil pointer evaluating .{}", name),
            other => format!("can't evaluate field {} in type {}", name, kind(other)),
        };
        Err(self.error(line, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_truthiness() {
        assert!(!is_true(&json!(null)));
        assert!(!is_true(&json!(0)));
        assert!(!is_true(&json!("")));
        assert!(!is_true(&json!([])));
        assert!(!is_true(&json!({})));
        assert!(is_true(&json!("x")));
        assert!(is_true(&json!(1.5)));
        assert!(is_true(&json!([0])));
    }

    #[test]
    fn test_to_text() {
        assert_eq!(to_text(&json!(null)), "");
        assert_eq!(to_text(&json!(42)), "42");
        assert_eq!(to_text(&json!(["a", 1])), "[a 1]");
        assert_eq!(to_text(&json!({"b": 2, "a": "x"})), "map[a:x b:2]");
    }
}
