//! Built-in template functions.

use super::exec::{is_true, to_text};
use serde_json::Value;
use std::cmp::Ordering;

type Func = fn(Vec<Value>) -> Result<Value, String>;

/// Largest padding width `printf` accepts.
const MAX_WIDTH: usize = 1_000_000;

const FUNCS: &[(&str, Func)] = &[
    ("and", and),
    ("contains", contains),
    ("eq", eq),
    ("escapeXML", escape_xml),
    ("ge", ge),
    ("gt", gt),
    ("hasPrefix", has_prefix),
    ("index", index),
    ("join", join),
    ("le", le),
    ("len", len),
    ("lower", lower),
    ("lt", lt),
    ("ne", ne),
    ("not", not),
    ("or", or),
    ("print", print),
    ("printf", printf),
    ("println", println),
    ("toJson", to_json),
    ("trim", trim),
    ("upper", upper),
];

pub(crate) fn exists(name: &str) -> bool {
    FUNCS.iter().any(|(n, _)| *n == name)
}

pub(crate) fn call(name: &str, args: Vec<Value>) -> Result<Value, String> {
    let func = FUNCS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, f)| *f)
        .ok_or_else(|| format!("function {:?} not defined", name))?;
    func(args).map_err(|e| format!("error calling {}: {}", name, e))
}

fn arity(args: &[Value], n: usize) -> Result<(), String> {
    if args.len() == n {
        Ok(())
    } else {
        Err(format!("wrong number of args: want {} got {}", n, args.len()))
    }
}

fn at_least(args: &[Value], n: usize) -> Result<(), String> {
    if args.len() >= n {
        Ok(())
    } else {
        Err(format!("wrong number of args: want at least {} got {}", n, args.len()))
    }
}

fn str_arg<'a>(value: &'a Value, what: &str) -> Result<&'a str, String> {
    value
        .as_str()
        .ok_or_else(|| format!("{} must be a string, got {}", what, kind(value)))
}

pub(crate) fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

fn and(args: Vec<Value>) -> Result<Value, String> {
    at_least(&args, 1)?;
    let mut last = Value::Null;
    for arg in args {
        if !is_true(&arg) {
            return Ok(arg);
        }
        last = arg;
    }
    Ok(last)
}

fn or(args: Vec<Value>) -> Result<Value, String> {
    at_least(&args, 1)?;
    let mut last = Value::Null;
    for arg in args {
        if is_true(&arg) {
            return Ok(arg);
        }
        last = arg;
    }
    Ok(last)
}

fn not(args: Vec<Value>) -> Result<Value, String> {
    arity(&args, 1)?;
    Ok(Value::Bool(!is_true(&args[0])))
}

fn len(args: Vec<Value>) -> Result<Value, String> {
    arity(&args, 1)?;
    let n = match &args[0] {
        Value::String(s) => s.len(),
        Value::Array(a) => a.len(),
        Value::Object(o) => o.len(),
        Value::Null => 0,
        other => return Err(format!("len of {}", kind(other))),
    };
    Ok(Value::from(n))
}

/// Numbers compare by value regardless of integer or float representation.
fn same(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn eq(args: Vec<Value>) -> Result<Value, String> {
    at_least(&args, 2)?;
    let (first, rest) = args.split_first().ok_or("missing argument")?;
    Ok(Value::Bool(rest.iter().any(|other| same(first, other))))
}

fn ne(args: Vec<Value>) -> Result<Value, String> {
    arity(&args, 2)?;
    Ok(Value::Bool(!same(&args[0], &args[1])))
}

fn compare(args: Vec<Value>, accept: fn(Ordering) -> bool) -> Result<Value, String> {
    arity(&args, 2)?;
    let ordering = match (&args[0], &args[1]) {
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            a.partial_cmp(&b)
                .ok_or("numbers are not comparable")?
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (a, b) => {
            return Err(format!(
                "incompatible types for comparison: {} and {}",
                kind(a),
                kind(b)
            ))
        }
    };
    Ok(Value::Bool(accept(ordering)))
}

fn lt(args: Vec<Value>) -> Result<Value, String> {
    compare(args, |o| o == Ordering::Less)
}

fn le(args: Vec<Value>) -> Result<Value, String> {
    compare(args, |o| o != Ordering::Greater)
}

fn gt(args: Vec<Value>) -> Result<Value, String> {
    compare(args, |o| o == Ordering::Greater)
}

fn ge(args: Vec<Value>) -> Result<Value, String> {
    compare(args, |o| o != Ordering::Less)
}

fn index(args: Vec<Value>) -> Result<Value, String> {
    at_least(&args, 1)?;
    let mut iter = args.into_iter();
    let mut current = iter.next().unwrap_or(Value::Null);

    for key in iter {
        current = match (&current, &key) {
            (Value::Array(items), Value::Number(n)) => {
                let i = n
                    .as_u64()
                    .ok_or_else(|| format!("cannot index list with {}", n))?;
                items
                    .get(i as usize)
                    .cloned()
                    .ok_or_else(|| format!("index out of range: {}", i))?
            }
            (Value::Object(map), Value::String(k)) => map.get(k).cloned().unwrap_or(Value::Null),
            (Value::Null, _) => return Err("index of untyped nil".to_string()),
            (container, key) => {
                return Err(format!("cannot index {} with {}", kind(container), kind(key)))
            }
        };
    }
    Ok(current)
}

/// `join SEP LIST`, so it reads naturally at the end of a pipeline.
fn join(args: Vec<Value>) -> Result<Value, String> {
    arity(&args, 2)?;
    let sep = str_arg(&args[0], "separator")?;
    let items = match &args[1] {
        Value::Array(items) => items,
        Value::Null => return Ok(Value::String(String::new())),
        other => return Err(format!("join of {}", kind(other))),
    };
    let joined = items.iter().map(to_text).collect::<Vec<_>>().join(sep);
    Ok(Value::String(joined))
}

fn contains(args: Vec<Value>) -> Result<Value, String> {
    arity(&args, 2)?;
    let needle = str_arg(&args[0], "substring")?;
    let haystack = str_arg(&args[1], "string")?;
    Ok(Value::Bool(haystack.contains(needle)))
}

fn has_prefix(args: Vec<Value>) -> Result<Value, String> {
    arity(&args, 2)?;
    let prefix = str_arg(&args[0], "prefix")?;
    let s = str_arg(&args[1], "string")?;
    Ok(Value::Bool(s.starts_with(prefix)))
}

fn map_str(args: Vec<Value>, f: fn(&str) -> String) -> Result<Value, String> {
    arity(&args, 1)?;
    let s = str_arg(&args[0], "argument")?;
    Ok(Value::String(f(s)))
}

fn lower(args: Vec<Value>) -> Result<Value, String> {
    map_str(args, str::to_lowercase)
}

fn upper(args: Vec<Value>) -> Result<Value, String> {
    map_str(args, str::to_uppercase)
}

fn trim(args: Vec<Value>) -> Result<Value, String> {
    map_str(args, |s| s.trim().to_string())
}

fn escape_xml(args: Vec<Value>) -> Result<Value, String> {
    arity(&args, 1)?;
    let text = to_text(&args[0]);
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    Ok(Value::String(out))
}

fn to_json(args: Vec<Value>) -> Result<Value, String> {
    arity(&args, 1)?;
    serde_json::to_string(&args[0])
        .map(Value::String)
        .map_err(|e| e.to_string())
}

/// Spaces go between operands when neither side is a string.
fn print(args: Vec<Value>) -> Result<Value, String> {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 && !arg.is_string() && !args[i - 1].is_string() {
            out.push(' ');
        }
        out.push_str(&to_text(arg));
    }
    Ok(Value::String(out))
}

fn println(args: Vec<Value>) -> Result<Value, String> {
    let mut out = args.iter().map(to_text).collect::<Vec<_>>().join(" ");
    out.push('\n');
    Ok(Value::String(out))
}

fn printf(args: Vec<Value>) -> Result<Value, String> {
    at_least(&args, 1)?;
    let format = str_arg(&args[0], "format")?;
    let mut operands = args[1..].iter();
    let mut out = String::new();
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let left = chars.next_if_eq(&'-').is_some();
        let mut width = 0usize;
        while let Some(d) = chars.peek().and_then(|d| d.to_digit(10)) {
            width = width
                .checked_mul(10)
                .and_then(|w| w.checked_add(d as usize))
                .filter(|w| *w <= MAX_WIDTH)
                .ok_or("width too large")?;
            chars.next();
        }

        let verb = chars.next().ok_or("format ends with %")?;
        if verb == '%' {
            out.push('%');
            continue;
        }

        let Some(operand) = operands.next() else {
            out.push_str(&format!("%!{}(MISSING)", verb));
            continue;
        };
        let text = match verb {
            's' | 'v' => to_text(operand),
            'd' => match operand.as_i64() {
                Some(n) => n.to_string(),
                None => format!("%!d({})", to_text(operand)),
            },
            'q' => serde_json::to_string(&to_text(operand)).map_err(|e| e.to_string())?,
            other => return Err(format!("unsupported verb %{}", other)),
        };

        let pad = width.saturating_sub(text.chars().count());
        if left {
            out.push_str(&text);
            out.push_str(&" ".repeat(pad));
        } else {
            out.push_str(&" ".repeat(pad));
            out.push_str(&text);
        }
    }

    Ok(Value::String(out))
}
