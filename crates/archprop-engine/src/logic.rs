//! Templated-field rule language.
//!
//! Rules are JSON-Logic style expressions: an object with a single operator
//! key whose value is the argument list (`{"==": [{"var": ""}, "go"]}`).
//! Anything else is a literal. The rule is evaluated against one templated
//! field value of a node, reachable through `{"var": ""}` (the whole value)
//! or `{"var": "a.b"}` (a path into it).
//!
//! Supported operators: `var`, `missing`, `if` / `?:`, `and`, `or`, `!`, `!!`,
//! `==`, `===`, `!=`, `!==`, `<`, `<=` (both with an optional third argument
//! for "between"), `>`, `>=`, `in`, `cat`, `+`, `-`, `*`, `/`, `%`, `min`,
//! `max`. Unknown operators are errors, never silently false.

use std::cmp::Ordering;

use serde_json::{Number, Value};

use crate::error::LogicError;

/// Evaluates `rule` against `data`.
pub fn apply(rule: &Value, data: &Value) -> Result<Value, LogicError> {
    match rule {
        Value::Array(items) => items
            .iter()
            .map(|item| apply(item, data))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) if map.len() == 1 => match map.iter().next() {
            Some((op, raw_args)) => {
                let args: Vec<&Value> = match raw_args {
                    Value::Array(items) => items.iter().collect(),
                    other => vec![other],
                };
                apply_op(op, &args, data)
            }
            None => Ok(rule.clone()),
        },
        literal => Ok(literal.clone()),
    }
}

/// Evaluates `rule` and reduces the result to a boolean.
pub fn matches(rule: &Value, data: &Value) -> Result<bool, LogicError> {
    apply(rule, data).map(|value| truthy(&value))
}

/// JSON-Logic truthiness: empty arrays are false.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
    }
}

fn apply_op(op: &str, args: &[&Value], data: &Value) -> Result<Value, LogicError> {
    match op {
        "var" => var(args, data),
        "missing" => missing(args, data),
        "if" | "?:" => {
            let mut i = 0;
            while i + 1 < args.len() {
                if truthy(&apply(args[i], data)?) {
                    return apply(args[i + 1], data);
                }
                i += 2;
            }
            match args.get(i) {
                Some(otherwise) => apply(otherwise, data),
                None => Ok(Value::Null),
            }
        }
        "and" => {
            let mut last = Value::Bool(true);
            for arg in args {
                last = apply(arg, data)?;
                if !truthy(&last) {
                    break;
                }
            }
            Ok(last)
        }
        "or" => {
            let mut last = Value::Bool(false);
            for arg in args {
                last = apply(arg, data)?;
                if truthy(&last) {
                    break;
                }
            }
            Ok(last)
        }
        "!" => Ok(Value::Bool(!truthy(&first(op, args, data)?))),
        "!!" => Ok(Value::Bool(truthy(&first(op, args, data)?))),
        _ => {
            let values = args
                .iter()
                .map(|arg| apply(arg, data))
                .collect::<Result<Vec<_>, _>>()?;
            apply_eager(op, &values)
        }
    }
}

fn apply_eager(op: &str, values: &[Value]) -> Result<Value, LogicError> {
    match op {
        "==" => binary(op, values).map(|(a, b)| Value::Bool(loose_eq(a, b))),
        "!=" => binary(op, values).map(|(a, b)| Value::Bool(!loose_eq(a, b))),
        "===" => binary(op, values).map(|(a, b)| Value::Bool(strict_eq(a, b))),
        "!==" => binary(op, values).map(|(a, b)| Value::Bool(!strict_eq(a, b))),
        "<" => chain(op, values, |o| o == Ordering::Less),
        "<=" => chain(op, values, |o| o != Ordering::Greater),
        ">" => binary(op, values)
            .map(|(a, b)| Value::Bool(compare(a, b) == Some(Ordering::Greater))),
        ">=" => binary(op, values).map(|(a, b)| {
            Value::Bool(matches!(compare(a, b), Some(Ordering::Greater | Ordering::Equal)))
        }),
        "in" => binary(op, values).map(|(needle, haystack)| {
            Value::Bool(match haystack {
                Value::String(s) => s.contains(&to_text(needle)),
                Value::Array(items) => items.iter().any(|item| strict_eq(item, needle)),
                _ => false,
            })
        }),
        "cat" => Ok(Value::String(values.iter().map(to_text).collect())),
        "+" => Ok(number(values.iter().map(to_number).sum())),
        "*" => Ok(number(values.iter().map(to_number).product())),
        "-" => match values {
            [a] => Ok(number(-to_number(a))),
            [a, b] => Ok(number(to_number(a) - to_number(b))),
            _ => Err(arity(op, "expects one or two arguments")),
        },
        "/" => binary(op, values).map(|(a, b)| number(to_number(a) / to_number(b))),
        "%" => binary(op, values).map(|(a, b)| number(to_number(a) % to_number(b))),
        "min" => Ok(values
            .iter()
            .map(to_number)
            .reduce(f64::min)
            .map(number)
            .unwrap_or(Value::Null)),
        "max" => Ok(values
            .iter()
            .map(to_number)
            .reduce(f64::max)
            .map(number)
            .unwrap_or(Value::Null)),
        _ => Err(LogicError::UnknownOperator { op: op.to_string() }),
    }
}

fn first(op: &str, args: &[&Value], data: &Value) -> Result<Value, LogicError> {
    match args.first() {
        Some(arg) => apply(arg, data),
        None => Err(arity(op, "expects one argument")),
    }
}

fn binary<'v>(op: &str, values: &'v [Value]) -> Result<(&'v Value, &'v Value), LogicError> {
    match values {
        [a, b] => Ok((a, b)),
        _ => Err(arity(op, "expects two arguments")),
    }
}

/// `<` and `<=` accept a third argument: `a < b < c`.
fn chain(
    op: &str,
    values: &[Value],
    accept: impl Fn(Ordering) -> bool,
) -> Result<Value, LogicError> {
    if values.len() != 2 && values.len() != 3 {
        return Err(arity(op, "expects two or three arguments"));
    }
    let holds = values
        .windows(2)
        .all(|pair| compare(&pair[0], &pair[1]).map(&accept).unwrap_or(false));
    Ok(Value::Bool(holds))
}

fn arity(op: &str, reason: &str) -> LogicError {
    LogicError::InvalidArguments {
        op: op.to_string(),
        reason: reason.to_string(),
    }
}

fn var(args: &[&Value], data: &Value) -> Result<Value, LogicError> {
    let path = match args.first() {
        Some(path) => apply(path, data)?,
        None => return Ok(data.clone()),
    };
    let default = match args.get(1) {
        Some(default) => apply(default, data)?,
        None => Value::Null,
    };
    Ok(lookup(data, &path).cloned().unwrap_or(default))
}

fn missing(args: &[&Value], data: &Value) -> Result<Value, LogicError> {
    let mut keys = Vec::new();
    for arg in args {
        match apply(arg, data)? {
            Value::Array(items) => keys.extend(items),
            other => keys.push(other),
        }
    }
    let absent = keys
        .into_iter()
        .filter(|key| matches!(lookup(data, key), None | Some(Value::Null)))
        .collect();
    Ok(Value::Array(absent))
}

fn lookup<'d>(data: &'d Value, path: &Value) -> Option<&'d Value> {
    let path = match path {
        Value::Null => return Some(data),
        Value::String(s) if s.is_empty() => return Some(data),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    path.split('.').try_fold(data, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn number(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) if s.trim().is_empty() => 0.0,
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Value::Array(items) => items.iter().map(to_text).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => a == b,
        _ => to_number(a) == to_number(b),
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => to_number(a).partial_cmp(&to_number(b)),
    }
}
