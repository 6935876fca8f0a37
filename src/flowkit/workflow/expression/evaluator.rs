// SPDX-License-Identifier: MIT

//! Tree-walking evaluator for parsed snippets
//!
//! Values are plain `serde_json::Value`s. Operators follow the loose
//! scripting semantics editors expect (`"3" == 3`, `null < 1`, string
//! concatenation with `+`). Only the bindings and a fixed set of pure
//! built-ins are reachable.

use super::ast::{BinaryOp, Expression, Literal, LogicalOp, Program, TemplatePart, UnaryOp};
use super::{too_deep, MAX_EVAL_DEPTH};
use crate::adk::error::FlowError;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;

/// Named values visible to a snippet
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: HashMap<String, Value>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }
}

/// Run a program: bind declarations in order, then evaluate the body
pub fn run_program(program: &Program, bindings: &Bindings) -> Result<Value, FlowError> {
    if program.declarations.is_empty() {
        return evaluate(&program.body, bindings);
    }
    let mut scope = bindings.clone();
    for (name, expr) in &program.declarations {
        let value = evaluate(expr, &scope)?;
        scope.insert(name.clone(), value);
    }
    evaluate(&program.body, &scope)
}

/// Longest string `repeat` may build
const MAX_STRING_LEN: usize = 1 << 20;

/// Largest `toFixed` digit count, as in JavaScript
const MAX_FIXED_DIGITS: f64 = 100.0;

/// Evaluate an expression against bindings
pub fn evaluate(expr: &Expression, bindings: &Bindings) -> Result<Value, FlowError> {
    eval_at(expr, bindings, 0)
}

fn eval_at(expr: &Expression, bindings: &Bindings, depth: usize) -> Result<Value, FlowError> {
    if depth > MAX_EVAL_DEPTH {
        return Err(too_deep());
    }
    let evaluate = |e: &Expression, b: &Bindings| eval_at(e, b, depth + 1);
    match expr {
        Expression::Literal(lit) => Ok(literal(lit)),
        Expression::Identifier(name) => bindings
            .get(name)
            .cloned()
            .ok_or_else(|| FlowError::evaluation(format!("{} is not defined", name))),
        Expression::Array(items) => items
            .iter()
            .map(|item| evaluate(item, bindings))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Expression::Object(props) => {
            let mut map = Map::new();
            for (key, value) in props {
                map.insert(key.clone(), evaluate(value, bindings)?);
            }
            Ok(Value::Object(map))
        }
        Expression::Template(parts) => {
            let mut text = String::new();
            for part in parts {
                match part {
                    TemplatePart::Text(t) => text.push_str(t),
                    TemplatePart::Expr(e) => text.push_str(&to_js_string(&evaluate(e, bindings)?)),
                }
            }
            Ok(Value::String(text))
        }
        Expression::Member { object, property } => {
            let target = evaluate(object, bindings)?;
            Ok(member(&target, property))
        }
        Expression::Index { object, index } => {
            let target = evaluate(object, bindings)?;
            let key = evaluate(index, bindings)?;
            Ok(index_value(&target, &key))
        }
        Expression::Call { callee, args } => call(callee, args, bindings, depth + 1),
        Expression::Unary { op, operand } => {
            let value = evaluate(operand, bindings)?;
            Ok(match op {
                UnaryOp::Not => Value::Bool(!is_truthy(&value)),
                UnaryOp::Negate => number_value(-to_number(&value)),
                UnaryOp::Plus => number_value(to_number(&value)),
            })
        }
        Expression::Binary { op, left, right } => {
            let l = evaluate(left, bindings)?;
            let r = evaluate(right, bindings)?;
            Ok(binary(*op, &l, &r))
        }
        Expression::Logical { op, left, right } => {
            let l = evaluate(left, bindings)?;
            let short_circuit = match op {
                LogicalOp::And => !is_truthy(&l),
                LogicalOp::Or => is_truthy(&l),
                LogicalOp::Nullish => !l.is_null(),
            };
            if short_circuit {
                Ok(l)
            } else {
                evaluate(right, bindings)
            }
        }
        Expression::Conditional {
            test,
            consequent,
            alternate,
        } => {
            if is_truthy(&evaluate(test, bindings)?) {
                evaluate(consequent, bindings)
            } else {
                evaluate(alternate, bindings)
            }
        }
    }
}

fn literal(lit: &Literal) -> Value {
    match lit {
        Literal::String(s) => Value::String(s.clone()),
        Literal::Number(n) => number_value(*n),
        Literal::Boolean(b) => Value::Bool(*b),
        Literal::Null => Value::Null,
    }
}

/// JavaScript truthiness
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Numeric coercion; `NaN` for values with no numeric reading
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse().unwrap_or(f64::NAN)
            }
        }
        Value::Array(_) | Value::Object(_) => f64::NAN,
    }
}

/// Wrap a float as a JSON number; integral values stay integers, and
/// non-finite results become `null`
pub fn number_value(n: f64) -> Value {
    if !n.is_finite() {
        return Value::Null;
    }
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        return Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// String coercion; objects render as compact JSON
pub fn to_js_string(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.as_f64().map(format_number).unwrap_or_else(|| n.to_string()),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|v| if v.is_null() { String::new() } else { to_js_string(v) })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => value.to_string(),
    }
}

fn strict_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(_), Value::Number(_))
        | (Value::Number(_), Value::String(_))
        | (Value::Bool(_), _)
        | (_, Value::Bool(_)) => {
            if a.is_array() || a.is_object() || b.is_array() || b.is_object() {
                return false;
            }
            to_number(a) == to_number(b)
        }
        _ => strict_equals(a, b),
    }
}

fn compare(a: &Value, b: &Value, cmp: fn(std::cmp::Ordering) -> bool) -> bool {
    if let (Value::String(x), Value::String(y)) = (a, b) {
        return cmp(x.cmp(y));
    }
    let (x, y) = (to_number(a), to_number(b));
    x.partial_cmp(&y).is_some_and(cmp)
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::String(s) => s.contains(&to_js_string(needle)),
        Value::Array(items) => items.iter().any(|item| strict_equals(item, needle)),
        Value::Object(map) => map.contains_key(&to_js_string(needle)),
        _ => false,
    }
}

fn binary(op: BinaryOp, l: &Value, r: &Value) -> Value {
    match op {
        BinaryOp::Add => {
            let stringy = |v: &Value| matches!(v, Value::String(_) | Value::Array(_) | Value::Object(_));
            if stringy(l) || stringy(r) {
                Value::String(format!("{}{}", to_js_string(l), to_js_string(r)))
            } else {
                number_value(to_number(l) + to_number(r))
            }
        }
        BinaryOp::Sub => number_value(to_number(l) - to_number(r)),
        BinaryOp::Mul => number_value(to_number(l) * to_number(r)),
        BinaryOp::Div => number_value(to_number(l) / to_number(r)),
        BinaryOp::Rem => number_value(to_number(l) % to_number(r)),
        BinaryOp::Eq => Value::Bool(loose_equals(l, r)),
        BinaryOp::NotEq => Value::Bool(!loose_equals(l, r)),
        BinaryOp::StrictEq => Value::Bool(strict_equals(l, r)),
        BinaryOp::StrictNotEq => Value::Bool(!strict_equals(l, r)),
        BinaryOp::Lt => Value::Bool(compare(l, r, |o| o.is_lt())),
        BinaryOp::Lte => Value::Bool(compare(l, r, |o| o.is_le())),
        BinaryOp::Gt => Value::Bool(compare(l, r, |o| o.is_gt())),
        BinaryOp::Gte => Value::Bool(compare(l, r, |o| o.is_ge())),
        BinaryOp::Contains => Value::Bool(contains(l, r)),
    }
}

fn member(target: &Value, property: &str) -> Value {
    match (target, property) {
        (Value::String(s), "length") => Value::from(s.chars().count()),
        (Value::Array(items), "length") => Value::from(items.len()),
        (Value::Array(items), key) => key
            .parse::<usize>()
            .ok()
            .and_then(|i| items.get(i).cloned())
            .unwrap_or(Value::Null),
        (Value::Object(map), key) => map.get(key).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn index_value(target: &Value, key: &Value) -> Value {
    match (target, key) {
        (Value::Array(items), Value::Number(n)) => n
            .as_u64()
            .and_then(|i| items.get(i as usize).cloned())
            .unwrap_or(Value::Null),
        (Value::String(s), Value::Number(n)) => n
            .as_u64()
            .and_then(|i| s.chars().nth(i as usize))
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Null),
        (_, key) => member(target, &to_js_string(key)),
    }
}

fn call(
    callee: &Expression,
    args: &[Expression],
    bindings: &Bindings,
    depth: usize,
) -> Result<Value, FlowError> {
    let evaluate = |e: &Expression, b: &Bindings| eval_at(e, b, depth);
    let args = args
        .iter()
        .map(|a| evaluate(a, bindings))
        .collect::<Result<Vec<_>, _>>()?;

    match callee {
        Expression::Member { object, property } => {
            if let Expression::Identifier(ns) = object.as_ref() {
                if bindings.get(ns).is_none() {
                    return namespace_call(ns, property, &args);
                }
            }
            let target = evaluate(object, bindings)?;
            method_call(&target, property, &args)
        }
        Expression::Identifier(name) if bindings.get(name).is_none() => global_call(name, &args),
        _ => Err(FlowError::evaluation("Expression is not callable")),
    }
}

fn arg(args: &[Value], i: usize) -> &Value {
    args.get(i).unwrap_or(&Value::Null)
}

fn string_arg(args: &[Value], i: usize) -> String {
    to_js_string(arg(args, i))
}

/// Resolve a possibly-negative JS index against `len`
fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if value.is_null() {
        return default;
    }
    let n = to_number(value);
    if n.is_nan() {
        return 0;
    }
    let n = n.trunc() as i64;
    if n < 0 {
        (len as i64 + n).max(0) as usize
    } else {
        (n as usize).min(len)
    }
}

fn global_call(name: &str, args: &[Value]) -> Result<Value, FlowError> {
    let first = arg(args, 0);
    Ok(match name {
        "String" => Value::String(to_js_string(first)),
        "Number" => number_value(to_number(first)),
        "Boolean" => Value::Bool(is_truthy(first)),
        "parseFloat" => number_value(parse_leading_number(&to_js_string(first), true)),
        "parseInt" => number_value(parse_leading_number(&to_js_string(first), false)),
        "isNaN" => Value::Bool(to_number(first).is_nan()),
        _ => return Err(FlowError::evaluation(format!("{} is not defined", name))),
    })
}

fn parse_leading_number(text: &str, allow_fraction: bool) -> f64 {
    let text = text.trim_start();
    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in text.char_indices() {
        let ok = c.is_ascii_digit()
            || (i == 0 && (c == '-' || c == '+'))
            || (allow_fraction && c == '.' && !seen_dot);
        if !ok {
            break;
        }
        seen_dot |= c == '.';
        end = i + c.len_utf8();
    }
    let parsed = text[..end].parse::<f64>().unwrap_or(f64::NAN);
    if allow_fraction {
        parsed
    } else {
        parsed.trunc()
    }
}

fn namespace_call(ns: &str, function: &str, args: &[Value]) -> Result<Value, FlowError> {
    let numbers = || args.iter().map(to_number);
    let first = arg(args, 0);
    let result = match (ns, function) {
        ("JSON", "stringify") => Value::String(first.to_string()),
        ("JSON", "parse") => serde_json::from_str(&to_js_string(first))
            .map_err(|e| FlowError::evaluation(format!("JSON.parse: {}", e)))?,
        ("Math", "min") => number_value(numbers().fold(f64::INFINITY, f64::min)),
        ("Math", "max") => number_value(numbers().fold(f64::NEG_INFINITY, f64::max)),
        ("Math", "floor") => number_value(to_number(first).floor()),
        ("Math", "ceil") => number_value(to_number(first).ceil()),
        ("Math", "round") => number_value((to_number(first) + 0.5).floor()),
        ("Math", "abs") => number_value(to_number(first).abs()),
        ("Math", "sqrt") => number_value(to_number(first).sqrt()),
        ("Math", "pow") => number_value(to_number(first).powf(to_number(arg(args, 1)))),
        ("Object", "keys") => match first {
            Value::Object(map) => Value::Array(map.keys().cloned().map(Value::String).collect()),
            _ => Value::Array(vec![]),
        },
        ("Object", "values") => match first {
            Value::Object(map) => Value::Array(map.values().cloned().collect()),
            _ => Value::Array(vec![]),
        },
        _ => {
            return Err(FlowError::evaluation(format!(
                "{}.{} is not a function",
                ns, function
            )))
        }
    };
    Ok(result)
}

fn method_call(target: &Value, method: &str, args: &[Value]) -> Result<Value, FlowError> {
    if method == "toString" {
        return Ok(Value::String(to_js_string(target)));
    }
    let result = match target {
        Value::String(s) => string_method(s, method, args)?,
        Value::Array(items) => array_method(items, method, args),
        Value::Number(n) if method == "toFixed" => {
            let digits = to_number(arg(args, 0));
            let digits = if digits.is_nan() { 0.0 } else { digits.trunc() };
            if !(0.0..=MAX_FIXED_DIGITS).contains(&digits) {
                return Err(FlowError::evaluation(
                    "toFixed() digits argument must be between 0 and 100",
                ));
            }
            Some(Value::String(format!(
                "{:.*}",
                digits as usize,
                n.as_f64().unwrap_or_default()
            )))
        }
        Value::Object(map) if method == "hasOwnProperty" => {
            Some(Value::Bool(map.contains_key(&string_arg(args, 0))))
        }
        _ => None,
    };
    result.ok_or_else(|| {
        FlowError::evaluation(format!(
            "{}.{} is not a function",
            type_name(target),
            method
        ))
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// `None` when the method does not exist on strings
fn string_method(s: &str, method: &str, args: &[Value]) -> Result<Option<Value>, FlowError> {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len();
    let slice = |start: usize, end: usize| -> Value {
        if start >= end {
            Value::String(String::new())
        } else {
            Value::String(chars[start..end].iter().collect())
        }
    };

    Ok(Some(match method {
        "toUpperCase" => Value::String(s.to_uppercase()),
        "toLowerCase" => Value::String(s.to_lowercase()),
        "trim" => Value::String(s.trim().to_string()),
        "trimStart" => Value::String(s.trim_start().to_string()),
        "trimEnd" => Value::String(s.trim_end().to_string()),
        "includes" => Value::Bool(s.contains(&string_arg(args, 0))),
        "startsWith" => Value::Bool(s.starts_with(&string_arg(args, 0))),
        "endsWith" => Value::Bool(s.ends_with(&string_arg(args, 0))),
        "indexOf" => {
            let needle = string_arg(args, 0);
            match s.find(&needle) {
                Some(byte) => Value::from(s[..byte].chars().count()),
                None => Value::from(-1),
            }
        }
        "slice" => slice(
            relative_index(arg(args, 0), len, 0),
            relative_index(arg(args, 1), len, len),
        ),
        "substring" => {
            let clamp = |v: &Value, default: usize| {
                if v.is_null() {
                    default
                } else {
                    (to_number(v).max(0.0) as usize).min(len)
                }
            };
            let (a, b) = (clamp(arg(args, 0), 0), clamp(arg(args, 1), len));
            slice(a.min(b), a.max(b))
        }
        "charAt" => {
            let i = to_number(arg(args, 0)).max(0.0) as usize;
            Value::String(chars.get(i).map(|c| c.to_string()).unwrap_or_default())
        }
        "split" => {
            let parts: Vec<Value> = match arg(args, 0) {
                Value::Null => vec![Value::String(s.to_string())],
                sep => {
                    let sep = to_js_string(sep);
                    if sep.is_empty() {
                        chars.iter().map(|c| Value::String(c.to_string())).collect()
                    } else {
                        s.split(sep.as_str()).map(|p| Value::String(p.to_string())).collect()
                    }
                }
            };
            Value::Array(parts)
        }
        "replace" => Value::String(s.replacen(&string_arg(args, 0), &string_arg(args, 1), 1)),
        "replaceAll" => Value::String(s.replace(&string_arg(args, 0), &string_arg(args, 1))),
        "repeat" => Value::String(s.repeat(repeat_count(s, arg(args, 0))?)),
        "concat" => Value::String(
            std::iter::once(s.to_string())
                .chain(args.iter().map(to_js_string))
                .collect(),
        ),
        _ => return Ok(None),
    }))
}

fn repeat_count(s: &str, count: &Value) -> Result<usize, FlowError> {
    let n = to_number(count);
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    if n < 0.0 || n.is_infinite() {
        return Err(FlowError::evaluation(format!("Invalid count value: {}", format_number(n))));
    }
    if s.is_empty() {
        return Ok(0);
    }
    if n * s.len() as f64 > MAX_STRING_LEN as f64 {
        return Err(FlowError::evaluation("Invalid string length"));
    }
    Ok(n as usize)
}

fn array_method(items: &[Value], method: &str, args: &[Value]) -> Option<Value> {
    let len = items.len();
    Some(match method {
        "includes" => Value::Bool(items.iter().any(|v| strict_equals(v, arg(args, 0)))),
        "indexOf" => items
            .iter()
            .position(|v| strict_equals(v, arg(args, 0)))
            .map(Value::from)
            .unwrap_or_else(|| Value::from(-1)),
        "join" => {
            let sep = match arg(args, 0) {
                Value::Null => ",".to_string(),
                other => to_js_string(other),
            };
            Value::String(
                items
                    .iter()
                    .map(|v| if v.is_null() { String::new() } else { to_js_string(v) })
                    .collect::<Vec<_>>()
                    .join(&sep),
            )
        }
        "slice" => {
            let start = relative_index(arg(args, 0), len, 0);
            let end = relative_index(arg(args, 1), len, len);
            Value::Array(if start < end { items[start..end].to_vec() } else { vec![] })
        }
        "concat" => {
            let mut out = items.to_vec();
            for a in args {
                match a {
                    Value::Array(more) => out.extend(more.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Value::Array(out)
        }
        "reverse" => Value::Array(items.iter().rev().cloned().collect()),
        _ => return None,
    })
}
