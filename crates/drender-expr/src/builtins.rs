//! Globals and builtin methods
//!
//! Array and string methods never mutate their receiver; they operate on
//! the copy the interpreter hands them.

use crate::error::EvalError;
use crate::interp::{get_member, to_property_key};
use crate::value::{Function, Object, Value, number_to_string};

pub const GLOBAL_NAMES: &[&str] = &[
    "Math", "JSON", "Object", "Array", "String", "Number", "Boolean",
    "parseInt", "parseFloat", "isNaN", "console", "NaN", "Infinity", "undefined",
];

const ARRAY_METHODS: &[&str] = &[
    "map", "filter", "find", "findIndex", "some", "every", "includes", "indexOf",
    "join", "slice", "concat", "reduce", "forEach",
];

const STRING_METHODS: &[&str] = &[
    "toUpperCase", "toLowerCase", "trim", "includes", "startsWith", "endsWith",
    "split", "slice", "indexOf", "replace",
];

type NativeResult = Result<Value, EvalError>;

fn native(name: &str, f: impl Fn(Vec<Value>) -> NativeResult + 'static) -> Value {
    Value::Function(Function::new(name, move |_this, args| f(args)))
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or_default()
}

fn numeric(name: &str, f: fn(f64) -> f64) -> (String, Value) {
    (name.to_string(), native(name, move |args| Ok(Value::Number(f(arg(&args, 0).to_number())))))
}

/// Bindings of the outermost scope
pub(crate) fn globals() -> Vec<(String, Value)> {
    vec![
        ("Math".into(), Value::Object(math())),
        ("JSON".into(), Value::Object(json())),
        ("Object".into(), Value::Object(object_statics())),
        ("Array".into(), Value::Object(array_statics())),
        ("String".into(), native("String", |args| Ok(Value::String(args.first().map_or(String::new(), Value::to_js_string))))),
        ("Number".into(), native("Number", |args| Ok(Value::Number(args.first().map_or(0.0, Value::to_number))))),
        ("Boolean".into(), native("Boolean", |args| Ok(Value::Bool(arg(&args, 0).truthy())))),
        ("parseInt".into(), native("parseInt", |args| Ok(Value::Number(parse_int(&arg(&args, 0).to_js_string(), &arg(&args, 1)))))),
        ("parseFloat".into(), native("parseFloat", |args| Ok(Value::Number(parse_float(&arg(&args, 0).to_js_string()))))),
        ("isNaN".into(), native("isNaN", |args| Ok(Value::Bool(arg(&args, 0).to_number().is_nan())))),
        ("console".into(), Value::Object(console())),
        ("NaN".into(), Value::Number(f64::NAN)),
        ("Infinity".into(), Value::Number(f64::INFINITY)),
        ("undefined".into(), Value::Undefined),
    ]
}

fn math() -> Object {
    let mut math: Object = [
        numeric("abs", f64::abs),
        numeric("floor", f64::floor),
        numeric("ceil", f64::ceil),
        numeric("round", |n| (n + 0.5).floor()),
        numeric("sqrt", f64::sqrt),
        numeric("trunc", f64::trunc),
        numeric("sign", |n| if n.is_nan() || n == 0.0 { n } else { n.signum() }),
    ]
    .into_iter()
    .collect();
    math.set("min", native("min", |args| {
        Ok(Value::Number(args.iter().map(Value::to_number).fold(f64::INFINITY, |a, b| {
            if a.is_nan() || b.is_nan() { f64::NAN } else { a.min(b) }
        })))
    }));
    math.set("max", native("max", |args| {
        Ok(Value::Number(args.iter().map(Value::to_number).fold(f64::NEG_INFINITY, |a, b| {
            if a.is_nan() || b.is_nan() { f64::NAN } else { a.max(b) }
        })))
    }));
    math.set("pow", native("pow", |args| Ok(Value::Number(arg(&args, 0).to_number().powf(arg(&args, 1).to_number())))));
    math.set("PI", Value::Number(std::f64::consts::PI));
    math.set("E", Value::Number(std::f64::consts::E));
    math
}

fn json() -> Object {
    let mut json = Object::new();
    json.set("stringify", native("stringify", |args| {
        let value = arg(&args, 0);
        if matches!(value, Value::Undefined | Value::Function(_)) {
            return Ok(Value::Undefined);
        }
        let pretty = arg(&args, 2).to_number() > 0.0 || arg(&args, 2).as_str().is_some_and(|s| !s.is_empty());
        let json = value.to_json();
        let text = if pretty { serde_json::to_string_pretty(&json) } else { serde_json::to_string(&json) };
        text.map(Value::String).map_err(EvalError::host)
    }));
    json.set("parse", native("parse", |args| {
        let text = arg(&args, 0).to_js_string();
        serde_json::from_str::<serde_json::Value>(&text)
            .map(|json| Value::from_json(&json))
            .map_err(|e| EvalError::Host(format!("SyntaxError: {e}")))
    }));
    json
}

/// Own enumerable entries of an object-like value
fn entries(value: &Value) -> Result<Vec<(String, Value)>, EvalError> {
    Ok(match value {
        Value::Object(o) => o.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        Value::Array(items) => items.iter().enumerate().map(|(i, v)| (i.to_string(), v.clone())).collect(),
        Value::String(s) => s.chars().enumerate().map(|(i, c)| (i.to_string(), Value::String(c.to_string()))).collect(),
        Value::Host(host) => {
            let mut out = Vec::new();
            for k in host.keys() {
                let v = host.get(&k)?;
                out.push((k, v));
            }
            out
        }
        Value::Undefined | Value::Null => {
            return Err(EvalError::type_error("Cannot convert undefined or null to object"));
        }
        _ => Vec::new(),
    })
}

fn object_statics() -> Object {
    let mut object = Object::new();
    object.set("keys", native("keys", |args| {
        Ok(Value::Array(entries(&arg(&args, 0))?.into_iter().map(|(k, _)| Value::String(k)).collect()))
    }));
    object.set("values", native("values", |args| {
        Ok(Value::Array(entries(&arg(&args, 0))?.into_iter().map(|(_, v)| v).collect()))
    }));
    object.set("entries", native("entries", |args| {
        Ok(Value::Array(
            entries(&arg(&args, 0))?
                .into_iter()
                .map(|(k, v)| Value::Array(vec![Value::String(k), v]))
                .collect(),
        ))
    }));
    object.set("assign", native("assign", |args| {
        let mut target = match args.first() {
            Some(Value::Object(o)) => o.clone(),
            _ => Object::new(),
        };
        for source in args.iter().skip(1).filter(|v| !v.is_nullish()) {
            for (k, v) in entries(source)? {
                target.set(k, v);
            }
        }
        Ok(Value::Object(target))
    }));
    object.set("fromEntries", native("fromEntries", |args| {
        let Value::Array(pairs) = arg(&args, 0) else {
            return Err(EvalError::type_error("Object.fromEntries expects an array of pairs"));
        };
        let mut out = Object::new();
        for pair in pairs {
            let key = get_member(&pair, "0")?;
            out.set(to_property_key(&key), get_member(&pair, "1")?);
        }
        Ok(Value::Object(out))
    }));
    object
}

fn array_statics() -> Object {
    let mut array = Object::new();
    array.set("isArray", native("isArray", |args| Ok(Value::Bool(matches!(arg(&args, 0), Value::Array(_))))));
    array.set("from", native("from", |args| {
        let items = match arg(&args, 0) {
            Value::Array(items) => items,
            Value::String(s) => s.chars().map(|c| Value::String(c.to_string())).collect(),
            _ => Vec::new(),
        };
        match args.get(1) {
            Some(Value::Function(f)) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| f.call(&Value::Undefined, vec![v, Value::from(i)]))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            _ => Ok(Value::Array(items)),
        }
    }));
    array
}

fn console_line(args: &[Value]) -> String {
    args.iter()
        .map(|v| match v {
            Value::Array(_) | Value::Object(_) => v.to_json().to_string(),
            other => other.to_js_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn console() -> Object {
    let mut console = Object::new();
    console.set("log", native("log", |args| {
        tracing::info!("[JS] {}", console_line(&args));
        Ok(Value::Undefined)
    }));
    console.set("info", native("info", |args| {
        tracing::info!("[JS] {}", console_line(&args));
        Ok(Value::Undefined)
    }));
    console.set("warn", native("warn", |args| {
        tracing::warn!("[JS] {}", console_line(&args));
        Ok(Value::Undefined)
    }));
    console.set("error", native("error", |args| {
        tracing::error!("[JS] {}", console_line(&args));
        Ok(Value::Undefined)
    }));
    console.set("debug", native("debug", |args| {
        tracing::debug!("[JS] {}", console_line(&args));
        Ok(Value::Undefined)
    }));
    console
}

fn parse_int(text: &str, radix: &Value) -> f64 {
    let mut s = text.trim_start();
    let negative = s.starts_with('-');
    if negative || s.starts_with('+') {
        s = &s[1..];
    }
    let requested = radix.to_number();
    let mut radix = match requested {
        r if r.is_nan() || r == 0.0 => 10,
        r if (2.0..=36.0).contains(&r) => r as u32,
        _ => return f64::NAN,
    };
    let hex_allowed = requested.is_nan() || requested == 0.0 || radix == 16;
    if hex_allowed && (s.starts_with("0x") || s.starts_with("0X")) {
        s = &s[2..];
        radix = 16;
    }
    let digits: String = s.chars().take_while(|c| c.is_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let value = digits.chars().fold(0.0, |acc, c| acc * f64::from(radix) + f64::from(c.to_digit(radix).unwrap_or(0)));
    if negative { -value } else { value }
}

fn parse_float(text: &str) -> f64 {
    let s = text.trim_start();
    for (prefix, value) in [("Infinity", f64::INFINITY), ("+Infinity", f64::INFINITY), ("-Infinity", f64::NEG_INFINITY)] {
        if s.starts_with(prefix) {
            return value;
        }
    }
    let candidate: String = s
        .chars()
        .take_while(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
        .collect();
    (1..=candidate.len())
        .rev()
        .find_map(|len| candidate[..len].parse::<f64>().ok())
        .unwrap_or(f64::NAN)
}

pub(crate) fn has_method(target: &Value, name: &str) -> bool {
    match target {
        Value::Array(_) => ARRAY_METHODS.contains(&name),
        Value::String(_) => STRING_METHODS.contains(&name),
        Value::Number(_) => name == "toFixed",
        _ => false,
    }
}

/// Method read without a call, e.g. `items.map` passed along as a value
pub(crate) fn bound_method(target: &Value, name: &str) -> Value {
    if !has_method(target, name) {
        return Value::Undefined;
    }
    let receiver = target.clone();
    let method = name.to_string();
    Value::Function(Function::new(name, move |_this, args| call_method(&receiver, &method, args)))
}

pub(crate) fn call_method(target: &Value, name: &str, args: Vec<Value>) -> NativeResult {
    match target {
        Value::Array(items) => array_method(items, name, args),
        Value::String(s) => string_method(s, name, args),
        Value::Number(n) => {
            let digits = arg(&args, 0).to_number();
            let digits = if digits.is_nan() { 0 } else { digits as i64 };
            if !(0..=100).contains(&digits) {
                return Err(EvalError::Range("toFixed() digits argument must be between 0 and 100".into()));
            }
            if !n.is_finite() {
                return Ok(Value::String(number_to_string(*n)));
            }
            Ok(Value::String(format!("{:.*}", digits as usize, n)))
        }
        _ => Err(EvalError::type_error(format!("{name} is not a function"))),
    }
}

fn callback<'a>(args: &'a [Value], method: &str) -> Result<&'a Function, EvalError> {
    match args.first() {
        Some(Value::Function(f)) => Ok(f),
        other => Err(EvalError::type_error(format!(
            "{} is not a function (in {method})",
            other.map_or("undefined".to_string(), Value::to_js_string)
        ))),
    }
}

/// Resolve a relative index argument against `len`
fn relative_index(value: Option<&Value>, len: usize, default: usize) -> usize {
    let Some(value) = value.filter(|v| !matches!(v, Value::Undefined)) else { return default };
    let n = value.to_number();
    if n.is_nan() {
        return 0;
    }
    let n = n.trunc();
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        (n as usize).min(len)
    }
}

/// SameValueZero, the comparison `includes` uses
fn same_value_zero(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) if x.is_nan() && y.is_nan() => true,
        _ => a.strict_eq(b),
    }
}

fn array_method(items: &[Value], name: &str, args: Vec<Value>) -> NativeResult {
    let receiver = Value::Array(items.to_vec());
    let invoke = |f: &Function, item: &Value, i: usize| {
        f.call(&Value::Undefined, vec![item.clone(), Value::from(i), receiver.clone()])
    };

    match name {
        "map" => {
            let f = callback(&args, name)?;
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                out.push(invoke(f, item, i)?);
            }
            Ok(Value::Array(out))
        }
        "filter" => {
            let f = callback(&args, name)?;
            let mut out = Vec::new();
            for (i, item) in items.iter().enumerate() {
                if invoke(f, item, i)?.truthy() {
                    out.push(item.clone());
                }
            }
            Ok(Value::Array(out))
        }
        "find" | "findIndex" | "some" => {
            let f = callback(&args, name)?;
            for (i, item) in items.iter().enumerate() {
                if invoke(f, item, i)?.truthy() {
                    return Ok(match name {
                        "find" => item.clone(),
                        "findIndex" => Value::from(i),
                        _ => Value::Bool(true),
                    });
                }
            }
            Ok(match name {
                "find" => Value::Undefined,
                "findIndex" => Value::Number(-1.0),
                _ => Value::Bool(false),
            })
        }
        "every" => {
            let f = callback(&args, name)?;
            for (i, item) in items.iter().enumerate() {
                if !invoke(f, item, i)?.truthy() {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        "forEach" => {
            let f = callback(&args, name)?;
            for (i, item) in items.iter().enumerate() {
                invoke(f, item, i)?;
            }
            Ok(Value::Undefined)
        }
        "reduce" => {
            let f = callback(&args, name)?;
            let mut iter = items.iter().enumerate();
            let mut acc = match args.get(1) {
                Some(initial) => initial.clone(),
                None => match iter.next() {
                    Some((_, first)) => first.clone(),
                    None => return Err(EvalError::type_error("Reduce of empty array with no initial value")),
                },
            };
            for (i, item) in iter {
                acc = f.call(&Value::Undefined, vec![acc, item.clone(), Value::from(i), receiver.clone()])?;
            }
            Ok(acc)
        }
        "includes" => {
            let needle = arg(&args, 0);
            Ok(Value::Bool(items.iter().any(|item| same_value_zero(item, &needle))))
        }
        "indexOf" => {
            let needle = arg(&args, 0);
            Ok(items
                .iter()
                .position(|item| item.strict_eq(&needle))
                .map_or(Value::Number(-1.0), Value::from))
        }
        "join" => {
            let sep = match args.first() {
                None | Some(Value::Undefined) => ",".to_string(),
                Some(sep) => sep.to_js_string(),
            };
            Ok(Value::String(
                items
                    .iter()
                    .map(|v| if v.is_nullish() { String::new() } else { v.to_js_string() })
                    .collect::<Vec<_>>()
                    .join(&sep),
            ))
        }
        "slice" => {
            let start = relative_index(args.first(), items.len(), 0);
            let end = relative_index(args.get(1), items.len(), items.len());
            Ok(Value::Array(if start < end { items[start..end].to_vec() } else { Vec::new() }))
        }
        "concat" => {
            let mut out = items.to_vec();
            for a in args {
                match a {
                    Value::Array(more) => out.extend(more),
                    other => out.push(other),
                }
            }
            Ok(Value::Array(out))
        }
        _ => Err(EvalError::type_error(format!("{name} is not a function"))),
    }
}

fn string_method(s: &str, name: &str, args: Vec<Value>) -> NativeResult {
    let text_arg = |i: usize| arg(&args, i).to_js_string();
    match name {
        "toUpperCase" => Ok(Value::String(s.to_uppercase())),
        "toLowerCase" => Ok(Value::String(s.to_lowercase())),
        "trim" => Ok(Value::String(s.trim().to_string())),
        "includes" => Ok(Value::Bool(s.contains(text_arg(0).as_str()))),
        "startsWith" => Ok(Value::Bool(s.starts_with(text_arg(0).as_str()))),
        "endsWith" => Ok(Value::Bool(s.ends_with(text_arg(0).as_str()))),
        "indexOf" => {
            let needle = text_arg(0);
            Ok(match s.find(needle.as_str()) {
                Some(byte) => Value::from(s[..byte].chars().count()),
                None => Value::Number(-1.0),
            })
        }
        "split" => {
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::Undefined) => vec![Value::String(s.to_string())],
                Some(sep) => {
                    let sep = sep.to_js_string();
                    if sep.is_empty() {
                        s.chars().map(|c| Value::String(c.to_string())).collect()
                    } else {
                        s.split(sep.as_str()).map(Value::from).collect()
                    }
                }
            };
            Ok(Value::Array(parts))
        }
        "slice" => {
            let chars: Vec<char> = s.chars().collect();
            let start = relative_index(args.first(), chars.len(), 0);
            let end = relative_index(args.get(1), chars.len(), chars.len());
            Ok(Value::String(if start < end { chars[start..end].iter().collect() } else { String::new() }))
        }
        "replace" => {
            let pattern = text_arg(0);
            let Some(byte) = s.find(pattern.as_str()) else { return Ok(Value::String(s.to_string())) };
            let replacement = match args.get(1) {
                Some(Value::Function(f)) => f.call(&Value::Undefined, vec![Value::String(pattern.clone())])?.to_js_string(),
                _ => text_arg(1),
            };
            Ok(Value::String(format!("{}{}{}", &s[..byte], replacement, &s[byte + pattern.len()..])))
        }
        _ => Err(EvalError::type_error(format!("{name} is not a function"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(target: Value, name: &str, args: Vec<Value>) -> Value {
        call_method(&target, name, args).unwrap()
    }

    fn global(name: &str) -> Value {
        globals().into_iter().find(|(k, _)| k == name).map(|(_, v)| v).unwrap()
    }

    #[test]
    fn test_global_names_match_bindings() {
        let names: Vec<String> = globals().into_iter().map(|(k, _)| k).collect();
        assert_eq!(names, GLOBAL_NAMES.iter().map(|s| s.to_string()).collect::<Vec<_>>());
    }

    #[test]
    fn test_array_slice_and_join() {
        let items = Value::from_json(&json!([1, 2, 3, 4]));
        assert_eq!(call(items.clone(), "slice", vec![Value::Number(1.0), Value::Number(-1.0)]).to_json(), json!([2, 3]));
        assert_eq!(call(items.clone(), "join", vec![Value::from("-")]), Value::from("1-2-3-4"));
        assert_eq!(call(items, "indexOf", vec![Value::Number(3.0)]), Value::Number(2.0));
    }

    #[test]
    fn test_includes_uses_same_value_zero() {
        let items = Value::Array(vec![Value::Number(f64::NAN)]);
        assert_eq!(call(items.clone(), "includes", vec![Value::Number(f64::NAN)]), Value::Bool(true));
        assert_eq!(call(items, "indexOf", vec![Value::Number(f64::NAN)]), Value::Number(-1.0));
    }

    #[test]
    fn test_string_methods() {
        assert_eq!(call(Value::from("a,b"), "split", vec![Value::from(",")]).to_json(), json!(["a", "b"]));
        assert_eq!(call(Value::from("héllo"), "slice", vec![Value::Number(1.0), Value::Number(3.0)]), Value::from("él"));
        assert_eq!(call(Value::from("a-a"), "replace", vec![Value::from("a"), Value::from("b")]), Value::from("b-a"));
        assert_eq!(call(Value::from("  x "), "trim", vec![]), Value::from("x"));
    }

    #[test]
    fn test_to_fixed() {
        assert_eq!(call(Value::Number(1.005), "toFixed", vec![Value::Number(1.0)]), Value::from("1.0"));
        assert_eq!(call(Value::Number(2.0), "toFixed", vec![Value::Number(2.0)]), Value::from("2.00"));
    }

    #[test]
    fn test_parse_numbers() {
        assert_eq!(parse_int("42px", &Value::Undefined), 42.0);
        assert_eq!(parse_int("-0x1f", &Value::Undefined), -31.0);
        assert!(parse_int("px", &Value::Undefined).is_nan());
        assert_eq!(parse_float("3.5em"), 3.5);
        assert_eq!(parse_float("1e3x"), 1000.0);
    }

    #[test]
    fn test_json_globals() {
        let Value::Object(json) = global("JSON") else { panic!() };
        let stringify = json.get("stringify").and_then(Value::as_function).unwrap();
        let out = stringify.call(&Value::Undefined, vec![Value::from_json(&json!({"a": [1, "x"]}))]).unwrap();
        assert_eq!(out, Value::from(r#"{"a":[1,"x"]}"#));
        let parse = json.get("parse").and_then(Value::as_function).unwrap();
        assert!(parse.call(&Value::Undefined, vec![Value::from("{bad")]).is_err());
    }

    #[test]
    fn test_math_min_max() {
        let Value::Object(math) = global("Math") else { panic!() };
        let max = math.get("max").and_then(Value::as_function).unwrap();
        assert_eq!(max.call(&Value::Undefined, vec![Value::Number(1.0), Value::Number(3.0)]).unwrap(), Value::Number(3.0));
        assert_eq!(max.call(&Value::Undefined, vec![]).unwrap(), Value::Number(f64::NEG_INFINITY));
    }
}
