//! Loose scalar semantics used when moving values between storage columns
//! and SCIM attributes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cast {
    Bool,
    Int,
    String,
}

/// `null`, `false`, `0`, `0.0`, `""`, `"0"`, `[]` and `{}` are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !(s.is_empty() || s == "0"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Strict integer read: numbers (floats truncate), and strings that hold a
/// whole integer. Used for identity columns.
pub fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

/// Leading-integer parse: `"12abc"` is 12, `"x"` is 0.
fn leading_int(raw: &str) -> i64 {
    let trimmed = raw.trim_start();
    let mut end = 0;
    for (idx, ch) in trimmed.char_indices() {
        let sign = idx == 0 && (ch == '-' || ch == '+');
        if sign || ch.is_ascii_digit() {
            end = idx + ch.len_utf8();
        } else {
            break;
        }
    }
    trimmed[..end].parse().unwrap_or(0)
}

pub fn to_int(value: &Value) -> i64 {
    match value {
        Value::Null => 0,
        Value::Bool(b) => i64::from(*b),
        Value::Number(n) => n.as_i64().unwrap_or_else(|| n.as_f64().unwrap_or(0.0) as i64),
        Value::String(s) => leading_int(s),
        Value::Array(_) | Value::Object(_) => i64::from(is_truthy(value)),
    }
}

pub fn to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => String::new(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if !n.is_i64() && !n.is_u64() && f.fract() == 0.0 && f.abs() < 1e15 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        },
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn cast(value: &Value, cast: Cast) -> Value {
    match cast {
        Cast::Bool => Value::Bool(is_truthy(value)),
        Cast::Int => Value::from(to_int(value)),
        Cast::String => Value::String(to_string(value)),
    }
}

pub fn toggle(value: &Value) -> Value {
    Value::Bool(!is_truthy(value))
}
