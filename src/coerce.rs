//! Value coercion for tag writes.
//!
//! The host sends `tag_value` as whatever its form produced (usually text)
//! together with a declared `value_type`. Numbers follow decimal parsing and
//! let NaN through; booleans use an explicit word list instead of
//! truthiness, so `"false"` writes `false`.

use anyhow::{anyhow, Result};
use serde_json::Value;

use crate::host::ValueType;
use crate::protocol::TagValue;

/// Coerce a raw host value to the declared type.
///
/// # Errors
///
/// Fails for text that is not a recognised boolean word, and for objects or
/// arrays when no coercion applies.
pub fn coerce(raw: Option<&Value>, value_type: Option<ValueType>) -> Result<TagValue> {
    match value_type {
        Some(ValueType::Number) => Ok(TagValue::Number(to_number(raw))),
        Some(ValueType::Boolean) => to_boolean(raw).map(TagValue::Bool),
        Some(ValueType::String | ValueType::Other) | None => match raw {
            None => Ok(TagValue::Null),
            Some(value) => TagValue::from_json(value.clone())
                .ok_or_else(|| anyhow!("Unsupported tag value: {value}")),
        },
    }
}

/// Decimal parse; unparsable input becomes NaN rather than an error.
fn to_number(raw: Option<&Value>) -> f64 {
    match raw {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NAN),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse().unwrap_or(f64::NAN)
            }
        }
        Some(Value::Bool(b)) => f64::from(u8::from(*b)),
        Some(Value::Null) => 0.0,
        None | Some(Value::Array(_) | Value::Object(_)) => f64::NAN,
    }
}

fn to_boolean(raw: Option<&Value>) -> Result<bool> {
    match raw {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::Number(n)) => Ok(n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan())),
        Some(Value::String(s)) => parse_bool(s),
        Some(other) => Err(anyhow!("Cannot coerce {other} to boolean")),
    }
}

fn parse_bool(text: &str) -> Result<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        _ => Err(anyhow!("Cannot coerce {text:?} to boolean")),
    }
}
