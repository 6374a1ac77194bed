//! Join-key normalization.
//!
//! Sources spell the same key differently: the report card writes RCDTS codes with dashes, the
//! directory stores the parts in separate columns, census rows carry ZIPs inside a `GEO_ID` such
//! as `8600000US60621`, and directory ZIPs may be ZIP+4. [`KeyTransform`] steps turn those into
//! values that compare equal under [`Value::matches`].

use serde::Deserialize;

use crate::types::{exact_i64, DataType, Value};

/// A single value-level normalization step.
///
/// Steps never fail: inputs that cannot be transformed become [`Value::Null`], the same way a
/// coercing numeric conversion treats junk.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyTransform {
    /// Strip leading and trailing whitespace.
    Trim,
    /// Remove every occurrence of any of these characters.
    RemoveChars(String),
    /// Text after the first occurrence of the token; `Null` if the token is absent.
    AfterToken(String),
    /// The first `n` ASCII digits after optional leading whitespace; `Null` if there are fewer.
    LeadingDigits(usize),
    /// Parse as an integer (integral floats inside the `i64` range convert); `Null` if that fails.
    ToInt64,
    /// Parse as a float; `Null` if that fails.
    ToFloat64,
    /// Render as text.
    ToUtf8,
}

impl KeyTransform {
    /// Apply this step to one value.
    pub fn apply(&self, value: &Value) -> Value {
        if value.is_null() {
            return Value::Null;
        }
        match self {
            KeyTransform::Trim => map_text(value, |s| Some(s.trim().to_string())),
            KeyTransform::RemoveChars(chars) => {
                map_text(value, |s| Some(s.chars().filter(|c| !chars.contains(*c)).collect()))
            }
            KeyTransform::AfterToken(token) => {
                map_text(value, |s| s.split_once(token.as_str()).map(|(_, rest)| rest.to_string()))
            }
            KeyTransform::LeadingDigits(n) => map_text(value, |s| {
                let digits: String = s.trim_start().chars().take_while(|c| c.is_ascii_digit()).take(*n).collect();
                (digits.len() == *n).then_some(digits)
            }),
            KeyTransform::ToInt64 => to_int(value),
            KeyTransform::ToFloat64 => to_float(value),
            KeyTransform::ToUtf8 => Value::Utf8(text_of(value)),
        }
    }

    /// Type of the values this step produces.
    pub fn output_type(&self) -> DataType {
        match self {
            KeyTransform::ToInt64 => DataType::Int64,
            KeyTransform::ToFloat64 => DataType::Float64,
            _ => DataType::Utf8,
        }
    }
}

/// Apply `steps` in order.
pub fn normalize(value: &Value, steps: &[KeyTransform]) -> Value {
    steps.iter().fold(value.clone(), |acc, step| step.apply(&acc))
}

/// Text form of a value, as used when keys are rebuilt from parts.
///
/// Integral floats print without a fraction (`60621.0` -> `"60621"`), since workbooks often store
/// codes as numbers. Floats outside the `i64` range keep their full float digits.
pub fn text_of(value: &Value) -> String {
    match value {
        Value::Float64(f) => match exact_i64(*f) {
            Some(i) => i.to_string(),
            None => f.to_string(),
        },
        other => other.to_string(),
    }
}

fn map_text(value: &Value, f: impl FnOnce(&str) -> Option<String>) -> Value {
    f(&text_of(value)).map(Value::Utf8).unwrap_or(Value::Null)
}

fn to_int(value: &Value) -> Value {
    match value {
        Value::Int64(v) => Value::Int64(*v),
        Value::Float64(f) => exact_i64(*f).map(Value::Int64).unwrap_or(Value::Null),
        Value::Utf8(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(exact_i64))
                .map(Value::Int64)
                .unwrap_or(Value::Null)
        }
        _ => Value::Null,
    }
}

fn to_float(value: &Value) -> Value {
    match value {
        Value::Int64(v) => Value::Float64(*v as f64),
        Value::Float64(f) => Value::Float64(*f),
        Value::Utf8(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| !f.is_nan())
            .map(Value::Float64)
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}
