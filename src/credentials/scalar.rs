//! Lenient scalar decoding for fields whose JSON type varies by writer.
//!
//! Expiry timestamps and numeric ids show up as integers, floats or
//! numeric strings depending on which tool wrote the file. Each shape is an
//! explicit attempt, tried in order; the first success wins and a value no
//! attempt accepts is treated as absent.

use serde_json::Value;

type Attempt = fn(&Value) -> Option<i64>;

const INTEGER_ATTEMPTS: [Attempt; 3] = [native_integer, native_float, integer_string];

fn native_integer(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_u64().and_then(|v| i64::try_from(v).ok()))
}

fn native_float(value: &Value) -> Option<i64> {
    let float = value.as_f64()?;
    if !float.is_finite() || float < i64::MIN as f64 || float > i64::MAX as f64 {
        return None;
    }
    Some(float.trunc() as i64)
}

fn integer_string(value: &Value) -> Option<i64> {
    value.as_str()?.trim().parse::<i64>().ok()
}

/// Decodes an integer-like field, `None` when absent or not integer-like.
pub fn integer(value: Option<&Value>) -> Option<i64> {
    let value = value?;
    INTEGER_ATTEMPTS.iter().find_map(|attempt| attempt(value))
}

/// Decodes an id-like field that may be a string or a number.
pub fn identifier(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Normalizes an expiry to epoch milliseconds; values below 1e11 are taken as seconds.
pub fn epoch_millis(value: Option<&Value>) -> Option<i64> {
    let raw = integer(value)?;
    if raw.abs() < 100_000_000_000 {
        raw.checked_mul(1000)
    } else {
        Some(raw)
    }
}

#[cfg(test)]
#[path = "tests/scalar_tests.rs"]
mod tests;
