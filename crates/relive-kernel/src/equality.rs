//! Structural equality over configuration values.
//!
//! Only used to compare resolved configurations across module versions.
//! Depends on nothing but its two arguments.

use serde_json::Value;

/// Deep structural equality over JSON-like values.
///
/// Same primitives are equal; values of different basic type are not;
/// objects and arrays need the same number of keys and every key equal.
/// Numbers compare by value, so `1` and `1.0` are equal.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                return x == y;
            }
            if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                return x == y;
            }
            match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| deep_equal(x, y))
        }
        (Value::Object(x), Value::Object(y)) => {
            if x.len() != y.len() {
                return false;
            }
            x.iter()
                .all(|(key, x)| y.get(key).is_some_and(|y| deep_equal(x, y)))
        }
        _ => false,
    }
}
