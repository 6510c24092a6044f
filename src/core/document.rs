//! Documents and value ordering
//!
//! Stored records are JSON objects. This module holds the comparison
//! rules shared by filtering, sorting and grouping.

use std::cmp::Ordering;
use serde_json::{Map, Number, Value};

/// A stored record: an ordered mapping of field names to values
pub type Document = Map<String, Value>;

/// Type classes in sort order: null, numbers, strings, objects, arrays, booleans
pub fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Numeric view of a value, if it is a number
pub fn as_f64(value: &Value) -> Option<f64> {
    value.as_f64()
}

/// Build a JSON number, keeping integers integral when possible
pub fn number_value(n: f64, integral: bool) -> Value {
    if integral && n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
        Value::Number((n as i64).into())
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

/// Whether two values belong to the same type class and can be ordered
pub fn comparable(left: &Value, right: &Value) -> bool {
    type_rank(left) == type_rank(right)
}

/// Total order over all values.
///
/// Values of different type classes order by class; numbers compare
/// numerically regardless of integer/float representation.
pub fn compare_values(left: &Value, right: &Value) -> Ordering {
    let by_rank = type_rank(left).cmp(&type_rank(right));
    if by_rank != Ordering::Equal {
        return by_rank;
    }

    match (left, right) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Number(l), Value::Number(r)) => compare_numbers(l, r),
        (Value::String(l), Value::String(r)) => l.cmp(r),
        (Value::Bool(l), Value::Bool(r)) => l.cmp(r),
        (Value::Array(l), Value::Array(r)) => {
            for (a, b) in l.iter().zip(r.iter()) {
                let ord = compare_values(a, b);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            l.len().cmp(&r.len())
        }
        (Value::Object(l), Value::Object(r)) => {
            for ((ka, va), (kb, vb)) in l.iter().zip(r.iter()) {
                let ord = ka.cmp(kb).then_with(|| compare_values(va, vb));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            l.len().cmp(&r.len())
        }
        _ => Ordering::Equal,
    }
}

fn compare_numbers(left: &Number, right: &Number) -> Ordering {
    if let (Some(l), Some(r)) = (left.as_i64(), right.as_i64()) {
        return l.cmp(&r);
    }
    let l = left.as_f64().unwrap_or(f64::NAN);
    let r = right.as_f64().unwrap_or(f64::NAN);
    l.partial_cmp(&r).unwrap_or(Ordering::Equal)
}

/// Equality with numeric normalisation (`1 == 1.0`)
pub fn values_equal(left: &Value, right: &Value) -> bool {
    comparable(left, right) && compare_values(left, right) == Ordering::Equal
}

/// Truthiness as used by `$expr`, `$cond` and the logical operators
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        _ => true,
    }
}

/// Stable key for grouping and set membership
pub fn group_key(value: &Value) -> String {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return format!("n:{}", i);
            }
            if let Some(u) = n.as_u64() {
                return format!("n:{}", u);
            }
            match n.as_f64() {
                // 2^63 is exact as f64; anything at or past it would saturate the cast
                Some(f) if f.fract() == 0.0 && f >= -(2f64.powi(63)) && f < 2f64.powi(63) => {
                    format!("n:{}", f as i64)
                }
                Some(f) => format!("n:{:e}", f),
                None => format!("n:{}", n),
            }
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numbers_compare_across_representations() {
        assert_eq!(compare_values(&json!(2), &json!(2.0)), Ordering::Equal);
        assert_eq!(compare_values(&json!(1), &json!(1.5)), Ordering::Less);
        assert!(values_equal(&json!(3), &json!(3.0)));
    }

    #[test]
    fn test_type_classes_order() {
        let mut values = vec![json!(true), json!("a"), json!([1]), json!(null), json!(7), json!({"k": 1})];
        values.sort_by(compare_values);
        assert_eq!(values, vec![json!(null), json!(7), json!("a"), json!({"k": 1}), json!([1]), json!(true)]);
    }

    #[test]
    fn test_iso_timestamps_order_lexicographically() {
        let earlier = json!("2025-06-06T00:00:00.000Z");
        let later = json!("2025-06-06T23:59:59.999Z");
        assert_eq!(compare_values(&earlier, &later), Ordering::Less);
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!(false)));
        assert!(is_truthy(&json!("")));
        assert!(is_truthy(&json!(0.5)));
    }

    #[test]
    fn test_number_value_keeps_integers() {
        assert_eq!(number_value(4.0, true), json!(4));
        assert_eq!(number_value(4.0, false), json!(4.0));
        assert_eq!(number_value(2.5, true), json!(2.5));
    }

    #[test]
    fn test_group_key_normalises_numbers() {
        assert_eq!(group_key(&json!(1)), group_key(&json!(1.0)));
        assert_ne!(group_key(&json!("1")), group_key(&json!(1)));
    }

    #[test]
    fn test_group_key_does_not_saturate() {
        assert_ne!(group_key(&json!(1e20)), group_key(&json!(5e20)));
        assert_ne!(group_key(&json!(-1e20)), group_key(&json!(-5e20)));
        assert_ne!(group_key(&json!(u64::MAX)), group_key(&json!(i64::MAX)));
        assert_eq!(group_key(&json!(1e20)), group_key(&json!(100000000000000000000.0)));
        assert_eq!(group_key(&json!(4096)), group_key(&json!(4096.0)));
    }
}
