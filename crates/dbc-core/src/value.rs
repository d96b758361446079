//! Runtime values seen by contract expressions
//!
//! Arguments, ambient values and return values are converted into [`Value`]
//! through the [`ToValue`] trait before any expression sees them. Objects use
//! `BTreeMap`, so every rendering and comparison is deterministic.

use std::collections::{BTreeMap, HashMap};

/// A dynamically typed value in an expression environment
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Null / None
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value (i64)
    Integer(i64),
    /// Float value (f64)
    Float(f64),
    /// String value
    String(String),
    /// Array of values (lists and tuples)
    Array(Vec<Value>),
    /// Ordered map (BTreeMap for deterministic iteration)
    Object(BTreeMap<String, Value>),
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "None"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{:.1}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(arr) => {
                write!(f, "[")?;
                for (i, v) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Object(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl Value {
    /// Check if value is "truthy" for condition evaluation
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
        }
    }

    /// Get the type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Boolean(_) => "Boolean",
            Value::Integer(_) => "Integer",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Array(_) => "Array",
            Value::Object(_) => "Object",
        }
    }

    /// Numeric view of integers and floats
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Equality as expressions see it: integers and floats compare numerically.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
                (*a as f64) == *b
            }
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (Value::Object(a), Value::Object(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.loose_eq(vb))
            }
            _ => self == other,
        }
    }

    /// Identity used to compare invariant snapshots: exact, with NaN equal to itself.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(y))
            }
            (Value::Object(a), Value::Object(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.same_as(vb))
            }
            _ => self == other,
        }
    }

    /// Convert from serde_json::Value (deterministic - uses BTreeMap)
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    Value::Null
                }
            }
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(arr) => Value::Array(arr.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to serde_json::Value
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::json!(*i),
            Value::Float(f) => serde_json::json!(*f),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(arr) => serde_json::Value::Array(arr.iter().map(|v| v.to_json()).collect()),
            Value::Object(map) => {
                let obj: serde_json::Map<String, serde_json::Value> =
                    map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();
                serde_json::Value::Object(obj)
            }
        }
    }

    /// Convert any serializable Rust value. Fails only if serde does.
    pub fn from_serialize<T: serde::Serialize + ?Sized>(value: &T) -> serde_json::Result<Self> {
        serde_json::to_value(value).map(|json| Value::from_json(&json))
    }
}

// ── Conversion into values ────────────────────────────────

/// Conversion of Rust values into expression values.
///
/// Implemented for primitives, strings, collections and [`Value`] itself.
/// Structs usually build a [`Value::Object`] or go through
/// [`Value::from_serialize`].
pub trait ToValue {
    fn to_value(&self) -> Value;
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl ToValue for serde_json::Value {
    fn to_value(&self) -> Value {
        Value::from_json(self)
    }
}

impl<T: ToValue + ?Sized> ToValue for &T {
    fn to_value(&self) -> Value {
        (**self).to_value()
    }
}

impl<T: ToValue + ?Sized> ToValue for &mut T {
    fn to_value(&self) -> Value {
        (**self).to_value()
    }
}

impl<T: ToValue + ?Sized> ToValue for Box<T> {
    fn to_value(&self) -> Value {
        (**self).to_value()
    }
}

impl ToValue for () {
    fn to_value(&self) -> Value {
        Value::Null
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Boolean(*self)
    }
}

macro_rules! int_to_value {
    ($($t:ty),*) => {
        $(impl ToValue for $t {
            fn to_value(&self) -> Value {
                Value::Integer(i64::from(*self))
            }
        })*
    };
}

int_to_value!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! wide_int_to_value {
    ($($t:ty),*) => {
        $(impl ToValue for $t {
            fn to_value(&self) -> Value {
                match i64::try_from(*self) {
                    Ok(i) => Value::Integer(i),
                    Err(_) => Value::Float(*self as f64),
                }
            }
        })*
    };
}

wide_int_to_value!(u64, usize, isize, i128, u128);

impl ToValue for f32 {
    fn to_value(&self) -> Value {
        Value::Float(f64::from(*self))
    }
}

impl ToValue for f64 {
    fn to_value(&self) -> Value {
        Value::Float(*self)
    }
}

impl ToValue for char {
    fn to_value(&self) -> Value {
        Value::String(self.to_string())
    }
}

impl ToValue for str {
    fn to_value(&self) -> Value {
        Value::String(self.to_string())
    }
}

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::String(self.clone())
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }
}

impl<T: ToValue> ToValue for [T] {
    fn to_value(&self) -> Value {
        Value::Array(self.iter().map(ToValue::to_value).collect())
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Value {
        self.as_slice().to_value()
    }
}

impl<T: ToValue> ToValue for BTreeMap<String, T> {
    fn to_value(&self) -> Value {
        Value::Object(self.iter().map(|(k, v)| (k.clone(), v.to_value())).collect())
    }
}

impl<T: ToValue, S> ToValue for HashMap<String, T, S> {
    fn to_value(&self) -> Value {
        Value::Object(self.iter().map(|(k, v)| (k.clone(), v.to_value())).collect())
    }
}

macro_rules! value_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                v.to_value()
            }
        })*
    };
}

value_from!(bool, i32, i64, u32, usize, f64, String, &str);

impl<T: ToValue> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        v.to_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Conversion ────────────────────────────────────────

    #[test]
    #[allow(clippy::approx_constant)]
    fn test_primitives_to_value() {
        assert_eq!(3i32.to_value(), Value::Integer(3));
        assert_eq!(3.14f64.to_value(), Value::Float(3.14));
        assert_eq!(true.to_value(), Value::Boolean(true));
        assert_eq!("hi".to_value(), Value::String("hi".into()));
        assert_eq!(().to_value(), Value::Null);
        assert_eq!(None::<i64>.to_value(), Value::Null);
    }

    #[test]
    fn test_wide_unsigned_falls_back_to_float() {
        assert_eq!(7u64.to_value(), Value::Integer(7));
        assert_eq!(u64::MAX.to_value(), Value::Float(u64::MAX as f64));
    }

    #[test]
    fn test_collections_to_value() {
        assert_eq!(
            vec![1, 2].to_value(),
            Value::Array(vec![Value::Integer(1), Value::Integer(2)])
        );
        let mut map = HashMap::new();
        map.insert("b".to_string(), 2);
        map.insert("a".to_string(), 1);
        let keys: Vec<String> = match map.to_value() {
            Value::Object(o) => o.keys().cloned().collect(),
            other => panic!("expected object, got {other:?}"),
        };
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn test_from_serialize_struct() {
        #[derive(serde::Serialize)]
        struct Point {
            x: i64,
            y: f64,
        }
        let value = Value::from_serialize(&Point { x: 1, y: 2.5 }).unwrap();
        let mut expected = BTreeMap::new();
        expected.insert("x".into(), Value::Integer(1));
        expected.insert("y".into(), Value::Float(2.5));
        assert_eq!(value, Value::Object(expected));
    }

    // ── Equality ──────────────────────────────────────────

    #[test]
    fn test_loose_eq_crosses_numeric_types() {
        assert!(Value::Integer(3).loose_eq(&Value::Float(3.0)));
        assert!(!Value::Integer(3).loose_eq(&Value::String("3".into())));
        assert!(Value::Array(vec![Value::Integer(1)]).loose_eq(&Value::Array(vec![Value::Float(1.0)])));
    }

    #[test]
    fn test_same_as_is_exact_but_nan_stable() {
        assert!(!Value::Integer(3).same_as(&Value::Float(3.0)));
        assert!(Value::Float(f64::NAN).same_as(&Value::Float(f64::NAN)));
    }

    // ── Display ───────────────────────────────────────────

    #[test]
    fn test_display_is_deterministic() {
        let value = Value::from_json(&serde_json::json!({"b": [1, 2.0], "a": "x", "c": null}));
        assert_eq!(value.to_string(), r#"{"a": "x", "b": [1, 2.0], "c": None}"#);
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Integer(0).is_truthy());
        assert!(Value::String("x".into()).is_truthy());
        assert!(!Value::Array(vec![]).is_truthy());
    }

    #[test]
    fn test_json_roundtrip() {
        let json = serde_json::json!({"name": "test", "count": 42, "tags": ["a"]});
        assert_eq!(Value::from_json(&json).to_json(), json);
    }
}
