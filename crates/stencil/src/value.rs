//! Runtime values and the request-scoped data pool.
//!
//! Templates read from a [`DataPool`]: an insertion-ordered map of named
//! [`Value`]s supplied by the caller before each render. Values are plain
//! data (scalars, sequences, maps, timestamps) or host objects exposed through
//! the [`DataObject`] capability trait.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;

use crate::error::{Error, Result};

/// Default rendering of [`Value::DateTime`].
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A host object that templates can navigate into.
///
/// Selector segments are resolved against an object in this order:
///
/// 1. [`field`](Self::field) with the segment name
/// 2. [`call`](Self::call) with each configured getter prefix plus the
///    capitalized segment (`getName`, `isName`, `hasName`) and no arguments
/// 3. [`call`](Self::call) with the segment name itself, when the segment has
///    an argument list (`user.greet('hi')`)
///
/// `call` returns `None` when the object has no such method, and
/// `Some(Err(..))` when the method exists but fails.
///
/// # Example
///
/// ```rust
/// use stencil::{DataObject, Value};
///
/// #[derive(Debug)]
/// struct User { name: String, admin: bool }
///
/// impl DataObject for User {
///     fn type_name(&self) -> &str { "User" }
///
///     fn field(&self, name: &str) -> Option<Value> {
///         match name {
///             "name" => Some(Value::from(self.name.as_str())),
///             _ => None,
///         }
///     }
///
///     fn call(&self, method: &str, _args: &[Value]) -> Option<Result<Value, String>> {
///         match method {
///             "isAdmin" => Some(Ok(Value::Bool(self.admin))),
///             _ => None,
///         }
///     }
/// }
/// ```
pub trait DataObject: fmt::Debug + Send + Sync {
    /// Name used in diagnostics.
    fn type_name(&self) -> &str;

    /// Public field access.
    fn field(&self, _name: &str) -> Option<Value> {
        None
    }

    /// Method invocation, getters included.
    fn call(&self, _method: &str, _args: &[Value]) -> Option<std::result::Result<Value, String>> {
        None
    }

    /// Text used when the object itself is interpolated.
    fn display(&self) -> Option<String> {
        None
    }
}

/// A value in the data pool.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Seq(Vec<Value>),
    Map(IndexMap<String, Value>),
    DateTime(DateTime<FixedOffset>),
    Object(Arc<dyn DataObject>),
}

impl Value {
    /// Wraps a host object.
    pub fn object(obj: impl DataObject + 'static) -> Self {
        Value::Object(Arc::new(obj))
    }

    /// Short name of the variant, for diagnostics.
    pub fn kind(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Seq(_) => "sequence",
            Value::Map(_) => "map",
            Value::DateTime(_) => "datetime",
            Value::Object(obj) => obj.type_name(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Seq(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            Value::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    /// Template truthiness: null, false, zero, the empty string and empty
    /// collections are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Seq(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::DateTime(_) | Value::Object(_) => true,
        }
    }

    /// Text form used by interpolation. Sequences and maps have none; objects
    /// have one only if they implement [`DataObject::display`].
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => Some(String::new()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(n) => Some(n.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::String(s) => Some(s.clone()),
            Value::DateTime(dt) => Some(dt.format(DATETIME_FORMAT).to_string()),
            Value::Object(obj) => obj.display(),
            Value::Seq(_) | Value::Map(_) => None,
        }
    }

    /// Equality used by template conditions: numbers compare numerically,
    /// other scalars by their text form.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Seq(a), Value::Seq(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loosely_equals(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|w| v.loosely_equals(w)))
            }
            _ => match (self.to_text(), other.to_text()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Seq(a), Value::Seq(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::DateTime(a), Value::DateTime(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(n.into())
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        i64::try_from(n).map_or(Value::Float(n as f64), Value::Int)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Seq(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        Value::DateTime(dt)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Seq(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// The named values a render reads from.
///
/// Supplied by the caller before each render and never retained by the
/// engine afterwards.
///
/// ```rust
/// use stencil::{DataPool, Value};
///
/// let mut pool = DataPool::new();
/// pool.insert("title", "Inbox");
/// pool.insert("unread", 3);
/// assert_eq!(pool.get("unread"), Some(&Value::Int(3)));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataPool {
    values: IndexMap<String, Value>,
}

impl DataPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a value, keeping the original position on replace.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Builds a pool from a JSON object.
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        match json {
            serde_json::Value::Object(map) => Ok(Self {
                values: map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            }),
            other => Err(Error::InvalidData(format!(
                "a data pool must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for DataPool {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug)]
    struct Badge;

    impl DataObject for Badge {
        fn type_name(&self) -> &str {
            "Badge"
        }

        fn display(&self) -> Option<String> {
            Some("[badge]".into())
        }
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from(0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::Seq(vec![]).is_truthy());
        assert!(Value::from("0").is_truthy());
        assert!(Value::from(vec![1]).is_truthy());
        assert!(Value::object(Badge).is_truthy());
    }

    #[test]
    fn test_to_text() {
        assert_eq!(Value::Null.to_text().as_deref(), Some(""));
        assert_eq!(Value::from(2.5).to_text().as_deref(), Some("2.5"));
        assert_eq!(Value::object(Badge).to_text().as_deref(), Some("[badge]"));
        assert_eq!(Value::from(vec!["a"]).to_text(), None);

        let dt = DateTime::parse_from_rfc3339("2024-03-05T07:08:09+01:00").unwrap();
        assert_eq!(
            Value::from(dt).to_text().as_deref(),
            Some("2024-03-05 07:08:09")
        );
    }

    #[test]
    fn test_loose_equality() {
        assert!(Value::from(3).loosely_equals(&Value::from("3")));
        assert!(Value::from(3).loosely_equals(&Value::from(3.0)));
        assert!(Value::from(true).loosely_equals(&Value::from("true")));
        assert!(!Value::from("a").loosely_equals(&Value::from(vec!["a"])));
    }

    #[test]
    fn test_from_json_keeps_order_and_types() {
        let pool = DataPool::from_json(json!({"b": 1, "a": [true, null], "c": {"x": 1.5}})).unwrap();
        let keys: Vec<&str> = pool.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
        assert_eq!(pool.get("b"), Some(&Value::Int(1)));
        assert_eq!(
            pool.get("a"),
            Some(&Value::Seq(vec![Value::Bool(true), Value::Null]))
        );
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        let err = DataPool::from_json(json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn test_pool_from_iterator() {
        let pool: DataPool = vec![("a", 1), ("b", 2)].into_iter().collect();
        assert_eq!(pool.len(), 2);
        assert!(pool.contains("b"));
    }
}
