//! Business payload tree consumed by the mapping engine.
//!
//! A payload is a nested tree of records, lists and scalars. Source keys address it with
//! dotted paths (`shipment.recipient.city`); a `[]` marker inside a key turns it into a
//! repeating path (`shipment.items[].product_name`) that yields one value per list element.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};

/// Marker splitting a repeating source key into list path and item path.
pub const REPEAT_MARKER: &str = "[]";

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => Ok(()),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::Text(s) => f.write_str(s),
            Scalar::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Scalar::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.f")),
        }
    }
}

/// One node of a payload tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    List(Vec<Value>),
    Record(BTreeMap<String, Value>),
}

impl Value {
    pub fn null() -> Self {
        Value::Scalar(Scalar::Null)
    }

    pub fn empty_record() -> Self {
        Value::Record(BTreeMap::new())
    }

    /// Builds a record from `(key, value)` pairs.
    pub fn record<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn list<I: IntoIterator<Item = Value>>(items: I) -> Self {
        Value::List(items.into_iter().collect())
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Record(fields) => fields.get(key),
            _ => None,
        }
    }

    /// Inserts a field when `self` is a record; other nodes are left untouched.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        if let Value::Record(fields) = self {
            fields.insert(key.into(), value);
        }
    }

    /// Resolves a dotted path. Returns `None` as soon as a segment is absent or the
    /// current node is not a record.
    pub fn resolve(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .try_fold(self, |node, segment| node.get(segment))
    }

    /// Resolves a repeating source key to one entry per list element.
    ///
    /// A list path that is empty, missing or not a list yields no rows.
    pub fn repeat(&self, source_key: &str) -> Vec<Option<&Value>> {
        let Some((list_path, item_path)) = split_repeating(source_key) else {
            return Vec::new();
        };
        if list_path.is_empty() {
            return Vec::new();
        }
        match self.resolve(list_path) {
            Some(Value::List(rows)) => rows
                .iter()
                .map(|row| {
                    if item_path.is_empty() {
                        Some(row)
                    } else {
                        row.resolve(item_path)
                    }
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Converts a JSON document into a payload tree.
    ///
    /// Strings shaped exactly like ISO dates (`2026-03-01`) or naive datetimes
    /// (`2026-03-01T10:30:00`) become date scalars so `date_fr` can format them.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::null(),
            serde_json::Value::Bool(b) => Value::Scalar(Scalar::Bool(b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Scalar(Scalar::Int(i)),
                None => Value::Scalar(Scalar::Float(n.as_f64().unwrap_or_default())),
            },
            serde_json::Value::String(s) => Value::Scalar(parse_text(s)),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(fields) => Value::Record(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

fn parse_text(s: String) -> Scalar {
    if s.len() == 10 {
        if let Ok(date) = NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
            return Scalar::Date(date);
        }
    }
    if s.len() >= 19 && s.as_bytes().get(10) == Some(&b'T') {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%.f") {
            return Scalar::DateTime(dt);
        }
    }
    Scalar::Text(s)
}

/// Splits `list.path[].item.path` into `("list.path", "item.path")`.
/// Returns `None` when the key has no repeat marker.
pub fn split_repeating(source_key: &str) -> Option<(&str, &str)> {
    let key = source_key.trim();
    let (before, after) = key.split_once(REPEAT_MARKER)?;
    Some((before.trim_end_matches('.'), after.trim_start_matches('.')))
}

pub fn is_repeating(source_key: &str) -> bool {
    source_key.contains(REPEAT_MARKER)
}

/// A value is missing when absent, null, or blank text.
pub fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None => true,
        Some(Value::Scalar(Scalar::Null)) => true,
        Some(Value::Scalar(Scalar::Text(s))) => s.trim().is_empty(),
        Some(_) => false,
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Scalar(Scalar::Text(s.to_string()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Scalar(Scalar::Text(s))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Scalar(Scalar::Int(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Scalar(Scalar::Float(x))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Scalar(Scalar::Bool(b))
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Scalar(Scalar::Date(d))
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Value::Scalar(Scalar::DateTime(dt))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or_else(Value::null)
    }
}
