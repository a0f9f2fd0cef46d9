// ABOUTME: Column values and case-insensitive column maps for change rows
// ABOUTME: Binary values serialize as base64 text for JSON consumers

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::NaiveDateTime;
use indexmap::map::Entry;
use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// A single column value read from the change log.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ColumnValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Binary(Vec<u8>),
    DateTime(NaiveDateTime),
}

impl ColumnValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ColumnValue::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ColumnValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ColumnValue::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Short type name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ColumnValue::Null => "null",
            ColumnValue::Bool(_) => "bool",
            ColumnValue::Int(_) => "int",
            ColumnValue::Float(_) => "float",
            ColumnValue::Text(_) => "text",
            ColumnValue::Binary(_) => "binary",
            ColumnValue::DateTime(_) => "datetime",
        }
    }
}

impl From<&str> for ColumnValue {
    fn from(value: &str) -> Self {
        ColumnValue::Text(value.to_string())
    }
}

impl From<String> for ColumnValue {
    fn from(value: String) -> Self {
        ColumnValue::Text(value)
    }
}

impl From<i64> for ColumnValue {
    fn from(value: i64) -> Self {
        ColumnValue::Int(value)
    }
}

impl From<i32> for ColumnValue {
    fn from(value: i32) -> Self {
        ColumnValue::Int(value.into())
    }
}

impl From<bool> for ColumnValue {
    fn from(value: bool) -> Self {
        ColumnValue::Bool(value)
    }
}

impl From<Vec<u8>> for ColumnValue {
    fn from(value: Vec<u8>) -> Self {
        ColumnValue::Binary(value)
    }
}

impl<T: Into<ColumnValue>> From<Option<T>> for ColumnValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ColumnValue::Null)
    }
}

impl Serialize for ColumnValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ColumnValue::Null => serializer.serialize_none(),
            ColumnValue::Bool(v) => serializer.serialize_bool(*v),
            ColumnValue::Int(v) => serializer.serialize_i64(*v),
            // NaN and infinities have no JSON representation
            ColumnValue::Float(v) if !v.is_finite() => serializer.serialize_none(),
            ColumnValue::Float(v) => serializer.serialize_f64(*v),
            ColumnValue::Text(v) => serializer.serialize_str(v),
            ColumnValue::Binary(v) => serializer.serialize_str(&STANDARD.encode(v)),
            ColumnValue::DateTime(v) => {
                serializer.serialize_str(&v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
            }
        }
    }
}

/// Insertion-ordered map whose keys compare ASCII case-insensitively.
///
/// Column names coming back from SQL Server keep the casing of the catalog,
/// while callers look them up however they like. Entries are indexed by the
/// lower-cased name and remember the spelling they were inserted with.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMap<V> {
    entries: IndexMap<String, (String, V)>,
}

impl<V> Default for ColumnMap<V> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

fn fold(key: &str) -> String {
    key.to_ascii_lowercase()
}

impl<V> ColumnMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: IndexMap::with_capacity(capacity),
        }
    }

    /// Insert or replace a value. Replacing keeps the original key spelling
    /// and position.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        match self.entries.entry(fold(&key)) {
            Entry::Occupied(mut slot) => Some(std::mem::replace(&mut slot.get_mut().1, value)),
            Entry::Vacant(slot) => {
                slot.insert((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(&fold(key)).map(|(_, value)| value)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        self.entries.get_mut(&fold(key)).map(|(_, value)| value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&fold(key))
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.entries.shift_remove(&fold(key)).map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries
            .values()
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut V)> {
        self.entries
            .values_mut()
            .map(|(name, value)| (name.as_str(), value))
    }
}

impl<V> IntoIterator for ColumnMap<V> {
    type Item = (String, V);
    type IntoIter = indexmap::map::IntoValues<String, (String, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for ColumnMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut map = ColumnMap::with_capacity(iter.size_hint().0);
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl<V: Serialize> Serialize for ColumnMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in self.entries.values() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
