//! Shape-unknown document tree produced by the feed parser.
//!
//! Feed markup encodes repeated and optional elements ambiguously: the same
//! field can arrive as a bare value, a list, or a nested record depending on
//! how many times the element occurred and whether it carried attributes.
//! Every raw field access therefore goes through the closed [`RawValue`]
//! shape set and is matched exhaustively by the normalizers.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Key under which character data is stored when an element also carries
/// attributes or child elements.
pub const TEXT_KEY: &str = "#text";

/// Leaf value of the document tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Primitive {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Primitive {
    /// Textual form of the value; `Null` renders as an empty string.
    pub fn to_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(value) => value.to_string(),
            Self::Number(value) => format_number(*value),
            Self::Text(value) => value.clone(),
        }
    }

    /// Whether the value would be dropped by a falsy check.
    pub fn is_falsy(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Bool(value) => !value,
            Self::Number(value) => *value == 0.0 || value.is_nan(),
            Self::Text(value) => value.is_empty(),
        }
    }
}

fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Ordered key/value node. Keys keep document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMap(Vec<(String, RawValue)>);

impl RawMap {
    /// Creates an empty node.
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&RawValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// First present key out of `keys`, in the given priority order.
    pub fn get_any(&self, keys: &[&str]) -> Option<&RawValue> {
        keys.iter().find_map(|key| self.get(key))
    }

    /// Whether `key` is present, null values included.
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Inserts or replaces `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: RawValue) {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.0.push((key, value)),
        }
    }

    /// Adds a child element; a repeated key collapses into a list in
    /// document order.
    pub fn push_child(&mut self, key: impl Into<String>, value: RawValue) {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, RawValue::List(items))) => items.push(value),
            Some((_, slot)) => {
                let first = std::mem::replace(slot, RawValue::Primitive(Primitive::Null));
                *slot = RawValue::List(vec![first, value]);
            }
            None => self.0.push((key, value)),
        }
    }

    /// Entries in document order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Keys in document order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    /// Values in document order.
    pub fn values(&self) -> impl Iterator<Item = &RawValue> {
        self.0.iter().map(|(_, v)| v)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the node has no keys.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, RawValue)> for RawMap {
    fn from_iter<T: IntoIterator<Item = (String, RawValue)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl Serialize for RawMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RawMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RawMapVisitor;

        impl<'de> Visitor<'de> for RawMapVisitor {
            type Value = RawMap;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of raw values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<RawMap, A::Error> {
                let mut map = RawMap::new();
                while let Some((key, value)) = access.next_entry::<String, RawValue>()? {
                    map.insert(key, value);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(RawMapVisitor)
    }
}

/// A node of the parsed document: one of three shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Primitive(Primitive),
    List(Vec<RawValue>),
    Keyed(RawMap),
}

impl Default for RawValue {
    fn default() -> Self {
        Self::Primitive(Primitive::Null)
    }
}

impl RawValue {
    /// Creates a null leaf.
    pub fn null() -> Self {
        Self::Primitive(Primitive::Null)
    }

    /// Creates a text leaf.
    pub fn text(value: impl Into<String>) -> Self {
        Self::Primitive(Primitive::Text(value.into()))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Primitive(Primitive::Null))
    }

    /// Borrow the node as a keyed map.
    pub fn as_keyed(&self) -> Option<&RawMap> {
        match self {
            Self::Keyed(map) => Some(map),
            _ => None,
        }
    }

    /// Borrow the node as a list.
    pub fn as_list(&self) -> Option<&[RawValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Member lookup on keyed nodes; `None` for every other shape.
    pub fn get(&self, key: &str) -> Option<&RawValue> {
        self.as_keyed().and_then(|map| map.get(key))
    }

    /// Walks a chain of keys.
    pub fn path(&self, keys: &[&str]) -> Option<&RawValue> {
        keys.iter().try_fold(self, |node, key| node.get(key))
    }

    /// Views the node as a collection: a list yields its elements, null
    /// yields nothing, any other node is a collection of one.
    pub fn items(&self) -> Vec<&RawValue> {
        match self {
            Self::List(items) => items.iter().collect(),
            Self::Primitive(Primitive::Null) => Vec::new(),
            other => vec![other],
        }
    }

    /// Compact JSON rendering used as the last-resort textual form.
    pub fn to_compact_string(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

impl From<serde_json::Value> for RawValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Primitive(Primitive::Null),
            Value::Bool(flag) => Self::Primitive(Primitive::Bool(flag)),
            Value::Number(number) => number
                .as_f64()
                .map(|n| Self::Primitive(Primitive::Number(n)))
                .unwrap_or_else(|| Self::text(number.to_string())),
            Value::String(text) => Self::text(text),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Object(members) => Self::Keyed(
                members
                    .into_iter()
                    .map(|(key, value)| (key, Self::from(value)))
                    .collect(),
            ),
        }
    }
}
