//! # Binding Tags
//!
//! Tags are metadata attached to a binding. A tag is either a bare name (`"controller"`)
//! or a name/value pair (`("phase", "auth")`). A bare name is stored with its own name as
//! value, so every tag lives in one insertion-ordered [`TagMap`].
//!
//! Values are strings, numbers, booleans or [`Symbol`]s. Symbols compare by identity and
//! are used for phase markers that must never collide with user strings.

use serde::{Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A unique marker value with a description.
#[derive(Clone)]
pub struct Symbol(Arc<str>);

impl Symbol {
    pub fn new(description: &str) -> Self {
        Symbol(Arc::from(description))
    }

    pub fn description(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as *const u8 as usize).hash(state);
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.0)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// The value of a tag.
#[derive(Clone, Debug, PartialEq)]
pub enum TagValue {
    Text(String),
    Number(i64),
    Bool(bool),
    Symbol(Symbol),
}

impl TagValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self, TagValue::Symbol(_))
    }

    pub fn is_empty_text(&self) -> bool {
        matches!(self, TagValue::Text(s) if s.is_empty())
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Text(s) => f.write_str(s),
            TagValue::Number(n) => write!(f, "{n}"),
            TagValue::Bool(b) => write!(f, "{b}"),
            TagValue::Symbol(s) => write!(f, "{s}"),
        }
    }
}

impl Serialize for TagValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TagValue::Text(s) => serializer.serialize_str(s),
            TagValue::Number(n) => serializer.serialize_i64(*n),
            TagValue::Bool(b) => serializer.serialize_bool(*b),
            TagValue::Symbol(s) => serializer.collect_str(s),
        }
    }
}

impl From<&str> for TagValue {
    fn from(s: &str) -> Self {
        TagValue::Text(s.to_string())
    }
}

impl From<String> for TagValue {
    fn from(s: String) -> Self {
        TagValue::Text(s)
    }
}

impl From<i64> for TagValue {
    fn from(n: i64) -> Self {
        TagValue::Number(n)
    }
}

impl From<i32> for TagValue {
    fn from(n: i32) -> Self {
        TagValue::Number(n.into())
    }
}

impl From<bool> for TagValue {
    fn from(b: bool) -> Self {
        TagValue::Bool(b)
    }
}

impl From<Symbol> for TagValue {
    fn from(s: Symbol) -> Self {
        TagValue::Symbol(s)
    }
}

impl From<&Symbol> for TagValue {
    fn from(s: &Symbol) -> Self {
        TagValue::Symbol(s.clone())
    }
}

/// A tag as passed to `Binding::tag`.
#[derive(Clone, Debug, PartialEq)]
pub enum BindingTag {
    Name(String),
    Pairs(Vec<(String, TagValue)>),
}

impl BindingTag {
    pub fn pair(name: impl Into<String>, value: impl Into<TagValue>) -> Self {
        BindingTag::Pairs(vec![(name.into(), value.into())])
    }
}

impl From<&str> for BindingTag {
    fn from(s: &str) -> Self {
        BindingTag::Name(s.to_string())
    }
}

impl From<String> for BindingTag {
    fn from(s: String) -> Self {
        BindingTag::Name(s)
    }
}

impl<V: Into<TagValue>> From<(&str, V)> for BindingTag {
    fn from((name, value): (&str, V)) -> Self {
        BindingTag::pair(name, value)
    }
}

impl<V: Into<TagValue>> From<(String, V)> for BindingTag {
    fn from((name, value): (String, V)) -> Self {
        BindingTag::pair(name, value)
    }
}

/// Insertion-ordered tag name to value map.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TagMap {
    entries: Vec<(String, TagValue)>,
}

impl TagMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a tag. An existing name keeps its position and takes the new value.
    pub fn add(&mut self, tag: BindingTag) {
        match tag {
            BindingTag::Name(name) => {
                let value = TagValue::Text(name.clone());
                self.insert(name, value);
            }
            BindingTag::Pairs(pairs) => {
                for (name, value) in pairs {
                    self.insert(name, value);
                }
            }
        }
    }

    pub fn insert(&mut self, name: String, value: TagValue) {
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&TagValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TagValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .entries
            .iter()
            .map(|(n, v)| (n.clone(), serde_json::to_value(v).unwrap_or(serde_json::Value::Null)))
            .collect();
        serde_json::Value::Object(map)
    }
}
