//! # Binding Keys
//!
//! A binding key is a plain string that identifies a binding inside a context. A key
//! used for resolution may carry a property path after [`PROPERTY_SEPARATOR`]:
//! `"config#db.host"` resolves `config` and then projects into `db.host`.
//! The separator is reserved and is never allowed inside the base key itself.

use crate::error::{ContextError, ContextResult};
use std::fmt;

/// Separates the base key from a nested property path.
pub const PROPERTY_SEPARATOR: char = '#';

/// A parsed binding key with an optional property path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BindingKey {
    key: String,
    property_path: Option<String>,
}

impl BindingKey {
    /// Creates a key. When `property_path` is `None`, `key` itself is parsed for a path.
    pub fn create(key: impl Into<String>, property_path: Option<&str>) -> Self {
        let key = key.into();
        match property_path {
            Some(path) => Self {
                key,
                property_path: (!path.is_empty()).then(|| path.to_string()),
            },
            None => Self::parse(&key),
        }
    }

    /// Splits `"key#path"` at the first separator.
    pub fn parse(s: &str) -> Self {
        match s.split_once(PROPERTY_SEPARATOR) {
            Some((key, path)) => Self {
                key: key.to_string(),
                property_path: (!path.is_empty()).then(|| path.to_string()),
            },
            None => Self {
                key: s.to_string(),
                property_path: None,
            },
        }
    }

    /// Rejects empty keys and keys containing the property separator.
    pub fn validate(key: &str) -> ContextResult<()> {
        if key.is_empty() {
            return Err(ContextError::invalid_key(key, "Binding key must be provided."));
        }
        if key.contains(PROPERTY_SEPARATOR) {
            return Err(ContextError::invalid_key(
                key,
                format!("Binding key {key} cannot contain {PROPERTY_SEPARATOR}"),
            ));
        }
        Ok(())
    }

    /// Generates a unique key under `namespace`.
    pub fn generate(namespace: &str) -> Self {
        let id = uuid::Uuid::new_v4();
        let key = if namespace.is_empty() {
            id.to_string()
        } else {
            format!("{namespace}.{id}")
        };
        Self {
            key,
            property_path: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn property_path(&self) -> Option<&str> {
        self.property_path.as_deref()
    }

    /// Returns a key pointing at `path` below this key's own path.
    pub fn deep_property(&self, path: &str) -> Self {
        let property_path = match &self.property_path {
            Some(existing) => format!("{existing}.{path}"),
            None => path.to_string(),
        };
        Self {
            key: self.key.clone(),
            property_path: Some(property_path),
        }
    }
}

impl fmt::Display for BindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.property_path {
            Some(path) => write!(f, "{}{}{}", self.key, PROPERTY_SEPARATOR, path),
            None => f.write_str(&self.key),
        }
    }
}

impl From<&str> for BindingKey {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for BindingKey {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<&String> for BindingKey {
    fn from(s: &String) -> Self {
        Self::parse(s)
    }
}

impl From<&BindingKey> for BindingKey {
    fn from(key: &BindingKey) -> Self {
        key.clone()
    }
}
