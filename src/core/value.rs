use crate::core::{EventLogError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single attribute value as the key-value store sees it.
///
/// The store only distinguishes strings and numbers; sort keys are always
/// strings so that range conditions compare lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AttributeValue {
    S(String),
    N(i64),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::S(s) => Some(s),
            Self::N(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::N(n) => Some(*n),
            Self::S(_) => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::S(_) => "S",
            Self::N(_) => "N",
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S(s) => write!(f, "{}", s),
            Self::N(n) => write!(f, "{}", n),
        }
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::S(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::S(value.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::N(value)
    }
}

/// A stored item: attribute name to value.
pub type Item = BTreeMap<String, AttributeValue>;

/// The key attributes identifying one item.
pub type Key = Item;

/// Builds an item from `(name, value)` pairs.
pub fn item<I, K, V>(attributes: I) -> Item
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<AttributeValue>,
{
    attributes
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

pub(crate) fn get_str<'a>(item: &'a Item, name: &str) -> Result<&'a str> {
    match item.get(name) {
        Some(AttributeValue::S(s)) => Ok(s),
        Some(other) => Err(EventLogError::Serialization(format!(
            "attribute '{}' has type {}, expected S",
            name,
            other.type_name()
        ))),
        None => Err(EventLogError::Serialization(format!(
            "attribute '{}' is missing",
            name
        ))),
    }
}

pub(crate) fn get_i64(item: &Item, name: &str) -> Result<i64> {
    match item.get(name) {
        Some(AttributeValue::N(n)) => Ok(*n),
        Some(other) => Err(EventLogError::Serialization(format!(
            "attribute '{}' has type {}, expected N",
            name,
            other.type_name()
        ))),
        None => Err(EventLogError::Serialization(format!(
            "attribute '{}' is missing",
            name
        ))),
    }
}
