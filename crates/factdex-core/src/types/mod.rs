//! # Core Type Definitions
//!
//! This module contains the core types shared by every factdex engine:
//! - Fact values (`Value`, `FactMap`)
//! - Error types (`FactdexError`)
//!
//! ## Determinism Guarantees
//!
//! - Maps are `BTreeMap`s, so iteration order never depends on hashing
//! - Null never appears inside a `Value`; a null in a parsed document means
//!   "absent" and is dropped while deserializing

use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// =============================================================================
// FACT VALUES
// =============================================================================

/// One level of a fact set: fact (or sub-key) name to value.
pub type FactMap = BTreeMap<String, Value>;

/// The value of a fact, or of any key nested inside a structured fact.
///
/// This is a closed sum type: accessors pattern-match on it instead of
/// probing types at runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(FactMap),
}

impl Value {
    /// Create an empty map value.
    #[must_use]
    pub fn empty_map() -> Self {
        Self::Map(FactMap::new())
    }

    /// Borrow the value as a map, if it is one.
    #[must_use]
    pub fn as_map(&self) -> Option<&FactMap> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Mutably borrow the value as a map, if it is one.
    pub fn as_map_mut(&mut self) -> Option<&mut FactMap> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Borrow the value as a string slice, if it is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Check whether this value is a map (a structured fact).
    #[must_use]
    pub fn is_map(&self) -> bool {
        matches!(self, Self::Map(_))
    }

    /// Short type name used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    /// The stringified form used as an index bucket key.
    ///
    /// Conditions are matched against buckets through this same function, so
    /// `Integer(2)` and `String("2")` select the same bucket.
    #[must_use]
    pub fn index_key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Integer(n) => write!(f, "{}", n),
            // Debug keeps the fractional part: 1.0 renders as "1.0", not "1"
            Self::Float(x) => write!(f, "{:?}", x),
            Self::String(s) => f.write_str(s),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Self::Map(map) => {
                f.write_str("{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<FactMap> for Value {
    fn from(map: FactMap) -> Self {
        Self::Map(map)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

// =============================================================================
// SERDE (self-describing formats: YAML, JSON, TOML)
// =============================================================================

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Integer(n) => serializer.serialize_i64(*n),
            Self::Float(x) => serializer.serialize_f64(*x),
            Self::String(s) => serializer.serialize_str(s),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a scalar, a list, or a map")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Integer(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
        // Integers beyond i64 are kept verbatim rather than rounded
        Ok(i64::try_from(v)
            .map(Value::Integer)
            .unwrap_or_else(|_| Value::String(v.to_string())))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Value, E> {
        Ok(Value::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Value, E> {
        Ok(Value::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Value, E> {
        Ok(Value::String(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element::<Option<Value>>()? {
            if let Some(item) = item {
                items.push(item);
            }
        }
        Ok(Value::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Value, A::Error> {
        let mut map = FactMap::new();
        while let Some(key) = access.next_key::<Value>()? {
            let value = access.next_value::<Option<Value>>()?;
            if let Some(value) = value {
                map.insert(key.index_key(), value);
            }
        }
        Ok(Value::Map(map))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in factdex.
///
/// - No silent failures
/// - Use `Result<T, FactdexError>` for fallible operations
/// - The core never panics; every failure surfaces to the immediate caller
#[derive(Debug, Error)]
pub enum FactdexError {
    /// A selection narrowed the eligible set to nothing, or a select condition
    /// named a value with no index bucket.
    #[error("No nodes match {attribute} = {value}")]
    NoMatch { attribute: String, value: String },

    /// An unindexed attribute was referenced while strict indexing is enabled.
    #[error("Fact {attribute} is not indexed and strict indexing is enabled")]
    StrictIndexViolation { attribute: String },

    /// The record source has no record for the node.
    #[error("Record not found for node {0}")]
    RecordNotFound(String),

    /// The index source has nothing at the location.
    #[error("Index source not found: {0}")]
    IndexSourceNotFound(String),

    /// A transform function accepts neither 1 nor 3 parameters.
    #[error("Transform expected 1 or 3 parameters, got {arity}")]
    InvalidTransformArity { arity: usize },

    /// A structured path item is neither a string nor a pattern marker.
    #[error("Unable to interpret path segment: {0}")]
    InvalidPathSegment(String),

    /// A pattern segment does not compile as a regular expression.
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    /// A structured write targeted a fact whose value is a scalar.
    #[error("Cannot set structured value inside non-map fact {0}")]
    NotStructured(String),

    /// select/reject/prefer was called after the facts were manipulated.
    #[error("Cannot call {0}() after facts have been manipulated")]
    OperationNotPermitted(String),

    /// No plugin is registered under the name.
    #[error("Unknown plugin: {0}")]
    UnknownPlugin(String),

    /// A plugin with this name is already registered.
    #[error("A plugin named {0} is already registered")]
    PluginAlreadyRegistered(String),

    /// A plugin received missing or malformed arguments.
    #[error("Invalid arguments for plugin {plugin}: {reason}")]
    InvalidPluginArgs { plugin: String, reason: String },

    /// A node name cannot be used to address a record.
    #[error("Invalid node name: {0:?}")]
    InvalidNodeName(String),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),

    /// Configuration is missing or malformed.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

// =============================================================================
// TESTS
// =============================================================================
