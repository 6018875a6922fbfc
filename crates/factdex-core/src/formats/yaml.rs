//! # YAML Documents
//!
//! Fact documents and index documents are YAML. Output is always sorted,
//! since every map is a `BTreeMap`, so the files diff cleanly.
//!
//! Fact documents produced by a configuration-management server start with a
//! typed header line (`--- !ruby/object:Puppet::Node::Facts`) and wrap the
//! facts as `{name, values}`. Both are handled here so callers see a plain map.

use crate::primitives::MAX_DOCUMENT_SIZE;
use crate::{FactMap, FactdexError, Value};

/// Key holding the facts in a `{name, values}` document.
const VALUES_KEY: &str = "values";

fn check_size(text: &str) -> Result<(), FactdexError> {
    let size = u64::try_from(text.len()).unwrap_or(u64::MAX);
    if size > MAX_DOCUMENT_SIZE {
        return Err(FactdexError::DeserializationError(format!(
            "Document size {} bytes exceeds maximum allowed {} bytes",
            size, MAX_DOCUMENT_SIZE
        )));
    }
    Ok(())
}

/// Parse a YAML document. An empty document or a bare null yields `None`.
pub fn parse_value(text: &str) -> Result<Option<Value>, FactdexError> {
    check_size(text)?;
    if is_blank(text) {
        return Ok(None);
    }
    serde_yaml::from_str::<Option<Value>>(text)
        .map_err(|e| FactdexError::DeserializationError(e.to_string()))
}

/// Check whether a document holds nothing but markers and comments.
fn is_blank(text: &str) -> bool {
    text.lines().map(str::trim).all(|line| {
        line.is_empty() || line.starts_with('#') || line == "---" || line == "..."
    })
}

/// Replace the first document marker line, after comments and blank lines,
/// with a bare `---`, dropping any type tag it carries.
#[must_use]
pub fn normalize_header(text: &str) -> String {
    let mut lines: Vec<&str> = text.lines().collect();
    for line in &mut lines {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if line.starts_with("---") {
            *line = "---";
        }
        break;
    }
    lines.join("\n")
}

/// Parse a fixture document: a plain map of facts, taken as written.
/// An empty document yields an empty map.
pub fn parse_fixture(text: &str) -> Result<FactMap, FactdexError> {
    match parse_value(text)? {
        None => Ok(FactMap::new()),
        Some(Value::Map(map)) => Ok(map),
        Some(other) => Err(not_a_map(&other)),
    }
}

fn not_a_map(value: &Value) -> FactdexError {
    FactdexError::DeserializationError(format!(
        "Expected a map of facts, found {}",
        value.type_name()
    ))
}

/// Parse a raw fact document into a fact map.
///
/// The header line is normalized, and a document whose `values` key holds a
/// map yields that map. An empty document yields an empty map.
pub fn parse_facts(text: &str) -> Result<FactMap, FactdexError> {
    match parse_value(&normalize_header(text))? {
        None => Ok(FactMap::new()),
        Some(Value::Map(mut map)) => match map.remove(VALUES_KEY) {
            Some(Value::Map(values)) => Ok(values),
            Some(other) => {
                map.insert(VALUES_KEY.to_string(), other);
                Ok(map)
            }
            None => Ok(map),
        },
        Some(other) => Err(not_a_map(&other)),
    }
}

/// Serialize a value as YAML.
pub fn to_yaml(value: &Value) -> Result<String, FactdexError> {
    serde_yaml::to_string(value).map_err(|e| FactdexError::SerializationError(e.to_string()))
}

// =============================================================================
// TESTS
// =============================================================================
