//! # Query Module
//!
//! Selection conditions and chains of select/reject/prefer steps.
//!
//! - Conditions are ordered; they apply left to right
//! - An expected value matches the bucket named by its `index_key`
//! - Text form `attribute=value` for command lines and config

use crate::{FactdexError, Value};
use std::fmt;

/// One `attribute = value` condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub attribute: String,
    pub value: Value,
}

impl Condition {
    /// Create a condition.
    #[must_use]
    pub fn new(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Parse `attribute=value`. The value is kept as a string; everything
    /// after the first `=` belongs to it.
    pub fn parse(text: &str) -> Result<Self, FactdexError> {
        match text.split_once('=') {
            Some((attribute, value)) if !attribute.trim().is_empty() => {
                Ok(Self::new(attribute.trim(), value.trim()))
            }
            _ => Err(FactdexError::ConfigError(format!(
                "Expected attribute=value, got {:?}",
                text
            ))),
        }
    }

    /// Bucket key the expected value selects.
    #[must_use]
    pub fn value_key(&self) -> String {
        self.value.index_key()
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attribute, self.value)
    }
}

/// An ordered list of conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions(Vec<Condition>);

impl Conditions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a condition (builder style).
    #[must_use]
    pub fn and(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.push(Condition::new(attribute, value));
        self
    }

    /// Parse several `attribute=value` strings.
    pub fn parse_all<S: AsRef<str>>(items: &[S]) -> Result<Self, FactdexError> {
        items
            .iter()
            .map(|item| Condition::parse(item.as_ref()))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Condition> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Condition>> for Conditions {
    fn from(conditions: Vec<Condition>) -> Self {
        Self(conditions)
    }
}

impl<A: Into<String>, V: Into<Value>> FromIterator<(A, V)> for Conditions {
    fn from_iter<I: IntoIterator<Item = (A, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(attribute, value)| Condition::new(attribute, value))
                .collect(),
        )
    }
}

impl<'a> IntoIterator for &'a Conditions {
    type Item = &'a Condition;
    type IntoIter = std::slice::Iter<'a, Condition>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Selection operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    /// Keep only nodes matching every condition.
    Select,
    /// Drop nodes matching any condition.
    Reject,
    /// Move matching nodes to the front.
    Prefer,
}

impl QueryType {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Reject => "reject",
            Self::Prefer => "prefer",
        }
    }
}

/// A chain of selection steps, applied in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub steps: Vec<(QueryType, Conditions)>,
}

impl Query {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a select step.
    #[must_use]
    pub fn select(self, conditions: Conditions) -> Self {
        self.step(QueryType::Select, conditions)
    }

    /// Add a reject step.
    #[must_use]
    pub fn reject(self, conditions: Conditions) -> Self {
        self.step(QueryType::Reject, conditions)
    }

    /// Add a prefer step.
    #[must_use]
    pub fn prefer(self, conditions: Conditions) -> Self {
        self.step(QueryType::Prefer, conditions)
    }

    fn step(mut self, query_type: QueryType, conditions: Conditions) -> Self {
        if !conditions.is_empty() {
            self.steps.push((query_type, conditions));
        }
        self
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_parse() {
        let c = Condition::parse("env=prod").expect("parse");
        assert_eq!(c, Condition::new("env", "prod"));
        assert_eq!(c.to_string(), "env=prod");

        let c = Condition::parse("motd=a=b").expect("parse");
        assert_eq!(c.value, Value::from("a=b"));

        assert!(Condition::parse("no-equals").is_err());
        assert!(Condition::parse("=prod").is_err());
    }

    #[test]
    fn value_key_stringifies() {
        assert_eq!(Condition::new("cores", 4).value_key(), "4");
        assert_eq!(Condition::new("virtual", false).value_key(), "false");
    }

    #[test]
    fn conditions_keep_order() {
        let conditions = Conditions::new().and("b", "1").and("a", "2");
        let names: Vec<&str> = conditions.iter().map(|c| c.attribute.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);

        let parsed = Conditions::parse_all(&["b=1", "a=2"]).expect("parse");
        assert_eq!(parsed, conditions);
    }

    #[test]
    fn query_skips_empty_steps() {
        let q = Query::new()
            .select(Conditions::new().and("env", "prod"))
            .reject(Conditions::new())
            .prefer(Conditions::new().and("role", "db"));
        assert_eq!(q.steps.len(), 2);
        assert_eq!(q.steps[1].0, QueryType::Prefer);
        assert_eq!(QueryType::Reject.name(), "reject");
    }
}
