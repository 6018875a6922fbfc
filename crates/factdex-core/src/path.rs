//! # Paths
//!
//! Addresses inside a nested fact map.
//!
//! A path is a non-empty sequence of segments. A literal segment matches one
//! key exactly; a pattern segment matches every key its regular expression
//! finds a match in. Two constructors exist:
//!
//! - `Path::parse("a::b::c")` — the text form, literal segments only
//! - `Path::structured(&[...])` — items are strings or `{regexp: "..."}` maps
//!
//! Index attribute names use a third, dotted form (`os.family`).

use crate::primitives::{ATTRIBUTE_DELIMITER, PATH_DELIMITER, PATTERN_MARKER};
use crate::{FactdexError, Value};
use regex::Regex;
use std::fmt;

// =============================================================================
// SEGMENT
// =============================================================================

/// One step of a path.
#[derive(Debug, Clone)]
pub enum Segment {
    /// Matches exactly one key.
    Literal(String),
    /// Matches every key the expression finds a match in (unanchored).
    Pattern(Regex),
}

impl Segment {
    /// Create a literal segment.
    #[must_use]
    pub fn literal(key: impl Into<String>) -> Self {
        Self::Literal(key.into())
    }

    /// Compile a pattern segment.
    pub fn pattern(source: &str) -> Result<Self, FactdexError> {
        Regex::new(source)
            .map(Self::Pattern)
            .map_err(|e| FactdexError::InvalidPattern(format!("{}: {}", source, e)))
    }

    /// Interpret one item of the structured path form.
    pub fn from_item(item: &Value) -> Result<Self, FactdexError> {
        match item {
            Value::String(key) => Ok(Self::Literal(key.clone())),
            Value::Map(map) => match map.get(PATTERN_MARKER) {
                Some(Value::String(source)) => Self::pattern(source),
                _ => Err(FactdexError::InvalidPathSegment(item.to_string())),
            },
            other => Err(FactdexError::InvalidPathSegment(other.to_string())),
        }
    }

    /// Check whether this segment addresses `key`.
    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        match self {
            Self::Literal(literal) => literal == key,
            Self::Pattern(re) => re.is_match(key),
        }
    }

    /// The key of a literal segment.
    #[must_use]
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Self::Literal(key) => Some(key),
            Self::Pattern(_) => None,
        }
    }
}

impl PartialEq for Segment {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Literal(a), Self::Literal(b)) => a == b,
            (Self::Pattern(a), Self::Pattern(b)) => a.as_str() == b.as_str(),
            _ => false,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(key) => f.write_str(key),
            Self::Pattern(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

// =============================================================================
// PATH
// =============================================================================

/// A non-empty sequence of segments.
#[derive(Debug, Clone, PartialEq)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    /// Parse the `::`-delimited text form. Every segment is literal.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        Self {
            segments: text.split(PATH_DELIMITER).map(Segment::literal).collect(),
        }
    }

    /// Parse a dotted attribute name (`os.family`) as used by the index.
    #[must_use]
    pub fn dotted(attribute: &str) -> Self {
        Self {
            segments: attribute
                .split(ATTRIBUTE_DELIMITER)
                .map(Segment::literal)
                .collect(),
        }
    }

    /// A single-segment path addressing a top-level key.
    #[must_use]
    pub fn literal(key: impl Into<String>) -> Self {
        Self {
            segments: vec![Segment::literal(key)],
        }
    }

    /// A literal path from concrete keys. Fails on an empty key list.
    pub fn from_keys<S: AsRef<str>>(keys: &[S]) -> Result<Self, FactdexError> {
        Self::from_segments(keys.iter().map(|k| Segment::literal(k.as_ref())).collect())
    }

    /// Build a path from segments. Fails on an empty segment list.
    pub fn from_segments(segments: Vec<Segment>) -> Result<Self, FactdexError> {
        if segments.is_empty() {
            return Err(FactdexError::InvalidPathSegment("empty path".to_string()));
        }
        Ok(Self { segments })
    }

    /// Build a path from the structured form: a list of strings and
    /// `{regexp: "..."}` pattern markers.
    pub fn structured(items: &[Value]) -> Result<Self, FactdexError> {
        let segments = items
            .iter()
            .map(Segment::from_item)
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_segments(segments)
    }

    /// Interpret a configuration value as a path: a string is the text form,
    /// a list is the structured form.
    pub fn from_value(value: &Value) -> Result<Self, FactdexError> {
        match value {
            Value::String(text) => Ok(Self::parse(text)),
            Value::List(items) => Self::structured(items),
            other => Err(FactdexError::InvalidPathSegment(other.to_string())),
        }
    }

    /// The segments, first to last.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Always false; kept for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Check whether every segment is literal.
    #[must_use]
    pub fn is_literal(&self) -> bool {
        self.segments.iter().all(|s| s.as_literal().is_some())
    }
}

impl From<&str> for Path {
    fn from(text: &str) -> Self {
        Self::parse(text)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(PATH_DELIMITER)?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
