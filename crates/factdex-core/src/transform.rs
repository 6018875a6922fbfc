//! # Transforms
//!
//! What a write does to the value it lands on.
//!
//! A transform is chosen explicitly by the caller:
//! - `Literal(Some(v))` replaces the value with `v`
//! - `Literal(None)` deletes the key
//! - `Unary(f)` computes the new value from the old one
//! - `Ternary(f)` also sees the enclosing record and the concrete path
//!
//! Producing `None` always means "delete this key", never "set to empty".

use crate::path::Path;
use crate::{FactMap, FactdexError, Value};
use std::fmt;

/// Result of a transform function: the new value, or `None` to delete.
pub type TransformResult = Result<Option<Value>, FactdexError>;

/// `old value → new value`
pub type UnaryFn = Box<dyn Fn(Option<&Value>) -> TransformResult>;

/// `(record, path, old value) → new value`
pub type TernaryFn = Box<dyn Fn(&FactMap, &Path, Option<&Value>) -> TransformResult>;

/// Arguments handed to a transform built through [`Transform::from_arity`].
///
/// `record` and `path` are only populated for arity 3.
#[derive(Debug, Clone, Copy)]
pub struct TransformArgs<'a> {
    pub record: Option<&'a FactMap>,
    pub path: Option<&'a Path>,
    pub old: Option<&'a Value>,
}

/// A replacement value or a value-producing function.
pub enum Transform {
    Literal(Option<Value>),
    Unary(UnaryFn),
    Ternary(TernaryFn),
}

impl Transform {
    /// Replace with a fixed value.
    #[must_use]
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Literal(Some(value.into()))
    }

    /// Delete the addressed key.
    #[must_use]
    pub fn delete() -> Self {
        Self::Literal(None)
    }

    /// Compute the new value from the old value.
    pub fn unary(f: impl Fn(Option<&Value>) -> TransformResult + 'static) -> Self {
        Self::Unary(Box::new(f))
    }

    /// Compute the new value from the record, the concrete path and the old value.
    pub fn ternary(f: impl Fn(&FactMap, &Path, Option<&Value>) -> TransformResult + 'static) -> Self {
        Self::Ternary(Box::new(f))
    }

    /// Build a function transform from a declared parameter count.
    ///
    /// This is the boundary for callers that only know a function's arity at
    /// runtime (e.g. a named-transform registry). Arity 1 and 3 are accepted;
    /// anything else fails here, before any record is touched.
    pub fn from_arity(
        arity: usize,
        f: impl Fn(TransformArgs<'_>) -> TransformResult + 'static,
    ) -> Result<Self, FactdexError> {
        match arity {
            1 => Ok(Self::unary(move |old| {
                f(TransformArgs {
                    record: None,
                    path: None,
                    old,
                })
            })),
            3 => Ok(Self::ternary(move |record, path, old| {
                f(TransformArgs {
                    record: Some(record),
                    path: Some(path),
                    old,
                })
            })),
            arity => Err(FactdexError::InvalidTransformArity { arity }),
        }
    }

    /// Number of parameters the transform takes (0 for literals).
    #[must_use]
    pub fn arity(&self) -> usize {
        match self {
            Self::Literal(_) => 0,
            Self::Unary(_) => 1,
            Self::Ternary(_) => 3,
        }
    }

    /// Check whether this is the literal delete transform.
    #[must_use]
    pub fn is_delete(&self) -> bool {
        matches!(self, Self::Literal(None))
    }

    /// Compute the new value for one key.
    pub fn apply(&self, record: &FactMap, path: &Path, old: Option<&Value>) -> TransformResult {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Unary(f) => f(old),
            Self::Ternary(f) => f(record, path, old),
        }
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Unary(_) => f.write_str("Unary(..)"),
            Self::Ternary(_) => f.write_str("Ternary(..)"),
        }
    }
}

impl From<Value> for Transform {
    fn from(value: Value) -> Self {
        Self::Literal(Some(value))
    }
}

impl From<Option<Value>> for Transform {
    fn from(value: Option<Value>) -> Self {
        Self::Literal(value)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> FactMap {
        let mut map = FactMap::new();
        map.insert("env".to_string(), Value::from("prod"));
        map
    }

    #[test]
    fn literal_returns_value_unchanged() {
        let t = Transform::value("x");
        let out = t
            .apply(&record(), &Path::literal("env"), Some(&Value::from("prod")))
            .expect("apply");
        assert_eq!(out, Some(Value::from("x")));
        assert_eq!(t.arity(), 0);
    }

    #[test]
    fn delete_produces_none() {
        let t = Transform::delete();
        assert!(t.is_delete());
        assert_eq!(
            t.apply(&record(), &Path::literal("env"), None).expect("apply"),
            None
        );
    }

    #[test]
    fn unary_sees_only_old_value() {
        let t = Transform::unary(|old| {
            Ok(old.and_then(Value::as_str).map(|s| Value::from(s.to_uppercase())))
        });
        let out = t
            .apply(&record(), &Path::literal("env"), Some(&Value::from("prod")))
            .expect("apply");
        assert_eq!(out, Some(Value::from("PROD")));
    }

    #[test]
    fn ternary_sees_record_and_path() {
        let t = Transform::ternary(|record, path, old| {
            Ok(Some(Value::from(format!(
                "{}/{}/{}",
                record.len(),
                path,
                old.map(Value::to_string).unwrap_or_default()
            ))))
        });
        let out = t
            .apply(&record(), &Path::parse("a::b"), Some(&Value::from(1)))
            .expect("apply");
        assert_eq!(out, Some(Value::from("1/a::b/1")));
    }

    #[test]
    fn from_arity_dispatch() {
        let unary = Transform::from_arity(1, |args| {
            assert!(args.record.is_none());
            Ok(args.old.cloned())
        })
        .expect("arity 1");
        assert_eq!(unary.arity(), 1);

        let ternary = Transform::from_arity(3, |args| {
            Ok(args.path.map(|p| Value::from(p.to_string())))
        })
        .expect("arity 3");
        assert_eq!(
            ternary
                .apply(&record(), &Path::literal("env"), None)
                .expect("apply"),
            Some(Value::from("env"))
        );
    }

    #[test]
    fn from_arity_rejects_other_counts() {
        for arity in [0, 2, 4] {
            let result = Transform::from_arity(arity, |_| Ok(None));
            assert!(matches!(
                result,
                Err(FactdexError::InvalidTransformArity { arity: a }) if a == arity
            ));
        }
    }
}
