//! # Path Mutation Engine
//!
//! Get, test, delete and set values inside a nested fact map.
//!
//! Rules:
//! - Reads and deletes never create anything.
//! - `set` creates (auto-vivifies) missing intermediate maps for literal
//!   segments, and replaces a non-map intermediate value with a map, but only
//!   when the transform actually produces a value for that key.
//! - A transform producing `None` deletes the key; deleting a missing key is a
//!   no-op.
//! - Pattern segments fan out over every matching key and never create keys.
//!
//! `set` works in two passes: resolve the concrete literal key paths the
//! (possibly wildcard) path addresses, then for each one compute the new value
//! against the current record and write or delete it.

use crate::path::{Path, Segment};
use crate::transform::Transform;
use crate::{FactMap, FactdexError, Value};

/// What a `set` did to the record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationReport {
    /// Keys that received a new value.
    pub written: usize,
    /// Keys that were removed.
    pub removed: usize,
    /// Whether any intermediate map had to be created.
    pub vivified: bool,
}

impl MutationReport {
    /// Check whether nothing was written or removed.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.written == 0 && self.removed == 0
    }
}

// =============================================================================
// READS
// =============================================================================

/// Look up the value at `path`.
///
/// Every segment but the last must land on a map. A pattern segment resolves
/// to the first matching key in map order.
pub fn get<'a>(record: &'a FactMap, path: &Path) -> Option<&'a Value> {
    let (last, parents) = path.segments().split_last()?;
    let mut map = record;
    for segment in parents {
        map = lookup(map, segment)?.as_map()?;
    }
    lookup(map, last)
}

/// Check whether a value exists at `path`.
pub fn exists(record: &FactMap, path: &Path) -> bool {
    get(record, path).is_some()
}

fn lookup<'a>(map: &'a FactMap, segment: &Segment) -> Option<&'a Value> {
    match segment {
        Segment::Literal(key) => map.get(key),
        Segment::Pattern(re) => map
            .iter()
            .find(|(key, _)| re.is_match(key))
            .map(|(_, value)| value),
    }
}

// =============================================================================
// WRITES
// =============================================================================

/// Remove the value(s) at `path`. Missing keys are silently ignored.
pub fn delete(record: &mut FactMap, path: &Path) -> usize {
    let targets = resolve(record, path, false);
    targets
        .iter()
        .filter(|keys| remove_keys(record, keys))
        .count()
}

/// Apply `transform` at `path`.
///
/// A transform error aborts before the failing key is touched; keys handled
/// earlier in the same call keep their new values.
pub fn set(
    record: &mut FactMap,
    path: &Path,
    transform: &Transform,
) -> Result<MutationReport, FactdexError> {
    let targets = resolve(record, path, !transform.is_delete());
    let mut report = MutationReport::default();

    for keys in targets {
        let concrete = Path::from_keys(&keys)?;
        let new_value = transform.apply(record, &concrete, get_keys(record, &keys))?;
        match new_value {
            Some(value) => {
                report.vivified |= write_keys(record, &keys, value);
                report.written += 1;
            }
            None => {
                if remove_keys(record, &keys) {
                    report.removed += 1;
                }
            }
        }
    }

    Ok(report)
}

/// Collect the concrete key paths addressed by `path`.
///
/// With `vivify`, literal segments are followed even where the key is missing
/// or holds a non-map value, since a write will create the map.
fn resolve(record: &FactMap, path: &Path, vivify: bool) -> Vec<Vec<String>> {
    let mut out = Vec::new();
    let mut prefix = Vec::with_capacity(path.len());
    resolve_level(Some(record), path.segments(), vivify, &mut prefix, &mut out);
    out
}

fn resolve_level(
    map: Option<&FactMap>,
    segments: &[Segment],
    vivify: bool,
    prefix: &mut Vec<String>,
    out: &mut Vec<Vec<String>>,
) {
    let Some((segment, rest)) = segments.split_first() else {
        return;
    };

    let keys: Vec<String> = match segment {
        Segment::Literal(key) => {
            if vivify || map.is_some_and(|m| m.contains_key(key)) {
                vec![key.clone()]
            } else {
                Vec::new()
            }
        }
        Segment::Pattern(re) => map
            .map(|m| m.keys().filter(|k| re.is_match(k)).cloned().collect())
            .unwrap_or_default(),
    };

    for key in keys {
        let child = map.and_then(|m| m.get(&key));
        prefix.push(key);
        if rest.is_empty() {
            out.push(prefix.clone());
        } else {
            match child {
                Some(Value::Map(next)) => resolve_level(Some(next), rest, vivify, prefix, out),
                // Missing, or a scalar a literal write will overwrite with a map
                _ if vivify && segment.as_literal().is_some() => {
                    resolve_level(None, rest, vivify, prefix, out);
                }
                _ => {}
            }
        }
        prefix.pop();
    }
}

fn get_keys<'a>(record: &'a FactMap, keys: &[String]) -> Option<&'a Value> {
    let (last, parents) = keys.split_last()?;
    let mut map = record;
    for key in parents {
        map = map.get(key)?.as_map()?;
    }
    map.get(last)
}

/// Write `value` at `keys`, creating intermediate maps. Returns whether any
/// intermediate map was created or replaced.
fn write_keys(record: &mut FactMap, keys: &[String], value: Value) -> bool {
    let Some((last, parents)) = keys.split_last() else {
        return false;
    };
    let mut vivified = false;
    let mut map = record;
    for key in parents {
        let slot = map.entry(key.clone()).or_insert_with(|| {
            vivified = true;
            Value::empty_map()
        });
        if !slot.is_map() {
            *slot = Value::empty_map();
            vivified = true;
        }
        map = match slot {
            Value::Map(next) => next,
            _ => return vivified,
        };
    }
    map.insert(last.clone(), value);
    vivified
}

/// Remove the value at `keys` without creating anything. Returns whether a
/// key was removed.
fn remove_keys(record: &mut FactMap, keys: &[String]) -> bool {
    let Some((last, parents)) = keys.split_last() else {
        return false;
    };
    let mut map = record;
    for key in parents {
        map = match map.get_mut(key) {
            Some(Value::Map(next)) => next,
            _ => return false,
        };
    }
    map.remove(last).is_some()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::PATTERN_MARKER;

    fn map(entries: &[(&str, Value)]) -> FactMap {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    fn sample() -> FactMap {
        map(&[
            ("hostname", Value::from("web1")),
            (
                "os",
                Value::Map(map(&[
                    ("family", Value::from("Debian")),
                    (
                        "release",
                        Value::Map(map(&[("major", Value::from("12")), ("minor", Value::from("4"))])),
                    ),
                ])),
            ),
        ])
    }

    fn pattern(source: &str) -> Value {
        Value::Map(map(&[(PATTERN_MARKER, Value::from(source))]))
    }

    #[test]
    fn get_top_level_equals_direct_lookup() {
        let record = sample();
        assert_eq!(get(&record, &Path::parse("hostname")), record.get("hostname"));
        assert_eq!(get(&record, &Path::parse("hostname")), Some(&Value::from("web1")));
    }

    #[test]
    fn get_nested_and_missing() {
        let record = sample();
        assert_eq!(
            get(&record, &Path::parse("os::release::major")),
            Some(&Value::from("12"))
        );
        assert!(get(&record, &Path::parse("os::release::patch")).is_none());
        assert!(get(&record, &Path::parse("nope::release")).is_none());
        // Walking through a scalar fails
        assert!(get(&record, &Path::parse("hostname::x")).is_none());
    }

    #[test]
    fn get_returns_maps_at_last_segment() {
        let record = sample();
        let release = get(&record, &Path::parse("os::release")).expect("release");
        assert!(release.is_map());
    }

    #[test]
    fn exists_mirrors_get() {
        let record = sample();
        assert!(exists(&record, &Path::parse("os::family")));
        assert!(!exists(&record, &Path::parse("os::kernel")));
    }

    #[test]
    fn delete_then_get_is_none() {
        let mut record = sample();
        let path = Path::parse("os::release::major");
        assert_eq!(delete(&mut record, &path), 1);
        assert!(get(&record, &path).is_none());
        assert!(exists(&record, &Path::parse("os::release::minor")));
    }

    #[test]
    fn delete_missing_path_changes_nothing() {
        let mut record = sample();
        let before = record.clone();

        assert_eq!(delete(&mut record, &Path::parse("os::kernel::version")), 0);
        assert_eq!(delete(&mut record, &Path::parse("hostname::inner")), 0);
        assert_eq!(delete(&mut record, &Path::parse("absent")), 0);
        assert_eq!(record, before);
    }

    #[test]
    fn set_top_level() {
        let mut record = sample();
        let report = set(&mut record, &Path::parse("hostname"), &Transform::value("web2"))
            .expect("set");
        assert_eq!(record.get("hostname"), Some(&Value::from("web2")));
        assert_eq!(report.written, 1);
        assert!(!report.vivified);
    }

    #[test]
    fn set_auto_vivifies_intermediate_maps() {
        let mut record = FactMap::new();
        let path = Path::parse("a::b::c");
        let report = set(&mut record, &path, &Transform::value(7)).expect("set");

        assert!(report.vivified);
        assert_eq!(get(&record, &path), Some(&Value::from(7)));
        assert!(get(&record, &Path::parse("a")).is_some_and(Value::is_map));
        assert!(get(&record, &Path::parse("a::b")).is_some_and(Value::is_map));
    }

    #[test]
    fn set_replaces_scalar_intermediate() {
        let mut record = sample();
        set(&mut record, &Path::parse("hostname::short"), &Transform::value("web1"))
            .expect("set");
        assert_eq!(
            get(&record, &Path::parse("hostname::short")),
            Some(&Value::from("web1"))
        );
    }

    #[test]
    fn set_none_is_delete() {
        let mut via_set = sample();
        let mut via_delete = sample();
        let path = Path::parse("os::release::minor");

        set(&mut via_set, &path, &Transform::delete()).expect("set");
        delete(&mut via_delete, &path);

        assert_eq!(via_set, via_delete);
    }

    #[test]
    fn set_none_on_missing_key_does_not_vivify() {
        let mut record = sample();
        let before = record.clone();
        let report =
            set(&mut record, &Path::parse("x::y::z"), &Transform::delete()).expect("set");

        assert!(report.is_noop());
        assert_eq!(record, before);
    }

    #[test]
    fn function_returning_none_does_not_vivify() {
        let mut record = FactMap::new();
        let t = Transform::unary(|_| Ok(None));
        let report = set(&mut record, &Path::parse("a::b"), &t).expect("set");

        assert!(report.is_noop());
        assert!(record.is_empty());
    }

    #[test]
    fn unary_transform_receives_old_value() {
        let mut record = sample();
        let t = Transform::unary(|old| {
            Ok(old.and_then(Value::as_str).map(|s| Value::from(format!("{}-x", s))))
        });
        set(&mut record, &Path::parse("os::family"), &t).expect("set");
        assert_eq!(
            get(&record, &Path::parse("os::family")),
            Some(&Value::from("Debian-x"))
        );
    }

    #[test]
    fn ternary_transform_receives_record_and_concrete_path() {
        let mut record = sample();
        let t = Transform::ternary(|record, path, old| {
            let host = record.get("hostname").map(Value::to_string).unwrap_or_default();
            Ok(Some(Value::from(format!(
                "{}:{}:{}",
                host,
                path,
                old.map(Value::to_string).unwrap_or_default()
            ))))
        });
        set(&mut record, &Path::parse("os::family"), &t).expect("set");
        assert_eq!(
            get(&record, &Path::parse("os::family")),
            Some(&Value::from("web1:os::family:Debian"))
        );
    }

    #[test]
    fn transform_error_aborts_without_mutation() {
        let mut record = sample();
        let before = record.clone();
        let t = Transform::unary(|_| Err(FactdexError::InvalidTransformArity { arity: 2 }));

        assert!(set(&mut record, &Path::parse("os::family"), &t).is_err());
        assert_eq!(record, before);
    }

    #[test]
    fn pattern_final_segment_fans_out() {
        let mut record = map(&[
            ("ssh_rsa_key", Value::from("AAAA")),
            ("ssh_ed25519_key", Value::from("BBBB")),
            ("sshfp_rsa", Value::from("SSHFP 1 1 abc")),
        ]);
        let path = Path::structured(&[pattern("^ssh_.*_key$")]).expect("path");
        let report = set(&mut record, &path, &Transform::value("redacted")).expect("set");

        assert_eq!(report.written, 2);
        assert_eq!(record.get("ssh_rsa_key"), Some(&Value::from("redacted")));
        assert_eq!(record.get("ssh_ed25519_key"), Some(&Value::from("redacted")));
        assert_eq!(record.get("sshfp_rsa"), Some(&Value::from("SSHFP 1 1 abc")));
    }

    #[test]
    fn pattern_intermediate_segment_recurses_per_branch() {
        let mut record = map(&[(
            "interfaces",
            Value::Map(map(&[
                ("eth0", Value::Map(map(&[("ip", Value::from("10.0.0.1"))]))),
                ("eth1", Value::Map(map(&[("ip", Value::from("10.0.0.2"))]))),
                ("lo", Value::Map(map(&[("ip", Value::from("127.0.0.1"))]))),
                ("eth2", Value::from("down")),
            ])),
        )]);
        let path =
            Path::structured(&[Value::from("interfaces"), pattern("^eth"), Value::from("ip")])
                .expect("path");

        let report = set(&mut record, &path, &Transform::delete()).expect("set");

        assert_eq!(report.removed, 2);
        assert!(!exists(&record, &Path::parse("interfaces::eth0::ip")));
        assert!(!exists(&record, &Path::parse("interfaces::eth1::ip")));
        assert!(exists(&record, &Path::parse("interfaces::lo::ip")));
        assert_eq!(
            get(&record, &Path::parse("interfaces::eth2")),
            Some(&Value::from("down"))
        );
    }

    #[test]
    fn pattern_matching_nothing_is_noop() {
        let mut record = sample();
        let before = record.clone();
        let path = Path::structured(&[pattern("^zzz"), Value::from("x")]).expect("path");

        let report = set(&mut record, &path, &Transform::value(1)).expect("set");
        assert!(report.is_noop());
        assert_eq!(record, before);
    }

    #[test]
    fn literal_after_pattern_vivifies_inside_matches() {
        let mut record = map(&[(
            "mounts",
            Value::Map(map(&[
                ("/", Value::empty_map()),
                ("/var", Value::empty_map()),
            ])),
        )]);
        let path = Path::structured(&[
            Value::from("mounts"),
            pattern("^/"),
            Value::from("opts"),
            Value::from("ro"),
        ])
        .expect("path");

        set(&mut record, &path, &Transform::value(true)).expect("set");
        assert_eq!(
            get(&record, &Path::parse("mounts::/var::opts::ro")),
            Some(&Value::from(true))
        );
        assert_eq!(
            get(&record, &Path::parse("mounts::/::opts::ro")),
            Some(&Value::from(true))
        );
    }

    #[test]
    fn get_with_pattern_takes_first_match() {
        let record = sample();
        let path = Path::structured(&[pattern("^o"), Value::from("family")]).expect("path");
        assert_eq!(get(&record, &path), Some(&Value::from("Debian")));
    }
}
