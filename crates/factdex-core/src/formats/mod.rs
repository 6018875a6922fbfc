//! # Formats
//!
//! Document and binary encodings. Pure transformations; file I/O lives in
//! `storage`.

pub mod persistence;
pub mod yaml;

pub use persistence::{PersistenceHeader, record_from_bytes, record_to_bytes};
pub use yaml::{normalize_header, parse_facts, parse_fixture, parse_value, to_yaml};
