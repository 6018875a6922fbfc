//! # Primitives
//!
//! Hardcoded constants shared across the factdex core.
//!
//! These are compiled into the binary and are immutable at runtime. Changing
//! any of them changes the on-disk or textual formats other tools rely on.

/// Delimiter between literal segments in the text form of a path.
///
/// `os::release::major` addresses `os` → `release` → `major`. There is no
/// escape mechanism: a key containing `::` cannot be addressed in text form.
pub const PATH_DELIMITER: &str = "::";

/// Delimiter between segments of an indexed attribute name.
///
/// Index configuration names structured facts as `os.family`.
pub const ATTRIBUTE_DELIMITER: char = '.';

/// Key marking a pattern item in the structured form of a path.
pub const PATTERN_MARKER: &str = "regexp";

/// Reserved index key holding the full sorted list of indexed nodes.
pub const NODES_KEY: &str = "_nodes";

/// Placeholder replaced by the node name in record source path templates.
pub const NODE_PLACEHOLDER: &str = "%%NODE%%";

/// File extension of fixture documents.
pub const FIXTURE_EXTENSION: &str = "yaml";

/// Magic bytes for the binary record format header.
pub const MAGIC_BYTES: &[u8; 4] = b"FDXR";

/// Current binary record format version.
///
/// Increment this when making breaking changes to the serialization format.
pub const FORMAT_VERSION: u8 = 1;

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum size of a single fixture or index document (64 MB).
///
/// Documents larger than this are rejected before parsing.
pub const MAX_DOCUMENT_SIZE: u64 = 64 * 1024 * 1024;

/// Maximum length of a node name.
pub const MAX_NODE_NAME_LENGTH: usize = 253;
