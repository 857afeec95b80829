//! Security limits and format constants.
//!
//! Decoders treat every length, count and depth read from the wire as
//! untrusted and bound it by the constants below before allocating.

/// Magic bytes for an uncompressed frame.
pub const MAGIC_UNCOMPRESSED: &[u8; 4] = b"SLIM";

/// Magic bytes for a zstd-compressed frame.
pub const MAGIC_COMPRESSED: &[u8; 5] = b"SLIMZ";

/// Current frame format version.
pub const FORMAT_VERSION: u8 = 1;

/// Oldest frame format version this crate still decodes.
pub const MIN_FORMAT_VERSION: u8 = 1;

/// Maximum bytes in an unsigned LEB128 varint.
pub const MAX_VARINT_BYTES: usize = 10;

/// Maximum length of a text value in bytes.
pub const MAX_STRING_LEN: usize = 16 * 1024 * 1024;

/// Maximum length of a byte block.
pub const MAX_BYTES_LEN: usize = 64 * 1024 * 1024;

/// Maximum length of a backend tag in bytes.
pub const MAX_TAG_LEN: usize = 255;

/// Maximum number of elements in an array, list or map.
pub const MAX_ELEMENTS: usize = 16 * 1024 * 1024;

/// Maximum rank of a multi-dimensional array.
pub const MAX_RANK: usize = 32;

/// Maximum nesting depth of records, structs and references.
pub const MAX_DEPTH: usize = 256;

/// Maximum number of types a single registry may hold.
pub const MAX_TYPES: usize = 65_536;

/// Maximum number of fields in a graph type.
pub const MAX_FIELDS: usize = 4_096;

/// Maximum size of a decompressed frame payload.
pub const MAX_FRAME_SIZE: usize = 256 * 1024 * 1024;

/// Largest decimal scale (digits after the point).
pub const MAX_DECIMAL_SCALE: u8 = 28;
