//! Error types for row/graph encoding, decoding and schema validation.

use thiserror::Error;

use crate::model::WireType;

/// Error classes shared by every error in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// E001: Read past the end of the bound stream
    EndOfStream,
    /// E002: Byte sequence violates the wire grammar
    DecodeFormat,
    /// E003: Wire type incompatible with the destination
    TypeMismatch,
    /// E004: Writer and reader disagree on the number of registered types
    RegistryCountMismatch,
    /// E005: Writer and reader disagree on a type's shape checksum
    RegistryChecksumMismatch,
    /// E006: API misuse (binding, invalid schema, invalid graph)
    Usage,
    /// E007: The underlying stream failed
    Io,
}

impl ErrorCode {
    /// Returns the error code string (e.g., "E001").
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCode::EndOfStream => "E001",
            ErrorCode::DecodeFormat => "E002",
            ErrorCode::TypeMismatch => "E003",
            ErrorCode::RegistryCountMismatch => "E004",
            ErrorCode::RegistryChecksumMismatch => "E005",
            ErrorCode::Usage => "E006",
            ErrorCode::Io => "E007",
        }
    }
}

/// Misuse of the streamer binding protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("[E006] streamer is already bound to a stream")]
    AlreadyBound,

    #[error("[E006] streamer is not bound")]
    NotBound,

    #[error("[E006] streamer is not bound to a sink")]
    NotBoundForWrite,

    #[error("[E006] streamer is not bound to a source")]
    NotBoundForRead,
}

/// A schema that cannot be used on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("[E006] {type_name}: backend tag {tag:?} is declared more than once")]
    DuplicateTag { type_name: &'static str, tag: String },

    #[error("[E006] {type_name}: field {field} has an empty backend tag")]
    EmptyTag {
        type_name: &'static str,
        field: &'static str,
    },

    #[error("[E006] {type_name}: backend tag {tag:?} exceeds {max} bytes")]
    TagTooLong {
        type_name: &'static str,
        tag: String,
        max: usize,
    },

    #[error("[E006] {type_name}: field kind {kind} is not valid on the wire")]
    InvalidFieldKind {
        type_name: &'static str,
        kind: &'static str,
    },

    #[error("[E006] type names must not be empty")]
    EmptyTypeName,

    #[error("[E006] type {name:?} is already in the catalog")]
    DuplicateType { name: String },

    #[error("[E006] type {name:?} declares field {field:?} more than once")]
    DuplicateField { name: String, field: String },

    #[error("[E006] type {name:?} has {count} fields (max {max})")]
    TooManyFields {
        name: String,
        count: usize,
        max: usize,
    },

    #[error("[E006] catalog is full ({max} types)")]
    CatalogFull { max: usize },
}

/// Error during binary decoding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    // === E001: End of stream ===
    #[error("[E001] unexpected end of stream while reading {context}")]
    UnexpectedEof { context: &'static str },

    // === E002: Wire grammar ===
    #[error("[E002] varint exceeds maximum length (10 bytes)")]
    VarintTooLong,

    #[error("[E002] varint overflow (value exceeds u64)")]
    VarintOverflow,

    #[error("[E002] {field} length {len} exceeds maximum {max}")]
    LengthExceedsLimit {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("[E002] invalid UTF-8 in {field}")]
    InvalidUtf8 { field: &'static str },

    #[error("[E002] invalid bool value: {value} (expected 0x00 or 0x01)")]
    InvalidBool { value: u8 },

    #[error("[E002] invalid wire type code: {code:#04x}")]
    InvalidWireType { code: u8 },

    #[error("[E002] invalid {context} marker: {value:#04x}")]
    InvalidMarker { context: &'static str, value: u8 },

    #[error("[E002] {wire:?} cannot be used as an element type")]
    InvalidElementType { wire: WireType },

    #[error("[E002] tag {tag:?} appears more than once in one record")]
    DuplicateTag { tag: String },

    #[error("[E002] decimal scale {scale} exceeds 28")]
    InvalidDecimalScale { scale: u8 },

    #[error("[E002] timestamp {seconds}s + {nanos}ns is out of range")]
    InvalidTimestamp { seconds: i64, nanos: u32 },

    #[error("[E002] duration {seconds}s + {nanos}ns is out of range")]
    InvalidDuration { seconds: i64, nanos: u32 },

    #[error("[E002] {enumeration} has no member named {name:?}")]
    UnknownEnumMember {
        enumeration: &'static str,
        name: String,
    },

    #[error("[E002] back-reference {index} points past the reference table (size: {size})")]
    InvalidBackReference { index: usize, size: usize },

    #[error("[E002] new reference index {found} out of sequence (expected {expected})")]
    ReferenceOutOfSequence { expected: usize, found: usize },

    #[error("[E002] type handle {handle} out of bounds (registered: {size})")]
    UnknownTypeHandle { handle: usize, size: usize },

    #[error("[E002] type {name:?} is not in the reader's catalog")]
    UnknownType { name: String },

    #[error("[E002] type {name:?} was already registered in this scope")]
    TypeAlreadyRegistered { name: String },

    #[error("[E002] type {name:?} is a {found} but a {expected} was expected")]
    WrongTypeKind {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("[E002] map key {key:?} appears more than once")]
    DuplicateMapKey { key: String },

    #[error("[E002] nesting depth exceeds maximum {max}")]
    DepthExceeded { max: usize },

    #[error("[E002] malformed encoding: {context}")]
    MalformedEncoding { context: &'static str },

    #[error("[E002] invalid magic bytes: expected SLIM or SLIMZ, found {found:?}")]
    InvalidMagic { found: [u8; 4] },

    #[error("[E002] unsupported version: {version}")]
    UnsupportedVersion { version: u8 },

    #[error("[E002] unexpected payload kind {found:#04x} (expected {expected:#04x})")]
    UnexpectedPayloadKind { expected: u8, found: u8 },

    #[error("[E002] zstd decompression failed: {0}")]
    DecompressionFailed(String),

    #[error("[E002] decompressed size {actual} doesn't match declared {declared}")]
    UncompressedSizeMismatch { declared: usize, actual: usize },

    #[error("[E002] {trailing} trailing bytes after payload")]
    TrailingBytes { trailing: usize },

    // === E003: Type mismatch ===
    #[error("[E003] type mismatch for {field}: expected {expected}, found {found:?}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: WireType,
    },

    // === E004 / E005: Registry disagreement ===
    #[error("[E004] type registry count mismatch: reader has {expected} types, stream declares {found}")]
    RegistryCountMismatch { expected: usize, found: usize },

    #[error("[E005] type registry CSUM mismatch for {type_name} (handle {handle}): reader {expected:#018x}, stream {found:#018x}")]
    RegistryChecksumMismatch {
        handle: usize,
        type_name: String,
        expected: u64,
        found: u64,
    },

    // === E006: Usage ===
    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    // === E007: I/O ===
    #[error("[E007] stream read failed: {0}")]
    Io(String),
}

impl DecodeError {
    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            DecodeError::UnexpectedEof { .. } => ErrorCode::EndOfStream,
            DecodeError::TypeMismatch { .. } => ErrorCode::TypeMismatch,
            DecodeError::RegistryCountMismatch { .. } => ErrorCode::RegistryCountMismatch,
            DecodeError::RegistryChecksumMismatch { .. } => ErrorCode::RegistryChecksumMismatch,
            DecodeError::Stream(_) | DecodeError::Schema(_) => ErrorCode::Usage,
            DecodeError::Io(_) => ErrorCode::Io,
            _ => ErrorCode::DecodeFormat,
        }
    }
}

/// Error during binary encoding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("[E006] {field} length {len} exceeds maximum {max}")]
    LengthExceedsLimit {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("[E006] record tags must not be empty")]
    EmptyTag,

    #[error("[E006] {field}: array declares {expected:?} elements but holds a {found:?}")]
    HeterogeneousArray {
        field: String,
        expected: WireType,
        found: WireType,
    },

    #[error("[E006] {wire:?} cannot be used as an element type")]
    InvalidElementType { wire: WireType },

    #[error("[E006] {value:?} cannot be stored in a graph slot")]
    UnsupportedSlotValue { value: WireType },

    #[error("[E006] type {name:?} is not in the writer's catalog")]
    UnknownType { name: String },

    #[error("[E006] type {name:?} is a {found} but a {expected} was expected")]
    WrongTypeKind {
        name: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("[E006] {type_name} has {expected} fields but the instance holds {actual}")]
    FieldCountMismatch {
        type_name: String,
        expected: usize,
        actual: usize,
    },

    #[error("[E006] {type_name}.{field} is declared {expected} and cannot hold this slot")]
    FieldTypeMismatch {
        type_name: String,
        field: String,
        expected: String,
    },

    #[error("[E006] node {index} is not part of the graph")]
    DanglingReference { index: usize },

    #[error("[E006] registry is full ({max} types)")]
    TooManyTypes { max: usize },

    #[error("[E006] nesting depth exceeds maximum {max}")]
    DepthExceeded { max: usize },

    #[error("[E006] decimal scale {scale} exceeds 28")]
    InvalidDecimalScale { scale: u8 },

    #[error("zstd compression failed: {0}")]
    CompressionFailed(String),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("[E007] stream write failed: {0}")]
    Io(String),
}

impl EncodeError {
    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            EncodeError::Io(_) | EncodeError::CompressionFailed(_) => ErrorCode::Io,
            _ => ErrorCode::Usage,
        }
    }
}
