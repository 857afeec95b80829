//! Self-describing frames around row and graph payloads.
//!
//! ```text
//! plain      := "SLIM"  version kind payload
//! compressed := "SLIMZ" version kind varint(uncompressed_size) zstd(payload)
//! ```
//!
//! The decoder detects both forms.

use std::borrow::Cow;
use std::io::Read;

use crate::codec::primitives::{encode_to_vec, Streamer};
use crate::error::{DecodeError, EncodeError};
use crate::limits::{
    FORMAT_VERSION, MAGIC_COMPRESSED, MAGIC_UNCOMPRESSED, MAX_FRAME_SIZE, MIN_FORMAT_VERSION,
};

/// What a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Row,
    Graph,
}

impl PayloadKind {
    pub fn to_u8(self) -> u8 {
        match self {
            PayloadKind::Row => b'R',
            PayloadKind::Graph => b'G',
        }
    }
}

/// Returns true if `input` starts with the compressed magic.
pub fn is_compressed(input: &[u8]) -> bool {
    input.starts_with(MAGIC_COMPRESSED)
}

/// Wraps a payload in a plain frame.
pub fn wrap(kind: PayloadKind, payload: &[u8]) -> Result<Vec<u8>, EncodeError> {
    encode_to_vec(|s| {
        s.write_raw(MAGIC_UNCOMPRESSED)?;
        s.write_u8(FORMAT_VERSION)?;
        s.write_u8(kind.to_u8())?;
        s.write_raw(payload)
    })
}

/// Wraps a payload in a zstd-compressed frame.
pub fn wrap_compressed(kind: PayloadKind, payload: &[u8], level: i32) -> Result<Vec<u8>, EncodeError> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(EncodeError::LengthExceedsLimit {
            field: "frame",
            len: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    let compressed = zstd::encode_all(payload, level)
        .map_err(|e| EncodeError::CompressionFailed(e.to_string()))?;

    encode_to_vec(|s| {
        s.write_raw(MAGIC_COMPRESSED)?;
        s.write_u8(FORMAT_VERSION)?;
        s.write_u8(kind.to_u8())?;
        s.write_varint(payload.len() as u64)?;
        s.write_raw(&compressed)
    })
}

/// Unwraps a frame of the expected kind, decompressing if needed.
///
/// Plain frames are returned without copying.
pub fn unwrap(expected: PayloadKind, input: &[u8]) -> Result<Cow<'_, [u8]>, DecodeError> {
    if input.len() < MAGIC_UNCOMPRESSED.len() {
        return Err(DecodeError::UnexpectedEof { context: "magic" });
    }

    if is_compressed(input) {
        let mut rest = &input[MAGIC_COMPRESSED.len()..];
        let declared = {
            let mut streamer = Streamer::new();
            let mut bound = streamer.source_scope(&mut rest)?;
            read_version_and_kind(&mut bound, expected)?;
            bound.read_len(MAX_FRAME_SIZE, "uncompressed_size")?
        };
        Ok(Cow::Owned(decompress_zstd(rest, declared)?))
    } else if input.starts_with(MAGIC_UNCOMPRESSED) {
        let mut rest = &input[MAGIC_UNCOMPRESSED.len()..];
        {
            let mut streamer = Streamer::new();
            let mut bound = streamer.source_scope(&mut rest)?;
            read_version_and_kind(&mut bound, expected)?;
        }
        if rest.len() > MAX_FRAME_SIZE {
            return Err(DecodeError::LengthExceedsLimit {
                field: "frame",
                len: rest.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        Ok(Cow::Borrowed(rest))
    } else {
        let mut found = [0u8; 4];
        found.copy_from_slice(&input[0..4]);
        Err(DecodeError::InvalidMagic { found })
    }
}

fn read_version_and_kind(
    streamer: &mut Streamer<'_>,
    expected: PayloadKind,
) -> Result<(), DecodeError> {
    let version = streamer.read_u8("version")?;
    if !(MIN_FORMAT_VERSION..=FORMAT_VERSION).contains(&version) {
        return Err(DecodeError::UnsupportedVersion { version });
    }
    let found = streamer.read_u8("payload kind")?;
    if found != expected.to_u8() {
        return Err(DecodeError::UnexpectedPayloadKind {
            expected: expected.to_u8(),
            found,
        });
    }
    Ok(())
}

fn decompress_zstd(compressed: &[u8], declared_size: usize) -> Result<Vec<u8>, DecodeError> {
    let decoder = zstd::Decoder::new(compressed)
        .map_err(|e| DecodeError::DecompressionFailed(e.to_string()))?;

    // One byte past the declared size is enough to detect a lying header.
    let mut decompressed = Vec::with_capacity(declared_size);
    decoder
        .take(declared_size as u64 + 1)
        .read_to_end(&mut decompressed)
        .map_err(|e| DecodeError::DecompressionFailed(e.to_string()))?;

    if decompressed.len() != declared_size {
        return Err(DecodeError::UncompressedSizeMismatch {
            declared: declared_size,
            actual: decompressed.len(),
        });
    }

    Ok(decompressed)
}
