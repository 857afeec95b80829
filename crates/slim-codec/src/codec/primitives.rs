//! Primitive encoding/decoding shared by the row and graph codecs.
//!
//! A [`Streamer`] is bound to exactly one byte sink or byte source at a time
//! and exposes typed read/write operations on it. Fixed-width numbers are
//! little-endian; lengths and counts are LEB128 varints.

use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::ops::{Deref, DerefMut};

use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use crate::error::{DecodeError, EncodeError, StreamError};
use crate::limits::{MAX_DECIMAL_SCALE, MAX_VARINT_BYTES};
use crate::model::{Decimal, WireType};

const NANOS_PER_SECOND: i32 = 1_000_000_000;

/// Upper bound on the buffer reserved for a raw block before its bytes
/// arrive; longer blocks grow as they are read.
const RAW_PREALLOC: usize = 64 * 1024;

enum Binding<'s> {
    Unbound,
    Sink(&'s mut dyn Write),
    Source(&'s mut dyn Read),
}

/// Typed primitive reader/writer over a bound byte stream.
///
/// Binding is exclusive: binding twice without unbinding fails with
/// [`StreamError::AlreadyBound`]. Prefer [`Streamer::sink_scope`] and
/// [`Streamer::source_scope`], whose guards unbind on every exit path.
pub struct Streamer<'s> {
    binding: Binding<'s>,
    position: u64,
}

impl fmt::Debug for Streamer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.binding {
            Binding::Unbound => "unbound",
            Binding::Sink(_) => "sink",
            Binding::Source(_) => "source",
        };
        f.debug_struct("Streamer")
            .field("binding", &state)
            .field("position", &self.position)
            .finish()
    }
}

impl Default for Streamer<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'s> Streamer<'s> {
    /// Creates an unbound streamer.
    pub fn new() -> Self {
        Self {
            binding: Binding::Unbound,
            position: 0,
        }
    }

    /// Returns true while bound to a sink or source.
    pub fn is_bound(&self) -> bool {
        !matches!(self.binding, Binding::Unbound)
    }

    /// Returns the number of bytes written or read since binding.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Binds to a byte sink for encoding.
    pub fn bind_sink(&mut self, sink: &'s mut dyn Write) -> Result<(), StreamError> {
        if self.is_bound() {
            return Err(StreamError::AlreadyBound);
        }
        self.binding = Binding::Sink(sink);
        self.position = 0;
        Ok(())
    }

    /// Binds to a byte source for decoding.
    pub fn bind_source(&mut self, source: &'s mut dyn Read) -> Result<(), StreamError> {
        if self.is_bound() {
            return Err(StreamError::AlreadyBound);
        }
        self.binding = Binding::Source(source);
        self.position = 0;
        Ok(())
    }

    /// Releases the current binding, flushing a sink first.
    pub fn unbind(&mut self) -> Result<(), EncodeError> {
        match std::mem::replace(&mut self.binding, Binding::Unbound) {
            Binding::Unbound => Err(StreamError::NotBound.into()),
            Binding::Sink(sink) => sink.flush().map_err(|e| EncodeError::Io(e.to_string())),
            Binding::Source(_) => Ok(()),
        }
    }

    /// Binds to a sink for the lifetime of the returned guard.
    pub fn sink_scope<'a>(
        &'a mut self,
        sink: &'s mut dyn Write,
    ) -> Result<Bound<'a, 's>, StreamError> {
        self.bind_sink(sink)?;
        Ok(Bound { streamer: self })
    }

    /// Binds to a source for the lifetime of the returned guard.
    pub fn source_scope<'a>(
        &'a mut self,
        source: &'s mut dyn Read,
    ) -> Result<Bound<'a, 's>, StreamError> {
        self.bind_source(source)?;
        Ok(Bound { streamer: self })
    }

    // =========================================================================
    // DECODING
    // =========================================================================

    /// Fills `buf` from the source or fails with end-of-stream.
    fn fill(&mut self, buf: &mut [u8], context: &'static str) -> Result<(), DecodeError> {
        let source = match &mut self.binding {
            Binding::Source(source) => source,
            Binding::Unbound => return Err(StreamError::NotBound.into()),
            Binding::Sink(_) => return Err(StreamError::NotBoundForRead.into()),
        };
        let mut filled = 0;
        while filled < buf.len() {
            match source.read(&mut buf[filled..]) {
                Ok(0) => {
                    self.position += filled as u64;
                    return Err(DecodeError::UnexpectedEof { context });
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    self.position += filled as u64;
                    return Err(DecodeError::Io(e.to_string()));
                }
            }
        }
        self.position += filled as u64;
        Ok(())
    }

    #[inline]
    fn read_array<const N: usize>(&mut self, context: &'static str) -> Result<[u8; N], DecodeError> {
        let mut buf = [0u8; N];
        self.fill(&mut buf, context)?;
        Ok(buf)
    }

    /// Reads a single byte.
    #[inline]
    pub fn read_u8(&mut self, context: &'static str) -> Result<u8, DecodeError> {
        Ok(self.read_array::<1>(context)?[0])
    }

    pub fn read_i8(&mut self, context: &'static str) -> Result<i8, DecodeError> {
        Ok(self.read_u8(context)? as i8)
    }

    pub fn read_u16(&mut self, context: &'static str) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.read_array(context)?))
    }

    pub fn read_i16(&mut self, context: &'static str) -> Result<i16, DecodeError> {
        Ok(i16::from_le_bytes(self.read_array(context)?))
    }

    pub fn read_u32(&mut self, context: &'static str) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.read_array(context)?))
    }

    pub fn read_i32(&mut self, context: &'static str) -> Result<i32, DecodeError> {
        Ok(i32::from_le_bytes(self.read_array(context)?))
    }

    pub fn read_u64(&mut self, context: &'static str) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.read_array(context)?))
    }

    pub fn read_i64(&mut self, context: &'static str) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.read_array(context)?))
    }

    /// Reads a little-endian f32.
    pub fn read_f32(&mut self, context: &'static str) -> Result<f32, DecodeError> {
        Ok(f32::from_le_bytes(self.read_array(context)?))
    }

    /// Reads a little-endian f64.
    pub fn read_f64(&mut self, context: &'static str) -> Result<f64, DecodeError> {
        Ok(f64::from_le_bytes(self.read_array(context)?))
    }

    /// Reads a strict boolean byte.
    pub fn read_bool(&mut self, context: &'static str) -> Result<bool, DecodeError> {
        match self.read_u8(context)? {
            0x00 => Ok(false),
            0x01 => Ok(true),
            value => Err(DecodeError::InvalidBool { value }),
        }
    }

    /// Reads an unsigned varint (LEB128).
    pub fn read_varint(&mut self, context: &'static str) -> Result<u64, DecodeError> {
        let mut result: u64 = 0;
        let mut shift = 0;

        for i in 0..MAX_VARINT_BYTES {
            let byte = self.read_u8(context)?;
            let value = (byte & 0x7F) as u64;

            if shift >= 64 || (shift == 63 && value > 1) {
                return Err(DecodeError::VarintOverflow);
            }

            result |= value << shift;

            if byte & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;

            if i == MAX_VARINT_BYTES - 1 {
                return Err(DecodeError::VarintTooLong);
            }
        }

        Err(DecodeError::VarintTooLong)
    }

    /// Reads a signed varint (zigzag encoded).
    pub fn read_signed_varint(&mut self, context: &'static str) -> Result<i64, DecodeError> {
        let unsigned = self.read_varint(context)?;
        Ok(zigzag_decode(unsigned))
    }

    /// Reads a varint length and checks it against `max`.
    pub fn read_len(&mut self, max: usize, field: &'static str) -> Result<usize, DecodeError> {
        let len = self.read_varint(field)?;
        let len = usize::try_from(len).unwrap_or(usize::MAX);
        if len > max {
            return Err(DecodeError::LengthExceedsLimit { field, len, max });
        }
        Ok(len)
    }

    /// Reads exactly `len` raw bytes; the caller bounds `len`.
    ///
    /// Memory follows the bytes actually read, so a declared length larger
    /// than the input fails with end-of-stream without reserving it.
    pub fn read_raw(&mut self, len: usize, context: &'static str) -> Result<Vec<u8>, DecodeError> {
        let source = match &mut self.binding {
            Binding::Source(source) => source,
            Binding::Unbound => return Err(StreamError::NotBound.into()),
            Binding::Sink(_) => return Err(StreamError::NotBoundForRead.into()),
        };
        let mut bytes = Vec::with_capacity(len.min(RAW_PREALLOC));
        let result = (&mut **source).take(len as u64).read_to_end(&mut bytes);
        self.position += bytes.len() as u64;
        if let Err(e) = result {
            return Err(DecodeError::Io(e.to_string()));
        }
        if bytes.len() < len {
            return Err(DecodeError::UnexpectedEof { context });
        }
        Ok(bytes)
    }

    /// Reads a length-prefixed byte block.
    pub fn read_bytes_prefixed(
        &mut self,
        max_len: usize,
        field: &'static str,
    ) -> Result<Vec<u8>, DecodeError> {
        let len = self.read_len(max_len, field)?;
        self.read_raw(len, field)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self, max_len: usize, field: &'static str) -> Result<String, DecodeError> {
        let bytes = self.read_bytes_prefixed(max_len, field)?;
        String::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8 { field })
    }

    /// Reads a decimal: 16-byte mantissa then scale.
    pub fn read_decimal(&mut self, context: &'static str) -> Result<Decimal, DecodeError> {
        let mantissa = i128::from_le_bytes(self.read_array(context)?);
        let scale = self.read_u8(context)?;
        Decimal::new(mantissa, scale).ok_or(DecodeError::InvalidDecimalScale { scale })
    }

    /// Reads a UTC timestamp as seconds + nanoseconds since the Unix epoch.
    pub fn read_datetime(&mut self, context: &'static str) -> Result<DateTime<Utc>, DecodeError> {
        let seconds = self.read_i64(context)?;
        let nanos = self.read_u32(context)?;
        DateTime::<Utc>::from_timestamp(seconds, nanos)
            .ok_or(DecodeError::InvalidTimestamp { seconds, nanos })
    }

    /// Reads a duration as seconds + non-negative nanoseconds.
    pub fn read_duration(&mut self, context: &'static str) -> Result<TimeDelta, DecodeError> {
        let seconds = self.read_i64(context)?;
        let nanos = self.read_u32(context)?;
        TimeDelta::new(seconds, nanos).ok_or(DecodeError::InvalidDuration { seconds, nanos })
    }

    /// Reads a 16-byte GUID.
    pub fn read_guid(&mut self, context: &'static str) -> Result<Uuid, DecodeError> {
        Ok(Uuid::from_bytes(self.read_array(context)?))
    }

    /// Reads a wire type code.
    pub fn read_wire_type(&mut self, context: &'static str) -> Result<WireType, DecodeError> {
        let code = self.read_u8(context)?;
        WireType::from_u8(code).ok_or(DecodeError::InvalidWireType { code })
    }

    // =========================================================================
    // ENCODING
    // =========================================================================

    #[inline]
    fn put(&mut self, bytes: &[u8]) -> Result<(), EncodeError> {
        match &mut self.binding {
            Binding::Sink(sink) => sink
                .write_all(bytes)
                .map_err(|e| EncodeError::Io(e.to_string()))?,
            Binding::Unbound => return Err(StreamError::NotBound.into()),
            Binding::Source(_) => return Err(StreamError::NotBoundForWrite.into()),
        }
        self.position += bytes.len() as u64;
        Ok(())
    }

    /// Writes raw bytes with no length prefix.
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<(), EncodeError> {
        self.put(bytes)
    }

    #[inline]
    pub fn write_u8(&mut self, value: u8) -> Result<(), EncodeError> {
        self.put(&[value])
    }

    pub fn write_i8(&mut self, value: i8) -> Result<(), EncodeError> {
        self.put(&[value as u8])
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), EncodeError> {
        self.put(&value.to_le_bytes())
    }

    pub fn write_i16(&mut self, value: i16) -> Result<(), EncodeError> {
        self.put(&value.to_le_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), EncodeError> {
        self.put(&value.to_le_bytes())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<(), EncodeError> {
        self.put(&value.to_le_bytes())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<(), EncodeError> {
        self.put(&value.to_le_bytes())
    }

    pub fn write_i64(&mut self, value: i64) -> Result<(), EncodeError> {
        self.put(&value.to_le_bytes())
    }

    /// Writes a little-endian f32.
    pub fn write_f32(&mut self, value: f32) -> Result<(), EncodeError> {
        self.put(&value.to_le_bytes())
    }

    /// Writes a little-endian f64.
    pub fn write_f64(&mut self, value: f64) -> Result<(), EncodeError> {
        self.put(&value.to_le_bytes())
    }

    pub fn write_bool(&mut self, value: bool) -> Result<(), EncodeError> {
        self.put(&[value as u8])
    }

    /// Writes an unsigned varint (LEB128).
    pub fn write_varint(&mut self, mut value: u64) -> Result<(), EncodeError> {
        // Stack buffer so the sink sees one write per varint
        let mut buf = [0u8; MAX_VARINT_BYTES];
        let mut len = 0;
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            buf[len] = byte;
            len += 1;
            if value == 0 {
                break;
            }
        }
        self.put(&buf[..len])
    }

    /// Writes a signed varint (zigzag encoded).
    pub fn write_signed_varint(&mut self, value: i64) -> Result<(), EncodeError> {
        self.write_varint(zigzag_encode(value))
    }

    /// Writes a length prefix after checking it against `max`.
    pub fn write_len(&mut self, len: usize, max: usize, field: &'static str) -> Result<(), EncodeError> {
        if len > max {
            return Err(EncodeError::LengthExceedsLimit { field, len, max });
        }
        self.write_varint(len as u64)
    }

    /// Writes a length-prefixed byte block.
    pub fn write_bytes_prefixed(
        &mut self,
        bytes: &[u8],
        max_len: usize,
        field: &'static str,
    ) -> Result<(), EncodeError> {
        self.write_len(bytes.len(), max_len, field)?;
        self.put(bytes)
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, s: &str, max_len: usize, field: &'static str) -> Result<(), EncodeError> {
        self.write_bytes_prefixed(s.as_bytes(), max_len, field)
    }

    pub fn write_decimal(&mut self, value: &Decimal) -> Result<(), EncodeError> {
        if value.scale() > MAX_DECIMAL_SCALE {
            return Err(EncodeError::InvalidDecimalScale { scale: value.scale() });
        }
        self.put(&value.mantissa().to_le_bytes())?;
        self.write_u8(value.scale())
    }

    pub fn write_datetime(&mut self, value: &DateTime<Utc>) -> Result<(), EncodeError> {
        self.write_i64(value.timestamp())?;
        self.write_u32(value.timestamp_subsec_nanos())
    }

    /// Writes a duration, normalising nanoseconds to be non-negative.
    pub fn write_duration(&mut self, value: &TimeDelta) -> Result<(), EncodeError> {
        let mut seconds = value.num_seconds();
        let mut nanos = value.subsec_nanos();
        if nanos < 0 {
            seconds -= 1;
            nanos += NANOS_PER_SECOND;
        }
        self.write_i64(seconds)?;
        self.write_u32(nanos as u32)
    }

    pub fn write_guid(&mut self, value: &Uuid) -> Result<(), EncodeError> {
        self.put(value.as_bytes())
    }

    pub fn write_wire_type(&mut self, value: WireType) -> Result<(), EncodeError> {
        self.write_u8(value as u8)
    }
}

/// Guard returned by [`Streamer::sink_scope`] / [`Streamer::source_scope`].
///
/// Dereferences to the streamer and unbinds it when dropped, including when
/// a codec call returns early with an error.
#[derive(Debug)]
pub struct Bound<'a, 's> {
    streamer: &'a mut Streamer<'s>,
}

impl Bound<'_, '_> {
    /// Unbinds now, reporting a failed sink flush.
    pub fn finish(self) -> Result<(), EncodeError> {
        let mut this = std::mem::ManuallyDrop::new(self);
        this.streamer.unbind()
    }
}

impl<'s> Deref for Bound<'_, 's> {
    type Target = Streamer<'s>;

    fn deref(&self) -> &Self::Target {
        self.streamer
    }
}

impl DerefMut for Bound<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.streamer
    }
}

impl Drop for Bound<'_, '_> {
    fn drop(&mut self) {
        // Flush failures surface through `finish`; drop only releases.
        let _ = self.streamer.unbind();
    }
}

// =============================================================================
// BUFFER HELPERS
// =============================================================================

/// Runs `encode` against a streamer bound to a fresh buffer.
pub fn encode_to_vec(
    encode: impl FnOnce(&mut Streamer<'_>) -> Result<(), EncodeError>,
) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    {
        let mut streamer = Streamer::new();
        let mut bound = streamer.sink_scope(&mut buf)?;
        encode(&mut bound)?;
        bound.finish()?;
    }
    Ok(buf)
}

/// Runs `decode` against a streamer bound to `bytes`, rejecting unread input.
pub fn decode_from_slice<T>(
    bytes: &[u8],
    decode: impl FnOnce(&mut Streamer<'_>) -> Result<T, DecodeError>,
) -> Result<T, DecodeError> {
    let mut source = bytes;
    let value = {
        let mut streamer = Streamer::new();
        let mut bound = streamer.source_scope(&mut source)?;
        decode(&mut bound)?
    };
    if !source.is_empty() {
        return Err(DecodeError::TrailingBytes {
            trailing: source.len(),
        });
    }
    Ok(value)
}

// =============================================================================
// ZIGZAG ENCODING
// =============================================================================

/// Encodes a signed integer using zigzag encoding.
///
/// Maps negative numbers to odd positive numbers:
/// 0 -> 0, -1 -> 1, 1 -> 2, -2 -> 3, 2 -> 4, ...
#[inline]
pub fn zigzag_encode(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Decodes a zigzag-encoded unsigned integer back to signed.
#[inline]
pub fn zigzag_decode(n: u64) -> i64 {
    ((n >> 1) as i64) ^ (-((n & 1) as i64))
}
