//! Tagged record encoding/decoding.
//!
//! A record is a sequence of `tag wire_code payload` triples closed by a
//! zero-length tag:
//!
//! ```text
//! record  := { tag code payload }* 0x00
//! tag     := varint(len >= 1) utf8
//! payload := scalar | elem_code count payload* | record | <empty for NULL>
//! ```
//!
//! Fields are matched by tag, never by position, so producers and consumers
//! may evolve their schemas independently.

use rustc_hash::FxHashSet;

use crate::codec::primitives::{decode_from_slice, encode_to_vec, Streamer};
use crate::error::{DecodeError, EncodeError};
use crate::limits::{MAX_BYTES_LEN, MAX_DEPTH, MAX_ELEMENTS, MAX_STRING_LEN, MAX_TAG_LEN};
use crate::model::{RecordValue, Row, Schema, Value, WireType};

// =============================================================================
// ENCODING
// =============================================================================

/// Encodes `row` onto a bound streamer.
///
/// Schema fields are written first, in declaration order, followed by any
/// amorphous entries whose tags the schema doesn't know.
pub fn serialize<R: Row>(row: &R, streamer: &mut Streamer<'_>) -> Result<(), EncodeError> {
    let schema = Schema::<R>::try_of()?;
    for field in schema.fields() {
        if let Some(value) = field.read(row)? {
            write_field(streamer, field.tag(), &value, 0)?;
        }
    }
    if let Some(store) = schema.amorphous(row) {
        for (tag, value) in store.iter() {
            if schema.field(tag).is_none() {
                write_field(streamer, tag, value, 0)?;
            }
        }
    }
    streamer.write_u8(0)
}

/// Encodes `row` into a new buffer.
pub fn to_bytes<R: Row>(row: &R) -> Result<Vec<u8>, EncodeError> {
    encode_to_vec(|streamer| serialize(row, streamer))
}

/// Encodes a dynamic record onto a bound streamer.
pub fn encode_document(record: &RecordValue, streamer: &mut Streamer<'_>) -> Result<(), EncodeError> {
    write_record_body(streamer, record, 0)
}

fn write_field(
    streamer: &mut Streamer<'_>,
    tag: &str,
    value: &Value,
    depth: usize,
) -> Result<(), EncodeError> {
    if tag.is_empty() {
        return Err(EncodeError::EmptyTag);
    }
    streamer.write_string(tag, MAX_TAG_LEN, "tag")?;
    streamer.write_wire_type(value.wire_type())?;
    write_payload(streamer, tag, value, depth)
}

fn write_record_body(
    streamer: &mut Streamer<'_>,
    record: &RecordValue,
    depth: usize,
) -> Result<(), EncodeError> {
    if depth > MAX_DEPTH {
        return Err(EncodeError::DepthExceeded { max: MAX_DEPTH });
    }
    for (tag, value) in record.iter() {
        write_field(streamer, tag, value, depth)?;
    }
    streamer.write_u8(0)
}

/// Writes a value's payload (everything after its wire code).
pub(crate) fn write_payload(
    streamer: &mut Streamer<'_>,
    field: &str,
    value: &Value,
    depth: usize,
) -> Result<(), EncodeError> {
    match value {
        Value::Null => Ok(()),
        Value::Bool(v) => streamer.write_bool(*v),
        Value::I8(v) => streamer.write_i8(*v),
        Value::U8(v) => streamer.write_u8(*v),
        Value::I16(v) => streamer.write_i16(*v),
        Value::U16(v) => streamer.write_u16(*v),
        Value::I32(v) => streamer.write_i32(*v),
        Value::U32(v) => streamer.write_u32(*v),
        Value::I64(v) => streamer.write_i64(*v),
        Value::U64(v) => streamer.write_u64(*v),
        Value::F32(v) => streamer.write_f32(*v),
        Value::F64(v) => streamer.write_f64(*v),
        Value::Decimal(v) => streamer.write_decimal(v),
        Value::Text(v) => streamer.write_string(v, MAX_STRING_LEN, "text"),
        Value::Bytes(v) => streamer.write_bytes_prefixed(v, MAX_BYTES_LEN, "bytes"),
        Value::DateTime(v) => streamer.write_datetime(v),
        Value::Duration(v) => streamer.write_duration(v),
        Value::Guid(v) => streamer.write_guid(v),
        Value::Enum(v) => streamer.write_string(v, MAX_STRING_LEN, "enum"),
        Value::Array(element, items) | Value::List(element, items) => {
            if !is_element_type(*element) {
                return Err(EncodeError::InvalidElementType { wire: *element });
            }
            streamer.write_wire_type(*element)?;
            streamer.write_len(items.len(), MAX_ELEMENTS, "elements")?;
            for item in items {
                let found = item.wire_type();
                if found != *element {
                    return Err(EncodeError::HeterogeneousArray {
                        field: field.to_string(),
                        expected: *element,
                        found,
                    });
                }
                write_payload(streamer, field, item, depth + 1)?;
            }
            Ok(())
        }
        Value::Record(record) => write_record_body(streamer, record, depth + 1),
    }
}

/// Sequences hold scalars or records; nested sequences and nulls are not
/// representable with a single element code.
fn is_element_type(wire: WireType) -> bool {
    wire.is_scalar() || wire == WireType::Record
}

// =============================================================================
// DECODING
// =============================================================================

/// Decodes one record from a bound streamer into `target`.
///
/// `target` is reset to its default first, which also empties its amorphous
/// store, so fields absent from the wire end up at their default. Tags the
/// schema doesn't know are captured into the amorphous store, or dropped if
/// the type has none.
pub fn deserialize<R: Row>(target: &mut R, streamer: &mut Streamer<'_>) -> Result<(), DecodeError> {
    let schema = Schema::<R>::try_of()?;
    *target = R::default();
    let mut seen = FxHashSet::default();
    while let Some(tag) = read_tag(streamer)? {
        if !seen.insert(tag.clone()) {
            return Err(DecodeError::DuplicateTag { tag });
        }
        let wire = streamer.read_wire_type("wire type")?;
        match schema.field(&tag) {
            Some(field) => {
                if !field.kind().accepts(wire) {
                    return Err(DecodeError::TypeMismatch {
                        field: tag,
                        expected: field.kind().to_string(),
                        found: wire,
                    });
                }
                let value = read_payload(streamer, wire, 0)?;
                field.write(target, value)?;
            }
            None => {
                let value = read_payload(streamer, wire, 0)?;
                schema.capture(target, tag, value);
            }
        }
    }
    Ok(())
}

/// Decodes a record from `bytes` into a default instance of `R`.
pub fn from_bytes<R: Row>(bytes: &[u8]) -> Result<R, DecodeError> {
    let mut row = R::default();
    deserialize_into(&mut row, bytes)?;
    Ok(row)
}

/// Decodes a record from `bytes` into an existing instance, replacing its
/// previous contents.
pub fn deserialize_into<R: Row>(target: &mut R, bytes: &[u8]) -> Result<(), DecodeError> {
    decode_from_slice(bytes, |streamer| deserialize(target, streamer))
}

/// Decodes any record without a schema.
///
/// The result keeps wire order and is navigable with [`Value::get`] and
/// [`Value::index`].
pub fn decode_document(streamer: &mut Streamer<'_>) -> Result<RecordValue, DecodeError> {
    read_record_body(streamer, 0)
}

/// Reads a tag, or `None` at the end-of-record marker.
fn read_tag(streamer: &mut Streamer<'_>) -> Result<Option<String>, DecodeError> {
    let len = streamer.read_len(MAX_TAG_LEN, "tag")?;
    if len == 0 {
        return Ok(None);
    }
    let bytes = streamer.read_raw(len, "tag")?;
    String::from_utf8(bytes)
        .map(Some)
        .map_err(|_| DecodeError::InvalidUtf8 { field: "tag" })
}

fn read_record_body(streamer: &mut Streamer<'_>, depth: usize) -> Result<RecordValue, DecodeError> {
    if depth > MAX_DEPTH {
        return Err(DecodeError::DepthExceeded { max: MAX_DEPTH });
    }
    let mut record = RecordValue::new();
    while let Some(tag) = read_tag(streamer)? {
        if record.contains(&tag) {
            return Err(DecodeError::DuplicateTag { tag });
        }
        let wire = streamer.read_wire_type("wire type")?;
        let value = read_payload(streamer, wire, depth)?;
        record.insert(tag, value);
    }
    Ok(record)
}

/// Reads the payload that follows a wire code.
pub(crate) fn read_payload(
    streamer: &mut Streamer<'_>,
    wire: WireType,
    depth: usize,
) -> Result<Value, DecodeError> {
    Ok(match wire {
        WireType::Null => Value::Null,
        WireType::Bool => Value::Bool(streamer.read_bool("bool")?),
        WireType::I8 => Value::I8(streamer.read_i8("i8")?),
        WireType::U8 => Value::U8(streamer.read_u8("u8")?),
        WireType::I16 => Value::I16(streamer.read_i16("i16")?),
        WireType::U16 => Value::U16(streamer.read_u16("u16")?),
        WireType::I32 => Value::I32(streamer.read_i32("i32")?),
        WireType::U32 => Value::U32(streamer.read_u32("u32")?),
        WireType::I64 => Value::I64(streamer.read_i64("i64")?),
        WireType::U64 => Value::U64(streamer.read_u64("u64")?),
        WireType::F32 => Value::F32(streamer.read_f32("f32")?),
        WireType::F64 => Value::F64(streamer.read_f64("f64")?),
        WireType::Decimal => Value::Decimal(streamer.read_decimal("decimal")?),
        WireType::Text => Value::Text(streamer.read_string(MAX_STRING_LEN, "text")?),
        WireType::Bytes => Value::Bytes(streamer.read_bytes_prefixed(MAX_BYTES_LEN, "bytes")?),
        WireType::DateTime => Value::DateTime(streamer.read_datetime("datetime")?),
        WireType::Duration => Value::Duration(streamer.read_duration("duration")?),
        WireType::Guid => Value::Guid(streamer.read_guid("guid")?),
        WireType::Enum => Value::Enum(streamer.read_string(MAX_STRING_LEN, "enum")?),
        WireType::Array | WireType::List => {
            let element = streamer.read_wire_type("element type")?;
            if !is_element_type(element) {
                return Err(DecodeError::InvalidElementType { wire: element });
            }
            let count = streamer.read_len(MAX_ELEMENTS, "elements")?;
            // Capacity is capped; the count is untrusted until elements arrive.
            let mut items = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                items.push(read_payload(streamer, element, depth + 1)?);
            }
            if wire == WireType::Array {
                Value::Array(element, items)
            } else {
                Value::List(element, items)
            }
        }
        WireType::Record => Value::Record(read_record_body(streamer, depth + 1)?),
    })
}
