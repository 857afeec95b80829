//! Wire type codes and loosely-typed values.
//!
//! [`Value`] is what the row codec reads off the wire before a field setter
//! sees it, what amorphous stores hold, and what graph scalar slots carry.

use chrono::{DateTime, TimeDelta, Utc};
use rustc_hash::FxHashMap;
use uuid::Uuid;

use crate::model::Decimal;

/// Wire type codes (one byte on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WireType {
    Bool = 0x01,
    I8 = 0x02,
    U8 = 0x03,
    I16 = 0x04,
    U16 = 0x05,
    I32 = 0x06,
    U32 = 0x07,
    I64 = 0x08,
    U64 = 0x09,
    F32 = 0x0A,
    F64 = 0x0B,
    Decimal = 0x0C,
    Text = 0x0D,
    Bytes = 0x0E,
    DateTime = 0x0F,
    Duration = 0x10,
    Guid = 0x11,
    /// Enumeration member, encoded by name.
    Enum = 0x12,
    /// Explicit null marker; carries no payload.
    Null = 0x20,
    Array = 0x21,
    List = 0x22,
    /// Nested record.
    Record = 0x23,
}

impl WireType {
    /// Creates a WireType from its wire representation.
    pub fn from_u8(v: u8) -> Option<WireType> {
        match v {
            0x01 => Some(WireType::Bool),
            0x02 => Some(WireType::I8),
            0x03 => Some(WireType::U8),
            0x04 => Some(WireType::I16),
            0x05 => Some(WireType::U16),
            0x06 => Some(WireType::I32),
            0x07 => Some(WireType::U32),
            0x08 => Some(WireType::I64),
            0x09 => Some(WireType::U64),
            0x0A => Some(WireType::F32),
            0x0B => Some(WireType::F64),
            0x0C => Some(WireType::Decimal),
            0x0D => Some(WireType::Text),
            0x0E => Some(WireType::Bytes),
            0x0F => Some(WireType::DateTime),
            0x10 => Some(WireType::Duration),
            0x11 => Some(WireType::Guid),
            0x12 => Some(WireType::Enum),
            0x20 => Some(WireType::Null),
            0x21 => Some(WireType::Array),
            0x22 => Some(WireType::List),
            0x23 => Some(WireType::Record),
            _ => None,
        }
    }

    /// Returns true for single-value kinds (everything but null, sequences and records).
    pub fn is_scalar(self) -> bool {
        (self as u8) < 0x20
    }

    /// Returns true for array and list codes.
    pub fn is_sequence(self) -> bool {
        matches!(self, WireType::Array | WireType::List)
    }

    /// Returns true if a value of this type may be stored as `self` without loss.
    ///
    /// Identity always holds. Beyond that only integer and float widening
    /// is allowed; text never becomes a number and so on.
    pub fn widens_to(self, target: WireType) -> bool {
        use WireType::*;
        if self == target {
            return true;
        }
        matches!(
            (self, target),
            (I8, I16 | I32 | I64)
                | (U8, U16 | U32 | U64 | I16 | I32 | I64)
                | (I16, I32 | I64)
                | (U16, U32 | U64 | I32 | I64)
                | (I32, I64)
                | (U32, U64 | I64)
                | (F32, F64)
        )
    }
}

/// Ordered tag→value pairs of a record read without a schema.
///
/// Used for amorphous stores and for nested records in transit. Tags are
/// indexed so decoding a record with many tags stays linear.
#[derive(Debug, Clone, Default)]
pub struct RecordValue {
    fields: Vec<(String, Value)>,
    index: FxHashMap<String, usize>,
}

/// Side store on a record for tags its schema does not recognise.
pub type AmorphousStore = RecordValue;

impl RecordValue {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a value by tag.
    pub fn get(&self, tag: &str) -> Option<&Value> {
        let i = *self.index.get(tag)?;
        Some(&self.fields[i].1)
    }

    /// Returns true if `tag` is present.
    pub fn contains(&self, tag: &str) -> bool {
        self.index.contains_key(tag)
    }

    /// Inserts or replaces the value stored under `tag`. A replaced entry
    /// keeps its position.
    pub fn insert(&mut self, tag: impl Into<String>, value: Value) -> Option<Value> {
        let tag = tag.into();
        match self.index.get(&tag) {
            Some(&i) => Some(std::mem::replace(&mut self.fields[i].1, value)),
            None => {
                self.index.insert(tag.clone(), self.fields.len());
                self.fields.push((tag, value));
                None
            }
        }
    }

    /// Removes the value stored under `tag`.
    pub fn remove(&mut self, tag: &str) -> Option<Value> {
        let pos = self.index.remove(tag)?;
        let (_, value) = self.fields.remove(pos);
        for i in self.index.values_mut() {
            if *i > pos {
                *i -= 1;
            }
        }
        Some(value)
    }

    /// Iterates over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(t, v)| (t.as_str(), v))
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Removes all entries.
    pub fn clear(&mut self) {
        self.fields.clear();
        self.index.clear();
    }
}

impl PartialEq for RecordValue {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl IntoIterator for RecordValue {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl FromIterator<(String, Value)> for RecordValue {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut record = RecordValue::new();
        for (tag, value) in iter {
            record.insert(tag, value);
        }
        record
    }
}

/// A loosely-typed value as it appears on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    DateTime(DateTime<Utc>),
    Duration(TimeDelta),
    Guid(Uuid),
    /// Enumeration member name.
    Enum(String),
    /// Homogeneous array; the code names the element type.
    Array(WireType, Vec<Value>),
    /// Homogeneous list; the code names the element type.
    List(WireType, Vec<Value>),
    Record(RecordValue),
}

impl Value {
    /// Returns the wire type code of this value.
    pub fn wire_type(&self) -> WireType {
        match self {
            Value::Null => WireType::Null,
            Value::Bool(_) => WireType::Bool,
            Value::I8(_) => WireType::I8,
            Value::U8(_) => WireType::U8,
            Value::I16(_) => WireType::I16,
            Value::U16(_) => WireType::U16,
            Value::I32(_) => WireType::I32,
            Value::U32(_) => WireType::U32,
            Value::I64(_) => WireType::I64,
            Value::U64(_) => WireType::U64,
            Value::F32(_) => WireType::F32,
            Value::F64(_) => WireType::F64,
            Value::Decimal(_) => WireType::Decimal,
            Value::Text(_) => WireType::Text,
            Value::Bytes(_) => WireType::Bytes,
            Value::DateTime(_) => WireType::DateTime,
            Value::Duration(_) => WireType::Duration,
            Value::Guid(_) => WireType::Guid,
            Value::Enum(_) => WireType::Enum,
            Value::Array(..) => WireType::Array,
            Value::List(..) => WireType::List,
            Value::Record(_) => WireType::Record,
        }
    }

    /// Returns true for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Converts this value into `target` if [`WireType::widens_to`] allows it.
    pub fn coerce(self, target: WireType) -> Option<Value> {
        let source = self.wire_type();
        if source == target {
            return Some(self);
        }
        if !source.widens_to(target) {
            return None;
        }
        if let Value::F32(v) = self {
            return Some(Value::F64(v as f64));
        }
        let n = self.as_i128()?;
        Some(match target {
            WireType::I16 => Value::I16(i16::try_from(n).ok()?),
            WireType::U16 => Value::U16(u16::try_from(n).ok()?),
            WireType::I32 => Value::I32(i32::try_from(n).ok()?),
            WireType::U32 => Value::U32(u32::try_from(n).ok()?),
            WireType::I64 => Value::I64(i64::try_from(n).ok()?),
            WireType::U64 => Value::U64(u64::try_from(n).ok()?),
            _ => return None,
        })
    }

    fn as_i128(&self) -> Option<i128> {
        Some(match *self {
            Value::I8(v) => v as i128,
            Value::U8(v) => v as i128,
            Value::I16(v) => v as i128,
            Value::U16(v) => v as i128,
            Value::I32(v) => v as i128,
            Value::U32(v) => v as i128,
            Value::I64(v) => v as i128,
            Value::U64(v) => v as i128,
            _ => return None,
        })
    }

    /// Returns any integer value as i64, if it fits.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_i128().and_then(|n| i64::try_from(n).ok())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Enum(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&RecordValue> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// Returns the elements of an array or list.
    pub fn elements(&self) -> Option<&[Value]> {
        match self {
            Value::Array(_, items) | Value::List(_, items) => Some(items),
            _ => None,
        }
    }

    /// Navigates into a record by tag.
    pub fn get(&self, tag: &str) -> Option<&Value> {
        self.as_record()?.get(tag)
    }

    /// Navigates into an array or list by position.
    pub fn index(&self, i: usize) -> Option<&Value> {
        self.elements()?.get(i)
    }
}
