//! Row schemas: ordered, tagged field definitions built once per type.
//!
//! A record type implements [`Row`] and declares its fields in
//! [`Row::describe`]. Each builder method fixes the field's [`FieldKind`] at
//! build time, so the codec never inspects values to decide their shape.
//!
//! ```rust
//! use slim_codec::model::{Row, SchemaBuilder};
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct Point {
//!     x: i32,
//!     label: Option<String>,
//! }
//!
//! impl Row for Point {
//!     fn describe(schema: &mut SchemaBuilder<Self>) {
//!         schema
//!             .scalar("x", "x", |p| &p.x, |p| &mut p.x)
//!             .nullable("lbl", "label", |p| &p.label, |p| &mut p.label);
//!     }
//! }
//!
//! let bytes = slim_codec::codec::row::to_bytes(&Point { x: 3, label: None }).unwrap();
//! let back: Point = slim_codec::codec::row::from_bytes(&bytes).unwrap();
//! assert_eq!(back, Point { x: 3, label: None });
//! ```

use std::any::{Any, TypeId};
use std::cell::Cell;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, TimeDelta, Utc};
use lazy_static::lazy_static;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::{DecodeError, EncodeError, SchemaError};
use crate::model::{AmorphousStore, Decimal, RecordValue, Value, WireType};
use crate::validate::{validate_schema, FieldSummary};

// =============================================================================
// FIELD VALUE TRAITS
// =============================================================================

/// A single-valued field type with a fixed wire code.
pub trait Scalar: Clone + PartialEq + Send + Sync + 'static {
    /// Wire code written for this type.
    const WIRE: WireType;

    /// True if the value is the type's default and may be omitted.
    fn is_default(&self) -> bool;

    fn to_value(&self) -> Value;

    /// Extracts the value; `value` has already been coerced to [`Self::WIRE`].
    fn from_value(value: Value) -> Option<Self>;
}

macro_rules! impl_scalar {
    ($ty:ty, $variant:ident, $is_default:expr) => {
        impl Scalar for $ty {
            const WIRE: WireType = WireType::$variant;

            fn is_default(&self) -> bool {
                let check: fn(&$ty) -> bool = $is_default;
                check(self)
            }

            fn to_value(&self) -> Value {
                Value::$variant(self.clone())
            }

            fn from_value(value: Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_scalar!(bool, Bool, |v| !*v);
impl_scalar!(i8, I8, |v| *v == 0);
impl_scalar!(u8, U8, |v| *v == 0);
impl_scalar!(i16, I16, |v| *v == 0);
impl_scalar!(u16, U16, |v| *v == 0);
impl_scalar!(i32, I32, |v| *v == 0);
impl_scalar!(u32, U32, |v| *v == 0);
impl_scalar!(i64, I64, |v| *v == 0);
impl_scalar!(u64, U64, |v| *v == 0);
// Bit comparison keeps -0.0 on the wire.
impl_scalar!(f32, F32, |v| v.to_bits() == 0);
impl_scalar!(f64, F64, |v| v.to_bits() == 0);
impl_scalar!(Decimal, Decimal, |v| *v == Decimal::ZERO);
impl_scalar!(String, Text, |v| v.is_empty());
impl_scalar!(Vec<u8>, Bytes, |v| v.is_empty());
impl_scalar!(DateTime<Utc>, DateTime, |v| v.timestamp() == 0
    && v.timestamp_subsec_nanos() == 0);
impl_scalar!(TimeDelta, Duration, |v| v.is_zero());
impl_scalar!(Uuid, Guid, |v| v.is_nil());

/// A finite enumeration encoded by member name.
pub trait RowEnum: Copy + Default + PartialEq + Send + Sync + 'static {
    /// Enumeration name used in error messages.
    const NAME: &'static str;

    fn name(&self) -> &'static str;

    fn from_name(name: &str) -> Option<Self>;
}

/// A record type with a tagged schema.
pub trait Row: Default + Send + Sync + 'static {
    /// Declares the type's fields. Called once per process.
    fn describe(schema: &mut SchemaBuilder<Self>);
}

// =============================================================================
// FIELD KINDS
// =============================================================================

/// Declared wire shape of a field, decided when the schema is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// `S`, omitted when default.
    Scalar(WireType),
    /// `Option<S>`, null written explicitly.
    Nullable(WireType),
    /// `Option<Vec<S>>`; null and empty are distinct.
    Array(WireType),
    /// `Vec<S>`, omitted when empty.
    List(WireType),
    /// `Option<R>` for a nested record type.
    Record(&'static str),
    /// `Option<Vec<R>>`.
    RecordArray(&'static str),
    /// `Vec<R>`.
    RecordList(&'static str),
    /// Enumeration member.
    Enum(&'static str),
}

impl FieldKind {
    /// Returns true if a value arriving with `wire` may be decoded into this field.
    pub fn accepts(&self, wire: WireType) -> bool {
        match *self {
            FieldKind::Scalar(target) => wire.widens_to(target),
            FieldKind::Nullable(target) => wire == WireType::Null || wire.widens_to(target),
            FieldKind::Array(_) | FieldKind::RecordArray(_) => {
                wire == WireType::Null || wire.is_sequence()
            }
            FieldKind::List(_) | FieldKind::RecordList(_) => wire.is_sequence(),
            FieldKind::Record(_) => wire == WireType::Null || wire == WireType::Record,
            FieldKind::Enum(_) => wire == WireType::Enum,
        }
    }

    /// Returns true for kinds backed by `Option`.
    pub fn is_optional(&self) -> bool {
        matches!(
            self,
            FieldKind::Nullable(_)
                | FieldKind::Array(_)
                | FieldKind::Record(_)
                | FieldKind::RecordArray(_)
        )
    }

    /// Scalar element type, for kinds that carry one.
    pub fn element_wire(&self) -> Option<WireType> {
        match *self {
            FieldKind::Scalar(w)
            | FieldKind::Nullable(w)
            | FieldKind::Array(w)
            | FieldKind::List(w) => Some(w),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FieldKind::Scalar(_) => "scalar",
            FieldKind::Nullable(_) => "nullable",
            FieldKind::Array(_) => "array",
            FieldKind::List(_) => "list",
            FieldKind::Record(_) => "record",
            FieldKind::RecordArray(_) => "record array",
            FieldKind::RecordList(_) => "record list",
            FieldKind::Enum(_) => "enum",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Scalar(w) | FieldKind::Nullable(w) => write!(f, "{} {:?}", self.label(), w),
            FieldKind::Array(w) | FieldKind::List(w) => write!(f, "{} of {:?}", self.label(), w),
            FieldKind::Record(name)
            | FieldKind::RecordArray(name)
            | FieldKind::RecordList(name)
            | FieldKind::Enum(name) => write!(f, "{} {}", self.label(), name),
        }
    }
}

// =============================================================================
// FIELD DEFINITIONS
// =============================================================================

type ReadFn<T> = Box<dyn Fn(&T) -> Result<Option<Value>, EncodeError> + Send + Sync>;
type WriteFn<T> = Box<dyn Fn(&mut T, Value) -> Result<(), DecodeError> + Send + Sync>;

/// One field of a schema: backend tag, declared kind and bound attribute.
pub struct FieldDef<T> {
    tag: &'static str,
    name: &'static str,
    kind: FieldKind,
    read: ReadFn<T>,
    write: WriteFn<T>,
}

impl<T: 'static> FieldDef<T> {
    fn new(
        tag: &'static str,
        name: &'static str,
        kind: FieldKind,
        read: impl Fn(&T) -> Result<Option<Value>, EncodeError> + Send + Sync + 'static,
        write: impl Fn(&mut T, Value) -> Result<(), DecodeError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            tag,
            name,
            kind,
            read: Box::new(read),
            write: Box::new(write),
        }
    }
}

impl<T> FieldDef<T> {
    /// Stable backend tag used on the wire.
    pub fn tag(&self) -> &'static str {
        self.tag
    }

    /// In-memory attribute name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Reads the field; `None` means the field is omitted from the wire.
    pub fn read(&self, row: &T) -> Result<Option<Value>, EncodeError> {
        (self.read)(row)
    }

    /// Stores a decoded value that [`FieldKind::accepts`] has already admitted.
    pub fn write(&self, row: &mut T, value: Value) -> Result<(), DecodeError> {
        (self.write)(row, value)
    }
}

impl<T> fmt::Debug for FieldDef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("tag", &self.tag)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

struct AmorphousAccess<T> {
    get: Box<dyn Fn(&T) -> &AmorphousStore + Send + Sync>,
    get_mut: Box<dyn Fn(&mut T) -> &mut AmorphousStore + Send + Sync>,
}

impl<T: 'static> AmorphousAccess<T> {
    fn new<G, M>(get: G, get_mut: M) -> Self
    where
        G: Fn(&T) -> &AmorphousStore + Send + Sync + 'static,
        M: Fn(&mut T) -> &mut AmorphousStore + Send + Sync + 'static,
    {
        Self {
            get: Box::new(get),
            get_mut: Box::new(get_mut),
        }
    }
}

// =============================================================================
// CONVERSIONS
// =============================================================================

fn mismatch(tag: &str, expected: impl fmt::Display, found: WireType) -> DecodeError {
    DecodeError::TypeMismatch {
        field: tag.to_string(),
        expected: expected.to_string(),
        found,
    }
}

fn scalar_from<V: Scalar>(tag: &str, value: Value) -> Result<V, DecodeError> {
    let found = value.wire_type();
    value
        .coerce(V::WIRE)
        .and_then(V::from_value)
        .ok_or_else(|| mismatch(tag, format_args!("{:?}", V::WIRE), found))
}

fn sequence_from<V: Scalar>(tag: &str, value: Value) -> Result<Vec<V>, DecodeError> {
    match value {
        Value::Array(element, items) | Value::List(element, items) => {
            if !element.widens_to(V::WIRE) {
                return Err(mismatch(tag, format_args!("{:?} elements", V::WIRE), element));
            }
            items.into_iter().map(|item| scalar_from(tag, item)).collect()
        }
        other => Err(mismatch(tag, "sequence", other.wire_type())),
    }
}

fn record_from<R: Row>(tag: &str, value: Value) -> Result<R, DecodeError> {
    match value {
        Value::Record(record) => {
            let mut row = R::default();
            apply_record(&mut row, record)?;
            Ok(row)
        }
        other => Err(mismatch(tag, "record", other.wire_type())),
    }
}

fn records_from<R: Row>(tag: &str, value: Value) -> Result<Vec<R>, DecodeError> {
    match value {
        Value::Array(element, items) | Value::List(element, items) => {
            if element != WireType::Record {
                return Err(mismatch(tag, "record elements", element));
            }
            items.into_iter().map(|item| record_from(tag, item)).collect()
        }
        other => Err(mismatch(tag, "sequence", other.wire_type())),
    }
}

fn records_to_values<R: Row>(rows: &[R]) -> Result<Vec<Value>, EncodeError> {
    rows.iter().map(|r| to_record(r).map(Value::Record)).collect()
}

/// Converts a typed row into tag→value form, including amorphous entries.
pub fn to_record<R: Row>(row: &R) -> Result<RecordValue, EncodeError> {
    let schema = Schema::<R>::try_of()?;
    let mut record = RecordValue::new();
    for field in schema.fields() {
        if let Some(value) = field.read(row)? {
            record.insert(field.tag, value);
        }
    }
    if let Some(store) = schema.amorphous(row) {
        for (tag, value) in store.iter() {
            if schema.field(tag).is_none() {
                record.insert(tag, value.clone());
            }
        }
    }
    Ok(record)
}

/// Applies tag→value pairs to a typed row, as the decoder does.
pub fn apply_record<R: Row>(target: &mut R, record: RecordValue) -> Result<(), DecodeError> {
    let schema = Schema::<R>::try_of()?;
    for (tag, value) in record {
        schema.apply(target, tag, value)?;
    }
    Ok(())
}

// =============================================================================
// BUILDER
// =============================================================================

/// Collects a type's field definitions during [`Row::describe`].
pub struct SchemaBuilder<T> {
    type_name: &'static str,
    fields: Vec<FieldDef<T>>,
    amorphous: Option<AmorphousAccess<T>>,
    error: Option<SchemaError>,
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

impl<T: Row> SchemaBuilder<T> {
    fn new() -> Self {
        Self {
            type_name: short_type_name::<T>(),
            fields: Vec::new(),
            amorphous: None,
            error: None,
        }
    }

    /// Overrides the type name used in errors and logs.
    pub fn name(&mut self, type_name: &'static str) -> &mut Self {
        self.type_name = type_name;
        self
    }

    /// A plain scalar field; omitted from the wire when default.
    pub fn scalar<V: Scalar>(
        &mut self,
        tag: &'static str,
        name: &'static str,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
    ) -> &mut Self {
        self.fields.push(FieldDef::new(
            tag,
            name,
            FieldKind::Scalar(V::WIRE),
            move |row| {
                let v = get(row);
                Ok((!v.is_default()).then(|| v.to_value()))
            },
            move |row, value| {
                *get_mut(row) = scalar_from(tag, value)?;
                Ok(())
            },
        ));
        self
    }

    /// An optional scalar; `None` is written as an explicit null.
    pub fn nullable<V: Scalar>(
        &mut self,
        tag: &'static str,
        name: &'static str,
        get: fn(&T) -> &Option<V>,
        get_mut: fn(&mut T) -> &mut Option<V>,
    ) -> &mut Self {
        self.fields.push(FieldDef::new(
            tag,
            name,
            FieldKind::Nullable(V::WIRE),
            move |row| {
                Ok(Some(match get(row) {
                    Some(v) => v.to_value(),
                    None => Value::Null,
                }))
            },
            move |row, value| {
                *get_mut(row) = match value {
                    Value::Null => None,
                    v => Some(scalar_from(tag, v)?),
                };
                Ok(())
            },
        ));
        self
    }

    /// An optional array of scalars; null and empty are distinct.
    pub fn array<V: Scalar>(
        &mut self,
        tag: &'static str,
        name: &'static str,
        get: fn(&T) -> &Option<Vec<V>>,
        get_mut: fn(&mut T) -> &mut Option<Vec<V>>,
    ) -> &mut Self {
        self.fields.push(FieldDef::new(
            tag,
            name,
            FieldKind::Array(V::WIRE),
            move |row| {
                Ok(Some(match get(row) {
                    Some(items) => Value::Array(V::WIRE, items.iter().map(V::to_value).collect()),
                    None => Value::Null,
                }))
            },
            move |row, value| {
                *get_mut(row) = match value {
                    Value::Null => None,
                    v => Some(sequence_from(tag, v)?),
                };
                Ok(())
            },
        ));
        self
    }

    /// A list of scalars; omitted when empty.
    pub fn list<V: Scalar>(
        &mut self,
        tag: &'static str,
        name: &'static str,
        get: fn(&T) -> &Vec<V>,
        get_mut: fn(&mut T) -> &mut Vec<V>,
    ) -> &mut Self {
        self.fields.push(FieldDef::new(
            tag,
            name,
            FieldKind::List(V::WIRE),
            move |row| {
                let items = get(row);
                Ok((!items.is_empty())
                    .then(|| Value::List(V::WIRE, items.iter().map(V::to_value).collect())))
            },
            move |row, value| {
                *get_mut(row) = sequence_from(tag, value)?;
                Ok(())
            },
        ));
        self
    }

    /// An optional nested record.
    pub fn record<R: Row>(
        &mut self,
        tag: &'static str,
        name: &'static str,
        get: fn(&T) -> &Option<R>,
        get_mut: fn(&mut T) -> &mut Option<R>,
    ) -> &mut Self {
        self.fields.push(FieldDef::new(
            tag,
            name,
            FieldKind::Record(short_type_name::<R>()),
            move |row| {
                Ok(Some(match get(row) {
                    Some(inner) => Value::Record(to_record(inner)?),
                    None => Value::Null,
                }))
            },
            move |row, value| {
                *get_mut(row) = match value {
                    Value::Null => None,
                    v => Some(record_from(tag, v)?),
                };
                Ok(())
            },
        ));
        self
    }

    /// An optional array of nested records.
    pub fn record_array<R: Row>(
        &mut self,
        tag: &'static str,
        name: &'static str,
        get: fn(&T) -> &Option<Vec<R>>,
        get_mut: fn(&mut T) -> &mut Option<Vec<R>>,
    ) -> &mut Self {
        self.fields.push(FieldDef::new(
            tag,
            name,
            FieldKind::RecordArray(short_type_name::<R>()),
            move |row| {
                Ok(Some(match get(row) {
                    Some(items) => Value::Array(WireType::Record, records_to_values(items)?),
                    None => Value::Null,
                }))
            },
            move |row, value| {
                *get_mut(row) = match value {
                    Value::Null => None,
                    v => Some(records_from(tag, v)?),
                };
                Ok(())
            },
        ));
        self
    }

    /// A list of nested records; omitted when empty.
    pub fn record_list<R: Row>(
        &mut self,
        tag: &'static str,
        name: &'static str,
        get: fn(&T) -> &Vec<R>,
        get_mut: fn(&mut T) -> &mut Vec<R>,
    ) -> &mut Self {
        self.fields.push(FieldDef::new(
            tag,
            name,
            FieldKind::RecordList(short_type_name::<R>()),
            move |row| {
                let items = get(row);
                if items.is_empty() {
                    return Ok(None);
                }
                Ok(Some(Value::List(WireType::Record, records_to_values(items)?)))
            },
            move |row, value| {
                *get_mut(row) = records_from(tag, value)?;
                Ok(())
            },
        ));
        self
    }

    /// An enumeration field, encoded by member name and omitted when default.
    pub fn enumeration<E: RowEnum>(
        &mut self,
        tag: &'static str,
        name: &'static str,
        get: fn(&T) -> &E,
        get_mut: fn(&mut T) -> &mut E,
    ) -> &mut Self {
        self.fields.push(FieldDef::new(
            tag,
            name,
            FieldKind::Enum(E::NAME),
            move |row| {
                let member = get(row);
                Ok((*member != E::default()).then(|| Value::Enum(member.name().to_string())))
            },
            move |row, value| {
                *get_mut(row) = match value {
                    Value::Enum(member) => E::from_name(&member).ok_or(
                        DecodeError::UnknownEnumMember {
                            enumeration: E::NAME,
                            name: member,
                        },
                    )?,
                    other => return Err(mismatch(tag, E::NAME, other.wire_type())),
                };
                Ok(())
            },
        ));
        self
    }

    /// Opts the type into capturing unknown tags.
    pub fn amorphous(
        &mut self,
        get: fn(&T) -> &AmorphousStore,
        get_mut: fn(&mut T) -> &mut AmorphousStore,
    ) -> &mut Self {
        self.amorphous = Some(AmorphousAccess::new(get, get_mut));
        self
    }

    /// Inherits every field of base type `B`, stored inline in `T`.
    ///
    /// The base's amorphous store is inherited unless `T` declares its own.
    pub fn extend<B: Row>(
        &mut self,
        project: fn(&T) -> &B,
        project_mut: fn(&mut T) -> &mut B,
    ) -> &mut Self {
        let base = match Schema::<B>::try_of() {
            Ok(base) => base,
            Err(e) => {
                self.error.get_or_insert(e);
                return self;
            }
        };
        for field in base.fields() {
            self.fields.push(FieldDef::new(
                field.tag,
                field.name,
                field.kind,
                move |row| field.read(project(row)),
                move |row, value| field.write(project_mut(row), value),
            ));
        }
        if self.amorphous.is_none() {
            if let Some(access) = &base.amorphous {
                self.amorphous = Some(AmorphousAccess::new(
                    move |row: &T| (access.get)(project(row)),
                    move |row: &mut T| (access.get_mut)(project_mut(row)),
                ));
            }
        }
        self
    }

    fn build(self) -> Result<Schema<T>, SchemaError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        validate_schema(
            self.type_name,
            self.fields.iter().map(|f| FieldSummary {
                name: f.name,
                tag: f.tag,
                kind: f.kind,
            }),
        )?;
        let index = self
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.tag, i))
            .collect();
        Ok(Schema {
            type_name: self.type_name,
            fields: self.fields,
            index,
            amorphous: self.amorphous,
        })
    }
}

// =============================================================================
// SCHEMA
// =============================================================================

lazy_static! {
    static ref SCHEMAS: RwLock<FxHashMap<TypeId, &'static (dyn Any + Send + Sync)>> =
        RwLock::new(FxHashMap::default());
    static ref BUILD_LOCK: Mutex<()> = Mutex::new(());
}

thread_local! {
    static BUILDING: Cell<bool> = const { Cell::new(false) };
}

/// Held while a thread builds schemas. Builds nested through `extend` run
/// under the outermost guard of the same thread.
struct BuildGuard {
    _lock: MutexGuard<'static, ()>,
}

impl BuildGuard {
    fn acquire() -> Option<Self> {
        if BUILDING.with(Cell::get) {
            return None;
        }
        let lock = BUILD_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        BUILDING.with(|building| building.set(true));
        Some(Self { _lock: lock })
    }
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        BUILDING.with(|building| building.set(false));
    }
}

fn cached_entry(key: &TypeId) -> Option<&'static (dyn Any + Send + Sync)> {
    SCHEMAS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(key)
        .copied()
}

/// The immutable, process-wide schema of a [`Row`] type.
pub struct Schema<T> {
    type_name: &'static str,
    fields: Vec<FieldDef<T>>,
    index: FxHashMap<&'static str, usize>,
    amorphous: Option<AmorphousAccess<T>>,
}

impl<T: Row> Schema<T> {
    /// Returns the cached schema for `T`, building it on first use.
    ///
    /// `describe` runs at most once per type, even when threads race on
    /// first use.
    pub fn try_of() -> Result<&'static Schema<T>, SchemaError> {
        let key = TypeId::of::<T>();
        if let Some(entry) = cached_entry(&key) {
            return Ok(downcast(entry));
        }

        let _build = BuildGuard::acquire();
        if let Some(entry) = cached_entry(&key) {
            return Ok(downcast(entry));
        }

        let mut builder = SchemaBuilder::<T>::new();
        T::describe(&mut builder);
        let schema = builder.build()?;
        debug!(
            type_name = schema.type_name,
            fields = schema.fields.len(),
            amorphous = schema.amorphous.is_some(),
            "row schema built"
        );

        let leaked: &'static Schema<T> = Box::leak(Box::new(schema));
        SCHEMAS
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, leaked as &'static (dyn Any + Send + Sync));
        Ok(leaked)
    }
}

fn downcast<T: Row>(entry: &'static (dyn Any + Send + Sync)) -> &'static Schema<T> {
    // SAFETY: entries are keyed by TypeId::of::<T>() and only ever hold Schema<T>
    entry
        .downcast_ref::<Schema<T>>()
        .expect("schema cache entry matches its TypeId")
}

impl<T> Schema<T> {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Field definitions in declaration order (base fields first).
    pub fn fields(&self) -> &[FieldDef<T>] {
        &self.fields
    }

    /// Looks up a field by backend tag.
    pub fn field(&self, tag: &str) -> Option<&FieldDef<T>> {
        self.index.get(tag).map(|&i| &self.fields[i])
    }

    /// Returns true if unknown tags are captured rather than dropped.
    pub fn supports_amorphous(&self) -> bool {
        self.amorphous.is_some()
    }

    pub fn amorphous<'r>(&self, row: &'r T) -> Option<&'r AmorphousStore> {
        self.amorphous.as_ref().map(|access| (access.get)(row))
    }

    pub fn amorphous_mut<'r>(&self, row: &'r mut T) -> Option<&'r mut AmorphousStore> {
        self.amorphous.as_ref().map(|access| (access.get_mut)(row))
    }

    /// Routes one decoded tag/value pair into `target`.
    pub(crate) fn apply(&self, target: &mut T, tag: String, value: Value) -> Result<(), DecodeError> {
        match self.field(&tag) {
            Some(field) => {
                let found = value.wire_type();
                if !field.kind.accepts(found) {
                    return Err(mismatch(field.tag, field.kind, found));
                }
                field.write(target, value)
            }
            None => {
                self.capture(target, tag, value);
                Ok(())
            }
        }
    }

    /// Stores an unknown tag in the amorphous store, or drops it.
    pub(crate) fn capture(&self, target: &mut T, tag: String, value: Value) {
        match self.amorphous_mut(target) {
            Some(store) => {
                trace!(type_name = self.type_name, tag = %tag, "unknown tag captured");
                store.insert(tag, value);
            }
            None => trace!(type_name = self.type_name, tag = %tag, "unknown tag dropped"),
        }
    }
}

impl<T> fmt::Debug for Schema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("type_name", &self.type_name)
            .field("fields", &self.fields)
            .field("amorphous", &self.amorphous.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Base {
        id: i64,
        extra: AmorphousStore,
    }

    impl Row for Base {
        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema
                .scalar("id", "id", |r| &r.id, |r| &mut r.id)
                .amorphous(|r| &r.extra, |r| &mut r.extra);
        }
    }

    #[derive(Debug, Default, PartialEq)]
    struct Derived {
        base: Base,
        label: Option<String>,
    }

    impl Row for Derived {
        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema
                .extend(|r| &r.base, |r| &mut r.base)
                .nullable("lbl", "label", |r| &r.label, |r| &mut r.label);
        }
    }

    #[derive(Debug, Default)]
    struct Broken {
        a: i32,
        b: i32,
    }

    impl Row for Broken {
        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema
                .scalar("x", "a", |r| &r.a, |r| &mut r.a)
                .scalar("x", "b", |r| &r.b, |r| &mut r.b);
        }
    }

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    enum Shade {
        #[default]
        Light,
        Dark,
    }

    impl RowEnum for Shade {
        const NAME: &'static str = "Shade";

        fn name(&self) -> &'static str {
            match self {
                Shade::Light => "Light",
                Shade::Dark => "Dark",
            }
        }

        fn from_name(name: &str) -> Option<Self> {
            match name {
                "Light" => Some(Shade::Light),
                "Dark" => Some(Shade::Dark),
                _ => None,
            }
        }
    }

    #[derive(Debug, Default)]
    struct Painted {
        shade: Shade,
    }

    impl Row for Painted {
        fn describe(schema: &mut SchemaBuilder<Self>) {
            schema.enumeration("s", "shade", |r| &r.shade, |r| &mut r.shade);
        }
    }

    #[test]
    fn test_schema_is_cached() {
        let a = Schema::<Base>::try_of().unwrap();
        let b = Schema::<Base>::try_of().unwrap();
        assert!(std::ptr::eq(a, b));
        assert_eq!(a.type_name(), "Base");
    }

    static RACED_DESCRIBES: AtomicUsize = AtomicUsize::new(0);

    #[derive(Debug, Default)]
    struct Raced {
        base: Base,
        n: u16,
    }

    impl Row for Raced {
        fn describe(schema: &mut SchemaBuilder<Self>) {
            RACED_DESCRIBES.fetch_add(1, Ordering::SeqCst);
            schema
                .extend(|r| &r.base, |r| &mut r.base)
                .scalar("n", "n", |r| &r.n, |r| &mut r.n);
        }
    }

    #[test]
    fn test_schema_built_once_under_contention() {
        let barrier = Barrier::new(8);
        let schemas: Vec<usize> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        Schema::<Raced>::try_of().unwrap() as *const Schema<Raced> as usize
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(schemas.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(RACED_DESCRIBES.load(Ordering::SeqCst), 1);
        assert_eq!(Schema::<Raced>::try_of().unwrap().fields().len(), 2);
    }

    #[test]
    fn test_derived_extends_base() {
        let schema = Schema::<Derived>::try_of().unwrap();
        let tags: Vec<_> = schema.fields().iter().map(FieldDef::tag).collect();
        assert_eq!(tags, vec!["id", "lbl"]);
        assert!(schema.supports_amorphous());

        let mut row = Derived::default();
        schema.apply(&mut row, "id".into(), Value::I64(9)).unwrap();
        schema.apply(&mut row, "zz".into(), Value::Bool(true)).unwrap();
        assert_eq!(row.base.id, 9);
        assert_eq!(row.base.extra.get("zz"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_invalid_schema_not_cached() {
        assert!(matches!(
            Schema::<Broken>::try_of(),
            Err(SchemaError::DuplicateTag { .. })
        ));
        assert!(Schema::<Broken>::try_of().is_err());
    }

    #[test]
    fn test_field_kind_accepts() {
        assert!(FieldKind::Scalar(WireType::I64).accepts(WireType::I32));
        assert!(!FieldKind::Scalar(WireType::I32).accepts(WireType::Null));
        assert!(FieldKind::Nullable(WireType::I32).accepts(WireType::Null));
        assert!(FieldKind::List(WireType::Text).accepts(WireType::Array));
        assert!(!FieldKind::List(WireType::Text).accepts(WireType::Null));
        assert!(FieldKind::Record("R").accepts(WireType::Null));
        assert!(!FieldKind::Enum("E").accepts(WireType::Text));
    }

    #[test]
    fn test_enum_members() {
        let schema = Schema::<Painted>::try_of().unwrap();
        let mut row = Painted::default();
        assert_eq!(schema.fields()[0].read(&row).unwrap(), None);

        schema.apply(&mut row, "s".into(), Value::Enum("Dark".into())).unwrap();
        assert_eq!(row.shade, Shade::Dark);

        let err = schema
            .apply(&mut row, "s".into(), Value::Enum("Plaid".into()))
            .unwrap_err();
        assert!(matches!(err, DecodeError::UnknownEnumMember { .. }));
    }

    #[test]
    fn test_scalar_mismatch_is_not_coerced() {
        let schema = Schema::<Base>::try_of().unwrap();
        let mut row = Base::default();
        let err = schema
            .apply(&mut row, "id".into(), Value::Text("9".into()))
            .unwrap_err();
        assert!(matches!(
            err,
            DecodeError::TypeMismatch { found: WireType::Text, .. }
        ));
    }
}
