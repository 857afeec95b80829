//! Graph type definitions and the catalog that resolves them by name.
//!
//! A [`TypeDef`] describes the wire-relevant shape of a class or struct type.
//! Its checksum is what writer and reader compare to detect that they
//! disagree about a type.

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};
use sha2::{Digest, Sha256};

use crate::error::SchemaError;
use crate::limits::{MAX_FIELDS, MAX_TYPES};
use crate::model::{Slot, WireType};

/// Whether instances are shared by reference or copied by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Instances are graph nodes and take part in reference tracking.
    Class,
    /// Instances are copied into each slot that holds them.
    Struct,
}

impl TypeKind {
    pub fn label(self) -> &'static str {
        match self {
            TypeKind::Class => "class",
            TypeKind::Struct => "struct",
        }
    }
}

/// What a graph type field may hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeclaredKind {
    /// Any slot.
    Any,
    /// Null or a scalar of exactly this wire type.
    Scalar(WireType),
    /// Null or a node reference.
    Ref,
    /// An instance of the named struct type.
    Struct(String),
}

impl DeclaredKind {
    /// Returns true if `slot` may be stored in a field of this kind.
    pub fn accepts(&self, slot: &Slot) -> bool {
        match (self, slot) {
            (DeclaredKind::Any, _) => true,
            (DeclaredKind::Scalar(_) | DeclaredKind::Ref, Slot::Null) => true,
            (DeclaredKind::Scalar(wire), Slot::Scalar(v)) => v.wire_type() == *wire,
            (DeclaredKind::Ref, Slot::Ref(_)) => true,
            (DeclaredKind::Struct(name), Slot::Struct(s)) => s.type_name == *name,
            _ => false,
        }
    }
}

impl fmt::Display for DeclaredKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclaredKind::Any => f.write_str("any"),
            DeclaredKind::Scalar(wire) => write!(f, "{:?}", wire),
            DeclaredKind::Ref => f.write_str("reference"),
            DeclaredKind::Struct(name) => write!(f, "struct {}", name),
        }
    }
}

/// A named field of a graph type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldShape {
    pub name: String,
    pub kind: DeclaredKind,
}

/// The wire-relevant shape of a graph type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeDef {
    name: String,
    kind: TypeKind,
    fields: Vec<FieldShape>,
}

impl TypeDef {
    /// Starts a class (reference) type.
    pub fn class(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Class,
            fields: Vec::new(),
        }
    }

    /// Starts a struct (value) type.
    pub fn structure(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Struct,
            fields: Vec::new(),
        }
    }

    /// Appends a field.
    pub fn field(mut self, name: impl Into<String>, kind: DeclaredKind) -> Self {
        self.fields.push(FieldShape {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    pub fn fields(&self) -> &[FieldShape] {
        &self.fields
    }

    /// Position of a field by name.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Shape checksum: the first 8 bytes (LE) of SHA-256 over the canonical
    /// shape encoding.
    ///
    /// ```text
    /// shape := str(name) kind_byte u32(field_count) { str(field) kind }*
    /// kind  := 0x00 | 0x01 wire_code | 0x02 | 0x03 str(struct_name)
    /// str   := u32(len) utf8
    /// ```
    pub fn checksum(&self) -> u64 {
        let mut hasher = Sha256::new();
        hash_str(&mut hasher, &self.name);
        hasher.update([match self.kind {
            TypeKind::Class => 0u8,
            TypeKind::Struct => 1u8,
        }]);
        hasher.update((self.fields.len() as u32).to_le_bytes());
        for field in &self.fields {
            hash_str(&mut hasher, &field.name);
            match &field.kind {
                DeclaredKind::Any => hasher.update([0x00]),
                DeclaredKind::Scalar(wire) => hasher.update([0x01, *wire as u8]),
                DeclaredKind::Ref => hasher.update([0x02]),
                DeclaredKind::Struct(name) => {
                    hasher.update([0x03]);
                    hash_str(&mut hasher, name);
                }
            }
        }
        let hash = hasher.finalize();

        let mut first = [0u8; 8];
        first.copy_from_slice(&hash[..8]);
        u64::from_le_bytes(first)
    }

    fn validate(&self) -> Result<(), SchemaError> {
        if self.name.is_empty() {
            return Err(SchemaError::EmptyTypeName);
        }
        if self.fields.len() > MAX_FIELDS {
            return Err(SchemaError::TooManyFields {
                name: self.name.clone(),
                count: self.fields.len(),
                max: MAX_FIELDS,
            });
        }
        let mut seen = FxHashSet::default();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    name: self.name.clone(),
                    field: field.name.clone(),
                });
            }
        }
        Ok(())
    }
}

fn hash_str(hasher: &mut Sha256, s: &str) {
    hasher.update((s.len() as u32).to_le_bytes());
    hasher.update(s.as_bytes());
}

/// Every graph type a serializer can write or read.
///
/// Types added with [`TypeCatalog::register_known`] are pre-registered in
/// every registry, in the order they were added; other types are registered
/// on first use.
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
    types: Vec<TypeDef>,
    checksums: Vec<u64>,
    index: FxHashMap<String, usize>,
    known: Vec<usize>,
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a type resolved by name on first use. Returns its catalog index.
    pub fn register(&mut self, def: TypeDef) -> Result<usize, SchemaError> {
        def.validate()?;
        if self.index.contains_key(&def.name) {
            return Err(SchemaError::DuplicateType { name: def.name });
        }
        if self.types.len() >= MAX_TYPES {
            return Err(SchemaError::CatalogFull { max: MAX_TYPES });
        }
        let index = self.types.len();
        self.index.insert(def.name.clone(), index);
        self.checksums.push(def.checksum());
        self.types.push(def);
        Ok(index)
    }

    /// Adds a type that every registry starts with.
    pub fn register_known(&mut self, def: TypeDef) -> Result<usize, SchemaError> {
        let index = self.register(def)?;
        self.known.push(index);
        Ok(index)
    }

    /// Resolves a type name to its catalog index.
    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Resolves a type name to its index, definition and checksum.
    pub fn find(&self, name: &str) -> Option<(usize, &TypeDef, u64)> {
        let index = self.lookup(name)?;
        Some((index, &self.types[index], self.checksums[index]))
    }

    pub fn get(&self, index: usize) -> Option<&TypeDef> {
        self.types.get(index)
    }

    /// Cached [`TypeDef::checksum`] of the type at `index`.
    pub fn checksum(&self, index: usize) -> Option<u64> {
        self.checksums.get(index).copied()
    }

    /// Catalog indices of pre-registered types, in registration order.
    pub fn known(&self) -> &[usize] {
        &self.known
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{StructValue, Value};

    fn person() -> TypeDef {
        TypeDef::class("Person")
            .field("name", DeclaredKind::Scalar(WireType::Text))
            .field("friend", DeclaredKind::Ref)
    }

    #[test]
    fn test_checksum_is_deterministic() {
        assert_eq!(person().checksum(), person().checksum());
    }

    #[test]
    fn test_checksum_tracks_shape() {
        let base = person().checksum();
        let renamed = TypeDef::class("Person")
            .field("title", DeclaredKind::Scalar(WireType::Text))
            .field("friend", DeclaredKind::Ref);
        let retyped = TypeDef::class("Person")
            .field("name", DeclaredKind::Scalar(WireType::Bytes))
            .field("friend", DeclaredKind::Ref);
        let as_struct = TypeDef::structure("Person")
            .field("name", DeclaredKind::Scalar(WireType::Text))
            .field("friend", DeclaredKind::Ref);
        let extended = person().field("age", DeclaredKind::Scalar(WireType::I32));

        for other in [renamed, retyped, as_struct, extended] {
            assert_ne!(other.checksum(), base, "{:?}", other);
        }
    }

    #[test]
    fn test_catalog_rejects_duplicates() {
        let mut catalog = TypeCatalog::new();
        assert_eq!(catalog.register(person()), Ok(0));
        assert!(matches!(
            catalog.register(person()),
            Err(SchemaError::DuplicateType { .. })
        ));
        assert!(matches!(
            catalog.register(TypeDef::class("")),
            Err(SchemaError::EmptyTypeName)
        ));
        let doubled = TypeDef::class("Twice")
            .field("a", DeclaredKind::Any)
            .field("a", DeclaredKind::Ref);
        assert!(matches!(
            catalog.register(doubled),
            Err(SchemaError::DuplicateField { .. })
        ));
    }

    #[test]
    fn test_known_types_keep_order() {
        let mut catalog = TypeCatalog::new();
        catalog.register(person()).unwrap();
        catalog.register_known(TypeDef::class("B")).unwrap();
        catalog.register_known(TypeDef::class("A")).unwrap();
        assert_eq!(catalog.known(), &[1, 2]);
        assert_eq!(catalog.lookup("A"), Some(2));
        assert_eq!(catalog.checksum(0), Some(person().checksum()));
    }

    #[test]
    fn test_declared_kind_accepts() {
        assert!(DeclaredKind::Scalar(WireType::I32).accepts(&Slot::Scalar(Value::I32(1))));
        assert!(!DeclaredKind::Scalar(WireType::I32).accepts(&Slot::Scalar(Value::I64(1))));
        assert!(DeclaredKind::Ref.accepts(&Slot::Null));
        let point = Slot::Struct(StructValue::new("Point", vec![]));
        assert!(DeclaredKind::Struct("Point".into()).accepts(&point));
        assert!(!DeclaredKind::Struct("Point".into()).accepts(&Slot::Null));
        assert!(!DeclaredKind::Ref.accepts(&point));
    }
}
