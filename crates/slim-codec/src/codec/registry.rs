//! Type registry: maps catalog types to compact per-scope handles.
//!
//! Each graph payload starts with the registry as it stood when the call
//! began:
//!
//! ```text
//! header := varint(count) u64(checksum)*count
//! ```
//!
//! The reader compares the header against its own registry. A different
//! count or a different checksum at any handle means the two sides no
//! longer agree, and the call fails before any value is read.

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::codec::primitives::Streamer;
use crate::error::{DecodeError, EncodeError};
use crate::limits::MAX_TYPES;
use crate::model::TypeCatalog;

/// Lifetime of a registry's handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryMode {
    /// Handles are discarded at the end of every call.
    PerCall,
    /// Handles persist across calls until [`TypeRegistry::reset`].
    Batch,
}

/// Handle assignments for one scope.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    mode: RegistryMode,
    /// Handle to catalog index.
    handles: Vec<usize>,
    /// Catalog index to handle.
    by_type: FxHashMap<usize, usize>,
    registered_this_call: bool,
}

impl TypeRegistry {
    /// Creates a registry seeded with the catalog's known types.
    pub fn new(mode: RegistryMode, catalog: &TypeCatalog) -> Self {
        let mut registry = Self {
            mode,
            handles: Vec::new(),
            by_type: FxHashMap::default(),
            registered_this_call: false,
        };
        registry.seed(catalog);
        registry
    }

    fn seed(&mut self, catalog: &TypeCatalog) {
        self.handles.clear();
        self.by_type.clear();
        for &index in catalog.known() {
            self.by_type.insert(index, self.handles.len());
            self.handles.push(index);
        }
    }

    pub fn mode(&self) -> RegistryMode {
        self.mode
    }

    /// Number of handles assigned.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn handle_of(&self, type_index: usize) -> Option<usize> {
        self.by_type.get(&type_index).copied()
    }

    /// Catalog index behind a handle.
    pub fn type_at(&self, handle: usize) -> Option<usize> {
        self.handles.get(handle).copied()
    }

    /// True if the last call assigned at least one new handle.
    pub fn new_types_registered(&self) -> bool {
        self.registered_this_call
    }

    /// Prepares for a serialize or deserialize call.
    pub fn begin_call(&mut self, catalog: &TypeCatalog) {
        if self.mode == RegistryMode::PerCall {
            self.seed(catalog);
        }
        self.registered_this_call = false;
    }

    /// Drops every handle beyond the known types.
    pub fn reset(&mut self, catalog: &TypeCatalog) {
        debug!(mode = ?self.mode, dropped = self.handles.len(), "type registry reset");
        self.seed(catalog);
        self.registered_this_call = false;
    }

    /// Assigns the next handle to a type not yet in the registry.
    pub fn register(&mut self, type_index: usize, catalog: &TypeCatalog) -> Option<usize> {
        if self.by_type.contains_key(&type_index) || self.handles.len() >= MAX_TYPES {
            return None;
        }
        let handle = self.handles.len();
        self.by_type.insert(type_index, handle);
        self.handles.push(type_index);
        self.registered_this_call = true;
        debug!(
            type_name = catalog.get(type_index).map(|t| t.name()).unwrap_or_default(),
            handle,
            mode = ?self.mode,
            "type registered"
        );
        Some(handle)
    }

    /// Writes the registry header.
    pub fn write_header(
        &self,
        streamer: &mut Streamer<'_>,
        catalog: &TypeCatalog,
    ) -> Result<(), EncodeError> {
        streamer.write_varint(self.handles.len() as u64)?;
        for &index in &self.handles {
            let checksum = catalog.checksum(index).ok_or(EncodeError::UnknownType {
                name: format!("#{}", index),
            })?;
            streamer.write_u64(checksum)?;
        }
        Ok(())
    }

    /// Reads a registry header and checks it against this registry.
    pub fn check_header(
        &self,
        streamer: &mut Streamer<'_>,
        catalog: &TypeCatalog,
    ) -> Result<(), DecodeError> {
        let found = streamer.read_len(MAX_TYPES, "registry count")?;
        if found != self.handles.len() {
            debug!(
                expected = self.handles.len(),
                found,
                mode = ?self.mode,
                "registry count mismatch"
            );
            return Err(DecodeError::RegistryCountMismatch {
                expected: self.handles.len(),
                found,
            });
        }
        for (handle, &index) in self.handles.iter().enumerate() {
            let found = streamer.read_u64("registry checksum")?;
            let expected = catalog.checksum(index).unwrap_or_default();
            if found != expected {
                let type_name = catalog
                    .get(index)
                    .map(|t| t.name().to_string())
                    .unwrap_or_default();
                debug!(%type_name, handle, mode = ?self.mode, "registry checksum mismatch");
                return Err(DecodeError::RegistryChecksumMismatch {
                    handle,
                    type_name,
                    expected,
                    found,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::primitives::{decode_from_slice, encode_to_vec};
    use crate::model::{DeclaredKind, TypeDef, WireType};

    fn catalog() -> TypeCatalog {
        let mut catalog = TypeCatalog::new();
        catalog.register_known(TypeDef::class("Known")).unwrap();
        catalog
            .register(TypeDef::class("Late").field("v", DeclaredKind::Scalar(WireType::I32)))
            .unwrap();
        catalog
    }

    #[test]
    fn test_seeded_with_known_types() {
        let catalog = catalog();
        let registry = TypeRegistry::new(RegistryMode::Batch, &catalog);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.handle_of(0), Some(0));
        assert_eq!(registry.handle_of(1), None);
    }

    #[test]
    fn test_per_call_forgets_between_calls() {
        let catalog = catalog();
        let mut registry = TypeRegistry::new(RegistryMode::PerCall, &catalog);
        registry.begin_call(&catalog);
        assert_eq!(registry.register(1, &catalog), Some(1));
        assert!(registry.new_types_registered());
        registry.begin_call(&catalog);
        assert_eq!(registry.len(), 1);
        assert!(!registry.new_types_registered());
    }

    #[test]
    fn test_batch_keeps_handles_until_reset() {
        let catalog = catalog();
        let mut registry = TypeRegistry::new(RegistryMode::Batch, &catalog);
        registry.begin_call(&catalog);
        registry.register(1, &catalog);
        registry.begin_call(&catalog);
        assert_eq!(registry.handle_of(1), Some(1));
        assert_eq!(registry.register(1, &catalog), None);
        assert!(!registry.new_types_registered());
        registry.reset(&catalog);
        assert_eq!(registry.handle_of(1), None);
    }

    #[test]
    fn test_header_mismatch() {
        let catalog = catalog();
        let mut writer = TypeRegistry::new(RegistryMode::Batch, &catalog);
        writer.register(1, &catalog);
        let header = encode_to_vec(|s| writer.write_header(s, &catalog)).unwrap();

        let reader = TypeRegistry::new(RegistryMode::Batch, &catalog);
        let err = decode_from_slice(&header, |s| reader.check_header(s, &catalog)).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::RegistryCountMismatch { expected: 1, found: 2 }
        ));

        let mut other = TypeCatalog::new();
        other
            .register_known(TypeDef::class("Known").field("x", DeclaredKind::Any))
            .unwrap();
        let header = encode_to_vec(|s| {
            TypeRegistry::new(RegistryMode::PerCall, &catalog).write_header(s, &catalog)
        })
        .unwrap();
        let reader = TypeRegistry::new(RegistryMode::PerCall, &other);
        let err = decode_from_slice(&header, |s| reader.check_header(s, &other)).unwrap_err();
        assert!(err.to_string().contains("CSUM mismatch"));
    }
}
