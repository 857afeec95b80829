//! Data model types for the row and graph codecs.
//!
//! This module contains:
//! - Wire type codes and dynamic values
//! - Decimals
//! - Row schemas (tagged field definitions)
//! - Object graphs (arena of nodes addressed by id)
//! - Graph type definitions and catalogs

pub mod decimal;
pub mod graph;
pub mod schema;
pub mod types;
pub mod value;

pub use decimal::Decimal;
pub use graph::{Graph, GraphMap, KeyComparison, Node, NodeId, ObjectNode, Slot, StructValue};
pub use schema::{
    apply_record, to_record, FieldDef, FieldKind, Row, RowEnum, Scalar, Schema, SchemaBuilder,
};
pub use types::{DeclaredKind, FieldShape, TypeCatalog, TypeDef, TypeKind};
pub use value::{AmorphousStore, RecordValue, Value, WireType};
