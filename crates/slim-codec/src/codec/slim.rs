//! Object-graph encoding/decoding.
//!
//! ```text
//! payload  := registry_header slot
//! slot     := 0x00                          null
//!           | 0x01 code scalar              scalar value
//!           | 0x02 varint(index) node       first visit of a node
//!           | 0x03 varint(index)            later visit of a node
//!           | 0x04 type_ref slot*           struct value (one slot per field)
//! node     := 0x01 type_ref slot*           object
//!           | 0x02 varint(rank) varint(dim)* slot*   array, row-major
//!           | 0x03 comparison varint(count) (str slot)*   map
//! type_ref := varint(0) str(name) u64(checksum)   first use in scope
//!           | varint(handle + 1)
//! ```
//!
//! [`SlimSerializer`] uses a fresh registry per call and can be shared across
//! threads. [`BatchSession`] keeps its registry across calls and must be
//! mirrored call for call by the session on the other side.

use std::sync::Arc;

use tracing::debug;

use crate::codec::frame::{self, PayloadKind};
use crate::codec::primitives::{decode_from_slice, encode_to_vec, Streamer};
use crate::codec::refs::{ReadRefs, Visit, WriteRefs};
use crate::codec::registry::{RegistryMode, TypeRegistry};
use crate::codec::row::{read_payload, write_payload};
use crate::error::{DecodeError, EncodeError};
use crate::limits::{MAX_DEPTH, MAX_ELEMENTS, MAX_RANK, MAX_STRING_LEN, MAX_TYPES};
use crate::model::{
    Graph, GraphMap, KeyComparison, Node, ObjectNode, Slot, StructValue, TypeCatalog, TypeDef,
    TypeKind, WireType,
};
use crate::util::{element_count, walk_read, walk_write};

const SLOT_NULL: u8 = 0x00;
const SLOT_SCALAR: u8 = 0x01;
const SLOT_NEW_REF: u8 = 0x02;
const SLOT_BACK_REF: u8 = 0x03;
const SLOT_STRUCT: u8 = 0x04;

const NODE_OBJECT: u8 = 0x01;
const NODE_ARRAY: u8 = 0x02;
const NODE_MAP: u8 = 0x03;

/// Limits applied while encoding and decoding graphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlimOptions {
    /// Maximum nesting of references and struct values.
    pub max_depth: usize,
    /// Maximum cells in one array or entries in one map.
    pub max_elements: usize,
}

impl Default for SlimOptions {
    fn default() -> Self {
        Self {
            max_depth: MAX_DEPTH,
            max_elements: MAX_ELEMENTS,
        }
    }
}

// =============================================================================
// SERIALIZERS
// =============================================================================

/// Graph serializer with a per-call type registry.
///
/// Holds no per-call state, so one instance may serve concurrent calls.
#[derive(Debug, Clone)]
pub struct SlimSerializer {
    catalog: Arc<TypeCatalog>,
    options: SlimOptions,
}

impl SlimSerializer {
    pub fn new(catalog: Arc<TypeCatalog>) -> Self {
        Self::with_options(catalog, SlimOptions::default())
    }

    pub fn with_options(catalog: Arc<TypeCatalog>, options: SlimOptions) -> Self {
        Self { catalog, options }
    }

    pub fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    pub fn options(&self) -> SlimOptions {
        self.options
    }

    /// Encodes `graph` onto a bound streamer.
    pub fn serialize(&self, graph: &Graph, streamer: &mut Streamer<'_>) -> Result<(), EncodeError> {
        let mut registry = TypeRegistry::new(RegistryMode::PerCall, &self.catalog);
        encode_graph(&self.catalog, &mut registry, self.options, graph, streamer)
    }

    /// Decodes a graph from a bound streamer.
    pub fn deserialize(&self, streamer: &mut Streamer<'_>) -> Result<Graph, DecodeError> {
        let mut registry = TypeRegistry::new(RegistryMode::PerCall, &self.catalog);
        decode_graph(&self.catalog, &mut registry, self.options, streamer)
    }

    pub fn to_bytes(&self, graph: &Graph) -> Result<Vec<u8>, EncodeError> {
        encode_to_vec(|s| self.serialize(graph, s))
    }

    pub fn from_bytes(&self, bytes: &[u8]) -> Result<Graph, DecodeError> {
        decode_from_slice(bytes, |s| self.deserialize(s))
    }

    /// Encodes `graph` inside a plain `SLIM` frame.
    pub fn encode_framed(&self, graph: &Graph) -> Result<Vec<u8>, EncodeError> {
        frame::wrap(PayloadKind::Graph, &self.to_bytes(graph)?)
    }

    /// Encodes `graph` inside a zstd-compressed `SLIMZ` frame.
    pub fn encode_framed_compressed(&self, graph: &Graph, level: i32) -> Result<Vec<u8>, EncodeError> {
        frame::wrap_compressed(PayloadKind::Graph, &self.to_bytes(graph)?, level)
    }

    /// Decodes a graph from either frame form.
    pub fn decode_framed(&self, bytes: &[u8]) -> Result<Graph, DecodeError> {
        let payload = frame::unwrap(PayloadKind::Graph, bytes)?;
        self.from_bytes(&payload)
    }

    /// Starts a session whose registry persists across calls.
    pub fn batch(&self) -> BatchSession {
        BatchSession {
            registry: TypeRegistry::new(RegistryMode::Batch, &self.catalog),
            catalog: Arc::clone(&self.catalog),
            options: self.options,
        }
    }
}

/// Graph serializer whose type registry persists across calls.
///
/// A writer session and a reader session must see the same calls in the same
/// order, and be reset together. After a failed call, reset both sides.
#[derive(Debug)]
pub struct BatchSession {
    catalog: Arc<TypeCatalog>,
    options: SlimOptions,
    registry: TypeRegistry,
}

impl BatchSession {
    pub fn serialize(&mut self, graph: &Graph, streamer: &mut Streamer<'_>) -> Result<(), EncodeError> {
        encode_graph(&self.catalog, &mut self.registry, self.options, graph, streamer)
    }

    pub fn deserialize(&mut self, streamer: &mut Streamer<'_>) -> Result<Graph, DecodeError> {
        decode_graph(&self.catalog, &mut self.registry, self.options, streamer)
    }

    pub fn to_bytes(&mut self, graph: &Graph) -> Result<Vec<u8>, EncodeError> {
        encode_to_vec(|s| self.serialize(graph, s))
    }

    pub fn from_bytes(&mut self, bytes: &[u8]) -> Result<Graph, DecodeError> {
        decode_from_slice(bytes, |s| self.deserialize(s))
    }

    /// True if the last call registered a type this session hadn't seen.
    pub fn new_types_registered(&self) -> bool {
        self.registry.new_types_registered()
    }

    /// Number of types currently holding a handle.
    pub fn registered_types(&self) -> usize {
        self.registry.len()
    }

    /// Forgets every type registered since the session started.
    pub fn reset(&mut self) {
        self.registry.reset(&self.catalog);
    }
}

// =============================================================================
// ENCODING
// =============================================================================

fn encode_graph(
    catalog: &TypeCatalog,
    registry: &mut TypeRegistry,
    options: SlimOptions,
    graph: &Graph,
    streamer: &mut Streamer<'_>,
) -> Result<(), EncodeError> {
    registry.begin_call(catalog);
    registry.write_header(streamer, catalog)?;
    let mut encoder = Encoder {
        catalog,
        registry,
        options,
        graph,
        refs: WriteRefs::default(),
    };
    encoder.write_slot(streamer, graph.root(), 0)
}

struct Encoder<'a> {
    catalog: &'a TypeCatalog,
    registry: &'a mut TypeRegistry,
    options: SlimOptions,
    graph: &'a Graph,
    refs: WriteRefs,
}

impl<'a> Encoder<'a> {
    fn write_slot(
        &mut self,
        streamer: &mut Streamer<'_>,
        slot: &Slot,
        depth: usize,
    ) -> Result<(), EncodeError> {
        if depth > self.options.max_depth {
            return Err(EncodeError::DepthExceeded {
                max: self.options.max_depth,
            });
        }
        match slot {
            Slot::Null => streamer.write_u8(SLOT_NULL),
            Slot::Scalar(value) => {
                let wire = value.wire_type();
                if !wire.is_scalar() {
                    return Err(EncodeError::UnsupportedSlotValue { value: wire });
                }
                streamer.write_u8(SLOT_SCALAR)?;
                streamer.write_wire_type(wire)?;
                write_payload(streamer, "slot", value, depth)
            }
            Slot::Ref(id) => {
                let graph = self.graph;
                let node = graph
                    .node(*id)
                    .ok_or(EncodeError::DanglingReference { index: id.index() })?;
                match self.refs.visit(*id) {
                    Visit::Back(index) => {
                        streamer.write_u8(SLOT_BACK_REF)?;
                        streamer.write_varint(index as u64)
                    }
                    Visit::New(index) => {
                        streamer.write_u8(SLOT_NEW_REF)?;
                        streamer.write_varint(index as u64)?;
                        self.write_node(streamer, node, depth + 1)
                    }
                }
            }
            Slot::Struct(value) => {
                streamer.write_u8(SLOT_STRUCT)?;
                let def = self.write_type_ref(streamer, &value.type_name, TypeKind::Struct)?;
                self.write_fields(streamer, def, &value.fields, depth + 1)
            }
        }
    }

    fn write_node(
        &mut self,
        streamer: &mut Streamer<'_>,
        node: &Node,
        depth: usize,
    ) -> Result<(), EncodeError> {
        match node {
            Node::Object(object) => {
                streamer.write_u8(NODE_OBJECT)?;
                let def = self.write_type_ref(streamer, &object.type_name, TypeKind::Class)?;
                self.write_fields(streamer, def, &object.fields, depth)
            }
            Node::Array(array) => {
                if array.rank() > MAX_RANK {
                    return Err(EncodeError::LengthExceedsLimit {
                        field: "rank",
                        len: array.rank(),
                        max: MAX_RANK,
                    });
                }
                if array.len() > self.options.max_elements {
                    return Err(EncodeError::LengthExceedsLimit {
                        field: "array elements",
                        len: array.len(),
                        max: self.options.max_elements,
                    });
                }
                streamer.write_u8(NODE_ARRAY)?;
                streamer.write_varint(array.rank() as u64)?;
                for &dim in array.shape() {
                    streamer.write_varint(dim as u64)?;
                }
                walk_write(array, |_, slot| self.write_slot(streamer, slot, depth))
            }
            Node::Map(map) => {
                streamer.write_u8(NODE_MAP)?;
                streamer.write_u8(map.comparison().to_u8())?;
                streamer.write_len(map.len(), self.options.max_elements, "map entries")?;
                for (key, slot) in map.iter() {
                    streamer.write_string(key, MAX_STRING_LEN, "map key")?;
                    self.write_slot(streamer, slot, depth)?;
                }
                Ok(())
            }
        }
    }

    /// Writes a type reference, registering the type on first use.
    fn write_type_ref(
        &mut self,
        streamer: &mut Streamer<'_>,
        name: &str,
        expected: TypeKind,
    ) -> Result<&'a TypeDef, EncodeError> {
        let catalog = self.catalog;
        let (index, def, checksum) = catalog.find(name).ok_or_else(|| EncodeError::UnknownType {
            name: name.to_string(),
        })?;
        if def.kind() != expected {
            return Err(EncodeError::WrongTypeKind {
                name: name.to_string(),
                expected: expected.label(),
                found: def.kind().label(),
            });
        }
        match self.registry.handle_of(index) {
            Some(handle) => streamer.write_varint(handle as u64 + 1)?,
            None => {
                self.registry
                    .register(index, catalog)
                    .ok_or(EncodeError::TooManyTypes { max: MAX_TYPES })?;
                streamer.write_varint(0)?;
                streamer.write_string(def.name(), MAX_STRING_LEN, "type name")?;
                streamer.write_u64(checksum)?;
            }
        }
        Ok(def)
    }

    fn write_fields(
        &mut self,
        streamer: &mut Streamer<'_>,
        def: &TypeDef,
        fields: &[Slot],
        depth: usize,
    ) -> Result<(), EncodeError> {
        if fields.len() != def.fields().len() {
            return Err(EncodeError::FieldCountMismatch {
                type_name: def.name().to_string(),
                expected: def.fields().len(),
                actual: fields.len(),
            });
        }
        for (shape, slot) in def.fields().iter().zip(fields) {
            if !shape.kind.accepts(slot) {
                return Err(EncodeError::FieldTypeMismatch {
                    type_name: def.name().to_string(),
                    field: shape.name.clone(),
                    expected: shape.kind.to_string(),
                });
            }
            self.write_slot(streamer, slot, depth)?;
        }
        Ok(())
    }
}

// =============================================================================
// DECODING
// =============================================================================

fn decode_graph(
    catalog: &TypeCatalog,
    registry: &mut TypeRegistry,
    options: SlimOptions,
    streamer: &mut Streamer<'_>,
) -> Result<Graph, DecodeError> {
    registry.begin_call(catalog);
    registry.check_header(streamer, catalog)?;
    let mut decoder = Decoder {
        catalog,
        registry,
        options,
        graph: Graph::new(),
        refs: ReadRefs::default(),
    };
    let root = decoder.read_slot(streamer, 0)?;
    let mut graph = decoder.graph;
    graph.set_root(root);
    Ok(graph)
}

struct Decoder<'a> {
    catalog: &'a TypeCatalog,
    registry: &'a mut TypeRegistry,
    options: SlimOptions,
    graph: Graph,
    refs: ReadRefs,
}

/// Wire type reported for a slot in type mismatch errors.
fn slot_wire(slot: &Slot) -> WireType {
    match slot {
        Slot::Null => WireType::Null,
        Slot::Scalar(v) => v.wire_type(),
        Slot::Ref(_) | Slot::Struct(_) => WireType::Record,
    }
}

impl<'a> Decoder<'a> {
    fn read_slot(&mut self, streamer: &mut Streamer<'_>, depth: usize) -> Result<Slot, DecodeError> {
        if depth > self.options.max_depth {
            return Err(DecodeError::DepthExceeded {
                max: self.options.max_depth,
            });
        }
        Ok(match streamer.read_u8("slot marker")? {
            SLOT_NULL => Slot::Null,
            SLOT_SCALAR => {
                let wire = streamer.read_wire_type("scalar type")?;
                if !wire.is_scalar() {
                    return Err(DecodeError::MalformedEncoding {
                        context: "scalar slot holds a non-scalar wire type",
                    });
                }
                Slot::Scalar(read_payload(streamer, wire, depth)?)
            }
            SLOT_NEW_REF => {
                let index = streamer.read_varint("reference index")?;
                // Reserved before the body so the body may refer back to it.
                let id = self.graph.reserve();
                self.refs.assign(index, id)?;
                let node = self.read_node(streamer, depth + 1)?;
                self.graph.fill(id, node);
                Slot::Ref(id)
            }
            SLOT_BACK_REF => {
                let index = streamer.read_varint("reference index")?;
                Slot::Ref(self.refs.resolve(index)?)
            }
            SLOT_STRUCT => {
                let def = self.read_type_ref(streamer, TypeKind::Struct)?;
                let fields = self.read_fields(streamer, def, depth + 1)?;
                Slot::Struct(StructValue::new(def.name(), fields))
            }
            value => {
                return Err(DecodeError::InvalidMarker {
                    context: "slot",
                    value,
                })
            }
        })
    }

    fn read_node(&mut self, streamer: &mut Streamer<'_>, depth: usize) -> Result<Node, DecodeError> {
        Ok(match streamer.read_u8("node kind")? {
            NODE_OBJECT => {
                let def = self.read_type_ref(streamer, TypeKind::Class)?;
                let fields = self.read_fields(streamer, def, depth)?;
                Node::Object(ObjectNode::new(def.name(), fields))
            }
            NODE_ARRAY => {
                let max = self.options.max_elements;
                let rank = streamer.read_len(MAX_RANK, "rank")?;
                if rank == 0 {
                    return Err(DecodeError::MalformedEncoding {
                        context: "array of rank 0",
                    });
                }
                let mut shape = Vec::with_capacity(rank);
                for _ in 0..rank {
                    shape.push(streamer.read_len(max, "dimension")?);
                }
                let len = element_count(&shape).unwrap_or(usize::MAX);
                if len > max {
                    return Err(DecodeError::LengthExceedsLimit {
                        field: "array elements",
                        len,
                        max,
                    });
                }
                Node::Array(walk_read(shape, |_| self.read_slot(streamer, depth))?)
            }
            NODE_MAP => {
                let value = streamer.read_u8("key comparison")?;
                let comparison = KeyComparison::from_u8(value).ok_or(DecodeError::InvalidMarker {
                    context: "key comparison",
                    value,
                })?;
                let count = streamer.read_len(self.options.max_elements, "map entries")?;
                let mut map = GraphMap::new(comparison);
                for _ in 0..count {
                    let key = streamer.read_string(MAX_STRING_LEN, "map key")?;
                    if map.contains_key(&key) {
                        return Err(DecodeError::DuplicateMapKey { key });
                    }
                    let slot = self.read_slot(streamer, depth)?;
                    map.insert(key, slot);
                }
                Node::Map(map)
            }
            value => {
                return Err(DecodeError::InvalidMarker {
                    context: "node",
                    value,
                })
            }
        })
    }

    /// Reads a type reference, registering inline types after checking them
    /// against the local catalog.
    fn read_type_ref(
        &mut self,
        streamer: &mut Streamer<'_>,
        expected: TypeKind,
    ) -> Result<&'a TypeDef, DecodeError> {
        let catalog = self.catalog;
        let handle = match streamer.read_varint("type handle")? {
            0 => {
                let name = streamer.read_string(MAX_STRING_LEN, "type name")?;
                let found = streamer.read_u64("type checksum")?;
                let Some((index, _, local)) = catalog.find(&name) else {
                    return Err(DecodeError::UnknownType { name });
                };
                if self.registry.handle_of(index).is_some() {
                    return Err(DecodeError::TypeAlreadyRegistered { name });
                }
                if found != local {
                    let handle = self.registry.len();
                    debug!(type_name = %name, handle, "inline type checksum mismatch");
                    return Err(DecodeError::RegistryChecksumMismatch {
                        handle,
                        type_name: name,
                        expected: local,
                        found,
                    });
                }
                self.registry
                    .register(index, catalog)
                    .ok_or(DecodeError::LengthExceedsLimit {
                        field: "registry",
                        len: self.registry.len() + 1,
                        max: MAX_TYPES,
                    })?
            }
            n => usize::try_from(n - 1).unwrap_or(usize::MAX),
        };

        let def = self
            .registry
            .type_at(handle)
            .and_then(|index| catalog.get(index))
            .ok_or(DecodeError::UnknownTypeHandle {
                handle,
                size: self.registry.len(),
            })?;
        if def.kind() != expected {
            return Err(DecodeError::WrongTypeKind {
                name: def.name().to_string(),
                expected: expected.label(),
                found: def.kind().label(),
            });
        }
        Ok(def)
    }

    fn read_fields(
        &mut self,
        streamer: &mut Streamer<'_>,
        def: &TypeDef,
        depth: usize,
    ) -> Result<Vec<Slot>, DecodeError> {
        let mut fields = Vec::with_capacity(def.fields().len());
        for shape in def.fields() {
            let slot = self.read_slot(streamer, depth)?;
            if !shape.kind.accepts(&slot) {
                return Err(DecodeError::TypeMismatch {
                    field: format!("{}.{}", def.name(), shape.name),
                    expected: shape.kind.to_string(),
                    found: slot_wire(&slot),
                });
            }
            fields.push(slot);
        }
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::model::{DeclaredKind, Value};
    use crate::util::NdArray;

    fn catalog() -> Arc<TypeCatalog> {
        let mut catalog = TypeCatalog::new();
        catalog
            .register(
                TypeDef::class("Node")
                    .field("label", DeclaredKind::Scalar(WireType::Text))
                    .field("next", DeclaredKind::Ref),
            )
            .unwrap();
        catalog
            .register(
                TypeDef::structure("Point")
                    .field("x", DeclaredKind::Scalar(WireType::I32))
                    .field("y", DeclaredKind::Scalar(WireType::I32)),
            )
            .unwrap();
        Arc::new(catalog)
    }

    fn text(s: &str) -> Slot {
        Slot::Scalar(Value::Text(s.to_string()))
    }

    fn point(x: i32, y: i32) -> Slot {
        Slot::Struct(StructValue::new(
            "Point",
            vec![Slot::Scalar(Value::I32(x)), Slot::Scalar(Value::I32(y))],
        ))
    }

    #[test]
    fn test_serializer_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SlimSerializer>();
    }

    #[test]
    fn test_scalar_root() {
        let serializer = SlimSerializer::new(catalog());
        let graph = Graph::with_root(Value::I64(-5));
        let bytes = serializer.to_bytes(&graph).unwrap();
        assert_eq!(bytes, vec![0, SLOT_SCALAR, WireType::I64 as u8, 0xFB, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(serializer.from_bytes(&bytes).unwrap(), graph);
    }

    #[test]
    fn test_self_cycle() {
        let serializer = SlimSerializer::new(catalog());
        let mut graph = Graph::new();
        let id = graph.add_object("Node", vec![text("loop"), Slot::Null]);
        if let Some(Node::Object(o)) = graph.node_mut(id) {
            o.fields[1] = Slot::Ref(id);
        }
        graph.set_root(id);

        let back = serializer.from_bytes(&serializer.to_bytes(&graph).unwrap()).unwrap();
        let root = back.root().as_node().unwrap();
        assert_eq!(back.field(root, 1), Some(&Slot::Ref(root)));
        assert_eq!(back.field(root, 0), Some(&text("loop")));
    }

    #[test]
    fn test_struct_values_are_copied() {
        let mut catalog = TypeCatalog::new();
        catalog
            .register(
                TypeDef::structure("Point")
                    .field("x", DeclaredKind::Scalar(WireType::I32))
                    .field("y", DeclaredKind::Scalar(WireType::I32)),
            )
            .unwrap();
        let serializer = SlimSerializer::new(Arc::new(catalog));
        let mut graph = Graph::new();
        let cells = NdArray::from_elements(vec![point(1, 2), point(1, 2)]);
        let id = graph.add(Node::Array(cells));
        graph.set_root(id);

        let back = serializer.from_bytes(&serializer.to_bytes(&graph).unwrap()).unwrap();
        assert_eq!(back.len(), 1);
        let array = back.node(back.root().as_node().unwrap()).and_then(Node::as_array).unwrap();
        assert_eq!(array.as_slice(), &[point(1, 2), point(1, 2)]);
    }

    #[test]
    fn test_unknown_type_on_encode() {
        let serializer = SlimSerializer::new(catalog());
        let mut graph = Graph::new();
        let id = graph.add_object("Ghost", vec![]);
        graph.set_root(id);
        let err = serializer.to_bytes(&graph).unwrap_err();
        assert!(matches!(err, EncodeError::UnknownType { .. }));
        assert_eq!(err.code(), ErrorCode::Usage);
    }

    #[test]
    fn test_field_violations_on_encode() {
        let serializer = SlimSerializer::new(catalog());

        let mut graph = Graph::new();
        let id = graph.add_object("Node", vec![text("only one")]);
        graph.set_root(id);
        assert!(matches!(
            serializer.to_bytes(&graph),
            Err(EncodeError::FieldCountMismatch { expected: 2, actual: 1, .. })
        ));

        let mut graph = Graph::new();
        let id = graph.add_object("Node", vec![Slot::Scalar(Value::I32(1)), Slot::Null]);
        graph.set_root(id);
        assert!(matches!(
            serializer.to_bytes(&graph),
            Err(EncodeError::FieldTypeMismatch { .. })
        ));

        let mut graph = Graph::new();
        let id = graph.add_object("Point", vec![]);
        graph.set_root(id);
        assert!(matches!(
            serializer.to_bytes(&graph),
            Err(EncodeError::WrongTypeKind { .. })
        ));
    }

    #[test]
    fn test_dangling_reference() {
        let serializer = SlimSerializer::new(catalog());
        let mut other = Graph::new();
        other.add_object("Node", vec![text("a"), Slot::Null]);
        let stray = other.add_object("Node", vec![text("b"), Slot::Null]);
        let graph = Graph::with_root(stray);
        assert!(matches!(
            serializer.to_bytes(&graph),
            Err(EncodeError::DanglingReference { index: 1 })
        ));
    }

    #[test]
    fn test_back_reference_before_assignment() {
        let serializer = SlimSerializer::new(catalog());
        let bytes = vec![0, SLOT_BACK_REF, 0];
        assert!(matches!(
            serializer.from_bytes(&bytes),
            Err(DecodeError::InvalidBackReference { index: 0, size: 0 })
        ));
    }

    #[test]
    fn test_invalid_slot_marker() {
        let serializer = SlimSerializer::new(catalog());
        assert!(matches!(
            serializer.from_bytes(&[0, 0x09]),
            Err(DecodeError::InvalidMarker { context: "slot", value: 0x09 })
        ));
    }

    #[test]
    fn test_depth_limit() {
        let options = SlimOptions {
            max_depth: 4,
            ..Default::default()
        };
        let serializer = SlimSerializer::with_options(catalog(), options);
        let mut graph = Graph::new();
        let mut next = Slot::Null;
        for i in 0..10 {
            next = Slot::Ref(graph.add_object("Node", vec![text(&i.to_string()), next]));
        }
        graph.set_root(next);
        assert!(matches!(
            serializer.to_bytes(&graph),
            Err(EncodeError::DepthExceeded { max: 4 })
        ));
    }

    #[test]
    fn test_framed_roundtrip() {
        let serializer = SlimSerializer::new(catalog());
        let mut graph = Graph::new();
        let id = graph.add_object("Node", vec![text("framed"), Slot::Null]);
        graph.set_root(id);

        let plain = serializer.encode_framed(&graph).unwrap();
        assert_eq!(&plain[0..4], b"SLIM");
        assert_eq!(serializer.decode_framed(&plain).unwrap(), graph);

        let compressed = serializer.encode_framed_compressed(&graph, 3).unwrap();
        assert_eq!(&compressed[0..5], b"SLIMZ");
        assert_eq!(serializer.decode_framed(&compressed).unwrap(), graph);
    }
}
