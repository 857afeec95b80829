//! Object graphs held in an arena.
//!
//! Reference-typed data lives in [`Node`]s owned by a [`Graph`] and addressed
//! by [`NodeId`]. A [`Slot`] either holds data by value or points at a node,
//! so shared and cyclic references are just repeated ids.

use std::borrow::Cow;

use rustc_hash::FxHashMap;

use crate::model::Value;
use crate::util::NdArray;

/// Index of a node within its [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One field, array cell, map value or root of a graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Slot {
    #[default]
    Null,
    /// A scalar value (wire codes below 0x20).
    Scalar(Value),
    /// Reference to a node; identity is the node id.
    Ref(NodeId),
    /// An instance of a struct type, always copied by value.
    Struct(StructValue),
}

impl Slot {
    pub fn is_null(&self) -> bool {
        matches!(self, Slot::Null)
    }

    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Slot::Ref(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Slot::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            Slot::Struct(v) => Some(v),
            _ => None,
        }
    }
}

impl From<Value> for Slot {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Slot::Null,
            other => Slot::Scalar(other),
        }
    }
}

impl From<NodeId> for Slot {
    fn from(id: NodeId) -> Self {
        Slot::Ref(id)
    }
}

/// A by-value instance of a struct type.
#[derive(Debug, Clone, PartialEq)]
pub struct StructValue {
    pub type_name: String,
    /// Field slots in the type's declared order.
    pub fields: Vec<Slot>,
}

impl StructValue {
    pub fn new(type_name: impl Into<String>, fields: Vec<Slot>) -> Self {
        Self {
            type_name: type_name.into(),
            fields,
        }
    }
}

/// An instance of a class type.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectNode {
    pub type_name: String,
    /// Field slots in the type's declared order.
    pub fields: Vec<Slot>,
}

impl ObjectNode {
    pub fn new(type_name: impl Into<String>, fields: Vec<Slot>) -> Self {
        Self {
            type_name: type_name.into(),
            fields,
        }
    }

    pub fn field(&self, index: usize) -> Option<&Slot> {
        self.fields.get(index)
    }
}

/// How map keys are compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum KeyComparison {
    /// Keys match only when byte-for-byte equal.
    #[default]
    Ordinal,
    /// Keys match when equal after Unicode lowercasing.
    IgnoreCase,
}

impl KeyComparison {
    pub fn to_u8(self) -> u8 {
        match self {
            KeyComparison::Ordinal => 0,
            KeyComparison::IgnoreCase => 1,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(KeyComparison::Ordinal),
            1 => Some(KeyComparison::IgnoreCase),
            _ => None,
        }
    }

    /// The form under which two keys compare equal.
    pub fn normalize<'k>(self, key: &'k str) -> Cow<'k, str> {
        match self {
            KeyComparison::Ordinal => Cow::Borrowed(key),
            KeyComparison::IgnoreCase => Cow::Owned(key.to_lowercase()),
        }
    }
}

/// A text-keyed map whose key comparison is part of its value.
#[derive(Debug, Clone, Default)]
pub struct GraphMap {
    comparison: KeyComparison,
    entries: Vec<(String, Slot)>,
    index: FxHashMap<String, usize>,
}

impl GraphMap {
    pub fn new(comparison: KeyComparison) -> Self {
        Self {
            comparison,
            entries: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    pub fn comparison(&self) -> KeyComparison {
        self.comparison
    }

    /// Inserts or replaces an entry. A replaced entry keeps its original key
    /// spelling and position.
    pub fn insert(&mut self, key: impl Into<String>, slot: Slot) -> Option<Slot> {
        let key = key.into();
        let normalized = self.comparison.normalize(&key).into_owned();
        match self.index.get(&normalized) {
            Some(&i) => Some(std::mem::replace(&mut self.entries[i].1, slot)),
            None => {
                self.index.insert(normalized, self.entries.len());
                self.entries.push((key, slot));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Slot> {
        let i = *self.index.get(self.comparison.normalize(key).as_ref())?;
        Some(&self.entries[i].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(self.comparison.normalize(key).as_ref())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Slot)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl PartialEq for GraphMap {
    fn eq(&self, other: &Self) -> bool {
        self.comparison == other.comparison && self.entries == other.entries
    }
}

/// A reference-typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Object(ObjectNode),
    /// A rectangular array of any rank.
    Array(NdArray<Slot>),
    Map(GraphMap),
}

impl Node {
    pub fn as_object(&self) -> Option<&ObjectNode> {
        match self {
            Node::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&NdArray<Slot>> {
        match self {
            Node::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&GraphMap> {
        match self {
            Node::Map(m) => Some(m),
            _ => None,
        }
    }
}

/// An arena of nodes plus the root slot.
///
/// Decoding reserves a node's id before its body is read, so a node may
/// refer to itself or to an ancestor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    nodes: Vec<Option<Node>>,
    root: Slot,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a graph whose root is `root`.
    pub fn with_root(root: impl Into<Slot>) -> Self {
        Self {
            nodes: Vec::new(),
            root: root.into(),
        }
    }

    /// Adds a node and returns its id.
    pub fn add(&mut self, node: Node) -> NodeId {
        self.nodes.push(Some(node));
        NodeId(self.nodes.len() - 1)
    }

    /// Adds an object node.
    pub fn add_object(&mut self, type_name: impl Into<String>, fields: Vec<Slot>) -> NodeId {
        self.add(Node::Object(ObjectNode::new(type_name, fields)))
    }

    /// Reserves an id whose node is supplied later with [`Graph::fill`].
    pub(crate) fn reserve(&mut self) -> NodeId {
        self.nodes.push(None);
        NodeId(self.nodes.len() - 1)
    }

    pub(crate) fn fill(&mut self, id: NodeId, node: Node) {
        if let Some(entry) = self.nodes.get_mut(id.0) {
            *entry = Some(node);
        }
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Shorthand for an object node's field.
    pub fn field(&self, id: NodeId, index: usize) -> Option<&Slot> {
        self.node(id)?.as_object()?.field(index)
    }

    pub fn root(&self) -> &Slot {
        &self.root
    }

    pub fn set_root(&mut self, root: impl Into<Slot>) {
        self.root = root.into();
    }

    /// Number of node ids handed out.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|n| (NodeId(i), n)))
    }
}
