//! Graph codec: reference identity, cycles, maps, arrays and registries.

use std::sync::Arc;

use slim_codec::error::DecodeError;
use slim_codec::model::{
    DeclaredKind, Graph, GraphMap, KeyComparison, Node, NodeId, Slot, StructValue, TypeCatalog,
    TypeDef, Value, WireType,
};
use slim_codec::{NdArray, SlimSerializer};

fn person() -> TypeDef {
    TypeDef::class("Person")
        .field("name", DeclaredKind::Scalar(WireType::Text))
        .field("friend", DeclaredKind::Ref)
        .field("best", DeclaredKind::Ref)
}

fn holder() -> TypeDef {
    TypeDef::class("Holder").field("items", DeclaredKind::Ref)
}

fn point() -> TypeDef {
    TypeDef::structure("Point")
        .field("x", DeclaredKind::Scalar(WireType::I32))
        .field("y", DeclaredKind::Scalar(WireType::I32))
}

fn catalog_with(defs: impl IntoIterator<Item = TypeDef>) -> Arc<TypeCatalog> {
    let mut catalog = TypeCatalog::new();
    for def in defs {
        catalog.register(def).unwrap();
    }
    Arc::new(catalog)
}

fn serializer() -> SlimSerializer {
    SlimSerializer::new(catalog_with([person(), holder(), point()]))
}

fn text(s: &str) -> Slot {
    Slot::Scalar(Value::Text(s.to_string()))
}

fn root_id(graph: &Graph) -> NodeId {
    graph.root().as_node().unwrap()
}

fn name_of(graph: &Graph, id: NodeId) -> &str {
    graph.field(id, 0).and_then(Slot::as_scalar).and_then(Value::as_str).unwrap()
}

fn person_graph() -> Graph {
    let mut graph = Graph::new();
    let p = graph.add_object("Person", vec![text("p"), Slot::Null, Slot::Null]);
    graph.set_root(p);
    graph
}

fn holder_graph() -> Graph {
    let mut graph = Graph::new();
    let h = graph.add_object("Holder", vec![Slot::Null]);
    graph.set_root(h);
    graph
}

fn point_graph() -> Graph {
    Graph::with_root(Slot::Struct(StructValue::new(
        "Point",
        vec![Slot::Scalar(Value::I32(1)), Slot::Scalar(Value::I32(2))],
    )))
}

#[test]
fn test_shared_reference_stays_shared() {
    let mut graph = Graph::new();
    let bob = graph.add_object("Person", vec![text("bob"), Slot::Null, Slot::Null]);
    let alice = graph.add_object("Person", vec![text("alice"), bob.into(), bob.into()]);
    graph.set_root(alice);

    let serializer = serializer();
    let back = serializer.from_bytes(&serializer.to_bytes(&graph).unwrap()).unwrap();

    let root = root_id(&back);
    assert_eq!(name_of(&back, root), "alice");
    let friend = back.field(root, 1).and_then(Slot::as_node).unwrap();
    let best = back.field(root, 2).and_then(Slot::as_node).unwrap();
    assert_eq!(friend, best);
    assert_eq!(name_of(&back, friend), "bob");
    assert_eq!(back.len(), 2);
}

#[test]
fn test_equal_but_distinct_nodes_stay_distinct() {
    let mut graph = Graph::new();
    let a = graph.add_object("Person", vec![text("same"), Slot::Null, Slot::Null]);
    let b = graph.add_object("Person", vec![text("same"), Slot::Null, Slot::Null]);
    let root = graph.add_object("Person", vec![text("root"), a.into(), b.into()]);
    graph.set_root(root);

    let serializer = serializer();
    let back = serializer.from_bytes(&serializer.to_bytes(&graph).unwrap()).unwrap();
    let root = root_id(&back);
    assert_ne!(back.field(root, 1), back.field(root, 2));
    assert_eq!(back.len(), 3);
}

#[test]
fn test_mutual_cycle() {
    let mut graph = Graph::new();
    let a = graph.add_object("Person", vec![text("a"), Slot::Null, Slot::Null]);
    let b = graph.add_object("Person", vec![text("b"), a.into(), Slot::Null]);
    if let Some(Node::Object(obj)) = graph.node_mut(a) {
        obj.fields[1] = b.into();
    }
    graph.set_root(a);

    let serializer = serializer();
    let back = serializer.from_bytes(&serializer.to_bytes(&graph).unwrap()).unwrap();

    let a = root_id(&back);
    let b = back.field(a, 1).and_then(Slot::as_node).unwrap();
    assert_eq!(name_of(&back, b), "b");
    assert_eq!(back.field(b, 1).and_then(Slot::as_node), Some(a));
}

#[test]
fn test_unreachable_nodes_are_not_written() {
    let mut graph = Graph::new();
    graph.add_object("Person", vec![text("orphan"), Slot::Null, Slot::Null]);
    let root = graph.add_object("Person", vec![text("root"), Slot::Null, Slot::Null]);
    graph.set_root(root);

    let serializer = serializer();
    let back = serializer.from_bytes(&serializer.to_bytes(&graph).unwrap()).unwrap();
    assert_eq!(back.len(), 1);
    assert_eq!(name_of(&back, root_id(&back)), "root");
}

#[test]
fn test_struct_values_are_copied() {
    let catalog = catalog_with([
        point(),
        TypeDef::class("Segment")
            .field("from", DeclaredKind::Struct("Point".into()))
            .field("to", DeclaredKind::Struct("Point".into())),
    ]);
    let p = Slot::Struct(StructValue::new(
        "Point",
        vec![Slot::Scalar(Value::I32(3)), Slot::Scalar(Value::I32(-4))],
    ));
    let mut graph = Graph::new();
    let seg = graph.add_object("Segment", vec![p.clone(), p.clone()]);
    graph.set_root(seg);

    let serializer = SlimSerializer::new(catalog);
    let back = serializer.from_bytes(&serializer.to_bytes(&graph).unwrap()).unwrap();
    let seg = root_id(&back);
    assert_eq!(back.field(seg, 0), Some(&p));
    assert_eq!(back.field(seg, 1), Some(&p));
    assert_eq!(back.len(), 1);
}

#[test]
fn test_map_comparison_roundtrips() {
    let serializer = serializer();
    for comparison in [KeyComparison::Ordinal, KeyComparison::IgnoreCase] {
        let mut graph = Graph::new();
        let bob = graph.add_object("Person", vec![text("bob"), Slot::Null, Slot::Null]);
        let mut map = GraphMap::new(comparison);
        map.insert("Bob", bob.into());
        map.insert("count", Slot::Scalar(Value::U64(7)));
        map.insert("nothing", Slot::Null);
        let id = graph.add(Node::Map(map));
        graph.set_root(id);

        let back = serializer.from_bytes(&serializer.to_bytes(&graph).unwrap()).unwrap();
        let map = back.node(root_id(&back)).and_then(Node::as_map).unwrap();
        assert_eq!(map.comparison(), comparison);
        assert_eq!(map.len(), 3);
        assert_eq!(map.get("count"), Some(&Slot::Scalar(Value::U64(7))));

        let keys: Vec<&str> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["Bob", "count", "nothing"]);

        let lowered = map.get("bob").and_then(Slot::as_node);
        match comparison {
            KeyComparison::Ordinal => assert_eq!(lowered, None),
            KeyComparison::IgnoreCase => {
                let bob = lowered.unwrap();
                assert_eq!(name_of(&back, bob), "bob");
            }
        }
    }
}

#[test]
fn test_map_keys_colliding_under_ignore_case_rejected() {
    // An ordinal map with "A" and "a" re-labelled as ignore-case on the wire.
    let serializer = serializer();
    let mut map = GraphMap::new(KeyComparison::Ordinal);
    map.insert("A", Slot::Null);
    map.insert("a", Slot::Null);
    let mut graph = Graph::new();
    let id = graph.add(Node::Map(map));
    graph.set_root(id);

    let mut bytes = serializer.to_bytes(&graph).unwrap();
    // header(0) slot(NEW_REF) index(0) node(MAP) comparison
    assert_eq!(&bytes[..5], &[0x00, 0x02, 0x00, 0x03, 0x00]);
    bytes[4] = KeyComparison::IgnoreCase.to_u8();
    assert!(matches!(
        serializer.from_bytes(&bytes),
        Err(DecodeError::DuplicateMapKey { .. })
    ));
}

#[test]
fn test_multi_dimensional_arrays_share_elements() {
    let serializer = serializer();
    for shape in [vec![3], vec![2, 3], vec![2, 1, 3], vec![2, 2, 1, 2]] {
        let mut graph = Graph::new();
        let shared = graph.add_object("Person", vec![text("shared"), Slot::Null, Slot::Null]);
        let len: usize = shape.iter().product();
        let cells: Vec<Slot> = (0..len)
            .map(|i| match i % 3 {
                0 => shared.into(),
                1 => Slot::Null,
                _ => Slot::Scalar(Value::I64(i as i64)),
            })
            .collect();
        let array = NdArray::from_vec(shape.clone(), cells.clone()).unwrap();
        let array_id = graph.add(Node::Array(array));
        let root = graph.add_object("Holder", vec![array_id.into()]);
        graph.set_root(root);

        let back = serializer.from_bytes(&serializer.to_bytes(&graph).unwrap()).unwrap();
        let holder = root_id(&back);
        let array_id = back.field(holder, 0).and_then(Slot::as_node).unwrap();
        let array = back.node(array_id).and_then(Node::as_array).unwrap();
        assert_eq!(array.shape(), &shape[..]);

        let refs: Vec<NodeId> = array.iter().filter_map(Slot::as_node).collect();
        assert_eq!(refs.len(), len.div_ceil(3));
        assert!(refs.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(name_of(&back, refs[0]), "shared");

        for (i, cell) in array.iter().enumerate() {
            match i % 3 {
                1 => assert!(cell.is_null()),
                2 => assert_eq!(cell, &Slot::Scalar(Value::I64(i as i64))),
                _ => {}
            }
        }
    }
}

#[test]
fn test_empty_array_keeps_shape() {
    let serializer = serializer();
    let mut graph = Graph::new();
    let id = graph.add(Node::Array(NdArray::from_vec(vec![2, 0, 3], vec![]).unwrap()));
    graph.set_root(id);

    let back = serializer.from_bytes(&serializer.to_bytes(&graph).unwrap()).unwrap();
    let array = back.node(root_id(&back)).and_then(Node::as_array).unwrap();
    assert_eq!(array.shape(), &[2, 0, 3]);
    assert!(array.is_empty());
}

#[test]
fn test_per_call_count_mismatch() {
    let mut writer_catalog = TypeCatalog::new();
    writer_catalog.register_known(person()).unwrap();
    writer_catalog.register(holder()).unwrap();
    let writer = SlimSerializer::new(Arc::new(writer_catalog));

    let mut reader_catalog = TypeCatalog::new();
    reader_catalog.register_known(person()).unwrap();
    reader_catalog.register_known(holder()).unwrap();
    let reader = SlimSerializer::new(Arc::new(reader_catalog));

    let bytes = writer.to_bytes(&Graph::with_root(Value::Bool(true))).unwrap();
    let err = reader.from_bytes(&bytes).unwrap_err();
    assert!(matches!(
        err,
        DecodeError::RegistryCountMismatch { expected: 2, found: 1 }
    ));
    assert!(err.to_string().contains("count mismatch"));
}

#[test]
fn test_per_call_checksum_mismatch_on_known_type() {
    let mut writer_catalog = TypeCatalog::new();
    writer_catalog.register_known(person()).unwrap();
    let writer = SlimSerializer::new(Arc::new(writer_catalog));

    let mut reader_catalog = TypeCatalog::new();
    reader_catalog
        .register_known(person().field("age", DeclaredKind::Scalar(WireType::I32)))
        .unwrap();
    let reader = SlimSerializer::new(Arc::new(reader_catalog));

    let bytes = writer.to_bytes(&Graph::new()).unwrap();
    let err = reader.from_bytes(&bytes).unwrap_err();
    assert!(matches!(
        err,
        DecodeError::RegistryChecksumMismatch { handle: 0, .. }
    ));
    assert!(err.to_string().contains("CSUM mismatch"));
}

#[test]
fn test_per_call_checksum_mismatch_on_inline_type() {
    let writer = SlimSerializer::new(catalog_with([person()]));
    let reader = SlimSerializer::new(catalog_with([TypeDef::class("Person")
        .field("name", DeclaredKind::Scalar(WireType::Bytes))
        .field("friend", DeclaredKind::Ref)
        .field("best", DeclaredKind::Ref)]));

    let mut graph = Graph::new();
    let p = graph.add_object("Person", vec![text("x"), Slot::Null, Slot::Null]);
    graph.set_root(p);

    let err = reader.from_bytes(&writer.to_bytes(&graph).unwrap()).unwrap_err();
    assert!(matches!(
        err,
        DecodeError::RegistryChecksumMismatch { ref type_name, .. } if type_name == "Person"
    ));
}

#[test]
fn test_reader_missing_type_fails() {
    let writer = serializer();
    let reader = SlimSerializer::new(catalog_with([point()]));

    let mut graph = Graph::new();
    let p = graph.add_object("Person", vec![text("x"), Slot::Null, Slot::Null]);
    graph.set_root(p);

    assert!(matches!(
        reader.from_bytes(&writer.to_bytes(&graph).unwrap()),
        Err(DecodeError::UnknownType { .. })
    ));
}

#[test]
fn test_batch_flags_new_types_on_both_sides() {
    let mut catalog = TypeCatalog::new();
    catalog.register_known(person()).unwrap();
    catalog.register_known(holder()).unwrap();
    catalog.register(point()).unwrap();
    let serializer = SlimSerializer::new(Arc::new(catalog));

    let mut writer = serializer.batch();
    let mut reader = serializer.batch();

    let calls: Vec<(Graph, bool)> = vec![
        (person_graph(), false),
        (holder_graph(), false),
        (point_graph(), true),
        (person_graph(), false),
        (point_graph(), false),
        (holder_graph(), false),
        (point_graph(), false),
    ];
    for (i, (graph, expect_new)) in calls.into_iter().enumerate() {
        let bytes = writer.to_bytes(&graph).unwrap();
        assert_eq!(writer.new_types_registered(), expect_new, "writer call {}", i);
        let back = reader.from_bytes(&bytes).unwrap();
        assert_eq!(reader.new_types_registered(), expect_new, "reader call {}", i);
        assert_eq!(back, graph);
    }
    assert_eq!(writer.registered_types(), 3);
    assert_eq!(reader.registered_types(), 3);

    // Resetting one side only is detected on the next call.
    writer.reset();
    assert_eq!(writer.registered_types(), 2);
    let bytes = writer.to_bytes(&person_graph()).unwrap();
    assert!(matches!(
        reader.from_bytes(&bytes),
        Err(DecodeError::RegistryCountMismatch { expected: 3, found: 2 })
    ));

    reader.reset();
    let bytes = writer.to_bytes(&point_graph()).unwrap();
    assert!(reader.from_bytes(&bytes).is_ok());
    assert!(writer.new_types_registered());
    assert!(reader.new_types_registered());
}

#[test]
fn test_batch_flags_first_occurrence_of_each_type() {
    let serializer = serializer();
    let mut writer = serializer.batch();
    let mut reader = serializer.batch();

    let calls = [
        (person_graph(), true),
        (holder_graph(), true),
        (point_graph(), true),
        (person_graph(), false),
        (point_graph(), false),
        (holder_graph(), false),
    ];
    for (i, (graph, expect_new)) in calls.into_iter().enumerate() {
        let bytes = writer.to_bytes(&graph).unwrap();
        assert_eq!(writer.new_types_registered(), expect_new, "writer call {}", i);
        let back = reader.from_bytes(&bytes).unwrap();
        assert_eq!(reader.new_types_registered(), expect_new, "reader call {}", i);
        assert_eq!(back, graph);
    }
    assert_eq!(writer.registered_types(), 3);
    assert_eq!(reader.registered_types(), 3);
}

#[test]
fn test_batch_registers_on_first_use() {
    let serializer = serializer();
    let mut writer = serializer.batch();
    let mut reader = serializer.batch();

    let mut graph = Graph::new();
    let h = graph.add_object("Holder", vec![Slot::Null]);
    graph.set_root(h);

    for expect_new in [true, false, false] {
        let bytes = writer.to_bytes(&graph).unwrap();
        reader.from_bytes(&bytes).unwrap();
        assert_eq!(writer.new_types_registered(), expect_new);
        assert_eq!(reader.new_types_registered(), expect_new);
    }
}

#[test]
fn test_batch_payload_shrinks_after_registration() {
    let serializer = serializer();
    let mut writer = serializer.batch();
    let mut graph = Graph::new();
    let p = graph.add_object("Person", vec![text("p"), Slot::Null, Slot::Null]);
    graph.set_root(p);

    let first = writer.to_bytes(&graph).unwrap();
    let second = writer.to_bytes(&graph).unwrap();
    // The second call replaces the inline name and checksum with a handle
    // but adds one checksum to the header.
    assert!(second.len() < first.len());
}

#[test]
fn test_framed_graph_roundtrip() {
    let serializer = serializer();
    let mut graph = Graph::new();
    let a = graph.add_object("Person", vec![text("a"), Slot::Null, Slot::Null]);
    if let Some(Node::Object(obj)) = graph.node_mut(a) {
        obj.fields[1] = a.into();
    }
    graph.set_root(a);

    let plain = serializer.encode_framed(&graph).unwrap();
    assert_eq!(serializer.decode_framed(&plain).unwrap(), graph);
    let compressed = serializer.encode_framed_compressed(&graph, 3).unwrap();
    assert_eq!(serializer.decode_framed(&compressed).unwrap(), graph);
}

/// A ring of `len` people, each befriending the next; the last one points
/// back at the first.
fn ring(label: &str, len: usize) -> Graph {
    let mut graph = Graph::new();
    let ids: Vec<NodeId> = (0..len)
        .map(|i| {
            let name = text(&format!("{label}-{i}"));
            graph.add_object("Person", vec![name, Slot::Null, Slot::Null])
        })
        .collect();
    for (i, &id) in ids.iter().enumerate() {
        if let Some(Node::Object(obj)) = graph.node_mut(id) {
            obj.fields[1] = ids[(i + 1) % len].into();
        }
    }
    graph.set_root(ids[0]);
    graph
}

fn ring_names(graph: &Graph) -> Vec<String> {
    let start = root_id(graph);
    let mut names = Vec::new();
    let mut at = start;
    loop {
        names.push(name_of(graph, at).to_string());
        at = graph.field(at, 1).and_then(Slot::as_node).unwrap();
        if at == start {
            return names;
        }
    }
}

#[test]
fn test_per_call_serializer_shared_across_threads() {
    let serializer = Arc::new(serializer());
    std::thread::scope(|scope| {
        for worker in 0..8usize {
            let serializer = Arc::clone(&serializer);
            scope.spawn(move || {
                let label = format!("w{worker}");
                let graph = ring(&label, worker + 2);
                let expected = ring_names(&graph);
                for _ in 0..50 {
                    let bytes = serializer.to_bytes(&graph).unwrap();
                    let back = serializer.from_bytes(&bytes).unwrap();
                    assert_eq!(ring_names(&back), expected);
                    assert_eq!(back.len(), worker + 2);
                    assert!(!serializer.to_bytes(&point_graph()).unwrap().is_empty());
                }
            });
        }
    });
}
