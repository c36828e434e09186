use graphtab::{
    EdgeSpec, EntityKind, ErrorKind, GraphError, GraphStore, LabelSet, PropertyMap, PropertyValue,
};

fn labels(names: &[&str]) -> LabelSet {
    names.iter().copied().collect()
}

fn props(entries: &[(&str, PropertyValue)]) -> PropertyMap {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn test_create_and_get_node_roundtrip() {
    let store = GraphStore::open_in_memory().expect("store");
    let id = store
        .create_node(
            &labels(&["Person", "Admin"]),
            &props(&[("name", "Ann".into()), ("age", 41i64.into())]),
        )
        .expect("node");
    let node = store.get_node(id).expect("get");
    assert_eq!(node.id, id);
    assert!(node.labels.contains_all(&["Admin", "Person"]));
    assert_eq!(node.properties.get("name"), Some(&PropertyValue::from("Ann")));
    assert_eq!(node.properties.get("age"), Some(&PropertyValue::Integer(41)));
}

#[test]
fn test_node_ids_are_assigned_in_insertion_order() {
    let store = GraphStore::open_in_memory().expect("store");
    let a = store.create_node(&LabelSet::new(), &PropertyMap::new()).expect("a");
    let b = store.create_node(&LabelSet::new(), &PropertyMap::new()).expect("b");
    assert!(b > a);
}

#[test]
fn test_null_properties_are_not_stored() {
    let store = GraphStore::open_in_memory().expect("store");
    let id = store
        .create_node(
            &LabelSet::new(),
            &props(&[("gone", PropertyValue::Null), ("kept", true.into())]),
        )
        .expect("node");
    let properties = store.get_properties(EntityKind::Node, id).expect("props");
    assert_eq!(properties.len(), 1);
    assert!(properties.contains_key("kept"));
}

#[test]
fn test_edge_requires_existing_endpoints() {
    let store = GraphStore::open_in_memory().expect("store");
    let a = store.create_node(&LabelSet::new(), &PropertyMap::new()).expect("a");
    let err = store
        .create_edge(&EdgeSpec::new(a, a + 100, "KNOWS"))
        .expect_err("dangling target");
    assert_eq!(err.kind(), ErrorKind::Referential);
    assert_eq!(store.count(EntityKind::Edge).expect("count"), 0);
}

#[test]
fn test_edge_roundtrip_with_weight() {
    let store = GraphStore::open_in_memory().expect("store");
    let a = store.create_node(&LabelSet::new(), &PropertyMap::new()).expect("a");
    let b = store.create_node(&LabelSet::new(), &PropertyMap::new()).expect("b");
    let mut spec = EdgeSpec::new(a, b, "ROAD");
    spec.weight = Some(2.5);
    spec.properties = props(&[("lanes", 2i64.into())]);
    let id = store.create_edge(&spec).expect("edge");
    let edge = store.get_edge(id).expect("get edge");
    assert_eq!((edge.source, edge.target), (a, b));
    assert_eq!(edge.edge_type, "ROAD");
    assert_eq!(edge.weight, Some(2.5));
    assert_eq!(edge.properties.get("lanes"), Some(&PropertyValue::Integer(2)));
}

#[test]
fn test_missing_entities_are_not_found() {
    let store = GraphStore::open_in_memory().expect("store");
    assert!(matches!(store.get_node(7), Err(GraphError::NotFound(_))));
    assert!(matches!(store.get_edge(7), Err(GraphError::NotFound(_))));
    let err = store
        .set_properties(EntityKind::Node, 7, &PropertyMap::new())
        .expect_err("no node");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_set_properties_replaces_cached_node() {
    let store = GraphStore::open_in_memory().expect("store");
    let id = store
        .create_node(&LabelSet::new(), &props(&[("v", 1i64.into())]))
        .expect("node");
    assert_eq!(
        store.get_node(id).expect("warm cache").properties.get("v"),
        Some(&PropertyValue::Integer(1))
    );
    store
        .set_properties(EntityKind::Node, id, &props(&[("v", 2i64.into())]))
        .expect("update");
    assert_eq!(
        store.get_node(id).expect("reload").properties.get("v"),
        Some(&PropertyValue::Integer(2))
    );
}

#[test]
fn test_invalid_label_is_rejected() {
    let store = GraphStore::open_in_memory().expect("store");
    let err = store
        .create_node(&labels(&["a:b"]), &PropertyMap::new())
        .expect_err("delimiter in label");
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[test]
fn test_scans_page_through_all_rows_in_id_order() {
    let mut store = GraphStore::open_in_memory().expect("store");
    store.set_scan_page_size(3);
    let mut ids = Vec::new();
    for _ in 0..10 {
        ids.push(store.create_node(&LabelSet::new(), &PropertyMap::new()).expect("node"));
    }
    for pair in ids.windows(2) {
        store
            .create_edge(&EdgeSpec::new(pair[0], pair[1], "NEXT"))
            .expect("edge");
    }
    let scanned: Vec<i64> = store
        .scan_nodes()
        .map(|node| node.expect("node row").id)
        .collect();
    assert_eq!(scanned, ids);
    let edges = store.scan_edges().count();
    assert_eq!(edges, 9);
}

#[test]
fn test_atomic_rolls_back_every_write_on_error() {
    let store = GraphStore::open_in_memory().expect("store");
    let result: Result<(), GraphError> = store.atomic(|s| {
        let a = s.create_node(&LabelSet::new(), &PropertyMap::new())?;
        s.create_edge(&EdgeSpec::new(a, a + 1, "BROKEN"))?;
        Ok(())
    });
    assert_eq!(result.expect_err("rolled back").kind(), ErrorKind::Referential);
    assert_eq!(store.count(EntityKind::Node).expect("nodes"), 0);
}

#[test]
fn test_stats_reflect_counts() {
    let store = GraphStore::open_in_memory().expect("store");
    let a = store.create_node(&LabelSet::new(), &PropertyMap::new()).expect("a");
    store.create_edge(&EdgeSpec::new(a, a, "SELF")).expect("loop");
    let stats = store.stats().expect("stats");
    assert_eq!((stats.nodes, stats.edges), (1, 1));
}

#[test]
fn test_file_store_persists_across_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("graph.db");
    {
        let store = GraphStore::open(&path).expect("open");
        store
            .create_node(&labels(&["Kept"]), &PropertyMap::new())
            .expect("node");
    }
    let store = GraphStore::open(&path).expect("reopen");
    assert_eq!(store.count(EntityKind::Node).expect("count"), 1);
}

#[test]
fn test_labels_round_trip_exactly_as_created() {
    let store = GraphStore::open_in_memory().expect("store");
    let id = store
        .create_node(&labels(&["Big City", "Capital"]), &PropertyMap::new())
        .expect("node");
    let node = store.get_node(id).expect("get");
    assert_eq!(node.labels, labels(&["Big City", "Capital"]));
    assert!(store.node_has_label(id, "Big City").expect("has"));
}

#[test]
fn test_whitespace_padded_labels_are_rejected() {
    let store = GraphStore::open_in_memory().expect("store");
    for bad in [" X", "X ", " X "] {
        let err = store
            .create_node(&labels(&[bad]), &PropertyMap::new())
            .expect_err(bad);
        assert_eq!(err.kind(), ErrorKind::InvalidInput, "{bad:?}");
    }
    assert_eq!(store.count(EntityKind::Node).expect("count"), 0);
}

#[test]
fn test_label_mutation() {
    let store = GraphStore::open_in_memory().expect("store");
    let id = store
        .create_node(&labels(&["Person"]), &PropertyMap::new())
        .expect("node");
    store.get_node(id).expect("warm cache");

    assert!(store.add_label(id, "Admin").expect("add"));
    assert!(!store.add_label(id, "Admin").expect("add twice"));
    assert_eq!(store.get_node(id).expect("get").labels, labels(&["Person", "Admin"]));

    assert!(store.remove_label(id, "Person").expect("remove"));
    assert!(!store.remove_label(id, "Person").expect("remove twice"));
    assert!(!store.node_has_label(id, "Person").expect("has"));
    assert_eq!(store.get_node(id).expect("get").labels, labels(&["Admin"]));

    store.set_labels(id, &labels(&["A", "B"])).expect("set");
    assert_eq!(store.get_node(id).expect("get").labels, labels(&["A", "B"]));

    let err = store.add_label(id, "bad:label").expect_err("delimiter");
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    let err = store.set_labels(id + 100, &labels(&["A"])).expect_err("missing");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_adjacency_lists_follow_direction() {
    let store = GraphStore::open_in_memory().expect("store");
    let a = store.create_node(&LabelSet::new(), &PropertyMap::new()).expect("a");
    let b = store.create_node(&LabelSet::new(), &PropertyMap::new()).expect("b");
    let c = store.create_node(&LabelSet::new(), &PropertyMap::new()).expect("c");
    store.create_edge(&EdgeSpec::new(a, b, "R")).expect("ab");
    store.create_edge(&EdgeSpec::new(a, c, "R")).expect("ac");
    store.create_edge(&EdgeSpec::new(c, a, "R")).expect("ca");
    assert_eq!(store.outgoing(a).expect("out"), vec![b, c]);
    assert_eq!(store.incoming(a).expect("in"), vec![c]);
    assert!(store.outgoing(b).expect("out").is_empty());
    assert_eq!(store.node_ids().expect("ids"), vec![a, b, c]);
}

#[test]
fn test_rolled_back_statement_keeps_store_usable() {
    let store = GraphStore::open_in_memory().expect("store");
    let result: Result<(), GraphError> = store.atomic(|store| {
        store.create_node(&LabelSet::new(), &PropertyMap::new())?;
        Err(GraphError::query("abort"))
    });
    assert!(result.is_err());
    assert_eq!(store.count(EntityKind::Node).expect("count"), 0);
    store
        .atomic(|store| store.create_node(&LabelSet::new(), &PropertyMap::new()))
        .expect("second statement");
    assert_eq!(store.count(EntityKind::Node).expect("count"), 1);
}
