use graphtab::{
    CursorState, EdgeSpec, EntityKind, GraphColumn, GraphCursor, GraphRow, GraphStore, LabelSet,
    PropertyMap, ScanPlan,
};
use rusqlite::types::Value;

fn small_graph() -> GraphStore {
    let store = GraphStore::open_in_memory().expect("store");
    let a = store
        .create_node(&["A"].into_iter().collect(), &PropertyMap::new())
        .expect("a");
    let b = store
        .create_node(&LabelSet::new(), &PropertyMap::new())
        .expect("b");
    let mut edge = EdgeSpec::new(a, b, "R");
    edge.weight = Some(1.5);
    store.create_edge(&edge).expect("edge");
    store
}

fn kinds(cursor: GraphCursor<'_>) -> Vec<EntityKind> {
    cursor
        .rows()
        .map(|row| row.expect("row").kind())
        .collect()
}

#[test]
fn test_full_scan_yields_nodes_then_edges() {
    let store = small_graph();
    let mut cursor = GraphCursor::new(&store);
    cursor.open(ScanPlan::FullScan, None).expect("open");
    assert_eq!(
        kinds(cursor),
        vec![EntityKind::Node, EntityKind::Node, EntityKind::Edge]
    );
}

#[test]
fn test_type_filter_selects_one_relation() {
    let store = small_graph();
    let mut nodes = GraphCursor::new(&store);
    nodes.open(ScanPlan::TypeFiltered, Some("node")).expect("nodes");
    assert_eq!(kinds(nodes), vec![EntityKind::Node, EntityKind::Node]);

    let edges = GraphCursor::open_kind(&store, EntityKind::Edge).expect("edges");
    assert_eq!(kinds(edges), vec![EntityKind::Edge]);
}

#[test]
fn test_unknown_discriminator_is_invalid_and_empty() {
    let store = small_graph();
    let mut cursor = GraphCursor::new(&store);
    cursor
        .open(ScanPlan::TypeFiltered, Some("vertex"))
        .expect("open does not fail");
    assert!(matches!(cursor.state(), CursorState::Invalid));
    assert!(cursor.is_eof());
    assert!(cursor.current().is_none());
    cursor.next().expect("next on invalid");
    assert!(cursor.is_eof());
}

#[test]
fn test_unopened_cursor_is_at_eof() {
    let store = small_graph();
    let cursor = GraphCursor::new(&store);
    assert!(matches!(cursor.state(), CursorState::Uninitialized));
    assert!(cursor.is_eof());
}

#[test]
fn test_empty_graph_full_scan_exhausts_immediately() {
    let store = GraphStore::open_in_memory().expect("store");
    let mut cursor = GraphCursor::new(&store);
    cursor.open(ScanPlan::FullScan, None).expect("open");
    assert!(cursor.is_eof());
    assert!(matches!(cursor.state(), CursorState::Exhausted));
}

#[test]
fn test_position_counts_rows_and_reopen_restarts() {
    let store = small_graph();
    let mut cursor = GraphCursor::new(&store);
    cursor.open(ScanPlan::FullScan, None).expect("open");
    assert_eq!(cursor.position(), 1);
    cursor.next().expect("next");
    cursor.next().expect("next");
    assert_eq!(cursor.position(), 3);
    cursor.next().expect("drain");
    assert!(cursor.is_eof());

    cursor.open(ScanPlan::FullScan, None).expect("reopen");
    assert_eq!(cursor.position(), 1);
    assert!(!cursor.is_eof());
}

#[test]
fn test_close_is_idempotent() {
    let store = small_graph();
    let mut cursor = GraphCursor::new(&store);
    cursor.open(ScanPlan::FullScan, None).expect("open");
    cursor.close();
    cursor.close();
    assert!(cursor.is_eof());
    assert!(matches!(cursor.state(), CursorState::Exhausted));
}

#[test]
fn test_row_columns_follow_entity_kind() {
    let store = small_graph();
    let mut cursor = GraphCursor::new(&store);
    cursor.open(ScanPlan::FullScan, None).expect("open");
    let rows: Vec<GraphRow> = cursor.rows().map(|row| row.expect("row")).collect();

    let node = &rows[0];
    assert_eq!(node.column(GraphColumn::Type), Value::Text("node".into()));
    assert_eq!(node.column(GraphColumn::Labels), Value::Text("A".into()));
    assert_eq!(node.column(GraphColumn::Properties), Value::Text("{}".into()));
    assert_eq!(node.column(GraphColumn::Source), Value::Null);
    assert_eq!(node.column(GraphColumn::Weight), Value::Null);

    let edge = &rows[2];
    assert_eq!(edge.column(GraphColumn::Type), Value::Text("edge".into()));
    assert_eq!(edge.column(GraphColumn::Source), Value::Integer(rows[0].id()));
    assert_eq!(edge.column(GraphColumn::Target), Value::Integer(rows[1].id()));
    assert_eq!(edge.column(GraphColumn::EdgeType), Value::Text("R".into()));
    assert_eq!(edge.column(GraphColumn::Weight), Value::Real(1.5));
    assert_eq!(edge.column(GraphColumn::Labels), Value::Null);
}

#[test]
fn test_column_indices_match_declaration_order() {
    for (index, column) in GraphColumn::ALL.iter().enumerate() {
        assert_eq!(column.index(), index as i32);
        assert_eq!(GraphColumn::from_index(index as i32), Some(*column));
    }
    assert_eq!(GraphColumn::from_index(-1), None);
    assert_eq!(GraphColumn::from_index(8), None);
}
