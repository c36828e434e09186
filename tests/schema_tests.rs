use graphtab::{
    Engine, ErrorKind, GraphStore,
    schema::{
        EDGE_COLUMNS, NODE_COLUMNS, SCHEMA_VERSION, ensure_schema, migrate_legacy_schema,
        read_schema_version, table_columns, verify_schema,
    },
};
use rusqlite::Connection;

const LEGACY_SCHEMA: &str = "
    CREATE TABLE nodes(id INTEGER PRIMARY KEY AUTOINCREMENT, properties TEXT NOT NULL DEFAULT '{}');
    CREATE TABLE edges(id INTEGER PRIMARY KEY AUTOINCREMENT, from_id INTEGER NOT NULL,
                       to_id INTEGER NOT NULL, type TEXT NOT NULL, properties TEXT NOT NULL DEFAULT '{}');
";

#[test]
fn test_schema_creates_both_relations() {
    let conn = Connection::open_in_memory().expect("conn");
    ensure_schema(&conn).expect("schema");
    assert_eq!(table_columns(&conn, "nodes").expect("nodes"), NODE_COLUMNS);
    assert_eq!(table_columns(&conn, "edges").expect("edges"), EDGE_COLUMNS);
    assert_eq!(read_schema_version(&conn).expect("version"), SCHEMA_VERSION);
}

#[test]
fn test_ensure_schema_is_idempotent() {
    let conn = Connection::open_in_memory().expect("conn");
    ensure_schema(&conn).expect("first");
    ensure_schema(&conn).expect("second");
    let rows: i64 = conn
        .query_row("SELECT count(*) FROM graph_meta", [], |row| row.get(0))
        .expect("meta rows");
    assert_eq!(rows, 1);
}

#[test]
fn test_verify_passes_on_empty_database() {
    let conn = Connection::open_in_memory().expect("conn");
    verify_schema(&conn).expect("nothing to check");
}

#[test]
fn test_legacy_layout_is_a_schema_mismatch() {
    let conn = Connection::open_in_memory().expect("conn");
    conn.execute_batch(LEGACY_SCHEMA).expect("legacy");
    let err = verify_schema(&conn).expect_err("mismatch");
    assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
    assert!(err.to_string().contains("explicit migration"));
    let err = GraphStore::from_connection(conn).err().expect("store refuses");
    assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
}

#[test]
fn test_newer_schema_version_is_rejected() {
    let conn = Connection::open_in_memory().expect("conn");
    ensure_schema(&conn).expect("schema");
    conn.execute("UPDATE graph_meta SET schema_version = ?1", [SCHEMA_VERSION + 1])
        .expect("bump");
    let err = ensure_schema(&conn).expect_err("too new");
    assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
}

#[test]
fn test_dry_run_migration_changes_nothing() {
    let conn = Connection::open_in_memory().expect("conn");
    conn.execute_batch(LEGACY_SCHEMA).expect("legacy");
    let report = migrate_legacy_schema(&conn, true).expect("dry run");
    assert!(report.dry_run);
    assert!(!report.is_noop());
    assert!(
        report
            .statements
            .iter()
            .any(|sql| sql.contains("RENAME COLUMN from_id TO source"))
    );
    assert!(verify_schema(&conn).is_err());
}

#[test]
fn test_migration_upgrades_legacy_database() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("legacy.db");
    {
        let conn = Connection::open(&path).expect("conn");
        conn.execute_batch(LEGACY_SCHEMA).expect("legacy");
        conn.execute_batch(
            "INSERT INTO nodes(properties) VALUES('{\"name\":\"a\"}'), ('{}');
             INSERT INTO edges(from_id, to_id, type) VALUES(1, 2, 'LINK');",
        )
        .expect("rows");
        let report = migrate_legacy_schema(&conn, false).expect("migrate");
        assert!(!report.is_noop());
        verify_schema(&conn).expect("current layout");
        assert!(migrate_legacy_schema(&conn, false).expect("again").is_noop());
    }
    let engine = Engine::open(&path).expect("open migrated");
    let rows = engine
        .execute("MATCH (a)-[r:LINK]->(b) RETURN a.name, type(r)")
        .expect("query")
        .materialize()
        .expect("rows");
    assert_eq!(rows.rendered_rows(), vec![vec!["'a'", "'LINK'"]]);
}
