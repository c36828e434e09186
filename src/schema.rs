use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, warn};

use crate::errors::GraphError;

pub const SCHEMA_VERSION: i64 = 1;

pub const NODE_TABLE: &str = "nodes";
pub const EDGE_TABLE: &str = "edges";

pub const NODE_COLUMNS: &[&str] = &["id", "labels", "properties"];
pub const EDGE_COLUMNS: &[&str] = &["id", "source", "target", "edge_type", "weight", "properties"];

const LEGACY_EDGE_RENAMES: &[(&str, &str)] = &[
    ("from_id", "source"),
    ("to_id", "target"),
    ("type", "edge_type"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub statements: Vec<String>,
    pub dry_run: bool,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Verifies any existing backing relations, then creates whatever is missing.
pub fn ensure_schema(conn: &Connection) -> Result<(), GraphError> {
    verify_schema(conn)?;
    ensure_base_schema(conn)?;
    ensure_meta(conn)?;
    Ok(())
}

fn ensure_base_schema(conn: &Connection) -> Result<(), GraphError> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;
        CREATE TABLE IF NOT EXISTS nodes (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            labels     TEXT NOT NULL DEFAULT '',
            properties TEXT NOT NULL DEFAULT '{}'
        );
        CREATE TABLE IF NOT EXISTS edges (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            source     INTEGER NOT NULL REFERENCES nodes(id),
            target     INTEGER NOT NULL REFERENCES nodes(id),
            edge_type  TEXT NOT NULL DEFAULT '',
            weight     REAL,
            properties TEXT NOT NULL DEFAULT '{}'
        );
        CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source);
        CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target);
        CREATE INDEX IF NOT EXISTS idx_edges_type ON edges(edge_type);
        CREATE TABLE IF NOT EXISTS graph_meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            schema_version INTEGER NOT NULL
        );
        "#,
    )
    .map_err(|e| GraphError::schema(e.to_string()))
}

fn ensure_meta(conn: &Connection) -> Result<(), GraphError> {
    let version: Option<i64> = conn
        .query_row(
            "SELECT schema_version FROM graph_meta WHERE id=1",
            [],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| GraphError::schema(e.to_string()))?;
    match version {
        Some(existing) if existing > SCHEMA_VERSION => Err(GraphError::schema_mismatch(format!(
            "database schema version {existing} is newer than supported {SCHEMA_VERSION}"
        ))),
        Some(_) => Ok(()),
        None => {
            conn.execute(
                "INSERT INTO graph_meta(id, schema_version) VALUES(1, ?1)",
                [SCHEMA_VERSION],
            )
            .map_err(|e| GraphError::schema(e.to_string()))?;
            Ok(())
        }
    }
}

pub fn read_schema_version(conn: &Connection) -> Result<i64, GraphError> {
    conn.query_row(
        "SELECT schema_version FROM graph_meta WHERE id=1",
        [],
        |row| row.get(0),
    )
    .map_err(|e| GraphError::schema(e.to_string()))
}

/// Column names of `table` in declaration order; empty when the table is absent.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>, GraphError> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .map_err(|e| GraphError::schema(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(|e| GraphError::schema(e.to_string()))?;
    let mut columns = Vec::new();
    for column in rows {
        columns.push(column.map_err(|e| GraphError::schema(e.to_string()))?);
    }
    Ok(columns)
}

/// Rejects existing `nodes`/`edges` relations whose columns differ from the contract.
///
/// Absent relations pass; they are created by [`ensure_schema`]. Column order is
/// not significant, names are.
pub fn verify_schema(conn: &Connection) -> Result<(), GraphError> {
    check_relation(conn, NODE_TABLE, NODE_COLUMNS)?;
    check_relation(conn, EDGE_TABLE, EDGE_COLUMNS)?;
    Ok(())
}

fn check_relation(conn: &Connection, table: &str, expected: &[&str]) -> Result<(), GraphError> {
    let actual = table_columns(conn, table)?;
    if actual.is_empty() {
        return Ok(());
    }
    let missing: Vec<&str> = expected
        .iter()
        .copied()
        .filter(|name| !actual.iter().any(|col| col.eq_ignore_ascii_case(name)))
        .collect();
    let unexpected: Vec<&str> = actual
        .iter()
        .map(String::as_str)
        .filter(|col| !expected.iter().any(|name| col.eq_ignore_ascii_case(name)))
        .collect();
    if missing.is_empty() && unexpected.is_empty() {
        return Ok(());
    }
    warn!(table, ?missing, ?unexpected, "schema.mismatch");
    let mut message = format!(
        "relation '{table}' has columns [{}], expected [{}]",
        actual.join(", "),
        expected.join(", ")
    );
    if is_legacy_layout(&actual) {
        message.push_str("; legacy from_id/to_id/type naming requires an explicit migration");
    }
    Err(GraphError::schema_mismatch(message))
}

fn is_legacy_layout(columns: &[String]) -> bool {
    LEGACY_EDGE_RENAMES
        .iter()
        .any(|(legacy, _)| columns.iter().any(|col| col == legacy))
}

/// Rewrites legacy backing relations into the current column contract.
///
/// Renames `from_id/to_id/type` on `edges` and adds a missing `labels` column on
/// `nodes`. Nothing runs when `dry_run` is set; the report lists what would.
pub fn migrate_legacy_schema(
    conn: &Connection,
    dry_run: bool,
) -> Result<MigrationReport, GraphError> {
    let statements = pending_legacy_statements(conn)?;
    if statements.is_empty() || dry_run {
        return Ok(MigrationReport {
            statements,
            dry_run,
        });
    }
    debug!(count = statements.len(), "schema.migrate.begin");
    conn.execute("BEGIN IMMEDIATE", [])
        .map_err(|e| GraphError::schema(e.to_string()))?;
    let result: Result<(), GraphError> = (|| {
        for sql in &statements {
            conn.execute(sql, [])
                .map_err(|e| GraphError::schema(format!("{sql}: {e}")))?;
        }
        Ok(())
    })();
    match result {
        Ok(()) => {
            conn.execute("COMMIT", [])
                .map_err(|e| GraphError::schema(e.to_string()))?;
        }
        Err(err) => {
            let _ = conn.execute("ROLLBACK", []);
            return Err(err);
        }
    }
    debug!("schema.migrate.commit");
    Ok(MigrationReport {
        statements,
        dry_run,
    })
}

fn pending_legacy_statements(conn: &Connection) -> Result<Vec<String>, GraphError> {
    let mut statements = Vec::new();
    let edge_columns = table_columns(conn, EDGE_TABLE)?;
    for (legacy, current) in LEGACY_EDGE_RENAMES {
        let has_legacy = edge_columns.iter().any(|col| col == legacy);
        let has_current = edge_columns.iter().any(|col| col == current);
        if has_legacy && !has_current {
            statements.push(format!(
                "ALTER TABLE {EDGE_TABLE} RENAME COLUMN {legacy} TO {current}"
            ));
        }
    }
    if !edge_columns.is_empty() {
        if !edge_columns.iter().any(|col| col == "weight") {
            statements.push(format!("ALTER TABLE {EDGE_TABLE} ADD COLUMN weight REAL"));
        }
        if !edge_columns.iter().any(|col| col == "properties") {
            statements.push(format!(
                "ALTER TABLE {EDGE_TABLE} ADD COLUMN properties TEXT NOT NULL DEFAULT '{{}}'"
            ));
        }
    }
    let node_columns = table_columns(conn, NODE_TABLE)?;
    if !node_columns.is_empty() && !node_columns.iter().any(|col| col == "labels") {
        statements.push(format!(
            "ALTER TABLE {NODE_TABLE} ADD COLUMN labels TEXT NOT NULL DEFAULT ''"
        ));
    }
    Ok(statements)
}
