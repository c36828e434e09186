//! Configuration for opening an [`Engine`].

use std::collections::HashMap;
use std::path::Path;

use rusqlite::Connection;
use tracing::debug;

use crate::{
    engine::Engine,
    errors::GraphError,
    graph::{DEFAULT_SCAN_PAGE_SIZE, GraphStore},
    schema::verify_schema,
};

/// Path that opens a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// SQLite connection options.
///
/// ```rust
/// use graphtab::SqliteConfig;
/// let config = SqliteConfig::default();
/// assert!(!config.without_migrations);
/// assert!(config.cache_size.is_none());
/// assert!(config.pragma_settings.is_empty());
/// ```
#[derive(Clone, Debug, Default)]
pub struct SqliteConfig {
    /// Skip creating the backing relations and stamping the schema version.
    ///
    /// The relations must already exist. Their columns are still verified,
    /// so a mismatched database is rejected either way.
    pub without_migrations: bool,

    /// Prepared statement cache capacity.
    pub cache_size: Option<usize>,

    /// PRAGMAs applied right after the connection opens, e.g.
    /// `journal_mode = WAL` or `synchronous = NORMAL`.
    pub pragma_settings: HashMap<String, String>,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub sqlite: SqliteConfig,

    /// Register the `graph` virtual-table module on the engine's connection.
    ///
    /// **Default:** `true`
    pub register_vtab: bool,

    /// Rows fetched per page by node and edge scans.
    ///
    /// **Default:** 256
    pub scan_page_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sqlite: SqliteConfig::default(),
            register_vtab: true,
            scan_page_size: DEFAULT_SCAN_PAGE_SIZE,
        }
    }
}

/// Opens an engine at `path` (or in memory for `":memory:"`) with `cfg`.
///
/// ```rust
/// use graphtab::{EngineConfig, open_engine};
///
/// let mut cfg = EngineConfig::default();
/// cfg.sqlite
///     .pragma_settings
///     .insert("synchronous".to_string(), "NORMAL".to_string());
/// let engine = open_engine(":memory:", &cfg)?;
/// # Ok::<(), graphtab::GraphError>(())
/// ```
pub fn open_engine<P: AsRef<Path>>(path: P, cfg: &EngineConfig) -> Result<Engine, GraphError> {
    let path = path.as_ref();
    let conn = if path.as_os_str() == MEMORY_PATH {
        Connection::open_in_memory()
    } else {
        Connection::open(path)
    }
    .map_err(|e| GraphError::connection(e.to_string()))?;

    apply_pragmas(&conn, &cfg.sqlite.pragma_settings)?;

    let mut store = if cfg.sqlite.without_migrations {
        verify_schema(&conn)?;
        GraphStore::attach(conn)
    } else {
        GraphStore::from_connection(conn)?
    };
    if let Some(capacity) = cfg.sqlite.cache_size {
        store
            .connection()
            .set_prepared_statement_cache_capacity(capacity);
    }
    store.set_scan_page_size(cfg.scan_page_size);
    debug!(
        path = %path.display(),
        without_migrations = cfg.sqlite.without_migrations,
        register_vtab = cfg.register_vtab,
        "engine.open"
    );
    Engine::from_store(store, cfg.register_vtab)
}

fn apply_pragmas(conn: &Connection, pragmas: &HashMap<String, String>) -> Result<(), GraphError> {
    for (key, value) in pragmas {
        let pragma_sql = format!("PRAGMA {key} = {value}");
        match conn.execute(&pragma_sql, []) {
            Ok(_) => {}
            // PRAGMAs such as journal_mode report the new value as a row.
            Err(rusqlite::Error::ExecuteReturnedResults) => {}
            Err(e) => {
                return Err(GraphError::connection(format!(
                    "PRAGMA {key} = {value}: {e}"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_engine_config_default() {
        let cfg = EngineConfig::default();
        assert!(cfg.register_vtab);
        assert_eq!(cfg.scan_page_size, DEFAULT_SCAN_PAGE_SIZE);
        assert!(!cfg.sqlite.without_migrations);
        assert!(cfg.sqlite.pragma_settings.is_empty());
    }

    #[test]
    fn test_open_engine_applies_pragmas() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("pragmas.db");
        let mut cfg = EngineConfig::default();
        cfg.sqlite
            .pragma_settings
            .insert("journal_mode".to_string(), "WAL".to_string());
        cfg.sqlite.cache_size = Some(16);
        let engine = open_engine(&path, &cfg).expect("open");
        let mode: String = engine
            .connection()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .expect("journal mode");
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_invalid_pragma_is_connection_error() {
        let mut cfg = EngineConfig::default();
        cfg.sqlite
            .pragma_settings
            .insert("synchronous".to_string(), "'; DROP".to_string());
        let err = open_engine(MEMORY_PATH, &cfg).expect_err("bad pragma");
        assert!(matches!(err, GraphError::ConnectionError(_)));
    }

    #[test]
    fn test_without_migrations_still_verifies() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("legacy.db");
        {
            let conn = Connection::open(&path).expect("raw open");
            conn.execute_batch(
                "CREATE TABLE nodes(id INTEGER PRIMARY KEY, labels TEXT, properties TEXT);
                 CREATE TABLE edges(id INTEGER PRIMARY KEY, from_id INTEGER, to_id INTEGER,
                                    type TEXT, weight REAL, properties TEXT);",
            )
            .expect("legacy schema");
        }
        let mut cfg = EngineConfig::default();
        cfg.sqlite.without_migrations = true;
        let err = open_engine(&path, &cfg).expect_err("mismatch");
        assert!(matches!(err, GraphError::SchemaMismatch(_)));
    }
}
