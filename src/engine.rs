use std::path::Path;

use rusqlite::Connection;
use tracing::debug;

use crate::{
    config::{EngineConfig, MEMORY_PATH, open_engine},
    cypher,
    errors::GraphError,
    graph::{EntityKind, GraphStore},
    result::{QueryResult, ResultSet},
    schema::read_schema_version,
    vtab,
};

/// Query execution entry point: one store, one connection, one active statement.
#[derive(Debug)]
pub struct Engine {
    store: GraphStore,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineStatus {
    pub nodes: i64,
    pub edges: i64,
    pub schema_version: Option<i64>,
}

impl Engine {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GraphError> {
        open_engine(path, &EngineConfig::default())
    }

    pub fn open_in_memory() -> Result<Self, GraphError> {
        open_engine(MEMORY_PATH, &EngineConfig::default())
    }

    pub(crate) fn from_store(store: GraphStore, register_vtab: bool) -> Result<Self, GraphError> {
        if register_vtab {
            vtab::register(store.connection())?;
        }
        Ok(Self { store })
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    /// The underlying connection, for SQL access alongside Cypher.
    pub fn connection(&self) -> &Connection {
        self.store.connection()
    }

    /// Runs one statement. Read-only statements stream their rows lazily.
    pub fn execute(&self, query: &str) -> Result<QueryResult<'_>, GraphError> {
        debug!(query, "engine.execute");
        cypher::run(&self.store, query)
    }

    /// Runs `;`-separated statements in order and returns the last one's rows.
    ///
    /// Stops at the first failing statement; earlier statements stay committed.
    pub fn execute_script(&self, script: &str) -> Result<ResultSet, GraphError> {
        let mut last = ResultSet::default();
        for (index, statement) in cypher::split_statements(script)?.into_iter().enumerate() {
            last = self
                .execute(statement)
                .and_then(QueryResult::materialize)
                .inspect_err(|err| debug!(statement = index, error = %err, "engine.script.failed"))?;
        }
        Ok(last)
    }

    pub fn status(&self) -> Result<EngineStatus, GraphError> {
        Ok(EngineStatus {
            nodes: self.store.count(EntityKind::Node)?,
            edges: self.store.count(EntityKind::Edge)?,
            schema_version: read_schema_version(self.connection()).ok(),
        })
    }
}
