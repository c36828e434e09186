use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, warn};

use crate::{
    cache::NodeCache,
    errors::GraphError,
    plan::TableStats,
    schema::ensure_schema,
    value::{PropertyMap, encode_properties},
};

use super::{
    scan::{EdgeScan, NodeScan, PagedScan},
    types::{Edge, EdgeId, EdgeSpec, EntityKind, LabelSet, Node, NodeId, row_to_edge, row_to_node},
};

pub const DEFAULT_SCAN_PAGE_SIZE: usize = 256;

const STATEMENT_SAVEPOINT: &str = "graphtab_statement";

/// Row storage for nodes and edges on top of one SQLite connection.
#[derive(Debug)]
pub struct GraphStore {
    conn: Connection,
    node_cache: NodeCache,
    scan_page_size: usize,
}

impl GraphStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GraphError> {
        let conn = Connection::open(path).map_err(|e| GraphError::connection(e.to_string()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, GraphError> {
        let conn =
            Connection::open_in_memory().map_err(|e| GraphError::connection(e.to_string()))?;
        Self::from_connection(conn)
    }

    /// Takes ownership of `conn`, verifying and creating the backing relations.
    pub fn from_connection(conn: Connection) -> Result<Self, GraphError> {
        ensure_schema(&conn)?;
        Ok(Self::attach(conn))
    }

    /// Wraps `conn` without touching its schema.
    pub fn attach(conn: Connection) -> Self {
        conn.set_prepared_statement_cache_capacity(64);
        Self {
            conn,
            node_cache: NodeCache::new(),
            scan_page_size: DEFAULT_SCAN_PAGE_SIZE,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn set_scan_page_size(&mut self, page_size: usize) {
        self.scan_page_size = page_size.max(1);
    }

    pub fn create_node(
        &self,
        labels: &LabelSet,
        properties: &PropertyMap,
    ) -> Result<NodeId, GraphError> {
        labels.validate()?;
        let data = encode_properties(properties)?;
        self.conn
            .prepare_cached("INSERT INTO nodes(labels, properties) VALUES(?1, ?2)")
            .and_then(|mut stmt| stmt.execute(params![labels.encode(), data]))
            .map_err(GraphError::from_statement)?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn create_edge(&self, edge: &EdgeSpec) -> Result<EdgeId, GraphError> {
        if !self.node_exists(edge.source)? {
            return Err(GraphError::referential(format!(
                "edge source node {} does not exist",
                edge.source
            )));
        }
        if !self.node_exists(edge.target)? {
            return Err(GraphError::referential(format!(
                "edge target node {} does not exist",
                edge.target
            )));
        }
        let data = encode_properties(&edge.properties)?;
        self.conn
            .prepare_cached(
                "INSERT INTO edges(source, target, edge_type, weight, properties) \
                 VALUES(?1, ?2, ?3, ?4, ?5)",
            )
            .and_then(|mut stmt| {
                stmt.execute(params![
                    edge.source,
                    edge.target,
                    edge.edge_type.as_str(),
                    edge.weight,
                    data,
                ])
            })
            .map_err(GraphError::from_statement)?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_node(&self, id: NodeId) -> Result<Node, GraphError> {
        if let Some(cached) = self.node_cache.get(id) {
            return Ok(cached);
        }
        let node = self.load_node(id)?;
        self.node_cache.insert(node.clone());
        Ok(node)
    }

    fn load_node(&self, id: NodeId) -> Result<Node, GraphError> {
        self.conn
            .prepare_cached("SELECT id, labels, properties FROM nodes WHERE id=?1")
            .and_then(|mut stmt| stmt.query_row(params![id], row_to_node))
            .map_err(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => GraphError::not_found(format!("node {id}")),
                other => GraphError::query(other.to_string()),
            })
    }

    pub fn get_edge(&self, id: EdgeId) -> Result<Edge, GraphError> {
        self.conn
            .prepare_cached(
                "SELECT id, source, target, edge_type, weight, properties FROM edges WHERE id=?1",
            )
            .and_then(|mut stmt| stmt.query_row(params![id], row_to_edge))
            .map_err(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => GraphError::not_found(format!("edge {id}")),
                other => GraphError::query(other.to_string()),
            })
    }

    pub fn get_properties(&self, kind: EntityKind, id: i64) -> Result<PropertyMap, GraphError> {
        match kind {
            EntityKind::Node => self.get_node(id).map(|node| node.properties),
            EntityKind::Edge => self.get_edge(id).map(|edge| edge.properties),
        }
    }

    /// Replaces the whole property value of a node or edge.
    pub fn set_properties(
        &self,
        kind: EntityKind,
        id: i64,
        properties: &PropertyMap,
    ) -> Result<(), GraphError> {
        let data = encode_properties(properties)?;
        let sql = match kind {
            EntityKind::Node => "UPDATE nodes SET properties=?1 WHERE id=?2",
            EntityKind::Edge => "UPDATE edges SET properties=?1 WHERE id=?2",
        };
        let affected = self
            .conn
            .prepare_cached(sql)
            .and_then(|mut stmt| stmt.execute(params![data, id]))
            .map_err(|e| GraphError::query(e.to_string()))?;
        if affected == 0 {
            return Err(GraphError::not_found(format!("{kind} {id}")));
        }
        if kind == EntityKind::Node {
            self.node_cache.remove(id);
        }
        Ok(())
    }

    /// Drops cached nodes; called before every statement.
    pub fn begin_statement(&self) {
        self.node_cache.clear();
    }

    /// Replaces the whole label set of a node.
    pub fn set_labels(&self, id: NodeId, labels: &LabelSet) -> Result<(), GraphError> {
        labels.validate()?;
        let affected = self
            .conn
            .prepare_cached("UPDATE nodes SET labels=?1 WHERE id=?2")
            .and_then(|mut stmt| stmt.execute(params![labels.encode(), id]))
            .map_err(|e| GraphError::query(e.to_string()))?;
        self.node_cache.remove(id);
        if affected == 0 {
            return Err(GraphError::not_found(format!("node {id}")));
        }
        Ok(())
    }

    /// Adds `label` to a node; `false` if it was already there.
    pub fn add_label(&self, id: NodeId, label: &str) -> Result<bool, GraphError> {
        let mut labels = self.load_node(id)?.labels;
        if labels.contains(label) {
            return Ok(false);
        }
        labels.insert(label);
        self.set_labels(id, &labels)?;
        Ok(true)
    }

    /// Removes `label` from a node; `false` if it was not there.
    pub fn remove_label(&self, id: NodeId, label: &str) -> Result<bool, GraphError> {
        let mut labels = self.load_node(id)?.labels;
        if !labels.remove(label) {
            return Ok(false);
        }
        self.set_labels(id, &labels)?;
        Ok(true)
    }

    pub fn node_has_label(&self, id: NodeId, label: &str) -> Result<bool, GraphError> {
        Ok(self.load_node(id)?.labels.contains(label))
    }

    /// Targets of edges leaving `id`, in edge insertion order.
    pub fn outgoing(&self, id: NodeId) -> Result<Vec<NodeId>, GraphError> {
        self.adjacent("SELECT target FROM edges WHERE source=?1 ORDER BY id", id)
    }

    /// Sources of edges entering `id`, in edge insertion order.
    pub fn incoming(&self, id: NodeId) -> Result<Vec<NodeId>, GraphError> {
        self.adjacent("SELECT source FROM edges WHERE target=?1 ORDER BY id", id)
    }

    fn adjacent(&self, sql: &str, id: NodeId) -> Result<Vec<NodeId>, GraphError> {
        let mut stmt = self
            .conn
            .prepare_cached(sql)
            .map_err(|e| GraphError::query(e.to_string()))?;
        let rows = stmt
            .query_map(params![id], |row| row.get::<_, NodeId>(0))
            .map_err(|e| GraphError::query(e.to_string()))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.map_err(|e| GraphError::query(e.to_string()))?);
        }
        Ok(ids)
    }

    pub fn node_ids(&self) -> Result<Vec<NodeId>, GraphError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id FROM nodes ORDER BY id")
            .map_err(|e| GraphError::query(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, NodeId>(0))
            .map_err(|e| GraphError::query(e.to_string()))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.map_err(|e| GraphError::query(e.to_string()))?);
        }
        Ok(ids)
    }

    pub fn node_exists(&self, id: NodeId) -> Result<bool, GraphError> {
        let exists: Option<i64> = self
            .conn
            .prepare_cached("SELECT 1 FROM nodes WHERE id=?1")
            .and_then(|mut stmt| stmt.query_row(params![id], |row| row.get(0)).optional())
            .map_err(|e| GraphError::query(e.to_string()))?;
        Ok(exists.is_some())
    }

    pub fn count(&self, kind: EntityKind) -> Result<i64, GraphError> {
        let sql = match kind {
            EntityKind::Node => "SELECT count(*) FROM nodes",
            EntityKind::Edge => "SELECT count(*) FROM edges",
        };
        self.conn
            .query_row(sql, [], |row| row.get(0))
            .map_err(|e| GraphError::query(e.to_string()))
    }

    pub fn stats(&self) -> Result<TableStats, GraphError> {
        Ok(TableStats {
            nodes: self.count(EntityKind::Node)?,
            edges: self.count(EntityKind::Edge)?,
        })
    }

    /// Nodes in insertion order.
    pub fn scan_nodes(&self) -> NodeScan<'_> {
        PagedScan::new(self, self.scan_page_size)
    }

    /// Edges in insertion order.
    pub fn scan_edges(&self) -> EdgeScan<'_> {
        PagedScan::new(self, self.scan_page_size)
    }

    /// Runs `f` as one atomic statement: every write inside it commits or none does.
    pub fn atomic<T, F>(&self, f: F) -> Result<T, GraphError>
    where
        F: FnOnce(&Self) -> Result<T, GraphError>,
    {
        self.conn
            .execute_batch(&format!("SAVEPOINT {STATEMENT_SAVEPOINT}"))
            .map_err(|e| GraphError::query(e.to_string()))?;
        match f(self) {
            Ok(value) => {
                self.conn
                    .execute_batch(&format!("RELEASE {STATEMENT_SAVEPOINT}"))
                    .map_err(|e| GraphError::query(e.to_string()))?;
                debug!("store.atomic.commit");
                Ok(value)
            }
            Err(err) => {
                if let Err(e) = self.conn.execute_batch(&format!(
                    "ROLLBACK TO {STATEMENT_SAVEPOINT}; RELEASE {STATEMENT_SAVEPOINT}"
                )) {
                    warn!(error = %e, "store.atomic.rollback_failed");
                }
                // Rolled-back ids can be handed out again.
                self.node_cache.clear();
                debug!(error = %err, "store.atomic.rollback");
                Err(err)
            }
        }
    }

    pub(crate) fn fetch_node_page(
        &self,
        after: NodeId,
        limit: usize,
    ) -> Result<Vec<Node>, GraphError> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT id, labels, properties FROM nodes WHERE id > ?1 ORDER BY id LIMIT ?2",
            )
            .map_err(|e| GraphError::query(e.to_string()))?;
        let rows = stmt
            .query_map(params![after, limit as i64], row_to_node)
            .map_err(|e| GraphError::query(e.to_string()))?;
        let mut nodes = Vec::new();
        for row in rows {
            nodes.push(row.map_err(|e| GraphError::query(e.to_string()))?);
        }
        Ok(nodes)
    }

    pub(crate) fn fetch_edge_page(
        &self,
        after: EdgeId,
        limit: usize,
    ) -> Result<Vec<Edge>, GraphError> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT id, source, target, edge_type, weight, properties FROM edges \
                 WHERE id > ?1 ORDER BY id LIMIT ?2",
            )
            .map_err(|e| GraphError::query(e.to_string()))?;
        let rows = stmt
            .query_map(params![after, limit as i64], row_to_edge)
            .map_err(|e| GraphError::query(e.to_string()))?;
        let mut edges = Vec::new();
        for row in rows {
            edges.push(row.map_err(|e| GraphError::query(e.to_string()))?);
        }
        Ok(edges)
    }
}
