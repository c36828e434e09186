//! Cursor over the backing relations.
//!
//! ```text
//!                open(FullScan)         nodes drained
//! Uninitialized ───────────────▶ NodeMode ────────────▶ EdgeMode ──▶ Exhausted
//!       │  open(TypeFiltered, "node") ▲                    ▲
//!       ├─────────────────────────────┘                    │
//!       ├── open(TypeFiltered, "edge") ────────────────────┘
//!       └── open(TypeFiltered, other) ──▶ Invalid (no rows)
//! ```

use rusqlite::types::Value;
use tracing::{debug, trace};

use crate::{
    errors::GraphError,
    graph::{Edge, EdgeScan, EntityKind, GraphStore, Node, NodeScan},
    plan::{OfferedConstraint, ScanPlan, TableStats, select_plan},
};

/// Columns exposed by the graph virtual table, in declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphColumn {
    Type,
    Id,
    Source,
    Target,
    Labels,
    EdgeType,
    Weight,
    Properties,
}

impl GraphColumn {
    pub const ALL: [GraphColumn; 8] = [
        GraphColumn::Type,
        GraphColumn::Id,
        GraphColumn::Source,
        GraphColumn::Target,
        GraphColumn::Labels,
        GraphColumn::EdgeType,
        GraphColumn::Weight,
        GraphColumn::Properties,
    ];

    pub fn index(&self) -> i32 {
        *self as i32
    }

    pub fn from_index(index: i32) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn name(&self) -> &'static str {
        match self {
            GraphColumn::Type => "type",
            GraphColumn::Id => "id",
            GraphColumn::Source => "source",
            GraphColumn::Target => "target",
            GraphColumn::Labels => "labels",
            GraphColumn::EdgeType => "edge_type",
            GraphColumn::Weight => "weight",
            GraphColumn::Properties => "properties",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GraphRow {
    Node(Node),
    Edge(Edge),
}

impl GraphRow {
    pub fn kind(&self) -> EntityKind {
        match self {
            GraphRow::Node(_) => EntityKind::Node,
            GraphRow::Edge(_) => EntityKind::Edge,
        }
    }

    pub fn id(&self) -> i64 {
        match self {
            GraphRow::Node(node) => node.id,
            GraphRow::Edge(edge) => edge.id,
        }
    }

    pub fn column(&self, column: GraphColumn) -> Value {
        match (self, column) {
            (row, GraphColumn::Type) => Value::Text(row.kind().as_str().to_string()),
            (row, GraphColumn::Id) => Value::Integer(row.id()),
            (GraphRow::Node(node), GraphColumn::Labels) => Value::Text(node.labels.encode()),
            (GraphRow::Node(node), GraphColumn::Properties) => properties_text(&node.properties),
            (GraphRow::Node(_), _) => Value::Null,
            (GraphRow::Edge(edge), GraphColumn::Source) => Value::Integer(edge.source),
            (GraphRow::Edge(edge), GraphColumn::Target) => Value::Integer(edge.target),
            (GraphRow::Edge(edge), GraphColumn::EdgeType) => Value::Text(edge.edge_type.clone()),
            (GraphRow::Edge(edge), GraphColumn::Weight) => {
                edge.weight.map(Value::Real).unwrap_or(Value::Null)
            }
            (GraphRow::Edge(edge), GraphColumn::Properties) => properties_text(&edge.properties),
            (GraphRow::Edge(_), GraphColumn::Labels) => Value::Null,
        }
    }
}

fn properties_text(properties: &crate::value::PropertyMap) -> Value {
    crate::value::encode_properties(properties)
        .map(Value::Text)
        .unwrap_or(Value::Null)
}

pub enum CursorState<'s> {
    Uninitialized,
    NodeMode {
        scan: NodeScan<'s>,
        chain_edges: bool,
    },
    EdgeMode {
        scan: EdgeScan<'s>,
    },
    Invalid,
    Exhausted,
}

impl CursorState<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            CursorState::Uninitialized => "uninitialized",
            CursorState::NodeMode { .. } => "node",
            CursorState::EdgeMode { .. } => "edge",
            CursorState::Invalid => "invalid",
            CursorState::Exhausted => "exhausted",
        }
    }
}

/// Single-user iterator over one access path. Not shareable across callers.
pub struct GraphCursor<'s> {
    store: &'s GraphStore,
    state: CursorState<'s>,
    current: Option<GraphRow>,
    position: i64,
}

impl<'s> GraphCursor<'s> {
    pub fn new(store: &'s GraphStore) -> Self {
        Self {
            store,
            state: CursorState::Uninitialized,
            current: None,
            position: 0,
        }
    }

    /// Opens a cursor over one entity kind, planned as if `type = kind` were offered.
    pub fn open_kind(store: &'s GraphStore, kind: EntityKind) -> Result<Self, GraphError> {
        let choice = select_plan(&[OfferedConstraint::type_eq()], &TableStats::default());
        let mut cursor = Self::new(store);
        cursor.open(choice.plan, Some(kind.as_str()))?;
        Ok(cursor)
    }

    /// Chooses the access path and positions on the first row.
    ///
    /// An unrecognized discriminator puts the cursor in `Invalid`, which yields
    /// no rows. Opening an already-open cursor restarts it.
    pub fn open(&mut self, plan: ScanPlan, discriminator: Option<&str>) -> Result<(), GraphError> {
        self.close();
        self.position = 0;
        self.state = match plan {
            ScanPlan::FullScan => CursorState::NodeMode {
                scan: self.store.scan_nodes(),
                chain_edges: true,
            },
            ScanPlan::TypeFiltered => {
                let resolved = discriminator
                    .ok_or_else(|| GraphError::invalid_filter("missing type filter value"))
                    .and_then(EntityKind::from_discriminator);
                match resolved {
                    Ok(EntityKind::Node) => CursorState::NodeMode {
                        scan: self.store.scan_nodes(),
                        chain_edges: false,
                    },
                    Ok(EntityKind::Edge) => CursorState::EdgeMode {
                        scan: self.store.scan_edges(),
                    },
                    Err(GraphError::InvalidFilter(reason)) => {
                        debug!(%reason, "cursor.open.invalid_filter");
                        CursorState::Invalid
                    }
                    Err(other) => return Err(other),
                }
            }
        };
        debug!(plan = ?plan, mode = self.state.name(), "cursor.open");
        self.next()
    }

    /// Advances to the next row, moving to `Exhausted` once the scan drains.
    pub fn next(&mut self) -> Result<(), GraphError> {
        loop {
            match &mut self.state {
                CursorState::Uninitialized | CursorState::Invalid | CursorState::Exhausted => {
                    self.current = None;
                    return Ok(());
                }
                CursorState::NodeMode { scan, chain_edges } => match scan.next() {
                    Some(Ok(node)) => {
                        self.position += 1;
                        self.current = Some(GraphRow::Node(node));
                        return Ok(());
                    }
                    Some(Err(err)) => {
                        self.fail();
                        return Err(err);
                    }
                    None if *chain_edges => {
                        trace!("cursor.node_mode.drained");
                        self.state = CursorState::EdgeMode {
                            scan: self.store.scan_edges(),
                        };
                    }
                    None => self.exhaust(),
                },
                CursorState::EdgeMode { scan } => match scan.next() {
                    Some(Ok(edge)) => {
                        self.position += 1;
                        self.current = Some(GraphRow::Edge(edge));
                        return Ok(());
                    }
                    Some(Err(err)) => {
                        self.fail();
                        return Err(err);
                    }
                    None => self.exhaust(),
                },
            }
        }
    }

    /// The row under the cursor; `None` before `open`, after exhaustion and when invalid.
    pub fn current(&self) -> Option<&GraphRow> {
        match self.state {
            CursorState::NodeMode { .. } | CursorState::EdgeMode { .. } => self.current.as_ref(),
            _ => None,
        }
    }

    pub fn is_eof(&self) -> bool {
        self.current().is_none()
    }

    /// Count of rows produced since the last `open`; also the row's rowid.
    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn state(&self) -> &CursorState<'s> {
        &self.state
    }

    /// Releases the scan. Idempotent.
    pub fn close(&mut self) {
        if !matches!(self.state, CursorState::Uninitialized) {
            self.state = CursorState::Exhausted;
        }
        self.current = None;
    }

    pub fn rows(self) -> CursorRows<'s> {
        CursorRows { cursor: self }
    }

    fn exhaust(&mut self) {
        trace!(rows = self.position, "cursor.exhausted");
        self.state = CursorState::Exhausted;
        self.current = None;
    }

    fn fail(&mut self) {
        self.state = CursorState::Exhausted;
        self.current = None;
    }
}

/// Iterator adapter over an opened cursor.
pub struct CursorRows<'s> {
    cursor: GraphCursor<'s>,
}

impl Iterator for CursorRows<'_> {
    type Item = Result<GraphRow, GraphError>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.cursor.current.take()?;
        match self.cursor.next() {
            Ok(()) => Some(Ok(row)),
            Err(err) => Some(Err(err)),
        }
    }
}
