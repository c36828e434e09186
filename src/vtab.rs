//! Read-only `graph` virtual table over the backing relations.
//!
//! ```sql
//! CREATE VIRTUAL TABLE g USING graph;
//! SELECT id, labels FROM g WHERE type = 'node';
//! ```

use std::os::raw::c_int;

use rusqlite::{
    Connection, ffi,
    types::Value,
    vtab::{
        Context, CreateVTab, IndexConstraintOp, IndexInfo, VTab, VTabConnection, VTabCursor,
        VTabKind, Values, read_only_module,
    },
};
use tracing::{debug, warn};

use crate::{
    cursor::{GraphColumn, GraphCursor},
    errors::GraphError,
    graph::GraphStore,
    plan::{ConstraintOp, OfferedConstraint, ScanPlan, select_plan},
    schema::{ensure_schema, verify_schema},
};

pub const MODULE_NAME: &str = "graph";

const DECLARED_SCHEMA: &str = "CREATE TABLE x(type TEXT, id INTEGER, source INTEGER, \
     target INTEGER, labels TEXT, edge_type TEXT, weight REAL, properties TEXT)";

/// Registers the `graph` module on `conn`.
pub fn register(conn: &Connection) -> Result<(), GraphError> {
    conn.create_module(MODULE_NAME, read_only_module::<GraphTab>(), None)
        .map_err(|e| GraphError::connection(e.to_string()))?;
    debug!(module = MODULE_NAME, "vtab.register");
    Ok(())
}

#[repr(C)]
pub struct GraphTab {
    base: ffi::sqlite3_vtab,
    store: GraphStore,
    verified: bool,
}

impl GraphTab {
    fn attach(db: &mut VTabConnection) -> rusqlite::Result<Self> {
        // Shares the host connection's handle; the host outlives every table.
        let conn = unsafe { Connection::from_handle(db.handle()) }?;
        Ok(Self {
            base: ffi::sqlite3_vtab::default(),
            store: GraphStore::attach(conn),
            verified: false,
        })
    }
}

unsafe impl<'vtab> VTab<'vtab> for GraphTab {
    type Aux = ();
    type Cursor = GraphTabCursor<'vtab>;

    fn connect(
        db: &mut VTabConnection,
        _aux: Option<&()>,
        _args: &[&[u8]],
    ) -> rusqlite::Result<(String, Self)> {
        let tab = Self::attach(db)?;
        Ok((DECLARED_SCHEMA.to_string(), tab))
    }

    fn best_index(&self, info: &mut IndexInfo) -> rusqlite::Result<()> {
        let offered: Vec<OfferedConstraint> = info
            .constraints()
            .map(|constraint| OfferedConstraint {
                column: constraint.column(),
                op: if matches!(
                    constraint.operator(),
                    IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_EQ
                ) {
                    ConstraintOp::Eq
                } else {
                    ConstraintOp::Other
                },
                usable: constraint.is_usable(),
            })
            .collect();
        let stats = self.store.stats().unwrap_or_else(|err| {
            warn!(error = %err, "vtab.best_index.stats_unavailable");
            Default::default()
        });
        let choice = select_plan(&offered, &stats);
        if let Some(index) = choice.consumed {
            let mut usage = info.constraint_usage(index);
            usage.set_argv_index(1);
            usage.set_omit(true);
        }
        info.set_idx_num(choice.plan.idx_num());
        info.set_estimated_cost(choice.estimated_cost);
        Ok(())
    }

    fn open(&'vtab mut self) -> rusqlite::Result<GraphTabCursor<'vtab>> {
        if !self.verified {
            verify_schema(self.store.connection())?;
            self.verified = true;
        }
        Ok(GraphTabCursor {
            base: ffi::sqlite3_vtab_cursor::default(),
            cursor: GraphCursor::new(&self.store),
        })
    }
}

impl CreateVTab<'_> for GraphTab {
    const KIND: VTabKind = VTabKind::Default;

    fn create(
        db: &mut VTabConnection,
        _aux: Option<&()>,
        _args: &[&[u8]],
    ) -> rusqlite::Result<(String, Self)> {
        let mut tab = Self::attach(db)?;
        ensure_schema(tab.store.connection())?;
        tab.verified = true;
        Ok((DECLARED_SCHEMA.to_string(), tab))
    }
}

#[repr(C)]
pub struct GraphTabCursor<'vtab> {
    base: ffi::sqlite3_vtab_cursor,
    cursor: GraphCursor<'vtab>,
}

unsafe impl VTabCursor for GraphTabCursor<'_> {
    fn filter(
        &mut self,
        idx_num: c_int,
        _idx_str: Option<&str>,
        args: &Values<'_>,
    ) -> rusqlite::Result<()> {
        let plan = ScanPlan::from_idx_num(idx_num);
        let discriminator = match plan {
            ScanPlan::TypeFiltered if !args.is_empty() => match args.get::<Value>(0)? {
                Value::Text(text) => Some(text),
                // `type = 1` or `type = NULL` can never match.
                _ => Some(String::new()),
            },
            _ => None,
        };
        self.cursor.open(plan, discriminator.as_deref())?;
        Ok(())
    }

    fn next(&mut self) -> rusqlite::Result<()> {
        self.cursor.next()?;
        Ok(())
    }

    fn eof(&self) -> bool {
        self.cursor.is_eof()
    }

    fn column(&self, ctx: &mut Context, i: c_int) -> rusqlite::Result<()> {
        let value = match (self.cursor.current(), GraphColumn::from_index(i)) {
            (Some(row), Some(column)) => row.column(column),
            _ => Value::Null,
        };
        ctx.set_result(&value)
    }

    fn rowid(&self) -> rusqlite::Result<i64> {
        Ok(self.cursor.position())
    }
}
