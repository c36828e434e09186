//! Embedded property graph on SQLite.
//!
//! Nodes and edges live in two ordinary relations. A `graph` virtual table
//! exposes both as one stream of rows, and a Cypher subset (`CREATE`,
//! `MATCH`, `RETURN`) compiles onto cursors over that stream.
//! Run Criterion benchmarks with `cargo bench` to inspect reports under `target/criterion`.

pub mod algo;
pub mod cache;
pub mod config;
pub mod conformance;
pub mod cursor;
pub mod cypher;
pub mod engine;
pub mod errors;
pub mod graph;
pub mod plan;
pub mod result;
pub mod schema;
pub mod value;
pub mod vtab;

pub use crate::algo::{bfs_neighbors, shortest_path, strongly_connected_components};
pub use crate::config::{EngineConfig, SqliteConfig, open_engine};
pub use crate::conformance::{
    ConformanceReport, Expectation, Scenario, ScenarioOutcome, run_all, run_scenario,
};
pub use crate::cursor::{CursorState, GraphColumn, GraphCursor, GraphRow};
pub use crate::engine::{Engine, EngineStatus};
pub use crate::errors::{ErrorKind, GraphError};
pub use crate::graph::{Edge, EdgeId, EdgeSpec, EntityKind, GraphStore, LabelSet, Node, NodeId};
pub use crate::plan::{PlanChoice, ScanPlan, select_plan};
pub use crate::result::{QueryResult, ResultSet, Row, Value};
pub use crate::value::{PropertyMap, PropertyValue};
