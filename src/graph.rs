//! Backing store: the `nodes` and `edges` relations and their access primitives.

mod scan;
mod store;
mod types;

pub use scan::{EdgeScan, NodeScan, PagedScan, ScanRow};
pub use store::{DEFAULT_SCAN_PAGE_SIZE, GraphStore};
pub use types::{
    Edge, EdgeId, EdgeSpec, EntityKind, LabelSet, Node, NodeId, row_to_edge, row_to_node,
};
