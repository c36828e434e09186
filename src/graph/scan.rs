//! Lazy, paged scans over the backing relations.
//!
//! A scan keeps no statement open between pages: it remembers the last id it
//! handed out and fetches the next page with `id > last ORDER BY id`. Scans are
//! finite and single-pass; calling `scan_nodes`/`scan_edges` again restarts.

use std::collections::VecDeque;

use crate::errors::GraphError;

use super::{
    store::GraphStore,
    types::{Edge, Node},
};

/// Rows that can be fetched page by page in id order.
pub trait ScanRow: Sized {
    fn row_id(&self) -> i64;

    fn fetch_page(store: &GraphStore, after: i64, limit: usize) -> Result<Vec<Self>, GraphError>;
}

impl ScanRow for Node {
    fn row_id(&self) -> i64 {
        self.id
    }

    fn fetch_page(store: &GraphStore, after: i64, limit: usize) -> Result<Vec<Self>, GraphError> {
        store.fetch_node_page(after, limit)
    }
}

impl ScanRow for Edge {
    fn row_id(&self) -> i64 {
        self.id
    }

    fn fetch_page(store: &GraphStore, after: i64, limit: usize) -> Result<Vec<Self>, GraphError> {
        store.fetch_edge_page(after, limit)
    }
}

pub struct PagedScan<'a, T: ScanRow> {
    store: &'a GraphStore,
    after: i64,
    page_size: usize,
    buffer: VecDeque<T>,
    drained: bool,
}

pub type NodeScan<'a> = PagedScan<'a, Node>;
pub type EdgeScan<'a> = PagedScan<'a, Edge>;

impl<'a, T: ScanRow> PagedScan<'a, T> {
    pub(crate) fn new(store: &'a GraphStore, page_size: usize) -> Self {
        Self {
            store,
            after: i64::MIN,
            page_size: page_size.max(1),
            buffer: VecDeque::new(),
            drained: false,
        }
    }

    fn refill(&mut self) -> Result<(), GraphError> {
        let page = T::fetch_page(self.store, self.after, self.page_size)?;
        if page.len() < self.page_size {
            self.drained = true;
        }
        if let Some(last) = page.last() {
            self.after = last.row_id();
        }
        self.buffer.extend(page);
        Ok(())
    }
}

impl<T: ScanRow> Iterator for PagedScan<'_, T> {
    type Item = Result<T, GraphError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(row) = self.buffer.pop_front() {
            return Some(Ok(row));
        }
        if self.drained {
            return None;
        }
        if let Err(err) = self.refill() {
            self.drained = true;
            return Some(Err(err));
        }
        self.buffer.pop_front().map(Ok)
    }
}
