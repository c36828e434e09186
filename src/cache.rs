use ahash::AHashMap;
use parking_lot::RwLock;

use crate::graph::{Node, NodeId};

pub const DEFAULT_NODE_CACHE_CAPACITY: usize = 4096;

/// Id-to-node cache for endpoint resolution during edge matching.
///
/// Holds at most `capacity` nodes. The store clears it at the start of every
/// statement, so a write made through the raw connection is seen by the next one.
#[derive(Debug)]
pub struct NodeCache {
    inner: RwLock<AHashMap<NodeId, Node>>,
    capacity: usize,
}

impl Default for NodeCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_NODE_CACHE_CAPACITY)
    }
}

impl NodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(AHashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, id: NodeId) -> Option<Node> {
        self.inner.read().get(&id).cloned()
    }

    pub fn insert(&self, node: Node) {
        let mut map = self.inner.write();
        if map.len() >= self.capacity && !map.contains_key(&node.id) {
            let victim = map.keys().next().copied();
            if let Some(victim) = victim {
                map.remove(&victim);
            }
        }
        map.insert(node.id, node);
    }

    pub fn remove(&self, id: NodeId) {
        self.inner.write().remove(&id);
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }
}
