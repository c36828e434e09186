//! Traversals over the backing store, following edges by their direction.

use std::collections::VecDeque;

use ahash::{AHashMap, AHashSet};
use tracing::debug;

use crate::{
    errors::GraphError,
    graph::{GraphStore, NodeId},
};

/// Nodes reachable from `start` within `max_depth` outgoing hops, in BFS order.
pub fn bfs_neighbors(
    store: &GraphStore,
    start: NodeId,
    max_depth: u32,
) -> Result<Vec<NodeId>, GraphError> {
    store.get_node(start)?;
    let mut visited = Vec::new();
    let mut seen = AHashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back((start, 0));
    seen.insert(start);
    while let Some((node, depth)) = queue.pop_front() {
        visited.push(node);
        if depth >= max_depth {
            continue;
        }
        for next in store.outgoing(node)? {
            if seen.insert(next) {
                queue.push_back((next, depth + 1));
            }
        }
    }
    Ok(visited)
}

/// Fewest-hop directed path from `start` to `end`, both included.
pub fn shortest_path(
    store: &GraphStore,
    start: NodeId,
    end: NodeId,
) -> Result<Option<Vec<NodeId>>, GraphError> {
    store.get_node(start)?;
    store.get_node(end)?;
    if start == end {
        return Ok(Some(vec![start]));
    }
    let mut queue = VecDeque::new();
    let mut parents: AHashMap<NodeId, NodeId> = AHashMap::new();
    queue.push_back(start);
    parents.insert(start, start);
    while let Some(node) = queue.pop_front() {
        for next in store.outgoing(node)? {
            if parents.contains_key(&next) {
                continue;
            }
            parents.insert(next, node);
            if next == end {
                let mut path = vec![end];
                let mut current = end;
                while current != start {
                    current = parents[&current];
                    path.push(current);
                }
                path.reverse();
                return Ok(Some(path));
            }
            queue.push_back(next);
        }
    }
    Ok(None)
}

struct Frame {
    node: NodeId,
    successors: Vec<NodeId>,
    next: usize,
}

/// Strongly connected components (Tarjan), each sorted by id and ordered by
/// their smallest member. Nodes without a cycle form singleton components.
pub fn strongly_connected_components(
    store: &GraphStore,
) -> Result<Vec<Vec<NodeId>>, GraphError> {
    let mut index: AHashMap<NodeId, usize> = AHashMap::new();
    let mut lowlink: AHashMap<NodeId, usize> = AHashMap::new();
    let mut on_stack = AHashSet::new();
    let mut stack = Vec::new();
    let mut components = Vec::new();
    let mut counter = 0;

    for root in store.node_ids()? {
        if index.contains_key(&root) {
            continue;
        }
        let mut frames = vec![Frame {
            node: root,
            successors: store.outgoing(root)?,
            next: 0,
        }];
        index.insert(root, counter);
        lowlink.insert(root, counter);
        counter += 1;
        stack.push(root);
        on_stack.insert(root);

        while let Some(frame) = frames.last_mut() {
            let node = frame.node;
            if let Some(&next) = frame.successors.get(frame.next) {
                frame.next += 1;
                if let Some(&seen) = index.get(&next) {
                    if on_stack.contains(&next) {
                        let low = lowlink[&node].min(seen);
                        lowlink.insert(node, low);
                    }
                    continue;
                }
                index.insert(next, counter);
                lowlink.insert(next, counter);
                counter += 1;
                stack.push(next);
                on_stack.insert(next);
                frames.push(Frame {
                    node: next,
                    successors: store.outgoing(next)?,
                    next: 0,
                });
                continue;
            }

            frames.pop();
            if let Some(parent) = frames.last() {
                let low = lowlink[&parent.node].min(lowlink[&node]);
                lowlink.insert(parent.node, low);
            }
            if lowlink[&node] == index[&node] {
                let mut component = Vec::new();
                while let Some(member) = stack.pop() {
                    on_stack.remove(&member);
                    component.push(member);
                    if member == node {
                        break;
                    }
                }
                component.sort_unstable();
                components.push(component);
            }
        }
    }
    components.sort_by_key(|component| component[0]);
    debug!(components = components.len(), "algo.scc");
    Ok(components)
}
