//! Runs compiled statements against the store.
//!
//! MATCH is a depth-first nested loop over [`MatchStep`]s: every scanning step
//! owns its own cursor, and a row is emitted each time the innermost step binds.
//! Read-only statements stream; statements with CREATE collect their matches
//! first and write them inside one savepoint.

use ahash::AHashMap;
use tracing::debug;

use crate::{
    cursor::{CursorRows, GraphCursor, GraphRow},
    errors::GraphError,
    graph::{Edge, EdgeSpec, EntityKind, GraphStore, Node, NodeId},
    result::{QueryResult, Row, Value},
    value::{PropertyMap, PropertyValue},
};

use super::{
    ast::{ComparisonOp, Direction},
    compiler::{
        CompiledQuery, CreateOp, Expr, Function, MatchStep, NodeFilter, Projection,
        ProjectionItem, RelationshipFilter, Slot,
    },
};

pub(crate) type Frame = Vec<Value>;

pub(crate) fn execute(
    store: &GraphStore,
    query: CompiledQuery,
) -> Result<QueryResult<'_>, GraphError> {
    store.begin_statement();
    let columns = query.columns().to_vec();
    let CompiledQuery {
        slot_count,
        match_steps,
        creates,
        projection,
        ..
    } = query;
    let matches = MatchStream::new(store, match_steps, slot_count);

    if creates.is_empty() {
        return Ok(match projection {
            Some(projection) => project(columns, matches, projection),
            None => QueryResult::empty(columns),
        });
    }

    let mut frames = matches.collect::<Result<Vec<Frame>, GraphError>>()?;
    store.atomic(|store| {
        for frame in frames.iter_mut() {
            apply_creates(store, &creates, frame)?;
        }
        Ok(())
    })?;
    debug!(
        rows = frames.len(),
        ops = creates.len(),
        "cypher.create.commit"
    );
    Ok(match projection {
        Some(projection) => project(columns, frames.into_iter().map(Ok), projection),
        None => QueryResult::empty(columns),
    })
}

fn apply_creates(
    store: &GraphStore,
    ops: &[CreateOp],
    frame: &mut Frame,
) -> Result<(), GraphError> {
    for op in ops {
        match op {
            CreateOp::Node {
                slot,
                labels,
                properties,
            } => {
                let id = store.create_node(labels, properties)?;
                frame[*slot] = Value::Node(Node {
                    id,
                    labels: labels.clone(),
                    properties: without_nulls(properties),
                });
            }
            CreateOp::Edge {
                slot,
                source,
                target,
                edge_type,
                properties,
            } => {
                let mut spec = EdgeSpec::new(
                    endpoint_id(frame, *source)?,
                    endpoint_id(frame, *target)?,
                    edge_type.as_str(),
                );
                spec.weight = properties.get("weight").and_then(PropertyValue::as_f64);
                spec.properties = properties.clone();
                let id = store.create_edge(&spec)?;
                frame[*slot] = Value::Edge(Edge {
                    id,
                    source: spec.source,
                    target: spec.target,
                    edge_type: spec.edge_type,
                    weight: spec.weight,
                    properties: without_nulls(properties),
                });
            }
        }
    }
    Ok(())
}

fn endpoint_id(frame: &Frame, slot: Slot) -> Result<NodeId, GraphError> {
    match &frame[slot] {
        Value::Node(node) => Ok(node.id),
        other => Err(GraphError::referential(format!(
            "relationship endpoint is a {}, not a node",
            other.type_name()
        ))),
    }
}

fn without_nulls(properties: &PropertyMap) -> PropertyMap {
    properties
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

enum Level<'s> {
    Once {
        pending: bool,
    },
    Nodes(CursorRows<'s>),
    Edges {
        rows: CursorRows<'s>,
        edge: Option<Edge>,
        /// Far endpoints of `edge` not yet tried; popped from the back.
        pending: Vec<NodeId>,
    },
}

pub(crate) struct MatchStream<'s> {
    store: &'s GraphStore,
    steps: Vec<MatchStep>,
    frame: Frame,
    levels: Vec<Level<'s>>,
    started: bool,
    finished: bool,
}

impl<'s> MatchStream<'s> {
    pub(crate) fn new(store: &'s GraphStore, steps: Vec<MatchStep>, slot_count: usize) -> Self {
        Self {
            store,
            steps,
            frame: vec![Value::Null; slot_count],
            levels: Vec::new(),
            started: false,
            finished: false,
        }
    }

    fn fail(&mut self, err: GraphError) -> Option<Result<Frame, GraphError>> {
        self.finished = true;
        self.levels.clear();
        Some(Err(err))
    }
}

impl Iterator for MatchStream<'_> {
    type Item = Result<Frame, GraphError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if !self.started {
            self.started = true;
            if self.steps.is_empty() {
                self.finished = true;
                return Some(Ok(self.frame.clone()));
            }
            match open_level(self.store, &self.steps[0]) {
                Ok(level) => self.levels.push(level),
                Err(err) => return self.fail(err),
            }
        }
        while let Some(depth) = self.levels.len().checked_sub(1) {
            let advanced = advance(
                self.store,
                &self.steps[depth],
                &mut self.levels[depth],
                &mut self.frame,
            );
            match advanced {
                Err(err) => return self.fail(err),
                Ok(false) => {
                    self.levels.pop();
                }
                Ok(true) if depth + 1 == self.steps.len() => {
                    return Some(Ok(self.frame.clone()));
                }
                Ok(true) => match open_level(self.store, &self.steps[depth + 1]) {
                    Ok(level) => self.levels.push(level),
                    Err(err) => return self.fail(err),
                },
            }
        }
        self.finished = true;
        None
    }
}

fn open_level<'s>(store: &'s GraphStore, step: &MatchStep) -> Result<Level<'s>, GraphError> {
    Ok(match step {
        MatchStep::ScanNodes { .. } => {
            Level::Nodes(GraphCursor::open_kind(store, EntityKind::Node)?.rows())
        }
        MatchStep::Expand { .. } => Level::Edges {
            rows: GraphCursor::open_kind(store, EntityKind::Edge)?.rows(),
            edge: None,
            pending: Vec::new(),
        },
        MatchStep::CheckNode { .. } | MatchStep::Filter(_) => Level::Once { pending: true },
    })
}

/// Binds the next candidate for `step` into `frame`; `false` once the level is drained.
fn advance(
    store: &GraphStore,
    step: &MatchStep,
    level: &mut Level<'_>,
    frame: &mut Frame,
) -> Result<bool, GraphError> {
    match (step, level) {
        (MatchStep::ScanNodes { slot, filter }, Level::Nodes(rows)) => {
            for row in rows.by_ref() {
                let GraphRow::Node(node) = row? else {
                    continue;
                };
                if node_matches(&node, filter) {
                    frame[*slot] = Value::Node(node);
                    return Ok(true);
                }
            }
            Ok(false)
        }
        (MatchStep::CheckNode { slot, filter }, Level::Once { pending }) => {
            if !std::mem::take(pending) {
                return Ok(false);
            }
            Ok(matches!(&frame[*slot], Value::Node(node) if node_matches(node, filter)))
        }
        (MatchStep::Filter(predicate), Level::Once { pending }) => {
            if !std::mem::take(pending) {
                return Ok(false);
            }
            Ok(matches!(evaluate(predicate, frame)?, Value::Bool(true)))
        }
        (
            MatchStep::Expand {
                from,
                edge_slot,
                node_slot,
                node_bound,
                direction,
                relationship,
                node,
                distinct_from,
            },
            Level::Edges {
                rows,
                edge,
                pending,
            },
        ) => {
            let from_id = match &frame[*from] {
                Value::Node(start) => start.id,
                _ => return Ok(false),
            };
            loop {
                if let (Some(other), Some(current)) = (pending.pop(), edge.as_ref()) {
                    if *node_bound {
                        let bound = matches!(
                            &frame[*node_slot],
                            Value::Node(n) if n.id == other && node_matches(n, node)
                        );
                        if !bound {
                            continue;
                        }
                    } else {
                        let far = store.get_node(other)?;
                        if !node_matches(&far, node) {
                            continue;
                        }
                        frame[*node_slot] = Value::Node(far);
                    }
                    frame[*edge_slot] = Value::Edge(current.clone());
                    return Ok(true);
                }
                let Some(row) = rows.next() else {
                    return Ok(false);
                };
                let GraphRow::Edge(candidate) = row? else {
                    continue;
                };
                if !edge_matches(&candidate, relationship) {
                    continue;
                }
                let reused = distinct_from.iter().any(
                    |slot| matches!(&frame[*slot], Value::Edge(bound) if bound.id == candidate.id),
                );
                if reused {
                    continue;
                }
                *pending = far_endpoints(&candidate, from_id, *direction);
                *edge = Some(candidate);
            }
        }
        _ => Err(GraphError::query("match step and cursor level disagree")),
    }
}

/// Endpoints reachable from `from` over `edge`, in the order they should be tried
/// (reversed, for popping). A self-loop is traversed once.
fn far_endpoints(edge: &Edge, from: NodeId, direction: Direction) -> Vec<NodeId> {
    let mut ends = Vec::with_capacity(2);
    let forward = edge.source == from;
    let backward = edge.target == from;
    match direction {
        Direction::Outgoing if forward => ends.push(edge.target),
        Direction::Incoming if backward => ends.push(edge.source),
        Direction::Undirected => {
            if forward {
                ends.push(edge.target);
            }
            if backward && edge.source != edge.target {
                ends.push(edge.source);
            }
        }
        _ => {}
    }
    ends.reverse();
    ends
}

fn node_matches(node: &Node, filter: &NodeFilter) -> bool {
    node.labels.contains_all(&filter.labels)
        && properties_match(&node.properties, &filter.properties)
}

fn edge_matches(edge: &Edge, filter: &RelationshipFilter) -> bool {
    (filter.types.is_empty() || filter.types.iter().any(|t| *t == edge.edge_type))
        && properties_match(&edge.properties, &filter.properties)
}

fn properties_match(actual: &PropertyMap, expected: &PropertyMap) -> bool {
    expected.iter().all(|(key, want)| {
        actual
            .get(key)
            .is_some_and(|have| Value::from(have).equals(&Value::from(want)) == Some(true))
    })
}

fn project<'s, I>(columns: Vec<String>, frames: I, projection: Projection) -> QueryResult<'s>
where
    I: Iterator<Item = Result<Frame, GraphError>> + 's,
{
    if !projection.is_aggregating() {
        let rows = frames.map(move |frame| {
            let frame = frame?;
            projection
                .items
                .iter()
                .map(|item| match item {
                    ProjectionItem::Value(expr) => evaluate(expr, &frame),
                    _ => Err(GraphError::query("aggregate in non-aggregating projection")),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Row::new)
        });
        return QueryResult::new(columns, rows);
    }

    let mut source = Some((frames, projection));
    let mut output = Vec::new().into_iter();
    let rows = std::iter::from_fn(move || {
        if let Some((frames, projection)) = source.take() {
            match aggregate(frames, &projection.items) {
                Ok(rows) => output = rows.into_iter(),
                Err(err) => return Some(Err(err)),
            }
        }
        output.next().map(Ok)
    });
    QueryResult::new(columns, rows)
}

struct Group {
    keys: Vec<Value>,
    counts: Vec<i64>,
}

/// Groups by the non-aggregate items in first-seen order and counts per group.
fn aggregate<I>(frames: I, items: &[ProjectionItem]) -> Result<Vec<Row>, GraphError>
where
    I: Iterator<Item = Result<Frame, GraphError>>,
{
    let aggregates = items.iter().filter(|item| item.is_aggregate()).count();
    let mut index: AHashMap<String, usize> = AHashMap::new();
    let mut groups: Vec<Group> = Vec::new();
    for frame in frames {
        let frame = frame?;
        let mut keys = Vec::new();
        for item in items {
            if let ProjectionItem::Value(expr) = item {
                keys.push(evaluate(expr, &frame)?);
            }
        }
        let signature = keys.iter().map(group_key).collect::<Vec<_>>().join("\u{1f}");
        let position = *index.entry(signature).or_insert_with(|| {
            groups.push(Group {
                keys,
                counts: vec![0; aggregates],
            });
            groups.len() - 1
        });
        let mut counter = 0;
        for item in items {
            match item {
                ProjectionItem::Value(_) => continue,
                ProjectionItem::CountStar => groups[position].counts[counter] += 1,
                ProjectionItem::Count(expr) => {
                    if !evaluate(expr, &frame)?.is_null() {
                        groups[position].counts[counter] += 1;
                    }
                }
            }
            counter += 1;
        }
    }
    if groups.is_empty() && aggregates == items.len() {
        groups.push(Group {
            keys: Vec::new(),
            counts: vec![0; aggregates],
        });
    }
    Ok(groups
        .into_iter()
        .map(|group| {
            let mut keys = group.keys.into_iter();
            let mut counts = group.counts.into_iter();
            let values = items
                .iter()
                .map(|item| match item {
                    ProjectionItem::Value(_) => keys.next().unwrap_or(Value::Null),
                    _ => counts.next().map(Value::Integer).unwrap_or(Value::Null),
                })
                .collect();
            Row::new(values)
        })
        .collect())
}

/// Identity of a grouping value: entities by id, at any nesting depth.
fn group_key(value: &Value) -> String {
    match value {
        Value::Node(node) => format!("node#{}", node.id),
        Value::Edge(edge) => format!("edge#{}", edge.id),
        Value::String(s) => format!("s:{s:?}"),
        Value::List(items) => {
            let items: Vec<String> = items.iter().map(group_key).collect();
            format!("[{}]", items.join(","))
        }
        Value::Map(entries) => {
            let entries: Vec<String> = entries
                .iter()
                .map(|(key, value)| format!("{key:?}:{}", group_key(value)))
                .collect();
            format!("{{{}}}", entries.join(","))
        }
        other => other.to_string(),
    }
}

fn type_error(expected: &str, found: &Value) -> GraphError {
    GraphError::query(format!(
        "type error: expected {expected}, found {}",
        found.type_name()
    ))
}

fn truth(value: &Value) -> Result<Option<bool>, GraphError> {
    match value {
        Value::Bool(b) => Ok(Some(*b)),
        Value::Null => Ok(None),
        other => Err(type_error("boolean", other)),
    }
}

fn from_truth(value: Option<bool>) -> Value {
    value.map(Value::Bool).unwrap_or(Value::Null)
}

pub(crate) fn evaluate(expr: &Expr, frame: &Frame) -> Result<Value, GraphError> {
    match expr {
        Expr::Constant(value) => Ok(value.clone()),
        Expr::Slot(slot) => Ok(frame[*slot].clone()),
        Expr::List(items) => Ok(Value::List(
            items
                .iter()
                .map(|item| evaluate(item, frame))
                .collect::<Result<_, _>>()?,
        )),
        Expr::Map(entries) => Ok(Value::Map(
            entries
                .iter()
                .map(|(key, value)| Ok((key.clone(), evaluate(value, frame)?)))
                .collect::<Result<_, GraphError>>()?,
        )),
        Expr::Property(target, key) => match evaluate(target, frame)? {
            Value::Node(node) => Ok(node.properties.get(key).map(Value::from).unwrap_or(Value::Null)),
            Value::Edge(edge) => Ok(edge.properties.get(key).map(Value::from).unwrap_or(Value::Null)),
            Value::Map(mut map) => Ok(map.remove(key).unwrap_or(Value::Null)),
            Value::Null => Ok(Value::Null),
            other => Err(type_error("node, relationship or map", &other)),
        },
        Expr::HasLabels(target, labels) => match evaluate(target, frame)? {
            Value::Node(node) => Ok(Value::Bool(node.labels.contains_all(labels))),
            Value::Null => Ok(Value::Null),
            other => Err(type_error("node", &other)),
        },
        Expr::Compare(left, op, right) => {
            let left = evaluate(left, frame)?;
            let right = evaluate(right, frame)?;
            let result = match op {
                ComparisonOp::Eq => left.equals(&right),
                ComparisonOp::Ne => left.equals(&right).map(|equal| !equal),
                ComparisonOp::Lt => left.compare(&right).map(|o| o.is_lt()),
                ComparisonOp::Le => left.compare(&right).map(|o| o.is_le()),
                ComparisonOp::Gt => left.compare(&right).map(|o| o.is_gt()),
                ComparisonOp::Ge => left.compare(&right).map(|o| o.is_ge()),
            };
            Ok(from_truth(result))
        }
        Expr::And(left, right) => {
            let left = truth(&evaluate(left, frame)?)?;
            let right = truth(&evaluate(right, frame)?)?;
            Ok(from_truth(match (left, right) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            }))
        }
        Expr::Or(left, right) => {
            let left = truth(&evaluate(left, frame)?)?;
            let right = truth(&evaluate(right, frame)?)?;
            Ok(from_truth(match (left, right) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            }))
        }
        Expr::Not(inner) => Ok(from_truth(truth(&evaluate(inner, frame)?)?.map(|b| !b))),
        Expr::Negate(inner) => match evaluate(inner, frame)? {
            Value::Integer(v) => v
                .checked_neg()
                .map(Value::Integer)
                .ok_or_else(|| GraphError::query("integer overflow")),
            Value::Float(v) => Ok(Value::Float(-v)),
            Value::Null => Ok(Value::Null),
            other => Err(type_error("number", &other)),
        },
        Expr::Call(Function::Coalesce, arguments) => {
            for argument in arguments {
                let value = evaluate(argument, frame)?;
                if !value.is_null() {
                    return Ok(value);
                }
            }
            Ok(Value::Null)
        }
        Expr::Call(function, arguments) => {
            let argument = match arguments.first() {
                Some(argument) => evaluate(argument, frame)?,
                None => Value::Null,
            };
            call(*function, argument)
        }
    }
}

fn call(function: Function, argument: Value) -> Result<Value, GraphError> {
    if argument.is_null() {
        return Ok(Value::Null);
    }
    match (function, argument) {
        (Function::Id, Value::Node(node)) => Ok(Value::Integer(node.id)),
        (Function::Id, Value::Edge(edge)) => Ok(Value::Integer(edge.id)),
        (Function::Labels, Value::Node(node)) => Ok(Value::List(
            node.labels
                .iter()
                .map(|label| Value::String(label.to_string()))
                .collect(),
        )),
        (Function::Type, Value::Edge(edge)) => Ok(Value::String(edge.edge_type)),
        (Function::Properties, Value::Node(node)) => Ok(Value::from_properties(&node.properties)),
        (Function::Properties, Value::Edge(edge)) => Ok(Value::from_properties(&edge.properties)),
        (Function::Properties, map @ Value::Map(_)) => Ok(map),
        (Function::Keys, Value::Node(node)) => Ok(key_list(node.properties.keys())),
        (Function::Keys, Value::Edge(edge)) => Ok(key_list(edge.properties.keys())),
        (Function::Keys, Value::Map(map)) => Ok(key_list(map.keys())),
        (Function::Size, Value::List(items)) => Ok(Value::Integer(items.len() as i64)),
        (Function::Size, Value::String(s)) => Ok(Value::Integer(s.chars().count() as i64)),
        (Function::ToString, Value::String(s)) => Ok(Value::String(s)),
        (
            Function::ToString,
            value @ (Value::Integer(_) | Value::Float(_) | Value::Bool(_)),
        ) => Ok(Value::String(value.to_string())),
        (function, other) => Err(type_error(
            match function {
                Function::Id | Function::Properties | Function::Keys => {
                    "node, relationship or map"
                }
                Function::Labels => "node",
                Function::Type => "relationship",
                Function::Size => "list or string",
                Function::ToString => "string, number or boolean",
                Function::Coalesce => "any",
            },
            &other,
        )),
    }
}

fn key_list<'a>(keys: impl Iterator<Item = &'a String>) -> Value {
    Value::List(keys.map(|key| Value::String(key.clone())).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(source: NodeId, target: NodeId) -> Edge {
        Edge {
            id: 1,
            source,
            target,
            edge_type: "R".into(),
            weight: None,
            properties: PropertyMap::new(),
        }
    }

    #[test]
    fn test_far_endpoints_by_direction() {
        let e = edge(1, 2);
        assert_eq!(far_endpoints(&e, 1, Direction::Outgoing), vec![2]);
        assert!(far_endpoints(&e, 2, Direction::Outgoing).is_empty());
        assert_eq!(far_endpoints(&e, 2, Direction::Incoming), vec![1]);
        assert_eq!(far_endpoints(&e, 2, Direction::Undirected), vec![1]);
    }

    #[test]
    fn test_self_loop_is_traversed_once() {
        let e = edge(3, 3);
        assert_eq!(far_endpoints(&e, 3, Direction::Undirected), vec![3]);
        assert_eq!(far_endpoints(&e, 3, Direction::Outgoing), vec![3]);
    }

    #[test]
    fn test_ternary_logic() {
        let frame = Frame::new();
        let null = || Box::new(Expr::Constant(Value::Null));
        let t = || Box::new(Expr::Constant(Value::Bool(true)));
        let f = || Box::new(Expr::Constant(Value::Bool(false)));
        assert_eq!(
            evaluate(&Expr::And(null(), f()), &frame).expect("and"),
            Value::Bool(false)
        );
        assert_eq!(
            evaluate(&Expr::And(null(), t()), &frame).expect("and"),
            Value::Null
        );
        assert_eq!(
            evaluate(&Expr::Or(null(), t()), &frame).expect("or"),
            Value::Bool(true)
        );
        assert_eq!(
            evaluate(&Expr::Not(null()), &frame).expect("not"),
            Value::Null
        );
    }

    #[test]
    fn test_group_key_tells_nested_entities_apart() {
        let node = |id: NodeId| {
            Value::Node(Node {
                id,
                labels: crate::graph::LabelSet::new(),
                properties: PropertyMap::new(),
            })
        };
        assert_ne!(
            group_key(&Value::List(vec![node(1)])),
            group_key(&Value::List(vec![node(2)]))
        );
        let wrap = |value: Value| Value::Map([("k".to_string(), value)].into_iter().collect());
        assert_ne!(group_key(&wrap(node(1))), group_key(&wrap(node(2))));
        assert_eq!(group_key(&wrap(node(4))), group_key(&wrap(node(4))));
        assert_ne!(
            group_key(&Value::List(vec![Value::String("a,b".into())])),
            group_key(&Value::List(vec![
                Value::String("a".into()),
                Value::String("b".into())
            ]))
        );
    }

    #[test]
    fn test_property_filters_require_equal_values() {
        let mut actual = PropertyMap::new();
        actual.insert("age".into(), PropertyValue::Integer(3));
        let mut expected = PropertyMap::new();
        expected.insert("age".into(), PropertyValue::Float(3.0));
        assert!(properties_match(&actual, &expected));
        expected.insert("missing".into(), PropertyValue::Null);
        assert!(!properties_match(&actual, &expected));
    }
}
